use crate::checks::CheckRegistry;
use crate::domain::{HarnessError, Result};
use crate::services::{
    CheckResult, Container, EvaluationReport, EvaluationRunner, ImageBuilder, TeardownReport,
    TestRunner,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Outcome of building, running and tearing down one detector directory.
#[derive(Debug)]
pub struct UnitReport<T> {
    pub path: PathBuf,
    pub image: Option<String>,
    pub outcome: Result<T>,
    pub teardown: Option<TeardownReport>,
}

impl UnitReport<Vec<CheckResult>> {
    pub fn is_success(&self) -> bool {
        self.outcome
            .as_ref()
            .is_ok_and(|results| results.iter().all(CheckResult::is_ok))
    }
}

impl UnitReport<EvaluationReport> {
    pub fn is_success(&self) -> bool {
        self.outcome
            .as_ref()
            .is_ok_and(EvaluationReport::is_complete)
    }
}

/// Options shared by every unit in one invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitOptions<'a> {
    pub name: Option<&'a str>,
    pub no_cache: bool,
}

/// Runs detector directories one after the other. A failing unit never stops the next.
#[derive(Debug)]
pub struct Suite {
    builder: ImageBuilder,
}

impl Suite {
    pub fn new(builder: ImageBuilder) -> Self {
        Self { builder }
    }

    pub fn builder(&self) -> &ImageBuilder {
        &self.builder
    }

    /// Subdirectories of `root` holding the build descriptor, sorted by name.
    pub fn discover_units(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let descriptor = &self.builder.config().descriptor;
        let entries = fs::read_dir(root)
            .map_err(|e| HarnessError::io(format!("listing detectors in {:?}", root), e))?;

        let mut units: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join(descriptor).is_file())
            .collect();
        units.sort();

        if units.is_empty() {
            warn!("No subdirectory of {:?} contains a {descriptor}", root);
        }
        Ok(units)
    }

    /// Runs every check in `registry` against a fresh container built from `path`.
    pub fn run_checks(
        &self,
        path: &Path,
        options: UnitOptions<'_>,
        registry: &CheckRegistry,
    ) -> UnitReport<Vec<CheckResult>> {
        self.run_unit(path, options, |container| {
            Ok(TestRunner::new(container, registry).collect())
        })
    }

    pub fn run_evaluation(
        &self,
        path: &Path,
        options: UnitOptions<'_>,
        input: &Path,
    ) -> UnitReport<EvaluationReport> {
        self.run_unit(path, options, |container| {
            Ok(EvaluationRunner::new(container).run_to_report(input))
        })
    }

    pub fn run_checks_all(
        &self,
        root: &Path,
        no_cache: bool,
        registry: &CheckRegistry,
    ) -> Result<Vec<UnitReport<Vec<CheckResult>>>> {
        let options = UnitOptions {
            name: None,
            no_cache,
        };
        Ok(self
            .discover_units(root)?
            .iter()
            .map(|path| self.run_checks(path, options, registry))
            .collect())
    }

    pub fn run_evaluation_all(
        &self,
        root: &Path,
        no_cache: bool,
        input: &Path,
    ) -> Result<Vec<UnitReport<EvaluationReport>>> {
        let options = UnitOptions {
            name: None,
            no_cache,
        };
        Ok(self
            .discover_units(root)?
            .iter()
            .map(|path| self.run_evaluation(path, options, input))
            .collect())
    }

    fn run_unit<T>(
        &self,
        path: &Path,
        options: UnitOptions<'_>,
        body: impl FnOnce(&mut Container) -> Result<T>,
    ) -> UnitReport<T> {
        let mut report = UnitReport {
            path: path.to_path_buf(),
            image: None,
            outcome: Err(HarnessError::NotStarted),
            teardown: None,
        };

        let image = match self.builder.build_named(path, options.name, options.no_cache) {
            Ok(image) => image,
            Err(e) => {
                error!("{e}");
                report.outcome = Err(e);
                return report;
            }
        };
        report.image = Some(image.name().to_string());

        let mut container = match image.spawn() {
            Ok(container) => container,
            Err(e) => {
                error!("Starting {} failed: {e}", image.name());
                report.outcome = Err(e);
                return report;
            }
        };

        let config = self.builder.config();
        report.outcome = container
            .wait_until_ready(config.readiness_wait(), config.readiness_attempts)
            .and_then(|()| {
                match container.metadata() {
                    Ok(metadata) => info!(
                        "{} ready: {} by {} ({})",
                        image.name(),
                        metadata.name,
                        metadata.authors,
                        metadata.license
                    ),
                    Err(e) => warn!("{} ready, but its metadata is unreadable: {e}", image.name()),
                }
                body(&mut container)
            });

        if let Err(e) = &report.outcome {
            error!("{}: {e}", image.name());
        }
        report.teardown = Some(container.stop());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::HarnessConfig;
    use crate::test_support::{MockRuntime, detector_dir};
    use std::sync::Arc;

    fn suite(runtime: Arc<MockRuntime>) -> Suite {
        Suite::new(ImageBuilder::new(runtime, HarnessConfig::default()).unwrap())
    }

    #[test]
    fn units_need_a_descriptor_and_are_sorted() {
        let temp = tempfile::tempdir().unwrap();
        detector_dir(temp.path(), "zeta");
        detector_dir(temp.path(), "alpha");
        fs::create_dir(temp.path().join("no_descriptor")).unwrap();
        fs::write(temp.path().join("stray.txt"), "x").unwrap();

        let units = suite(Arc::new(MockRuntime::new()))
            .discover_units(temp.path())
            .unwrap();
        let names: Vec<_> = units.iter().map(|p| p.file_name().unwrap()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[test]
    fn build_failure_is_reported_without_spawning() {
        let temp = tempfile::tempdir().unwrap();
        let dir = detector_dir(temp.path(), "broken");
        let runtime = Arc::new(MockRuntime::new());
        runtime.set_fail_on("build");

        let report = suite(runtime.clone()).run_checks(&dir, UnitOptions::default(), &CheckRegistry::new());
        assert!(!report.is_success());
        assert!(matches!(report.outcome, Err(HarnessError::Build { .. })));
        assert!(report.teardown.is_none());
        assert_eq!(runtime.count("run:"), 0);
    }
}
