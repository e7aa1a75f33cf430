use crate::checks::{Check, CheckError, CheckRegistry};
use crate::services::Container;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Failed(String),
}

/// Result of one check against one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: CheckOutcome::Passed,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: CheckOutcome::Failed(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == CheckOutcome::Passed
    }

    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            CheckOutcome::Passed => None,
            CheckOutcome::Failed(message) => Some(message),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            CheckOutcome::Passed => write!(f, "Test '{}' OK", self.name),
            CheckOutcome::Failed(message) => write!(f, "Test '{}' failed: {message}", self.name),
        }
    }
}

/// Runs every registered check, in order, against one container.
///
/// Iterating yields one result per check and never stops at a failure. The runner
/// borrows the container; tearing it down stays with the owner.
pub struct TestRunner<'a> {
    container: &'a mut Container,
    checks: Box<dyn Iterator<Item = &'a dyn Check> + 'a>,
    total: usize,
    successful: bool,
}

impl<'a> TestRunner<'a> {
    pub fn new(container: &'a mut Container, registry: &'a CheckRegistry) -> Self {
        Self {
            container,
            checks: Box::new(registry.iter()),
            total: registry.len(),
            successful: true,
        }
    }

    /// Number of checks in the registry.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Whether every result produced so far passed.
    pub fn is_successful(&self) -> bool {
        self.successful
    }
}

impl Iterator for TestRunner<'_> {
    type Item = CheckResult;

    fn next(&mut self) -> Option<CheckResult> {
        let check = self.checks.next()?;
        debug!("Running check '{}'", check.name());

        let result = match check.run(self.container) {
            Ok(()) => CheckResult::passed(check.name()),
            Err(CheckError::Assertion(failure)) => CheckResult::failed(check.name(), failure.to_string()),
            Err(CheckError::Harness(error)) => CheckResult::failed(check.name(), error.to_string()),
        };

        if !result.is_ok() {
            self.successful = false;
            info!("{result}");
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{AssertionFailure, assert_equal};
    use crate::domain::ContainerState;
    use crate::infra::{HttpClient, PortAllocator};
    use crate::services::ContainerSettings;
    use crate::test_support::{MockRuntime, detector_service};
    use std::io::{BufRead, BufReader, Write};
    use std::net::{Ipv4Addr, TcpListener};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        pass: bool,
    }

    impl Check for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self, _container: &mut Container) -> Result<(), CheckError> {
            if self.pass {
                Ok(())
            } else {
                Err(AssertionFailure::new("boom").into())
            }
        }
    }

    struct RootStatus;

    impl Check for RootStatus {
        fn name(&self) -> &str {
            "Root"
        }

        fn run(&self, container: &mut Container) -> Result<(), CheckError> {
            assert_equal(container.get("/")?.status, 200, "GET /")?;
            Ok(())
        }
    }

    struct Listing;

    impl Check for Listing {
        fn name(&self) -> &str {
            "Listing"
        }

        fn run(&self, container: &mut Container) -> Result<(), CheckError> {
            assert_equal(container.get("/detections/")?.status, 200, "GET /detections/")?;
            Ok(())
        }
    }

    /// Answers `GET /` with an empty JSON object. Any later request gets bytes that
    /// are not HTTP, or, with `garbage` unset, a closed port.
    fn flaky_service(garbage: bool) -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let worker = thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Ok(reader) = stream.try_clone() else { continue };
                let mut lines = BufReader::new(reader).lines();
                let request_line = lines.next().and_then(|line| line.ok()).unwrap_or_default();
                for line in lines.by_ref() {
                    match line {
                        Ok(line) if !line.is_empty() => continue,
                        _ => break,
                    }
                }

                if request_line.starts_with("GET / ") {
                    let _ = stream.write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
                    );
                    if !garbage {
                        return;
                    }
                } else {
                    let _ = stream.write_all(b"this is not http\r\n\r\n");
                }
            }
        });
        (port, worker)
    }

    fn container(runtime: Arc<MockRuntime>) -> Container {
        container_on(runtime, PortAllocator::new().allocate().unwrap())
    }

    fn container_on(runtime: Arc<MockRuntime>, host_port: u16) -> Container {
        let mut container = Container::new(
            runtime,
            HttpClient::new(Duration::from_secs(5)).unwrap(),
            ContainerSettings {
                image: "pure:0.1".into(),
                host_port,
                container_port: 8080,
                remove_on_exit: true,
            },
        );
        container.start().unwrap();
        container
    }

    fn registry(passes: &[bool]) -> CheckRegistry {
        const NAMES: [&str; 4] = ["one", "two", "three", "four"];
        let mut registry = CheckRegistry::new();
        for (&name, &pass) in NAMES.iter().zip(passes) {
            registry.register(Fixed { name, pass });
        }
        registry
    }

    #[test]
    fn failure_in_the_middle_does_not_stop_the_run() {
        let runtime = Arc::new(MockRuntime::new());
        let mut container = container(runtime);
        let registry = registry(&[true, false, true]);

        let mut runner = TestRunner::new(&mut container, &registry);
        assert_eq!(runner.len(), 3);
        let results: Vec<CheckResult> = runner.by_ref().collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(!results[1].is_ok());
        assert!(results[1].message().unwrap().ends_with("boom"));
        assert!(results[2].is_ok());
        assert!(!runner.is_successful());
    }

    #[test]
    fn success_is_the_conjunction_so_far() {
        let runtime = Arc::new(MockRuntime::new());
        let mut container = container(runtime);
        let registry = registry(&[true, false]);

        let mut runner = TestRunner::new(&mut container, &registry);
        assert!(runner.is_successful());
        runner.next().unwrap();
        assert!(runner.is_successful());
        runner.next().unwrap();
        assert!(!runner.is_successful());
        assert!(runner.next().is_none());
    }

    #[test]
    fn harness_errors_become_failures() {
        let runtime = Arc::new(MockRuntime::new());
        let mut container = container(runtime);
        let mut registry = CheckRegistry::new();
        registry.register(RootStatus);

        let results: Vec<CheckResult> = TestRunner::new(&mut container, &registry).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].message().unwrap().contains("not ready"));
    }

    #[test]
    fn corrupt_response_after_readiness_is_a_failure() {
        let (port, _worker) = flaky_service(true);
        let mut container = container_on(Arc::new(MockRuntime::new()), port);
        container.wait_until_ready(Duration::ZERO, 3).unwrap();

        let mut registry = CheckRegistry::new();
        registry.register(RootStatus);
        registry.register(Listing);
        registry.register(RootStatus);

        let mut runner = TestRunner::new(&mut container, &registry);
        let results: Vec<CheckResult> = runner.by_ref().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].message().unwrap().starts_with("invalid container"));
        assert!(results[2].is_ok());
        assert!(!runner.is_successful());
    }

    #[test]
    fn disconnect_after_readiness_is_a_failure() {
        let (port, worker) = flaky_service(false);
        let mut container = container_on(Arc::new(MockRuntime::new()), port);
        container.wait_until_ready(Duration::ZERO, 3).unwrap();
        worker.join().unwrap();

        let mut registry = CheckRegistry::new();
        registry.register(Listing);

        let results: Vec<CheckResult> = TestRunner::new(&mut container, &registry).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].message().unwrap().starts_with("HTTP error"));
        assert_eq!(container.state(), ContainerState::Ready);
    }

    #[test]
    fn runner_does_not_tear_down() {
        let runtime = Arc::new(MockRuntime::with_service(detector_service()));
        let mut container = container(runtime.clone());
        let mut registry = CheckRegistry::new();
        registry.register(RootStatus);

        let results: Vec<CheckResult> = TestRunner::new(&mut container, &registry).collect();
        assert!(results[0].is_ok());
        assert_eq!(runtime.count("kill:"), 0);

        drop(container);
        assert_eq!(runtime.count("kill:"), 1);
    }

    #[test]
    fn results_render_as_verdict_lines() {
        assert_eq!(CheckResult::passed("Metadata").to_string(), "Test 'Metadata' OK");
        assert_eq!(
            CheckResult::failed("Query", "expected 200, got 500").to_string(),
            "Test 'Query' failed: expected 200, got 500"
        );
    }
}
