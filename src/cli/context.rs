use crate::domain::{ContainerRuntime, Sample};
use crate::infra::{EngineCli, HarnessConfig};
use crate::services::{ImageBuilder, Suite};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Everything a subcommand needs: the loaded config and the engine it drives.
#[derive(Debug, Clone)]
pub struct HarnessContext {
    pub config: HarnessConfig,
    pub runtime: Arc<dyn ContainerRuntime>,
}

impl HarnessContext {
    /// Context backed by the engine binary named in `config`.
    pub fn new(config: HarnessConfig, show_output: bool) -> Self {
        let runtime = Arc::new(EngineCli::new(config.engine.clone()).with_output(show_output));
        Self { config, runtime }
    }

    pub fn with_runtime(config: HarnessConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { config, runtime }
    }

    pub fn suite(&self) -> Result<Suite> {
        let builder = ImageBuilder::new(self.runtime.clone(), self.config.clone())
            .context("preparing the image builder")?;
        Ok(Suite::new(builder))
    }

    /// Fixture samples for the detection checks. `override_dir` wins over the config.
    pub fn samples(&self, override_dir: Option<&Path>) -> Result<Vec<Sample>> {
        let Some(dir) = override_dir.or(self.config.fixtures_dir.as_deref()) else {
            return Ok(Vec::new());
        };
        Sample::find_all(dir).with_context(|| format!("loading fixtures from {:?}", dir))
    }
}
