use crate::domain::{HarnessError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_NAME: &str = "ommatidia.toml";

/// Harness settings. Every field has a default, so an absent file is valid.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Engine binary (`docker`, `podman`, ...)
    pub engine: String,
    /// Build descriptor that marks a detector directory
    pub descriptor: String,
    /// Tag appended to derived image names
    pub schema_version: String,
    /// Port the detector listens on inside the container
    pub container_port: u16,
    /// Remove containers after killing them
    pub remove_containers: bool,
    /// How long a single readiness probe waits for the process to exit
    pub readiness_wait_secs: u64,
    /// Probes before a container is declared not ready
    pub readiness_attempts: u32,
    pub request_timeout_secs: u64,
    /// Directory with fixture samples used by the detection checks
    pub fixtures_dir: Option<PathBuf>,
    /// Largest accepted distance between expected and detected pupil center
    pub max_pixel_distance: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            engine: "docker".into(),
            descriptor: "Dockerfile".into(),
            schema_version: "0.1".into(),
            container_port: 8080,
            remove_containers: true,
            readiness_wait_secs: 3,
            readiness_attempts: 20,
            request_timeout_secs: 30,
            fixtures_dir: None,
            max_pixel_distance: 20.0,
        }
    }
}

impl HarnessConfig {
    pub fn readiness_wait(&self) -> Duration {
        Duration::from_secs(self.readiness_wait_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        if self.engine.trim().is_empty() {
            return Err(HarnessError::Configuration(format!(
                "'engine' is empty in {:?}",
                origin
            )));
        }
        if self.descriptor.trim().is_empty() {
            return Err(HarnessError::Configuration(format!(
                "'descriptor' is empty in {:?}",
                origin
            )));
        }
        if self.readiness_attempts == 0 {
            return Err(HarnessError::Configuration(format!(
                "'readiness_attempts' must be at least 1 in {:?}",
                origin
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(HarnessError::Configuration(format!(
                "'request_timeout_secs' must be at least 1 in {:?}",
                origin
            )));
        }
        if self.max_pixel_distance.is_nan() || self.max_pixel_distance <= 0.0 {
            return Err(HarnessError::Configuration(format!(
                "'max_pixel_distance' must be positive in {:?}",
                origin
            )));
        }
        Ok(())
    }
}

/// Loads the config from `path`, or from `./ommatidia.toml` when it exists.
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    let path = match path {
        Some(path) => expand_path(path),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_NAME);
            if !fallback.is_file() {
                debug!("No {DEFAULT_CONFIG_NAME} found, using defaults");
                return Ok(HarnessConfig::default());
            }
            fallback
        }
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| HarnessError::Configuration(format!("reading {:?}: {e}", path)))?;
    parse_config(&content, &path)
}

fn parse_config(content: &str, path: &Path) -> Result<HarnessConfig> {
    let mut config: HarnessConfig = toml::from_str(content)
        .map_err(|e| HarnessError::Configuration(format!("parsing {:?}: {e}", path)))?;
    config.validate(path)?;

    // Relative fixture paths are resolved against the config file.
    if let Some(fixtures) = config.fixtures_dir.take() {
        let fixtures = expand_path(&fixtures);
        config.fixtures_dir = Some(match path.parent() {
            Some(parent) if fixtures.is_relative() => parent.join(fixtures),
            _ => fixtures,
        });
    }

    Ok(config)
}

/// Expands a leading `~` the way a shell would.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}
