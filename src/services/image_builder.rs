use crate::domain::image::{derive_image_name, validate_context};
use crate::domain::{BuildRequest, ContainerRuntime, HarnessError, Result};
use crate::infra::{HarnessConfig, HttpClient, PortAllocator};
use crate::services::container::{Container, ContainerSettings};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Builds detector images from their build context directories.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    runtime: Arc<dyn ContainerRuntime>,
    http: HttpClient,
    ports: Arc<PortAllocator>,
    config: HarnessConfig,
}

impl ImageBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: HarnessConfig) -> Result<Self> {
        let http = HttpClient::new(config.request_timeout())?;
        Ok(Self {
            runtime,
            http,
            ports: Arc::new(PortAllocator::new()),
            config,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn build(&self, path: &Path, ignore_cache: bool) -> Result<Image> {
        self.build_named(path, None, ignore_cache)
    }

    /// Builds `path`, tagging the image `name` or a name derived from the directory.
    ///
    /// The context is validated before the engine is invoked.
    pub fn build_named(&self, path: &Path, name: Option<&str>, ignore_cache: bool) -> Result<Image> {
        validate_context(path, &self.config.descriptor)?;
        let context = fs::canonicalize(path)
            .map_err(|e| HarnessError::io(format!("resolving {:?}", path), e))?;

        let name = match name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => {
                return Err(HarnessError::Configuration("image name is empty".into()));
            }
            None => derive_image_name(&context, &self.config.schema_version)?,
        };

        info!("Building image {name} from {:?}", context);
        self.runtime.build_image(&BuildRequest {
            tag: &name,
            context_dir: &context,
            no_cache: ignore_cache,
        })?;
        info!("Image {name} built");

        Ok(Image {
            name,
            context,
            builder: self.clone(),
        })
    }
}

/// A built image. The daemon-side image outlives this handle.
#[derive(Debug)]
pub struct Image {
    name: String,
    context: PathBuf,
    builder: ImageBuilder,
}

impl Image {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    /// Starts a container from this image on a fresh loopback port.
    ///
    /// The returned handle tears the container down when dropped.
    pub fn spawn(&self) -> Result<Container> {
        let config = &self.builder.config;
        let port = self.builder.ports.allocate()?;
        let mut container = Container::new(
            self.builder.runtime.clone(),
            self.builder.http.clone(),
            ContainerSettings {
                image: self.name.clone(),
                host_port: port,
                container_port: config.container_port,
                remove_on_exit: config.remove_containers,
            },
        );
        container.start()?;
        info!("Started {} on port {port}", self.name);
        Ok(container)
    }
}
