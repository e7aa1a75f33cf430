use super::container::{ContainerId, ProcessStatus};
use super::error::Result;
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub tag: &'a str,
    pub context_dir: &'a Path,
    pub no_cache: bool,
}

/// Operations the harness needs from a container engine.
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Check if the engine binary can be executed
    fn is_available(&self) -> bool;

    /// Build an image, failing with `HarnessError::Build` (carrying the build log)
    /// when the engine exits non-zero
    fn build_image(&self, request: &BuildRequest) -> Result<()>;

    /// Run `image` publishing `container_port` on `127.0.0.1:host_port`
    fn run_container(
        &self,
        image: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<Box<dyn ContainerProcess>>;

    /// Find the container publishing `host_port`. `None` means it is already gone.
    fn find_container(&self, host_port: u16) -> Result<Option<ContainerId>>;

    /// Kill a running container
    fn kill_container(&self, id: &ContainerId) -> Result<()>;

    /// Remove a container
    fn remove_container(&self, id: &ContainerId) -> Result<()>;
}

/// The local engine client process backing one container.
pub trait ContainerProcess: Send + Debug {
    /// Wait up to `timeout` for the process to exit.
    fn wait_timeout(&mut self, timeout: Duration) -> Result<ProcessStatus>;

    /// Collect the process after the daemon-side container was killed.
    fn reap(&mut self);
}
