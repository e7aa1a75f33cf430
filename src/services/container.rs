use crate::domain::{
    ContainerId, ContainerProcess, ContainerRuntime, ContainerState, HarnessError, MetaData,
    Method, ProcessStatus, RequestBody, Response, Result,
};
use crate::infra::{HttpClient, TransportError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wait used by the readiness probe `request` runs on a container that is not ready yet.
const REQUEST_PROBE_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    pub remove_on_exit: bool,
}

/// Outcome of tearing down one container.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub container_id: Option<ContainerId>,
    pub killed: bool,
    pub removed: bool,
    pub errors: Vec<HarnessError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One running instance of an image, reachable on a loopback port.
///
/// Teardown runs when the handle is dropped or consumed by [`Container::stop`], at most
/// once: the daemon-side container is killed and, if configured, removed.
#[derive(Debug)]
pub struct Container {
    runtime: Arc<dyn ContainerRuntime>,
    http: HttpClient,
    settings: ContainerSettings,
    process: Option<Box<dyn ContainerProcess>>,
    state: ContainerState,
    torn_down: bool,
}

impl Container {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        http: HttpClient,
        settings: ContainerSettings,
    ) -> Self {
        Self {
            runtime,
            http,
            settings,
            process: None,
            state: ContainerState::Created,
            torn_down: false,
        }
    }

    /// Spawns the engine client. Only valid once, from `Created`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ContainerState::Created {
            return Err(HarnessError::InvalidContainer(format!(
                "{} cannot be started from state {}",
                self.settings.image, self.state
            )));
        }

        let process = self.runtime.run_container(
            &self.settings.image,
            self.settings.host_port,
            self.settings.container_port,
        )?;
        self.process = Some(process);
        self.state = ContainerState::Starting;
        debug!(
            "Container for {} starting on port {}",
            self.settings.image, self.settings.host_port
        );
        Ok(())
    }

    pub fn image(&self) -> &str {
        &self.settings.image
    }

    pub fn port(&self) -> u16 {
        self.settings.host_port
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn entry_point(&self) -> String {
        format!("http://127.0.0.1:{}/", self.settings.host_port)
    }

    /// One readiness probe.
    ///
    /// Waits up to `wait` for the process to exit, which marks the container as crashed,
    /// then issues one `GET /`. Refused or reset connections mean "not yet" and return
    /// `Ok(false)`; any other transport failure is a contract violation.
    pub fn is_ready(&mut self, wait: Duration) -> Result<bool> {
        match self.state {
            ContainerState::Ready => return Ok(true),
            ContainerState::Starting => {}
            ContainerState::Created => return Err(HarnessError::NotStarted),
            ContainerState::Crashed => {
                return Err(HarnessError::InvalidContainer(format!(
                    "{} exited before becoming reachable",
                    self.settings.image
                )));
            }
            ContainerState::Stopped => {
                return Err(HarnessError::NotReady(format!(
                    "{} has been stopped",
                    self.settings.image
                )));
            }
        }

        let process = self.process.as_mut().ok_or(HarnessError::NotStarted)?;
        if let ProcessStatus::Exited(code) = process.wait_timeout(wait)? {
            self.state = ContainerState::Crashed;
            return Err(HarnessError::InvalidContainer(format!(
                "{} exited with status {:?} before becoming reachable",
                self.settings.image, code
            )));
        }

        match self.http.send(&self.entry_point(), Method::Get, None) {
            Ok(response) => {
                self.state = ContainerState::Ready;
                debug!(
                    "{} reachable at {} (status {})",
                    self.settings.image,
                    self.entry_point(),
                    response.status
                );
                Ok(true)
            }
            Err(TransportError::Unreachable(reason)) => {
                debug!("{} not reachable yet: {reason}", self.settings.image);
                Ok(false)
            }
            Err(TransportError::Malformed(reason)) => Err(HarnessError::InvalidContainer(format!(
                "the HTTP response of {} appears corrupt: {reason}",
                self.settings.image
            ))),
        }
    }

    /// Probes until ready, at most `attempts` times.
    pub fn wait_until_ready(&mut self, wait: Duration, attempts: u32) -> Result<()> {
        for attempt in 1..=attempts {
            if self.is_ready(wait)? {
                return Ok(());
            }
            info!("Container not ready ({attempt}/{attempts})");
        }

        Err(HarnessError::NotReady(format!(
            "{} did not answer on {} after {attempts} probes",
            self.settings.image,
            self.entry_point()
        )))
    }

    /// Sends one request to the detector.
    ///
    /// A container that is not ready yet gets one short readiness probe first.
    pub fn request(
        &mut self,
        path: &str,
        method: Method,
        body: Option<RequestBody>,
    ) -> Result<Response> {
        if self.state == ContainerState::Created {
            return Err(HarnessError::NotStarted);
        }
        if !self.is_ready(REQUEST_PROBE_WAIT)? {
            return Err(HarnessError::NotReady(format!(
                "{} is not reachable on {}",
                self.settings.image,
                self.entry_point()
            )));
        }

        let url = format!(
            "http://127.0.0.1:{}/{}",
            self.settings.host_port,
            path.trim_start_matches('/')
        );
        self.http
            .send(&url, method, body)
            .map_err(|error| match error {
                TransportError::Unreachable(reason) => HarnessError::Transport(reason),
                TransportError::Malformed(reason) => HarnessError::InvalidContainer(reason),
            })
    }

    pub fn get(&mut self, path: &str) -> Result<Response> {
        self.request(path, Method::Get, None)
    }

    pub fn delete(&mut self, path: &str) -> Result<Response> {
        self.request(path, Method::Delete, None)
    }

    pub fn post_json(&mut self, path: &str, value: Value) -> Result<Response> {
        self.request(path, Method::Post, Some(RequestBody::json(value)))
    }

    pub fn post_bytes(&mut self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<Response> {
        self.request(path, Method::Post, Some(RequestBody::raw(bytes, content_type)))
    }

    /// Reads the detector's self-description from `GET /`.
    pub fn metadata(&mut self) -> Result<MetaData> {
        let response = self.get("/")?;
        if !response.is_success() {
            return Err(HarnessError::InvalidContainer(format!(
                "GET / returned {}",
                response.status
            )));
        }
        response.parse()
    }

    /// Tears the container down now and reports what happened.
    pub fn stop(mut self) -> TeardownReport {
        self.teardown()
    }

    fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.torn_down {
            return report;
        }
        let Some(mut process) = self.process.take() else {
            return report;
        };
        self.torn_down = true;

        match self.runtime.find_container(self.settings.host_port) {
            Ok(Some(id)) => {
                match self.runtime.kill_container(&id) {
                    Ok(()) => report.killed = true,
                    Err(e) => report.errors.push(e),
                }
                if self.settings.remove_on_exit {
                    match self.runtime.remove_container(&id) {
                        Ok(()) => report.removed = true,
                        Err(e) => report.errors.push(e),
                    }
                }
                report.container_id = Some(id);
            }
            Ok(None) => debug!(
                "No container publishes port {} any more",
                self.settings.host_port
            ),
            Err(e) => report.errors.push(e),
        }

        process.reap();
        self.state = ContainerState::Stopped;

        for error in &report.errors {
            warn!("Teardown of {}: {error}", self.settings.image);
        }
        if report.is_clean() {
            debug!("Container for {} shut down", self.settings.image);
        }
        report
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.teardown();
    }
}
