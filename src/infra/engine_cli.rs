use crate::domain::{
    BuildRequest, ContainerId, ContainerProcess, ContainerRuntime, HarnessError, ProcessStatus,
    Result,
};
use std::ffi::OsStr;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const REAP_GRACE: Duration = Duration::from_secs(10);

/// Drives a docker-compatible engine through its command line.
#[derive(Debug, Clone)]
pub struct EngineCli {
    binary: String,
    show_output: bool,
}

impl EngineCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            show_output: false,
        }
    }

    /// Forward build logs and container output to the terminal.
    pub fn with_output(mut self, show_output: bool) -> Self {
        self.show_output = show_output;
        self
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command.args(args);
        command
    }

    fn output<I, S>(&self, args: I, context: &str) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| HarnessError::Engine {
                context: context.to_string(),
                source,
            })
    }
}

impl ContainerRuntime for EngineCli {
    fn is_available(&self) -> bool {
        self.command(["--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn build_image(&self, request: &BuildRequest) -> Result<()> {
        let mut args = vec!["build"];
        if request.no_cache {
            args.push("--no-cache");
        }
        args.extend(["-t", request.tag, "."]);

        let context = format!("building image {}", request.tag);
        let output = self
            .command(&args)
            .current_dir(request.context_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| HarnessError::Engine { context, source })?;

        let log = combined_log(&output);
        if self.show_output {
            for line in log.lines() {
                info!("[build {}] {line}", request.tag);
            }
        }

        if !output.status.success() {
            return Err(HarnessError::Build {
                image: request.tag.to_string(),
                log,
            });
        }

        debug!("Image {} built", request.tag);
        Ok(())
    }

    fn run_container(
        &self,
        image: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<Box<dyn ContainerProcess>> {
        let publish = format!("127.0.0.1:{host_port}:{container_port}/tcp");
        let (stdout, stderr) = if self.show_output {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let child = self
            .command(["run", "-p", &publish, image])
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| HarnessError::Engine {
                context: format!("running {image}"),
                source,
            })?;

        debug!("Spawned engine client {} for {image} on port {host_port}", child.id());
        Ok(Box::new(EngineProcess { child }))
    }

    fn find_container(&self, host_port: u16) -> Result<Option<ContainerId>> {
        let filter = format!("publish={host_port}");
        let context = format!("looking up container on port {host_port}");
        let output = self.output(["ps", "-q", "--filter", &filter], &context)?;
        ensure_success(output.status, &context, &output)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        ContainerId::parse(&stdout).map(Some)
    }

    fn kill_container(&self, id: &ContainerId) -> Result<()> {
        let context = format!("killing container {id}");
        let output = self.output(["kill", id.as_str()], &context)?;
        ensure_success(output.status, &context, &output)
    }

    fn remove_container(&self, id: &ContainerId) -> Result<()> {
        let context = format!("removing container {id}");
        let output = self.output(["rm", id.as_str()], &context)?;
        ensure_success(output.status, &context, &output)
    }
}

/// The `<engine> run` client process.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
}

impl ContainerProcess for EngineProcess {
    fn wait_timeout(&mut self, timeout: Duration) -> Result<ProcessStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self
                .child
                .try_wait()
                .map_err(|e| HarnessError::io("waiting for engine client", e))?;

            if let Some(status) = status {
                return Ok(ProcessStatus::Exited(status.code()));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(ProcessStatus::Running);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn reap(&mut self) {
        match self.wait_timeout(REAP_GRACE) {
            Ok(ProcessStatus::Exited(_)) => {}
            Ok(ProcessStatus::Running) | Err(_) => {
                warn!(
                    "Engine client {} still running after teardown, killing it",
                    self.child.id()
                );
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}

fn combined_log(output: &Output) -> String {
    let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !log.is_empty() && !log.ends_with('\n') {
            log.push('\n');
        }
        log.push_str(&stderr);
    }
    log
}

fn ensure_success(status: ExitStatus, context: &str, output: &Output) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    Err(HarnessError::Teardown(format!(
        "engine returned status {:?} ({context}): {}",
        status.code(),
        combined_log(output).trim()
    )))
}
