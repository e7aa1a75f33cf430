use crate::domain::{
    BuildRequest, ContainerId, ContainerProcess, ContainerRuntime, HarnessError, ProcessStatus,
    Result,
};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub type StubHandler = Arc<dyn Fn(&StubRequest) -> StubResponse + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl StubResponse {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".into()),
            body: Some(value.to_string().into_bytes()),
        }
    }

    pub fn text(status: u16, text: &str) -> Self {
        Self {
            status,
            content_type: Some("text/plain".into()),
            body: Some(text.as_bytes().to_vec()),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: None,
        }
    }
}

/// Loopback HTTP server answering every request with `handler`.
pub struct StubServer {
    port: u16,
    hits: Arc<AtomicUsize>,
    server: Arc<Server>,
    worker: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&StubRequest) -> StubResponse + Send + Sync + 'static,
    {
        Self::bind(0, Arc::new(handler)).expect("binding stub server")
    }

    pub fn bind(port: u16, handler: StubHandler) -> io::Result<Self> {
        let server = Server::http((Ipv4Addr::LOCALHOST, port)).map_err(io::Error::other)?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| io::Error::other("stub server is not bound to an IP address"))?;
        let server = Arc::new(server);
        let hits = Arc::new(AtomicUsize::new(0));

        let worker = {
            let server = server.clone();
            let hits = hits.clone();
            thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let Some(stub_request) = read_request(&mut request) else {
                        continue;
                    };
                    hits.fetch_add(1, Ordering::SeqCst);
                    let _ = request.respond(to_response(&handler(&stub_request)));
                }
            })
        };

        Ok(Self {
            port,
            hits,
            server,
            worker: Some(worker),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for StubServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubServer")
            .field("port", &self.port)
            .field("hits", &self.hits())
            .finish_non_exhaustive()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn read_request(request: &mut Request) -> Option<StubRequest> {
    let content_type = request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Content-Type"))
        .map(|header| header.value.as_str().to_string());

    let mut body = Vec::new();
    request.as_reader().read_to_end(&mut body).ok()?;

    Some(StubRequest {
        method: request.method().to_string(),
        path: request.url().to_string(),
        content_type,
        body,
    })
}

fn to_response(stub: &StubResponse) -> Response<Cursor<Vec<u8>>> {
    let body = stub.body.clone().unwrap_or_default();
    let mut response = Response::from_data(body).with_status_code(stub.status);
    if let Some(content_type) = &stub.content_type {
        if let Ok(header) = Header::from_bytes("Content-Type", content_type.as_bytes()) {
            response.add_header(header);
        }
    }
    response
}

/// In-memory detector following the `/` and `/detections/` contract.
///
/// PNG payloads are "detected" at the image center, anything else is a 400.
pub fn detector_service() -> StubHandler {
    let instances = Mutex::new((1u64, BTreeSet::<u64>::new()));

    Arc::new(move |request: &StubRequest| {
        let mut guard = instances.lock().unwrap();
        let (next_id, ids) = &mut *guard;
        let segments: Vec<&str> = request
            .path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", []) => StubResponse::json(
                200,
                json!({
                    "name": "Stub",
                    "additional_information": "",
                    "authors": ["Harness"],
                    "license": "MIT",
                    "prediction": "ellipse"
                }),
            ),
            ("GET", ["detections"]) => StubResponse::json(200, json!(ids.iter().collect::<Vec<_>>())),
            ("POST", ["detections"]) => {
                let id = *next_id;
                *next_id += 1;
                ids.insert(id);
                StubResponse::json(200, json!(id))
            }
            (method, ["detections", id]) => {
                let Some(id) = id.parse::<u64>().ok().filter(|id| ids.contains(id)) else {
                    return StubResponse::empty(404);
                };
                match method {
                    "GET" => StubResponse::json(200, json!({ "id": id })),
                    "DELETE" => {
                        ids.remove(&id);
                        StubResponse::json(200, json!(null))
                    }
                    "POST" => match png_size(&request.body) {
                        Some((width, height)) => StubResponse::json(
                            200,
                            json!({
                                "x": f64::from(width) / 2.0,
                                "y": f64::from(height) / 2.0,
                                "confidence": 1.0,
                                "major": 10.0,
                                "minor": 8.0,
                                "angle": 1.0,
                                "sample": { "width": width, "height": height }
                            }),
                        ),
                        None => StubResponse::text(400, "Invalid image"),
                    },
                    _ => StubResponse::empty(404),
                }
            }
            _ => StubResponse::empty(404),
        }
    })
}

/// PNG signature plus an IHDR header, enough for `detector_service` to read the size.
pub fn fake_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
    bytes
}

fn png_size(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || !bytes.starts_with(PNG_SIGNATURE) || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

/// Writes a fixture whose expected center is the image center.
pub fn write_fixture(dir: &Path, label: &str, width: u32, height: u32) -> PathBuf {
    let name = format!(
        "{label}_{width}_{height}_{}_{}_10_8_0.png",
        f64::from(width) / 2.0,
        f64::from(height) / 2.0
    );
    let path = dir.join(name);
    fs::write(&path, fake_png(width, height)).unwrap();
    path
}

/// Creates `root/name` with an empty `Dockerfile`.
pub fn detector_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Dockerfile"), "FROM scratch\n").unwrap();
    dir
}

/// A `<engine> run` client that never blocks.
#[derive(Debug)]
pub struct MockProcess {
    exit_code: Option<i32>,
    server: Option<StubServer>,
}

impl ContainerProcess for MockProcess {
    fn wait_timeout(&mut self, _timeout: Duration) -> Result<ProcessStatus> {
        Ok(match self.exit_code {
            Some(code) => ProcessStatus::Exited(Some(code)),
            None => ProcessStatus::Running,
        })
    }

    fn reap(&mut self) {
        self.server.take();
    }
}

/// Records every engine command and serves the configured handler on the published port.
pub struct MockRuntime {
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<HashSet<String>>,
    service: RwLock<Option<StubHandler>>,
    crash_code: RwLock<Option<i32>>,
    container_id: RwLock<Option<String>>,
    running: RwLock<HashSet<u16>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(HashSet::new()),
            service: RwLock::new(None),
            crash_code: RwLock::new(None),
            container_id: RwLock::new(None),
            running: RwLock::new(HashSet::new()),
        }
    }

    /// Containers started by this runtime answer HTTP with `handler`.
    pub fn with_service(handler: StubHandler) -> Self {
        let runtime = Self::new();
        *runtime.service.write().unwrap() = Some(handler);
        runtime
    }

    /// Makes `operation` fail. `build:<tag>` fails only the build of that image.
    pub fn set_fail_on(&self, operation: &str) {
        self.fail_on.write().unwrap().insert(operation.to_string());
    }

    /// Spawned processes exit immediately with `code`.
    pub fn set_crash_on_start(&self, code: i32) {
        *self.crash_code.write().unwrap() = Some(code);
    }

    /// Lookups return `raw` instead of a generated id.
    pub fn set_container_id(&self, raw: &str) {
        *self.container_id.write().unwrap() = Some(raw.to_string());
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands
            .read()
            .unwrap()
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .count()
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if self.fail_on.read().unwrap().contains(operation) {
            return Err(HarnessError::Engine {
                context: format!("mock failure on {operation}"),
                source: io::Error::other("injected"),
            });
        }
        Ok(())
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRuntime")
            .field("commands", &self.get_commands())
            .finish_non_exhaustive()
    }
}

impl ContainerRuntime for MockRuntime {
    fn is_available(&self) -> bool {
        self.record_command("is_available");
        true
    }

    fn build_image(&self, request: &BuildRequest) -> Result<()> {
        let suffix = if request.no_cache { ":no-cache" } else { "" };
        self.record_command(&format!("build_image:{}{suffix}", request.tag));

        let fail_on = self.fail_on.read().unwrap();
        if fail_on.contains("build") || fail_on.contains(&format!("build:{}", request.tag)) {
            return Err(HarnessError::Build {
                image: request.tag.to_string(),
                log: format!("Step 1/1 : FROM missing\nmock build failure for {}", request.tag),
            });
        }
        Ok(())
    }

    fn run_container(
        &self,
        image: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<Box<dyn ContainerProcess>> {
        self.record_command(&format!("run:{image}:{host_port}:{container_port}"));
        self.check_fail("run")?;

        if let Some(code) = *self.crash_code.read().unwrap() {
            return Ok(Box::new(MockProcess {
                exit_code: Some(code),
                server: None,
            }));
        }

        let server = match self.service.read().unwrap().clone() {
            Some(handler) => Some(
                StubServer::bind(host_port, handler)
                    .map_err(|e| HarnessError::io(format!("binding port {host_port}"), e))?,
            ),
            None => None,
        };
        self.running.write().unwrap().insert(host_port);

        Ok(Box::new(MockProcess {
            exit_code: None,
            server,
        }))
    }

    fn find_container(&self, host_port: u16) -> Result<Option<ContainerId>> {
        self.record_command(&format!("find:{host_port}"));
        self.check_fail("find")?;

        if let Some(raw) = self.container_id.read().unwrap().as_deref() {
            return ContainerId::parse(raw).map(Some);
        }
        if !self.running.read().unwrap().contains(&host_port) {
            return Ok(None);
        }
        ContainerId::parse(&format!("{host_port:012x}")).map(Some)
    }

    fn kill_container(&self, id: &ContainerId) -> Result<()> {
        self.record_command(&format!("kill:{id}"));
        self.check_fail("kill")?;

        if let Ok(port) = u16::from_str_radix(id.as_str(), 16) {
            self.running.write().unwrap().remove(&port);
        }
        Ok(())
    }

    fn remove_container(&self, id: &ContainerId) -> Result<()> {
        self.record_command(&format!("remove:{id}"));
        self.check_fail("remove")
    }
}
