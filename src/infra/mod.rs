pub mod config;
pub mod engine_cli;
pub mod http_client;
pub mod port;

pub use config::{HarnessConfig, load_config};
pub use engine_cli::EngineCli;
pub use http_client::{HttpClient, TransportError};
pub use port::PortAllocator;
