use thiserror::Error;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid input to the harness itself (missing descriptor, bad config file).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The engine build exited non-zero. `log` holds the combined build output.
    #[error("building image {image} failed:\n{log}")]
    Build { image: String, log: String },

    /// The container violated the service contract.
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("container has not been started")]
    NotStarted,

    #[error("container is not ready: {0}")]
    NotReady(String),

    #[error("response has no body")]
    NoBody,

    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Connection refused or reset while talking to a container that was already reachable.
    #[error("HTTP error: {0}")]
    Transport(String),

    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error("failed to run container engine ({context}): {source}")]
    Engine {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("writing report failed: {0}")]
    Report(#[from] csv::Error),
}

impl HarnessError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
