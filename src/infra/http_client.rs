use crate::domain::{HarnessError, Method, RequestBody, Response, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Why an exchange with a container failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing is listening yet: connection refused, reset or timed out while connecting.
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// Something answered, but not with well-formed HTTP.
    #[error("malformed HTTP exchange: {0}")]
    Malformed(String),
}

/// Blocking HTTP client used for probes and check requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .no_proxy()
            .build()
            .map_err(|e| HarnessError::Configuration(format!("creating HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn send(
        &self,
        url: &str,
        method: Method,
        body: Option<RequestBody>,
    ) -> std::result::Result<Response, TransportError> {
        let mut request = self.client.request(to_reqwest(method), url);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, body.content_type().to_string())
                .body(body.into_bytes());
        }

        let response = request.send().map_err(classify)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().map_err(classify)?;
        Ok(Response::new(status, Some(bytes.to_vec())))
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    let not_listening = error.is_connect()
        || io_kind(&error).is_some_and(|kind| {
            matches!(
                kind,
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            )
        });

    let reason = describe(&error);
    if not_listening {
        TransportError::Unreachable(reason)
    } else {
        TransportError::Malformed(reason)
    }
}

fn io_kind(error: &(dyn StdError + 'static)) -> Option<ErrorKind> {
    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = inner.source();
    }
    None
}

fn describe(error: &(dyn StdError + 'static)) -> String {
    let mut reason = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        reason.push_str(": ");
        reason.push_str(&inner.to_string());
        source = inner.source();
    }
    reason
}
