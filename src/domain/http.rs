use super::error::{HarnessError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// Payload of a request sent to a container.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent unmodified.
    Raw {
        bytes: Vec<u8>,
        content_type: String,
    },
    /// Serialized as JSON, `application/json` unless overridden.
    Json {
        value: Value,
        content_type: Option<String>,
    },
}

impl RequestBody {
    pub fn raw(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self::Raw {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    pub fn json(value: Value) -> Self {
        Self::Json {
            value,
            content_type: None,
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            Self::Raw { content_type, .. } => content_type,
            Self::Json { content_type, .. } => content_type.as_deref().unwrap_or(JSON_CONTENT_TYPE),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Raw { bytes, .. } => bytes,
            Self::Json { value, .. } => value.to_string().into_bytes(),
        }
    }
}

/// Status plus the raw body of an HTTP exchange. Non-2xx bodies are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Option<Vec<u8>>,
}

impl Response {
    pub fn new(status: u16, body: Option<Vec<u8>>) -> Self {
        let body = body.filter(|bytes| !bytes.is_empty());
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        self.parse()
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.body.as_deref().ok_or(HarnessError::NoBody)?;
        Ok(serde_json::from_slice(body)?)
    }

    /// Lossy text view of the body, empty when there is none.
    pub fn text(&self) -> String {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}
