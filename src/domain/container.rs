use super::error::{HarnessError, Result};
use std::fmt;

/// Lifecycle of a container spawned by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Process not yet spawned.
    Created,
    /// Process spawned, readiness unknown.
    Starting,
    /// Root endpoint answered once. Never left except through teardown.
    Ready,
    /// The process exited on its own before becoming reachable.
    Crashed,
    Stopped,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Crashed => "crashed",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Short identifier the engine daemon assigns to a running container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub const LENGTH: usize = 12;

    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim();
        if id.len() != Self::LENGTH || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(HarnessError::InvalidContainer(format!(
                "engine returned malformed container id {id:?} (expected {} characters)",
                Self::LENGTH
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of waiting on the local engine client process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(Option<i32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_ids() {
        let id = ContainerId::parse("3f2a9c81b0de\n").unwrap();
        assert_eq!(id.as_str(), "3f2a9c81b0de");
        assert_eq!(id.to_string(), "3f2a9c81b0de");
    }

    #[test]
    fn rejects_ids_of_the_wrong_length() {
        for raw in ["3f2a9c81b0", "3f2a9c81b0de3f2a9c81b0de", "3f2a9c81b0de\n7a6b5c4d3e2f"] {
            let err = ContainerId::parse(raw).unwrap_err();
            assert!(matches!(err, HarnessError::InvalidContainer(_)), "{raw:?}");
        }
    }
}
