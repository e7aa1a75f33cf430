use crate::domain::{HarnessError, Result};
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Mutex, PoisonError};

const MAX_ATTEMPTS: usize = 64;

/// Hands out ephemeral loopback ports.
///
/// The port is only free at the moment it is returned; nothing reserves it until the
/// engine binds it. Ports already handed out by this allocator are never repeated.
#[derive(Debug, Default)]
pub struct PortAllocator {
    issued: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> Result<u16> {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);

        for _ in 0..MAX_ATTEMPTS {
            let port = free_port()?;
            if issued.insert(port) {
                return Ok(port);
            }
        }

        Err(HarnessError::Configuration(format!(
            "no unused port found after {MAX_ATTEMPTS} attempts"
        )))
    }
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(|e| HarnessError::io("binding an ephemeral port", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| HarnessError::io("reading the ephemeral port", e))?
        .port();
    drop(listener);
    Ok(port)
}
