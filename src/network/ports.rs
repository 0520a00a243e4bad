use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener};

use tracing::{debug, warn};

use crate::config::DEFAULT_PORT_SCAN_LIMIT;
use crate::{CasterError, Result};

/// Source of bindable ports, so the controller can be driven with fixed ports.
pub trait AllocatePort: Send + Sync {
    fn allocate(&self, start_port: u16) -> Result<u16>;
}

#[derive(Debug, Clone)]
pub struct PortAllocator {
    scan_limit: u16,
}

impl PortAllocator {
    pub fn new(scan_limit: u16) -> Self {
        Self {
            scan_limit: scan_limit.max(1),
        }
    }

    pub fn scan_limit(&self) -> u16 {
        self.scan_limit
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_SCAN_LIMIT)
    }
}

impl AllocatePort for PortAllocator {
    /// Scan upward from `start_port` and return the first port that binds.
    ///
    /// Only address-in-use moves the scan forward; any other bind error ends
    /// it immediately. Port 0 is refused, the OS would pick an arbitrary one.
    fn allocate(&self, start_port: u16) -> Result<u16> {
        if start_port == 0 {
            return Err(CasterError::PortProbe {
                port: 0,
                source: std::io::Error::new(ErrorKind::InvalidInput, "port 0 is not a fixed port"),
            });
        }
        let end = (start_port as u32 + self.scan_limit as u32).min(u16::MAX as u32 + 1);

        for candidate in start_port as u32..end {
            let port = candidate as u16;
            match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
                Ok(listener) => {
                    drop(listener);
                    debug!("Port {} is available", port);
                    return Ok(port);
                }
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    debug!("Port {} in use, trying next", port);
                }
                Err(e) => {
                    warn!("Port scan aborted at {}: {}", port, e);
                    return Err(CasterError::PortProbe { port, source: e });
                }
            }
        }

        Err(CasterError::AllocationExhausted {
            start: start_port,
            end,
        })
    }
}
