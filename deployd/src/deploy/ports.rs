//! Host port allocation

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::errors::EngineError;

pub const FRONTEND_PORT_FLOOR: u16 = 3001;
pub const BACKEND_PORT_FLOOR: u16 = 8080;
pub const MAX_ATTEMPTS: u16 = 100;

/// Checks whether a host port can be bound
pub trait PortProbe: Send + Sync {
    fn is_free(&self, port: u16) -> bool;
}

/// Probe binding `0.0.0.0:port` and releasing it right away
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    fn is_free(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

/// Probe backed by a fixed set of busy ports
#[derive(Debug, Default)]
pub struct StaticProbe {
    busy: Mutex<HashSet<u16>>,
}

impl StaticProbe {
    pub fn with_busy(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            busy: Mutex::new(ports.into_iter().collect()),
        }
    }

    pub fn occupy(&self, port: u16) {
        if let Ok(mut busy) = self.busy.lock() {
            busy.insert(port);
        }
    }
}

impl PortProbe for StaticProbe {
    fn is_free(&self, port: u16) -> bool {
        self.busy.lock().map(|b| !b.contains(&port)).unwrap_or(false)
    }
}

/// Hands out free host ports, keeping the preferred one whenever possible
pub struct PortAllocator {
    probe: Arc<dyn PortProbe>,
}

impl PortAllocator {
    pub fn new(probe: Arc<dyn PortProbe>) -> Self {
        Self { probe }
    }

    pub fn is_free(&self, port: u16) -> bool {
        port != 0 && self.probe.is_free(port)
    }

    /// Return `preferred` if it is free, else the first free port from `floor`.
    ///
    /// A `preferred` of 0 means "unassigned" and always scans.
    pub fn ensure_available(&self, preferred: u16, floor: u16) -> Result<u16, EngineError> {
        if self.is_free(preferred) {
            debug!("Port {} is available", preferred);
            return Ok(preferred);
        }

        let port = (0..MAX_ATTEMPTS)
            .filter_map(|offset| floor.checked_add(offset))
            .find(|port| self.probe.is_free(*port))
            .ok_or(EngineError::PortExhaustion {
                floor,
                attempts: MAX_ATTEMPTS,
            })?;

        if preferred != 0 {
            info!("Port {} is in use, reassigned to {}", preferred, port);
        }
        Ok(port)
    }
}
