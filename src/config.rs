use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{FogError, Result};
use crate::identity::Role;

/// Period shared by the built-in upload tasks.
pub const DEFAULT_UPLOAD_PERIOD: Duration = Duration::from_secs(10);

/// Construction-time configuration for a node.
///
/// Every participant (master, remote logger, worker) is built from the same
/// structure; only `role` and `node_id` decide how identity is resolved.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Role hint. Master and RemoteLogger assign their own identity, every
    /// other role waits for a `registered` message from the master.
    pub role: Role,
    /// Numeric id used by authoritative roles. Ignored for workers.
    pub node_id: u64,
    pub listen_addr: SocketAddr,
    pub master_addr: SocketAddr,
    pub logger_addr: SocketAddr,
    /// Number of receiver tasks, and separately of sender tasks.
    pub thread_number: usize,
    /// Drop failed sends silently instead of escalating them.
    pub ignore_socket_err: bool,
    pub upload_period: Duration,
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::Worker,
            node_id: 0,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5002)),
            master_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            logger_addr: SocketAddr::from(([127, 0, 0, 1], 5001)),
            thread_number: 32,
            ignore_socket_err: false,
            upload_period: DEFAULT_UPLOAD_PERIOD,
            log_level: "debug".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn new(role: Role, listen_addr: SocketAddr) -> Self {
        Self {
            role,
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_node_id(mut self, node_id: u64) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_master(mut self, addr: SocketAddr) -> Self {
        self.master_addr = addr;
        self
    }

    pub fn with_logger(mut self, addr: SocketAddr) -> Self {
        self.logger_addr = addr;
        self
    }

    pub fn with_thread_number(mut self, thread_number: usize) -> Self {
        self.thread_number = thread_number;
        self
    }

    pub fn with_ignore_socket_err(mut self, ignore: bool) -> Self {
        self.ignore_socket_err = ignore;
        self
    }

    pub fn with_upload_period(mut self, period: Duration) -> Self {
        self.upload_period = period;
        self
    }

    /// Reject settings the pump and scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.thread_number == 0 {
            return Err(FogError::InvalidConfig(
                "thread_number must be at least 1".to_string(),
            ));
        }
        if self.upload_period.is_zero() {
            return Err(FogError::InvalidConfig(
                "upload_period must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
