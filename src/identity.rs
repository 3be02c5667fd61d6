//! Node identity and the one-shot "identity resolved" gate.
//!
//! Master and RemoteLogger assign themselves an identity at construction.
//! Every other role starts unresolved and receives its names from the
//! master's `registered` reply. Once set, an identity never changes.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{FogError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Master,
    RemoteLogger,
    Worker,
    User,
}

impl Role {
    /// Roles that assign their own identity instead of waiting for the master.
    pub fn is_authoritative(self) -> bool {
        matches!(self, Role::Master | Role::RemoteLogger)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "Master"),
            Role::RemoteLogger => write!(f, "RemoteLogger"),
            Role::Worker => write!(f, "Worker"),
            Role::User => write!(f, "User"),
        }
    }
}

/// Names handed to a worker by the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub name: String,
    pub name_log_printing: String,
    pub name_consistent: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    pub id: Option<u64>,
    pub addr: SocketAddr,
    pub name: String,
    /// Name used in log lines, e.g. `Master-1`.
    pub log_name: String,
    /// `role#machineId`; stable across restarts, identifies self-originated traffic.
    pub consistent_name: String,
    pub machine_id: String,
}

impl Identity {
    pub fn authoritative(role: Role, id: u64, addr: SocketAddr, machine_id: &str) -> Result<Self> {
        if !role.is_authoritative() {
            return Err(FogError::NotAuthoritative(role));
        }
        let name = role.to_string();
        Ok(Self {
            role,
            id: Some(id),
            addr,
            log_name: format!("{}-{}", name, id),
            consistent_name: format!("{}#{}", name, machine_id),
            name,
            machine_id: machine_id.to_string(),
        })
    }

    pub fn from_assignment(assignment: &Assignment, addr: SocketAddr, machine_id: &str) -> Self {
        Self {
            role: assignment.role.unwrap_or(Role::Worker),
            id: assignment.id,
            addr,
            name: assignment.name.clone(),
            log_name: assignment.name_log_printing.clone(),
            consistent_name: assignment.name_consistent.clone(),
            machine_id: machine_id.to_string(),
        }
    }

    /// Resolve from a role hint and, for non-authoritative roles, an assignment.
    ///
    /// Returns `None` while a worker-like role still waits for its assignment.
    pub fn resolve(
        role: Role,
        id: u64,
        assignment: Option<&Assignment>,
        addr: SocketAddr,
        machine_id: &str,
    ) -> Option<Self> {
        if role.is_authoritative() {
            return Self::authoritative(role, id, addr, machine_id).ok();
        }
        assignment.map(|a| Self::from_assignment(a, addr, machine_id))
    }
}

/// Write-once identity slot with a broadcast "resolved" signal.
///
/// Any number of tasks may wait before or after resolution; all of them
/// observe the same value and none returns early.
#[derive(Debug, Clone)]
pub struct IdentityCell {
    tx: Arc<watch::Sender<Option<Arc<Identity>>>>,
}

impl Default for IdentityCell {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn resolved(identity: Identity) -> Self {
        let (tx, _rx) = watch::channel(Some(Arc::new(identity)));
        Self { tx: Arc::new(tx) }
    }

    /// Store the identity. Fails if one was already stored.
    pub fn set(&self, identity: Identity) -> Result<Arc<Identity>> {
        let identity = Arc::new(identity);
        let stored = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(identity.clone());
            true
        });
        if stored {
            tracing::info!(name = %identity.log_name, role = %identity.role, "Identity resolved");
            Ok(identity)
        } else {
            Err(FogError::IdentityAlreadyResolved)
        }
    }

    pub fn get(&self) -> Option<Arc<Identity>> {
        self.tx.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.tx.borrow().as_ref().map(|identity| identity.role)
    }

    /// Block until the identity is set, then return it.
    pub async fn wait(&self) -> Arc<Identity> {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(identity) = current {
                return identity;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
