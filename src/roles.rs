//! Behaviors for the three participants of a testbed deployment.
//!
//! The master only hands out worker identities here; task placement lives
//! outside the node runtime.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::Result;
use crate::identity::{Assignment, Role};
use crate::message::{Message, Payload};
use crate::node::{NodeBehavior, NodeContext};

#[derive(Debug, Default)]
pub struct MasterBehavior {
    last_worker_id: AtomicU64,
}

impl MasterBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every worker gets its own `name`, which peers key statistics by.
    fn next_assignment(&self, machine_id: &str) -> Assignment {
        let id = self.last_worker_id.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("{}-{}", Role::Worker, id);
        Assignment {
            name_log_printing: name.clone(),
            name_consistent: format!("{}#{}", Role::Worker, machine_id),
            name,
            role: Some(Role::Worker),
            id: Some(id),
        }
    }
}

#[async_trait]
impl NodeBehavior for MasterBehavior {
    async fn run(&self, ctx: &NodeContext) -> Result<()> {
        tracing::info!(addr = %ctx.config().listen_addr, "[*] Master serves");
        Ok(())
    }

    async fn handle_message(&self, ctx: &NodeContext, message: Message) {
        match message.payload {
            Payload::Register => {
                let assignment = self.next_assignment(&message.source.machine_id);
                tracing::info!(
                    peer = %message.source.addr,
                    name = %assignment.name_log_printing,
                    "Worker registered"
                );
                ctx.send(Payload::Registered(assignment), message.source.addr);
            }
            Payload::Exit { reason } => {
                tracing::info!(peer = %message.source.log_name(), reason = %reason, "Node exited");
            }
            other => {
                tracing::debug!(peer = %message.source.log_name(), kind = %other.kind(), "Unhandled message");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggerBehavior;

impl LoggerBehavior {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeBehavior for LoggerBehavior {
    async fn run(&self, ctx: &NodeContext) -> Result<()> {
        tracing::info!(addr = %ctx.config().listen_addr, "[*] Remote logger serves");
        Ok(())
    }

    async fn handle_message(&self, _ctx: &NodeContext, message: Message) {
        let peer = message.source.log_name();
        match message.payload {
            Payload::NodeResources { resources } => {
                tracing::info!(peer = %peer, resources = %resources, "Node resources");
            }
            Payload::AverageReceivedPackageSize(averages) => {
                for (from, avg) in averages {
                    tracing::info!(
                        peer = %peer,
                        from = %from,
                        bytes = avg.average,
                        count = avg.count,
                        "Average received package size"
                    );
                }
            }
            Payload::Delays(delays) => {
                for (from, avg) in delays {
                    tracing::info!(
                        peer = %peer,
                        from = %from,
                        delay_ms = avg.average,
                        count = avg.count,
                        "Average delay"
                    );
                }
            }
            Payload::Exit { reason } => {
                tracing::info!(peer = %peer, reason = %reason, "Node exited");
            }
            other => {
                tracing::debug!(peer = %peer, kind = %other.kind(), "Unhandled message");
            }
        }
    }
}

/// Registers with the master and adopts the identity it hands back.
#[derive(Debug, Default)]
pub struct WorkerBehavior;

impl WorkerBehavior {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeBehavior for WorkerBehavior {
    async fn run(&self, ctx: &NodeContext) -> Result<()> {
        tracing::info!(master = %ctx.config().master_addr, "Registering with master");
        ctx.send_to_master(Payload::Register);
        Ok(())
    }

    async fn handle_message(&self, ctx: &NodeContext, message: Message) {
        match message.payload {
            Payload::Registered(assignment) => {
                if let Err(e) = ctx.resolve_assignment(&assignment) {
                    tracing::warn!(error = %e, "Ignoring repeated assignment");
                }
            }
            other => {
                tracing::debug!(peer = %message.source.log_name(), kind = %other.kind(), "Unhandled message");
            }
        }
    }
}
