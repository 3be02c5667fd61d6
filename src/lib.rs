//! Coordination runtime shared by every node of the fog testbed: master,
//! remote logger and workers.
//!
//! A node resolves its identity, pumps inbound and outbound messages through
//! pools of tasks, keeps per-peer traffic statistics, runs drift-corrected
//! periodic uploads and terminates on stop requests or unrecoverable
//! network failures.

pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod message;
pub mod node;
pub mod pump;
pub mod queue;
pub mod resources;
pub mod roles;
pub mod scheduler;
pub mod shutdown;
pub mod stats;
pub mod transport;
