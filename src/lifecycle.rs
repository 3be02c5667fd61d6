use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::identity::IdentityCell;
use crate::message::{Payload, Source};
use crate::pump::Outbox;

/// Exit status used for every error termination.
pub const EXIT_FAILURE: i32 = 1;

pub const MANUALLY_INTERRUPTED: &str = "Manually interrupted.";

/// Terminal action invoked with the process exit code.
pub type Terminator = Arc<dyn Fn(i32) + Send + Sync>;

/// Terminate the process immediately. Queued messages are discarded.
pub fn process_exit() -> Terminator {
    Arc::new(|code| std::process::exit(code))
}

/// Decides what happens on operator interrupts, remote stop requests and
/// fatal send failures.
///
/// Termination cancels the node's token first, then calls the terminator.
/// With the default terminator the process is gone before anything observes
/// the token; a non-exiting terminator turns termination into a drain.
#[derive(Clone)]
pub struct Lifecycle {
    outbox: Outbox,
    identity: IdentityCell,
    master_addr: SocketAddr,
    terminator: Terminator,
    token: CancellationToken,
}

impl Lifecycle {
    pub fn new(
        outbox: Outbox,
        identity: IdentityCell,
        master_addr: SocketAddr,
        terminator: Terminator,
    ) -> Self {
        Self {
            outbox,
            identity,
            master_addr,
            terminator,
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Operator interrupt. Master and RemoteLogger exit at once; every other
    /// role tells the master it is leaving and keeps running.
    pub fn on_interrupt(&self) {
        tracing::info!("[*] Exiting ...");
        if self.identity.role().is_some_and(|role| role.is_authoritative()) {
            self.terminate(0);
            return;
        }
        self.outbox
            .send(Payload::exit(MANUALLY_INTERRUPTED), self.master_addr);
    }

    /// Remote `stop` request. No acknowledgement is sent.
    pub fn on_stop(&self, from: &Source, reason: &str) {
        tracing::warn!("{} asks me to stop. Reason: {}", from.log_name(), reason);
        tracing::info!("Exit.");
        self.terminate(0);
    }

    pub fn on_master_unreachable(&self) {
        tracing::warn!("Cannot connect to the system. Exit.");
        self.terminate(EXIT_FAILURE);
    }

    /// Any other condition the node cannot run without.
    pub fn on_fatal(&self, reason: &str) {
        tracing::error!(reason, "Fatal error. Exit.");
        self.terminate(EXIT_FAILURE);
    }

    fn terminate(&self, code: i32) {
        self.token.cancel();
        (self.terminator)(code);
    }
}
