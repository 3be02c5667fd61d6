//! The message pump: receiver tasks drain the inbound queue and dispatch,
//! sender tasks drain the outbound queue and transmit.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::identity::IdentityCell;
use crate::message::{now_ms, Envelope, Message, Payload, Source};
use crate::node::{NodeBehavior, NodeContext};
use crate::queue::WorkQueue;
use crate::transport::{Inbox, Transport};

pub const NETWORK_ERROR: &str = "Network Error.";

/// A stamped envelope and its destination.
pub type Outbound = (Envelope, SocketAddr);

/// Enqueue side of the outbound queue.
///
/// Envelopes are stamped with the current identity and `sentAt` when they
/// are queued, so the delay a peer measures includes time spent waiting here.
#[derive(Debug, Clone)]
pub struct Outbox {
    queue: WorkQueue<Outbound>,
    identity: IdentityCell,
    addr: SocketAddr,
    machine_id: Arc<str>,
}

impl Outbox {
    pub fn new(identity: IdentityCell, addr: SocketAddr, machine_id: &str) -> Self {
        Self {
            queue: WorkQueue::new(),
            identity,
            addr,
            machine_id: Arc::from(machine_id),
        }
    }

    pub fn queue(&self) -> &WorkQueue<Outbound> {
        &self.queue
    }

    fn source(&self) -> Source {
        match self.identity.get() {
            Some(identity) => Source::from(identity.as_ref()),
            None => Source::unresolved(self.addr, &self.machine_id),
        }
    }

    pub fn send(&self, payload: Payload, addr: SocketAddr) {
        let kind = payload.kind().to_string();
        match Envelope::new(payload, self.source(), now_ms()) {
            Ok(envelope) => self.queue.push((envelope, addr)),
            Err(e) => {
                tracing::error!(kind = %kind, addr = %addr, error = %e, "Failed to encode message");
            }
        }
    }
}

pub(crate) fn spawn_receivers(
    count: usize,
    ctx: &NodeContext,
    behavior: &Arc<dyn NodeBehavior>,
    inbox: &Inbox,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let ctx = ctx.clone();
            let behavior = behavior.clone();
            let inbox = inbox.clone();
            tokio::spawn(async move { receive_loop(ctx, behavior, inbox).await })
        })
        .collect()
}

pub(crate) fn spawn_senders(
    count: usize,
    ctx: &NodeContext,
    transport: &Arc<dyn Transport>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let ctx = ctx.clone();
            let transport = transport.clone();
            tokio::spawn(async move { send_loop(ctx, transport).await })
        })
        .collect()
}

async fn receive_loop(ctx: NodeContext, behavior: Arc<dyn NodeBehavior>, inbox: Inbox) {
    let token = ctx.lifecycle().token().clone();
    loop {
        let inbound = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            item = inbox.pop() => item,
        };
        let Some((envelope, size)) = inbound else {
            break;
        };

        let message = envelope.into_message(now_ms());
        ctx.record_inbound(&message, size);
        dispatch(&ctx, behavior.as_ref(), message).await;
    }
}

/// Built-in types are consumed here and never reach the behavior.
async fn dispatch(ctx: &NodeContext, behavior: &dyn NodeBehavior, message: Message) {
    match message.payload {
        Payload::ResourcesQuery => handle_resources_query(ctx, &message.source),
        Payload::Stop { ref reason } => ctx.lifecycle().on_stop(&message.source, reason),
        _ => behavior.handle_message(ctx, message).await,
    }
}

fn handle_resources_query(ctx: &NodeContext, from: &Source) {
    if from.addr != ctx.config().master_addr {
        tracing::debug!(peer = %from.addr, "Ignoring resources query from non-master");
        return;
    }
    ctx.send(
        Payload::NodeResources {
            resources: ctx.resources(),
        },
        from.addr,
    );
}

async fn send_loop(ctx: NodeContext, transport: Arc<dyn Transport>) {
    let token = ctx.lifecycle().token().clone();
    let queue = ctx.outbox().queue().clone();
    loop {
        let outbound = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            item = queue.pop() => item,
        };
        let Some((envelope, addr)) = outbound else {
            break;
        };

        let Err(e) = transport.send(addr, &envelope).await else {
            continue;
        };
        if ctx.config().ignore_socket_err {
            tracing::debug!(addr = %addr, error = %e, "Send failed, ignored");
            continue;
        }
        let master_addr = ctx.config().master_addr;
        if addr == master_addr {
            ctx.lifecycle().on_master_unreachable();
            break;
        }
        tracing::warn!(addr = %addr, kind = %envelope.kind, error = %e, "Send failed, notifying master");
        ctx.send(Payload::exit(NETWORK_ERROR), master_addr);
    }
}
