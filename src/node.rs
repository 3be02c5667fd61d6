use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::identity::{Assignment, Identity, IdentityCell, Role};
use crate::lifecycle::{process_exit, Lifecycle, Terminator};
use crate::message::{Message, Payload, Source};
use crate::pump::{self, Outbox};
use crate::resources::{ResourceProbe, SystemProbe};
use crate::scheduler::{spawn_periodic, PeriodicTask};
use crate::shutdown::install_interrupt_handler;
use crate::stats::{PeerStats, StatKind};
use crate::transport::{Inbox, TcpTransport, Transport};

/// Role-specific behavior plugged into the shared node runtime.
#[async_trait]
pub trait NodeBehavior: Send + Sync + 'static {
    /// Application entry point, called once the pump is running.
    async fn run(&self, ctx: &NodeContext) -> Result<()>;

    /// Every message type the runtime does not consume itself.
    async fn handle_message(&self, _ctx: &NodeContext, _message: Message) {}
}

struct ContextInner {
    config: NodeConfig,
    identity: IdentityCell,
    machine_id: String,
    stats: PeerStats,
    outbox: Outbox,
    lifecycle: Lifecycle,
    probe: Arc<dyn ResourceProbe>,
}

/// Shared handle to the runtime state of one node.
#[derive(Clone)]
pub struct NodeContext {
    inner: Arc<ContextInner>,
}

impl NodeContext {
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> &IdentityCell {
        &self.inner.identity
    }

    pub fn machine_id(&self) -> &str {
        &self.inner.machine_id
    }

    pub fn stats(&self) -> &PeerStats {
        &self.inner.stats
    }

    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    pub fn resources(&self) -> Value {
        self.inner.probe.snapshot()
    }

    pub fn send(&self, payload: Payload, addr: SocketAddr) {
        self.inner.outbox.send(payload, addr);
    }

    pub fn send_to_master(&self, payload: Payload) {
        self.send(payload, self.inner.config.master_addr);
    }

    pub fn send_to_logger(&self, payload: Payload) {
        self.send(payload, self.inner.config.logger_addr);
    }

    /// Resolve a worker-like identity from the master's assignment.
    pub fn resolve_assignment(&self, assignment: &Assignment) -> Result<Arc<Identity>> {
        let identity = Identity::from_assignment(
            assignment,
            self.inner.config.listen_addr,
            &self.inner.machine_id,
        );
        self.inner.identity.set(identity)
    }

    /// True when `source` carries this node's consistent name. Two nodes
    /// that are both still unnamed also compare equal.
    pub fn is_self(&self, source: &Source) -> bool {
        let own = self.inner.identity.get();
        source.name_consistent.as_deref() == own.as_ref().map(|i| i.consistent_name.as_str())
    }

    pub(crate) fn record_inbound(&self, message: &Message, size: usize) {
        if self.is_self(&message.source) {
            return;
        }
        let stats = &self.inner.stats;
        stats.observe(StatKind::ReceivedSize, &message.source, size as f64);
        stats.observe(StatKind::Delay, &message.source, message.delay);
    }
}

/// Builder for [`Node`]; TCP transport, `sysinfo` probe and process exit
/// are the defaults.
pub struct NodeBuilder {
    config: NodeConfig,
    behavior: Arc<dyn NodeBehavior>,
    transport: Arc<dyn Transport>,
    probe: Arc<dyn ResourceProbe>,
    terminator: Terminator,
}

impl NodeBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn build(self) -> Result<Node> {
        self.config.validate()?;
        let machine_id = self.probe.machine_id();
        let config = self.config;

        let identity =
            match Identity::resolve(config.role, config.node_id, None, config.listen_addr, &machine_id) {
                Some(identity) => IdentityCell::resolved(identity),
                None => IdentityCell::new(),
            };
        let outbox = Outbox::new(identity.clone(), config.listen_addr, &machine_id);
        let lifecycle = Lifecycle::new(
            outbox.clone(),
            identity.clone(),
            config.master_addr,
            self.terminator,
        );

        let ctx = NodeContext {
            inner: Arc::new(ContextInner {
                config,
                identity,
                machine_id,
                stats: PeerStats::new(),
                outbox,
                lifecycle,
                probe: self.probe,
            }),
        };

        Ok(Node {
            tasks: builtin_tasks(&ctx),
            ctx,
            behavior: self.behavior,
            transport: self.transport,
            inbox: Inbox::new(),
        })
    }
}

/// Resource upload for every role; statistics uploads for every role except
/// the logger, which would otherwise report about itself to itself.
fn builtin_tasks(ctx: &NodeContext) -> Vec<PeriodicTask> {
    let period = ctx.config().upload_period;

    let resources_ctx = ctx.clone();
    let mut tasks = vec![PeriodicTask::new("upload-resources", period, move || {
        resources_ctx.send_to_logger(Payload::NodeResources {
            resources: resources_ctx.resources(),
        });
    })];

    if ctx.config().role != Role::RemoteLogger {
        let size_ctx = ctx.clone();
        tasks.push(PeriodicTask::new("upload-received-size", period, move || {
            let averages = size_ctx.stats().snapshot(StatKind::ReceivedSize);
            size_ctx.send_to_logger(Payload::AverageReceivedPackageSize(averages));
        }));
        let delay_ctx = ctx.clone();
        tasks.push(PeriodicTask::new("upload-delays", period, move || {
            let delays = delay_ctx.stats().snapshot(StatKind::Delay);
            delay_ctx.send_to_logger(Payload::Delays(delays));
        }));
    }
    tasks
}

/// A node that has not started yet.
pub struct Node {
    ctx: NodeContext,
    behavior: Arc<dyn NodeBehavior>,
    transport: Arc<dyn Transport>,
    tasks: Vec<PeriodicTask>,
    inbox: Inbox,
}

impl Node {
    pub fn builder(config: NodeConfig, behavior: Arc<dyn NodeBehavior>) -> NodeBuilder {
        NodeBuilder {
            config,
            behavior,
            transport: Arc::new(TcpTransport::new()),
            probe: Arc::new(SystemProbe::new()),
            terminator: process_exit(),
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Register an extra periodic task. The task list is fixed once the
    /// node starts.
    pub fn add_periodic_task(&mut self, task: PeriodicTask) {
        self.tasks.push(task);
    }

    pub fn periodic_tasks(&self) -> &[PeriodicTask] {
        &self.tasks
    }

    /// Spawn the listener, the pump and the periodic tasks.
    pub fn start(self) -> RunningNode {
        let ctx = self.ctx;
        let threads = ctx.config().thread_number;
        let token = ctx.lifecycle().token().clone();
        let mut handles = Vec::new();

        let listen_ctx = ctx.clone();
        let transport = self.transport.clone();
        let inbox = self.inbox.clone();
        handles.push(tokio::spawn(async move {
            let addr = listen_ctx.config().listen_addr;
            if let Err(e) = transport.listen(addr, inbox).await {
                tracing::error!(addr = %addr, error = %e, "Listener failed");
                listen_ctx.lifecycle().on_fatal("listener failed");
            }
        }));

        handles.extend(pump::spawn_receivers(threads, &ctx, &self.behavior, &self.inbox));
        handles.extend(pump::spawn_senders(threads, &ctx, &self.transport));

        for task in self.tasks {
            handles.push(spawn_periodic(task, ctx.identity().clone(), token.clone()));
        }

        tracing::info!(
            role = %ctx.config().role,
            addr = %ctx.config().listen_addr,
            threads,
            "Node started"
        );

        RunningNode {
            ctx,
            behavior: self.behavior,
            handles,
        }
    }

    /// Start the node, install the interrupt handler, run the behavior and
    /// block until the node terminates.
    pub async fn run(self) -> Result<()> {
        let running = self.start();
        let interrupt = install_interrupt_handler(running.ctx.lifecycle().clone())?;

        let result = running.behavior.run(&running.ctx).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Node behavior failed");
            interrupt.abort();
            return result;
        }
        running.ctx.lifecycle().token().cancelled().await;
        interrupt.abort();
        Ok(())
    }
}

/// Handle to a started node. Dropping it aborts every node task.
pub struct RunningNode {
    ctx: NodeContext,
    behavior: Arc<dyn NodeBehavior>,
    handles: Vec<JoinHandle<()>>,
}

impl RunningNode {
    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub async fn run_behavior(&self) -> Result<()> {
        self.behavior.run(&self.ctx).await
    }
}

impl Drop for RunningNode {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
