//! Shared fixtures for node runtime integration tests.
//!
//! Provides an in-memory transport that records every send and can be told
//! to fail for chosen addresses, a fixed resource probe, and a terminator
//! that records exit codes instead of exiting.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use fognode::config::NodeConfig;
use fognode::error::{FogError, Result};
use fognode::identity::Role;
use fognode::lifecycle::Terminator;
use fognode::message::{now_ms, Envelope, Message, Payload, Source};
use fognode::node::{Node, NodeBehavior, NodeContext, RunningNode};
use fognode::resources::ResourceProbe;
use fognode::transport::{Inbox, Transport};

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub const MASTER_PORT: u16 = 5000;
pub const LOGGER_PORT: u16 = 5001;

/// Config with a small pool and uploads far apart.
pub fn test_config(role: Role, port: u16) -> NodeConfig {
    NodeConfig::new(role, addr(port))
        .with_node_id(1)
        .with_master(addr(MASTER_PORT))
        .with_logger(addr(LOGGER_PORT))
        .with_thread_number(2)
        .with_upload_period(Duration::from_secs(3600))
}

#[derive(Default)]
pub struct MockTransport {
    inbox: Mutex<Option<Inbox>>,
    sent: Mutex<Vec<(SocketAddr, Envelope)>>,
    failing: Mutex<HashSet<SocketAddr>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, addr: SocketAddr) {
        self.failing.lock().insert(addr);
    }

    pub fn heal(&self, addr: SocketAddr) {
        self.failing.lock().remove(&addr);
    }

    /// Queue an envelope as if it had arrived from the network.
    pub async fn deliver(&self, envelope: Envelope, size: usize) {
        let inbox = wait_for(Duration::from_secs(2), || self.inbox.lock().clone())
            .await
            .expect("node never started listening");
        inbox.push((envelope, size));
    }

    pub fn sent(&self) -> Vec<(SocketAddr, Envelope)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, to: SocketAddr, kind: &str) -> Vec<Envelope> {
        self.sent
            .lock()
            .iter()
            .filter(|(a, e)| *a == to && e.kind == kind)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn listen(&self, _addr: SocketAddr, inbox: Inbox) -> Result<()> {
        *self.inbox.lock() = Some(inbox);
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn send(&self, to: SocketAddr, envelope: &Envelope) -> Result<()> {
        if self.failing.lock().contains(&to) {
            return Err(FogError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.sent.lock().push((to, envelope.clone()));
        Ok(())
    }
}

pub struct FixedProbe {
    pub machine_id: String,
}

impl FixedProbe {
    pub fn new(machine_id: &str) -> Arc<Self> {
        Arc::new(Self {
            machine_id: machine_id.to_string(),
        })
    }
}

impl ResourceProbe for FixedProbe {
    fn machine_id(&self) -> String {
        self.machine_id.clone()
    }

    fn snapshot(&self) -> Value {
        json!({ "machineId": self.machine_id, "cpu": { "cores": 4 } })
    }
}

/// Terminator that records exit codes.
pub fn recording_terminator() -> (Terminator, Arc<Mutex<Vec<i32>>>) {
    let exits = Arc::new(Mutex::new(Vec::new()));
    let recorder = exits.clone();
    let terminator: Terminator = Arc::new(move |code| recorder.lock().push(code));
    (terminator, exits)
}

/// Behavior that keeps every message handed to the application layer.
#[derive(Default)]
pub struct RecordingBehavior {
    pub received: Mutex<Vec<Message>>,
}

impl RecordingBehavior {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kinds(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .map(|m| m.kind().to_string())
            .collect()
    }
}

#[async_trait]
impl NodeBehavior for RecordingBehavior {
    async fn run(&self, _ctx: &NodeContext) -> Result<()> {
        Ok(())
    }

    async fn handle_message(&self, _ctx: &NodeContext, message: Message) {
        self.received.lock().push(message);
    }
}

pub struct TestNode {
    pub running: RunningNode,
    pub transport: Arc<MockTransport>,
    pub exits: Arc<Mutex<Vec<i32>>>,
}

impl TestNode {
    pub fn ctx(&self) -> &NodeContext {
        self.running.context()
    }
}

pub fn build_node(config: NodeConfig, behavior: Arc<dyn NodeBehavior>) -> (Node, Arc<MockTransport>, Arc<Mutex<Vec<i32>>>) {
    let transport = MockTransport::new();
    let (terminator, exits) = recording_terminator();
    let machine_id = format!("machine-{}", config.listen_addr.port());
    let node = Node::builder(config, behavior)
        .transport(transport.clone())
        .probe(FixedProbe::new(&machine_id))
        .terminator(terminator)
        .build()
        .expect("valid test config");
    (node, transport, exits)
}

pub fn start_node(config: NodeConfig, behavior: Arc<dyn NodeBehavior>) -> TestNode {
    let (node, transport, exits) = build_node(config, behavior);
    TestNode {
        running: node.start(),
        transport,
        exits,
    }
}

/// Source stamp for a named remote peer.
pub fn peer(role: Role, name: &str, port: u16) -> Source {
    Source {
        role: Some(role),
        id: Some(7),
        addr: addr(port),
        name: Some(name.to_string()),
        name_log_printing: Some(format!("{}-7", name)),
        name_consistent: Some(format!("{}#peer-{}", name, port)),
        machine_id: format!("peer-{}", port),
    }
}

pub fn envelope(source: Source, payload: Payload) -> Envelope {
    Envelope::new(payload, source, now_ms()).unwrap()
}

/// Poll `check` until it yields a value or the timeout expires.
pub async fn wait_for<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    wait_for(timeout, || check().then_some(())).await.is_some()
}
