use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::identity::Role;
use crate::message::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    ReceivedSize,
    Delay,
}

/// Running mean of one statistic for one remote peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Average {
    pub addr: SocketAddr,
    pub name: Option<String>,
    pub name_log_printing: Option<String>,
    pub name_consistent: Option<String>,
    pub role: Option<Role>,
    pub id: Option<u64>,
    pub machine_id: String,
    pub count: u64,
    pub average: f64,
}

impl Average {
    pub fn new(peer: &Source) -> Self {
        Self {
            addr: peer.addr,
            name: peer.name.clone(),
            name_log_printing: peer.name_log_printing.clone(),
            name_consistent: peer.name_consistent.clone(),
            role: peer.role,
            id: peer.id,
            machine_id: peer.machine_id.clone(),
            count: 0,
            average: 0.0,
        }
    }

    pub fn update(&mut self, sample: f64) {
        self.average += (sample - self.average) / (self.count + 1) as f64;
        self.count += 1;
    }
}

/// Per-peer received-size and delay averages.
///
/// Entries are created on first sight of a peer and never removed.
#[derive(Debug, Default)]
pub struct PeerStats {
    received_size: Mutex<HashMap<String, Average>>,
    delays: Mutex<HashMap<String, Average>>,
}

impl PeerStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: StatKind) -> &Mutex<HashMap<String, Average>> {
        match kind {
            StatKind::ReceivedSize => &self.received_size,
            StatKind::Delay => &self.delays,
        }
    }

    /// Peers that have not been named yet are keyed by address.
    pub fn peer_key(peer: &Source) -> String {
        peer.name.clone().unwrap_or_else(|| peer.addr.to_string())
    }

    pub fn observe(&self, kind: StatKind, peer: &Source, sample: f64) {
        let mut map = self.map(kind).lock();
        map.entry(Self::peer_key(peer))
            .or_insert_with(|| Average::new(peer))
            .update(sample);
    }

    pub fn snapshot(&self, kind: StatKind) -> BTreeMap<String, Average> {
        self.map(kind)
            .lock()
            .iter()
            .map(|(name, avg)| (name.clone(), avg.clone()))
            .collect()
    }

    pub fn get(&self, kind: StatKind, peer: &str) -> Option<Average> {
        self.map(kind).lock().get(peer).cloned()
    }
}
