//! Wire schema shared by every node.
//!
//! On the wire a message is a flat JSON object: `type`, `source`, `_sentAt`
//! and any number of type-specific fields. Inside the runtime the fields
//! are decoded into [`Payload`]; types the runtime does not know stay as
//! [`Payload::Other`] and reach the application handler unchanged.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::identity::{Assignment, Identity, Role};
use crate::stats::Average;

pub const RESOURCES_QUERY: &str = "resourcesQuery";
pub const STOP: &str = "stop";
pub const EXIT: &str = "exit";
pub const NODE_RESOURCES: &str = "nodeResources";
pub const AVERAGE_RECEIVED_PACKAGE_SIZE: &str = "averageReceivedPackageSize";
pub const DELAYS: &str = "delays";
pub const REGISTER: &str = "register";
pub const REGISTERED: &str = "registered";

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Identity stamp attached to every outbound message.
///
/// Name fields stay empty while the sender is still waiting for its
/// assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub role: Option<Role>,
    pub id: Option<u64>,
    pub addr: SocketAddr,
    pub name: Option<String>,
    pub name_log_printing: Option<String>,
    pub name_consistent: Option<String>,
    pub machine_id: String,
}

impl Source {
    pub fn unresolved(addr: SocketAddr, machine_id: &str) -> Self {
        Self {
            role: None,
            id: None,
            addr,
            name: None,
            name_log_printing: None,
            name_consistent: None,
            machine_id: machine_id.to_string(),
        }
    }

    pub fn log_name(&self) -> String {
        self.name_log_printing
            .clone()
            .unwrap_or_else(|| self.addr.to_string())
    }
}

impl From<&Identity> for Source {
    fn from(identity: &Identity) -> Self {
        Self {
            role: Some(identity.role),
            id: identity.id,
            addr: identity.addr,
            name: Some(identity.name.clone()),
            name_log_printing: Some(identity.log_name.clone()),
            name_consistent: Some(identity.consistent_name.clone()),
            machine_id: identity.machine_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    ResourcesQuery,
    Stop { reason: String },
    Exit { reason: String },
    NodeResources { resources: Value },
    AverageReceivedPackageSize(BTreeMap<String, Average>),
    Delays(BTreeMap<String, Average>),
    Register,
    Registered(Assignment),
    Other { kind: String, fields: Map<String, Value> },
}

#[derive(Deserialize)]
struct ReasonFields {
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct ResourcesFields {
    #[serde(default)]
    resources: Value,
}

#[derive(Deserialize)]
struct SizeFields {
    #[serde(rename = "averageReceivedPackageSize")]
    averages: BTreeMap<String, Average>,
}

#[derive(Deserialize)]
struct DelayFields {
    delays: BTreeMap<String, Average>,
}

fn decode<T: DeserializeOwned>(fields: &Map<String, Value>) -> serde_json::Result<T> {
    serde_json::from_value(Value::Object(fields.clone()))
}

impl Payload {
    pub fn kind(&self) -> &str {
        match self {
            Payload::ResourcesQuery => RESOURCES_QUERY,
            Payload::Stop { .. } => STOP,
            Payload::Exit { .. } => EXIT,
            Payload::NodeResources { .. } => NODE_RESOURCES,
            Payload::AverageReceivedPackageSize(_) => AVERAGE_RECEIVED_PACKAGE_SIZE,
            Payload::Delays(_) => DELAYS,
            Payload::Register => REGISTER,
            Payload::Registered(_) => REGISTERED,
            Payload::Other { kind, .. } => kind.as_str(),
        }
    }

    pub fn exit(reason: &str) -> Self {
        Payload::Exit {
            reason: reason.to_string(),
        }
    }

    pub fn stop(reason: &str) -> Self {
        Payload::Stop {
            reason: reason.to_string(),
        }
    }

    pub fn into_fields(self) -> Result<(String, Map<String, Value>)> {
        let kind = self.kind().to_string();
        let mut fields = Map::new();
        match self {
            Payload::ResourcesQuery | Payload::Register => {}
            Payload::Stop { reason } | Payload::Exit { reason } => {
                fields.insert("reason".to_string(), Value::String(reason));
            }
            Payload::NodeResources { resources } => {
                fields.insert("resources".to_string(), resources);
            }
            Payload::AverageReceivedPackageSize(averages) => {
                fields.insert(kind.clone(), serde_json::to_value(averages)?);
            }
            Payload::Delays(delays) => {
                fields.insert(kind.clone(), serde_json::to_value(delays)?);
            }
            Payload::Registered(assignment) => {
                if let Value::Object(map) = serde_json::to_value(assignment)? {
                    fields = map;
                }
            }
            Payload::Other { fields: extra, .. } => fields = extra,
        }
        Ok((kind, fields))
    }

    /// Decode a wire type and its fields. Built-in types with malformed
    /// fields are kept as `Other` so the application still sees them.
    pub fn from_fields(kind: String, fields: Map<String, Value>) -> Self {
        let decoded = match kind.as_str() {
            RESOURCES_QUERY => Ok(Payload::ResourcesQuery),
            REGISTER => Ok(Payload::Register),
            STOP => decode::<ReasonFields>(&fields).map(|f| Payload::Stop { reason: f.reason }),
            EXIT => decode::<ReasonFields>(&fields).map(|f| Payload::Exit { reason: f.reason }),
            NODE_RESOURCES => decode::<ResourcesFields>(&fields).map(|f| Payload::NodeResources {
                resources: f.resources,
            }),
            AVERAGE_RECEIVED_PACKAGE_SIZE => decode::<SizeFields>(&fields)
                .map(|f| Payload::AverageReceivedPackageSize(f.averages)),
            DELAYS => decode::<DelayFields>(&fields).map(|f| Payload::Delays(f.delays)),
            REGISTERED => decode::<Assignment>(&fields).map(Payload::Registered),
            _ => return Payload::Other { kind, fields },
        };
        match decoded {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(kind = %kind, error = %e, "Malformed built-in message, passing through");
                Payload::Other { kind, fields }
            }
        }
    }
}

/// A message as it travels between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: Source,
    #[serde(rename = "_sentAt")]
    pub sent_at: f64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(payload: Payload, source: Source, sent_at: f64) -> Result<Self> {
        let (kind, fields) = payload.into_fields()?;
        Ok(Self {
            kind,
            source,
            sent_at,
            fields,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Stamp receipt time and decode the payload.
    pub fn into_message(self, received_at: f64) -> Message {
        Message {
            delay: received_at - self.sent_at,
            source: self.source,
            sent_at: self.sent_at,
            received_at,
            payload: Payload::from_fields(self.kind, self.fields),
        }
    }
}

/// A received message, consumed once by the pump's dispatch step.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub source: Source,
    pub sent_at: f64,
    pub received_at: f64,
    /// Milliseconds between enqueue at the sender and receipt here.
    pub delay: f64,
    pub payload: Payload,
}

impl Message {
    pub fn kind(&self) -> &str {
        self.payload.kind()
    }
}
