// Types and events exposed by the sentry
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an alert is about, after priority resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Local,
    Overview,
    Monster,
    /// A hostile plus monsters at the same time
    Mixed,
}

impl AlertCategory {
    pub fn key(self) -> &'static str {
        match self {
            AlertCategory::Local => "local",
            AlertCategory::Overview => "overview",
            AlertCategory::Monster => "monster",
            AlertCategory::Mixed => "mixed",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    StopRequested,
}

/// A client that contributed to an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRef {
    pub id: u32,
    pub name: String,
}

impl fmt::Display for ClientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub category: AlertCategory,
    pub clients: Vec<ClientRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeEvent {
    pub clients: Vec<ClientRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SentryEvent {
    /// Human readable line: self-check, per-client status, triggers
    Log(String),
    Alert(AlertEvent),
    Probe(ProbeEvent),
    /// Location changed; `"Unknown"` when nothing was recognised
    Location { client: ClientRef, label: String },
    State(EngineState),
}

impl fmt::Display for SentryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentryEvent::Log(line) => f.write_str(line),
            SentryEvent::Alert(alert) => write!(
                f,
                "🚨 {} alert [{}]",
                alert.category,
                join_names(&alert.clients)
            ),
            SentryEvent::Probe(probe) => {
                write!(f, "🛰️ Probe detected [{}]", join_names(&probe.clients))
            }
            SentryEvent::Location { client, label } => {
                write!(f, "📍 {} location: {}", client, label)
            }
            SentryEvent::State(state) => write!(f, "🎮 Sentry state: {:?}", state),
        }
    }
}

fn join_names(clients: &[ClientRef]) -> String {
    clients
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
