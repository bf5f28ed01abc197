//! Diagnostic events raised while correlating.
//!
//! Unmatched or suspicious entities are not errors. Passes hand them to a
//! [`Reporter`] and keep going.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    NoMatch,
    AmbiguousMatch,
    NonUniqueSymbol,
    InvalidUserData,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NoMatch => "NO_MATCH",
            EventKind::AmbiguousMatch => "AMBIGUOUS_MATCH",
            EventKind::NonUniqueSymbol => "NON_UNIQUE_SYMBOL",
            EventKind::InvalidUserData => "INVALID_USER_DATA",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NO_MATCH" => Some(EventKind::NoMatch),
            "AMBIGUOUS_MATCH" => Some(EventKind::AmbiguousMatch),
            "NON_UNIQUE_SYMBOL" => Some(EventKind::NonUniqueSymbol),
            "INVALID_USER_DATA" => Some(EventKind::InvalidUserData),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported event. `address` is an orig address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub address: u64,
    pub message: String,
}

/// Sink for events raised by matching and verification.
pub trait Reporter {
    fn report(&mut self, kind: EventKind, address: u64, message: &str);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopReporter;

impl Reporter for NopReporter {
    fn report(&mut self, _kind: EventKind, _address: u64, _message: &str) {}
}

/// Keeps every event in arrival order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events of one kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

impl Reporter for EventLog {
    fn report(&mut self, kind: EventKind, address: u64, message: &str) {
        tracing::debug!(kind = kind.as_str(), addr = format!("{address:#x}"), "{message}");
        self.events.push(Event { kind, address, message: message.to_owned() });
    }
}

impl<F> Reporter for F
where
    F: FnMut(EventKind, u64, &str),
{
    fn report(&mut self, kind: EventKind, address: u64, message: &str) {
        self(kind, address, message)
    }
}
