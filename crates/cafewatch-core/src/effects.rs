//! Side effects produced by the monitors.
//!
//! Monitors never perform I/O. They append effects to an outbox, and the
//! caller hands persistence to the event sink and speech to the notifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an entry in the system event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    System,
    Violation,
    Production,
    Visitor,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::System => "SYSTEM",
            EventKind::Violation => "VIOLATION",
            EventKind::Production => "PRODUCTION",
            EventKind::Visitor => "VISITOR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work status written to an employee record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeStatus {
    Active,
    Idle,
}

impl EmployeeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmployeeStatus::Active => "Active",
            EmployeeStatus::Idle => "Idle",
        }
    }
}

impl fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persistence operation, in the shape the store accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    /// Append to the event log.
    LogEvent { kind: EventKind, detail: String },
    /// Upsert by name: add `cups_delta`, overwrite last-seen and status.
    UpdateEmployee {
        name: String,
        cups_delta: u32,
        status: EmployeeStatus,
    },
    /// Append an aggregate visitor sample.
    VisitorStats {
        camera_id: String,
        total_in: u64,
        current_occupancy: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Persist(PersistOp),
    /// Fire-and-forget spoken announcement.
    Speak(String),
}

/// Ordered collection of effects emitted while processing one frame.
#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_event(&mut self, kind: EventKind, detail: impl Into<String>) {
        self.effects.push(Effect::Persist(PersistOp::LogEvent {
            kind,
            detail: detail.into(),
        }));
    }

    pub fn update_employee(&mut self, name: &str, cups_delta: u32, status: EmployeeStatus) {
        self.effects.push(Effect::Persist(PersistOp::UpdateEmployee {
            name: name.to_string(),
            cups_delta,
            status,
        }));
    }

    pub fn visitor_stats(&mut self, camera_id: &str, total_in: u64, current_occupancy: usize) {
        self.effects.push(Effect::Persist(PersistOp::VisitorStats {
            camera_id: camera_id.to_string(),
            total_in,
            current_occupancy,
        }));
    }

    pub fn speak(&mut self, text: impl Into<String>) {
        self.effects.push(Effect::Speak(text.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    /// Number of logged events of the given kind.
    pub fn count_events(&self, kind: EventKind) -> usize {
        self.effects
            .iter()
            .filter(|e| matches!(e, Effect::Persist(PersistOp::LogEvent { kind: k, .. }) if *k == kind))
            .count()
    }
}
