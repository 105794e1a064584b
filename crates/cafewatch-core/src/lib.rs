//! cafewatch-core — per-frame café monitoring logic.
//!
//! Fuses tracker output with periodic face matches into per-track
//! identities, then drives the phone-usage, cup-production and visitor
//! monitors. Components perform no I/O; they emit [`Effect`]s that the
//! daemon hands to the event sink and the speech notifier.

pub mod config;
pub mod cup;
pub mod effects;
pub mod encoder;
pub mod geometry;
pub mod identity;
pub mod phone;
pub mod pipeline;
pub mod roster;
pub mod source;
pub mod types;
pub mod visitor;

pub use config::MonitorConfig;
pub use effects::{Effect, EmployeeStatus, EventKind, Outbox, PersistOp};
pub use encoder::{ArcFaceEncoder, FaceEncoder, ARCFACE_EMBEDDING_DIM, ARCFACE_MODEL_FILE};
pub use identity::{Identity, ResolvedPerson};
pub use pipeline::{FrameReport, Monitor, StatusSnapshot};
pub use roster::{load_roster, Roster, RosterDiff};
pub use source::{FrameInput, FrameSource, JsonLinesSource};
pub use types::{BoundingBox, Embedding, ObjectClass, TrackedObject};

use std::path::PathBuf;

/// Per-user data directory: `$XDG_DATA_HOME/cafewatch`, falling back to
/// `~/.local/share/cafewatch`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("cafewatch")
}

/// Directory holding ONNX models: `CAFEWATCH_MODEL_DIR` or `<data dir>/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("CAFEWATCH_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir().join("models"))
}
