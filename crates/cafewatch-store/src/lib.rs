//! cafewatch-store — persistence for monitor events.
//!
//! [`SqliteStore`] holds the event log, employee scores and visitor
//! samples. [`EventSink`] moves writes off the frame loop onto a single
//! worker thread that owns the store connection.

pub mod sink;
pub mod store;

pub use sink::{EventSink, SinkHandle};
pub use store::{EmployeeRecord, EventRecord, SqliteStore, Store, StoreError, VisitorSample};

use std::path::PathBuf;

/// Database location: `CAFEWATCH_DB_PATH`, else `cafewatch.db` in the
/// per-user data directory.
pub fn default_db_path() -> PathBuf {
    std::env::var("CAFEWATCH_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| cafewatch_core::default_data_dir().join("cafewatch.db"))
}
