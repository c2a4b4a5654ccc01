//! Storage Engine Module
//!
//! This module provides the core storage for a node: per-user keyspaces of
//! typed values with time-to-live, one coarse lock around all of them, and
//! a background reaper that sweeps dead entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │        Mutex< user -> Keyspace< key -> Entry > >            │
//! │                                                             │
//! │   Entry = Value { String | List | Map } + death time        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use potatokv::storage::{Entry, StorageEngine, Value};
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new(Duration::from_secs(3600));
//!
//! engine.insert("user", "name", Entry::new(Value::String("Ariz".into()), engine.default_ttl()));
//! let entry = engine.lookup("user", "name").unwrap();
//! assert_eq!(entry.value(), &Value::String("Ariz".into()));
//! ```

pub mod engine;
pub mod expiry;
pub mod value;

// Re-export commonly used types
pub use engine::{Keyspace, StorageEngine, StorageStats, StoreError};
pub use expiry::{start_expiry_sweeper, ExpirySweeper};
pub use value::{Entry, SelectorError, Value, ValueKind, APPEND_SELECTOR};
