//! Command Dispatch Module
//!
//! This module implements the command processing layer of a node.
//! It receives decoded commands, validates their arity, executes them
//! against the storage engine, and turns every outcome into a response.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  JSON Decoder   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - Keys: `del`, `keys`
//! - Strings: `get`, `set`
//! - Lists: `lpush`, `lset`, `lget`
//! - Maps: `hget`, `hset`

pub mod handler;

// Re-export the main command handler
pub use handler::{format_keys, CommandHandler};
