//! # PotatoKV - A Storage Node for a Distributed Cache
//!
//! A single storage node holding per-user, per-key values with time-to-live
//! expiration, served over TCP with a small JSON command protocol. Routing
//! requests between nodes is someone else's job; a node just stores.
//!
//! ## Features
//!
//! - **Typed Values**: strings, lists and maps, one variant per key
//! - **TTL Everywhere**: every entry dies at a fixed instant set on creation
//! - **Bounded Admission**: a fixed worker pool caps concurrent sessions
//! - **Async I/O**: built on Tokio, one task per session
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              PotatoKV node                              │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Admission   │───>│  Session    │───>│  Command    │                  │
//! │  │ Controller  │    │  Handler    │    │  Handler    │                  │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘                  │
//! │         │                                     │                         │
//! │         ▼                                     ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │ WorkerPool  │    │              StorageEngine                   │    │
//! │  │ (permits)   │    │   Mutex< user -> key -> Entry{Value, TTL} >  │    │
//! │  └─────────────┘    └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper (TTL reaper)            │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use potatokv::{NodeConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::new(NodeConfig::default());
//!     let listener = server.bind().await?;
//!     server.run(listener).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `del key`, `keys`
//! - `get key`, `set key value`
//! - `lpush key value`, `lset key index value`, `lget key index`
//! - `hget key field`, `hset key field value`
//!
//! ## Module Overview
//!
//! - [`protocol`]: JSON wire types and the incremental decoder
//! - [`storage`]: typed entries, the storage engine, and the TTL reaper
//! - [`commands`]: command table and per-command semantics
//! - [`connection`]: the per-connection session loop
//! - [`workers`]: the worker permit pool
//! - [`server`]: the admission controller
//! - [`config`]: node configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod workers;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{ConfigError, NodeConfig};
pub use connection::{handle_connection, ConnectionError, ConnectionStats, Session};
pub use protocol::{Command, CommandDecoder, DecodeError, Response, Status};
pub use server::{Server, ServerError, FIXED_IDENTITY};
pub use storage::{start_expiry_sweeper, Entry, ExpirySweeper, StorageEngine, Value, ValueKind};
pub use workers::{PoolError, WorkerPermit, WorkerPool};

/// Version of PotatoKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
