//! Session Module
//!
//! This module manages the client connections admitted to a node.
//! Each admitted connection is handled by its own async task holding one
//! worker permit for as long as it runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Admission Controller                       │
//! │                     (server.rs)                             │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + worker permit
//!                        ▼
//!           ┌────────────────────────┐
//!           │ For each admitted peer │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Session                               │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Decode JSON │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Idle Timeout**: the deadline is reset before every command
//! - **Pipelining**: several commands in one TCP packet are served in order
//! - **Statistics**: tracks connection and command metrics

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionStats, Session, MAX_FRAME_SIZE};
