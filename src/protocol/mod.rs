//! JSON Command Protocol
//!
//! Clients talk to a node with JSON objects written back to back on a TCP
//! stream. Each request names a command, its string arguments, and an
//! optional TTL override; each reply carries a status code, its message,
//! and a value.
//!
//! ## Modules
//!
//! - `types`: `Command`, `Response` and the `Status` codes
//! - `codec`: incremental decoder for the inbound stream, response encoder
//!
//! ## Example
//!
//! ```
//! use potatokv::protocol::{encode_response, CommandDecoder, Response};
//!
//! let data = br#"{"Name":"get","Arguments":["name"],"TTL":0}"#;
//! let (command, consumed) = CommandDecoder::new().decode(data).unwrap().unwrap();
//! assert_eq!(command.name, "get");
//! assert_eq!(consumed, data.len());
//!
//! let bytes = encode_response(&Response::value("Ariz"));
//! assert!(bytes.ends_with(b"\n"));
//! ```

pub mod codec;
pub mod types;

pub use codec::{encode_command, encode_response, CommandDecoder, DecodeError, DecodeResult};
pub use types::{Command, Response, Status};
