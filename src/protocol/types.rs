//! Wire Types
//!
//! Requests and responses travel as JSON objects, concatenated back to back
//! on the TCP stream:
//!
//! ```text
//! -> {"Name":"set","Arguments":["greeting","hello"],"TTL":0}
//! <- {"Code":0,"StatusMessage":"OK","Value":""}
//! -> {"Name":"get","Arguments":["greeting"],"TTL":0}
//! <- {"Code":0,"StatusMessage":"OK","Value":"hello"}
//! ```
//!
//! `TTL` is an integer count of nanoseconds; zero means "use the server
//! default".

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of a command, carried on the wire as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    WrongType,
    NoKey,
    WrongArguments,
    NoWorkers,
    UnknownCommand,
}

impl Status {
    /// The stable wire code.
    pub const fn code(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::WrongType => 1,
            Status::NoKey => 2,
            Status::WrongArguments => 3,
            Status::NoWorkers => 4,
            Status::UnknownCommand => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::WrongType),
            2 => Some(Status::NoKey),
            3 => Some(Status::WrongArguments),
            4 => Some(Status::NoWorkers),
            5 => Some(Status::UnknownCommand),
            _ => None,
        }
    }

    /// Human readable status message sent alongside the code.
    pub const fn message(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::WrongType => "Object stored at the key is of different type",
            Status::NoKey => "Key doesn't exist",
            Status::WrongArguments => "Wrong call arguments",
            Status::NoWorkers => "There are no available workers on the server",
            Status::UnknownCommand => "Unknown command",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A single request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,

    #[serde(
        rename = "Arguments",
        alias = "arguments",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub arguments: Vec<String>,

    /// TTL override in nanoseconds (0 = server default)
    #[serde(rename = "TTL", alias = "ttl", default)]
    pub ttl: i64,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Command {
    /// Creates a command that uses the server default TTL.
    pub fn new<I, S>(name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            ttl: 0,
        }
    }

    /// Sets the TTL override.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
        self
    }

    /// The TTL this command asks for, or `None` for the server default.
    ///
    /// Negative overrides clamp to zero: the entry is born dead.
    pub fn ttl_override(&self) -> Option<Duration> {
        match self.ttl {
            0 => None,
            n if n < 0 => Some(Duration::ZERO),
            n => Some(Duration::from_nanos(n as u64)),
        }
    }
}

/// The reply to a single command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Code")]
    pub code: u32,

    #[serde(rename = "StatusMessage")]
    pub status_message: String,

    #[serde(rename = "Value", default)]
    pub value: String,
}

impl Response {
    /// A response carrying only a status.
    pub fn status(status: Status) -> Self {
        Self {
            code: status.code(),
            status_message: status.message().to_string(),
            value: String::new(),
        }
    }

    pub fn ok() -> Self {
        Self::status(Status::Ok)
    }

    /// A successful response carrying a value.
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::ok()
        }
    }

    pub fn no_workers() -> Self {
        Self::status(Status::NoWorkers)
    }

    /// Decodes the code back into a [`Status`], if it is a known one.
    pub fn status_kind(&self) -> Option<Status> {
        Status::from_code(self.code)
    }

    pub fn is_ok(&self) -> bool {
        self.code == Status::Ok.code()
    }
}

impl From<Status> for Response {
    fn from(status: Status) -> Self {
        Response::status(status)
    }
}
