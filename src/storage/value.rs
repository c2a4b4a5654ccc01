//! Typed Values and Entries
//!
//! Every key holds exactly one [`Value`] variant plus the instant it dies.
//! All three variants share one capability set, addressed by an untyped
//! string selector that each variant interprets its own way:
//!
//! | Variant | `get(selector)`          | `set(content, selector)`                  |
//! |---------|--------------------------|-------------------------------------------|
//! | String  | whole content            | replace content                           |
//! | List    | element at decimal index | `-1` appends, otherwise overwrite index   |
//! | Map     | field named by selector  | insert or overwrite the field             |

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Selector that appends to a list instead of overwriting an element.
pub const APPEND_SELECTOR: &str = "-1";

/// Longest lifetime an entry can get; larger overrides are capped.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A selector that does not address anything in the value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("'{0}' is not a list index")]
    InvalidIndex(String),

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no field '{0}'")]
    MissingField(String),
}

/// The variant tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        })
    }
}

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(Vec<String>),
    Map(HashMap<String, String>),
}

impl Value {
    /// An empty value of the given kind.
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::String => Value::String(String::new()),
            ValueKind::List => Value::List(Vec::new()),
            ValueKind::Map => Value::Map(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    /// Reads the part of the value addressed by `selector`.
    pub fn get(&self, selector: &str) -> Result<String, SelectorError> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::List(list) => {
                let index = parse_index(selector)?;
                list.get(index)
                    .cloned()
                    .ok_or(SelectorError::IndexOutOfRange {
                        index,
                        len: list.len(),
                    })
            }
            Value::Map(map) => map
                .get(selector)
                .cloned()
                .ok_or_else(|| SelectorError::MissingField(selector.to_string())),
        }
    }

    /// Writes `content` into the part of the value addressed by `selector`.
    pub fn set(&mut self, content: String, selector: &str) -> Result<(), SelectorError> {
        match self {
            Value::String(s) => {
                *s = content;
                Ok(())
            }
            Value::List(list) => {
                if selector == APPEND_SELECTOR {
                    list.push(content);
                    return Ok(());
                }
                let index = parse_index(selector)?;
                let len = list.len();
                let slot = list
                    .get_mut(index)
                    .ok_or(SelectorError::IndexOutOfRange { index, len })?;
                *slot = content;
                Ok(())
            }
            Value::Map(map) => {
                map.insert(selector.to_string(), content);
                Ok(())
            }
        }
    }
}

fn parse_index(selector: &str) -> Result<usize, SelectorError> {
    selector
        .parse::<usize>()
        .map_err(|_| SelectorError::InvalidIndex(selector.to_string()))
}

/// A stored value together with its death time.
#[derive(Debug, Clone)]
pub struct Entry {
    value: Value,
    death_time: Instant,
}

impl Entry {
    /// Creates an entry that dies `ttl` from now.
    pub fn new(value: Value, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            death_time: now
                .checked_add(ttl)
                .unwrap_or_else(|| now + MAX_TTL),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Mutable access to the value. Never touches the death time.
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    pub fn death_time(&self) -> Instant {
        self.death_time
    }

    /// An entry is dead at and after its death time.
    #[inline]
    pub fn is_dead_at(&self, now: Instant) -> bool {
        now >= self.death_time
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.is_dead_at(Instant::now())
    }

    /// Time left before death, zero once dead.
    pub fn remaining(&self) -> Duration {
        self.death_time.saturating_duration_since(Instant::now())
    }
}
