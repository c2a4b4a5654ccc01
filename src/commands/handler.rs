//! Command Handler
//!
//! Executes decoded commands against the storage engine on behalf of one
//! user.
//!
//! ## Supported Commands
//!
//! | Command | Arguments              | Effect                                            |
//! |---------|------------------------|---------------------------------------------------|
//! | `del`   | key                    | remove the key                                    |
//! | `keys`  |                        | `'k1','k2',` listing of the caller's keys         |
//! | `get`   | key                    | read a string                                     |
//! | `set`   | key value              | replace the key with a fresh string               |
//! | `lpush` | key value              | append to a list, creating it if needed           |
//! | `lset`  | key index value        | overwrite (or with `-1` append) a list element    |
//! | `lget`  | key index              | read a list element                               |
//! | `hget`  | key field              | read a map field                                  |
//! | `hset`  | key field value        | set a map field, creating the map if needed       |
//!
//! Arity is checked before anything else. A handler does all of its work
//! inside one [`StorageEngine::with_keyspace`] call, so the type check and
//! the mutation it guards are never separated by an unlock.

use crate::protocol::{Command, Response, Status};
use crate::storage::{Entry, StorageEngine, StoreError, Value, ValueKind, APPEND_SELECTOR};
use std::sync::Arc;

type Handler = fn(&CommandHandler, &str, &Command) -> Response;

/// One row of the dispatch table.
struct CommandSpec {
    name: &'static str,
    arity: usize,
    handler: Handler,
}

/// The fixed command table.
#[rustfmt::skip]
const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "del", arity: 1, handler: CommandHandler::cmd_del },
    CommandSpec { name: "keys", arity: 0, handler: CommandHandler::cmd_keys },
    CommandSpec { name: "get", arity: 1, handler: CommandHandler::cmd_get },
    CommandSpec { name: "set", arity: 2, handler: CommandHandler::cmd_set },
    CommandSpec { name: "lpush", arity: 2, handler: CommandHandler::cmd_lpush },
    CommandSpec { name: "lset", arity: 3, handler: CommandHandler::cmd_lset },
    CommandSpec { name: "lget", arity: 2, handler: CommandHandler::cmd_lget },
    CommandSpec { name: "hget", arity: 2, handler: CommandHandler::cmd_hget },
    CommandSpec { name: "hset", arity: 3, handler: CommandHandler::cmd_hset },
];

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WrongType { .. } => Status::WrongType,
            StoreError::NoKey => Status::NoKey,
            StoreError::Selector(_) => Status::WrongArguments,
        }
    }
}

fn respond<T>(result: Result<T, StoreError>, on_ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => on_ok(value),
        Err(err) => Response::status(err.into()),
    }
}

/// Formats keys the way clients expect them: `'k1','k2',`.
pub fn format_keys(keys: &[String]) -> String {
    keys.iter().map(|key| format!("'{}',", key)).collect()
}

/// Handles commands by dispatching them to the appropriate handlers.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Whether `name` is a command this handler knows.
    pub fn is_known(name: &str) -> bool {
        Self::lookup(name).is_some()
    }

    fn lookup(name: &str) -> Option<&'static CommandSpec> {
        COMMANDS
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
    }

    /// Executes a command for `user` and returns the response.
    ///
    /// Never fails: every error becomes a status in the response.
    pub fn execute(&self, user: &str, command: &Command) -> Response {
        let Some(spec) = Self::lookup(&command.name) else {
            return Response::status(Status::UnknownCommand);
        };

        if command.arguments.len() != spec.arity {
            return Response::status(Status::WrongArguments);
        }

        (spec.handler)(self, user, command)
    }

    fn ttl(&self, command: &Command) -> std::time::Duration {
        self.storage.ttl_for(command.ttl_override())
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// del key
    fn cmd_del(&self, user: &str, command: &Command) -> Response {
        let key = &command.arguments[0];
        if self.storage.delete(user, key) {
            Response::ok()
        } else {
            Response::status(Status::NoKey)
        }
    }

    /// keys
    fn cmd_keys(&self, user: &str, _command: &Command) -> Response {
        Response::value(format_keys(&self.storage.keys(user)))
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// get key
    fn cmd_get(&self, user: &str, command: &Command) -> Response {
        let key = &command.arguments[0];
        let result = self
            .storage
            .with_keyspace(user, |ks| ks.read(key, ValueKind::String, ""));
        respond(result, Response::value)
    }

    /// set key value
    ///
    /// Always replaces whatever the key held with a fresh string.
    fn cmd_set(&self, user: &str, command: &Command) -> Response {
        let (key, value) = (&command.arguments[0], &command.arguments[1]);
        let entry = Entry::new(Value::String(value.clone()), self.ttl(command));
        self.storage.with_keyspace(user, |ks| {
            ks.remove(key);
            ks.insert(key.as_str(), entry);
        });
        Response::ok()
    }

    // ========================================================================
    // List Commands
    // ========================================================================

    /// lpush key value
    fn cmd_lpush(&self, user: &str, command: &Command) -> Response {
        let (key, value) = (&command.arguments[0], &command.arguments[1]);
        let ttl = self.ttl(command);
        let result = self.storage.with_keyspace(user, |ks| {
            ks.upsert(key, ValueKind::List, value.clone(), APPEND_SELECTOR, ttl)
        });
        respond(result, |()| Response::ok())
    }

    /// lset key index value
    fn cmd_lset(&self, user: &str, command: &Command) -> Response {
        let (key, index, value) = (
            &command.arguments[0],
            &command.arguments[1],
            &command.arguments[2],
        );
        let result = self
            .storage
            .with_keyspace(user, |ks| ks.update(key, ValueKind::List, value.clone(), index));
        respond(result, |()| Response::ok())
    }

    /// lget key index
    fn cmd_lget(&self, user: &str, command: &Command) -> Response {
        let (key, index) = (&command.arguments[0], &command.arguments[1]);
        let result = self
            .storage
            .with_keyspace(user, |ks| ks.read(key, ValueKind::List, index));
        respond(result, Response::value)
    }

    // ========================================================================
    // Map Commands
    // ========================================================================

    /// hget key field
    fn cmd_hget(&self, user: &str, command: &Command) -> Response {
        let (key, field) = (&command.arguments[0], &command.arguments[1]);
        let result = self
            .storage
            .with_keyspace(user, |ks| ks.read(key, ValueKind::Map, field));
        respond(result, Response::value)
    }

    /// hset key field value
    fn cmd_hset(&self, user: &str, command: &Command) -> Response {
        let (key, field, value) = (
            &command.arguments[0],
            &command.arguments[1],
            &command.arguments[2],
        );
        let ttl = self.ttl(command);
        let result = self.storage.with_keyspace(user, |ks| {
            ks.upsert(key, ValueKind::Map, value.clone(), field, ttl)
        });
        respond(result, |()| Response::ok())
    }
}
