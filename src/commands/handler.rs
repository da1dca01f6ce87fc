//! Command Dispatch
//!
//! Commands arrive as arrays of bulk strings. The first element names the
//! command (case-insensitive), the rest are its arguments:
//!
//! | command | reply |
//! |---|---|
//! | `PING [msg]` / `ECHO msg` | pong / the message |
//! | `SET key value [EX secs]` | `+OK`; value is an integer or a quoted string |
//! | `GET key` | scalar text, null if absent |
//! | `KIND key` | kind code, null if absent |
//! | `HSET key field value [field value ...]` | retained field count |
//! | `HGET key field` | field text, null if absent |
//! | `LPUSH / RPUSH / RADDTOSET key v [v ...]` | list length |
//! | `LPOP / RPOP key i [end]` | array of popped elements |
//! | `LSET key index value` / `LGET key index` | `+OK` / element |
//! | `KEYS pattern` | keys matching the regular expression |
//! | `EXPIRE key seconds` | `:1` applied, `:0` no such key |
//! | `DBSIZE` / `SAVE` / `QUIT` | housekeeping |

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::protocol::Frame;
use crate::storage::{PopRange, StoreError, TypedStore};

/// Executes commands against the shared store.
///
/// Cheap to clone, one per connection.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<TypedStore>,
    snapshot_path: PathBuf,
}

impl CommandHandler {
    pub fn new(store: Arc<TypedStore>, snapshot_path: PathBuf) -> Self {
        Self {
            store,
            snapshot_path,
        }
    }

    /// Executes one parsed command and returns the reply frame.
    pub fn execute(&self, command: Frame) -> Frame {
        let args = match command {
            Frame::Array(args) if !args.is_empty() => args,
            Frame::Array(_) => return Frame::error("ERR empty command"),
            _ => return Frame::error("ERR commands must be arrays of bulk strings"),
        };

        let Some(name) = args[0].as_text().map(str::to_uppercase) else {
            return Frame::error("ERR invalid command name");
        };
        debug!(command = %name, args = args.len() - 1, "executing");

        // Expired keys must behave as absent on every keyed path, so the
        // lazy check runs before the command proper.
        if let Some(key) = keyed_target(&name, &args) {
            self.store.check_if_expired(&key);
        }

        match name.as_str() {
            "PING" => self.cmd_ping(&args),
            "ECHO" => self.cmd_echo(&args),
            "SET" => self.cmd_set(&args),
            "GET" => self.cmd_get(&args),
            "KIND" => self.cmd_kind(&args),
            "HSET" => self.cmd_hset(&args),
            "HGET" => self.cmd_hget(&args),
            "LPUSH" => self.cmd_push(&args, true),
            "RPUSH" => self.cmd_push(&args, false),
            "RADDTOSET" => self.cmd_radd_to_set(&args),
            "LPOP" => self.cmd_pop(&args, false),
            "RPOP" => self.cmd_pop(&args, true),
            "LSET" => self.cmd_lset(&args),
            "LGET" => self.cmd_lget(&args),
            "KEYS" => self.cmd_keys(&args),
            "EXPIRE" => self.cmd_expire(&args),
            "DBSIZE" => Frame::Integer(self.store.len() as i64),
            "SAVE" => self.cmd_save(),
            "QUIT" => Frame::ok(),
            _ => Frame::error(format!("ERR unknown command '{name}'")),
        }
    }

    fn cmd_ping(&self, args: &[Frame]) -> Frame {
        match args.len() {
            1 => Frame::Simple("PONG".to_string()),
            2 => args[1].clone(),
            _ => wrong_arity("PING"),
        }
    }

    fn cmd_echo(&self, args: &[Frame]) -> Frame {
        match args.len() {
            2 => args[1].clone(),
            _ => wrong_arity("ECHO"),
        }
    }

    fn cmd_set(&self, args: &[Frame]) -> Frame {
        if args.len() != 3 && args.len() != 5 {
            return wrong_arity("SET");
        }
        let (Some(key), Some(raw)) = (text_arg(args, 1), text_arg(args, 2)) else {
            return Frame::error("ERR invalid argument");
        };
        let ttl_secs = if args.len() == 5 {
            match text_arg(args, 3) {
                Some(word) if word.eq_ignore_ascii_case("EX") => {}
                _ => return Frame::error("ERR syntax error"),
            }
            match int_arg(args, 4) {
                Some(n) if n >= 0 => Some(n as u64),
                _ => return Frame::error("ERR invalid expire time"),
            }
        } else {
            None
        };

        match self.store.set(&key, &raw) {
            Ok(()) => {
                if let Some(secs) = ttl_secs {
                    self.store.expire(&key, secs);
                }
                Frame::ok()
            }
            Err(e) => reply_err(e),
        }
    }

    fn cmd_get(&self, args: &[Frame]) -> Frame {
        if args.len() != 2 {
            return wrong_arity("GET");
        }
        let Some(key) = text_arg(args, 1) else {
            return Frame::error("ERR invalid argument");
        };
        match self.store.get(&key) {
            Ok(Some(value)) => Frame::bulk(value),
            Ok(None) => Frame::Null,
            Err(e) => reply_err(e),
        }
    }

    fn cmd_kind(&self, args: &[Frame]) -> Frame {
        if args.len() != 2 {
            return wrong_arity("KIND");
        }
        let Some(key) = text_arg(args, 1) else {
            return Frame::error("ERR invalid argument");
        };
        match self.store.kind(&key) {
            Some(kind) => Frame::Simple(kind.code().to_string()),
            None => Frame::Null,
        }
    }

    fn cmd_hset(&self, args: &[Frame]) -> Frame {
        if args.len() < 4 || args.len() % 2 != 0 {
            return wrong_arity("HSET");
        }
        let Some(key) = text_arg(args, 1) else {
            return Frame::error("ERR invalid argument");
        };
        let mut fields = Vec::with_capacity((args.len() - 2) / 2);
        for pair in args[2..].chunks(2) {
            match (pair[0].as_text(), pair[1].as_text()) {
                (Some(field), Some(value)) => {
                    fields.push((field.to_string(), value.to_string()))
                }
                _ => return Frame::error("ERR invalid argument"),
            }
        }
        match self.store.hset(&key, &fields) {
            Ok(count) => Frame::Integer(count as i64),
            Err(e) => reply_err(e),
        }
    }

    fn cmd_hget(&self, args: &[Frame]) -> Frame {
        if args.len() != 3 {
            return wrong_arity("HGET");
        }
        let (Some(key), Some(field)) = (text_arg(args, 1), text_arg(args, 2)) else {
            return Frame::error("ERR invalid argument");
        };
        match self.store.hget(&key, &field) {
            Ok(Some(value)) => Frame::bulk(value),
            Ok(None) => Frame::Null,
            Err(e) => reply_err(e),
        }
    }

    fn cmd_push(&self, args: &[Frame], front: bool) -> Frame {
        let name = if front { "LPUSH" } else { "RPUSH" };
        let Some((key, values)) = key_and_values(args) else {
            return wrong_arity(name);
        };
        let result = if front {
            self.store.lpush(&key, &values)
        } else {
            self.store.rpush(&key, &values)
        };
        match result {
            Ok(len) => Frame::Integer(len as i64),
            Err(e) => reply_err(e),
        }
    }

    fn cmd_radd_to_set(&self, args: &[Frame]) -> Frame {
        let Some((key, values)) = key_and_values(args) else {
            return wrong_arity("RADDTOSET");
        };
        match self.store.radd_to_set(&key, &values) {
            Ok(len) => Frame::Integer(len as i64),
            Err(e) => reply_err(e),
        }
    }

    fn cmd_pop(&self, args: &[Frame], from_tail: bool) -> Frame {
        let name = if from_tail { "RPOP" } else { "LPOP" };
        if args.len() != 3 && args.len() != 4 {
            return wrong_arity(name);
        }
        let Some(key) = text_arg(args, 1) else {
            return Frame::error("ERR invalid argument");
        };
        let Some(first) = int_arg(args, 2) else {
            return Frame::error("ERR index must be an integer");
        };
        let range = if args.len() == 4 {
            match int_arg(args, 3) {
                Some(end) => PopRange::Span(first, end),
                None => return Frame::error("ERR index must be an integer"),
            }
        } else {
            PopRange::At(first)
        };

        let result = if from_tail {
            self.store.rpop(&key, range)
        } else {
            self.store.lpop(&key, range)
        };
        match result {
            Ok(popped) => Frame::bulk_array(popped),
            Err(e) => reply_err(e),
        }
    }

    fn cmd_lset(&self, args: &[Frame]) -> Frame {
        if args.len() != 4 {
            return wrong_arity("LSET");
        }
        let (Some(key), Some(value)) = (text_arg(args, 1), text_arg(args, 3)) else {
            return Frame::error("ERR invalid argument");
        };
        let Some(index) = int_arg(args, 2) else {
            return Frame::error("ERR index must be an integer");
        };
        match self.store.lset(&key, index, &value) {
            Ok(()) => Frame::ok(),
            Err(e) => reply_err(e),
        }
    }

    fn cmd_lget(&self, args: &[Frame]) -> Frame {
        if args.len() != 3 {
            return wrong_arity("LGET");
        }
        let Some(key) = text_arg(args, 1) else {
            return Frame::error("ERR invalid argument");
        };
        let Some(index) = int_arg(args, 2) else {
            return Frame::error("ERR index must be an integer");
        };
        match self.store.lget(&key, index) {
            Ok(value) => Frame::bulk(value),
            Err(e) => reply_err(e),
        }
    }

    fn cmd_keys(&self, args: &[Frame]) -> Frame {
        if args.len() != 2 {
            return wrong_arity("KEYS");
        }
        let Some(pattern) = text_arg(args, 1) else {
            return Frame::error("ERR invalid argument");
        };
        match self.store.keys_matching(&pattern) {
            Ok(mut keys) => {
                // Deterministic replies regardless of map iteration order.
                keys.sort();
                Frame::bulk_array(keys)
            }
            Err(e) => reply_err(e),
        }
    }

    fn cmd_expire(&self, args: &[Frame]) -> Frame {
        if args.len() != 3 {
            return wrong_arity("EXPIRE");
        }
        let Some(key) = text_arg(args, 1) else {
            return Frame::error("ERR invalid argument");
        };
        let secs = match int_arg(args, 2) {
            Some(n) if n >= 0 => n as u64,
            _ => return Frame::error("ERR invalid expire time"),
        };
        Frame::Integer(self.store.expire(&key, secs) as i64)
    }

    fn cmd_save(&self) -> Frame {
        match self.store.save_to_file(&self.snapshot_path) {
            Ok(()) => Frame::ok(),
            Err(e) => Frame::error(format!("ERR save failed: {e}")),
        }
    }
}

/// The key a command operates on, for the lazy expiry check. Commands
/// without a key target (and SET, which overwrites unconditionally) return
/// `None`.
fn keyed_target(name: &str, args: &[Frame]) -> Option<String> {
    match name {
        "GET" | "KIND" | "HSET" | "HGET" | "LPUSH" | "RPUSH" | "RADDTOSET" | "LPOP" | "RPOP"
        | "LSET" | "LGET" | "EXPIRE" => text_arg(args, 1),
        _ => None,
    }
}

fn text_arg(args: &[Frame], index: usize) -> Option<String> {
    args.get(index).and_then(|f| f.as_text()).map(str::to_string)
}

fn int_arg(args: &[Frame], index: usize) -> Option<i64> {
    args.get(index)?.as_text()?.parse().ok()
}

fn key_and_values(args: &[Frame]) -> Option<(String, Vec<String>)> {
    if args.len() < 3 {
        return None;
    }
    let key = text_arg(args, 1)?;
    let values = args[2..]
        .iter()
        .map(|f| f.as_text().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    Some((key, values))
}

fn wrong_arity(name: &str) -> Frame {
    Frame::error(format!("ERR wrong number of arguments for '{name}'"))
}

fn reply_err(e: StoreError) -> Frame {
    Frame::error(format!("ERR {e}"))
}
