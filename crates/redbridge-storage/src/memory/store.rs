//! In-process keyspace that speaks a subset of the Redis protocol

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use redbridge_core::{Error, Result};
use redis::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::pool::PubSubMessage;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub(crate) struct Subscriber {
    pub(crate) channels: HashSet<String>,
    pub(crate) patterns: HashSet<String>,
    sender: mpsc::UnboundedSender<PubSubMessage>,
}

/// Keyspace shared by every pool pointing at the same address and database
///
/// Expiry is lazy: expired keys disappear when read, or in bulk with
/// [`purge_expired`](MemoryStore::purge_expired). Time follows the tokio
/// clock, so paused-time tests can advance it.
pub struct MemoryStore {
    data: DashMap<String, Entry>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            subscribers: DashMap::new(),
            next_subscriber: AtomicU64::new(1),
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.data.len())
    }

    /// Execute one command
    pub fn execute(&self, command: &str, args: &[Vec<u8>]) -> Result<Value> {
        let name = command.to_ascii_uppercase();
        match name.as_str() {
            "PING" => match args {
                [] => Ok(Value::SimpleString("PONG".into())),
                [message] => Ok(Value::BulkString(message.clone())),
                _ => Err(wrong_arity(&name)),
            },
            "ECHO" => match args {
                [message] => Ok(Value::BulkString(message.clone())),
                _ => Err(wrong_arity(&name)),
            },
            "INFO" => Ok(Value::BulkString(self.info().into_bytes())),
            "GET" => match args {
                [key] => Ok(self
                    .read(&text(key))
                    .map_or(Value::Nil, Value::BulkString)),
                _ => Err(wrong_arity(&name)),
            },
            "SET" => self.set(args),
            "SETEX" | "PSETEX" => match args {
                [key, amount, value] => {
                    let amount = integer(amount)?;
                    if amount <= 0 {
                        return Err(invalid_expire(&name));
                    }
                    let ttl = if name == "SETEX" {
                        Duration::from_secs(amount as u64)
                    } else {
                        Duration::from_millis(amount as u64)
                    };
                    self.write(text(key), value.clone(), Some(deadline(ttl, &name)?));
                    Ok(Value::Okay)
                }
                _ => Err(wrong_arity(&name)),
            },
            "DEL" if !args.is_empty() => {
                let now = Instant::now();
                let removed = args
                    .iter()
                    .filter_map(|key| self.data.remove(&text(key)))
                    .filter(|(_, entry)| !entry.is_expired(now))
                    .count();
                Ok(Value::Int(removed as i64))
            }
            "EXISTS" if !args.is_empty() => {
                let present = args.iter().filter(|key| self.contains(&text(key))).count();
                Ok(Value::Int(present as i64))
            }
            "EXPIRE" | "PEXPIRE" => match args {
                [key, amount] => {
                    let amount = integer(amount)?;
                    let ttl = if name == "EXPIRE" {
                        Duration::from_secs(amount.max(0) as u64)
                    } else {
                        Duration::from_millis(amount.max(0) as u64)
                    };
                    Ok(Value::Int(self.expire(&text(key), amount, ttl, &name)? as i64))
                }
                _ => Err(wrong_arity(&name)),
            },
            "PERSIST" => match args {
                [key] => {
                    let key = text(key);
                    let persisted = self.contains(&key)
                        && self
                            .data
                            .get_mut(&key)
                            .and_then(|mut entry| entry.expires_at.take())
                            .is_some();
                    Ok(Value::Int(persisted as i64))
                }
                _ => Err(wrong_arity(&name)),
            },
            "TTL" | "PTTL" => match args {
                [key] => {
                    let remaining = self.remaining(&text(key));
                    let reply = match remaining {
                        None => -2,
                        Some(None) => -1,
                        Some(Some(left)) if name == "TTL" => {
                            ((left.as_millis() + 500) / 1000) as i64
                        }
                        Some(Some(left)) => left.as_millis() as i64,
                    };
                    Ok(Value::Int(reply))
                }
                _ => Err(wrong_arity(&name)),
            },
            "INCR" => match args {
                [key] => self.increment(&text(key), 1),
                _ => Err(wrong_arity(&name)),
            },
            "INCRBY" => match args {
                [key, by] => self.increment(&text(key), integer(by)?),
                _ => Err(wrong_arity(&name)),
            },
            "DBSIZE" => Ok(Value::Int(self.len() as i64)),
            "FLUSHDB" | "FLUSHALL" => {
                self.data.clear();
                Ok(Value::Okay)
            }
            "PUBLISH" => match args {
                [channel, message] => Ok(Value::Int(self.publish(&text(channel), message) as i64)),
                _ => Err(wrong_arity(&name)),
            },
            // Each pooled command runs on a fresh connection, so a
            // transaction cannot span commands here.
            "MULTI" => Ok(Value::Okay),
            "EXEC" | "DISCARD" => Err(Error::Backend(format!("ERR {name} without MULTI"))),
            "DEL" | "EXISTS" => Err(wrong_arity(&name)),
            _ => Err(Error::Backend(format!("ERR unknown command '{command}'"))),
        }
    }

    fn info(&self) -> String {
        format!(
            "# Server\r\nredis_version:7.2.0\r\nredis_mode:standalone\r\n\
             # Clients\r\npubsub_clients:{}\r\n\
             # Keyspace\r\ndb0:keys={}\r\n",
            self.subscribers.len(),
            self.len()
        )
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        if let Some(entry) = self.data.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        self.data.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    fn contains(&self, key: &str) -> bool {
        self.remaining(key).is_some()
    }

    /// `None` for absent keys, `Some(None)` for keys without expiry
    fn remaining(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        let entry = self.data.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(entry.expires_at.map(|at| at.saturating_duration_since(now)))
    }

    fn write(&self, key: String, value: Vec<u8>, expires_at: Option<Instant>) {
        self.data.insert(key, Entry { value, expires_at });
    }

    fn set(&self, args: &[Vec<u8>]) -> Result<Value> {
        let [key, value, options @ ..] = args else {
            return Err(wrong_arity("SET"));
        };
        let key = text(key);

        let mut expires_at = None;
        let mut keep_ttl = false;
        let mut only_if_absent = false;
        let mut only_if_present = false;
        let mut options = options.iter();
        while let Some(option) = options.next() {
            match text(option).to_ascii_uppercase().as_str() {
                unit @ ("EX" | "PX") => {
                    let amount = options.next().ok_or_else(syntax_error).and_then(|a| integer(a))?;
                    if amount <= 0 {
                        return Err(invalid_expire("SET"));
                    }
                    let ttl = if unit == "EX" {
                        Duration::from_secs(amount as u64)
                    } else {
                        Duration::from_millis(amount as u64)
                    };
                    expires_at = Some(deadline(ttl, "SET")?);
                }
                "KEEPTTL" => keep_ttl = true,
                "NX" => only_if_absent = true,
                "XX" => only_if_present = true,
                _ => return Err(syntax_error()),
            }
        }

        let exists = self.contains(&key);
        if (only_if_absent && exists) || (only_if_present && !exists) {
            return Ok(Value::Nil);
        }
        if keep_ttl && exists && expires_at.is_none() {
            expires_at = self.data.get(&key).and_then(|entry| entry.expires_at);
        }
        self.write(key, value.clone(), expires_at);
        Ok(Value::Okay)
    }

    fn expire(&self, key: &str, amount: i64, ttl: Duration, command: &str) -> Result<bool> {
        let expires_at = if amount > 0 { Some(deadline(ttl, command)?) } else { None };
        if !self.contains(key) {
            return Ok(false);
        }
        match expires_at {
            None => {
                self.data.remove(key);
            }
            Some(at) => {
                if let Some(mut entry) = self.data.get_mut(key) {
                    entry.expires_at = Some(at);
                }
            }
        }
        Ok(true)
    }

    fn increment(&self, key: &str, by: i64) -> Result<Value> {
        let now = Instant::now();
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| Entry {
            value: b"0".to_vec(),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.value = b"0".to_vec();
            entry.expires_at = None;
        }
        let current = integer(&entry.value)?;
        let next = current
            .checked_add(by)
            .ok_or_else(|| Error::Backend("ERR increment or decrement would overflow".into()))?;
        entry.value = next.to_string().into_bytes();
        Ok(Value::Int(next))
    }

    pub(crate) fn register_subscriber(&self) -> (u64, mpsc::UnboundedReceiver<PubSubMessage>) {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.insert(
            id,
            Subscriber {
                channels: HashSet::new(),
                patterns: HashSet::new(),
                sender,
            },
        );
        (id, receiver)
    }

    pub(crate) fn update_subscriber(&self, id: u64, update: impl FnOnce(&mut Subscriber)) {
        if let Some(mut subscriber) = self.subscribers.get_mut(&id) {
            update(&mut subscriber);
        }
    }

    pub(crate) fn remove_subscriber(&self, id: u64) {
        self.subscribers.remove(&id);
    }

    fn publish(&self, channel: &str, payload: &[u8]) -> usize {
        let mut receivers = 0;
        for subscriber in self.subscribers.iter() {
            if subscriber.channels.contains(channel) {
                let message = PubSubMessage {
                    channel: channel.to_string(),
                    pattern: None,
                    payload: payload.to_vec(),
                };
                if subscriber.sender.send(message).is_ok() {
                    receivers += 1;
                }
            }
            for pattern in &subscriber.patterns {
                if glob_match(pattern.as_bytes(), channel.as_bytes()) {
                    let message = PubSubMessage {
                        channel: channel.to_string(),
                        pattern: Some(pattern.clone()),
                        payload: payload.to_vec(),
                    };
                    if subscriber.sender.send(message).is_ok() {
                        receivers += 1;
                    }
                }
            }
        }
        receivers
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn integer(bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Backend("ERR value is not an integer or out of range".into()))
}

fn wrong_arity(command: &str) -> Error {
    Error::Backend(format!(
        "ERR wrong number of arguments for '{}' command",
        command.to_ascii_lowercase()
    ))
}

fn invalid_expire(command: &str) -> Error {
    Error::Backend(format!(
        "ERR invalid expire time in '{}' command",
        command.to_ascii_lowercase()
    ))
}

/// Absolute expiry for a TTL; rejects TTLs past the clock's range
fn deadline(ttl: Duration, command: &str) -> Result<Instant> {
    Instant::now()
        .checked_add(ttl)
        .ok_or_else(|| invalid_expire(command))
}

fn syntax_error() -> Error {
    Error::Backend("ERR syntax error".into())
}

/// Redis-style glob matching: `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some(b'?') => Some(p + 1),
            Some(b'[') => match_class(pattern, p, text[t]),
            Some(b'\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
            Some(&c) => (c == text[t]).then_some(p + 1),
            None => None,
        };
        match (step, star) {
            (Some(next), _) => {
                p = next;
                t += 1;
            }
            (None, Some((star_p, star_t))) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            (None, None) => return false,
        }
    }

    pattern[p.min(pattern.len())..].iter().all(|&c| c == b'*')
}

/// Match one byte against the class starting at `start`; returns the index
/// after the class on success
fn match_class(pattern: &[u8], start: usize, c: u8) -> Option<usize> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }
    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == c;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = (pattern[i].min(pattern[i + 2]), pattern[i].max(pattern[i + 2]));
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= pattern[i] == c;
            i += 1;
        }
    }
    if i >= pattern.len() {
        // unterminated class is a literal '['
        return (c == b'[').then_some(start + 1);
    }
    (matched != negate).then_some(i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(store: &MemoryStore, line: &[&str]) -> Result<Value> {
        let args: Vec<Vec<u8>> = line[1..].iter().map(|a| a.as_bytes().to_vec()).collect();
        store.execute(line[0], &args)
    }

    #[test]
    fn test_get_set_del() {
        let store = MemoryStore::new();
        assert_eq!(run(&store, &["GET", "k"]).unwrap(), Value::Nil);
        assert_eq!(run(&store, &["SET", "k", "v"]).unwrap(), Value::Okay);
        assert_eq!(
            run(&store, &["get", "k"]).unwrap(),
            Value::BulkString(b"v".to_vec())
        );
        assert_eq!(run(&store, &["DEL", "k", "other"]).unwrap(), Value::Int(1));
        assert_eq!(run(&store, &["EXISTS", "k"]).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_set_conditions() {
        let store = MemoryStore::new();
        assert_eq!(run(&store, &["SET", "k", "1", "XX"]).unwrap(), Value::Nil);
        assert_eq!(run(&store, &["SET", "k", "1", "NX"]).unwrap(), Value::Okay);
        assert_eq!(run(&store, &["SET", "k", "2", "NX"]).unwrap(), Value::Nil);
        assert_eq!(
            run(&store, &["GET", "k"]).unwrap(),
            Value::BulkString(b"1".to_vec())
        );
        assert!(matches!(
            run(&store, &["SET", "k", "1", "BOGUS"]),
            Err(Error::Backend(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_follows_tokio_clock() {
        let store = MemoryStore::new();
        run(&store, &["SETEX", "k", "1", "v"]).unwrap();
        assert_eq!(run(&store, &["TTL", "k"]).unwrap(), Value::Int(1));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(run(&store, &["GET", "k"]).unwrap(), Value::Nil);
        assert_eq!(run(&store, &["TTL", "k"]).unwrap(), Value::Int(-2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_and_persist() {
        let store = MemoryStore::new();
        run(&store, &["SET", "k", "v"]).unwrap();
        assert_eq!(run(&store, &["TTL", "k"]).unwrap(), Value::Int(-1));
        assert_eq!(run(&store, &["PEXPIRE", "k", "1500"]).unwrap(), Value::Int(1));
        assert_eq!(run(&store, &["PTTL", "k"]).unwrap(), Value::Int(1500));
        assert_eq!(run(&store, &["PERSIST", "k"]).unwrap(), Value::Int(1));
        assert_eq!(run(&store, &["PERSIST", "k"]).unwrap(), Value::Int(0));
        assert_eq!(run(&store, &["EXPIRE", "missing", "5"]).unwrap(), Value::Int(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        run(&store, &["PSETEX", "a", "10", "1"]).unwrap();
        run(&store, &["SET", "b", "2"]).unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepttl_ignores_expired_entry() {
        let store = MemoryStore::new();
        run(&store, &["SET", "k", "v", "PX", "10"]).unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(run(&store, &["SET", "k", "v2", "KEEPTTL"]).unwrap(), Value::Okay);
        assert_eq!(
            run(&store, &["GET", "k"]).unwrap(),
            Value::BulkString(b"v2".to_vec())
        );
        assert_eq!(run(&store, &["TTL", "k"]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_expire_time_out_of_range() {
        let store = MemoryStore::new();
        run(&store, &["SET", "k", "v"]).unwrap();
        let huge = i64::MAX.to_string();
        for (line, command) in [
            (vec!["SETEX", "k", huge.as_str(), "v"], "setex"),
            (vec!["SET", "k", "v", "EX", huge.as_str()], "set"),
            (vec!["EXPIRE", "k", huge.as_str()], "expire"),
        ] {
            match run(&store, &line) {
                Err(Error::Backend(message)) => assert_eq!(
                    message,
                    format!("ERR invalid expire time in '{command}' command")
                ),
                other => panic!("unexpected reply to {line:?}: {other:?}"),
            }
        }
        assert_eq!(run(&store, &["TTL", "k"]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_incr() {
        let store = MemoryStore::new();
        assert_eq!(run(&store, &["INCR", "n"]).unwrap(), Value::Int(1));
        assert_eq!(run(&store, &["INCRBY", "n", "41"]).unwrap(), Value::Int(42));
        run(&store, &["SET", "s", "text"]).unwrap();
        assert!(run(&store, &["INCR", "s"]).is_err());
    }

    #[test]
    fn test_errors() {
        let store = MemoryStore::new();
        assert!(matches!(run(&store, &["NOPE"]), Err(Error::Backend(_))));
        assert!(matches!(run(&store, &["GET"]), Err(Error::Backend(_))));
        assert!(matches!(run(&store, &["EXEC"]), Err(Error::Backend(_))));
        assert!(matches!(run(&store, &["SETEX", "k", "0", "v"]), Err(Error::Backend(_))));
    }

    #[test]
    fn test_info_and_ping() {
        let store = MemoryStore::new();
        assert_eq!(
            run(&store, &["PING"]).unwrap(),
            Value::SimpleString("PONG".into())
        );
        match run(&store, &["INFO"]).unwrap() {
            Value::BulkString(info) => {
                assert!(String::from_utf8(info).unwrap().contains("redis_version"))
            }
            other => panic!("unexpected INFO reply: {other:?}"),
        }
    }

    #[test]
    fn test_glob() {
        let cases: &[(&str, &str, bool)] = &[
            ("*", "anything", true),
            ("news.*", "news.sport", true),
            ("news.*", "weather", false),
            ("h?llo", "hello", true),
            ("h?llo", "hllo", false),
            ("h[ae]llo", "hallo", true),
            ("h[^e]llo", "hello", false),
            ("h[a-c]llo", "hbllo", true),
            ("a\\*b", "a*b", true),
            ("a\\*b", "axb", false),
            ("*.log", "app.err.log", true),
        ];
        for (pattern, text, expected) in cases {
            assert_eq!(
                glob_match(pattern.as_bytes(), text.as_bytes()),
                *expected,
                "{pattern} vs {text}"
            );
        }
    }
}
