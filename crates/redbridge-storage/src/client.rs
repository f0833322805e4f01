//! Uniform command surface over any Redis connection

use std::time::Duration;

use async_trait::async_trait;
use redbridge_core::{
    CacheDecoder, CacheEncoder, Error, JsonDecoder, JsonEncoder, KeyLifetime,
    RedisRepresentable, Result,
};
use redis::Value;
use serde::{de::DeserializeOwned, Serialize};

/// Arguments of a command, as byte strings
pub type CommandArgs = Vec<Vec<u8>>;

/// Anything that can execute a raw Redis command
///
/// Pools, leased connections and decorators all implement this; the typed
/// operations live on [`RedisCommands`].
#[async_trait]
pub trait RedisClient: Send + Sync {
    /// Send a command and wait for its reply
    async fn send(&self, command: &str, args: CommandArgs) -> Result<Value>;
}

/// Build an argument list from anything byte-like
pub fn args<I, A>(items: I) -> CommandArgs
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    items.into_iter().map(|a| a.as_ref().to_vec()).collect()
}

fn unexpected(command: &str, reply: &Value) -> Error {
    Error::UnexpectedResponse {
        command: command.to_string(),
        response: format!("{reply:?}"),
    }
}

pub(crate) fn expect_int(command: &str, reply: Value) -> Result<i64> {
    match reply {
        Value::Int(n) => Ok(n),
        other => Err(unexpected(command, &other)),
    }
}

pub(crate) fn expect_ok(command: &str, reply: Value) -> Result<()> {
    match reply {
        Value::Okay | Value::SimpleString(_) => Ok(()),
        other => Err(unexpected(command, &other)),
    }
}

pub(crate) fn expect_bytes(command: &str, reply: Value) -> Result<Option<Vec<u8>>> {
    match reply {
        Value::Nil => Ok(None),
        Value::BulkString(bytes) => Ok(Some(bytes)),
        Value::SimpleString(s) => Ok(Some(s.into_bytes())),
        other => Err(unexpected(command, &other)),
    }
}

/// Typed operations available on every [`RedisClient`]
///
/// Each method is one round-trip built on [`RedisClient::send`].
#[async_trait]
pub trait RedisCommands: RedisClient {
    /// `GET key`; `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let reply = self.send("GET", args([key])).await?;
        expect_bytes("GET", reply)
    }

    /// `GET key` as UTF-8 text
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
            .await?
            .map(String::from_bytes)
            .transpose()
    }

    /// `SET key value`
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let reply = self
            .send("SET", vec![key.as_bytes().to_vec(), value.to_vec()])
            .await?;
        expect_ok("SET", reply)
    }

    /// Set with an expiry
    ///
    /// Whole-second TTLs use `SETEX`, anything finer uses `PSETEX`.
    async fn setex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let (command, amount) = if ttl.subsec_nanos() == 0 {
            ("SETEX", ttl.as_secs().to_string())
        } else {
            ("PSETEX", ttl.as_millis().max(1).to_string())
        };
        let reply = self
            .send(
                command,
                vec![key.as_bytes().to_vec(), amount.into_bytes(), value.to_vec()],
            )
            .await?;
        expect_ok(command, reply)
    }

    /// `DEL keys...`; number of keys removed
    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let reply = self.send("DEL", args(keys)).await?;
        expect_int("DEL", reply).map(|n| n.max(0) as u64)
    }

    /// `EXISTS keys...`; number of keys present
    async fn exists(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let reply = self.send("EXISTS", args(keys)).await?;
        expect_int("EXISTS", reply).map(|n| n.max(0) as u64)
    }

    /// Expire a key after a duration; `false` when the key is absent
    async fn expire(&self, key: &str, after: Duration) -> Result<bool> {
        let (command, amount) = if after.subsec_nanos() == 0 {
            ("EXPIRE", after.as_secs().to_string())
        } else {
            ("PEXPIRE", after.as_millis().max(1).to_string())
        };
        let reply = self.send(command, args([key, amount.as_str()])).await?;
        expect_int(command, reply).map(|n| n == 1)
    }

    /// `TTL key`
    async fn ttl(&self, key: &str) -> Result<KeyLifetime> {
        let reply = self.send("TTL", args([key])).await?;
        expect_int("TTL", reply).map(KeyLifetime::from_seconds)
    }

    /// `PTTL key`
    async fn pttl(&self, key: &str) -> Result<KeyLifetime> {
        let reply = self.send("PTTL", args([key])).await?;
        expect_int("PTTL", reply).map(KeyLifetime::from_millis)
    }

    /// `PUBLISH channel message`; number of receivers
    async fn publish(&self, channel: &str, message: &[u8]) -> Result<u64> {
        let reply = self
            .send("PUBLISH", vec![channel.as_bytes().to_vec(), message.to_vec()])
            .await?;
        expect_int("PUBLISH", reply).map(|n| n.max(0) as u64)
    }

    /// `PING`
    async fn ping(&self) -> Result<String> {
        match self.send("PING", Vec::new()).await? {
            Value::SimpleString(s) => Ok(s),
            Value::Okay => Ok("OK".to_string()),
            other => Err(unexpected("PING", &other)),
        }
    }

    /// Get a key and decode it with the given decoder
    ///
    /// Absent keys are `Ok(None)`; undecodable values are errors.
    async fn get_decoded<D, T>(&self, key: &str, decoder: &D) -> Result<Option<T>>
    where
        D: CacheDecoder,
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(bytes) => {
                let input = D::Input::from_bytes(bytes)?;
                decoder.decode(input).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Encode a value with the given encoder and set it
    async fn set_encoded<E, T>(&self, key: &str, value: &T, encoder: &E) -> Result<()>
    where
        E: CacheEncoder,
        T: Serialize + Sync + ?Sized,
    {
        let bytes = encoder.encode(value)?.into_bytes();
        self.set(key, &bytes).await
    }

    /// Encode a value with the given encoder and set it with an expiry
    async fn setex_encoded<E, T>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        encoder: &E,
    ) -> Result<()>
    where
        E: CacheEncoder,
        T: Serialize + Sync + ?Sized,
    {
        let bytes = encoder.encode(value)?.into_bytes();
        self.setex(key, &bytes, ttl).await
    }

    /// Get a key as JSON
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.get_decoded(key, &JsonDecoder).await
    }

    /// Set a key to a value encoded as JSON
    async fn set_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.set_encoded(key, value, &JsonEncoder::new()).await
    }

    /// Set a key to a value encoded as JSON, with an expiry
    async fn setex_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.setex_encoded(key, value, ttl, &JsonEncoder::new()).await
    }
}

impl<C: RedisClient + ?Sized> RedisCommands for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Records commands and answers from a script
    #[derive(Default)]
    struct ScriptedClient {
        sent: Mutex<Vec<(String, CommandArgs)>>,
        replies: Mutex<VecDeque<Value>>,
    }

    impl ScriptedClient {
        fn replying(replies: impl IntoIterator<Item = Value>) -> Self {
            Self {
                sent: Mutex::default(),
                replies: Mutex::new(replies.into_iter().collect()),
            }
        }

        fn sent(&self) -> Vec<(String, CommandArgs)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl RedisClient for ScriptedClient {
        async fn send(&self, command: &str, args: CommandArgs) -> Result<Value> {
            self.sent.lock().push((command.to_string(), args));
            Ok(self.replies.lock().pop_front().unwrap_or(Value::Nil))
        }
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let client = ScriptedClient::replying([Value::Nil]);
        assert_eq!(client.get("missing").await.unwrap(), None);
        assert_eq!(client.sent()[0].0, "GET");
    }

    #[tokio::test]
    async fn test_setex_picks_command_by_precision() {
        let client = ScriptedClient::replying([Value::Okay, Value::Okay]);
        client.setex("a", b"1", Duration::from_secs(5)).await.unwrap();
        client.setex("b", b"2", Duration::from_millis(1500)).await.unwrap();

        let sent = client.sent();
        assert_eq!(sent[0].0, "SETEX");
        assert_eq!(sent[0].1[1], b"5".to_vec());
        assert_eq!(sent[1].0, "PSETEX");
        assert_eq!(sent[1].1[1], b"1500".to_vec());
    }

    #[tokio::test]
    async fn test_ttl_decodes_lifetime() {
        let client = ScriptedClient::replying([Value::Int(-2), Value::Int(-1), Value::Int(9)]);
        assert_eq!(client.ttl("k").await.unwrap(), KeyLifetime::Missing);
        assert_eq!(client.ttl("k").await.unwrap(), KeyLifetime::Unlimited);
        assert_eq!(
            client.ttl("k").await.unwrap(),
            KeyLifetime::Limited(Duration::from_secs(9))
        );
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_error() {
        let client = ScriptedClient::replying([Value::Nil]);
        assert!(matches!(
            client.delete(&["k"]).await,
            Err(Error::UnexpectedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_key_lists_skip_the_network() {
        let client = ScriptedClient::default();
        assert_eq!(client.delete(&[]).await.unwrap(), 0);
        assert_eq!(client.exists(&[]).await.unwrap(), 0);
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_json_decode_failure_is_not_absence() {
        let client = ScriptedClient::replying([Value::BulkString(b"not json".to_vec())]);
        let result: Result<Option<Vec<i32>>> = client.get_json("k").await;
        assert!(matches!(result, Err(Error::Decoding(_))));
    }

    #[tokio::test]
    async fn test_json_encode_failure_sends_nothing() {
        let client = ScriptedClient::default();
        let value: HashMap<(u8, u8), u8> = HashMap::from([((1, 1), 1)]);
        assert!(matches!(
            client.set_json("k", &value).await,
            Err(Error::Encoding(_))
        ));
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_set_json_writes_json() {
        let client = ScriptedClient::replying([Value::Okay]);
        client.set_json("k", &vec![1, 2, 3]).await.unwrap();
        assert_eq!(client.sent()[0].1[1], b"[1,2,3]".to_vec());
    }
}
