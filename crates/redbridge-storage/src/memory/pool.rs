use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redbridge_core::{Error, PoolOptions, Result};
use redis::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::pubsub::MemorySubscription;
use super::store::MemoryStore;
use crate::client::{CommandArgs, RedisClient};
use crate::pool::{ConnectionPool, PoolStatus, PubSubConnection};

/// Pool over a [`MemoryStore`]
///
/// Connections are permits: at most `maximum_connections` commands or
/// leases are in flight, and waiting longer than the retry timeout fails
/// with [`Error::Timeout`].
pub struct MemoryPool {
    store: Arc<MemoryStore>,
    permits: Arc<Semaphore>,
    options: PoolOptions,
}

impl MemoryPool {
    pub fn new(store: Arc<MemoryStore>, options: PoolOptions) -> Self {
        let size = options.maximum_connections.max(1) as usize;
        Self {
            store,
            permits: Arc::new(Semaphore::new(size)),
            options,
        }
    }

    /// The keyspace behind this pool
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        tokio::time::timeout(
            self.options.connection_retry_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|_| Error::Connection("pool closed".into()))
    }
}

#[async_trait]
impl RedisClient for MemoryPool {
    async fn send(&self, command: &str, args: CommandArgs) -> Result<Value> {
        let _permit = self.acquire().await?;
        self.store.execute(command, &args)
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    async fn lease(&self) -> Result<Box<dyn RedisClient>> {
        let permit = self.acquire().await?;
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
            queued: Mutex::new(None),
            _permit: permit,
        }))
    }

    async fn pubsub_connection(&self) -> Result<Box<dyn PubSubConnection>> {
        Ok(Box::new(MemorySubscription::new(self.store.clone())))
    }

    fn status(&self) -> PoolStatus {
        let size = self.options.maximum_connections.max(1);
        PoolStatus {
            connections: size,
            idle: self.permits.available_permits() as u32,
        }
    }
}

/// A single leased connection; supports MULTI/EXEC
struct MemoryConnection {
    store: Arc<MemoryStore>,
    queued: Mutex<Option<Vec<(String, CommandArgs)>>>,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    fn dispatch(&self, command: &str, args: CommandArgs) -> Result<Value> {
        let name = command.to_ascii_uppercase();
        let mut queued = self.queued.lock();
        match (name.as_str(), queued.is_some()) {
            ("MULTI", true) => Err(Error::Backend("ERR MULTI calls can not be nested".into())),
            ("MULTI", false) => {
                *queued = Some(Vec::new());
                Ok(Value::Okay)
            }
            ("EXEC", true) => {
                let commands = queued.take().unwrap_or_default();
                drop(queued);
                let replies = commands
                    .iter()
                    .map(|(command, args)| self.store.execute(command, args))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(replies))
            }
            ("DISCARD", true) => {
                *queued = None;
                Ok(Value::Okay)
            }
            ("EXEC" | "DISCARD", false) => {
                Err(Error::Backend(format!("ERR {name} without MULTI")))
            }
            (_, true) => {
                if let Some(pending) = queued.as_mut() {
                    pending.push((command.to_string(), args));
                }
                Ok(Value::SimpleString("QUEUED".into()))
            }
            (_, false) => {
                drop(queued);
                self.store.execute(command, &args)
            }
        }
    }
}

#[async_trait]
impl RedisClient for MemoryConnection {
    async fn send(&self, command: &str, args: CommandArgs) -> Result<Value> {
        self.dispatch(command, args)
    }
}
