//! Connection pools and the drivers that create them

use std::sync::Arc;

use async_trait::async_trait;
use redbridge_core::{BackendId, RedisConfiguration, Result};

use crate::client::RedisClient;

/// A message received on a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// Channel the message was published on
    pub channel: String,
    /// Pattern that matched, for pattern subscriptions
    pub pattern: Option<String>,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl PubSubMessage {
    /// Payload as UTF-8 text, if it is valid
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// A connection dedicated to receiving published messages
///
/// Owned by a single task; the subscription manager is the only caller.
#[async_trait]
pub trait PubSubConnection: Send {
    async fn subscribe(&mut self, channel: &str) -> Result<()>;
    async fn unsubscribe(&mut self, channel: &str) -> Result<()>;
    async fn psubscribe(&mut self, pattern: &str) -> Result<()>;
    async fn punsubscribe(&mut self, pattern: &str) -> Result<()>;

    /// Wait for the next message; `None` once the connection is gone
    async fn next_message(&mut self) -> Option<PubSubMessage>;
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open connections
    pub connections: u32,
    /// Connections not currently in use
    pub idle: u32,
}

/// A pool of connections to one backend
///
/// Sending through the pool borrows any free connection for a single
/// command. [`lease`](ConnectionPool::lease) keeps one connection for a
/// sequence of commands and returns it when the lease is dropped.
#[async_trait]
pub trait ConnectionPool: RedisClient {
    /// Take one connection out of the pool until the returned client drops
    async fn lease(&self) -> Result<Box<dyn RedisClient>>;

    /// Open a connection for subscriptions
    async fn pubsub_connection(&self) -> Result<Box<dyn PubSubConnection>>;

    /// Current occupancy
    fn status(&self) -> PoolStatus;
}

/// Creates pools for configured backends
///
/// Pool creation is synchronous; connections are opened lazily by the pool.
pub trait Driver: Send + Sync + 'static {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Build a pool for one backend
    fn make_pool(
        &self,
        id: &BackendId,
        configuration: &RedisConfiguration,
    ) -> Result<Arc<dyn ConnectionPool>>;
}

impl<D: Driver + ?Sized> Driver for Arc<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn make_pool(
        &self,
        id: &BackendId,
        configuration: &RedisConfiguration,
    ) -> Result<Arc<dyn ConnectionPool>> {
        (**self).make_pool(id, configuration)
    }
}
