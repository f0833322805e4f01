//! Per-identity Redis client facade

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redbridge_core::{BackendId, Error, RedisConfiguration, Result};
use redbridge_storage::{
    CommandArgs, ConnectionPool, LoggingClient, RedisClient, SubscriptionHandlers, Value,
};
use tracing::Span;

use crate::context::{ExecutionContext, RequestContext};
use crate::storage::RedisStorage;

/// Client for one configured identity
///
/// Implements [`RedisClient`], so every [`RedisCommands`] operation is
/// available. Without a bound execution context, each command picks the
/// next context's pool.
///
/// [`RedisCommands`]: redbridge_storage::RedisCommands
#[derive(Clone)]
pub struct Redis {
    storage: RedisStorage,
    id: BackendId,
    context: Option<ExecutionContext>,
    span: Option<Span>,
}

impl Redis {
    pub(crate) fn new(storage: RedisStorage, id: BackendId) -> Self {
        Self {
            storage,
            id,
            context: None,
            span: None,
        }
    }

    pub fn id(&self) -> &BackendId {
        &self.id
    }

    /// Configuration of this identity, if registered
    pub fn configuration(&self) -> Option<RedisConfiguration> {
        self.storage.configuration(&self.id)
    }

    /// Register the configuration of this identity
    pub fn use_configuration(&self, configuration: RedisConfiguration) -> Result<()> {
        self.storage.use_configuration(self.id.clone(), configuration)
    }

    /// A copy of this client that records its commands under `span`
    pub fn logging(&self, span: Span) -> Self {
        Self {
            span: Some(span),
            ..self.clone()
        }
    }

    /// A copy bound to a request's execution context and span
    pub fn for_request(&self, request: &RequestContext) -> Self {
        Self {
            context: Some(request.context()),
            span: Some(request.span().clone()),
            ..self.clone()
        }
    }

    /// The pool commands go through
    pub fn pool(&self) -> Result<Arc<dyn ConnectionPool>> {
        let context = self
            .context
            .unwrap_or_else(|| self.storage.next_context());
        self.storage.pool(context, &self.id)
    }

    fn span(&self) -> Span {
        self.span.clone().unwrap_or_else(Span::current)
    }

    /// Run `op` with exclusive use of one pooled connection
    ///
    /// Commands sent through the [`BorrowedConnection`] run in order on the
    /// same connection, which makes MULTI/EXEC usable. The connection goes
    /// back to the pool when `op` finishes, fails or is dropped.
    pub async fn with_borrowed_connection<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(BorrowedConnection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let pool = self.pool()?;
        let leased: Arc<dyn RedisClient> = Arc::from(pool.lease().await?);
        let slot = Arc::new(Mutex::new(Some(leased)));
        let _release = ReleaseOnDrop(slot.clone());
        op(BorrowedConnection {
            slot,
            span: self.span(),
        })
        .await
    }

    /// Subscribe to channels on this identity's subscription connection
    pub async fn subscribe<I, S>(&self, channels: I, handlers: SubscriptionHandlers) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.storage
            .subscriptions(&self.id)?
            .subscribe(channels, handlers)
            .await
    }

    /// Unsubscribe from channels; an empty list removes every channel
    pub async fn unsubscribe<I, S>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.storage.subscriptions(&self.id)?.unsubscribe(channels).await
    }

    /// Subscribe to glob patterns
    pub async fn psubscribe<I, S>(&self, patterns: I, handlers: SubscriptionHandlers) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.storage
            .subscriptions(&self.id)?
            .psubscribe(patterns, handlers)
            .await
    }

    /// Unsubscribe from patterns; an empty list removes every pattern
    pub async fn punsubscribe<I, S>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.storage
            .subscriptions(&self.id)?
            .punsubscribe(patterns)
            .await
    }
}

#[async_trait]
impl RedisClient for Redis {
    async fn send(&self, command: &str, args: CommandArgs) -> Result<Value> {
        let pool = self.pool()?;
        LoggingClient::new(pool, self.span())
            .send(command, args)
            .await
    }
}

impl std::fmt::Debug for Redis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redis")
            .field("id", &self.id)
            .field("context", &self.context)
            .finish()
    }
}

type Slot = Arc<Mutex<Option<Arc<dyn RedisClient>>>>;

struct ReleaseOnDrop(Slot);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// One connection leased for the duration of
/// [`Redis::with_borrowed_connection`]
#[derive(Clone)]
pub struct BorrowedConnection {
    slot: Slot,
    span: Span,
}

impl BorrowedConnection {
    /// Whether the connection has gone back to the pool
    pub fn is_released(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn client(&self) -> Result<Arc<dyn RedisClient>> {
        self.slot
            .lock()
            .clone()
            .ok_or_else(|| Error::Connection("connection returned to pool".into()))
    }
}

#[async_trait]
impl RedisClient for BorrowedConnection {
    async fn send(&self, command: &str, args: CommandArgs) -> Result<Value> {
        let client = self.client()?;
        LoggingClient::new(client, self.span.clone())
            .send(command, args)
            .await
    }
}
