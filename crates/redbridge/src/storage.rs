//! The service object owning every backend's configuration and pools

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use redbridge_core::{BackendId, CacheDecoder, CacheEncoder, Error, RedisConfiguration, Result};
use redbridge_storage::{ConnectionPool, Driver, SubscriptionClient};
use tracing::{debug, info};

use crate::cache::RedisCache;
use crate::context::{ExecutionContext, ExecutionContexts, RequestContext};
use crate::redis::Redis;

/// Service-level settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Number of execution contexts; each gets its own pool per backend
    pub execution_contexts: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            execution_contexts: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl StorageConfig {
    /// Use a fixed number of execution contexts
    pub fn with_execution_contexts(count: usize) -> Self {
        Self {
            execution_contexts: count.max(1),
        }
    }
}

struct Registered {
    configuration: RedisConfiguration,
    locked: bool,
}

type PoolKey = (BackendId, ExecutionContext);

struct Inner {
    driver: Box<dyn Driver>,
    configurations: RwLock<HashMap<BackendId, Registered>>,
    pools: RwLock<HashMap<PoolKey, Arc<dyn ConnectionPool>>>,
    pool_creation: Mutex<()>,
    subscriptions: RwLock<HashMap<BackendId, SubscriptionClient>>,
    subscription_creation: Mutex<()>,
    contexts: ExecutionContexts,
    next_request: AtomicU64,
    shut_down: AtomicBool,
}

/// Registry of Redis backends for one application
///
/// Construct once at startup and hand clones to whatever needs Redis; all
/// clones share the same configurations and pools.
///
/// # Example
///
/// ```rust,no_run
/// use redbridge::prelude::*;
///
/// # async fn run() -> redbridge::Result<()> {
/// let storage = RedisStorage::new(RedisDriver);
/// storage.use_configuration("default", RedisConfiguration::from_url("redis://localhost:6379/0")?)?;
///
/// let cache = storage.cache();
/// cache.set("greeting", Some("hello")).await?;
/// let greeting: Option<String> = cache.get("greeting").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStorage {
    inner: Arc<Inner>,
}

impl RedisStorage {
    /// Create a storage with default settings
    pub fn new(driver: impl Driver) -> Self {
        Self::with_config(driver, StorageConfig::default())
    }

    /// Create a storage with custom settings
    pub fn with_config(driver: impl Driver, config: StorageConfig) -> Self {
        debug!(
            target: "redbridge",
            driver = driver.name(),
            execution_contexts = config.execution_contexts,
            "Created Redis storage"
        );
        Self {
            inner: Arc::new(Inner {
                driver: Box::new(driver),
                configurations: RwLock::new(HashMap::new()),
                pools: RwLock::new(HashMap::new()),
                pool_creation: Mutex::new(()),
                subscriptions: RwLock::new(HashMap::new()),
                subscription_creation: Mutex::new(()),
                contexts: ExecutionContexts::new(config.execution_contexts),
                next_request: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register (or replace) the configuration of an identity
    ///
    /// Fails with [`Error::ConfigurationLocked`] once a pool exists for the
    /// identity.
    pub fn use_configuration(
        &self,
        id: impl Into<BackendId>,
        configuration: RedisConfiguration,
    ) -> Result<()> {
        let id = id.into();
        let mut configurations = self.inner.configurations.write();
        if configurations.get(&id).is_some_and(|r| r.locked) {
            return Err(Error::ConfigurationLocked(id));
        }
        info!(
            target: "redbridge",
            backend = %id,
            address = %configuration.address(),
            database = configuration.database,
            "Configured Redis backend"
        );
        configurations.insert(
            id,
            Registered {
                configuration,
                locked: false,
            },
        );
        Ok(())
    }

    /// The configuration registered for an identity
    pub fn configuration(&self, id: &BackendId) -> Option<RedisConfiguration> {
        self.inner
            .configurations
            .read()
            .get(id)
            .map(|r| r.configuration.clone())
    }

    /// Whether an identity's configuration can no longer change
    pub fn is_locked(&self, id: &BackendId) -> bool {
        self.inner
            .configurations
            .read()
            .get(id)
            .is_some_and(|r| r.locked)
    }

    /// Every configured identity, sorted
    pub fn identities(&self) -> Vec<BackendId> {
        let mut ids: Vec<_> = self.inner.configurations.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Pool for an identity on one execution context, created on first use
    pub fn pool(
        &self,
        context: ExecutionContext,
        id: &BackendId,
    ) -> Result<Arc<dyn ConnectionPool>> {
        self.ensure_running()?;
        let key = (id.clone(), context);
        if let Some(pool) = self.inner.pools.read().get(&key) {
            return Ok(pool.clone());
        }

        let _creating = self.inner.pool_creation.lock();
        self.ensure_running()?;
        if let Some(pool) = self.inner.pools.read().get(&key) {
            return Ok(pool.clone());
        }

        let mut configurations = self.inner.configurations.write();
        let registered = configurations
            .get_mut(id)
            .ok_or_else(|| Error::Unconfigured(id.clone()))?;
        let pool = self
            .inner
            .driver
            .make_pool(id, &registered.configuration)?;
        self.inner.pools.write().insert(key, pool.clone());
        registered.locked = true;

        debug!(target: "redbridge", backend = %id, %context, "Created connection pool");
        Ok(pool)
    }

    /// Number of pools created so far
    pub fn pool_count(&self) -> usize {
        self.inner.pools.read().len()
    }

    /// Subscription client for an identity, created on first use
    ///
    /// Its connection comes from the identity's first-context pool and is
    /// never used for regular commands.
    pub fn subscriptions(&self, id: &BackendId) -> Result<SubscriptionClient> {
        self.ensure_running()?;
        if let Some(client) = self.inner.subscriptions.read().get(id) {
            return Ok(client.clone());
        }

        let _creating = self.inner.subscription_creation.lock();
        self.ensure_running()?;
        if let Some(client) = self.inner.subscriptions.read().get(id) {
            return Ok(client.clone());
        }

        let context = self
            .inner
            .contexts
            .get(0)
            .unwrap_or_else(|| self.next_context());
        let pool = self.pool(context, id)?;
        let client = SubscriptionClient::new(pool, id.as_str());
        self.inner
            .subscriptions
            .write()
            .insert(id.clone(), client.clone());
        Ok(client)
    }

    /// Client facade for an identity
    pub fn redis(&self, id: impl Into<BackendId>) -> Redis {
        Redis::new(self.clone(), id.into())
    }

    /// Client facade for the default identity
    pub fn redis_default(&self) -> Redis {
        self.redis(BackendId::default())
    }

    /// JSON cache over the default identity
    pub fn cache(&self) -> RedisCache {
        self.cache_for(BackendId::default())
    }

    /// JSON cache over an identity
    pub fn cache_for(&self, id: impl Into<BackendId>) -> RedisCache {
        RedisCache::new(self.redis(id))
    }

    /// Cache over an identity with a custom coder pair
    pub fn cache_with<E, D>(&self, id: impl Into<BackendId>, encoder: E, decoder: D) -> RedisCache<E, D>
    where
        E: CacheEncoder,
        D: CacheDecoder,
    {
        RedisCache::with_coders(self.redis(id), encoder, decoder)
    }

    /// Pick the next execution context, round-robin
    pub fn next_context(&self) -> ExecutionContext {
        self.inner.contexts.next()
    }

    /// Number of execution contexts
    pub fn execution_contexts(&self) -> usize {
        self.inner.contexts.len()
    }

    /// Start a unit of work on the next execution context
    pub fn request(&self) -> RequestContext {
        let id = self.inner.next_request.fetch_add(1, Ordering::Relaxed) + 1;
        RequestContext::new(id, self.next_context())
    }

    /// Close subscriptions and drop every pool
    ///
    /// Later pool lookups fail with [`Error::ShutDown`]. Connections still
    /// leased finish their work and close when released.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscriptions: Vec<_> = {
            let _creating = self.inner.subscription_creation.lock();
            self.inner.subscriptions.write().drain().collect()
        };
        for (_, client) in &subscriptions {
            client.close();
        }
        let pools = {
            let _creating = self.inner.pool_creation.lock();
            let mut pools = self.inner.pools.write();
            let count = pools.len();
            pools.clear();
            count
        };
        info!(
            target: "redbridge",
            pools,
            subscriptions = subscriptions.len(),
            "Redis storage shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(Error::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("driver", &self.inner.driver.name())
            .field("identities", &self.identities())
            .field("pools", &self.pool_count())
            .field("execution_contexts", &self.execution_contexts())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
