use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use redbridge_core::{BackendId, RedisConfiguration, Result};
use tracing::debug;

use super::pool::MemoryPool;
use super::store::MemoryStore;
use crate::pool::{ConnectionPool, Driver};

/// Driver that keeps every backend in process
///
/// Configurations with the same address and database share one keyspace,
/// the way two pools to the same server would.
#[derive(Default)]
pub struct MemoryDriver {
    stores: DashMap<String, Arc<MemoryStore>>,
    pools_created: AtomicUsize,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The keyspace a configuration points at
    pub fn store(&self, configuration: &RedisConfiguration) -> Arc<MemoryStore> {
        let key = format!("{}/{}", configuration.address(), configuration.database);
        self.stores.entry(key).or_default().clone()
    }

    /// Number of pools built so far
    pub fn pools_created(&self) -> usize {
        self.pools_created.load(Ordering::Relaxed)
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn make_pool(
        &self,
        id: &BackendId,
        configuration: &RedisConfiguration,
    ) -> Result<Arc<dyn ConnectionPool>> {
        let store = self.store(configuration);
        let created = self.pools_created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            target: "redbridge",
            backend = %id,
            address = %configuration.address(),
            database = configuration.database,
            created,
            "Created memory pool"
        );
        Ok(Arc::new(MemoryPool::new(store, configuration.pool.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RedisCommands;

    #[tokio::test]
    async fn test_same_address_shares_keyspace() {
        let driver = MemoryDriver::new();
        let config = RedisConfiguration::default();
        let a = driver.make_pool(&"a".into(), &config).unwrap();
        let b = driver.make_pool(&"b".into(), &config).unwrap();
        let other = driver
            .make_pool(&"c".into(), &config.clone().database(1))
            .unwrap();

        a.set("k", b"v").await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(other.get("k").await.unwrap(), None);
        assert_eq!(driver.pools_created(), 3);
    }
}
