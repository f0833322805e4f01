use std::sync::Arc;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redbridge_core::{BackendId, Error, RedisConfiguration, Result};
use redis::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{map_redis_error, map_run_error};
use super::pubsub::RedisSubscription;
use crate::client::{CommandArgs, RedisClient};
use crate::pool::{ConnectionPool, Driver, PoolStatus, PubSubConnection};

fn command(name: &str, args: &[Vec<u8>]) -> redis::Cmd {
    let mut cmd = redis::cmd(name);
    for arg in args {
        cmd.arg(arg.as_slice());
    }
    cmd
}

/// bb8 pool of multiplexed connections to one server
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool<RedisConnectionManager>,
    client: redis::Client,
}

impl RedisPool {
    /// Build the pool; no connection is opened until first use
    pub fn new(configuration: &RedisConfiguration) -> Result<Self> {
        let url = configuration.connection_url();
        let manager = RedisConnectionManager::new(url.as_str())
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        let options = &configuration.pool;
        let pool = Pool::builder()
            .max_size(options.maximum_connections.max(1))
            .min_idle(Some(options.minimum_connections))
            .connection_timeout(options.connection_retry_timeout)
            .idle_timeout(options.idle_timeout)
            .build_unchecked(manager);

        Ok(Self { pool, client })
    }
}

#[async_trait]
impl RedisClient for RedisPool {
    async fn send(&self, name: &str, args: CommandArgs) -> Result<Value> {
        let mut conn = self.pool.get().await.map_err(map_run_error)?;
        command(name, &args)
            .query_async::<Value>(&mut *conn)
            .await
            .map_err(map_redis_error)
    }
}

#[async_trait]
impl ConnectionPool for RedisPool {
    async fn lease(&self) -> Result<Box<dyn RedisClient>> {
        let conn = self.pool.get_owned().await.map_err(map_run_error)?;
        Ok(Box::new(LeasedConnection {
            conn: Mutex::new(conn),
        }))
    }

    async fn pubsub_connection(&self) -> Result<Box<dyn PubSubConnection>> {
        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(map_redis_error)?;
        Ok(Box::new(RedisSubscription::new(pubsub)))
    }

    fn status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            connections: state.connections,
            idle: state.idle_connections,
        }
    }
}

/// One connection taken out of the pool; returned when dropped
struct LeasedConnection {
    conn: Mutex<PooledConnection<'static, RedisConnectionManager>>,
}

#[async_trait]
impl RedisClient for LeasedConnection {
    async fn send(&self, name: &str, args: CommandArgs) -> Result<Value> {
        let mut conn = self.conn.lock().await;
        command(name, &args)
            .query_async::<Value>(&mut **conn)
            .await
            .map_err(map_redis_error)
    }
}

/// Driver for real Redis servers
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisDriver;

impl Driver for RedisDriver {
    fn name(&self) -> &str {
        "redis"
    }

    fn make_pool(
        &self,
        id: &BackendId,
        configuration: &RedisConfiguration,
    ) -> Result<Arc<dyn ConnectionPool>> {
        let pool = RedisPool::new(configuration)?;
        debug!(
            target: "redbridge",
            backend = %id,
            address = %configuration.address(),
            database = configuration.database,
            max_connections = configuration.pool.maximum_connections,
            "Created Redis pool"
        );
        Ok(Arc::new(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments_are_binary() {
        let cmd = command("SET", &[b"k".to_vec(), vec![0, 159, 146, 150]]);
        let packed = cmd.get_packed_command();
        assert!(packed.starts_with(b"*3\r\n$3\r\nSET\r\n"));
        assert!(packed.ends_with(&[0, 159, 146, 150, b'\r', b'\n']));
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        let config = RedisConfiguration::new("127.0.0.1", 1).unwrap();
        let pool = RedisDriver.make_pool(&BackendId::default(), &config).unwrap();
        assert_eq!(pool.status().connections, 0);
    }
}
