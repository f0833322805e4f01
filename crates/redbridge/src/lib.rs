//! redbridge: Redis clients and a cache facade for multi-backend applications
//!
//! # Features
//!
//! - **Named backends**: any number of identities, each with its own
//!   configuration, pools and subscription connection
//! - **Pools per execution context**, created once under double-checked locking
//! - **Pluggable coders** (JSON, MessagePack, Bincode, or your own)
//! - **Pub/Sub** over a dedicated connection
//! - **Leased connections** for MULTI/EXEC and ordered command sequences
//! - **In-memory driver** for tests and local development
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use redbridge::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let storage = RedisStorage::new(MemoryDriver::new());
//!     storage.use_configuration(BackendId::default(), RedisConfiguration::default())?;
//!
//!     let cache = storage.cache();
//!     cache.set_with_expiry("key", Some(&42i32), Some(Duration::from_secs(60))).await?;
//!
//!     match cache.get::<i32>("key").await? {
//!         Some(value) => println!("Got: {}", value),
//!         None => println!("Cache miss"),
//!     }
//!
//!     Ok(())
//! }
//! ```

mod cache;
mod callback;
mod context;
mod redis;
mod storage;

// Re-export core
pub use redbridge_core::*;

// Re-export the driver boundary
pub use redbridge_storage::{
    args, CommandArgs, ConnectionPool, Driver, LoggingClient, MessageReceiver, PoolStatus,
    PubSubConnection, PubSubMessage, RedisClient, RedisCommands, SubscriptionChangeHandler,
    SubscriptionClient, SubscriptionHandlers, Value,
};

#[cfg(feature = "memory")]
pub use redbridge_storage::{MemoryDriver, MemoryStore};

#[cfg(feature = "redis")]
pub use redbridge_storage::RedisDriver;

pub use cache::RedisCache;
pub use callback::{Completion, Submit};
pub use context::{ExecutionContext, RequestContext};
pub use redis::{BorrowedConnection, Redis};
pub use storage::{RedisStorage, StorageConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BackendId, BorrowedConnection, Cache, CacheDecoder, CacheEncoder, Completion, Error,
        JsonDecoder, JsonEncoder, KeyLifetime, PoolOptions, Redis, RedisCache, RedisClient,
        RedisCommands, RedisConfiguration, RedisStorage, RequestContext, Result, StorageConfig,
        Submit, SubscriptionHandlers,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryDriver;

    #[cfg(feature = "redis")]
    pub use crate::RedisDriver;

    #[cfg(feature = "msgpack")]
    pub use crate::{MsgPackDecoder, MsgPackEncoder};

    #[cfg(feature = "bincode")]
    pub use crate::{BincodeDecoder, BincodeEncoder};
}
