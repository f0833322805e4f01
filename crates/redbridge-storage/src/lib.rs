//! redbridge-storage: Redis clients, pools and drivers for redbridge
//!
//! - [`RedisClient`] / [`RedisCommands`]: the command surface shared by
//!   pools, leased connections and decorators
//! - [`Driver`]: builds a [`ConnectionPool`] per configured backend
//! - [`SubscriptionClient`]: pub/sub over a dedicated connection

mod client;
mod logging;
mod pool;
mod subscription;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis-pool")]
pub mod redis;

pub use client::{args, CommandArgs, RedisClient, RedisCommands};
pub use logging::LoggingClient;
pub use pool::{ConnectionPool, Driver, PoolStatus, PubSubConnection, PubSubMessage};
pub use subscription::{
    MessageReceiver, SubscriptionChangeHandler, SubscriptionClient, SubscriptionHandlers,
    SubscriptionKind,
};

/// Reply type of every command
pub use ::redis::Value;

#[cfg(feature = "memory")]
pub use memory::{MemoryDriver, MemoryStore};

#[cfg(feature = "redis-pool")]
pub use crate::redis::RedisDriver;
