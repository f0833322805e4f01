//! Driver for Redis servers
//!
//! Commands go through a bb8 pool of multiplexed connections; subscriptions
//! get their own connection from the same client configuration.

mod error;
mod pool;
mod pubsub;

pub use pool::{RedisDriver, RedisPool};
pub use pubsub::RedisSubscription;
