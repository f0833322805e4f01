//! In-process driver
//!
//! Interprets the commands the facades use against a [`DashMap`] keyspace.
//! Useful for tests and for running without a server.
//!
//! [`DashMap`]: dashmap::DashMap

mod driver;
mod pool;
mod pubsub;
mod store;

pub use driver::MemoryDriver;
pub use pool::MemoryPool;
pub use pubsub::MemorySubscription;
pub use store::MemoryStore;
