//! Callback-style completion over the async operations
//!
//! Every operation is written once as an `async fn`. These adapters run it
//! on the tokio runtime and hand the outcome to a callback instead of
//! returning it to an awaiting caller.

use std::future::Future;

use redbridge_core::{CacheDecoder, CacheEncoder, Result};
use tokio::task::JoinHandle;

use crate::cache::RedisCache;
use crate::redis::Redis;

/// Run a future in the background and pass its output to `callback`
///
/// ```rust,no_run
/// # use redbridge::prelude::*;
/// # fn demo(redis: Redis) {
/// async move { redis.ping().await }
///     .on_complete(|pong| println!("{pong:?}"));
/// # }
/// ```
pub trait Completion: Future + Send + Sized + 'static {
    fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Self::Output) + Send + 'static,
        Self::Output: Send + 'static,
    {
        tokio::spawn(async move { callback(self.await) })
    }
}

impl<Fut> Completion for Fut where Fut: Future + Send + 'static {}

/// Run an operation against an owned copy of a facade, then call back
///
/// The closure receives a clone, so the operation is `'static` and the
/// caller keeps its handle.
pub trait Submit: Clone + Send + Sync + 'static {
    fn submit<Op, Fut, T, F>(&self, op: Op, on_complete: F) -> JoinHandle<()>
    where
        Op: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move { on_complete(op(this).await) })
    }
}

impl Submit for Redis {}

impl<E: CacheEncoder, D: CacheDecoder> Submit for RedisCache<E, D> {}
