//! Cache facade over one Redis identity

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redbridge_core::{Cache, CacheDecoder, CacheEncoder, JsonDecoder, JsonEncoder, Result};
use redbridge_storage::RedisCommands;
use serde::{de::DeserializeOwned, Serialize};
use tracing::trace;

use crate::context::RequestContext;
use crate::redis::Redis;

/// [`Cache`] backed by Redis, with a fixed coder pair
///
/// Holds no state of its own; Redis is authoritative. Setting `None`
/// deletes the key, and an expiry turns the write into `SETEX`.
pub struct RedisCache<E = JsonEncoder, D = JsonDecoder> {
    client: Redis,
    encoder: Arc<E>,
    decoder: Arc<D>,
}

impl<E, D> Clone for RedisCache<E, D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            encoder: self.encoder.clone(),
            decoder: self.decoder.clone(),
        }
    }
}

impl RedisCache {
    /// JSON-coded cache
    pub fn new(client: Redis) -> Self {
        Self::with_coders(client, JsonEncoder::new(), JsonDecoder)
    }
}

impl<E: CacheEncoder, D: CacheDecoder> RedisCache<E, D> {
    /// Cache with a custom coder pair
    pub fn with_coders(client: Redis, encoder: E, decoder: D) -> Self {
        Self {
            client,
            encoder: Arc::new(encoder),
            decoder: Arc::new(decoder),
        }
    }

    /// The underlying client
    pub fn client(&self) -> &Redis {
        &self.client
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// The same cache, bound to a request's context and span
    pub fn for_request(&self, request: &RequestContext) -> Self {
        Self {
            client: self.client.for_request(request),
            encoder: self.encoder.clone(),
            decoder: self.decoder.clone(),
        }
    }
}

#[async_trait]
impl<E: CacheEncoder, D: CacheDecoder> Cache for RedisCache<E, D> {
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        trace!(target: "redbridge", backend = %self.client.id(), key, decoder = self.decoder.name(), "cache get");
        self.client.get_decoded(key, self.decoder.as_ref()).await
    }

    async fn set_with_expiry<T>(
        &self,
        key: &str,
        value: Option<&T>,
        expires_in: Option<Duration>,
    ) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        trace!(
            target: "redbridge",
            backend = %self.client.id(),
            key,
            encoder = self.encoder.name(),
            expires_in = ?expires_in,
            "cache set"
        );
        match (value, expires_in) {
            (None, _) => self.delete(key).await,
            (Some(value), Some(ttl)) => {
                self.client
                    .setex_encoded(key, value, ttl, self.encoder.as_ref())
                    .await
            }
            (Some(value), None) => {
                self.client
                    .set_encoded(key, value, self.encoder.as_ref())
                    .await
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        RedisCommands::delete(&self.client, &[key]).await.map(|_| ())
    }
}

impl<E, D> std::fmt::Debug for RedisCache<E, D>
where
    E: CacheEncoder,
    D: CacheDecoder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("client", &self.client)
            .field("encoder", &self.encoder.name())
            .field("decoder", &self.decoder.name())
            .finish()
    }
}
