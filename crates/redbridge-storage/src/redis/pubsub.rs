use async_trait::async_trait;
use futures_util::StreamExt;
use redbridge_core::Result;
use redis::aio::PubSub;

use super::error::map_redis_error;
use crate::pool::{PubSubConnection, PubSubMessage};

/// Dedicated subscription connection to a Redis server
pub struct RedisSubscription {
    pubsub: PubSub,
}

impl RedisSubscription {
    pub(crate) fn new(pubsub: PubSub) -> Self {
        Self { pubsub }
    }
}

#[async_trait]
impl PubSubConnection for RedisSubscription {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.pubsub.subscribe(channel).await.map_err(map_redis_error)
    }

    async fn unsubscribe(&mut self, channel: &str) -> Result<()> {
        self.pubsub.unsubscribe(channel).await.map_err(map_redis_error)
    }

    async fn psubscribe(&mut self, pattern: &str) -> Result<()> {
        self.pubsub.psubscribe(pattern).await.map_err(map_redis_error)
    }

    async fn punsubscribe(&mut self, pattern: &str) -> Result<()> {
        self.pubsub
            .punsubscribe(pattern)
            .await
            .map_err(map_redis_error)
    }

    async fn next_message(&mut self) -> Option<PubSubMessage> {
        let msg = self.pubsub.on_message().next().await?;
        let pattern = if msg.from_pattern() {
            msg.get_pattern::<String>().ok()
        } else {
            None
        };
        Some(PubSubMessage {
            channel: msg.get_channel_name().to_string(),
            pattern,
            payload: msg.get_payload_bytes().to_vec(),
        })
    }
}
