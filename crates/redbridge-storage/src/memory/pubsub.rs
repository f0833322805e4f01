use std::sync::Arc;

use async_trait::async_trait;
use redbridge_core::Result;
use tokio::sync::mpsc;

use super::store::MemoryStore;
use crate::pool::{PubSubConnection, PubSubMessage};

/// Subscription connection registered with a [`MemoryStore`]
///
/// Deregisters itself on drop.
pub struct MemorySubscription {
    store: Arc<MemoryStore>,
    id: u64,
    messages: mpsc::UnboundedReceiver<PubSubMessage>,
}

impl MemorySubscription {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let (id, messages) = store.register_subscriber();
        Self {
            store,
            id,
            messages,
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.store.remove_subscriber(self.id);
    }
}

#[async_trait]
impl PubSubConnection for MemorySubscription {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.store.update_subscriber(self.id, |s| {
            s.channels.insert(channel.to_string());
        });
        Ok(())
    }

    async fn unsubscribe(&mut self, channel: &str) -> Result<()> {
        self.store.update_subscriber(self.id, |s| {
            s.channels.remove(channel);
        });
        Ok(())
    }

    async fn psubscribe(&mut self, pattern: &str) -> Result<()> {
        self.store.update_subscriber(self.id, |s| {
            s.patterns.insert(pattern.to_string());
        });
        Ok(())
    }

    async fn punsubscribe(&mut self, pattern: &str) -> Result<()> {
        self.store.update_subscriber(self.id, |s| {
            s.patterns.remove(pattern);
        });
        Ok(())
    }

    async fn next_message(&mut self) -> Option<PubSubMessage> {
        self.messages.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(store: &MemoryStore, channel: &str, message: &str) -> redis::Value {
        store
            .execute(
                "PUBLISH",
                &[channel.as_bytes().to_vec(), message.as_bytes().to_vec()],
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_channel_and_pattern_delivery() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = MemorySubscription::new(store.clone());
        sub.subscribe("news.sport").await.unwrap();
        sub.psubscribe("news.*").await.unwrap();

        assert_eq!(publish(&store, "news.sport", "goal"), redis::Value::Int(2));

        let direct = sub.next_message().await.unwrap();
        assert_eq!(direct.channel, "news.sport");
        assert_eq!(direct.pattern, None);
        assert_eq!(direct.payload_str(), Some("goal"));

        let matched = sub.next_message().await.unwrap();
        assert_eq!(matched.pattern.as_deref(), Some("news.*"));
    }

    #[tokio::test]
    async fn test_unsubscribed_and_dropped_receive_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = MemorySubscription::new(store.clone());
        sub.subscribe("a").await.unwrap();
        sub.unsubscribe("a").await.unwrap();
        assert_eq!(publish(&store, "a", "x"), redis::Value::Int(0));

        sub.subscribe("a").await.unwrap();
        drop(sub);
        assert_eq!(publish(&store, "a", "x"), redis::Value::Int(0));
    }
}
