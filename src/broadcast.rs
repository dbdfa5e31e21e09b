// Broadcast fan-out to live room subscribers
//
// A subscriber that fails a send is dropped from its room without affecting
// delivery to the others and without surfacing an error to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::RwLock;

/// One live observer connection. Implementations wrap the actual transport
/// (WebSocket in production, in-memory channels in tests).
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    async fn send(&self, event: &Value) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
pub struct BroadcastHub {
    next_id: AtomicU64,
    rooms: RwLock<HashMap<String, HashMap<SubscriberId, Arc<dyn Subscriber>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        BroadcastHub::default()
    }

    pub async fn register(&self, room_id: &str, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(id, subscriber);
        id
    }

    /// No-op when the room or subscriber is unknown.
    pub async fn unregister(&self, room_id: &str, id: SubscriberId) {
        let mut rooms = self.rooms.write().await;
        if let Some(subscribers) = rooms.get_mut(room_id) {
            subscribers.remove(&id);
        }
    }

    pub async fn broadcast(&self, room_id: &str, event: &Value) {
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room_id) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
                    .collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, subscriber) in targets {
            if subscriber.send(event).await.is_err() {
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            let mut rooms = self.rooms.write().await;
            if let Some(subscribers) = rooms.get_mut(room_id) {
                for id in dead {
                    subscribers.remove(&id);
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct Recorder {
        events: Mutex<Vec<Value>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Recorder {
                events: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Subscriber for Recorder {
        async fn send(&self, event: &Value) -> Result<()> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl Subscriber for Broken {
        async fn send(&self, _event: &Value) -> Result<()> {
            bail!("connection closed")
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let hub = BroadcastHub::new();
        let first = Recorder::new();
        let second = Recorder::new();
        hub.register("r1", first.clone()).await;
        hub.register("r1", second.clone()).await;

        hub.broadcast("r1", &json!({"type": "room_state"})).await;

        assert_eq!(first.events.lock().await.len(), 1);
        assert_eq!(second.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failing_subscriber_is_pruned_without_breaking_the_rest() {
        let hub = BroadcastHub::new();
        let healthy = Recorder::new();
        hub.register("r1", Arc::new(Broken)).await;
        hub.register("r1", healthy.clone()).await;

        hub.broadcast("r1", &json!({"type": "message"})).await;
        assert_eq!(hub.subscriber_count("r1").await, 1);
        assert_eq!(healthy.events.lock().await.len(), 1);

        // Dead one is gone; the next broadcast still works.
        hub.broadcast("r1", &json!({"type": "message"})).await;
        assert_eq!(healthy.events.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_room_is_a_no_op() {
        let hub = BroadcastHub::new();
        let id = hub.register("r1", Recorder::new()).await;
        hub.unregister("missing", id).await;
        hub.broadcast("missing", &json!({"type": "message"})).await;
        assert_eq!(hub.subscriber_count("r1").await, 1);
    }
}
