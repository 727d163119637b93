//! In-process topic fan-out used by the in-memory transports.
//!
//! DESIGN
//! ======
//! `MemoryTopics` keeps, per topic, the latest message per key plus a list of
//! bounded `mpsc` subscriber queues. Fan-out is best-effort `try_send`: a full
//! queue drops the message for that subscriber (the next message or the
//! durable snapshot supersedes it) and a closed queue is pruned. Publishers
//! never block on slow subscribers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;
use uuid::Uuid;

use super::{ChannelError, EphemeralChannel};
use crate::model::{CanvasId, Delta, ObjectId};

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Topic<K, M> {
    entries: HashMap<K, M>,
    subscribers: Vec<mpsc::Sender<M>>,
}

impl<K, M> Default for Topic<K, M> {
    fn default() -> Self {
        Self { entries: HashMap::new(), subscribers: Vec::new() }
    }
}

struct TopicsInner<K, M> {
    topics: HashMap<Uuid, Topic<K, M>>,
    closed: bool,
}

/// Keyed, retained, best-effort pub/sub over in-process queues.
pub struct MemoryTopics<K, M> {
    inner: Arc<Mutex<TopicsInner<K, M>>>,
    capacity: usize,
}

impl<K, M> Clone for MemoryTopics<K, M> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), capacity: self.capacity }
    }
}

impl<K, M> MemoryTopics<K, M>
where
    K: Eq + Hash + Copy,
    M: Clone,
{
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TopicsInner { topics: HashMap::new(), closed: false })),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TopicsInner<K, M>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retain `message` under `key` and fan it out to current subscribers.
    pub fn publish(&self, topic: Uuid, key: K, message: M) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ChannelError::Closed);
        }
        let entry = inner.topics.entry(topic).or_default();
        entry.entries.insert(key, message.clone());
        fan_out(&mut entry.subscribers, &message, topic);
        Ok(())
    }

    /// Like `publish`, but only when `accept` approves it against the
    /// currently retained message for `key`. Returns whether it was published.
    pub fn publish_if(
        &self,
        topic: Uuid,
        key: K,
        message: M,
        accept: impl FnOnce(Option<&M>) -> bool,
    ) -> Result<bool, ChannelError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ChannelError::Closed);
        }
        let entry = inner.topics.entry(topic).or_default();
        if !accept(entry.entries.get(&key)) {
            return Ok(false);
        }
        entry.entries.insert(key, message.clone());
        fan_out(&mut entry.subscribers, &message, topic);
        Ok(true)
    }

    /// Drop the retained message for `key`, returning it.
    pub fn remove(&self, topic: Uuid, key: &K) -> Option<M> {
        let mut inner = self.lock();
        inner.topics.get_mut(&topic)?.entries.remove(key)
    }

    /// Subscribe to a topic. Retained messages are queued first.
    pub fn subscribe(&self, topic: Uuid) -> Result<mpsc::Receiver<M>, ChannelError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ChannelError::Closed);
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        let entry = inner.topics.entry(topic).or_default();
        for message in entry.entries.values() {
            if tx.try_send(message.clone()).is_err() {
                warn!(%topic, "subscriber queue full during replay; truncating");
                break;
            }
        }
        entry.subscribers.push(tx);
        Ok(rx)
    }

    #[must_use]
    pub fn retained_len(&self, topic: Uuid) -> usize {
        self.lock()
            .topics
            .get(&topic)
            .map_or(0, |entry| entry.entries.len())
    }

    #[must_use]
    pub fn retained(&self, topic: Uuid, key: &K) -> Option<M> {
        self.lock()
            .topics
            .get(&topic)
            .and_then(|entry| entry.entries.get(key).cloned())
    }

    /// Shut down: drop every subscriber queue and refuse further use.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.topics.clear();
    }
}

fn fan_out<M: Clone>(subscribers: &mut Vec<mpsc::Sender<M>>, message: &M, topic: Uuid) {
    subscribers.retain(|tx| match tx.try_send(message.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(%topic, "subscriber queue full; dropping message");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    });
}

// =============================================================================
// DELTA CHANNEL
// =============================================================================

/// In-memory `EphemeralChannel`. Clones share topics.
#[derive(Clone)]
pub struct MemoryChannel {
    topics: MemoryTopics<ObjectId, Delta>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl MemoryChannel {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { topics: MemoryTopics::new(capacity) }
    }

    /// Latest retained delta for an object, if not yet cleared.
    #[must_use]
    pub fn retained(&self, canvas_id: CanvasId, object_id: ObjectId) -> Option<Delta> {
        self.topics.retained(canvas_id, &object_id)
    }

    #[must_use]
    pub fn retained_len(&self, canvas_id: CanvasId) -> usize {
        self.topics.retained_len(canvas_id)
    }

    pub fn close(&self) {
        self.topics.close();
    }
}

#[async_trait]
impl EphemeralChannel for MemoryChannel {
    async fn publish(&self, canvas_id: CanvasId, delta: Delta) -> Result<(), ChannelError> {
        self.topics.publish(canvas_id, delta.id, delta)
    }

    async fn clear(&self, canvas_id: CanvasId, object_id: ObjectId) -> Result<(), ChannelError> {
        self.topics.remove(canvas_id, &object_id);
        Ok(())
    }

    async fn subscribe(&self, canvas_id: CanvasId) -> Result<mpsc::Receiver<Delta>, ChannelError> {
        self.topics.subscribe(canvas_id)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
