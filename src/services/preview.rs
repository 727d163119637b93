//! Shape-preview broadcast: ghost shapes while a user drags out a new object.
//!
//! DESIGN
//! ======
//! Previews are purely ephemeral. They go out on their own transport keyed by
//! user, throttled with the same keep-latest contract as transform frames,
//! and are never written durably or recorded in history. `clear` sends the
//! removal immediately and drops any pending frame.
//!
//! Messages carry a per-broadcaster sequence number. Receivers drop anything
//! older than what they already hold, so a late throttled frame can never
//! resurrect a cleared preview.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::channel::{ChannelError, MemoryTopics};
use crate::model::{ArrowPoints, CanvasId, ObjectKind, Point, UserId, now_ms};
use crate::throttle::{Offer, Throttle, spawn_flush};

/// Geometry of a shape being drawn but not yet created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePreview {
    pub kind: ObjectKind,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub fill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<ArrowPoints>,
}

/// One preview frame. `preview: None` removes the user's ghost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewMessage {
    pub user_id: UserId,
    pub preview: Option<ShapePreview>,
    pub seq: u64,
    pub timestamp: i64,
}

#[async_trait]
pub trait PreviewTransport: Send + Sync {
    async fn publish(&self, canvas_id: CanvasId, message: PreviewMessage) -> Result<(), ChannelError>;

    /// Receive current previews, then live frames, for one canvas.
    async fn subscribe(&self, canvas_id: CanvasId) -> Result<mpsc::Receiver<PreviewMessage>, ChannelError>;
}

// =============================================================================
// IN-MEMORY TRANSPORT
// =============================================================================

#[derive(Clone)]
pub struct MemoryPreviewTransport {
    topics: MemoryTopics<UserId, PreviewMessage>,
}

impl MemoryPreviewTransport {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { topics: MemoryTopics::new(capacity) }
    }
}

#[async_trait]
impl PreviewTransport for MemoryPreviewTransport {
    /// Retains the newest frame per user, removals included, and drops
    /// frames older than the retained one.
    async fn publish(&self, canvas_id: CanvasId, message: PreviewMessage) -> Result<(), ChannelError> {
        let seq = message.seq;
        let published = self
            .topics
            .publish_if(canvas_id, message.user_id, message, |current| {
                current.is_none_or(|current| seq > current.seq)
            })?;
        if !published {
            debug!(%canvas_id, seq, "stale preview frame dropped");
        }
        Ok(())
    }

    async fn subscribe(&self, canvas_id: CanvasId) -> Result<mpsc::Receiver<PreviewMessage>, ChannelError> {
        self.topics.subscribe(canvas_id)
    }
}

// =============================================================================
// BROADCASTER
// =============================================================================

/// Sends this user's preview frames for one canvas.
#[derive(Clone)]
pub struct PreviewBroadcaster {
    canvas_id: CanvasId,
    user_id: UserId,
    transport: Arc<dyn PreviewTransport>,
    throttle: Arc<Mutex<Throttle<PreviewMessage>>>,
    seq: Arc<AtomicU64>,
}

impl PreviewBroadcaster {
    #[must_use]
    pub fn new(canvas_id: CanvasId, user_id: UserId, transport: Arc<dyn PreviewTransport>, interval: Duration) -> Self {
        Self {
            canvas_id,
            user_id,
            transport,
            throttle: Arc::new(Mutex::new(Throttle::new(interval))),
            seq: Arc::new(AtomicU64::new(seq_base())),
        }
    }

    /// Offer a frame; sent now or coalesced into the trailing send.
    pub fn update(&self, preview: ShapePreview) {
        let message = self.message(Some(preview));
        let offer = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .offer(message, Instant::now());

        match offer {
            Offer::Send(message) => {
                let this = self.clone();
                tokio::spawn(async move { this.send(message).await });
            }
            Offer::Deferred { flush_at, schedule: true } => {
                let throttle = Arc::clone(&self.throttle);
                let this = self.clone();
                spawn_flush(
                    flush_at,
                    move |now| {
                        throttle
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .flush(now)
                    },
                    move |message| async move { this.send(message).await },
                );
            }
            Offer::Deferred { schedule: false, .. } => {}
        }
    }

    /// Remove the ghost right away, discarding any pending frame.
    pub async fn clear(&self) {
        self.throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        let message = self.message(None);
        self.send(message).await;
    }

    /// Build a frame. Sequence numbers are taken here, in call order, so a
    /// frame offered before `clear` always sorts before the removal.
    fn message(&self, preview: Option<ShapePreview>) -> PreviewMessage {
        PreviewMessage {
            user_id: self.user_id,
            preview,
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: now_ms(),
        }
    }

    async fn send(&self, message: PreviewMessage) {
        if let Err(e) = self.transport.publish(self.canvas_id, message).await {
            warn!(error = %e, canvas_id = %self.canvas_id, "preview broadcast failed");
        }
    }
}

/// Sequence numbers start from the clock so a reconnecting user's frames
/// outrank those of its previous broadcaster.
fn seq_base() -> u64 {
    u64::try_from(now_ms()).unwrap_or(0).saturating_mul(1_000)
}

// =============================================================================
// RECEIVER STATE
// =============================================================================

/// Other users' current previews.
#[derive(Debug, Default)]
pub struct RemotePreviews {
    own_user: Option<UserId>,
    previews: HashMap<UserId, ShapePreview>,
    last_seq: HashMap<UserId, u64>,
}

impl RemotePreviews {
    /// Track previews on behalf of `own_user`, whose frames are ignored.
    #[must_use]
    pub fn new(own_user: UserId) -> Self {
        Self { own_user: Some(own_user), ..Self::default() }
    }

    /// Apply a frame. Returns whether the visible state changed.
    pub fn apply(&mut self, message: PreviewMessage) -> bool {
        if self.own_user == Some(message.user_id) {
            return false;
        }
        let last = self.last_seq.entry(message.user_id).or_insert(0);
        if message.seq <= *last {
            return false;
        }
        *last = message.seq;
        match message.preview {
            Some(preview) => {
                self.previews.insert(message.user_id, preview);
                true
            }
            None => self.previews.remove(&message.user_id).is_some(),
        }
    }

    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<&ShapePreview> {
        self.previews.get(user_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.previews.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &ShapePreview)> {
        self.previews.iter()
    }
}

#[cfg(test)]
#[path = "preview_test.rs"]
mod tests;
