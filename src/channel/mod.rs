//! Ephemeral broadcast channel: low-latency deltas between clients.
//!
//! SYSTEM CONTEXT
//! ==============
//! Deltas are partial object patches (or the `deleted` sentinel) keyed by
//! object id within a canvas. The channel keeps the latest delta per object
//! so late subscribers can catch up, until the object store client clears the
//! entry a few seconds after the matching durable write. Nothing on this
//! channel is authoritative: the durable store snapshot always wins
//! eventually.

pub mod memory;

pub use memory::{MemoryChannel, MemoryTopics};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ErrorCode;
use crate::model::{CanvasId, Delta, ObjectId};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for ChannelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Closed => "E_CHANNEL_CLOSED",
            Self::Unavailable(_) => "E_CHANNEL_UNAVAILABLE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[async_trait]
pub trait EphemeralChannel: Send + Sync {
    /// Broadcast a delta and keep it as the object's latest entry.
    async fn publish(&self, canvas_id: CanvasId, delta: Delta) -> Result<(), ChannelError>;

    /// Drop the object's retained entry. Subscribers are not notified.
    async fn clear(&self, canvas_id: CanvasId, object_id: ObjectId) -> Result<(), ChannelError>;

    /// Receive retained entries, then live deltas, for one canvas.
    async fn subscribe(&self, canvas_id: CanvasId) -> Result<mpsc::Receiver<Delta>, ChannelError>;
}
