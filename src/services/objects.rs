//! Object store client: durable CRUD paired with ephemeral broadcasts.
//!
//! DESIGN
//! ======
//! Each durable write is followed by a delta on the ephemeral channel so
//! other clients see the change before their durable snapshot arrives. The
//! delta is cleared from the channel after `delta_ttl`, by which time every
//! subscriber has received the durable snapshot that supersedes it.
//!
//! ERROR HANDLING
//! ==============
//! Durable failures are returned to the caller. Broadcast and TTL-clear
//! failures are logged and swallowed: the durable snapshot is authoritative,
//! so a lost delta only costs latency.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::warn;
use uuid::Uuid;

use crate::channel::{ChannelError, EphemeralChannel};
use crate::model::{CanvasId, CanvasObject, Delta, NewObject, ObjectId, ObjectPatch, UserId, now_ms};
use crate::store::{ObjectStore, StoreError};

/// Canvas-scoped handle on the durable store and the ephemeral channel.
#[derive(Clone)]
pub struct ObjectsClient {
    canvas_id: CanvasId,
    session_id: Uuid,
    store: Arc<dyn ObjectStore>,
    channel: Arc<dyn EphemeralChannel>,
    delta_ttl: Duration,
}

impl ObjectsClient {
    #[must_use]
    pub fn new(
        canvas_id: CanvasId,
        session_id: Uuid,
        store: Arc<dyn ObjectStore>,
        channel: Arc<dyn EphemeralChannel>,
        delta_ttl: Duration,
    ) -> Self {
        Self { canvas_id, session_id, store, channel, delta_ttl }
    }

    #[must_use]
    pub fn canvas_id(&self) -> CanvasId {
        self.canvas_id
    }

    // =========================================================================
    // DURABLE WRITES
    // =========================================================================

    /// Persist a new object, then broadcast all of its attributes.
    ///
    /// # Errors
    ///
    /// Returns the store error if the durable write fails.
    pub async fn create(&self, input: NewObject) -> Result<CanvasObject, StoreError> {
        let object = self.store.create(self.canvas_id, input).await?;
        self.broadcast_durable(Delta::patch(object.id, ObjectPatch::from_object(&object)))
            .await;
        Ok(object)
    }

    /// Merge a patch durably, then broadcast it stamped with the write time.
    /// The ephemeral transform lock is never persisted.
    ///
    /// # Errors
    ///
    /// Returns the store error if the durable write fails.
    pub async fn update(&self, id: ObjectId, patch: &ObjectPatch) -> Result<(), StoreError> {
        let mut durable = patch.durable();
        self.store.update(self.canvas_id, id, &durable).await?;
        durable.updated_at = Some(now_ms());
        self.broadcast_durable(Delta::patch(id, durable)).await;
        Ok(())
    }

    /// Remove an object durably, then broadcast the `deleted` sentinel.
    ///
    /// # Errors
    ///
    /// Returns the store error if the durable delete fails.
    pub async fn delete(&self, id: ObjectId) -> Result<(), StoreError> {
        self.store.delete(self.canvas_id, id).await?;
        self.broadcast_durable(Delta::deleted(id)).await;
        Ok(())
    }

    /// Duplicate an object durably (+20/+20, owned by `created_by`), then
    /// broadcast the copy.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the source is gone, or the store error.
    pub async fn duplicate(&self, id: ObjectId, created_by: UserId) -> Result<CanvasObject, StoreError> {
        let object = self
            .store
            .duplicate(self.canvas_id, id, created_by)
            .await?;
        self.broadcast_durable(Delta::patch(object.id, ObjectPatch::from_object(&object)))
            .await;
        Ok(object)
    }

    // =========================================================================
    // READS / SUBSCRIPTIONS
    // =========================================================================

    /// # Errors
    ///
    /// Returns the store error if the read fails.
    pub async fn list(&self) -> Result<Vec<CanvasObject>, StoreError> {
        self.store.list(self.canvas_id).await
    }

    /// # Errors
    ///
    /// Returns the store error if the subscription cannot be established.
    pub async fn subscribe_snapshots(&self) -> Result<watch::Receiver<Vec<CanvasObject>>, StoreError> {
        self.store.subscribe_to_all(self.canvas_id).await
    }

    /// # Errors
    ///
    /// Returns the channel error if the subscription cannot be established.
    pub async fn subscribe_deltas(&self) -> Result<mpsc::Receiver<Delta>, ChannelError> {
        self.channel.subscribe(self.canvas_id).await
    }

    // =========================================================================
    // BROADCASTS
    // =========================================================================

    /// Publish a live frame (transform, lock indicator) with no TTL clear.
    pub async fn broadcast_live(&self, delta: Delta) {
        let delta = delta.with_origin(self.session_id);
        let object_id = delta.id;
        if let Err(e) = self.channel.publish(self.canvas_id, delta).await {
            warn!(error = %e, canvas_id = %self.canvas_id, %object_id, "live broadcast failed");
        }
    }

    /// Publish a delta that mirrors a durable write and schedule its clear.
    async fn broadcast_durable(&self, delta: Delta) {
        let object_id = delta.id;
        self.broadcast_live(delta).await;
        self.schedule_clear(object_id);
    }

    fn schedule_clear(&self, object_id: ObjectId) {
        let channel = Arc::clone(&self.channel);
        let canvas_id = self.canvas_id;
        let ttl = self.delta_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = channel.clear(canvas_id, object_id).await {
                warn!(error = %e, %canvas_id, %object_id, "delta clear failed");
            }
        });
    }
}

#[cfg(test)]
#[path = "objects_test.rs"]
mod tests;
