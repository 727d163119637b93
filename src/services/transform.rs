//! Live gesture protocol: drag and resize/rotate frames.
//!
//! PROTOCOL
//! ========
//! 1. `transform_start` broadcasts `{transforming_by: user}` so other clients
//!    can show who holds the object. Nothing is written durably.
//! 2. `move_update` / `transform_update` patch the local cache at once and
//!    offer the frame to the object's throttle, so at most one frame per
//!    interval reaches the channel and the newest frame always wins.
//! 3. `transform_end` drops any pending frame and broadcasts
//!    `{transforming_by: null}`. The caller then commits the final geometry
//!    with `update_as(Move | Transform, ..)`, which writes durably and
//!    records history.

use std::time::Instant;

use tracing::debug;

use super::sync::SyncHub;
use crate::model::{Delta, ObjectId, ObjectPatch, Point};
use crate::throttle::{Flush, Offer, Throttle, spawn_flush};

impl SyncHub {
    /// Announce that this session's user started transforming `id`.
    pub async fn transform_start(&self, id: ObjectId) {
        let lock = ObjectPatch::locked_by(self.inner.user_id);
        self.inner
            .objects
            .broadcast_live(Delta::patch(id, lock))
            .await;
        debug!(object_id = %id, "transform started");
    }

    /// Live drag frame.
    pub fn move_update(&self, id: ObjectId, position: Point) {
        self.live_update(id, ObjectPatch::moved(position));
    }

    /// Live resize/rotate frame.
    pub fn transform_update(&self, id: ObjectId, patch: ObjectPatch) {
        self.live_update(id, patch);
    }

    /// Drop pending frames and release the lock indicator.
    pub async fn transform_end(&self, id: ObjectId) {
        self.inner.throttles().remove(&id);
        self.inner
            .objects
            .broadcast_live(Delta::patch(id, ObjectPatch::unlocked()))
            .await;
        debug!(object_id = %id, "transform ended");
    }

    fn live_update(&self, id: ObjectId, patch: ObjectPatch) {
        self.inner.cache().patch(&id, &patch);

        let interval = self.inner.config.throttle_interval;
        let offer = self
            .inner
            .throttles()
            .entry(id)
            .or_insert_with(|| Throttle::new(interval))
            .offer(patch, Instant::now());

        match offer {
            Offer::Send(patch) => {
                let objects = self.inner.objects.clone();
                tokio::spawn(async move {
                    objects.broadcast_live(Delta::patch(id, patch)).await;
                });
            }
            Offer::Deferred { flush_at, schedule: true } => {
                let hub = self.clone();
                let objects = self.inner.objects.clone();
                spawn_flush(
                    flush_at,
                    move |now| match hub.inner.throttles().get_mut(&id) {
                        Some(throttle) => throttle.flush(now),
                        None => Flush::Idle,
                    },
                    move |patch| async move {
                        objects.broadcast_live(Delta::patch(id, patch)).await;
                    },
                );
            }
            Offer::Deferred { schedule: false, .. } => {}
        }
    }
}
