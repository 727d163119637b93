//! Postgres object store.
//!
//! DESIGN
//! ======
//! One row per object in `canvas_objects`, partitioned by `canvas_id`. The
//! object itself is a JSONB document; `created_at`/`updated_at` are mirrored
//! into columns for ordering. Updates merge the patch into the document with
//! `||`, which gives the same field-level last-write-wins behavior as the
//! cache, without a read-modify-write round trip.
//!
//! Subscriptions use `LISTEN canvas_objects`. A trigger notifies with the
//! canvas id on every row change, and the watcher re-reads the canvas list.
//!
//! ERROR HANDLING
//! ==============
//! Listener errors are logged and the watcher keeps going: `PgListener`
//! reconnects on the next `recv`, and the following notification resyncs the
//! full list, so a dropped notification only delays convergence.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ObjectStore, StoreError, duplicate_input};
use crate::model::{CanvasId, CanvasObject, NewObject, ObjectId, ObjectPatch, UserId, now_ms};

const NOTIFY_CHANNEL: &str = "canvas_objects";
const LISTENER_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Object store backed by a Postgres pool. Clones share the pool.
#[derive(Clone)]
pub struct PgObjectStore {
    pool: PgPool,
}

impl PgObjectStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, canvas_id: CanvasId, object: &CanvasObject) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO canvas_objects (id, canvas_id, doc, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                 canvas_id = EXCLUDED.canvas_id, doc = EXCLUDED.doc, \
                 created_at = EXCLUDED.created_at, updated_at = EXCLUDED.updated_at",
        )
        .bind(object.id)
        .bind(canvas_id)
        .bind(Json(object))
        .bind(object.created_at)
        .bind(object.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for PgObjectStore {
    async fn create(&self, canvas_id: CanvasId, object: NewObject) -> Result<CanvasObject, StoreError> {
        let id = object.id.unwrap_or_else(Uuid::new_v4);
        let object = object.into_object(id, now_ms());
        self.insert(canvas_id, &object).await?;
        Ok(object)
    }

    async fn update(&self, canvas_id: CanvasId, id: ObjectId, patch: &ObjectPatch) -> Result<(), StoreError> {
        let mut patch = patch.durable();
        patch.updated_at = None;
        let doc = serde_json::to_value(&patch)?;

        let result = sqlx::query(
            "UPDATE canvas_objects SET \
                 doc = doc || $3 || jsonb_build_object('updated_at', GREATEST(updated_at, $4)), \
                 updated_at = GREATEST(updated_at, $4) \
             WHERE canvas_id = $1 AND id = $2",
        )
        .bind(canvas_id)
        .bind(id)
        .bind(Json(doc))
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, canvas_id: CanvasId, id: ObjectId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM canvas_objects WHERE canvas_id = $1 AND id = $2")
            .bind(canvas_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, canvas_id: CanvasId) -> Result<Vec<CanvasObject>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<CanvasObject>>(
            "SELECT doc FROM canvas_objects WHERE canvas_id = $1 ORDER BY created_at, id",
        )
        .bind(canvas_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(obj)| obj).collect())
    }

    async fn get(&self, canvas_id: CanvasId, id: ObjectId) -> Result<Option<CanvasObject>, StoreError> {
        let row = sqlx::query_scalar::<_, Json<CanvasObject>>(
            "SELECT doc FROM canvas_objects WHERE canvas_id = $1 AND id = $2",
        )
        .bind(canvas_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(obj)| obj))
    }

    async fn duplicate(&self, canvas_id: CanvasId, id: ObjectId, created_by: UserId) -> Result<CanvasObject, StoreError> {
        let source = self
            .get(canvas_id, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        self.create(canvas_id, duplicate_input(&source, created_by))
            .await
    }

    async fn subscribe_to_all(&self, canvas_id: CanvasId) -> Result<watch::Receiver<Vec<CanvasObject>>, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let initial = self.list(canvas_id).await?;
        let (tx, rx) = watch::channel(initial);
        let store = self.clone();
        let canvas_key = canvas_id.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tx.closed() => break,
                    received = listener.recv() => {
                        match received {
                            Ok(notification) if notification.payload() == canvas_key => {}
                            Ok(_) => continue,
                            Err(e) => {
                                warn!(error = %e, %canvas_id, "object listener failed; reconnecting");
                                tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                            }
                        }
                        match store.list(canvas_id).await {
                            Ok(objects) => {
                                debug!(%canvas_id, count = objects.len(), "object snapshot refreshed");
                                tx.send_replace(objects);
                            }
                            Err(e) => warn!(error = %e, %canvas_id, "object snapshot refresh failed"),
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;
