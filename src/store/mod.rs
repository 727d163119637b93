//! Durable object store: the system of record for canvas objects.
//!
//! SYSTEM CONTEXT
//! ==============
//! The synchronization hub reaches the durable store only through the
//! `ObjectStore` trait. Two implementations ship with the crate:
//! `MemoryStore` (tests and database-less CLI runs) and `PgObjectStore`
//! (one JSONB document per object in Postgres).
//!
//! CONTRACT
//! ========
//! - `create` assigns `created_at`/`updated_at` and, unless the input names
//!   one, a fresh id.
//! - `update` merges fields shallowly and refreshes `updated_at`.
//! - `duplicate` copies an object at +20/+20 under a new id and timestamps.
//! - `subscribe_to_all` yields the full object list on subscription and after
//!   every change, ordered by creation time.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgObjectStore;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::ErrorCode;
use crate::model::{CanvasId, CanvasObject, NewObject, ObjectId, ObjectPatch, UserId};

/// Offset applied on both axes by `duplicate`.
pub const DUPLICATE_OFFSET: f64 = 20.0;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_OBJECT_NOT_FOUND",
            Self::Database(_) => "E_DATABASE",
            Self::Serialization(_) => "E_SERIALIZATION",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist a new object and return it with identity and timestamps.
    async fn create(&self, canvas_id: CanvasId, object: NewObject) -> Result<CanvasObject, StoreError>;

    /// Merge `patch` into the stored object and refresh `updated_at`.
    async fn update(&self, canvas_id: CanvasId, id: ObjectId, patch: &ObjectPatch) -> Result<(), StoreError>;

    /// Remove an object. Deleting an unknown id succeeds.
    async fn delete(&self, canvas_id: CanvasId, id: ObjectId) -> Result<(), StoreError>;

    /// All objects on the canvas, oldest first.
    async fn list(&self, canvas_id: CanvasId) -> Result<Vec<CanvasObject>, StoreError>;

    async fn get(&self, canvas_id: CanvasId, id: ObjectId) -> Result<Option<CanvasObject>, StoreError>;

    /// Copy an object at +20/+20 with a new id, owned by `created_by`.
    async fn duplicate(&self, canvas_id: CanvasId, id: ObjectId, created_by: UserId) -> Result<CanvasObject, StoreError>;

    /// Watch the full object list. The receiver holds the current list
    /// immediately and is updated after every change.
    async fn subscribe_to_all(&self, canvas_id: CanvasId) -> Result<watch::Receiver<Vec<CanvasObject>>, StoreError>;
}

/// Creation input for a duplicate of `source`.
pub(crate) fn duplicate_input(source: &CanvasObject, created_by: UserId) -> NewObject {
    let mut input = NewObject::from_object(source);
    input.id = None;
    input.position = source.position.offset(DUPLICATE_OFFSET, DUPLICATE_OFFSET);
    input.created_by = created_by;
    input
}
