//! Synchronization hub: the single mutation surface for one canvas session.
//!
//! DESIGN
//! ======
//! The hub owns the session's object cache and history engine and merges two
//! inbound streams into the cache: full durable snapshots and partial
//! ephemeral deltas. Every local mutation goes through the hub, which
//! applies it optimistically to the cache, issues the durable write plus
//! broadcast through `ObjectsClient`, and records it in history unless the
//! mutation is itself a history replay.
//!
//! The hub is cheap to clone; clones share one session. State lives behind
//! short `std::sync::Mutex` critical sections that are never held across an
//! `.await`, so cache reads always observe every completed local write.
//!
//! ERROR HANDLING
//! ==============
//! - create/delete/duplicate/paste: durable failures are returned.
//! - update: returns a `PendingWrite` immediately; durable failures are
//!   logged, and callers that care may await `PendingWrite::settled`.
//! - broadcasts: failures are logged inside `ObjectsClient`, never returned.
//!
//! TRADE-OFFS
//! ==========
//! A failed delete is not rolled back in the cache: the next durable snapshot
//! still contains the object and restores it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ObjectCache;
use crate::channel::EphemeralChannel;
use crate::config::SyncConfig;
use crate::error::ErrorCode;
use crate::history::{History, HistoryRecord, RecordKind};
use crate::model::{
    ArrowPoints, CanvasId, CanvasObject, Delta, NewObject, ObjectId, ObjectKind, ObjectPatch, Point, UserId,
};
use crate::services::objects::ObjectsClient;
use crate::store::{ObjectStore, StoreError};
use crate::throttle::Throttle;

// =============================================================================
// ERRORS
// =============================================================================

/// Creation input rejected before any I/O.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("position must be finite")]
    Position,
    #[error("{0} must be a positive finite number")]
    NonPositive(&'static str),
    #[error("rotation must be finite")]
    Rotation,
    #[error("fill must not be empty")]
    EmptyFill,
    #[error("{kind} objects require {field}")]
    Missing { kind: ObjectKind, field: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid object: {0}")]
    Validation(#[from] ValidationError),
    #[error("durable write failed: {0}")]
    Store(#[from] StoreError),
    #[error("object not found: {0}")]
    NotFound(ObjectId),
    #[error("clipboard is empty")]
    EmptyClipboard,
    #[error("{kind} replay failed for {object_id}: {source}")]
    Replay {
        kind: RecordKind,
        object_id: ObjectId,
        source: Box<SyncError>,
    },
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Store(_) => "E_DURABLE_WRITE",
            Self::NotFound(_) => "E_OBJECT_NOT_FOUND",
            Self::EmptyClipboard => "E_EMPTY_CLIPBOARD",
            Self::Replay { .. } => "E_REPLAY",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.retryable(),
            Self::Replay { source, .. } => source.retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Who initiated a mutation. Replays never produce history records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    User,
    Replay,
}

/// History label for an update-class mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Update,
    Move,
    Transform,
    Visibility,
}

impl UpdateKind {
    fn record_kind(self) -> RecordKind {
        match self {
            Self::Update => RecordKind::Update,
            Self::Move => RecordKind::Move,
            Self::Transform => RecordKind::Transform,
            Self::Visibility => RecordKind::Visibility,
        }
    }
}

/// Input for `SyncHub::create`. Unset attributes take session defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateParams {
    /// Preserved id, set only when recreating a deleted object.
    pub id: Option<ObjectId>,
    pub kind: ObjectKind,
    pub position: Point,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub fill: Option<String>,
    pub radius: Option<f64>,
    pub text: Option<String>,
    pub font_size: Option<f64>,
    pub points: Option<ArrowPoints>,
    pub stroke: Option<String>,
    pub stroke_width: Option<f64>,
    pub pointer_length: Option<f64>,
    pub pointer_width: Option<f64>,
    pub visible: Option<bool>,
    /// Preserved owner; defaults to the session user.
    pub created_by: Option<UserId>,
}

impl CreateParams {
    #[must_use]
    pub fn new(kind: ObjectKind, position: Point) -> Self {
        Self {
            id: None,
            kind,
            position,
            width: None,
            height: None,
            rotation: None,
            fill: None,
            radius: None,
            text: None,
            font_size: None,
            points: None,
            stroke: None,
            stroke_width: None,
            pointer_length: None,
            pointer_width: None,
            visible: None,
            created_by: None,
        }
    }

    /// Exact recreation input for an existing object, keeping id and owner.
    #[must_use]
    pub fn from_object(object: &CanvasObject) -> Self {
        Self {
            id: Some(object.id),
            kind: object.kind,
            position: object.position,
            width: Some(object.width),
            height: Some(object.height),
            rotation: Some(object.rotation),
            fill: Some(object.fill.clone()),
            radius: object.radius,
            text: object.text.clone(),
            font_size: object.font_size,
            points: object.points,
            stroke: object.stroke.clone(),
            stroke_width: object.stroke_width,
            pointer_length: object.pointer_length,
            pointer_width: object.pointer_width,
            visible: object.visible,
            created_by: Some(object.created_by),
        }
    }

    #[must_use]
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    #[must_use]
    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>, font_size: f64) -> Self {
        self.text = Some(text.into());
        self.font_size = Some(font_size);
        self
    }

    #[must_use]
    pub fn points(mut self, points: ArrowPoints) -> Self {
        self.points = Some(points);
        self
    }

    #[must_use]
    pub fn rotation(mut self, degrees: f64) -> Self {
        self.rotation = Some(degrees);
        self
    }

    fn resolve(self, config: &SyncConfig, user_id: UserId) -> NewObject {
        let width = self.width.unwrap_or(config.default_size);
        let height = self.height.unwrap_or(config.default_size);
        let radius = match self.kind {
            ObjectKind::Circle => Some(self.radius.unwrap_or(width.min(height) / 2.0)),
            _ => self.radius,
        };
        NewObject {
            id: self.id,
            kind: self.kind,
            position: self.position,
            width,
            height,
            rotation: self.rotation.unwrap_or(0.0),
            fill: self.fill.unwrap_or_else(|| config.default_fill.clone()),
            radius,
            text: self.text,
            font_size: self.font_size,
            points: self.points,
            stroke: self.stroke,
            stroke_width: self.stroke_width,
            pointer_length: self.pointer_length,
            pointer_width: self.pointer_width,
            visible: Some(self.visible.unwrap_or(true)),
            created_by: self.created_by.unwrap_or(user_id),
        }
    }
}

/// Reject creation input that could never render.
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate(input: &NewObject) -> Result<(), ValidationError> {
    if !input.position.is_finite() {
        return Err(ValidationError::Position);
    }
    if !is_positive(input.width) {
        return Err(ValidationError::NonPositive("width"));
    }
    if !is_positive(input.height) {
        return Err(ValidationError::NonPositive("height"));
    }
    if !input.rotation.is_finite() {
        return Err(ValidationError::Rotation);
    }
    if input.fill.trim().is_empty() {
        return Err(ValidationError::EmptyFill);
    }
    if let Some(radius) = input.radius {
        if !is_positive(radius) {
            return Err(ValidationError::NonPositive("radius"));
        }
    }
    match input.kind {
        ObjectKind::Text if input.text.is_none() => {
            Err(ValidationError::Missing { kind: input.kind, field: "text" })
        }
        ObjectKind::Arrow if input.points.is_none() => {
            Err(ValidationError::Missing { kind: input.kind, field: "points" })
        }
        _ => Ok(()),
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Handle on a fire-and-forget durable update.
///
/// Dropping it detaches the write; it still runs and logs its own failure.
#[derive(Debug)]
pub struct PendingWrite {
    object_id: ObjectId,
    handle: JoinHandle<Result<(), StoreError>>,
}

impl PendingWrite {
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Wait for the durable write to finish.
    ///
    /// # Errors
    ///
    /// Returns the durable write failure, if any.
    pub async fn settled(self) -> Result<(), SyncError> {
        match self.handle.await {
            Ok(result) => result.map_err(SyncError::from),
            Err(e) => Err(SyncError::Store(StoreError::Unavailable(format!("durable write task failed: {e}")))),
        }
    }
}

/// Running ingestion tasks for a connected hub. Dropping it disconnects.
#[derive(Debug)]
pub struct SyncSession {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncSession {
    /// Stop both ingestion tasks.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// =============================================================================
// HUB
// =============================================================================

pub(crate) struct HubInner {
    pub(crate) canvas_id: CanvasId,
    pub(crate) user_id: UserId,
    pub(crate) session_id: Uuid,
    pub(crate) objects: ObjectsClient,
    pub(crate) cache: Mutex<ObjectCache>,
    pub(crate) history: Mutex<History>,
    pub(crate) throttles: Mutex<HashMap<ObjectId, Throttle<ObjectPatch>>>,
    pub(crate) config: SyncConfig,
}

impl HubInner {
    pub(crate) fn cache(&self) -> MutexGuard<'_, ObjectCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn throttles(&self) -> MutexGuard<'_, HashMap<ObjectId, Throttle<ObjectPatch>>> {
        self.throttles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, origin: Origin, record: HistoryRecord) {
        if origin == Origin::User {
            self.history().push(record);
        }
    }
}

/// Per-session synchronization hub. Clones share state.
#[derive(Clone)]
pub struct SyncHub {
    pub(crate) inner: Arc<HubInner>,
}

impl SyncHub {
    #[must_use]
    pub fn new(
        canvas_id: CanvasId,
        user_id: UserId,
        store: Arc<dyn ObjectStore>,
        channel: Arc<dyn EphemeralChannel>,
        config: SyncConfig,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let objects = ObjectsClient::new(canvas_id, session_id, store, channel, config.delta_ttl);
        Self {
            inner: Arc::new(HubInner {
                canvas_id,
                user_id,
                session_id,
                objects,
                cache: Mutex::new(ObjectCache::new()),
                history: Mutex::new(History::new(config.history_capacity)),
                throttles: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    #[must_use]
    pub fn canvas_id(&self) -> CanvasId {
        self.inner.canvas_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.inner.user_id
    }

    /// Identifier stamped on this session's broadcasts.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    /// Create an object: validate, write durably, then add to the cache.
    ///
    /// # Errors
    ///
    /// `Validation` before any I/O, or `Store` if the durable write fails.
    pub async fn create(&self, params: CreateParams, origin: Origin) -> Result<CanvasObject, SyncError> {
        let input = params.resolve(&self.inner.config, self.inner.user_id);
        self.create_object(input, RecordKind::Create, origin)
            .await
    }

    async fn create_object(&self, input: NewObject, kind: RecordKind, origin: Origin) -> Result<CanvasObject, SyncError> {
        validate(&input)?;
        let object = self.inner.objects.create(input).await?;
        self.inner.cache().add(object.clone());
        self.inner
            .record(origin, HistoryRecord::created(kind, &object));
        debug!(object_id = %object.id, kind = %object.kind, ?origin, "object created");
        Ok(object)
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    /// Apply an update labelled as a generic edit.
    pub fn update(&self, id: ObjectId, patch: ObjectPatch, origin: Origin) -> PendingWrite {
        self.update_as(UpdateKind::Update, id, patch, origin)
    }

    /// Apply `patch` to the cache now and write it durably in the background.
    ///
    /// The record's `before` holds the values the patch overwrites, captured
    /// from the cache before mutation. Must be called inside a tokio runtime.
    pub fn update_as(&self, kind: UpdateKind, id: ObjectId, patch: ObjectPatch, origin: Origin) -> PendingWrite {
        let before = {
            let mut cache = self.inner.cache();
            let before = cache.get(&id).map(|obj| obj.snapshot_before(&patch));
            cache.patch(&id, &patch);
            before
        };
        match before {
            Some(before) => self.inner.record(
                origin,
                HistoryRecord::updated(kind.record_kind(), id, before, patch.clone()),
            ),
            None => debug!(object_id = %id, "update for uncached object; writing through"),
        }

        let objects = self.inner.objects.clone();
        let handle = tokio::spawn(async move {
            let result = objects.update(id, &patch).await;
            if let Err(ref e) = result {
                warn!(error = %e, object_id = %id, canvas_id = %objects.canvas_id(), "durable update failed");
            }
            result
        });
        PendingWrite { object_id: id, handle }
    }

    /// Show or hide an object.
    pub fn set_visibility(&self, id: ObjectId, visible: bool) -> PendingWrite {
        let patch = ObjectPatch { visible: Some(visible), ..ObjectPatch::default() };
        self.update_as(UpdateKind::Visibility, id, patch, Origin::User)
    }

    // =========================================================================
    // DELETE / DUPLICATE
    // =========================================================================

    /// Remove an object from the cache (and selection), then durably.
    ///
    /// # Errors
    ///
    /// `Store` if the durable delete fails.
    pub async fn delete(&self, id: ObjectId, origin: Origin) -> Result<(), SyncError> {
        let removed = self.inner.cache().remove(&id);
        self.inner.throttles().remove(&id);
        self.inner.objects.delete(id).await?;
        if let Some(object) = removed {
            self.inner
                .record(origin, HistoryRecord::deleted(&object));
        }
        debug!(object_id = %id, ?origin, "object deleted");
        Ok(())
    }

    /// Durably copy an object at +20/+20, owned by the session user.
    ///
    /// # Errors
    ///
    /// `Store` if the source is gone or the durable write fails.
    pub async fn duplicate(&self, id: ObjectId, origin: Origin) -> Result<CanvasObject, SyncError> {
        let object = self
            .inner
            .objects
            .duplicate(id, self.inner.user_id)
            .await?;
        self.inner.cache().add(object.clone());
        self.inner
            .record(origin, HistoryRecord::created(RecordKind::Duplicate, &object));
        Ok(object)
    }

    // =========================================================================
    // CLIPBOARD
    // =========================================================================

    /// Copy a cached object to the clipboard.
    ///
    /// # Errors
    ///
    /// `NotFound` if the object is not cached.
    pub fn copy(&self, id: ObjectId) -> Result<(), SyncError> {
        let mut cache = self.inner.cache();
        let object = cache.get(&id).cloned().ok_or(SyncError::NotFound(id))?;
        cache.copy(&object);
        Ok(())
    }

    /// Paste the clipboard at the next cascade position.
    ///
    /// # Errors
    ///
    /// `EmptyClipboard`, `Validation`, or `Store` if the durable write fails.
    pub async fn paste(&self) -> Result<CanvasObject, SyncError> {
        let input = {
            let cache = self.inner.cache();
            let position = cache
                .next_paste_position(self.inner.config.paste_offset)
                .ok_or(SyncError::EmptyClipboard)?;
            let entry = cache.clipboard().ok_or(SyncError::EmptyClipboard)?;
            entry.to_new_object(position, self.inner.user_id)
        };
        let object = self
            .create_object(input, RecordKind::Paste, Origin::User)
            .await?;
        self.inner
            .cache()
            .set_last_pasted_position(Some(object.position));
        Ok(object)
    }

    pub fn clear_clipboard(&self) {
        self.inner.cache().clear_clipboard();
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    pub fn select(&self, id: ObjectId) -> bool {
        self.inner.cache().select(id)
    }

    pub fn deselect(&self, id: ObjectId) {
        self.inner.cache().deselect(&id);
    }

    pub fn toggle_selection(&self, id: ObjectId) -> bool {
        self.inner.cache().toggle(id)
    }

    pub fn set_selection(&self, ids: impl IntoIterator<Item = ObjectId>) {
        self.inner.cache().set_selection(ids);
    }

    pub fn clear_selection(&self) {
        self.inner.cache().clear_selection();
    }

    #[must_use]
    pub fn selected_ids(&self) -> Vec<ObjectId> {
        self.inner.cache().selected_ids().to_vec()
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<CanvasObject> {
        self.inner.cache().get(&id).cloned()
    }

    /// All cached objects in creation order.
    #[must_use]
    pub fn objects(&self) -> Vec<CanvasObject> {
        self.inner
            .cache()
            .objects()
            .into_iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn find_by_description(&self, description: &str) -> Option<CanvasObject> {
        self.inner
            .cache()
            .find_by_description(description)
            .cloned()
    }

    /// Run a read-only closure against the cache.
    pub fn with_cache<R>(&self, f: impl FnOnce(&ObjectCache) -> R) -> R {
        f(&*self.inner.cache())
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.inner.history().can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.inner.history().can_redo()
    }

    /// Run a read-only closure against the history engine.
    pub fn with_history<R>(&self, f: impl FnOnce(&History) -> R) -> R {
        f(&*self.inner.history())
    }

    pub fn clear_history(&self) {
        self.inner.history().clear();
    }

    // =========================================================================
    // INGESTION
    // =========================================================================

    /// Replace the cache with a durable snapshot. Never touches history.
    pub fn apply_snapshot(&self, objects: Vec<CanvasObject>) {
        let count = objects.len();
        self.inner.cache().load_snapshot(objects);
        debug!(canvas_id = %self.inner.canvas_id, count, "snapshot applied");
    }

    /// Merge one ephemeral delta into the cache. Returns whether it changed
    /// anything. Our own echoes and patches for unknown objects are ignored.
    pub fn apply_delta(&self, delta: Delta) -> bool {
        if delta.origin == Some(self.inner.session_id) {
            return false;
        }
        if delta.deleted {
            self.inner.throttles().remove(&delta.id);
            return self.inner.cache().remove(&delta.id).is_some();
        }
        let Some(patch) = delta.updates else {
            return false;
        };
        let applied = self.inner.cache().patch(&delta.id, &patch);
        if !applied {
            debug!(object_id = %delta.id, "delta for unknown object ignored");
        }
        applied
    }

    /// Subscribe to durable snapshots and ephemeral deltas and keep the cache
    /// up to date until the returned session is dropped.
    ///
    /// # Errors
    ///
    /// `Store` if the snapshot subscription fails. A failed delta
    /// subscription is logged and the session runs on snapshots alone.
    pub async fn connect(&self) -> Result<SyncSession, SyncError> {
        let mut snapshots = self.inner.objects.subscribe_snapshots().await?;
        let initial = snapshots.borrow_and_update().clone();
        let count = initial.len();
        self.apply_snapshot(initial);

        let mut tasks = Vec::with_capacity(2);
        let hub = self.clone();
        tasks.push(tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let objects = snapshots.borrow_and_update().clone();
                hub.apply_snapshot(objects);
            }
        }));

        match self.inner.objects.subscribe_deltas().await {
            Ok(mut deltas) => {
                let hub = self.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(delta) = deltas.recv().await {
                        hub.apply_delta(delta);
                    }
                }));
            }
            Err(e) => {
                warn!(error = %e, canvas_id = %self.inner.canvas_id, "delta subscription failed; snapshots only");
            }
        }

        info!(
            canvas_id = %self.inner.canvas_id,
            user_id = %self.inner.user_id,
            session_id = %self.inner.session_id,
            objects = count,
            "sync session connected"
        );
        Ok(SyncSession { tasks })
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
