//! History engine: bounded undo/redo stacks of reversible records.
//!
//! DESIGN
//! ======
//! Two deques of `HistoryRecord`, each capped at `capacity`. Pushing a new
//! record evicts the oldest entry when full and always clears the redo stack.
//! Undo moves the newest undo record to the redo stack and returns it; redo
//! is the mirror image. The engine never touches the cache or the stores:
//! `HistoryRecord::inverse` and `HistoryRecord::forward` turn a record into a
//! `Replay` plan that the synchronization hub executes.
//!
//! TRADE-OFFS
//! ==========
//! Records only hold the fields a mutation touched, so undoing an update
//! after a collaborator changed an unrelated field leaves that field alone.
//! Undoing a change to the same field reverts the collaborator's value too;
//! that matches last-write-wins semantics everywhere else.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::model::{CanvasObject, ObjectId, ObjectPatch, now_ms};

/// Default number of records kept per stack.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

// =============================================================================
// RECORDS
// =============================================================================

/// What kind of user action a record reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Create,
    Delete,
    Update,
    Move,
    Transform,
    Duplicate,
    Paste,
    Visibility,
}

impl RecordKind {
    /// Kinds whose undo removes an object that the action brought into being.
    #[must_use]
    pub fn is_create_class(self) -> bool {
        matches!(self, Self::Create | Self::Duplicate | Self::Paste)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Update => "update",
            Self::Move => "move",
            Self::Transform => "transform",
            Self::Duplicate => "duplicate",
            Self::Paste => "paste",
            Self::Visibility => "visibility",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State captured on one side of a recorded action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "snapshot", content = "value", rename_all = "lowercase")]
pub enum Snapshot {
    /// The whole object (delete `before`, create-class `after`).
    Full(CanvasObject),
    /// Only the fields an update touched.
    Partial(ObjectPatch),
}

impl Snapshot {
    /// The snapshot as a patch, for update-class replays.
    #[must_use]
    pub fn to_patch(&self) -> ObjectPatch {
        match self {
            Self::Full(object) => ObjectPatch::from_object(object),
            Self::Partial(patch) => patch.clone(),
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&CanvasObject> {
        match self {
            Self::Full(object) => Some(object),
            Self::Partial(_) => None,
        }
    }
}

/// One reversible user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub kind: RecordKind,
    pub object_id: ObjectId,
    /// `None` for create-class records.
    pub before: Option<Snapshot>,
    /// `None` for delete records.
    pub after: Option<Snapshot>,
    pub timestamp: i64,
}

impl HistoryRecord {
    /// Record for an action that brought `object` into being.
    #[must_use]
    pub fn created(kind: RecordKind, object: &CanvasObject) -> Self {
        Self {
            kind,
            object_id: object.id,
            before: None,
            after: Some(Snapshot::Full(object.clone())),
            timestamp: now_ms(),
        }
    }

    /// Record for a delete; keeps the full object for recreation.
    #[must_use]
    pub fn deleted(object: &CanvasObject) -> Self {
        Self {
            kind: RecordKind::Delete,
            object_id: object.id,
            before: Some(Snapshot::Full(object.clone())),
            after: None,
            timestamp: now_ms(),
        }
    }

    /// Record for an update-class action.
    #[must_use]
    pub fn updated(kind: RecordKind, object_id: ObjectId, before: ObjectPatch, after: ObjectPatch) -> Self {
        Self {
            kind,
            object_id,
            before: Some(Snapshot::Partial(before)),
            after: Some(Snapshot::Partial(after)),
            timestamp: now_ms(),
        }
    }

    /// Plan that reverses this record (used by undo).
    #[must_use]
    pub fn inverse(&self) -> Replay {
        match self.kind {
            kind if kind.is_create_class() => Replay::Delete(self.object_id),
            RecordKind::Delete => self.recreate_from(self.before.as_ref()),
            _ => self.apply_from(self.before.as_ref()),
        }
    }

    /// Plan that re-applies this record (used by redo).
    #[must_use]
    pub fn forward(&self) -> Replay {
        match self.kind {
            kind if kind.is_create_class() => self.recreate_from(self.after.as_ref()),
            RecordKind::Delete => Replay::Delete(self.object_id),
            _ => self.apply_from(self.after.as_ref()),
        }
    }

    fn recreate_from(&self, snapshot: Option<&Snapshot>) -> Replay {
        match snapshot.and_then(Snapshot::as_object) {
            Some(object) => Replay::Recreate(object.clone()),
            None => Replay::Nothing,
        }
    }

    fn apply_from(&self, snapshot: Option<&Snapshot>) -> Replay {
        match snapshot {
            Some(snapshot) => Replay::Apply(self.object_id, snapshot.to_patch()),
            None => Replay::Nothing,
        }
    }
}

/// A concrete step the hub performs to undo or redo a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Replay {
    /// Delete the object.
    Delete(ObjectId),
    /// Recreate the object with its original id and attributes.
    Recreate(CanvasObject),
    /// Patch the object.
    Apply(ObjectId, ObjectPatch),
    /// The record carries no state to replay.
    Nothing,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Bounded undo/redo stacks.
#[derive(Debug)]
pub struct History {
    undo: VecDeque<HistoryRecord>,
    redo: VecDeque<HistoryRecord>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    /// Create an empty history. A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            undo: VecDeque::with_capacity(capacity),
            redo: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a new user action. Evicts the oldest record when full and
    /// invalidates the redo stack.
    pub fn push(&mut self, record: HistoryRecord) {
        if self.undo.len() >= self.capacity {
            self.undo.pop_front();
        }
        self.undo.push_back(record);
        self.redo.clear();
    }

    /// Move the newest undo record to the redo stack and return it.
    pub fn undo(&mut self) -> Option<HistoryRecord> {
        let record = self.undo.pop_back()?;
        if self.redo.len() >= self.capacity {
            self.redo.pop_front();
        }
        self.redo.push_back(record.clone());
        Some(record)
    }

    /// Move the newest redo record back to the undo stack and return it.
    pub fn redo(&mut self) -> Option<HistoryRecord> {
        let record = self.redo.pop_back()?;
        if self.undo.len() >= self.capacity {
            self.undo.pop_front();
        }
        self.undo.push_back(record.clone());
        Some(record)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Undo records, oldest first.
    pub fn undo_stack(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.undo.iter()
    }

    /// Redo records, oldest first.
    pub fn redo_stack(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.redo.iter()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
