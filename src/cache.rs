//! Local object cache: the in-memory mirror of one canvas.
//!
//! SYSTEM CONTEXT
//! ==============
//! The cache stores the local projection of one canvas session: every
//! object keyed by id, the multi-object selection, and a single-slot
//! clipboard. It is written only by the synchronization hub's mutation paths
//! and its two ingestion streams (durable snapshots, ephemeral deltas).
//!
//! All operations are synchronous and do no I/O. Reads observe every prior
//! write immediately.

use std::collections::HashMap;

use crate::model::{ArrowPoints, CanvasObject, NewObject, ObjectId, ObjectKind, ObjectPatch, Point, UserId};

const COLOR_KEYWORDS: [&str; 10] = ["red", "blue", "green", "yellow", "purple", "orange", "black", "white", "gray", "grey"];

// =============================================================================
// CLIPBOARD
// =============================================================================

/// Value copy of one object's mutable attributes, taken by a copy action.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardEntry {
    pub kind: ObjectKind,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub fill: String,
    pub radius: Option<f64>,
    pub text: Option<String>,
    pub font_size: Option<f64>,
    pub points: Option<ArrowPoints>,
    pub stroke: Option<String>,
    pub stroke_width: Option<f64>,
    pub pointer_length: Option<f64>,
    pub pointer_width: Option<f64>,
    pub visible: Option<bool>,
    /// Position of the source object at copy time.
    pub original_position: Point,
}

impl ClipboardEntry {
    #[must_use]
    pub fn from_object(object: &CanvasObject) -> Self {
        Self {
            kind: object.kind,
            width: object.width,
            height: object.height,
            rotation: object.rotation,
            fill: object.fill.clone(),
            radius: object.radius,
            text: object.text.clone(),
            font_size: object.font_size,
            points: object.points,
            stroke: object.stroke.clone(),
            stroke_width: object.stroke_width,
            pointer_length: object.pointer_length,
            pointer_width: object.pointer_width,
            visible: object.visible,
            original_position: object.position,
        }
    }

    /// Creation input for a paste of this entry at `position`.
    #[must_use]
    pub fn to_new_object(&self, position: Point, created_by: UserId) -> NewObject {
        NewObject {
            id: None,
            kind: self.kind,
            position,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            fill: self.fill.clone(),
            radius: self.radius,
            text: self.text.clone(),
            font_size: self.font_size,
            points: self.points,
            stroke: self.stroke.clone(),
            stroke_width: self.stroke_width,
            pointer_length: self.pointer_length,
            pointer_width: self.pointer_width,
            visible: self.visible,
            created_by,
        }
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// In-memory mirror of all objects on a canvas plus selection and clipboard.
#[derive(Debug, Default)]
pub struct ObjectCache {
    objects: HashMap<ObjectId, CanvasObject>,
    /// Selected ids in selection order; the first is the representative.
    selection: Vec<ObjectId>,
    clipboard: Option<ClipboardEntry>,
    last_pasted_position: Option<Point>,
}

impl ObjectCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Objects
    // -------------------------------------------------------------------------

    /// Replace the whole map. Selected ids that no longer exist are dropped.
    pub fn set(&mut self, objects: HashMap<ObjectId, CanvasObject>) {
        self.objects = objects;
        self.prune_selection();
    }

    /// Replace the whole map from a durable snapshot.
    ///
    /// Snapshots never carry `transforming_by`, so lock indicators already
    /// received over the ephemeral channel are kept for surviving objects.
    pub fn load_snapshot(&mut self, objects: Vec<CanvasObject>) {
        let mut next = HashMap::with_capacity(objects.len());
        for mut obj in objects {
            if let Some(existing) = self.objects.get(&obj.id) {
                obj.transforming_by = existing.transforming_by;
            }
            next.insert(obj.id, obj);
        }
        self.set(next);
    }

    /// Insert or replace an object.
    pub fn add(&mut self, object: CanvasObject) {
        self.objects.insert(object.id, object);
    }

    /// Shallow-merge a patch into an existing object. Returns `false` (and
    /// does nothing) if the object is not cached.
    pub fn patch(&mut self, id: &ObjectId, patch: &ObjectPatch) -> bool {
        let Some(obj) = self.objects.get_mut(id) else {
            return false;
        };
        obj.apply(patch);
        true
    }

    /// Remove an object and deselect it. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &ObjectId) -> Option<CanvasObject> {
        let removed = self.objects.remove(id);
        self.selection.retain(|selected| selected != id);
        removed
    }

    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&CanvasObject> {
        self.objects.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects in creation order (`created_at`, then id).
    #[must_use]
    pub fn objects(&self) -> Vec<&CanvasObject> {
        let mut objs: Vec<&CanvasObject> = self.objects.values().collect();
        objs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        objs
    }

    /// Objects eligible for hit-testing and agent lookups.
    #[must_use]
    pub fn visible_objects(&self) -> Vec<&CanvasObject> {
        self.objects()
            .into_iter()
            .filter(|obj| obj.is_visible())
            .collect()
    }

    /// Resolve a loose description ("the red circle") to a visible object.
    ///
    /// Kind keywords win over color keywords; with no keyword match the most
    /// recently created visible object is returned.
    #[must_use]
    pub fn find_by_description(&self, description: &str) -> Option<&CanvasObject> {
        let desc = description.to_lowercase();
        let visible = self.visible_objects();

        let kind = if desc.contains("circle") {
            Some(ObjectKind::Circle)
        } else if desc.contains("rectangle") || desc.contains("rect") {
            Some(ObjectKind::Rectangle)
        } else if desc.contains("text") {
            Some(ObjectKind::Text)
        } else if desc.contains("arrow") {
            Some(ObjectKind::Arrow)
        } else {
            None
        };
        if let Some(kind) = kind {
            return visible.into_iter().find(|obj| obj.kind == kind);
        }

        let color = desc
            .split(|c: char| !c.is_alphanumeric())
            .find(|word| COLOR_KEYWORDS.contains(word));
        if let Some(color) = color {
            if let Some(obj) = visible
                .iter()
                .find(|obj| obj.fill.to_lowercase().contains(color))
            {
                return Some(obj);
            }
        }

        visible.last().copied()
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Add an id to the selection. Idempotent; unknown ids are ignored.
    pub fn select(&mut self, id: ObjectId) -> bool {
        if !self.objects.contains_key(&id) {
            return false;
        }
        if !self.selection.contains(&id) {
            self.selection.push(id);
        }
        true
    }

    pub fn deselect(&mut self, id: &ObjectId) {
        self.selection.retain(|selected| selected != id);
    }

    /// Flip membership of `id`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: ObjectId) -> bool {
        if self.selection.contains(&id) {
            self.deselect(&id);
            false
        } else {
            self.select(id)
        }
    }

    /// Replace the selection. Unknown ids and duplicates are dropped.
    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        self.selection.clear();
        for id in ids {
            self.select(id);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    #[must_use]
    pub fn is_selected(&self, id: &ObjectId) -> bool {
        self.selection.contains(id)
    }

    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.selection.len()
    }

    #[must_use]
    pub fn selected_ids(&self) -> &[ObjectId] {
        &self.selection
    }

    /// First selected id, for single-selection consumers.
    #[must_use]
    pub fn representative(&self) -> Option<ObjectId> {
        self.selection.first().copied()
    }

    fn prune_selection(&mut self) {
        let objects = &self.objects;
        self.selection.retain(|id| objects.contains_key(id));
    }

    // -------------------------------------------------------------------------
    // Clipboard
    // -------------------------------------------------------------------------

    /// Snapshot an object into the clipboard and restart the paste cascade.
    pub fn copy(&mut self, object: &CanvasObject) {
        self.clipboard = Some(ClipboardEntry::from_object(object));
        self.last_pasted_position = None;
    }

    pub fn clear_clipboard(&mut self) {
        self.clipboard = None;
        self.last_pasted_position = None;
    }

    pub fn set_last_pasted_position(&mut self, position: Option<Point>) {
        self.last_pasted_position = position;
    }

    #[must_use]
    pub fn clipboard(&self) -> Option<&ClipboardEntry> {
        self.clipboard.as_ref()
    }

    #[must_use]
    pub fn last_pasted_position(&self) -> Option<Point> {
        self.last_pasted_position
    }

    /// Where the next paste lands: `offset` past the previous paste, or past
    /// the original position for the first paste. `None` with an empty
    /// clipboard.
    #[must_use]
    pub fn next_paste_position(&self, offset: f64) -> Option<Point> {
        let entry = self.clipboard.as_ref()?;
        let anchor = self
            .last_pasted_position
            .unwrap_or(entry.original_position);
        Some(anchor.offset(offset, offset))
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
