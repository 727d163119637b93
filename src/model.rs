//! Object model: canvas objects, sparse patches, and ephemeral deltas.
//!
//! DESIGN
//! ======
//! `CanvasObject` is the unit of collaboration and mirrors one document in
//! the durable store. Identity fields (`id`, `kind`, `created_by`,
//! `created_at`) exist only on the full object. `ObjectPatch` carries every
//! mutable field as an `Option`, so no patch can change an object's kind.
//!
//! MERGE SEMANTICS
//! ===============
//! Patches merge field by field (last write wins per field, never per
//! object). Two concurrent edits to different fields of the same object both
//! survive; two edits to the same field race and the later one wins. This is
//! intentional: objects are small and conflicts are cosmetic, so there is no
//! version vector or CRDT machinery here.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Unique identifier for a canvas object.
pub type ObjectId = Uuid;
/// Unique identifier for a canvas (the partition key for objects).
pub type CanvasId = Uuid;
/// Unique identifier for a user.
pub type UserId = Uuid;
/// Arrow geometry: `[x1, y1, x2, y2]` relative to the object position.
pub type ArrowPoints = [f64; 4];

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// KIND / GEOMETRY
// =============================================================================

/// The closed set of shapes a canvas can hold. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Rectangle,
    Circle,
    Text,
    Arrow,
}

impl ObjectKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Circle => "circle",
            Self::Text => "text",
            Self::Arrow => "arrow",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Return this point shifted by `(dx, dy)`.
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

// =============================================================================
// CANVAS OBJECT
// =============================================================================

/// A canvas object as stored in the durable store and mirrored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasObject {
    /// Opaque unique identifier, immutable after creation.
    pub id: ObjectId,
    /// Shape type, never mutated.
    pub kind: ObjectKind,
    /// Top-left anchor (rectangle/text) or bounding-box anchor (circle/arrow).
    pub position: Point,
    pub width: f64,
    pub height: f64,
    /// Clockwise rotation in degrees, stored absolute.
    pub rotation: f64,
    /// Fill color as a hex or named CSS color.
    pub fill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<ArrowPoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_width: Option<f64>,
    /// Absent means visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    pub created_by: UserId,
    pub created_at: i64,
    pub updated_at: i64,
    /// User currently resizing/rotating this object. Only ever carried on the
    /// ephemeral channel, so it is never written to the durable store.
    #[serde(default, skip_serializing)]
    pub transforming_by: Option<UserId>,
}

impl CanvasObject {
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible != Some(false)
    }

    /// Horizontal footprint used by layout: the diameter for circles with a
    /// radius, the width otherwise.
    #[must_use]
    pub fn extent_x(&self) -> f64 {
        match (self.kind, self.radius) {
            (ObjectKind::Circle, Some(r)) => r * 2.0,
            _ => self.width,
        }
    }

    /// Vertical footprint used by layout: the diameter for circles with a
    /// radius, the height otherwise.
    #[must_use]
    pub fn extent_y(&self) -> f64 {
        match (self.kind, self.radius) {
            (ObjectKind::Circle, Some(r)) => r * 2.0,
            _ => self.height,
        }
    }

    /// Shallow-merge a patch into this object. Fields absent from the patch
    /// are left untouched. `updated_at` never moves backwards.
    pub fn apply(&mut self, patch: &ObjectPatch) {
        if let Some(p) = patch.position {
            self.position = p;
        }
        if let Some(w) = patch.width {
            self.width = w;
        }
        if let Some(h) = patch.height {
            self.height = h;
        }
        if let Some(r) = patch.rotation {
            self.rotation = r;
        }
        if let Some(ref fill) = patch.fill {
            self.fill.clone_from(fill);
        }
        if let Some(r) = patch.radius {
            self.radius = Some(r);
        }
        if let Some(ref text) = patch.text {
            self.text = Some(text.clone());
        }
        if let Some(s) = patch.font_size {
            self.font_size = Some(s);
        }
        if let Some(points) = patch.points {
            self.points = Some(points);
        }
        if let Some(ref stroke) = patch.stroke {
            self.stroke = Some(stroke.clone());
        }
        if let Some(w) = patch.stroke_width {
            self.stroke_width = Some(w);
        }
        if let Some(l) = patch.pointer_length {
            self.pointer_length = Some(l);
        }
        if let Some(w) = patch.pointer_width {
            self.pointer_width = Some(w);
        }
        if let Some(v) = patch.visible {
            self.visible = Some(v);
        }
        if let Some(ts) = patch.updated_at {
            self.updated_at = self.updated_at.max(ts);
        }
        match patch.transforming_by {
            Some(TransformLock::Held(user)) => self.transforming_by = Some(user),
            Some(TransformLock::Released) => self.transforming_by = None,
            None => {}
        }
    }

    /// Capture the current values an update is about to overwrite.
    ///
    /// Always records the tracked style/geometry fields (fill, width, height,
    /// rotation, visible, text, font size, radius) so a later undo restores
    /// them exactly; additionally records any other field the patch names
    /// (position, arrow geometry, stroke) so moves are reversible too.
    ///
    /// A patch can set a field but not clear it. When one of the optional
    /// fields (arrow points, stroke, stroke width, pointer size) was unset
    /// before the update, the snapshot leaves it `None` and undo keeps the
    /// value the update added.
    #[must_use]
    pub fn snapshot_before(&self, patch: &ObjectPatch) -> ObjectPatch {
        ObjectPatch {
            position: patch.position.map(|_| self.position),
            width: Some(self.width),
            height: Some(self.height),
            rotation: Some(self.rotation),
            fill: Some(self.fill.clone()),
            radius: self.radius,
            text: self.text.clone(),
            font_size: self.font_size,
            points: patch.points.and(self.points),
            stroke: patch.stroke.as_ref().and(self.stroke.clone()),
            stroke_width: patch.stroke_width.and(self.stroke_width),
            pointer_length: patch.pointer_length.and(self.pointer_length),
            pointer_width: patch.pointer_width.and(self.pointer_width),
            visible: Some(self.is_visible()),
            updated_at: None,
            transforming_by: None,
        }
    }
}

// =============================================================================
// PATCH
// =============================================================================

/// Ephemeral lock indicator carried in a patch during a resize/rotate gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformLock {
    /// The given user started transforming the object.
    Held(UserId),
    /// The gesture ended; serialized as `null`.
    Released,
}

/// Sparse update for a canvas object. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<ArrowPoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Missing = untouched, `"<uuid>"` = held, `null` = released.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_lock",
        deserialize_with = "deserialize_lock"
    )]
    pub transforming_by: Option<TransformLock>,
}

impl ObjectPatch {
    /// Patch that only moves the object.
    #[must_use]
    pub fn moved(position: Point) -> Self {
        Self { position: Some(position), ..Self::default() }
    }

    /// Patch that only changes the fill color.
    #[must_use]
    pub fn filled(fill: impl Into<String>) -> Self {
        Self { fill: Some(fill.into()), ..Self::default() }
    }

    /// Patch that marks the object as being transformed by `user`.
    #[must_use]
    pub fn locked_by(user: UserId) -> Self {
        Self { transforming_by: Some(TransformLock::Held(user)), ..Self::default() }
    }

    /// Patch that clears the transform lock indicator.
    #[must_use]
    pub fn unlocked() -> Self {
        Self { transforming_by: Some(TransformLock::Released), ..Self::default() }
    }

    /// Every mutable attribute of `object`, as sent with a create broadcast.
    #[must_use]
    pub fn from_object(object: &CanvasObject) -> Self {
        Self {
            position: Some(object.position),
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
            updated_at: Some(object.updated_at),
            transforming_by: None,
        }
    }

    /// Copy of this patch without the ephemeral lock, suitable for the
    /// durable store.
    #[must_use]
    pub fn durable(&self) -> Self {
        Self { transforming_by: None, ..self.clone() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[allow(clippy::ref_option)]
fn serialize_lock<S>(lock: &Option<TransformLock>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match lock {
        Some(TransformLock::Held(user)) => serializer.serialize_some(user),
        Some(TransformLock::Released) | None => serializer.serialize_none(),
    }
}

fn deserialize_lock<'de, D>(deserializer: D) -> Result<Option<TransformLock>, D::Error>
where
    D: Deserializer<'de>,
{
    let user = Option::<UserId>::deserialize(deserializer)?;
    Ok(Some(user.map_or(TransformLock::Released, TransformLock::Held)))
}

// =============================================================================
// NEW OBJECT
// =============================================================================

/// An object about to be written to the durable store. The store assigns the
/// timestamps and, unless `id` is set (replayed recreation), the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub kind: ObjectKind,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub fill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<ArrowPoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    pub created_by: UserId,
}

impl NewObject {
    /// Stamp identity and timestamps onto this object.
    #[must_use]
    pub fn into_object(self, id: ObjectId, now: i64) -> CanvasObject {
        CanvasObject {
            id,
            kind: self.kind,
            position: self.position,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            fill: self.fill,
            radius: self.radius,
            text: self.text,
            font_size: self.font_size,
            points: self.points,
            stroke: self.stroke,
            stroke_width: self.stroke_width,
            pointer_length: self.pointer_length,
            pointer_width: self.pointer_width,
            visible: self.visible,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
            transforming_by: None,
        }
    }

    /// Rebuild the creation input for an existing object, keeping its id.
    #[must_use]
    pub fn from_object(object: &CanvasObject) -> Self {
        Self {
            id: Some(object.id),
            kind: object.kind,
            position: object.position,
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
            created_by: object.created_by,
        }
    }
}

// =============================================================================
// DELTA
// =============================================================================

/// One message on the ephemeral channel: a partial patch for an object, or
/// the reserved `deleted` sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<ObjectPatch>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    pub timestamp: i64,
    /// Session that published the delta, used to drop our own echoes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Uuid>,
}

impl Delta {
    #[must_use]
    pub fn patch(id: ObjectId, updates: ObjectPatch) -> Self {
        Self { id, updates: Some(updates), deleted: false, timestamp: now_ms(), origin: None }
    }

    #[must_use]
    pub fn deleted(id: ObjectId) -> Self {
        Self { id, updates: None, deleted: true, timestamp: now_ms(), origin: None }
    }

    /// Tag this delta with the publishing session.
    #[must_use]
    pub fn with_origin(mut self, session_id: Uuid) -> Self {
        self.origin = Some(session_id);
        self
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
