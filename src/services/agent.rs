//! Agent action surface: primitive actions issued by the AI layer.
//!
//! SYSTEM CONTEXT
//! ==============
//! The natural-language layer lives elsewhere; it hands this module a list of
//! primitive actions as JSON. Each action maps onto ordinary hub mutations,
//! so agent edits are broadcast, persisted and undoable exactly like a
//! user's.
//!
//! TARGETS
//! =======
//! A target is either an object id or a loose description ("the red
//! circle") resolved against visible objects in the local cache.
//!
//! ERROR HANDLING
//! ==============
//! Actions run in order and stop at the first failure. The report lists what
//! was applied before it; applied actions are not rolled back.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::sync::{CreateParams, Origin, SyncError, SyncHub, UpdateKind};
use crate::error::ErrorCode;
use crate::model::{CanvasObject, ObjectId, ObjectKind, ObjectPatch, Point};

const DEFAULT_ARRANGE_SPACING: f64 = 20.0;
const DEFAULT_CIRCLE_FILL: &str = "#10B981";
const DEFAULT_CIRCLE_RADIUS: f64 = 50.0;
const DEFAULT_TEXT_FILL: &str = "#000000";
const DEFAULT_TEXT: &str = "Text";
const DEFAULT_FONT_SIZE: f64 = 16.0;
const DEFAULT_TEXT_WIDTH: f64 = 200.0;
const DEFAULT_TEXT_HEIGHT: f64 = 50.0;
const DEFAULT_ARROW_LENGTH: f64 = 100.0;
const DEFAULT_STROKE: &str = "#000000";

// =============================================================================
// ACTIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, alias = "fontSize", skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, alias = "strokeWidth", skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    /// Relative move from the current position; ignored when `position` is set.
    #[serde(default, alias = "deltaX", skip_serializing_if = "Option::is_none")]
    pub delta_x: Option<f64>,
    #[serde(default, alias = "deltaY", skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Absolute rotation in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// Multiplier applied to the current size; wins over `dimensions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, alias = "fontSize", skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Horizontal,
    Vertical,
}

impl Direction {
    fn coordinate(self, point: Point) -> f64 {
        match self {
            Self::Horizontal => point.x,
            Self::Vertical => point.y,
        }
    }

    fn extent(self, object: &CanvasObject) -> f64 {
        match self {
            Self::Horizontal => object.extent_x(),
            Self::Vertical => object.extent_y(),
        }
    }

    fn place(self, point: Point, coordinate: f64) -> Point {
        match self {
            Self::Horizontal => Point::new(coordinate, point.y),
            Self::Vertical => Point::new(point.x, coordinate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<f64>,
}

/// One primitive action, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    Create {
        #[serde(rename = "type")]
        kind: ObjectKind,
        position: Point,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<Dimensions>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<Style>,
    },
    Update {
        target: String,
        updates: AgentUpdates,
    },
    Delete {
        target: String,
    },
    Duplicate {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<Point>,
    },
    /// Empty `targets` arranges every visible object.
    Arrange {
        #[serde(default)]
        targets: Vec<String>,
        layout: Layout,
    },
}

impl AgentAction {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Duplicate { .. } => "duplicate",
            Self::Arrange { .. } => "arrange",
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("no visible object matches target: {0}")]
    UnknownTarget(String),
    #[error("no objects to arrange")]
    NoTargets,
    #[error("invalid action: {0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl ErrorCode for AgentError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownTarget(_) => "E_UNKNOWN_TARGET",
            Self::NoTargets => "E_NO_TARGETS",
            Self::Invalid(_) => "E_INVALID_ACTION",
            Self::Sync(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Sync(e) if e.retryable())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Created(ObjectId),
    Updated(ObjectId),
    Deleted(ObjectId),
    Duplicated { source: ObjectId, copy: ObjectId },
    Arranged(Vec<ObjectId>),
}

/// What a batch of actions did before it finished or failed.
#[derive(Debug, Default)]
pub struct ActionReport {
    pub outcomes: Vec<ActionOutcome>,
    /// Index and error of the action that stopped the batch.
    pub failure: Option<(usize, AgentError)>,
}

impl ActionReport {
    #[must_use]
    pub fn applied(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Run actions in order, stopping at the first failure.
pub async fn apply_actions(hub: &SyncHub, actions: &[AgentAction]) -> ActionReport {
    let mut report = ActionReport::default();
    for (index, action) in actions.iter().enumerate() {
        match apply_action(hub, action).await {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(e) => {
                warn!(index, action = action.name(), error = %e, "agent action failed");
                report.failure = Some((index, e));
                break;
            }
        }
    }
    info!(applied = report.applied(), total = actions.len(), "agent actions applied");
    report
}

/// Run one action through the hub as a user mutation.
///
/// # Errors
///
/// `UnknownTarget` when a target does not resolve, or the hub's error.
pub async fn apply_action(hub: &SyncHub, action: &AgentAction) -> Result<ActionOutcome, AgentError> {
    match action {
        AgentAction::Create { kind, position, dimensions, style } => {
            let params = create_params(*kind, *position, dimensions.as_ref(), style.as_ref());
            let object = hub.create(params, Origin::User).await?;
            Ok(ActionOutcome::Created(object.id))
        }
        AgentAction::Update { target, updates } => {
            let object = resolve(hub, target)?;
            let patch = update_patch(&object, updates)?;
            hub.update(object.id, patch, Origin::User)
                .settled()
                .await?;
            Ok(ActionOutcome::Updated(object.id))
        }
        AgentAction::Delete { target } => {
            let object = resolve(hub, target)?;
            hub.delete(object.id, Origin::User).await?;
            Ok(ActionOutcome::Deleted(object.id))
        }
        AgentAction::Duplicate { target, offset } => {
            let source = resolve(hub, target)?;
            let copy = match offset {
                None => hub.duplicate(source.id, Origin::User).await?,
                Some(offset) => {
                    let mut params = CreateParams::from_object(&source);
                    params.id = None;
                    params.created_by = None;
                    params.position = source.position.offset(offset.x, offset.y);
                    hub.create(params, Origin::User).await?
                }
            };
            Ok(ActionOutcome::Duplicated { source: source.id, copy: copy.id })
        }
        AgentAction::Arrange { targets, layout } => {
            let mut objects: Vec<CanvasObject> = Vec::with_capacity(targets.len());
            for target in targets {
                let object = resolve(hub, target)?;
                if !objects.iter().any(|o| o.id == object.id) {
                    objects.push(object);
                }
            }
            if targets.is_empty() {
                objects = hub.with_cache(|c| c.visible_objects().into_iter().cloned().collect());
            }
            if objects.is_empty() {
                return Err(AgentError::NoTargets);
            }
            let spacing = layout.spacing.unwrap_or(DEFAULT_ARRANGE_SPACING);
            let placements = arrange_positions(&objects, layout.direction, spacing);
            let mut moved = Vec::with_capacity(placements.len());
            for (id, position) in placements {
                hub.update_as(UpdateKind::Move, id, ObjectPatch::moved(position), Origin::User)
                    .settled()
                    .await?;
                moved.push(id);
            }
            Ok(ActionOutcome::Arranged(moved))
        }
    }
}

/// Lay objects out along one axis, in their current order on that axis.
///
/// The first object keeps its coordinate; each next one starts at the
/// previous start plus the previous object's extent plus `spacing`. The
/// cross-axis coordinate is unchanged.
#[must_use]
pub fn arrange_positions(objects: &[CanvasObject], direction: Direction, spacing: f64) -> Vec<(ObjectId, Point)> {
    let mut sorted: Vec<&CanvasObject> = objects.iter().collect();
    sorted.sort_by(|a, b| {
        direction
            .coordinate(a.position)
            .total_cmp(&direction.coordinate(b.position))
    });
    let Some(first) = sorted.first() else {
        return Vec::new();
    };

    let mut cursor = direction.coordinate(first.position);
    sorted
        .into_iter()
        .map(|object| {
            let position = direction.place(object.position, cursor);
            cursor += direction.extent(object) + spacing;
            (object.id, position)
        })
        .collect()
}

fn resolve(hub: &SyncHub, target: &str) -> Result<CanvasObject, AgentError> {
    let found = match Uuid::parse_str(target.trim()) {
        Ok(id) => hub.get(id),
        Err(_) => hub.find_by_description(target),
    };
    found.ok_or_else(|| AgentError::UnknownTarget(target.to_owned()))
}

fn create_params(kind: ObjectKind, position: Point, dimensions: Option<&Dimensions>, style: Option<&Style>) -> CreateParams {
    let dims = dimensions.cloned().unwrap_or_default();
    let style = style.cloned().unwrap_or_default();
    let mut params = CreateParams::new(kind, position);
    params.width = dims.width;
    params.height = dims.height;
    params.fill = style.fill;
    params.stroke = style.stroke;
    params.stroke_width = style.stroke_width;

    match kind {
        ObjectKind::Circle => {
            let radius = dims.radius.unwrap_or(DEFAULT_CIRCLE_RADIUS);
            params.radius = Some(radius);
            params.width = params.width.or(Some(radius * 2.0));
            params.height = params.height.or(Some(radius * 2.0));
            params.fill = params.fill.or_else(|| Some(DEFAULT_CIRCLE_FILL.to_owned()));
        }
        ObjectKind::Text => {
            params.width = params.width.or(Some(DEFAULT_TEXT_WIDTH));
            params.height = params.height.or(Some(DEFAULT_TEXT_HEIGHT));
            params.text = Some(style.text.unwrap_or_else(|| DEFAULT_TEXT.to_owned()));
            params.font_size = Some(style.font_size.unwrap_or(DEFAULT_FONT_SIZE));
            params.fill = params.fill.or_else(|| Some(DEFAULT_TEXT_FILL.to_owned()));
        }
        ObjectKind::Arrow => {
            let length = params.width.unwrap_or(DEFAULT_ARROW_LENGTH);
            params.points = Some([0.0, 0.0, length, 0.0]);
            params.stroke = params.stroke.or_else(|| Some(DEFAULT_STROKE.to_owned()));
        }
        ObjectKind::Rectangle => {}
    }
    params
}

fn update_patch(object: &CanvasObject, updates: &AgentUpdates) -> Result<ObjectPatch, AgentError> {
    let position = match (updates.position, updates.delta_x, updates.delta_y) {
        (Some(position), _, _) => Some(position),
        (None, None, None) => None,
        (None, dx, dy) => Some(object.position.offset(dx.unwrap_or(0.0), dy.unwrap_or(0.0))),
    };
    if position.is_some_and(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(AgentError::Invalid("position must be finite"));
    }
    let mut patch = ObjectPatch {
        position,
        rotation: updates.rotation,
        fill: updates.fill.clone(),
        text: updates.text.clone(),
        font_size: updates.font_size,
        ..ObjectPatch::default()
    };

    if let Some(scale) = updates.scale {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(AgentError::Invalid("scale must be a positive number"));
        }
        patch.width = Some(object.width * scale);
        patch.height = Some(object.height * scale);
        patch.radius = object.radius.map(|r| r * scale);
    } else if let Some(dims) = &updates.dimensions {
        patch.width = dims.width;
        patch.height = dims.height;
        patch.radius = dims.radius;
    }

    if patch.is_empty() {
        return Err(AgentError::Invalid("update names no attributes"));
    }
    Ok(patch)
}

#[cfg(test)]
#[path = "agent_test.rs"]
mod tests;
