#![allow(clippy::float_cmp)]

use uuid::Uuid;

use super::*;
use crate::model::NewObject;

fn object(kind: ObjectKind, fill: &str, created_at: i64) -> CanvasObject {
    NewObject {
        id: None,
        kind,
        position: Point::new(100.0, 120.0),
        width: 50.0,
        height: 40.0,
        rotation: 0.0,
        fill: fill.into(),
        radius: None,
        text: None,
        font_size: None,
        points: None,
        stroke: None,
        stroke_width: None,
        pointer_length: None,
        pointer_width: None,
        visible: None,
        created_by: Uuid::new_v4(),
    }
    .into_object(Uuid::new_v4(), created_at)
}

fn cache_with(objects: &[CanvasObject]) -> ObjectCache {
    let mut cache = ObjectCache::new();
    for obj in objects {
        cache.add(obj.clone());
    }
    cache
}

// =============================================================
// objects
// =============================================================

#[test]
fn patch_unknown_id_is_noop() {
    let mut cache = ObjectCache::new();
    assert!(!cache.patch(&Uuid::new_v4(), &ObjectPatch::filled("red")));
    assert!(cache.is_empty());
}

#[test]
fn patch_merges_into_cached_object() {
    let obj = object(ObjectKind::Rectangle, "#000000", 1);
    let mut cache = cache_with(&[obj.clone()]);
    assert!(cache.patch(&obj.id, &ObjectPatch::moved(Point::new(5.0, 6.0))));
    let cached = cache.get(&obj.id).unwrap();
    assert_eq!(cached.position, Point::new(5.0, 6.0));
    assert_eq!(cached.fill, "#000000");
}

#[test]
fn objects_are_listed_in_creation_order() {
    let late = object(ObjectKind::Circle, "red", 30);
    let early = object(ObjectKind::Rectangle, "blue", 10);
    let cache = cache_with(&[late.clone(), early.clone()]);
    let ids: Vec<_> = cache.objects().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![early.id, late.id]);
}

#[test]
fn visible_objects_skip_hidden() {
    let mut hidden = object(ObjectKind::Rectangle, "red", 1);
    hidden.visible = Some(false);
    let shown = object(ObjectKind::Rectangle, "red", 2);
    let cache = cache_with(&[hidden, shown.clone()]);
    let visible = cache.visible_objects();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, shown.id);
}

#[test]
fn load_snapshot_keeps_transform_lock() {
    let obj = object(ObjectKind::Rectangle, "red", 1);
    let user = Uuid::new_v4();
    let mut cache = cache_with(&[obj.clone()]);
    cache.patch(&obj.id, &ObjectPatch::locked_by(user));

    let mut durable = obj.clone();
    durable.width = 999.0;
    cache.load_snapshot(vec![durable]);

    let cached = cache.get(&obj.id).unwrap();
    assert_eq!(cached.width, 999.0);
    assert_eq!(cached.transforming_by, Some(user));
}

// =============================================================
// selection
// =============================================================

#[test]
fn selection_invariant_survives_remove_and_reload() {
    let a = object(ObjectKind::Rectangle, "red", 1);
    let b = object(ObjectKind::Circle, "blue", 2);
    let c = object(ObjectKind::Text, "green", 3);
    let mut cache = cache_with(&[a.clone(), b.clone(), c.clone()]);
    cache.set_selection([a.id, b.id, c.id]);

    cache.remove(&b.id);
    assert_eq!(cache.selected_ids(), &[a.id, c.id]);

    let mut next = HashMap::new();
    next.insert(c.id, c.clone());
    cache.set(next);
    assert_eq!(cache.selected_ids(), &[c.id]);
    for id in cache.selected_ids() {
        assert!(cache.contains(id));
    }
}

#[test]
fn select_is_idempotent_and_ignores_unknown() {
    let a = object(ObjectKind::Rectangle, "red", 1);
    let mut cache = cache_with(&[a.clone()]);
    assert!(cache.select(a.id));
    assert!(cache.select(a.id));
    assert!(!cache.select(Uuid::new_v4()));
    assert_eq!(cache.selected_count(), 1);
}

#[test]
fn toggle_flips_membership() {
    let a = object(ObjectKind::Rectangle, "red", 1);
    let mut cache = cache_with(&[a.clone()]);
    assert!(cache.toggle(a.id));
    assert!(cache.is_selected(&a.id));
    assert!(!cache.toggle(a.id));
    assert!(!cache.is_selected(&a.id));
}

#[test]
fn representative_is_first_selected() {
    let a = object(ObjectKind::Rectangle, "red", 1);
    let b = object(ObjectKind::Rectangle, "red", 2);
    let mut cache = cache_with(&[a.clone(), b.clone()]);
    assert_eq!(cache.representative(), None);
    cache.set_selection([b.id, a.id, b.id]);
    assert_eq!(cache.representative(), Some(b.id));
    assert_eq!(cache.selected_count(), 2);
    cache.clear_selection();
    assert_eq!(cache.selected_count(), 0);
}

// =============================================================
// clipboard
// =============================================================

#[test]
fn paste_positions_cascade_from_original() {
    let source = object(ObjectKind::Rectangle, "red", 1);
    let mut cache = cache_with(&[source.clone()]);
    cache.copy(&source);

    let mut landed = Vec::new();
    for _ in 0..3 {
        let next = cache.next_paste_position(20.0).unwrap();
        cache.set_last_pasted_position(Some(next));
        landed.push(next);
    }
    assert_eq!(
        landed,
        vec![Point::new(120.0, 140.0), Point::new(140.0, 160.0), Point::new(160.0, 180.0)]
    );
}

#[test]
fn copy_restarts_cascade() {
    let source = object(ObjectKind::Rectangle, "red", 1);
    let mut cache = cache_with(&[source.clone()]);
    cache.copy(&source);
    cache.set_last_pasted_position(Some(Point::new(500.0, 500.0)));
    cache.copy(&source);
    assert_eq!(cache.last_pasted_position(), None);
    assert_eq!(cache.next_paste_position(20.0), Some(Point::new(120.0, 140.0)));
}

#[test]
fn empty_clipboard_has_no_paste_position() {
    let mut cache = ObjectCache::new();
    assert_eq!(cache.next_paste_position(20.0), None);
    let source = object(ObjectKind::Rectangle, "red", 1);
    cache.copy(&source);
    cache.clear_clipboard();
    assert!(cache.clipboard().is_none());
    assert_eq!(cache.next_paste_position(20.0), None);
}

#[test]
fn clipboard_entry_rebuilds_creation_input() {
    let source = object(ObjectKind::Text, "black", 1);
    let entry = ClipboardEntry::from_object(&source);
    let user = Uuid::new_v4();
    let input = entry.to_new_object(Point::new(1.0, 2.0), user);
    assert_eq!(input.id, None);
    assert_eq!(input.kind, ObjectKind::Text);
    assert_eq!(input.position, Point::new(1.0, 2.0));
    assert_eq!(input.created_by, user);
    assert_eq!(input.fill, "black");
}

// =============================================================
// find_by_description
// =============================================================

#[test]
fn description_matches_kind_first() {
    let rect = object(ObjectKind::Rectangle, "red", 1);
    let circle = object(ObjectKind::Circle, "blue", 2);
    let cache = cache_with(&[rect, circle.clone()]);
    assert_eq!(cache.find_by_description("the red circle").unwrap().id, circle.id);
}

#[test]
fn description_falls_back_to_color() {
    let blue = object(ObjectKind::Rectangle, "#blue", 1);
    let red = object(ObjectKind::Rectangle, "red", 2);
    let green = object(ObjectKind::Rectangle, "green", 3);
    let cache = cache_with(&[blue, red.clone(), green]);
    assert_eq!(cache.find_by_description("the red one").unwrap().id, red.id);
}

#[test]
fn description_without_keywords_picks_newest_visible() {
    let older = object(ObjectKind::Rectangle, "red", 1);
    let newest = object(ObjectKind::Rectangle, "red", 5);
    let mut hidden = object(ObjectKind::Rectangle, "red", 9);
    hidden.visible = Some(false);
    let cache = cache_with(&[older, newest.clone(), hidden]);
    assert_eq!(cache.find_by_description("that thing").unwrap().id, newest.id);
}

#[test]
fn description_skips_hidden_kind_matches() {
    let mut hidden = object(ObjectKind::Circle, "red", 1);
    hidden.visible = Some(false);
    let cache = cache_with(&[hidden]);
    assert!(cache.find_by_description("circle").is_none());
}
