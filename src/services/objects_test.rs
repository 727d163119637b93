#![allow(clippy::float_cmp)]

use std::time::Duration;

use super::*;
use crate::model::{ObjectKind, Point, TransformLock};
use crate::test_helpers::{RecordingChannel, TestStore};

struct Fixture {
    client: ObjectsClient,
    store: Arc<TestStore>,
    channel: Arc<RecordingChannel>,
    session: Uuid,
}

fn fixture(ttl: Duration) -> Fixture {
    let store = Arc::new(TestStore::new());
    let channel = Arc::new(RecordingChannel::new());
    let session = Uuid::new_v4();
    let client = ObjectsClient::new(Uuid::new_v4(), session, store.clone(), channel.clone(), ttl);
    Fixture { client, store, channel, session }
}

fn circle() -> NewObject {
    NewObject {
        id: None,
        kind: ObjectKind::Circle,
        position: Point::new(40.0, 40.0),
        width: 60.0,
        height: 60.0,
        rotation: 0.0,
        fill: "#10B981".into(),
        radius: Some(30.0),
        text: None,
        font_size: None,
        points: None,
        stroke: None,
        stroke_width: None,
        pointer_length: None,
        pointer_width: None,
        visible: Some(true),
        created_by: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn create_broadcasts_full_attributes_with_origin() {
    let f = fixture(Duration::from_secs(5));
    let object = f.client.create(circle()).await.unwrap();

    let published = f.channel.published();
    assert_eq!(published.len(), 1);
    let delta = &published[0];
    assert_eq!(delta.id, object.id);
    assert_eq!(delta.origin, Some(f.session));
    let patch = delta.updates.as_ref().unwrap();
    assert_eq!(patch.radius, Some(30.0));
    assert_eq!(patch.fill.as_deref(), Some("#10B981"));
    assert_eq!(patch.position, Some(Point::new(40.0, 40.0)));
}

#[tokio::test]
async fn update_persists_without_lock_and_broadcasts_timestamp() {
    let f = fixture(Duration::from_secs(5));
    let object = f.client.create(circle()).await.unwrap();
    f.channel.take_published();

    let patch = ObjectPatch {
        fill: Some("#EF4444".into()),
        transforming_by: Some(TransformLock::Held(Uuid::new_v4())),
        ..ObjectPatch::default()
    };
    f.client.update(object.id, &patch).await.unwrap();

    let stored = f.store.inner.get(f.client.canvas_id(), object.id).await.unwrap().unwrap();
    assert_eq!(stored.fill, "#EF4444");
    assert_eq!(stored.transforming_by, None);

    let published = f.channel.published();
    let sent = published[0].updates.as_ref().unwrap();
    assert_eq!(sent.transforming_by, None);
    assert!(sent.updated_at.is_some());
}

#[tokio::test]
async fn delete_broadcasts_sentinel() {
    let f = fixture(Duration::from_secs(5));
    let object = f.client.create(circle()).await.unwrap();
    f.client.delete(object.id).await.unwrap();

    let last = f.channel.published().pop().unwrap();
    assert!(last.deleted);
    assert!(last.updates.is_none());
    assert!(f.client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_broadcasts_the_copy() {
    let f = fixture(Duration::from_secs(5));
    let source = f.client.create(circle()).await.unwrap();
    let owner = Uuid::new_v4();
    let copy = f.client.duplicate(source.id, owner).await.unwrap();

    assert_ne!(copy.id, source.id);
    assert_eq!(copy.created_by, owner);
    assert_eq!(copy.position, Point::new(60.0, 60.0));
    assert_eq!(f.channel.published().last().unwrap().id, copy.id);
}

#[tokio::test]
async fn durable_deltas_are_cleared_after_ttl() {
    let f = fixture(Duration::from_millis(20));
    let object = f.client.create(circle()).await.unwrap();
    assert!(f.channel.inner.retained(f.client.canvas_id(), object.id).is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(f.channel.cleared(), vec![object.id]);
    assert!(f.channel.inner.retained(f.client.canvas_id(), object.id).is_none());
}

#[tokio::test]
async fn live_frames_are_not_cleared() {
    let f = fixture(Duration::from_millis(20));
    let id = Uuid::new_v4();
    f.client
        .broadcast_live(Delta::patch(id, ObjectPatch::moved(Point::new(1.0, 2.0))))
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(f.channel.cleared().is_empty());
    assert_eq!(f.channel.published()[0].origin, Some(f.session));
}

#[tokio::test]
async fn broadcast_failure_does_not_fail_the_write() {
    let f = fixture(Duration::from_secs(5));
    f.channel.set_failing(true);

    let object = f.client.create(circle()).await.unwrap();
    assert!(f.channel.published().is_empty());
    assert_eq!(f.client.list().await.unwrap()[0].id, object.id);
}

#[tokio::test]
async fn durable_failure_skips_broadcast() {
    let f = fixture(Duration::from_secs(5));
    f.store.set_failing(true);

    let err = f.client.create(circle()).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(f.channel.published().is_empty());
}
