use uuid::Uuid;

use super::*;

fn ghost(x: f64) -> ShapePreview {
    ShapePreview {
        kind: ObjectKind::Rectangle,
        position: Point::new(x, 0.0),
        width: 40.0,
        height: 30.0,
        fill: "#3B82F6".into(),
        radius: None,
        points: None,
    }
}

fn frame(user_id: UserId, seq: u64, preview: Option<ShapePreview>) -> PreviewMessage {
    PreviewMessage { user_id, preview, seq, timestamp: 0 }
}

async fn drain(rx: &mut mpsc::Receiver<PreviewMessage>, wait: Duration) -> Vec<PreviewMessage> {
    tokio::time::sleep(wait).await;
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

// =============================================================
// RemotePreviews
// =============================================================

#[test]
fn remote_previews_ignore_own_frames() {
    let me = Uuid::new_v4();
    let mut previews = RemotePreviews::new(me);
    assert!(!previews.apply(frame(me, 1, Some(ghost(1.0)))));
    assert!(previews.is_empty());
}

#[test]
fn remote_previews_track_and_clear_other_users() {
    let other = Uuid::new_v4();
    let mut previews = RemotePreviews::new(Uuid::new_v4());
    assert!(previews.apply(frame(other, 1, Some(ghost(1.0)))));
    assert_eq!(previews.get(&other).unwrap().position.x, 1.0);
    assert!(previews.apply(frame(other, 2, None)));
    assert!(previews.is_empty());
}

#[test]
fn stale_frames_cannot_resurrect_cleared_preview() {
    let other = Uuid::new_v4();
    let mut previews = RemotePreviews::new(Uuid::new_v4());
    previews.apply(frame(other, 5, None));
    assert!(!previews.apply(frame(other, 4, Some(ghost(9.0)))));
    assert_eq!(previews.len(), 0);
}

// =============================================================
// PreviewBroadcaster
// =============================================================

#[tokio::test]
async fn rapid_updates_coalesce_to_latest() {
    let transport = Arc::new(MemoryPreviewTransport::new(64));
    let canvas = Uuid::new_v4();
    let mut rx = transport.subscribe(canvas).await.unwrap();
    let broadcaster = PreviewBroadcaster::new(canvas, Uuid::new_v4(), transport, Duration::from_millis(100));

    for x in 0..10 {
        broadcaster.update(ghost(f64::from(x)));
    }
    let frames = drain(&mut rx, Duration::from_millis(300)).await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].preview.as_ref().unwrap().position.x, 0.0);
    assert_eq!(frames[1].preview.as_ref().unwrap().position.x, 9.0);
}

#[tokio::test]
async fn clear_drops_pending_frame_and_removes_ghost() {
    let transport = Arc::new(MemoryPreviewTransport::new(64));
    let canvas = Uuid::new_v4();
    let user = Uuid::new_v4();
    let mut rx = transport.subscribe(canvas).await.unwrap();
    let broadcaster = PreviewBroadcaster::new(canvas, user, transport.clone(), Duration::from_millis(100));

    broadcaster.update(ghost(1.0));
    broadcaster.update(ghost(2.0));
    broadcaster.clear().await;
    let frames = drain(&mut rx, Duration::from_millis(300)).await;

    let mut remote = RemotePreviews::new(Uuid::new_v4());
    for message in frames.iter().cloned() {
        remote.apply(message);
    }
    assert!(remote.is_empty());
    assert!(frames.iter().all(|m| m.preview.as_ref().map_or(true, |p| p.position.x != 2.0)));

    // Late joiners only see the removal.
    let mut late = transport.subscribe(canvas).await.unwrap();
    let replayed = drain(&mut late, Duration::from_millis(10)).await;
    assert!(replayed.iter().all(|m| m.preview.is_none()));
}
