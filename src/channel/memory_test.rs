use std::time::Duration;

use super::*;
use crate::model::ObjectPatch;

async fn recv(rx: &mut mpsc::Receiver<Delta>) -> Delta {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn subscribers_receive_published_deltas() {
    let channel = MemoryChannel::default();
    let canvas = Uuid::new_v4();
    let mut rx = channel.subscribe(canvas).await.unwrap();

    let delta = Delta::patch(Uuid::new_v4(), ObjectPatch::filled("red"));
    channel.publish(canvas, delta.clone()).await.unwrap();
    assert_eq!(recv(&mut rx).await, delta);
}

#[tokio::test]
async fn late_subscriber_replays_retained_entries() {
    let channel = MemoryChannel::default();
    let canvas = Uuid::new_v4();
    let id = Uuid::new_v4();
    channel
        .publish(canvas, Delta::patch(id, ObjectPatch::filled("red")))
        .await
        .unwrap();
    channel
        .publish(canvas, Delta::patch(id, ObjectPatch::filled("blue")))
        .await
        .unwrap();

    let mut rx = channel.subscribe(canvas).await.unwrap();
    let replayed = recv(&mut rx).await;
    assert_eq!(replayed.updates.unwrap().fill.as_deref(), Some("blue"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn clear_drops_retained_entry() {
    let channel = MemoryChannel::default();
    let canvas = Uuid::new_v4();
    let id = Uuid::new_v4();
    channel.publish(canvas, Delta::deleted(id)).await.unwrap();
    assert_eq!(channel.retained_len(canvas), 1);

    channel.clear(canvas, id).await.unwrap();
    assert!(channel.retained(canvas, id).is_none());
}

#[tokio::test]
async fn topics_are_isolated_per_canvas() {
    let channel = MemoryChannel::default();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut rx_b = channel.subscribe(b).await.unwrap();
    channel.publish(a, Delta::deleted(Uuid::new_v4())).await.unwrap();
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn full_subscriber_does_not_block_publisher() {
    let channel = MemoryChannel::new(1);
    let canvas = Uuid::new_v4();
    let mut rx = channel.subscribe(canvas).await.unwrap();
    for _ in 0..5 {
        channel
            .publish(canvas, Delta::deleted(Uuid::new_v4()))
            .await
            .unwrap();
    }
    recv(&mut rx).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn dropped_subscribers_are_pruned() {
    let topics: MemoryTopics<ObjectId, Delta> = MemoryTopics::new(4);
    let canvas = Uuid::new_v4();
    drop(topics.subscribe(canvas).unwrap());
    topics
        .publish(canvas, Uuid::new_v4(), Delta::deleted(Uuid::new_v4()))
        .unwrap();
    assert_eq!(topics.lock().topics[&canvas].subscribers.len(), 0);
}

#[tokio::test]
async fn closed_channel_rejects_use() {
    let channel = MemoryChannel::default();
    channel.close();
    let err = channel
        .publish(Uuid::new_v4(), Delta::deleted(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Closed));
    assert!(channel.subscribe(Uuid::new_v4()).await.is_err());
}
