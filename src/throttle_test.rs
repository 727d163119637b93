use std::sync::{Arc, Mutex};

use super::*;

const WINDOW: Duration = Duration::from_millis(16);

#[test]
fn first_offer_sends_immediately() {
    let mut throttle = Throttle::new(WINDOW);
    assert_eq!(throttle.offer(1, Instant::now()), Offer::Send(1));
    assert!(!throttle.has_pending());
}

#[test]
fn offers_inside_window_keep_latest() {
    let mut throttle = Throttle::new(WINDOW);
    let start = Instant::now();
    throttle.offer(1, start);

    let first = throttle.offer(2, start + Duration::from_millis(2));
    assert_eq!(first, Offer::Deferred { flush_at: start + WINDOW, schedule: true });
    let second = throttle.offer(3, start + Duration::from_millis(4));
    assert_eq!(second, Offer::Deferred { flush_at: start + WINDOW, schedule: false });

    assert_eq!(throttle.flush(start + WINDOW), Flush::Send(3));
    assert_eq!(throttle.flush(start + WINDOW), Flush::Idle);
}

#[test]
fn early_flush_waits_for_window() {
    let mut throttle = Throttle::new(WINDOW);
    let start = Instant::now();
    throttle.offer(1, start);
    throttle.offer(2, start + Duration::from_millis(1));
    assert_eq!(throttle.flush(start + Duration::from_millis(5)), Flush::Wait(start + WINDOW));
}

#[test]
fn send_after_window_discards_stale_pending() {
    let mut throttle = Throttle::new(WINDOW);
    let start = Instant::now();
    throttle.offer(1, start);
    throttle.offer(2, start + Duration::from_millis(1));

    let later = start + WINDOW + Duration::from_millis(1);
    assert_eq!(throttle.offer(3, later), Offer::Send(3));
    assert_eq!(throttle.flush(later + WINDOW), Flush::Idle);
}

#[test]
fn cancel_drops_pending() {
    let mut throttle = Throttle::new(WINDOW);
    let start = Instant::now();
    throttle.offer(1, start);
    throttle.offer(2, start + Duration::from_millis(1));
    throttle.cancel();
    assert_eq!(throttle.flush(start + WINDOW), Flush::Idle);
}

#[test]
fn flush_reschedules_after_idle() {
    let mut throttle = Throttle::new(WINDOW);
    let start = Instant::now();
    throttle.offer(1, start);
    throttle.offer(2, start + Duration::from_millis(1));
    assert_eq!(throttle.flush(start + WINDOW), Flush::Send(2));

    let next = throttle.offer(3, start + WINDOW + Duration::from_millis(1));
    assert!(matches!(next, Offer::Deferred { schedule: true, .. }));
}

#[tokio::test]
async fn spawned_flush_sends_latest_value() {
    let throttle = Arc::new(Mutex::new(Throttle::new(WINDOW)));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let flush_at = {
        let mut guard = throttle.lock().unwrap();
        guard.offer(1, start);
        guard.offer(2, start);
        match guard.offer(3, start) {
            Offer::Deferred { flush_at, .. } => flush_at,
            Offer::Send(_) => panic!("expected deferral"),
        }
    };

    let take_throttle = Arc::clone(&throttle);
    let sink = Arc::clone(&sent);
    let handle = spawn_flush(
        flush_at,
        move |now| take_throttle.lock().unwrap().flush(now),
        move |value| async move {
            sink.lock().unwrap().push(value);
        },
    );
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(*sent.lock().unwrap(), vec![3]);
}
