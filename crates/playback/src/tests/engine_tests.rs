use std::time::Duration;

use super::*;
use crate::fixtures::{post, store_of};
use shared::protocol::ShowPayload;
use tokio::time::Instant;

fn spawn_with(ids: &[&str]) -> (PlaybackHandle, watch::Receiver<QueueDocument>) {
    PlaybackHandle::spawn(store_of(ids).to_document(), 64)
}

async fn next_show(rx: &mut broadcast::Receiver<ServerEvent>) -> ShowPayload {
    loop {
        match rx.recv().await.expect("event stream") {
            ServerEvent::ShowItem(payload) => return payload,
            _ => continue,
        }
    }
}

fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn auto_advance_fires_after_default_duration() {
    let (playback, _docs) = spawn_with(&["a", "b"]);
    let (_, mut rx) = playback.subscribe().await.expect("subscribe");

    let started = Instant::now();
    playback.toggle_auto().await.expect("toggle");
    assert_eq!(next_show(&mut rx).await.item.id.as_str(), "a");

    let early = tokio::time::timeout(Duration::from_millis(9_900), next_show(&mut rx)).await;
    assert!(early.is_err(), "advanced before the duration elapsed");

    let advanced = next_show(&mut rx).await;
    assert_eq!(advanced.item.id.as_str(), "b");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "fired after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(10_500), "fired after {elapsed:?}");

    let state = playback.snapshot().await.expect("snapshot");
    assert_eq!(state.cursor, 1);
    assert!(state.auto_advance_active);
}

#[tokio::test(start_paused = true)]
async fn auto_advance_loops_back_to_start() {
    let (playback, _docs) = spawn_with(&["a", "b"]);
    let (_, mut rx) = playback.subscribe().await.expect("subscribe");
    playback.toggle_auto().await.expect("toggle");

    let order = [
        next_show(&mut rx).await,
        next_show(&mut rx).await,
        next_show(&mut rx).await,
    ];
    let ids: Vec<_> = order.iter().map(|p| p.item.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn toggling_off_cancels_pending_advance() {
    let (playback, _docs) = spawn_with(&["a", "b"]);
    let (_, mut rx) = playback.subscribe().await.expect("subscribe");
    playback.toggle_auto().await.expect("on");
    tokio::time::sleep(Duration::from_secs(4)).await;
    playback.toggle_auto().await.expect("off");
    drain(&mut rx);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let late: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::ShowItem(_)))
        .collect();
    assert!(late.is_empty(), "show fired after cancel: {late:?}");
    assert_eq!(playback.snapshot().await.expect("snapshot").cursor, 0);
}

#[tokio::test(start_paused = true)]
async fn pinned_item_holds_the_screen() {
    let (playback, _docs) = spawn_with(&["a", "b"]);
    playback
        .apply(PlaybackOp::PatchItem(
            0,
            ItemPatch {
                toggle_pinned: true,
                ..ItemPatch::default()
            },
        ))
        .await
        .expect("pin");
    let (_, mut rx) = playback.subscribe().await.expect("subscribe");
    playback.toggle_auto().await.expect("toggle");
    assert!(next_show(&mut rx).await.is_pinned);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, ServerEvent::ShowItem(_))));
    let state = playback.snapshot().await.expect("snapshot");
    assert_eq!(state.cursor, 0);
    assert!(state.auto_advance_active);
}

#[tokio::test(start_paused = true)]
async fn manual_next_restarts_the_countdown() {
    let (playback, _docs) = spawn_with(&["a", "b", "c"]);
    let (_, mut rx) = playback.subscribe().await.expect("subscribe");
    playback.toggle_auto().await.expect("toggle");
    next_show(&mut rx).await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    playback.next().await.expect("next");
    assert_eq!(next_show(&mut rx).await.item.id.as_str(), "b");
    let rearmed_at = Instant::now();

    let advanced = next_show(&mut rx).await;
    assert_eq!(advanced.item.id.as_str(), "c");
    assert!(rearmed_at.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn stale_timer_generation_is_ignored() {
    let (playback, _docs) = spawn_with(&["a", "b"]);
    playback.show(0).await.expect("show");
    let (_, mut rx) = playback.subscribe().await.expect("subscribe");

    playback
        .send(Message::TimerElapsed { generation: 42 })
        .await
        .expect("send");
    let state = playback.snapshot().await.expect("snapshot");
    assert_eq!(state.cursor, 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn subscriber_starts_from_current_state() {
    let (playback, _docs) = spawn_with(&["a", "b"]);
    playback.show(1).await.expect("show");

    let (initial, mut rx) = playback.subscribe().await.expect("subscribe");
    assert_eq!(initial.cursor, 1);
    assert_eq!(initial.queue.len(), 2);

    playback.next().await.expect("next");
    assert_eq!(next_show(&mut rx).await.display_position, 1);
}

#[tokio::test]
async fn mutations_publish_documents_for_saving() {
    let (playback, mut docs) = spawn_with(&[]);
    assert!(!docs.has_changed().expect("watch"));

    playback
        .apply(PlaybackOp::Append(post("7")))
        .await
        .expect("append");
    assert!(docs.has_changed().expect("watch"));
    assert_eq!(docs.borrow_and_update().queue.len(), 1);

    playback.show(0).await.expect("show");
    assert!(!docs.has_changed().expect("watch"));
}

#[tokio::test]
async fn store_errors_reach_the_caller() {
    let (playback, _docs) = spawn_with(&["1"]);
    let err = playback
        .apply(PlaybackOp::Append(post("1")))
        .await
        .expect_err("duplicate");
    assert!(matches!(
        err,
        PlaybackError::Store(StoreError::DuplicateItem(_))
    ));
    assert!(playback.contains_source("1").await.expect("lookup"));
    assert!(!playback.contains_source("2").await.expect("lookup"));
}
