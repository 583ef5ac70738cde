//! Push reconnect and pull pagination behaviour

mod helpers;

use helpers::*;
use lcf_common::events::{ConnectionState, ErrorKind, FeedEvent, RenderInstruction, TransportMode};
use lcf_common::model::{Comment, CommentPage};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn page_of(prefix: &str, count: usize, total: u64) -> CommentPage {
    let data = (0..count)
        .map(|i| {
            serde_json::from_value::<Comment>(comment_json(&format!("{}-{}", prefix, i), "An", "hi"))
                .unwrap()
        })
        .collect();
    CommentPage {
        data,
        total_count: Some(total),
    }
}

#[tokio::test]
async fn test_stream_reconnects_once_after_drop() {
    let backend = FakeBackend::new();
    let controller = controller(&backend, test_config());
    let mut rx = controller.subscribe();

    controller.start(target(), TransportMode::Stream).await.unwrap();
    eventually(|| backend.active_streams.load(Ordering::SeqCst) == 1).await;
    backend.push(batch_message(&[comment_json("c1", "An", "hi")]));
    wait_for(&mut rx, |e| matches!(e, FeedEvent::Render { .. }).then_some(())).await;

    backend.drop_streams();

    let kind = wait_for(&mut rx, |e| match e {
        FeedEvent::ErrorRaised { kind, .. } => Some(*kind),
        _ => None,
    })
    .await;
    assert_eq!(kind, ErrorKind::Transport);

    // Banner clears when the reconnect opens
    wait_for(&mut rx, |e| matches!(e, FeedEvent::ErrorCleared { .. }).then_some(())).await;
    assert_eq!(backend.open_count.load(Ordering::SeqCst), 2);
    assert_eq!(controller.state().await, ConnectionState::Streaming);

    // Previously rendered comments survive the drop
    backend.push(batch_message(&[comment_json("c2", "Binh", "hello")]));
    let prepended = wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::PrependNew { items }, .. } => {
            Some(items.iter().map(|d| d.comment.id.clone()).collect::<Vec<_>>())
        }
        _ => None,
    })
    .await;
    assert_eq!(prepended, vec!["c2"]);
    let session = controller.session().await.unwrap();
    assert_eq!(session.comment_ids().await, vec!["c2", "c1"]);
}

#[tokio::test]
async fn test_failed_open_retries_after_delay() {
    let backend = FakeBackend::new();
    backend.fail_opens.store(2, Ordering::SeqCst);
    let controller = controller(&backend, test_config());
    let mut rx = controller.subscribe();

    controller.start(target(), TransportMode::Stream).await.unwrap();

    eventually(|| backend.active_streams.load(Ordering::SeqCst) == 1).await;
    assert_eq!(backend.open_count.load(Ordering::SeqCst), 3);

    let events = drain_for(&mut rx, Duration::from_millis(50)).await;
    let raised = events
        .iter()
        .filter(|e| matches!(e, FeedEvent::ErrorRaised { kind: ErrorKind::Transport, .. }))
        .count();
    assert_eq!(raised, 2);
    assert!(events.iter().any(|e| matches!(e, FeedEvent::ErrorCleared { .. })));
}

#[tokio::test]
async fn test_stop_cancels_pending_reconnect() {
    let backend = FakeBackend::new();
    let config = lcf_common::config::FeedConfig {
        reconnect_delay: Duration::from_millis(300),
        ..test_config()
    };
    let controller = controller(&backend, config);
    let mut rx = controller.subscribe();

    controller.start(target(), TransportMode::Stream).await.unwrap();
    eventually(|| backend.active_streams.load(Ordering::SeqCst) == 1).await;

    backend.drop_streams();
    wait_for(&mut rx, |e| matches!(e, FeedEvent::ErrorRaised { .. }).then_some(())).await;

    controller.stop().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(backend.open_count.load(Ordering::SeqCst), 1);
    assert_eq!(backend.active_streams.load(Ordering::SeqCst), 0);
    assert_eq!(controller.state().await, ConnectionState::Stopped);
}

#[tokio::test]
async fn test_poll_pages_through_results() {
    let backend = FakeBackend::new();
    backend.set_page(0, page_of("p1", 50, 120));
    backend.set_page(50, page_of("p2", 50, 120));
    backend.set_page(100, page_of("p3", 20, 120));
    let controller = controller(&backend, test_config());
    let mut rx = controller.subscribe();

    controller
        .start(target(), TransportMode::poll(Duration::from_secs(60)))
        .await
        .unwrap();

    let first = wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { items }, .. } => Some(items.len()),
        _ => None,
    })
    .await;
    assert_eq!(first, 50);

    let pagination = wait_for(&mut rx, |e| match e {
        FeedEvent::PaginationChanged { pagination, .. } => Some(*pagination),
        _ => None,
    })
    .await;
    assert!(pagination.visible);
    assert_eq!(pagination.total_pages, 3);
    assert!(!pagination.prev_enabled);
    assert!(pagination.next_enabled);

    // Page change fetches right away instead of waiting a minute
    assert!(controller.go_to_page(2).await);
    wait_for(&mut rx, |e| {
        matches!(e, FeedEvent::Render { instruction: RenderInstruction::ResetScroll, .. }).then_some(())
    })
    .await;
    let second = wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { items }, .. } => {
            Some(items[0].comment.id.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(second, "p2-0");

    // Same page is a no-op
    assert!(!controller.go_to_page(2).await);

    // Out of range clamps to the last page
    assert!(controller.go_to_page(10).await);
    let third = wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { items }, .. } => Some(items.len()),
        _ => None,
    })
    .await;
    assert_eq!(third, 20);

    assert_eq!(backend.requested_offsets(), vec![0, 50, 100]);
    let session = controller.session().await.unwrap();
    assert_eq!(session.fetch_window().await.page, 3);
}

#[tokio::test]
async fn test_pagination_disabled_while_searching() {
    let backend = FakeBackend::new();
    backend.set_page(0, page_of("p1", 50, 120));
    backend.set_page(50, page_of("p2", 50, 120));
    let controller = controller(&backend, test_config());
    let mut rx = controller.subscribe();

    controller
        .start(target(), TransportMode::poll(Duration::from_secs(60)))
        .await
        .unwrap();
    let loaded = wait_for(&mut rx, |e| match e {
        FeedEvent::PaginationChanged { pagination, .. } => Some(*pagination),
        _ => None,
    })
    .await;
    assert!(loaded.visible);

    assert!(controller.go_to_page(2).await);
    let second = wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { items }, .. } => {
            Some(items[0].comment.id.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(second, "p2-0");
    let on_page_two = wait_for(&mut rx, |e| match e {
        FeedEvent::PaginationChanged { pagination, .. } => Some(*pagination),
        _ => None,
    })
    .await;
    assert!(on_page_two.visible);
    assert_eq!(on_page_two.current_page, 2);

    controller.set_search_term(Some("an")).await;
    let pagination = wait_for(&mut rx, |e| match e {
        FeedEvent::PaginationChanged { pagination, .. } => Some(*pagination),
        _ => None,
    })
    .await;
    assert!(!pagination.visible);
    assert_eq!(pagination.current_page, 2);
    assert!(!controller.go_to_page(1).await);

    controller.set_search_term(Some("  ")).await;
    let pagination = wait_for(&mut rx, |e| match e {
        FeedEvent::PaginationChanged { pagination, .. } => Some(*pagination),
        _ => None,
    })
    .await;
    assert!(pagination.visible);
    assert_eq!(pagination.current_page, 2);

    let session = controller.session().await.unwrap();
    assert_eq!(session.fetch_window().await.page, 2);
    assert_eq!(backend.requested_offsets(), vec![0, 50]);
}

#[tokio::test]
async fn test_comment_shifted_across_page_boundary_is_not_new() {
    let backend = FakeBackend::new();
    backend.set_page(0, page_of("p1", 50, 120));
    backend.set_page(50, page_of("p2", 50, 120));
    let controller = controller(&backend, test_config());
    let mut rx = controller.subscribe();

    controller
        .start(target(), TransportMode::poll(Duration::from_secs(1)))
        .await
        .unwrap();
    wait_for(&mut rx, |e| {
        matches!(e, FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { .. }, .. }).then_some(())
    })
    .await;

    assert!(controller.go_to_page(2).await);
    wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { items }, .. } => {
            (items[0].comment.id == "p2-0").then_some(())
        }
        _ => None,
    })
    .await;

    // A newer comment upstream pushes the last item of page 1 onto page 2
    let mut shifted = page_of("p2", 49, 121);
    shifted.data.insert(
        0,
        serde_json::from_value::<Comment>(comment_json("p1-49", "An", "hi")).unwrap(),
    );
    backend.set_page(50, shifted);

    let mut prepended = Vec::new();
    let counts = wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::PrependNew { items }, .. } => {
            prepended.extend(items.iter().map(|d| d.comment.id.clone()));
            None
        }
        FeedEvent::CountsUpdated { counts, .. } if counts.total == 121 => Some(*counts),
        _ => None,
    })
    .await;

    assert!(prepended.is_empty());
    assert_eq!(counts.new_count, 0);
    let session = controller.session().await.unwrap();
    assert!(!session.comment_ids().await.contains(&"p1-49".to_string()));
}

#[tokio::test]
async fn test_stream_mode_has_no_pagination() {
    let backend = FakeBackend::new();
    let controller = controller(&backend, test_config());

    controller.start(target(), TransportMode::Stream).await.unwrap();
    assert!(!controller.go_to_page(2).await);
}

#[tokio::test]
async fn test_poll_failure_keeps_timer_running() {
    let backend = FakeBackend::new();
    backend.fail_polls.store(true, Ordering::SeqCst);
    backend.set_page(0, page_of("p1", 3, 3));
    let controller = controller(&backend, test_config());
    let mut rx = controller.subscribe();

    controller
        .start(target(), TransportMode::poll(Duration::from_secs(1)))
        .await
        .unwrap();

    let kind = wait_for(&mut rx, |e| match e {
        FeedEvent::ErrorRaised { kind, .. } => Some(*kind),
        _ => None,
    })
    .await;
    assert_eq!(kind, ErrorKind::Transport);
    assert_eq!(controller.state().await, ConnectionState::Polling);

    backend.fail_polls.store(false, Ordering::SeqCst);
    wait_for(&mut rx, |e| matches!(e, FeedEvent::ErrorCleared { .. }).then_some(())).await;
    let items = wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { items }, .. } => Some(items.len()),
        _ => None,
    })
    .await;
    assert_eq!(items, 3);
    assert!(backend.page_requests.lock().unwrap().len() >= 2);
}
