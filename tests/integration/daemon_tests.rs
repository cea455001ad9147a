//! Daemon scheduling, retry and lifecycle behavior

use crate::common::*;
use cirrus::crawler::DaemonOptions;
use cirrus::frontier::{Frontier, FrontierError, MemoryFrontier};
use cirrus::DaemonState;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn root() -> String {
    format!("{}/cat/g-1.html", SITE)
}

/// A root category linking to `count` product pages, all rejected by the rule
fn wide_site(count: usize) -> (FakeRenderer, Vec<String>) {
    let hrefs: Vec<String> = (0..count).map(|i| format!("/cat/f-{}.html", i)).collect();
    let links: Vec<&str> = hrefs.iter().map(String::as_str).collect();

    let mut renderer = FakeRenderer::new().page(&root(), category_page(&links));
    let mut urls = vec![root()];
    for href in &hrefs {
        let url = format!("{}{}", SITE, href);
        renderer = renderer.page(&url, product_page("1 avis", "Payante", "Acme", &[]));
        urls.push(url);
    }
    (renderer, urls)
}

#[tokio::test]
async fn test_failed_path_is_popped_again() {
    let frontier = MemoryFrontier::new();
    let r = root();
    frontier.push(&r).await.unwrap();

    let claimed = frontier.pop().await.unwrap();
    assert_eq!(claimed, r);

    // Processing failed
    frontier.push(&claimed).await.unwrap();
    assert_eq!(frontier.pop().await.unwrap(), r);
}

#[tokio::test]
async fn test_persisted_path_is_never_popped() {
    let frontier = MemoryFrontier::new();
    let r = root();
    frontier.persist(&r).await.unwrap();

    assert_eq!(
        frontier.push(&r).await,
        Err(FrontierError::AlreadyVisited(r.clone()))
    );
    assert_eq!(frontier.pop().await, Err(FrontierError::Empty));
}

#[tokio::test]
async fn test_failing_page_is_retried_until_it_succeeds() {
    let renderer = Arc::new(
        FakeRenderer::new()
            .page(&root(), category_page(&[]))
            .fail_times(&root(), 2),
    );
    let harness = spawn_daemon(SITE, fast_options(2), renderer.clone(), None);

    harness.daemon.start(&root()).await.unwrap();
    wait_for_idle(&harness.daemon).await;

    assert_eq!(renderer.calls(&root()), 3);
    assert!(harness.frontier.is_visited(&root()).await);

    let view = harness.daemon.view().await;
    assert_eq!(view.pushed_back, 2);
    assert_eq!(view.succeeded, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_in_flight_never_exceeds_connections() {
    let (renderer, urls) = wide_site(24);
    let renderer = Arc::new(renderer.delay(Duration::from_millis(30)));
    let harness = spawn_daemon(SITE, fast_options(3), renderer.clone(), None);

    harness.daemon.start(&root()).await.unwrap();

    let daemon = harness.daemon.clone();
    let sampler = tokio::spawn(async move {
        let mut peak = 0;
        while daemon.state() == DaemonState::Running {
            peak = peak.max(daemon.in_flight());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        peak
    });

    wait_for_idle(&harness.daemon).await;
    let sampled_peak = sampler.await.unwrap();

    assert!(renderer.peak.load(Ordering::SeqCst) <= 3);
    assert!(sampled_peak <= 3);
    // The budget is actually used
    assert!(renderer.peak.load(Ordering::SeqCst) >= 2);
    for url in &urls {
        assert!(harness.frontier.is_visited(url).await, "{} not visited", url);
    }

    harness.stop().await;
}

#[tokio::test]
async fn test_slow_task_is_timed_out_and_pushed_back() {
    let renderer = Arc::new(
        FakeRenderer::new()
            .page(&root(), category_page(&[]))
            .stall_times(&root(), 1, Duration::from_secs(2)),
    );
    let options = DaemonOptions {
        task_timeout: Duration::from_millis(100),
        ..fast_options(1)
    };
    let harness = spawn_daemon(SITE, options, renderer.clone(), None);

    harness.daemon.start(&root()).await.unwrap();
    wait_for_idle(&harness.daemon).await;

    assert_eq!(renderer.calls(&root()), 2);
    assert!(harness.frontier.is_visited(&root()).await);
    assert_eq!(harness.daemon.view().await.pushed_back, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_pause_keeps_pending_and_resume_finishes() {
    let (renderer, urls) = wide_site(30);
    let renderer = Arc::new(renderer.delay(Duration::from_millis(20)));
    let harness = spawn_daemon(SITE, fast_options(2), renderer.clone(), None);
    let daemon = harness.daemon.clone();
    let watched = &daemon;

    daemon.start(&root()).await.unwrap();
    wait_until(Duration::from_secs(5), || async move {
        watched.view().await.succeeded >= 3
    })
    .await;

    daemon.pause().unwrap();
    wait_for_idle(&daemon).await;
    assert_eq!(daemon.in_flight(), 0);

    let paused = daemon.view().await;
    assert!(paused.pending.unwrap_or(0) > 0);

    // Nothing is dispatched while paused
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(daemon.view().await.succeeded, paused.succeeded);

    daemon.resume().unwrap();
    assert_eq!(daemon.state(), DaemonState::Running);
    wait_for_idle(&daemon).await;

    for url in &urls {
        assert!(harness.frontier.is_visited(url).await);
    }
    assert_eq!(daemon.view().await.pending, Some(0));

    harness.stop().await;
}

#[tokio::test]
async fn test_shutdown_drains_and_conserves_paths() {
    let (renderer, urls) = wide_site(40);
    let renderer = Arc::new(renderer.delay(Duration::from_millis(50)));
    let harness = spawn_daemon(SITE, fast_options(4), renderer, None);
    let frontier = harness.frontier.clone();
    let watched = &harness.daemon;

    watched.start(&root()).await.unwrap();
    // The first success can only be the root, which has pushed every link
    wait_until(Duration::from_secs(5), || async move {
        watched.view().await.succeeded >= 1
    })
    .await;

    let daemon = harness.stop().await;
    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert_eq!(daemon.in_flight(), 0);

    let pending = frontier.pending_len().await.unwrap();
    let visited = frontier.visited_len().await.unwrap();
    assert_eq!(pending + visited, urls.len() as u64);
    assert!(pending > 0);
}

#[tokio::test]
async fn test_unavailable_frontier_rejects_start() {
    let renderer = Arc::new(FakeRenderer::new().page(&root(), category_page(&[])));
    let harness = spawn_daemon(SITE, fast_options(2), renderer.clone(), None);

    harness.frontier.set_available(false);
    assert!(harness.daemon.start(&root()).await.is_err());
    assert_eq!(harness.daemon.state(), DaemonState::Idle);
    assert_eq!(harness.daemon.view().await.pending, None);

    harness.frontier.set_available(true);
    harness.daemon.start(&root()).await.unwrap();
    wait_for_idle(&harness.daemon).await;
    assert_eq!(renderer.calls(&root()), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_push_back_during_outage_is_held_until_recovery() {
    let url = root();
    let renderer = Arc::new(
        FakeRenderer::new()
            .page(&url, category_page(&[]))
            .fail_times(&url, 1)
            .delay(Duration::from_millis(200)),
    );
    let harness = spawn_daemon(SITE, fast_options(1), renderer.clone(), None);
    let watched = &harness.daemon;
    let counted = &renderer;
    let target = &url;

    watched.start(&url).await.unwrap();
    wait_until(Duration::from_secs(5), || async move {
        counted.calls(target) == 1
    })
    .await;

    // The failed render's push-back lands while the frontier is down
    harness.frontier.set_available(false);
    wait_until(Duration::from_secs(5), || async move {
        watched.view().await.stranded == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(watched.state(), DaemonState::Running);
    assert_eq!(renderer.calls(&url), 1);

    harness.frontier.set_available(true);
    wait_for_idle(watched).await;

    assert_eq!(renderer.calls(&url), 2);
    assert!(harness.frontier.is_visited(&url).await);
    let view = watched.view().await;
    assert_eq!(view.stranded, 0);
    assert_eq!(view.succeeded, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_panicking_task_path_is_pushed_back() {
    let url = root();
    let renderer = Arc::new(
        FakeRenderer::new()
            .page(&url, category_page(&[]))
            .panic_times(&url, 1),
    );
    let harness = spawn_daemon(SITE, fast_options(2), renderer.clone(), None);

    harness.daemon.start(&url).await.unwrap();
    wait_for_idle(&harness.daemon).await;

    assert_eq!(renderer.calls(&url), 2);
    assert!(harness.frontier.is_visited(&url).await);

    let view = harness.daemon.view().await;
    assert_eq!(view.pushed_back, 1);
    assert_eq!(view.succeeded, 1);
    assert_eq!(view.in_flight, 0);

    harness.stop().await;
}
