//! Proxy pool behavior, alone and under the daemon

use crate::common::*;
use chrono::Utc;
use cirrus::proxy::{Endpoint, ProxyError, ProxyPool, Scheme};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn margin() -> chrono::Duration {
    chrono::Duration::seconds(30)
}

#[tokio::test]
async fn test_expired_endpoint_is_replaced() {
    let provider = Arc::new(FakeProvider::default());
    let aged = Endpoint::new(Scheme::Http, "10.0.0.3", 8000, Utc::now() - chrono::Duration::seconds(1));
    let pool = ProxyPool::from_endpoints(
        provider.clone(),
        vec![FakeProvider::endpoint(1), FakeProvider::endpoint(2), aged.clone()],
        margin(),
        CancellationToken::new(),
    );
    let cancel = CancellationToken::new();

    // Draws are random; keep drawing until the aged endpoint has been met
    let mut handed_out = HashSet::new();
    for _ in 0..500 {
        let endpoint = pool.get_endpoint(&cancel).await.unwrap();
        assert!(!endpoint.same_proxy(&aged));
        handed_out.insert(endpoint.ip.clone());
        if pool.endpoints().await.iter().all(|e| !e.same_proxy(&aged)) {
            break;
        }
    }
    assert!(handed_out.is_subset(&HashSet::from([
        "10.0.0.1".to_string(),
        "10.0.0.2".to_string(),
        "10.0.0.100".to_string(),
    ])));

    let watched = &pool;
    wait_until(Duration::from_secs(5), || async move {
        watched.endpoints().await.len() == 3 && watched.deficit() == 0
    })
    .await;

    let endpoints = pool.endpoints().await;
    assert!(endpoints.iter().all(|e| !e.same_proxy(&aged)));
    assert!(endpoints.iter().all(|e| e.is_fresh(Utc::now(), margin())));
    assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);

    pool.close();
}

#[tokio::test]
async fn test_init_fills_pool_from_provider() {
    let provider = Arc::new(FakeProvider::default());
    let config = cirrus::config::ProxyConfig {
        enable: true,
        size: 4,
        ..Default::default()
    };

    let pool = ProxyPool::init(provider, &config, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(pool.endpoints().await.len(), 4);
    assert_eq!(pool.deficit(), 0);
    assert_eq!(pool.provider_name(), "fake");
}

#[tokio::test]
async fn test_daemon_renders_through_pool_endpoints() {
    let root = format!("{}/cat/g-1.html", SITE);
    let renderer = Arc::new(
        FakeRenderer::new()
            .page(&root, category_page(&["/cat/f-1.html", "/cat/f-2.html"]))
            .page(
                &format!("{}/cat/f-1.html", SITE),
                product_page("7 avis", "Livraison Gratuite", "AUCUNE", &[]),
            )
            .page(
                &format!("{}/cat/f-2.html", SITE),
                product_page("7 avis", "Livraison Gratuite", "AUCUNE", &[]),
            ),
    );
    let pool = Arc::new(ProxyPool::from_endpoints(
        Arc::new(FakeProvider::default()),
        vec![FakeProvider::endpoint(1), FakeProvider::endpoint(2)],
        margin(),
        CancellationToken::new(),
    ));
    let harness = spawn_daemon(SITE, fast_options(2), renderer.clone(), Some(pool));

    harness.daemon.start(&root).await.unwrap();
    wait_for_idle(&harness.daemon).await;

    let proxies = renderer.proxies.lock().unwrap().clone();
    assert_eq!(proxies.len(), 3);
    for proxy in proxies {
        let proxy = proxy.expect("rendered without a proxy");
        assert!(proxy == "http://10.0.0.1:8000" || proxy == "http://10.0.0.2:8000");
    }
    assert_eq!(harness.daemon.view().await.matched, 2);

    harness.stop().await;
}

#[tokio::test]
async fn test_empty_pool_pushes_tasks_back() {
    let root = format!("{}/cat/g-1.html", SITE);
    let renderer = Arc::new(FakeRenderer::new().page(&root, category_page(&[])));
    let pool = Arc::new(ProxyPool::from_endpoints(
        Arc::new(FakeProvider::default()),
        Vec::new(),
        margin(),
        CancellationToken::new(),
    ));
    assert_eq!(
        pool.get_endpoint(&CancellationToken::new()).await,
        Err(ProxyError::NoEndpointAvailable)
    );

    let harness = spawn_daemon(SITE, fast_options(1), renderer.clone(), Some(pool));
    harness.daemon.start(&root).await.unwrap();

    let watched = &harness.daemon;
    wait_until(Duration::from_secs(5), || async move {
        watched.view().await.pushed_back >= 3
    })
    .await;

    assert_eq!(renderer.calls(&root), 0);
    assert!(!harness.frontier.is_visited(&root).await);

    let daemon = harness.stop().await;
    assert_eq!(daemon.state(), cirrus::DaemonState::Stopped);
}
