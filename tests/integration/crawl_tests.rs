//! End-to-end crawls

use crate::common::*;
use cirrus::crawler::HttpRenderer;
use cirrus::frontier::Frontier;
use cirrus::store::{ProductQuery, ProductStore};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let server = MockServer::start().await;
    let root = server.uri();

    mount(
        &server,
        "/cat/g-1.html",
        category_page(&[
            "/cat/f-1-aaa.html?ref=list",
            "/cat/f-2-bbb.html",
            "/cat/g-2.html#top",
            "https://other.example/cat/f-9.html",
            "mailto:shop@example.com",
        ]),
    )
    .await;
    mount(
        &server,
        "/cat/g-2.html",
        category_page(&["/cat/g-1.html", "/cat/f-1-aaa.html", "/cat/f-3-ccc.html"]),
    )
    .await;
    mount(
        &server,
        "/cat/f-1-aaa.html",
        product_page("12 avis", "Livraison Gratuite dès 25€", "AUCUNE", &["/cat/g-2.html"]),
    )
    .await;
    mount(
        &server,
        "/cat/f-2-bbb.html",
        product_page("3 avis", "Livraison Gratuite", "Acme", &[]),
    )
    .await;
    mount(
        &server,
        "/cat/f-3-ccc.html",
        product_page("0 avis", "Livraison Gratuite", "AUCUNE", &[]),
    )
    .await;

    let config = config_for(&root);
    let renderer = Arc::new(HttpRenderer::new(&config.client).unwrap());
    let harness = spawn_daemon(&root, fast_options(4), renderer, None);

    harness
        .daemon
        .start(&format!("{}/cat/g-1.html", root))
        .await
        .unwrap();
    wait_for_idle(&harness.daemon).await;

    let frontier = harness.frontier.clone();
    assert_eq!(frontier.pending_len().await.unwrap(), 0);
    assert_eq!(frontier.visited_len().await.unwrap(), 5);
    for page in ["g-1", "g-2", "f-1-aaa", "f-2-bbb", "f-3-ccc"] {
        assert!(frontier.is_visited(&format!("{}/cat/{}.html", root, page)).await);
    }

    let page = harness.store.query(&ProductQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    let product = &page.items[0].product;
    assert_eq!(product.uid, "f-1-aaa");
    assert_eq!(product.url, format!("{}/cat/f-1-aaa.html", root));
    assert_eq!(product.comment_count, 12);
    assert_eq!(product.express_tag, "Livraison Gratuite dès 25€");

    let view = harness.daemon.view().await;
    assert_eq!(view.succeeded, 5);
    assert_eq!(view.matched, 1);
    assert_eq!(view.pushed_back, 0);
    assert!(view.end_time.is_some());

    harness.stop().await;
}

#[tokio::test]
async fn test_sequential_crawl_renders_each_page_once() {
    let root = format!("{}/cat/g-1.html", SITE);
    let renderer = Arc::new(
        FakeRenderer::new()
            .page(
                &root,
                category_page(&["/cat/g-2.html", "/cat/f-1.html", "/cat/f-1.html?dup=1"]),
            )
            .page(
                &format!("{}/cat/g-2.html", SITE),
                category_page(&["/cat/g-1.html", "/cat/f-1.html"]),
            )
            .page(
                &format!("{}/cat/f-1.html", SITE),
                product_page("5 avis", "Livraison Gratuite", "AUCUNE", &["/cat/g-1.html"]),
            ),
    );
    let harness = spawn_daemon(SITE, fast_options(1), renderer.clone(), None);

    harness.daemon.start(&root).await.unwrap();
    wait_for_idle(&harness.daemon).await;

    assert_eq!(renderer.calls(&root), 1);
    assert_eq!(renderer.calls(&format!("{}/cat/g-2.html", SITE)), 1);
    assert_eq!(renderer.calls(&format!("{}/cat/f-1.html", SITE)), 1);
    assert_eq!(harness.store.count().unwrap(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_retired_without_rendering() {
    let root = format!("{}/cat/g-1.html", SITE);
    let renderer = Arc::new(
        FakeRenderer::new()
            .page(&root, category_page(&[]))
            .delay(Duration::from_millis(100)),
    );
    let harness = spawn_daemon(SITE, fast_options(2), renderer.clone(), None);

    harness.daemon.start(&root).await.unwrap();
    // Slipped in by another writer sharing the frontier
    harness
        .frontier
        .push("https://other.example/cat/f-1.html")
        .await
        .unwrap();
    wait_for_idle(&harness.daemon).await;

    assert!(
        harness
            .frontier
            .is_visited("https://other.example/cat/f-1.html")
            .await
    );
    assert_eq!(renderer.calls("https://other.example/cat/f-1.html"), 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_restart_clears_previous_crawl() {
    let root = format!("{}/cat/g-1.html", SITE);
    let renderer = Arc::new(FakeRenderer::new().page(&root, category_page(&[])));
    let harness = spawn_daemon(SITE, fast_options(2), renderer.clone(), None);

    harness.daemon.start(&root).await.unwrap();
    wait_for_idle(&harness.daemon).await;
    harness.daemon.start(&root).await.unwrap();
    wait_for_idle(&harness.daemon).await;

    assert_eq!(renderer.calls(&root), 2);
    harness.stop().await;
}
