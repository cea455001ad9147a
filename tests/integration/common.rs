//! Shared fixtures for the integration tests

use async_trait::async_trait;
use chrono::Utc;
use cirrus::config::{parse_config, Config};
use cirrus::crawler::{Daemon, DaemonOptions, MatchRule, PageProcessor, RenderError, Renderer};
use cirrus::frontier::MemoryFrontier;
use cirrus::proxy::{Balance, Endpoint, ProxyPool, ProxyProvider, ProxyResult, QuotaSource, Scheme};
use cirrus::store::SqliteProductStore;
use cirrus::Classifier;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const SITE: &str = "https://site.example";

/// Builds a validated config for the given site root
pub fn config_for(root: &str) -> Config {
    parse_config(&format!(
        r#"
[site]
root = "{root}"

[client]
connections = 4
poll-interval-ms = 50
request-timeout-secs = 5

[frontier]
backend = "memory"

[store]
database-path = ":memory:"
"#
    ))
    .unwrap()
}

/// A listing page linking to `links`
pub fn category_page(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    format!("<html><body><div class=\"list\">{}</div></body></html>", anchors)
}

/// A product page laid out the way the match rule expects
pub fn product_page(comments: &str, second_shipping: &str, brand: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    format!(
        r#"<html><body>
        <div class="fpTMain"><div class="fpDesCol"><span class="fpCusto">{comments}</span></div></div>
        <div id="fpShipping"><ul class="fpShippingMessage">
            <li><span class="fpShippingText">Retrait en magasin</span></li>
            <li><span class="fpShippingText">{second_shipping}</span></li>
        </ul></div>
        <div id="fpContent"><div id="descContent"><table><tbody>
            <tr><td>Marque</td><td>{brand}</td></tr>
        </tbody></table></div></div>
        {anchors}
        </body></html>"#
    )
}

/// Scripted renderer serving pages from a map
///
/// Tracks call counts, peak concurrency and the proxies it was handed.
#[derive(Default)]
pub struct FakeRenderer {
    pages: HashMap<String, String>,
    /// Remaining forced failures per URL
    failures: Mutex<HashMap<String, usize>>,
    /// Remaining renders per URL that panic
    panics: Mutex<HashMap<String, usize>>,
    /// Remaining slow renders per URL
    stalls: Mutex<HashMap<String, usize>>,
    stall: Duration,
    delay: Duration,
    current: AtomicUsize,
    pub peak: AtomicUsize,
    calls: Mutex<HashMap<String, usize>>,
    pub proxies: Mutex<Vec<Option<String>>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: String) -> Self {
        self.pages.insert(url.to_string(), body);
        self
    }

    pub fn fail_times(self, url: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }

    pub fn panic_times(self, url: &str, times: usize) -> Self {
        self.panics.lock().unwrap().insert(url.to_string(), times);
        self
    }

    /// The first `times` renders of `url` take `stall` instead of `delay`
    pub fn stall_times(mut self, url: &str, times: usize, stall: Duration) -> Self {
        self.stalls.lock().unwrap().insert(url.to_string(), times);
        self.stall = stall;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn take(map: &Mutex<HashMap<String, usize>>, url: &str) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(url) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

struct Active<'a>(&'a AtomicUsize);

impl Drop for Active<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, url: &str, proxy: Option<&str>) -> Result<String, RenderError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = Active(&self.current);
        self.peak.fetch_max(now, Ordering::SeqCst);

        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        self.proxies.lock().unwrap().push(proxy.map(str::to_string));

        let wait = if Self::take(&self.stalls, url) {
            self.stall
        } else {
            self.delay
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        if Self::take(&self.panics, url) {
            panic!("scripted panic rendering {}", url);
        }
        if Self::take(&self.failures, url) {
            return Err(RenderError::Network("scripted failure".to_string()));
        }

        self.pages
            .get(url)
            .cloned()
            .ok_or(RenderError::Status(404))
    }
}

/// Provider handing out fresh, distinct endpoints
#[derive(Default)]
pub struct FakeProvider {
    issued: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeProvider {
    pub fn endpoint(n: usize) -> Endpoint {
        Endpoint::new(
            Scheme::Http,
            format!("10.0.0.{}", n),
            8000,
            Utc::now() + chrono::Duration::minutes(10),
        )
    }
}

#[async_trait]
impl ProxyProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn init(&self) -> ProxyResult<()> {
        Ok(())
    }

    async fn free_quota(&self) -> ProxyResult<usize> {
        Ok(0)
    }

    async fn fetch_endpoints(&self, count: usize, _source: QuotaSource) -> ProxyResult<Vec<Endpoint>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let first = self.issued.fetch_add(count, Ordering::SeqCst) + 100;
        Ok((first..first + count).map(Self::endpoint).collect())
    }

    async fn balance(&self) -> ProxyResult<Balance> {
        Ok(Balance::unlimited())
    }
}

/// Everything a test needs to drive and inspect a daemon
pub struct Harness {
    pub daemon: Daemon,
    pub frontier: Arc<MemoryFrontier>,
    pub store: Arc<SqliteProductStore>,
    pub shutdown: CancellationToken,
    pub run: tokio::task::JoinHandle<()>,
}

impl Harness {
    /// Stops the daemon and waits for it to drain
    pub async fn stop(self) -> Daemon {
        self.shutdown.cancel();
        self.run.await.unwrap();
        self.daemon
    }
}

pub fn fast_options(connections: usize) -> DaemonOptions {
    DaemonOptions {
        connections,
        poll_interval: Duration::from_millis(10),
        task_timeout: Duration::from_secs(5),
    }
}

/// Builds a daemon over in-memory backends and starts its loop
pub fn spawn_daemon(
    root: &str,
    options: DaemonOptions,
    renderer: Arc<dyn Renderer>,
    proxies: Option<Arc<ProxyPool>>,
) -> Harness {
    let config = config_for(root);
    let frontier = Arc::new(MemoryFrontier::new());
    let store = Arc::new(SqliteProductStore::open_in_memory().unwrap());
    let shutdown = CancellationToken::new();

    let classifier = Classifier::new(&config.site).unwrap();
    let processor = PageProcessor::new(
        classifier.clone(),
        MatchRule::compile(&config.rule).unwrap(),
        frontier.clone(),
        store.clone(),
    )
    .unwrap();

    let daemon = Daemon::with_options(
        options,
        classifier,
        processor,
        frontier.clone(),
        renderer,
        proxies,
        shutdown.clone(),
    );

    let run = tokio::spawn({
        let daemon = daemon.clone();
        async move { daemon.run().await }
    });

    Harness {
        daemon,
        frontier,
        store,
        shutdown,
        run,
    }
}

/// Polls `condition` until it holds, panicking after `limit`
pub async fn wait_until<F, Fut>(limit: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !condition().await {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within {:?}", limit);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Waits for a started crawl to run out of work
pub async fn wait_for_idle(daemon: &Daemon) {
    wait_until(Duration::from_secs(10), || async move {
        daemon.state() == cirrus::DaemonState::Idle
    })
    .await;
}
