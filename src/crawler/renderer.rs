//! Page renderer
//!
//! The crawler only needs the final HTML of a page fetched through a given
//! proxy. [`Renderer`] is that seam; [`HttpRenderer`] fulfils it with a plain
//! HTTP GET and does not execute scripts.

use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while rendering a page
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Invalid proxy address '{0}'")]
    InvalidProxy(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Empty response body")]
    EmptyBody,
}

/// Fetches the HTML body of a page
///
/// Implementations must give up promptly when the returned future is
/// dropped; the daemon enforces task timeouts and cancellation that way.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Renders `url`, routed through `proxy` (e.g. `http://1.2.3.4:8080`)
    /// when given
    async fn render(&self, url: &str, proxy: Option<&str>) -> Result<String, RenderError>;
}

/// Renderer backed by `reqwest`
///
/// Requests without a proxy share one client. Proxied requests get a client
/// of their own, since endpoints rotate every few minutes.
pub struct HttpRenderer {
    direct: Client,
    user_agent: String,
    timeout: Duration,
}

impl HttpRenderer {
    /// Creates a renderer from the client configuration
    ///
    /// # Arguments
    ///
    /// * `config` - User agent and request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(HttpRenderer)` - Ready to render
    /// * `Err(RenderError)` - The HTTP client could not be built
    pub fn new(config: &ClientConfig) -> Result<Self, RenderError> {
        let user_agent = config.user_agent.clone();
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let direct = build_http_client(&user_agent, timeout, None)?;

        Ok(Self {
            direct,
            user_agent,
            timeout,
        })
    }
}

/// Builds an HTTP client, optionally routed through a proxy
fn build_http_client(
    user_agent: &str,
    timeout: Duration,
    proxy: Option<&str>,
) -> Result<Client, RenderError> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(addr) = proxy {
        let proxy = Proxy::all(addr).map_err(|_| RenderError::InvalidProxy(addr.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| RenderError::Client(e.to_string()))
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str, proxy: Option<&str>) -> Result<String, RenderError> {
        let proxied;
        let client = match proxy {
            Some(addr) => {
                proxied = build_http_client(&self.user_agent, self.timeout, Some(addr))?;
                &proxied
            }
            None => &self.direct,
        };

        let response = client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify)?;
        if body.trim().is_empty() {
            return Err(RenderError::EmptyBody);
        }

        Ok(body)
    }
}

fn classify(e: reqwest::Error) -> RenderError {
    if e.is_timeout() {
        RenderError::Timeout
    } else {
        RenderError::Network(e.to_string())
    }
}
