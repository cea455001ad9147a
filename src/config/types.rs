use serde::Deserialize;

/// Main configuration structure for Cirrus
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub rule: RuleConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
}

/// Target catalog site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Scheme and host every crawled URL must share (e.g. "https://www.example.com")
    pub root: String,

    /// Slug prefix marking a product detail page
    #[serde(rename = "detail-prefix", default = "default_detail_prefix")]
    pub detail_prefix: String,
}

/// Fetch client and concurrency configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Maximum number of tasks in flight at once
    #[serde(default = "default_connections")]
    pub connections: u32,

    /// Daemon polling interval (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single task, win or lose (seconds)
    #[serde(rename = "task-timeout-secs", default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Per-request timeout for the page renderer (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User agent sent with every page request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Frontier backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontierBackend {
    Redis,
    Memory,
}

/// URL frontier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierConfig {
    #[serde(default = "default_frontier_backend")]
    pub backend: FrontierBackend,

    /// Redis connection URL, required for the redis backend
    #[serde(rename = "redis-url", default)]
    pub redis_url: Option<String>,

    /// Namespace for the pending and visited sets
    #[serde(rename = "key-prefix", default = "default_key_prefix")]
    pub key_prefix: String,

    /// Interval between health checks (seconds)
    #[serde(rename = "ping-interval-secs", default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// When false, pages are fetched directly
    #[serde(default)]
    pub enable: bool,

    /// Number of endpoints kept in the working set
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// Endpoints with less remaining lifetime than this are discarded (seconds)
    #[serde(rename = "expiry-margin-secs", default = "default_expiry_margin_secs")]
    pub expiry_margin_secs: u64,

    #[serde(default)]
    pub jg: Option<JgConfig>,
}

/// Credentials and endpoints for the JG proxy provider
#[derive(Debug, Clone, Deserialize)]
pub struct JgConfig {
    pub neek: String,

    #[serde(rename = "api-appkey")]
    pub api_appkey: String,

    #[serde(rename = "balance-appkey")]
    pub balance_appkey: String,

    /// Base URL of the account API
    #[serde(rename = "api-base", default = "default_jg_api_base")]
    pub api_base: String,

    /// Base URL of the IP extraction API
    #[serde(rename = "ip-base", default = "default_jg_ip_base")]
    pub ip_base: String,

    /// Package identifier of the free daily quota
    #[serde(rename = "free-pack", default = "default_jg_free_pack")]
    pub free_pack: String,

    /// Offset of the provider's expiry timestamps from UTC (hours)
    #[serde(rename = "utc-offset-hours", default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Delay before the single retry after a rate-limit response (milliseconds)
    #[serde(rename = "rate-limit-backoff-ms", default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,

    /// Public IP to keep registered on the provider's whitelist
    #[serde(rename = "whitelist-ip", default)]
    pub whitelist_ip: Option<String>,
}

/// Matched-product store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Selectors and markers of the product match rule
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    #[serde(rename = "comment-selector", default = "default_comment_selector")]
    pub comment_selector: String,

    #[serde(rename = "shipping-parent", default = "default_shipping_parent")]
    pub shipping_parent: String,

    #[serde(rename = "shipping-item", default = "default_shipping_item")]
    pub shipping_item: String,

    #[serde(rename = "free-shipping-marker", default = "default_free_shipping_marker")]
    pub free_shipping_marker: String,

    #[serde(rename = "info-table", default = "default_info_table")]
    pub info_table: String,

    #[serde(rename = "info-cell", default = "default_info_cell")]
    pub info_cell: String,

    #[serde(rename = "brand-label", default = "default_brand_label")]
    pub brand_label: String,

    #[serde(rename = "no-brand-marker", default = "default_no_brand_marker")]
    pub no_brand_marker: String,
}

/// Control API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_binding")]
    pub binding: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    /// Default filter directive when no verbosity flag is given
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            poll_interval_ms: default_poll_interval_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            backend: default_frontier_backend(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enable: false,
            size: default_pool_size(),
            expiry_margin_secs: default_expiry_margin_secs(),
            jg: None,
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            comment_selector: default_comment_selector(),
            shipping_parent: default_shipping_parent(),
            shipping_item: default_shipping_item(),
            free_shipping_marker: default_free_shipping_marker(),
            info_table: default_info_table(),
            info_cell: default_info_cell(),
            brand_label: default_brand_label(),
            no_brand_marker: default_no_brand_marker(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            binding: default_binding(),
            port: default_port(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_detail_prefix() -> String {
    "f-".to_string()
}

fn default_connections() -> u32 {
    8
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_task_timeout_secs() -> u64 {
    120
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

fn default_frontier_backend() -> FrontierBackend {
    FrontierBackend::Redis
}

fn default_key_prefix() -> String {
    "/cirrus".to_string()
}

fn default_ping_interval_secs() -> u64 {
    5
}

fn default_pool_size() -> usize {
    5
}

fn default_expiry_margin_secs() -> u64 {
    30
}

fn default_jg_api_base() -> String {
    "http://webapi.jghttp.golangapi.com".to_string()
}

fn default_jg_ip_base() -> String {
    "http://d.jghttp.golangapi.com".to_string()
}

fn default_jg_free_pack() -> String {
    "31731".to_string()
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_rate_limit_backoff_ms() -> u64 {
    2000
}

fn default_comment_selector() -> String {
    ".fpTMain .fpDesCol .fpCusto".to_string()
}

fn default_shipping_parent() -> String {
    "#fpShipping .fpShippingMessage".to_string()
}

fn default_shipping_item() -> String {
    "li .fpShippingText".to_string()
}

fn default_free_shipping_marker() -> String {
    "Livraison Gratuite".to_string()
}

fn default_info_table() -> String {
    "#fpContent #descContent table".to_string()
}

fn default_info_cell() -> String {
    "tbody tr td".to_string()
}

fn default_brand_label() -> String {
    "Marque".to_string()
}

fn default_no_brand_marker() -> String {
    "AUCUNE".to_string()
}

fn default_binding() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "cirrus=info,warn".to_string()
}
