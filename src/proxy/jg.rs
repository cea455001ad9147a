//! JG proxy provider client
//!
//! The provider exposes a JSON API wrapped in a `{code, msg, data}`
//! envelope. Response codes:
//!
//! | Code | Meaning | Handling |
//! |------|---------|----------|
//! | 0 | Success | decode `data` |
//! | 111 | Rate limited (one call per 2s) | wait, retry once |
//! | 114 | Insufficient balance | [`ProxyError::InsufficientBalance`] |
//! | 121 | Package expired | [`ProxyError::PackageExpired`] |
//! | other | Result exception | [`ProxyError::Provider`] |

use crate::config::JgConfig;
use crate::proxy::traits::{ProxyError, ProxyProvider, ProxyResult, QuotaSource};
use crate::proxy::{Balance, Coin, Endpoint, Scheme};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

const CODE_OK: &str = "0";
const CODE_RATE_LIMITED: &str = "111";
const CODE_INSUFFICIENT_BALANCE: &str = "114";
const CODE_PACKAGE_EXPIRED: &str = "121";

const EXPIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    /// The provider sends the code as either a number or a string
    fn code(&self) -> String {
        match &self.code {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WhiteList {
    #[serde(default)]
    lists: Vec<WhiteEntry>,
}

#[derive(Debug, Deserialize)]
struct WhiteEntry {
    #[serde(default)]
    mark_ip: String,
}

#[derive(Debug, Deserialize)]
struct PackInfo {
    #[serde(default, deserialize_with = "number_or_string")]
    package_balance: u64,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    #[serde(default)]
    balance: Value,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    ip: String,
    #[serde(deserialize_with = "number_or_string")]
    port: u64,
    expire_time: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    isp: String,
    #[serde(default, deserialize_with = "number_or_string")]
    num: u64,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number {}", n))),
        Value::String(s) if s.is_empty() => Ok(0),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected number, got {}",
            other
        ))),
    }
}

/// Client for the JG proxy provider
pub struct JgProvider {
    client: Client,
    config: JgConfig,
    offset: FixedOffset,
}

impl JgProvider {
    /// Creates a provider client
    ///
    /// # Arguments
    ///
    /// * `config` - Provider credentials and endpoints
    /// * `timeout` - Per-request timeout for provider API calls
    pub fn new(config: JgConfig, timeout: Duration) -> ProxyResult<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            ProxyError::Provider(format!(
                "invalid utc offset {} hours",
                config.utc_offset_hours
            ))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProxyError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            offset,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn ip_url(&self, path: &str) -> String {
        format!("{}{}", self.config.ip_base.trim_end_matches('/'), path)
    }

    fn credentials(&self, appkey: &str) -> Vec<(&'static str, String)> {
        vec![
            ("neek", self.config.neek.clone()),
            ("appkey", appkey.to_string()),
        ]
    }

    async fn get_envelope(&self, url: &str, params: &[(&str, String)]) -> ProxyResult<Envelope> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| ProxyError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Unreachable(format!("{} returned {}", url, status)));
        }

        response
            .json::<Envelope>()
            .await
            .map_err(|e| ProxyError::Provider(format!("malformed response from {}: {}", url, e)))
    }

    /// Calls a provider API and decodes its `data` field
    ///
    /// A rate-limited call is retried exactly once after the configured
    /// backoff; a second rate limit is surfaced.
    async fn call<T: DeserializeOwned>(&self, url: &str, params: &[(&str, String)]) -> ProxyResult<T> {
        let mut envelope = self.get_envelope(url, params).await?;

        if envelope.code() == CODE_RATE_LIMITED {
            tracing::debug!("Rate limited by JG provider on {}, retrying once", url);
            tokio::time::sleep(Duration::from_millis(self.config.rate_limit_backoff_ms)).await;
            envelope = self.get_envelope(url, params).await?;
        }

        let code = envelope.code();
        match code.as_str() {
            CODE_OK => serde_json::from_value(envelope.data).map_err(|e| {
                ProxyError::Provider(format!("unexpected data from {}: {}", url, e))
            }),
            CODE_RATE_LIMITED => Err(ProxyError::RateLimited(envelope.msg)),
            CODE_INSUFFICIENT_BALANCE => Err(ProxyError::InsufficientBalance(envelope.msg)),
            CODE_PACKAGE_EXPIRED => Err(ProxyError::PackageExpired(envelope.msg)),
            _ => Err(ProxyError::Provider(format!(
                "code {}: {}",
                code, envelope.msg
            ))),
        }
    }

    async fn ensure_whitelisted(&self) -> ProxyResult<()> {
        let whitelist: WhiteList = self
            .call(
                &self.api_url("/index/index/white_list"),
                &self.credentials(&self.config.api_appkey),
            )
            .await?;

        let ip = match self.config.whitelist_ip.as_deref() {
            Some(ip) if !ip.is_empty() => ip,
            _ => {
                tracing::debug!(
                    "No whitelist-ip configured, {} whitelisted addresses left as is",
                    whitelist.lists.len()
                );
                return Ok(());
            }
        };

        if whitelist.lists.iter().any(|entry| entry.mark_ip == ip) {
            tracing::debug!("{} already on the JG whitelist", ip);
            return Ok(());
        }

        let mut params = self.credentials(&self.config.api_appkey);
        params.push(("white", ip.to_string()));
        let _: IgnoredAny = self
            .call(&self.api_url("/index/index/save_white"), &params)
            .await?;

        tracing::info!("Added {} to the JG whitelist", ip);
        Ok(())
    }

    /// Claims today's free package; best effort
    async fn claim_free_pack(&self) {
        let result = self
            .client
            .post(self.api_url("/index/users/get_day_free_pack"))
            .form(&[("mid", self.config.neek.as_str())])
            .send()
            .await;

        match result {
            Ok(response) => tracing::debug!("Free package claim returned {}", response.status()),
            Err(e) => tracing::warn!("Failed to claim JG free package: {}", e),
        }
    }

    fn convert(&self, raw: RawEndpoint) -> ProxyResult<Endpoint> {
        let naive = NaiveDateTime::parse_from_str(raw.expire_time.trim(), EXPIRE_TIME_FORMAT)
            .map_err(|e| {
                ProxyError::Provider(format!("bad expire_time '{}': {}", raw.expire_time, e))
            })?;
        let expire_time = self
            .offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| ProxyError::Provider(format!("ambiguous expire_time '{}'", raw.expire_time)))?
            .with_timezone(&Utc);

        let port = u16::try_from(raw.port)
            .map_err(|_| ProxyError::Provider(format!("bad port {}", raw.port)))?;

        Ok(Endpoint {
            scheme: Scheme::Http,
            ip: raw.ip,
            port,
            expire_time,
            country: "China".to_string(),
            city: raw.city,
            isp: raw.isp,
            usage_count: raw.num,
        })
    }
}

#[async_trait]
impl ProxyProvider for JgProvider {
    fn name(&self) -> &str {
        "jiguang"
    }

    async fn init(&self) -> ProxyResult<()> {
        let config = &self.config;
        if config.neek.is_empty() || config.api_appkey.is_empty() || config.balance_appkey.is_empty()
        {
            return Err(ProxyError::Provider(
                "JG credentials are empty".to_string(),
            ));
        }

        self.ensure_whitelisted().await?;
        self.claim_free_pack().await;

        tracing::info!("Initialized JG proxy provider");
        Ok(())
    }

    async fn free_quota(&self) -> ProxyResult<usize> {
        let info: PackInfo = self
            .call(
                &self.api_url("/index/index/get_my_pack_info"),
                &self.credentials(&self.config.balance_appkey),
            )
            .await?;
        Ok(usize::try_from(info.package_balance).unwrap_or(usize::MAX))
    }

    async fn fetch_endpoints(&self, count: usize, source: QuotaSource) -> ProxyResult<Vec<Endpoint>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut params: Vec<(&str, String)> = vec![
            ("num", count.to_string()),
            ("type", "2".to_string()),
            ("pro", "0".to_string()),
            ("city", "0".to_string()),
            ("yys", "0".to_string()),
            ("port", "11".to_string()),
            ("ts", "1".to_string()),
            ("ys", "1".to_string()),
            ("cs", "1".to_string()),
            ("lb", "1".to_string()),
            ("sb", "0".to_string()),
            ("pb", "45".to_string()),
            ("mr", "1".to_string()),
            ("regions", String::new()),
        ];
        if source == QuotaSource::Free {
            params.push(("pack", self.config.free_pack.clone()));
        }

        let raw: Vec<RawEndpoint> = self.call(&self.ip_url("/getip"), &params).await?;
        raw.into_iter().map(|r| self.convert(r)).collect()
    }

    async fn balance(&self) -> ProxyResult<Balance> {
        let data: AccountBalance = self
            .call(
                &self.api_url("/index/index/get_my_balance"),
                &self.credentials(&self.config.api_appkey),
            )
            .await?;

        let amount = match &data.balance {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };

        Ok(Balance {
            amount,
            coin: Coin::Rmb,
        })
    }
}
