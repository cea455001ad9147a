use crate::proxy::traits::{ProxyProvider, ProxyResult, QuotaSource};
use crate::proxy::Endpoint;

/// Acquires a batch of endpoints, spending the free quota first
///
/// # Arguments
///
/// * `provider` - Provider to buy endpoints from
/// * `count` - Number of endpoints wanted
///
/// # Returns
///
/// The concatenated free and paid endpoints. The provider may return fewer
/// than requested.
///
/// An exhausted or expired free package counts as zero free quota. If the
/// free fetch fails, the endpoints it should have covered are bought from
/// the paid quota instead. Paid-quota errors are returned as is.
pub async fn acquire_endpoints(
    provider: &dyn ProxyProvider,
    count: usize,
) -> ProxyResult<Vec<Endpoint>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let free = match provider.free_quota().await {
        Ok(free) => free,
        Err(e) if e.is_account_exhausted() => {
            tracing::debug!("Free package unusable on {}: {}", provider.name(), e);
            0
        }
        Err(e) => return Err(e),
    };

    let from_free = free.min(count);
    let mut endpoints = Vec::with_capacity(count);

    if from_free > 0 {
        match provider.fetch_endpoints(from_free, QuotaSource::Free).await {
            Ok(batch) => endpoints.extend(batch),
            Err(e) => {
                tracing::warn!(
                    "Free quota fetch of {} endpoints failed on {}, using paid quota: {}",
                    from_free,
                    provider.name(),
                    e
                );
            }
        }
    }

    let paid = count.saturating_sub(endpoints.len().min(from_free));
    if paid > 0 {
        let batch = provider.fetch_endpoints(paid, QuotaSource::Paid).await?;
        endpoints.extend(batch);
    }

    tracing::debug!(
        "Acquired {} endpoints from {} ({} requested, {} free quota)",
        endpoints.len(),
        provider.name(),
        count,
        free
    );

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{Balance, ProxyError, Scheme};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    /// Records every fetch and answers from fixed settings
    struct Scripted {
        free: ProxyResult<usize>,
        free_fails: bool,
        calls: Mutex<Vec<(usize, QuotaSource)>>,
    }

    impl Scripted {
        fn new(free: ProxyResult<usize>) -> Self {
            Self {
                free,
                free_fails: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(usize, QuotaSource)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProxyProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn init(&self) -> ProxyResult<()> {
            Ok(())
        }

        async fn free_quota(&self) -> ProxyResult<usize> {
            self.free.clone()
        }

        async fn fetch_endpoints(
            &self,
            count: usize,
            source: QuotaSource,
        ) -> ProxyResult<Vec<Endpoint>> {
            self.calls.lock().unwrap().push((count, source));
            if source == QuotaSource::Free && self.free_fails {
                return Err(ProxyError::Provider("free pack rejected".to_string()));
            }
            let expires = Utc::now() + Duration::minutes(5);
            Ok((0..count)
                .map(|i| Endpoint::new(Scheme::Http, format!("10.0.0.{}", i), 8000, expires))
                .collect())
        }

        async fn balance(&self) -> ProxyResult<Balance> {
            Ok(Balance::unlimited())
        }
    }

    #[tokio::test]
    async fn test_free_quota_covers_batch() {
        let provider = Scripted::new(Ok(10));
        let endpoints = acquire_endpoints(&provider, 4).await.unwrap();
        assert_eq!(endpoints.len(), 4);
        assert_eq!(provider.calls(), vec![(4, QuotaSource::Free)]);
    }

    #[tokio::test]
    async fn test_free_remainder_then_paid() {
        let provider = Scripted::new(Ok(2));
        let endpoints = acquire_endpoints(&provider, 5).await.unwrap();
        assert_eq!(endpoints.len(), 5);
        assert_eq!(
            provider.calls(),
            vec![(2, QuotaSource::Free), (3, QuotaSource::Paid)]
        );
    }

    #[tokio::test]
    async fn test_no_free_quota_goes_paid() {
        let provider = Scripted::new(Ok(0));
        acquire_endpoints(&provider, 3).await.unwrap();
        assert_eq!(provider.calls(), vec![(3, QuotaSource::Paid)]);
    }

    #[tokio::test]
    async fn test_expired_package_counts_as_zero() {
        let provider = Scripted::new(Err(ProxyError::PackageExpired("121".to_string())));
        acquire_endpoints(&provider, 2).await.unwrap();
        assert_eq!(provider.calls(), vec![(2, QuotaSource::Paid)]);
    }

    #[tokio::test]
    async fn test_free_fetch_failure_falls_back_to_paid() {
        let mut provider = Scripted::new(Ok(10));
        provider.free_fails = true;
        let endpoints = acquire_endpoints(&provider, 3).await.unwrap();
        assert_eq!(endpoints.len(), 3);
        assert_eq!(
            provider.calls(),
            vec![(3, QuotaSource::Free), (3, QuotaSource::Paid)]
        );
    }

    #[tokio::test]
    async fn test_quota_query_failure_propagates() {
        let provider = Scripted::new(Err(ProxyError::Unreachable("down".to_string())));
        let err = acquire_endpoints(&provider, 3).await.unwrap_err();
        assert_eq!(err, ProxyError::Unreachable("down".to_string()));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_count_is_noop() {
        let provider = Scripted::new(Ok(10));
        assert!(acquire_endpoints(&provider, 0).await.unwrap().is_empty());
        assert!(provider.calls().is_empty());
    }
}
