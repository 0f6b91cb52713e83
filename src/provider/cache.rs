//! Caching layers over credential providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::credential::{Credential, ExpiringCredential};
use crate::error::{ApiError, CredentialError};
use crate::provider::{CredentialProvider, RefreshableProvider};

/// Credentials are refreshed when they expire within this headroom.
pub const DEFAULT_HEADROOM: Duration = Duration::from_secs(5 * 60);

type ProviderFuture = BoxFuture<'static, Result<Arc<dyn CredentialProvider>, CredentialError>>;

/// Memoizes a provider whose first resolution may be slow.
///
/// The resolution is launched eagerly when constructed on a runtime;
/// concurrent callers share the pending resolution. There is no TTL: layer
/// a [`TemporaryProvider`] when refresh is needed.
pub struct DeferredProvider {
    description: &'static str,
    cell: Arc<OnceCell<Arc<dyn CredentialProvider>>>,
    init: Arc<dyn Fn() -> ProviderFuture + Send + Sync>,
}

impl DeferredProvider {
    pub fn new(
        description: &'static str,
        init: impl Fn() -> ProviderFuture + Send + Sync + 'static,
    ) -> Self {
        let this = Self {
            description,
            cell: Arc::new(OnceCell::new()),
            init: Arc::new(init),
        };
        // Warm up in the background when a runtime is available.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let cell = this.cell.clone();
            let init = this.init.clone();
            handle.spawn(async move {
                let _ = cell.get_or_try_init(|| init()).await;
            });
        }
        this
    }

    async fn inner(&self) -> Result<&Arc<dyn CredentialProvider>, CredentialError> {
        self.cell
            .get_or_try_init(|| (self.init)())
            .await
            .map_err(|error| {
                tracing::debug!(provider = self.description, %error, "deferred resolution failed");
                CredentialError::NoProvider
            })
    }
}

#[async_trait]
impl CredentialProvider for DeferredProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        self.inner().await?.get_credential().await
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        match self.cell.get() {
            Some(provider) => provider.shutdown().await,
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        self.description
    }
}

/// Caches expiring credentials and refreshes them inside the headroom
/// window, with at most one refresh in flight.
pub struct TemporaryProvider<P> {
    inner: P,
    headroom: Duration,
    cache: RwLock<Option<ExpiringCredential>>,
    refresh_gate: Mutex<()>,
}

impl<P: RefreshableProvider> TemporaryProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_headroom(inner, DEFAULT_HEADROOM)
    }

    pub fn with_headroom(inner: P, headroom: Duration) -> Self {
        Self {
            inner,
            headroom,
            cache: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    async fn cached(&self) -> Option<Credential> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| !c.is_expiring(self.headroom))
            .map(|c| c.credential.clone())
    }
}

#[async_trait]
impl<P: RefreshableProvider> CredentialProvider for TemporaryProvider<P> {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        if let Some(credential) = self.cached().await {
            return Ok(credential);
        }
        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited for the gate.
        if let Some(credential) = self.cached().await {
            return Ok(credential);
        }
        let fresh = self.inner.refresh().await?;
        let credential = fresh.credential.clone();
        *self.cache.write().await = Some(fresh);
        Ok(credential)
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        self.inner.shutdown().await
    }

    fn description(&self) -> &str {
        self.inner.description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use std::sync::atomic::{AtomicU32, Ordering};
    use time::OffsetDateTime;

    struct CountingRefresher {
        calls: AtomicU32,
        lifetime: time::Duration,
    }

    impl CountingRefresher {
        fn new(lifetime: time::Duration) -> Self {
            Self {
                calls: AtomicU32::new(0),
                lifetime,
            }
        }
    }

    #[async_trait]
    impl RefreshableProvider for CountingRefresher {
        async fn refresh(&self) -> Result<ExpiringCredential, CredentialError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExpiringCredential::new(
                Credential::new(format!("id-{call}"), "key"),
                OffsetDateTime::now_utc() + self.lifetime,
            ))
        }

        fn description(&self) -> &str {
            "counting refresher"
        }
    }

    #[tokio::test]
    async fn test_temporary_provider_caches_fresh_credentials() {
        let provider = TemporaryProvider::new(CountingRefresher::new(time::Duration::hours(2)));
        assert_eq!(provider.get_credential().await.unwrap().secret_id, "id-0");
        assert_eq!(provider.get_credential().await.unwrap().secret_id, "id-0");
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_temporary_provider_refreshes_expiring_credentials() {
        let provider = TemporaryProvider::new(CountingRefresher::new(time::Duration::seconds(30)));
        assert_eq!(provider.get_credential().await.unwrap().secret_id, "id-0");
        assert_eq!(provider.get_credential().await.unwrap().secret_id, "id-1");
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deferred_provider_resolves_once() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        let provider = DeferredProvider::new("test", || {
            Box::pin(async {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(StaticProvider::new(Credential::new("id", "key")))
                    as Arc<dyn CredentialProvider>)
            })
        });
        assert_eq!(provider.get_credential().await.unwrap().secret_id, "id");
        assert_eq!(provider.get_credential().await.unwrap().secret_id, "id");
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deferred_provider_failure_is_no_provider() {
        let provider = DeferredProvider::new("failing", || {
            Box::pin(async {
                Err::<Arc<dyn CredentialProvider>, _>(CredentialError::NoProvider)
            })
        });
        assert!(matches!(
            provider.get_credential().await,
            Err(CredentialError::NoProvider)
        ));
    }
}
