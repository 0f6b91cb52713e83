//! Credential resolution.
//!
//! A [`CredentialProvider`] supplies the effective credential at call time.
//! Providers compose: [`ProviderChain`] selects the first provider that can
//! supply credentials, [`DeferredProvider`](cache::DeferredProvider)
//! memoizes a slow resolution, and
//! [`TemporaryProvider`](cache::TemporaryProvider) refreshes expiring
//! credentials before they lapse.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credential::{Credential, ExpiringCredential};
use crate::error::{ApiError, CredentialError};

pub mod cache;
pub mod env;
pub mod imds;
pub mod profile;
pub mod sts;

pub use cache::{DeferredProvider, TemporaryProvider};
pub use env::{EnvironmentProvider, ScfEnvironmentProvider};
pub use imds::InstanceMetadataProvider;
pub use profile::{CliProfileProvider, ProfileFileProvider};
pub use sts::{OidcStsProvider, StsAssumeRoleProvider};

/// Supplies credentials for request signing.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credential(&self) -> Result<Credential, CredentialError>;

    /// Providers that host nested clients tear them down here; everything
    /// else is a no-op.
    async fn shutdown(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Short name used in logs.
    fn description(&self) -> &str;
}

/// Supplies expiring credentials; wrapped by
/// [`TemporaryProvider`](cache::TemporaryProvider) for refresh.
#[async_trait]
pub trait RefreshableProvider: Send + Sync {
    async fn refresh(&self) -> Result<ExpiringCredential, CredentialError>;

    async fn shutdown(&self) -> Result<(), ApiError> {
        Ok(())
    }

    fn description(&self) -> &str;
}

/// Returns a fixed credential.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    credential: Credential,
}

impl StaticProvider {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl CredentialProvider for StaticProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        Ok(self.credential.clone())
    }

    fn description(&self) -> &str {
        "static credentials"
    }
}

/// Never supplies credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProvider;

#[async_trait]
impl CredentialProvider for NullProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        Err(CredentialError::NoProvider)
    }

    fn description(&self) -> &str {
        "no credentials"
    }
}

/// Tries a list of providers in order; the first that supplies credentials
/// is selected and every later call delegates to it.
///
/// Selection is eager: it happens inside [`ProviderChain::resolve`], so API
/// calls pay no provider-selection cost. Rejected providers are shut down
/// during selection.
pub struct ProviderChain {
    selected: Arc<dyn CredentialProvider>,
}

impl ProviderChain {
    pub async fn resolve(
        providers: Vec<Arc<dyn CredentialProvider>>,
    ) -> Result<Self, CredentialError> {
        let mut selected = None;
        let mut rejected = Vec::new();
        for provider in providers {
            if selected.is_some() {
                rejected.push(provider);
                continue;
            }
            match provider.get_credential().await {
                Ok(_) => {
                    tracing::info!(provider = provider.description(), "selected credential provider");
                    selected = Some(provider);
                }
                Err(error) => {
                    tracing::debug!(
                        provider = provider.description(),
                        %error,
                        "provider did not supply credentials"
                    );
                    rejected.push(provider);
                }
            }
        }
        for provider in rejected {
            if let Err(error) = provider.shutdown().await {
                tracing::debug!(provider = provider.description(), %error, "shutdown of unselected provider failed");
            }
        }
        match selected {
            Some(selected) => Ok(Self { selected }),
            None => Err(CredentialError::NoProvider),
        }
    }
}

#[async_trait]
impl CredentialProvider for ProviderChain {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        self.selected.get_credential().await
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        self.selected.shutdown().await
    }

    fn description(&self) -> &str {
        self.selected.description()
    }
}

/// The platform default chain, resolved lazily behind a
/// [`DeferredProvider`] so client construction never blocks.
///
/// On Linux the chain is environment, instance metadata, OIDC federation,
/// serverless environment, profile file, CLI profile; elsewhere the
/// network-dependent providers are omitted.
pub struct DefaultCredentialProvider {
    deferred: DeferredProvider,
}

impl DefaultCredentialProvider {
    pub fn new() -> Self {
        Self {
            deferred: DeferredProvider::new("default provider chain", || {
                Box::pin(async {
                    let chain = ProviderChain::resolve(default_providers()).await?;
                    Ok(Arc::new(chain) as Arc<dyn CredentialProvider>)
                })
            }),
        }
    }
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for DefaultCredentialProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        self.deferred.get_credential().await
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        self.deferred.shutdown().await
    }

    fn description(&self) -> &str {
        self.deferred.description()
    }
}

fn default_providers() -> Vec<Arc<dyn CredentialProvider>> {
    let mut providers: Vec<Arc<dyn CredentialProvider>> =
        vec![Arc::new(EnvironmentProvider::new())];
    if cfg!(target_os = "linux") {
        providers.push(Arc::new(TemporaryProvider::new(
            InstanceMetadataProvider::new(),
        )));
        providers.push(Arc::new(TemporaryProvider::new(OidcStsProvider::from_env())));
        providers.push(Arc::new(ScfEnvironmentProvider::new()));
    }
    providers.push(Arc::new(ProfileFileProvider::new()));
    providers.push(Arc::new(CliProfileProvider::new()));
    providers
}

/// Process-environment access, swappable for tests.
#[derive(Debug, Clone)]
pub(crate) enum Env {
    Process,
    Fixed(HashMap<String, String>),
}

impl Env {
    pub(crate) fn get(&self, name: &str) -> Option<String> {
        match self {
            Env::Process => std::env::var(name).ok().filter(|v| !v.is_empty()),
            Env::Fixed(map) => map.get(name).cloned(),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Env::Fixed(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl CredentialProvider for FailingProvider {
        async fn get_credential(&self) -> Result<Credential, CredentialError> {
            Err(CredentialError::NoProvider)
        }

        fn description(&self) -> &str {
            "always fails"
        }
    }

    #[tokio::test]
    async fn test_chain_selects_first_success() {
        let chain = ProviderChain::resolve(vec![
            Arc::new(FailingProvider),
            Arc::new(StaticProvider::new(Credential::new("id-1", "key-1"))),
            Arc::new(StaticProvider::new(Credential::new("id-2", "key-2"))),
        ])
        .await
        .unwrap();

        let credential = chain.get_credential().await.unwrap();
        assert_eq!(credential.secret_id, "id-1");
        // Delegation sticks with the selected provider.
        let credential = chain.get_credential().await.unwrap();
        assert_eq!(credential.secret_id, "id-1");
    }

    #[tokio::test]
    async fn test_exhausted_chain_reports_no_provider() {
        let result =
            ProviderChain::resolve(vec![Arc::new(FailingProvider), Arc::new(NullProvider)]).await;
        assert!(matches!(result, Err(CredentialError::NoProvider)));
    }

    #[tokio::test]
    async fn test_null_provider() {
        assert!(matches!(
            NullProvider.get_credential().await,
            Err(CredentialError::NoProvider)
        ));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticProvider::new(Credential::with_token("id", "key", "tok"));
        let credential = provider.get_credential().await.unwrap();
        assert_eq!(credential.token.as_deref(), Some("tok"));
        provider.shutdown().await.unwrap();
    }

    #[test]
    fn test_env_shim() {
        let env = Env::from_pairs(&[("A", "1")]);
        assert_eq!(env.get("A").as_deref(), Some("1"));
        assert_eq!(env.get("B"), None);
    }
}
