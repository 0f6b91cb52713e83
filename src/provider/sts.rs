//! Credential providers backed by the Security Token Service.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::utf8_percent_encode;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::OnceCell;

use crate::client::Client;
use crate::config::ServiceConfig;
use crate::credential::{Credential, ExpiringCredential};
use crate::endpoint::EndpointStrategy;
use crate::error::{ApiError, CredentialError};
use crate::provider::{CredentialProvider, Env, RefreshableProvider, StaticProvider};
use crate::region::Region;
use crate::signing::RFC3986;

const STS_SERVICE: &str = "sts";
const STS_VERSION: &str = "2018-08-13";
const DEFAULT_SESSION_DURATION: u64 = 7200;

fn sts_config() -> ServiceConfig {
    ServiceConfig::new(STS_SERVICE, STS_VERSION).endpoint(EndpointStrategy::Global)
}

#[derive(Debug, Clone, Serialize)]
pub struct AssumeRoleRequest {
    #[serde(rename = "RoleArn")]
    pub role_arn: String,
    #[serde(rename = "RoleSessionName")]
    pub role_session_name: String,
    #[serde(rename = "Policy", skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(rename = "DurationSeconds", skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssumeRoleWithWebIdentityRequest {
    #[serde(rename = "ProviderId")]
    pub provider_id: String,
    #[serde(rename = "WebIdentityToken")]
    pub web_identity_token: String,
    #[serde(rename = "RoleArn")]
    pub role_arn: String,
    #[serde(rename = "RoleSessionName")]
    pub role_session_name: String,
    #[serde(rename = "DurationSeconds", skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StsCredentials {
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "TmpSecretId")]
    pub tmp_secret_id: String,
    #[serde(rename = "TmpSecretKey")]
    pub tmp_secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssumeRoleResponse {
    #[serde(rename = "Credentials")]
    pub credentials: StsCredentials,
    #[serde(rename = "ExpiredTime")]
    pub expired_time: i64,
    #[serde(rename = "RequestId")]
    pub request_id: Option<String>,
}

fn into_expiring(response: AssumeRoleResponse) -> Result<ExpiringCredential, CredentialError> {
    let credentials = response.credentials;
    if credentials.tmp_secret_id.is_empty() || credentials.tmp_secret_key.is_empty() {
        return Err(CredentialError::MissingMetadata);
    }
    let expiration = OffsetDateTime::from_unix_timestamp(response.expired_time)
        .map_err(|_| CredentialError::MissingMetadata)?;
    Ok(ExpiringCredential::new(
        Credential::with_token(
            credentials.tmp_secret_id,
            credentials.tmp_secret_key,
            credentials.token,
        ),
        expiration,
    ))
}

/// Exchanges an upstream credential for a role's temporary credential.
///
/// The provider owns a nested STS client whose own credentials come from
/// the upstream provider; it is torn down first at shutdown. Wrap in a
/// [`TemporaryProvider`](crate::provider::TemporaryProvider) to refresh
/// before expiry.
pub struct StsAssumeRoleProvider {
    client: Client,
    config: ServiceConfig,
    region: Option<Region>,
    request: AssumeRoleRequest,
}

impl StsAssumeRoleProvider {
    pub fn new(
        upstream: Arc<dyn CredentialProvider>,
        role_arn: impl Into<String>,
        role_session_name: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::builder().provider(upstream).build(),
            config: sts_config(),
            region: None,
            request: AssumeRoleRequest {
                role_arn: role_arn.into(),
                role_session_name: role_session_name.into(),
                policy: None,
                duration_seconds: None,
            },
        }
    }

    /// Reads the role from `TENCENTCLOUD_ROLE_ARN` and
    /// `TENCENTCLOUD_ROLE_SESSION_NAME`.
    pub fn from_env(upstream: Arc<dyn CredentialProvider>) -> Result<Self, CredentialError> {
        let env = Env::Process;
        let role_arn = env
            .get("TENCENTCLOUD_ROLE_ARN")
            .ok_or(CredentialError::MissingRoleArn)?;
        let session_name = env
            .get("TENCENTCLOUD_ROLE_SESSION_NAME")
            .unwrap_or_else(default_session_name);
        Ok(Self::new(upstream, role_arn, session_name))
    }

    /// Restricts the assumed credential with a policy document. The policy
    /// is percent-encoded before it is sent.
    pub fn with_policy(mut self, policy: impl AsRef<str>) -> Self {
        self.request.policy =
            Some(utf8_percent_encode(policy.as_ref(), RFC3986).to_string());
        self
    }

    pub fn with_duration_seconds(mut self, duration_seconds: u64) -> Self {
        self.request.duration_seconds = Some(duration_seconds);
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

#[async_trait]
impl RefreshableProvider for StsAssumeRoleProvider {
    async fn refresh(&self) -> Result<ExpiringCredential, CredentialError> {
        let response: AssumeRoleResponse = self
            .client
            .execute(
                "AssumeRole",
                "/",
                self.region.as_ref(),
                Method::POST,
                &self.config,
                false,
                Some(&self.request),
            )
            .await
            .map_err(|e| CredentialError::Exchange(Box::new(e)))?;
        into_expiring(response)
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        self.client.shutdown().await
    }

    fn description(&self) -> &str {
        "STS assume-role"
    }
}

/// Exchanges a workload identity token for a role credential through the
/// managed-Kubernetes OIDC federation surface.
///
/// Configuration comes from `TKE_PROVIDER_ID`, `TKE_IDENTITY_TOKEN_FILE`,
/// `TKE_ROLE_ARN` and optionally `TKE_REGION`. The exchange itself is
/// unsigned: the nested client sends it with skip-mode authorization. The
/// nested client is only created once the environment is complete.
pub struct OidcStsProvider {
    client: OnceCell<Client>,
    config: ServiceConfig,
    env: Env,
}

impl OidcStsProvider {
    pub fn from_env() -> Self {
        Self {
            client: OnceCell::new(),
            config: sts_config(),
            env: Env::Process,
        }
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                Client::builder()
                    .provider(Arc::new(StaticProvider::new(Credential::new("", ""))))
                    .build()
            })
            .await
    }

    #[cfg(test)]
    pub(crate) fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    fn request_from_env(&self) -> Result<AssumeRoleWithWebIdentityRequest, CredentialError> {
        let provider_id = self
            .env
            .get("TKE_PROVIDER_ID")
            .ok_or(CredentialError::MissingProviderId)?;
        let token_file = self
            .env
            .get("TKE_IDENTITY_TOKEN_FILE")
            .ok_or(CredentialError::MissingIdentityTokenFile)?;
        let role_arn = self
            .env
            .get("TKE_ROLE_ARN")
            .ok_or(CredentialError::MissingRoleArn)?;
        Ok(AssumeRoleWithWebIdentityRequest {
            provider_id,
            web_identity_token: token_file,
            role_arn,
            role_session_name: default_session_name(),
            duration_seconds: Some(DEFAULT_SESSION_DURATION),
        })
    }
}

#[async_trait]
impl RefreshableProvider for OidcStsProvider {
    async fn refresh(&self) -> Result<ExpiringCredential, CredentialError> {
        let mut request = self.request_from_env()?;
        let token_path = PathBuf::from(&request.web_identity_token);
        request.web_identity_token = tokio::fs::read_to_string(&token_path)
            .await
            .map(|token| token.trim().to_string())
            .map_err(|_| CredentialError::CouldNotReadIdentityTokenFile { path: token_path })?;

        let region = self.env.get("TKE_REGION").map(Region::new);
        let response: AssumeRoleResponse = self
            .client()
            .await
            .execute(
                "AssumeRoleWithWebIdentity",
                "/",
                region.as_ref(),
                Method::POST,
                &self.config,
                true,
                Some(&request),
            )
            .await
            .map_err(|e| CredentialError::Exchange(Box::new(e)))?;
        into_expiring(response)
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        match self.client.get() {
            Some(client) => client.shutdown().await,
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        "OIDC federation"
    }
}

fn default_session_name() -> String {
    format!(
        "tencentcloud-rust-sdk-{}",
        OffsetDateTime::now_utc().unix_timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_role_request_serialization() {
        let request = AssumeRoleRequest {
            role_arn: "qcs::cam::uin/100000000001:roleName/test".to_string(),
            role_session_name: "session".to_string(),
            policy: None,
            duration_seconds: Some(7200),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["RoleArn"], "qcs::cam::uin/100000000001:roleName/test");
        assert_eq!(json["DurationSeconds"], 7200);
        assert!(json.get("Policy").is_none());
    }

    #[tokio::test]
    async fn test_policy_is_percent_encoded() {
        let provider = StsAssumeRoleProvider::new(
            Arc::new(StaticProvider::new(Credential::new("id", "key"))),
            "arn",
            "session",
        )
        .with_policy(r#"{"statement":[]}"#);
        assert_eq!(
            provider.request.policy.as_deref(),
            Some("%7B%22statement%22%3A%5B%5D%7D")
        );
        provider.shutdown().await.unwrap();
    }

    #[test]
    fn test_assume_role_response_deserialization() {
        let response: AssumeRoleResponse = serde_json::from_str(
            r#"{
                "Credentials": {
                    "Token": "tok",
                    "TmpSecretId": "tmp-id",
                    "TmpSecretKey": "tmp-key"
                },
                "ExpiredTime": 2000000000,
                "Expiration": "2033-05-18T03:33:20Z",
                "RequestId": "req"
            }"#,
        )
        .unwrap();
        let expiring = into_expiring(response).unwrap();
        assert_eq!(expiring.credential.secret_id, "tmp-id");
        assert_eq!(expiring.credential.token.as_deref(), Some("tok"));
        assert_eq!(expiring.expiration.unix_timestamp(), 2_000_000_000);
    }

    #[tokio::test]
    async fn test_oidc_reports_missing_environment() {
        let provider = OidcStsProvider::from_env().with_env(Env::from_pairs(&[]));
        assert!(matches!(
            provider.refresh().await,
            Err(CredentialError::MissingProviderId)
        ));
        provider.shutdown().await.unwrap();

        let provider = OidcStsProvider::from_env()
            .with_env(Env::from_pairs(&[("TKE_PROVIDER_ID", "p")]));
        assert!(matches!(
            provider.refresh().await,
            Err(CredentialError::MissingIdentityTokenFile)
        ));
        provider.shutdown().await.unwrap();

        let provider = OidcStsProvider::from_env().with_env(Env::from_pairs(&[
            ("TKE_PROVIDER_ID", "p"),
            ("TKE_IDENTITY_TOKEN_FILE", "/tmp/token"),
        ]));
        assert!(matches!(
            provider.refresh().await,
            Err(CredentialError::MissingRoleArn)
        ));
        provider.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_oidc_reports_unreadable_token_file() {
        let provider = OidcStsProvider::from_env().with_env(Env::from_pairs(&[
            ("TKE_PROVIDER_ID", "p"),
            ("TKE_IDENTITY_TOKEN_FILE", "/nonexistent/identity/token"),
            ("TKE_ROLE_ARN", "arn"),
        ]));
        assert!(matches!(
            provider.refresh().await,
            Err(CredentialError::CouldNotReadIdentityTokenFile { .. })
        ));
        provider.shutdown().await.unwrap();
    }
}
