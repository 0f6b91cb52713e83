//! Instance-metadata credential provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::credential::{Credential, ExpiringCredential};
use crate::error::CredentialError;
use crate::provider::RefreshableProvider;

const METADATA_BASE: &str =
    "http://metadata.tencentyun.com/latest/meta-data/cam/security-credentials";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Fetches role credentials from the instance metadata endpoint.
///
/// Without a configured role, the endpoint is first polled for the role
/// name as plain text.
#[derive(Debug, Clone)]
pub struct InstanceMetadataProvider {
    http: HttpClient,
    role: Option<String>,
    base_url: String,
}

impl InstanceMetadataProvider {
    pub fn new() -> Self {
        Self {
            http: HttpClient::builder()
                .timeout(METADATA_TIMEOUT)
                .build()
                .expect("reqwest client"),
            role: None,
            base_url: METADATA_BASE.to_string(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn role_name(&self) -> Result<String, CredentialError> {
        if let Some(role) = &self.role {
            return Ok(role.clone());
        }
        let response = self
            .http
            .get(&self.base_url)
            .send()
            .await
            .map_err(|_| CredentialError::CouldNotGetRoleName)?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(CredentialError::UnexpectedResponseStatus {
                status: response.status().as_u16(),
            });
        }
        let role = response
            .text()
            .await
            .map_err(|_| CredentialError::CouldNotGetRoleName)?;
        let role = role.trim().to_string();
        if role.is_empty() {
            return Err(CredentialError::CouldNotGetRoleName);
        }
        Ok(role)
    }
}

impl Default for InstanceMetadataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MetadataCredentials {
    #[serde(rename = "TmpSecretId", default)]
    tmp_secret_id: String,
    #[serde(rename = "TmpSecretKey", default)]
    tmp_secret_key: String,
    #[serde(rename = "Token", default)]
    token: String,
    #[serde(rename = "ExpiredTime", default)]
    expired_time: i64,
    #[serde(rename = "Code")]
    code: Option<String>,
}

impl MetadataCredentials {
    fn into_expiring(self) -> Result<ExpiringCredential, CredentialError> {
        if let Some(code) = &self.code {
            if code != "Success" {
                return Err(CredentialError::MissingMetadata);
            }
        }
        if self.tmp_secret_id.is_empty() || self.tmp_secret_key.is_empty() {
            return Err(CredentialError::MissingMetadata);
        }
        let expiration = OffsetDateTime::from_unix_timestamp(self.expired_time)
            .map_err(|_| CredentialError::MissingMetadata)?;
        let mut credential = Credential::new(self.tmp_secret_id, self.tmp_secret_key);
        if !self.token.is_empty() {
            credential.token = Some(self.token);
        }
        Ok(ExpiringCredential::new(credential, expiration))
    }
}

#[async_trait]
impl RefreshableProvider for InstanceMetadataProvider {
    async fn refresh(&self) -> Result<ExpiringCredential, CredentialError> {
        let role = self.role_name().await?;
        let url = format!("{}/{}", self.base_url, role);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|_| CredentialError::CouldNotGetMetadata)?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(CredentialError::UnexpectedResponseStatus {
                status: response.status().as_u16(),
            });
        }
        let payload: MetadataCredentials = response
            .json()
            .await
            .map_err(|_| CredentialError::CouldNotGetMetadata)?;
        payload.into_expiring()
    }

    fn description(&self) -> &str {
        "instance metadata endpoint"
    }
}
