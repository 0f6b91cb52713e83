//! Environment-variable credential providers.

use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::CredentialError;
use crate::provider::{CredentialProvider, Env};

/// Reads `TENCENTCLOUD_SECRET_ID` / `TENCENTCLOUD_SECRET_KEY` and the
/// optional `TENCENTCLOUD_TOKEN`.
#[derive(Debug, Clone)]
pub struct EnvironmentProvider {
    env: Env,
}

impl EnvironmentProvider {
    pub fn new() -> Self {
        Self { env: Env::Process }
    }

    #[cfg(test)]
    pub(crate) fn with_env(env: Env) -> Self {
        Self { env }
    }
}

impl Default for EnvironmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for EnvironmentProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        read_credential(
            &self.env,
            "TENCENTCLOUD_SECRET_ID",
            "TENCENTCLOUD_SECRET_KEY",
            "TENCENTCLOUD_TOKEN",
        )
    }

    fn description(&self) -> &str {
        "environment variables"
    }
}

/// Serverless-environment variant: reads `TENCENTCLOUD_SECRETID` /
/// `TENCENTCLOUD_SECRETKEY` / `TENCENTCLOUD_SESSIONTOKEN`.
#[derive(Debug, Clone)]
pub struct ScfEnvironmentProvider {
    env: Env,
}

impl ScfEnvironmentProvider {
    pub fn new() -> Self {
        Self { env: Env::Process }
    }

    #[cfg(test)]
    pub(crate) fn with_env(env: Env) -> Self {
        Self { env }
    }
}

impl Default for ScfEnvironmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for ScfEnvironmentProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        read_credential(
            &self.env,
            "TENCENTCLOUD_SECRETID",
            "TENCENTCLOUD_SECRETKEY",
            "TENCENTCLOUD_SESSIONTOKEN",
        )
    }

    fn description(&self) -> &str {
        "serverless environment variables"
    }
}

fn read_credential(
    env: &Env,
    id_var: &str,
    key_var: &str,
    token_var: &str,
) -> Result<Credential, CredentialError> {
    let secret_id = env.get(id_var).ok_or(CredentialError::NoProvider)?;
    let secret_key = env.get(key_var).ok_or(CredentialError::NoProvider)?;
    Ok(Credential {
        secret_id,
        secret_key,
        token: env.get(token_var),
    })
}
