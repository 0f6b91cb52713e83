//! File-based credential providers: the INI profile file and the CLI's
//! JSON credential file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::credential::Credential;
use crate::error::{ApiError, CredentialError};
use crate::provider::{CredentialProvider, Env, StaticProvider, TemporaryProvider};
use crate::provider::sts::StsAssumeRoleProvider;

const DEFAULT_PROFILE: &str = "default";

/// Reads `secret_id` / `secret_key` from a named section of an INI
/// credential file.
///
/// The file is searched in order: explicit override,
/// `TENCENTCLOUD_CREDENTIALS_FILE`, `~/.tencentcloud/credentials`,
/// `/etc/tencentcloud/credentials`.
#[derive(Debug, Clone)]
pub struct ProfileFileProvider {
    path: Option<PathBuf>,
    profile: String,
    env: Env,
}

impl ProfileFileProvider {
    pub fn new() -> Self {
        Self {
            path: None,
            profile: DEFAULT_PROFILE.to_string(),
            env: Env::Process,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    fn candidate_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = &self.path {
            paths.push(path.clone());
        }
        if let Some(path) = self.env.get("TENCENTCLOUD_CREDENTIALS_FILE") {
            paths.push(PathBuf::from(path));
        }
        if let Some(home) = self.env.get("HOME") {
            paths.push(Path::new(&home).join(".tencentcloud").join("credentials"));
        }
        paths.push(PathBuf::from("/etc/tencentcloud/credentials"));
        paths
    }
}

impl Default for ProfileFileProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for ProfileFileProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        let path = self
            .candidate_paths()
            .into_iter()
            .find(|p| p.exists())
            .ok_or(CredentialError::NoProvider)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| CredentialError::InvalidFile { path: path.clone() })?;
        let sections =
            parse_ini(&content).ok_or(CredentialError::InvalidFile { path: path.clone() })?;
        let section = sections
            .get(&self.profile)
            .ok_or_else(|| CredentialError::MissingProfile {
                name: self.profile.clone(),
            })?;
        let secret_id = section
            .get("secret_id")
            .ok_or(CredentialError::MissingSecretId)?;
        let secret_key = section
            .get("secret_key")
            .ok_or(CredentialError::MissingSecretKey)?;
        Ok(Credential::new(secret_id.as_str(), secret_key.as_str()))
    }

    fn description(&self) -> &str {
        "credential profile file"
    }
}

/// A minimal INI reader: sections, `key = value` pairs, `#`/`;` comments.
/// Returns `None` for anything else.
fn parse_ini(content: &str) -> Option<HashMap<String, HashMap<String, String>>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let (key, value) = line.split_once('=')?;
        let section = sections.get_mut(current.as_ref()?)?;
        section.insert(key.trim().to_string(), value.trim().to_string());
    }
    Some(sections)
}

#[derive(Debug, Clone, Deserialize)]
struct CliCredentialFile {
    #[serde(rename = "secretId")]
    secret_id: Option<String>,
    #[serde(rename = "secretKey")]
    secret_key: Option<String>,
    #[serde(rename = "role-arn")]
    role_arn: Option<String>,
    #[serde(rename = "role-session-name")]
    role_session_name: Option<String>,
}

/// Reads the CLI's `~/.tccli/<profile>.credential` JSON file.
///
/// When the file names a role, the static keys sign an assume-role exchange
/// through a nested STS provider; otherwise they are used directly.
pub struct CliProfileProvider {
    profile: String,
    env: Env,
    nested: OnceCell<TemporaryProvider<StsAssumeRoleProvider>>,
}

impl CliProfileProvider {
    pub fn new() -> Self {
        Self::with_profile(DEFAULT_PROFILE)
    }

    pub fn with_profile(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            env: Env::Process,
            nested: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    fn credential_path(&self) -> Option<PathBuf> {
        let home = self.env.get("HOME")?;
        Some(
            Path::new(&home)
                .join(".tccli")
                .join(format!("{}.credential", self.profile)),
        )
    }
}

impl Default for CliProfileProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for CliProfileProvider {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        let path = self.credential_path().ok_or(CredentialError::NoProvider)?;
        if !path.exists() {
            return Err(CredentialError::NoProvider);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| CredentialError::InvalidFile { path: path.clone() })?;
        let file: CliCredentialFile = serde_json::from_str(&content)
            .map_err(|_| CredentialError::InvalidFile { path: path.clone() })?;

        let secret_id = file.secret_id.ok_or(CredentialError::MissingSecretId)?;
        let secret_key = file.secret_key.ok_or(CredentialError::MissingSecretKey)?;
        let credential = Credential::new(secret_id, secret_key);

        match (file.role_arn, file.role_session_name) {
            (Some(role_arn), Some(role_session_name)) => {
                let nested = self
                    .nested
                    .get_or_try_init(|| async {
                        Ok::<_, CredentialError>(TemporaryProvider::new(
                            StsAssumeRoleProvider::new(
                                Arc::new(StaticProvider::new(credential.clone())),
                                role_arn,
                                role_session_name,
                            ),
                        ))
                    })
                    .await?;
                nested.get_credential().await
            }
            _ => Ok(credential),
        }
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        match self.nested.get() {
            Some(nested) => nested.shutdown().await,
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        "CLI credential profile"
    }
}
