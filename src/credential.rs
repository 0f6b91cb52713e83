use std::time::Duration;

use time::OffsetDateTime;

/// Credential for authenticating with Tencent Cloud.
///
/// - `secret_id` and `secret_key` are required
/// - Optional session `token` is sent as `X-TC-Token`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub secret_id: String,
    pub secret_key: String,
    pub token: Option<String>,
}

impl Credential {
    /// Creates a credential from a secret id and secret key.
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            token: None,
        }
    }

    /// Creates a credential that carries a session token.
    pub fn with_token(
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            token: Some(token.into()),
        }
    }

    /// A credential is empty when either the secret id or the secret key is
    /// missing. Empty credentials can only be used with skip-mode signing.
    pub fn is_empty(&self) -> bool {
        self.secret_id.is_empty() || self.secret_key.is_empty()
    }
}

/// A credential with a known expiration instant, as issued by STS or the
/// instance metadata endpoint.
#[derive(Debug, Clone)]
pub struct ExpiringCredential {
    pub credential: Credential,
    pub expiration: OffsetDateTime,
}

impl ExpiringCredential {
    pub fn new(credential: Credential, expiration: OffsetDateTime) -> Self {
        Self {
            credential,
            expiration,
        }
    }

    /// True when the credential expires within the given headroom.
    pub fn is_expiring(&self, within: Duration) -> bool {
        let headroom = time::Duration::try_from(within).unwrap_or(time::Duration::MAX);
        self.expiration - OffsetDateTime::now_utc() < headroom
    }
}
