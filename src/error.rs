use std::fmt;
use std::path::PathBuf;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use thiserror::Error;

/// Context captured alongside a service error.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: Option<String>,
    pub message: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// A service error recognized by an error taxonomy.
///
/// Typed service errors render as `"<code>: <message>"` and carry the
/// response context they were decoded from.
pub trait TypedServiceError: fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn code(&self) -> &str;
    fn context(&self) -> &ErrorContext;
}

/// Constructor probed by the response decoder: returns the typed error for a
/// recognized code, or `None` to let the next taxonomy try.
pub type ErrorConstructor = fn(&str, ErrorContext) -> Option<Box<dyn TypedServiceError>>;

/// A per-service tree of typed errors keyed by string code.
///
/// The decoder probes `domains` in order, then the taxonomy itself; the
/// first constructor that accepts the code wins.
#[derive(Clone, Copy)]
pub struct ErrorTaxonomy {
    pub description: &'static str,
    pub domains: &'static [&'static ErrorTaxonomy],
    pub construct: ErrorConstructor,
}

impl ErrorTaxonomy {
    /// Interprets a code against this taxonomy, returning the context back
    /// to the caller when nothing matched.
    pub fn interpret(
        &self,
        code: &str,
        context: ErrorContext,
    ) -> Result<Box<dyn TypedServiceError>, ErrorContext> {
        for domain in self.domains {
            if let Some(error) = (domain.construct)(code, context.clone()) {
                return Ok(error);
            }
        }
        (self.construct)(code, context.clone()).ok_or(context)
    }
}

impl fmt::Debug for ErrorTaxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorTaxonomy")
            .field(&self.description)
            .finish()
    }
}

macro_rules! common_error_codes {
    ($(($variant:ident, $code:literal)),* $(,)?) => {
        /// Error codes shared by every Tencent Cloud service.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum CommonErrorCode {
            $($variant,)*
        }

        impl CommonErrorCode {
            pub fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn as_code(&self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)*
                }
            }
        }
    };
}

common_error_codes! {
    (ActionOffline, "ActionOffline"),
    (AuthFailureInvalidAuthorization, "AuthFailure.InvalidAuthorization"),
    (AuthFailureInvalidSecretId, "AuthFailure.InvalidSecretId"),
    (AuthFailureMfaFailure, "AuthFailure.MFAFailure"),
    (AuthFailureSecretIdNotFound, "AuthFailure.SecretIdNotFound"),
    (AuthFailureSignatureExpire, "AuthFailure.SignatureExpire"),
    (AuthFailureSignatureFailure, "AuthFailure.SignatureFailure"),
    (AuthFailureTokenFailure, "AuthFailure.TokenFailure"),
    (AuthFailureUnauthorizedOperation, "AuthFailure.UnauthorizedOperation"),
    (DryRunOperation, "DryRunOperation"),
    (FailedOperation, "FailedOperation"),
    (InternalError, "InternalError"),
    (InvalidAction, "InvalidAction"),
    (InvalidParameter, "InvalidParameter"),
    (InvalidParameterValue, "InvalidParameterValue"),
    (InvalidRequest, "InvalidRequest"),
    (IpInBlacklist, "IpInBlacklist"),
    (IpNotInWhitelist, "IpNotInWhitelist"),
    (LimitExceeded, "LimitExceeded"),
    (MissingParameter, "MissingParameter"),
    (NoSuchProduct, "NoSuchProduct"),
    (NoSuchVersion, "NoSuchVersion"),
    (RequestLimitExceeded, "RequestLimitExceeded"),
    (
        RequestLimitExceededGlobalRegionUinLimitExceeded,
        "RequestLimitExceeded.GlobalRegionUinLimitExceeded"
    ),
    (RequestLimitExceededIpLimitExceeded, "RequestLimitExceeded.IPLimitExceeded"),
    (RequestLimitExceededUinLimitExceeded, "RequestLimitExceeded.UinLimitExceeded"),
    (RequestSizeLimitExceeded, "RequestSizeLimitExceeded"),
    (ResourceInUse, "ResourceInUse"),
    (ResourceInsufficient, "ResourceInsufficient"),
    (ResourceNotFound, "ResourceNotFound"),
    (ResourceUnavailable, "ResourceUnavailable"),
    (ResponseSizeLimitExceeded, "ResponseSizeLimitExceeded"),
    (ServiceUnavailable, "ServiceUnavailable"),
    (UnauthorizedOperation, "UnauthorizedOperation"),
    (UnknownParameter, "UnknownParameter"),
    (UnsupportedOperation, "UnsupportedOperation"),
    (UnsupportedProtocol, "UnsupportedProtocol"),
    (UnsupportedRegion, "UnsupportedRegion"),
}

/// A platform-common service error.
#[derive(Debug)]
pub struct CommonServiceError {
    pub code: CommonErrorCode,
    pub context: ErrorContext,
}

impl fmt::Display for CommonServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_code(), self.context.message)
    }
}

impl TypedServiceError for CommonServiceError {
    fn code(&self) -> &str {
        self.code.as_code()
    }

    fn context(&self) -> &ErrorContext {
        &self.context
    }
}

/// Taxonomy of the platform-common error codes, used by the decoder as the
/// fallback when no service taxonomy recognizes a code.
pub static COMMON_ERRORS: ErrorTaxonomy = ErrorTaxonomy {
    description: "platform common errors",
    domains: &[],
    construct: |code, context| {
        CommonErrorCode::from_code(code)
            .map(|code| Box::new(CommonServiceError { code, context }) as Box<dyn TypedServiceError>)
    },
};

/// Errors raised while resolving credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential provider could supply credentials")]
    NoProvider,
    #[error("invalid credential file at {path:?}")]
    InvalidFile { path: PathBuf },
    #[error("profile {name:?} not found in credential file")]
    MissingProfile { name: String },
    #[error("credential file is missing secret_id")]
    MissingSecretId,
    #[error("credential file is missing secret_key")]
    MissingSecretKey,
    #[error("TKE_PROVIDER_ID is not set")]
    MissingProviderId,
    #[error("TKE_IDENTITY_TOKEN_FILE is not set")]
    MissingIdentityTokenFile,
    #[error("TKE_ROLE_ARN is not set")]
    MissingRoleArn,
    #[error("could not read identity token file at {path:?}")]
    CouldNotReadIdentityTokenFile { path: PathBuf },
    #[error("metadata endpoint returned status {status}")]
    UnexpectedResponseStatus { status: u16 },
    #[error("could not get role name from metadata endpoint")]
    CouldNotGetRoleName,
    #[error("could not get credentials from metadata endpoint")]
    CouldNotGetMetadata,
    #[error("metadata response is missing credentials")]
    MissingMetadata,
    #[error("credential exchange failed: {0}")]
    Exchange(#[source] Box<ApiError>),
}

/// Errors returned by the SDK.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decoding error: {0}")]
    Decoding(#[from] serde_json::Error),
    #[error(
        "invalid URL {url:?}; if this URL should be accepted, please report it at \
         https://github.com/y-zion/tencentcloud-core-sdk-rust/issues"
    )]
    InvalidUrl { url: String },
    #[error("cannot sign a request with an empty credential")]
    EmptyCredential,
    #[error("client has already been shut down")]
    AlreadyShutDown,
    #[error("this client does not support shutdown")]
    ShutdownUnsupported,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("{0}")]
    Service(Box<dyn TypedServiceError>),
    #[error("{code}: {}", .context.message)]
    RawService { code: String, context: ErrorContext },
    #[error("{}: {}", .context.message, .body.as_deref().unwrap_or("<no body>"))]
    Raw {
        body: Option<String>,
        context: ErrorContext,
    },
    #[error("total count changed during pagination: recorded {previous}, got {current}")]
    TotalCountChanged { previous: u64, current: u64 },
}

impl ApiError {
    pub(crate) fn invalid_url(url: impl Into<String>) -> Self {
        ApiError::InvalidUrl { url: url.into() }
    }

    /// The service error code carried by this error, if any.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            ApiError::Service(e) => Some(e.code()),
            ApiError::RawService { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The response context carried by this error, if any.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ApiError::Service(e) => Some(e.context()),
            ApiError::RawService { context, .. } | ApiError::Raw { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(message: &str) -> ErrorContext {
        ErrorContext {
            request_id: Some("req-1".to_string()),
            message: message.to_string(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_common_error_round_trip() {
        assert_eq!(
            CommonErrorCode::from_code("InternalError"),
            Some(CommonErrorCode::InternalError)
        );
        assert_eq!(
            CommonErrorCode::from_code("AuthFailure.SignatureFailure")
                .map(|c| c.as_code()),
            Some("AuthFailure.SignatureFailure")
        );
        assert_eq!(CommonErrorCode::from_code("CVM.SomethingElse"), None);
    }

    #[test]
    fn test_common_taxonomy_interprets_known_codes() {
        let typed = COMMON_ERRORS
            .interpret("RequestLimitExceeded", context("too many requests"))
            .expect("known code");
        assert_eq!(typed.code(), "RequestLimitExceeded");
        assert_eq!(
            typed.to_string(),
            "RequestLimitExceeded: too many requests"
        );
    }

    #[test]
    fn test_common_taxonomy_rejects_unknown_codes() {
        let ctx = COMMON_ERRORS
            .interpret("Cvm.UnknownThing", context("boom"))
            .expect_err("unknown code");
        assert_eq!(ctx.message, "boom");
    }

    #[test]
    fn test_taxonomy_probes_domains_first() {
        static LEAF: ErrorTaxonomy = ErrorTaxonomy {
            description: "leaf",
            domains: &[],
            construct: |code, context| {
                (code == "Leaf.Only").then(|| {
                    Box::new(CommonServiceError {
                        code: CommonErrorCode::FailedOperation,
                        context,
                    }) as Box<dyn TypedServiceError>
                })
            },
        };
        static ROOT: ErrorTaxonomy = ErrorTaxonomy {
            description: "root",
            domains: &[&LEAF],
            construct: |code, context| COMMON_ERRORS.interpret(code, context).ok(),
        };

        assert!(ROOT.interpret("Leaf.Only", context("x")).is_ok());
        assert!(ROOT.interpret("InternalError", context("x")).is_ok());
        assert!(ROOT.interpret("Nope", context("x")).is_err());
    }

    #[test]
    fn test_service_error_rendering() {
        let err = ApiError::RawService {
            code: "Cvm.Broken".to_string(),
            context: context("it broke"),
        };
        assert_eq!(err.to_string(), "Cvm.Broken: it broke");
        assert_eq!(err.service_code(), Some("Cvm.Broken"));
    }
}
