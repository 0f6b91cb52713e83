//! The client executor: credential fetch, request construction, signing,
//! dispatch, decoding and retry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use reqwest::Client as HttpClient;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::Instrument;

use crate::config::ServiceConfig;
use crate::credential::Credential;
use crate::error::ApiError;
use crate::provider::{CredentialProvider, DefaultCredentialProvider, StaticProvider};
use crate::region::Region;
use crate::request::build_request;
use crate::response::decode;
use crate::retry::{JitteredExponentialBackoff, RetryAction, RetryPolicy};
use crate::signing::{SigningBody, SigningMode, V3Signer};

/// Request ids are allocated from a process-wide monotonic counter.
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

static SHARED_CLIENT: OnceLock<Client> = OnceLock::new();

/// In-process request counters, also emitted as tracing events.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    requests_total: AtomicU64,
    request_errors: AtomicU64,
}

impl ClientMetrics {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn request_errors(&self) -> u64 {
        self.request_errors.load(Ordering::Relaxed)
    }
}

struct ClientInner {
    http: HttpClient,
    owns_http: bool,
    provider: Arc<dyn CredentialProvider>,
    retry: Arc<dyn RetryPolicy>,
    signing_mode: SigningMode,
    can_be_shutdown: bool,
    shut_down: AtomicBool,
    metrics: ClientMetrics,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        debug_assert!(
            !self.can_be_shutdown || self.shut_down.load(Ordering::Relaxed),
            "client dropped without shutdown"
        );
    }
}

/// Client every service invocation routes through.
///
/// Construct with [`ClientBuilder`]; cheap to clone. Call
/// [`Client::shutdown`] before dropping the last clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

/// Builder for [`Client`].
///
/// Example:
/// ```rust,no_run
/// use tencentcloud_core_sdk::{Client, Credential};
/// # async fn example() -> Result<(), tencentcloud_core_sdk::ApiError> {
/// let client = Client::builder()
///     .credential(Credential::new("...", "..."))
///     .build();
/// // ... invoke actions ...
/// client.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    http: Option<HttpClient>,
    provider: Option<Arc<dyn CredentialProvider>>,
    retry: Option<Arc<dyn RetryPolicy>>,
    signing_mode: Option<SigningMode>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-owned `reqwest` client; it is not torn down at
    /// shutdown.
    pub fn http(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Use a fixed credential.
    pub fn credential(self, credential: Credential) -> Self {
        self.provider(Arc::new(StaticProvider::new(credential)))
    }

    /// Use a credential provider (defaults to the platform default chain).
    pub fn provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn retry(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// How much of each request is signed (defaults to
    /// [`SigningMode::Default`]).
    pub fn signing_mode(mut self, mode: SigningMode) -> Self {
        self.signing_mode = Some(mode);
        self
    }

    pub fn build(self) -> Client {
        self.build_inner(true)
    }

    fn build_inner(self, can_be_shutdown: bool) -> Client {
        let owns_http = self.http.is_none();
        let http = self
            .http
            .unwrap_or_else(|| HttpClient::builder().build().expect("reqwest client"));
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(DefaultCredentialProvider::new()));
        let retry = self
            .retry
            .unwrap_or_else(|| Arc::new(JitteredExponentialBackoff::default()));
        Client {
            inner: Arc::new(ClientInner {
                http,
                owns_http,
                provider,
                retry,
                signing_mode: self.signing_mode.unwrap_or_default(),
                can_be_shutdown,
                shut_down: AtomicBool::new(false),
                metrics: ClientMetrics::default(),
            }),
        }
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The process-wide shared client. It refuses shutdown and lives for
    /// the rest of the process.
    pub fn shared() -> Client {
        SHARED_CLIENT
            .get_or_init(|| ClientBuilder::new().build_inner(false))
            .clone()
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.inner.metrics
    }

    /// Whether the client tears down its HTTP transport at shutdown.
    pub fn owns_http_transport(&self) -> bool {
        self.inner.owns_http
    }

    /// Invokes an action and decodes the typed response payload.
    ///
    /// With `skip_auth`, the request carries the `SKIP` authorization
    /// sentinel instead of a signature.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<I, O>(
        &self,
        action: &str,
        path: &str,
        region: Option<&Region>,
        method: Method,
        config: &ServiceConfig,
        skip_auth: bool,
        input: Option<&I>,
    ) -> Result<O, ApiError>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(ApiError::AlreadyShutDown);
        }
        let request_id = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!(
            "tc_request",
            request_id,
            tc_service = config.service_name(),
            tc_action = action
        );
        self.execute_inner(action, path, region, method, config, skip_auth, input)
            .instrument(span)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_inner<I, O>(
        &self,
        action: &str,
        path: &str,
        region: Option<&Region>,
        method: Method,
        config: &ServiceConfig,
        skip_auth: bool,
        input: Option<&I>,
    ) -> Result<O, ApiError>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        let started = Instant::now();
        self.inner
            .metrics
            .requests_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter.tc_requests_total = 1, "dispatching request");

        let mode = if skip_auth {
            SigningMode::Skip
        } else {
            self.inner.signing_mode
        };
        let envelope = build_request(action, path, region, method, input, config)?;

        let mut attempt: u32 = 0;
        let result = loop {
            // Construction and signing errors are never retried.
            let credential = if skip_auth {
                Credential::new("", "")
            } else {
                self.inner.provider.get_credential().await?
            };
            let signer = V3Signer::new(credential, config.service_name());
            let body = match &envelope.body {
                Some(bytes) => SigningBody::Bytes(bytes),
                None => SigningBody::None,
            };
            let headers = signer.sign_headers(
                &envelope.method,
                envelope.url.as_str(),
                &envelope.headers,
                &body,
                mode,
                false,
                OffsetDateTime::now_utc(),
            )?;

            let error = match self.dispatch(&envelope, headers, config).await {
                Ok(output) => break Ok(output),
                Err(error) => error,
            };
            match self.inner.retry.decide(&error, attempt) {
                RetryAction::Retry { wait } => {
                    tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, %error, "retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                RetryAction::Stop => break Err(error),
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                tracing::debug!(histogram.tc_request_duration = elapsed_ms, "request succeeded");
            }
            Err(error) => {
                self.inner
                    .metrics
                    .request_errors
                    .fetch_add(1, Ordering::Relaxed);
                // Typed service errors were already logged by the decoder.
                if !matches!(error, ApiError::Service(_)) {
                    tracing::error!(counter.tc_request_errors = 1, %error, "request failed");
                }
            }
        }
        result
    }

    async fn dispatch<O: DeserializeOwned>(
        &self,
        envelope: &crate::request::RequestEnvelope,
        headers: reqwest::header::HeaderMap,
        config: &ServiceConfig,
    ) -> Result<O, ApiError> {
        let mut request = self
            .inner
            .http
            .request(envelope.method.clone(), envelope.url.clone())
            .headers(headers)
            .timeout(config.request_timeout());
        if let Some(body) = &envelope.body {
            request = request.body(body.clone());
        }
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        decode(status, headers, &body, config.taxonomy())
    }

    /// Tears down the credential provider and, for owned transports, the
    /// HTTP client. Idempotent: a second call fails with
    /// [`ApiError::AlreadyShutDown`].
    pub async fn shutdown(&self) -> Result<(), ApiError> {
        if !self.inner.can_be_shutdown {
            return Err(ApiError::ShutdownUnsupported);
        }
        if self
            .inner
            .shut_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ApiError::AlreadyShutDown);
        }
        // Provider first: nested clients must go down before the transport
        // they depend on.
        self.inner.provider.shutdown().await?;
        // An owned reqwest transport is released when the last clone drops.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client::builder()
            .credential(Credential::new("test_id", "test_key"))
            .build()
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let client = test_client();
        client.shutdown().await.unwrap();
        assert!(matches!(
            client.shutdown().await,
            Err(ApiError::AlreadyShutDown)
        ));
    }

    #[tokio::test]
    async fn test_execute_after_shutdown_fails() {
        let client = test_client();
        client.shutdown().await.unwrap();
        let config = ServiceConfig::new("cvm", "2017-03-12");
        let result: Result<serde_json::Value, _> = client
            .execute::<(), _>(
                "DescribeInstances",
                "/",
                None,
                Method::POST,
                &config,
                false,
                None,
            )
            .await;
        assert!(matches!(result, Err(ApiError::AlreadyShutDown)));
    }

    #[tokio::test]
    async fn test_shared_client_refuses_shutdown() {
        let client = Client::shared();
        assert!(matches!(
            client.shutdown().await,
            Err(ApiError::ShutdownUnsupported)
        ));
    }

    #[tokio::test]
    async fn test_caller_owned_transport() {
        let shared_http = HttpClient::new();
        let client = Client::builder()
            .http(shared_http)
            .credential(Credential::new("test_id", "test_key"))
            .build();
        assert!(!client.owns_http_transport());
        let owned = test_client();
        assert!(owned.owns_http_transport());
        client.shutdown().await.unwrap();
        owned.shutdown().await.unwrap();
    }

    #[test]
    fn test_request_ids_are_monotonic() {
        let first = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
        let second = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
        assert!(second > first);
    }
}
