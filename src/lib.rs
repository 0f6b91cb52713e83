//! Core runtime for the Tencent Cloud API.
//!
//! This crate is the shared machinery every service invocation routes
//! through:
//!
//! - TC3-HMAC-SHA256, legacy V1 and object-storage request signing
//! - chained credential resolution (environment, profile files, instance
//!   metadata, STS role assumption, OIDC federation) with caching and
//!   refresh
//! - the request pipeline: endpoint resolution, request construction,
//!   signing, dispatch via `reqwest`, response decoding, error
//!   classification and retry with jittered backoff
//! - a pagination driver with a total-count consistency check
//!
//! Logging and request metrics are emitted through `tracing`.
//!
//! Per-service action models live in their own crates; anything that
//! serializes with `serde` can be sent through [`Client::execute`].

pub mod client;
pub mod config;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod pagination;
pub mod provider;
pub mod region;
pub mod request;
pub mod response;
pub mod retry;
pub mod signing;

pub use client::{Client, ClientBuilder, ClientMetrics};
pub use config::{Language, ServiceConfig, ServiceConfigPatch};
pub use credential::{Credential, ExpiringCredential};
pub use endpoint::EndpointStrategy;
pub use error::{ApiError, CredentialError, ErrorContext, ErrorTaxonomy};
pub use pagination::{paginate, PaginatedRequest, PaginatedResponse};
pub use region::{Region, RegionKind};
pub use response::ResponseEnvelope;
pub use retry::{RetryAction, RetryPolicy};
pub use signing::{CosSigner, SigningBody, SigningMode, V1Signer, V3Signer};
