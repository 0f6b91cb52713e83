use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::ApiError;
use crate::region::{Region, RegionKind};

/// Root domain for per-service API endpoints.
pub const DEFAULT_DOMAIN: &str = "tencentcloudapi.com";

type EndpointFn = dyn Fn(&str, Option<&Region>) -> String + Send + Sync;
type FactoryFn = dyn Fn(&str, Option<&Region>) -> EndpointStrategy + Send + Sync;

/// Maps a `(service, region)` pair to an endpoint URL.
///
/// Resolution is pure: the same strategy, service and region always produce
/// the same URL string.
#[derive(Clone)]
pub enum EndpointStrategy {
    /// `https://{service}.{region}.tencentcloudapi.com`, dropping the region
    /// label when no region is known.
    Service,
    /// Prefers the region-less global endpoint, falling back to the regional
    /// one for regions that are not globally reachable.
    Global,
    /// Always resolves against the given region, ignoring per-call regions.
    Regional(Region),
    /// A fixed URL. Construct through [`EndpointStrategy::static_url`].
    Static(String),
    /// Caller-supplied resolution.
    Custom(Arc<EndpointFn>, String),
    /// Caller-supplied strategy selection; the produced strategy is resolved
    /// with the same inputs.
    Factory(Arc<FactoryFn>, String),
}

impl EndpointStrategy {
    /// Creates a static strategy, validating that the URL uses `http` or
    /// `https`.
    pub fn static_url(url: impl Into<String>) -> Result<Self, ApiError> {
        let url = url.into();
        match Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                Ok(EndpointStrategy::Static(url))
            }
            _ => Err(ApiError::invalid_url(url)),
        }
    }

    pub fn custom(
        description: impl Into<String>,
        f: impl Fn(&str, Option<&Region>) -> String + Send + Sync + 'static,
    ) -> Self {
        EndpointStrategy::Custom(Arc::new(f), description.into())
    }

    pub fn factory(
        description: impl Into<String>,
        f: impl Fn(&str, Option<&Region>) -> EndpointStrategy + Send + Sync + 'static,
    ) -> Self {
        EndpointStrategy::Factory(Arc::new(f), description.into())
    }

    /// Resolves the endpoint URL for a service and an optional region.
    pub fn resolve(&self, service: &str, region: Option<&Region>) -> String {
        match self {
            EndpointStrategy::Service => match region {
                Some(r) => regional_url(service, r),
                None => global_url(service),
            },
            EndpointStrategy::Global => match region {
                Some(r) if r.kind() != RegionKind::Global => regional_url(service, r),
                _ => global_url(service),
            },
            EndpointStrategy::Regional(r) => regional_url(service, r),
            EndpointStrategy::Static(url) => url.clone(),
            EndpointStrategy::Custom(f, _) => f(service, region),
            EndpointStrategy::Factory(f, _) => f(service, region).resolve(service, region),
        }
    }

    pub fn description(&self) -> String {
        match self {
            EndpointStrategy::Service => "per-service regional endpoint".to_string(),
            EndpointStrategy::Global => "global endpoint".to_string(),
            EndpointStrategy::Regional(r) => format!("endpoint pinned to {r}"),
            EndpointStrategy::Static(url) => format!("static endpoint {url}"),
            EndpointStrategy::Custom(_, d) | EndpointStrategy::Factory(_, d) => d.clone(),
        }
    }
}

impl fmt::Debug for EndpointStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EndpointStrategy")
            .field(&self.description())
            .finish()
    }
}

fn regional_url(service: &str, region: &Region) -> String {
    format!("https://{}.{}.{}", service, region.id(), DEFAULT_DOMAIN)
}

fn global_url(service: &str) -> String {
    format!("https://{}.{}", service, DEFAULT_DOMAIN)
}
