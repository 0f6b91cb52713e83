use std::time::Duration;

use crate::endpoint::EndpointStrategy;
use crate::error::ErrorTaxonomy;
use crate::region::Region;

/// Default per-attempt request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Response language requested through `X-TC-Language`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    ZhCn,
    EnUs,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::ZhCn => "zh-CN",
            Language::EnUs => "en-US",
        }
    }
}

/// Immutable per-service bundle consumed by the request pipeline.
///
/// The endpoint for the configured region is precomputed at construction so
/// per-call resolution without a region override is a plain clone.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    service: String,
    version: String,
    region: Option<Region>,
    language: Option<Language>,
    endpoint: EndpointStrategy,
    default_endpoint: String,
    error_taxonomy: Option<&'static ErrorTaxonomy>,
    timeout: Duration,
}

/// A set of overrides applied with [`ServiceConfig::patched`].
#[derive(Debug, Default)]
pub struct ServiceConfigPatch {
    pub region: Option<Region>,
    pub language: Option<Language>,
    pub endpoint: Option<EndpointStrategy>,
    pub error_taxonomy: Option<&'static ErrorTaxonomy>,
    pub timeout: Option<Duration>,
}

impl ServiceConfig {
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        let service = service.into();
        let endpoint = EndpointStrategy::Service;
        let default_endpoint = endpoint.resolve(&service, None);
        Self {
            service,
            version: version.into(),
            region: None,
            language: None,
            endpoint,
            default_endpoint,
            error_taxonomy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self.recompute_default_endpoint();
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn endpoint(mut self, endpoint: EndpointStrategy) -> Self {
        self.endpoint = endpoint;
        self.recompute_default_endpoint();
        self
    }

    pub fn error_taxonomy(mut self, taxonomy: &'static ErrorTaxonomy) -> Self {
        self.error_taxonomy = Some(taxonomy);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn recompute_default_endpoint(&mut self) {
        self.default_endpoint = self.endpoint.resolve(&self.service, self.region.as_ref());
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn configured_region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn configured_language(&self) -> Option<Language> {
        self.language
    }

    pub fn endpoint_strategy(&self) -> &EndpointStrategy {
        &self.endpoint
    }

    pub fn default_endpoint(&self) -> &str {
        &self.default_endpoint
    }

    pub fn taxonomy(&self) -> Option<&'static ErrorTaxonomy> {
        self.error_taxonomy
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves the endpoint for a call, preferring the explicit call-site
    /// region over the precomputed default.
    pub fn endpoint_for(&self, region: Option<&Region>) -> String {
        match region {
            Some(r) => self.endpoint.resolve(&self.service, Some(r)),
            None => self.default_endpoint.clone(),
        }
    }

    /// Derives a new configuration with the patch applied.
    ///
    /// The precomputed endpoint is carried over verbatim unless the patch
    /// changes the region or the endpoint strategy.
    pub fn patched(&self, patch: ServiceConfigPatch) -> Self {
        let recompute = patch.region.is_some() || patch.endpoint.is_some();
        let mut next = Self {
            service: self.service.clone(),
            version: self.version.clone(),
            region: patch.region.or_else(|| self.region.clone()),
            language: patch.language.or(self.language),
            endpoint: patch.endpoint.unwrap_or_else(|| self.endpoint.clone()),
            default_endpoint: self.default_endpoint.clone(),
            error_taxonomy: patch.error_taxonomy.or(self.error_taxonomy),
            timeout: patch.timeout.unwrap_or(self.timeout),
        };
        if recompute {
            next.recompute_default_endpoint();
        }
        next
    }
}
