//! Canonical request construction.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::region::Region;

pub(crate) const SDK_USER_AGENT: &str = "Teco/0.1";

/// A fully composed request, ready for signing and dispatch.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub region: Option<Region>,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Builds the request envelope for an action, attaching the common
/// parameter headers. Signing happens later and only touches
/// `authorization`, `host` and the `x-tc-*` headers.
pub fn build_request<T: Serialize>(
    action: &str,
    path: &str,
    region: Option<&Region>,
    method: Method,
    input: Option<&T>,
    config: &ServiceConfig,
) -> Result<RequestEnvelope, ApiError> {
    let endpoint = config.endpoint_for(region);
    let full = format!("{endpoint}{path}");
    let url = Url::parse(&full).map_err(|_| ApiError::invalid_url(&full))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ApiError::invalid_url(&full));
    }

    let body = match input {
        Some(input) => Some(serde_json::to_vec(input)?),
        None => None,
    };

    let mut headers = HeaderMap::new();
    headers.insert("x-tc-action", header_value(action));
    headers.insert("x-tc-version", header_value(config.version()));
    // The explicit call-site region wins over the configured default.
    if let Some(region) = region.or_else(|| config.configured_region()) {
        headers.insert("x-tc-region", header_value(region.id()));
    }
    if let Some(language) = config.configured_language() {
        headers.insert("x-tc-language", HeaderValue::from_static(language.as_str()));
    }
    headers.insert(USER_AGENT, HeaderValue::from_static(SDK_USER_AGENT));
    if method == Method::POST {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    } else if method == Method::GET {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
    }

    Ok(RequestEnvelope {
        region: region.cloned(),
        url,
        method,
        headers,
        body,
    })
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap()
}
