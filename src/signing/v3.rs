//! TC3-HMAC-SHA256 signing for per-service API requests.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use url::Url;

use crate::credential::Credential;
use crate::error::ApiError;
use crate::signing::{hmac_sha256, hmac_sha256_hex, sha256_hex, SigningBody, SigningMode};

const ALGORITHM: &str = "TC3-HMAC-SHA256";
const REQUEST_CLIENT: &str = "Teco";
const TOKEN_HEADER: &str = "x-tc-token";
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Headers never included in the signed set. The session token header is
/// excluded so that its presence does not change the signature.
const UNSIGNABLE_HEADERS: &[&str] = &[
    "authorization",
    "content-length",
    "expect",
    "user-agent",
    TOKEN_HEADER,
];

/// Signs requests with the TC3-HMAC-SHA256 scheme.
#[derive(Debug, Clone)]
pub struct V3Signer {
    credential: Credential,
    service: String,
}

impl V3Signer {
    pub fn new(credential: Credential, service: impl Into<String>) -> Self {
        Self {
            credential,
            service: service.into(),
        }
    }

    /// Returns the request headers augmented with the `authorization` header
    /// and the common signing headers.
    ///
    /// With `omit_session_token`, the session token header is attached after
    /// signing; the signature itself never covers it.
    #[allow(clippy::too_many_arguments)]
    pub fn sign_headers(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: &SigningBody<'_>,
        mode: SigningMode,
        omit_session_token: bool,
        date: OffsetDateTime,
    ) -> Result<HeaderMap, ApiError> {
        let parsed = Url::parse(url).map_err(|_| ApiError::invalid_url(url))?;
        let host = match parsed.host_str() {
            Some(host) => match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            },
            None => return Err(ApiError::invalid_url(url)),
        };

        if mode != SigningMode::Skip && self.credential.is_empty() {
            return Err(ApiError::EmptyCredential);
        }

        let timestamp = date.unix_timestamp();
        let body_hash = body.hash();

        let mut headers = headers.clone();
        headers.insert("host", header_value(&host));
        headers.insert("x-tc-requestclient", HeaderValue::from_static(REQUEST_CLIENT));
        headers.insert("x-tc-timestamp", header_value(&timestamp.to_string()));
        headers.insert("x-tc-content-sha256", header_value(&body_hash));

        if mode == SigningMode::Skip {
            headers.insert("authorization", HeaderValue::from_static("SKIP"));
            return Ok(headers);
        }

        match &self.credential.token {
            Some(token) if !omit_session_token => {
                headers.insert(TOKEN_HEADER, header_value(token));
            }
            _ => {
                headers.remove(TOKEN_HEADER);
            }
        }

        let (canonical_headers, signed_headers) = canonical_header_set(&headers, mode);

        let path = match parsed.path() {
            "" => "/",
            path => path,
        };
        // The query string is signed exactly as given, never re-encoded.
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            path,
            parsed.query().unwrap_or(""),
            canonical_headers,
            signed_headers,
            body_hash
        );

        let date_string = date.format(DATE_FORMAT).expect("date format");
        let credential_scope = format!("{}/{}/tc3_request", date_string, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            timestamp,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let secret_date = hmac_sha256(
            format!("TC3{}", self.credential.secret_key).as_bytes(),
            date_string.as_bytes(),
        );
        let secret_service = hmac_sha256(&secret_date, self.service.as_bytes());
        let secret_signing = hmac_sha256(&secret_service, b"tc3_request");
        let signature = hmac_sha256_hex(&secret_signing, string_to_sign.as_bytes());

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.credential.secret_id, credential_scope, signed_headers, signature
        );
        headers.insert("authorization", header_value(&authorization));

        if omit_session_token {
            if let Some(token) = &self.credential.token {
                headers.insert(TOKEN_HEADER, header_value(token));
            }
        }

        Ok(headers)
    }
}

/// Lowercases, trims, sorts and joins the signable headers.
fn canonical_header_set(headers: &HeaderMap, mode: SigningMode) -> (String, String) {
    let mut entries: Vec<(String, String)> = headers
        .keys()
        .filter_map(|name| {
            let name = name.as_str().to_lowercase();
            let keep = match mode {
                SigningMode::Minimal => name == "content-type" || name == "host",
                _ => !UNSIGNABLE_HEADERS.contains(&name.as_str()),
            };
            if !keep {
                return None;
            }
            let value = headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .trim()
                .to_lowercase();
            Some((name, value))
        })
        .collect();
    entries.sort();

    let canonical = entries
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();
    let signed = entries
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    (canonical, signed)
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::CONTENT_TYPE;

    fn date() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_000_000_000).unwrap()
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_minimal_post_signature() {
        let signer = V3Signer::new(
            Credential::new("MY_TC_SECRET_ID", "MY_TC_SECRET_KEY"),
            "cvm",
        );
        let signed = signer
            .sign_headers(
                &Method::POST,
                "https://cvm.tencentcloudapi.com",
                &json_headers(),
                &SigningBody::Text("{}"),
                SigningMode::Minimal,
                false,
                date(),
            )
            .unwrap();

        assert_eq!(
            signed.get("authorization").unwrap().to_str().unwrap(),
            "TC3-HMAC-SHA256 Credential=MY_TC_SECRET_ID/2001-09-09/cvm/tc3_request, \
             SignedHeaders=content-type;host, \
             Signature=2c0b761dcdeacac29ac9d135f9f22b0fa52d4536d8b7727a8a515935c47eaea7"
        );
    }

    #[test]
    fn test_default_post_signature() {
        let signer = V3Signer::new(
            Credential::new("MY_TC_SECRET_ID", "MY_TC_SECRET_KEY"),
            "region",
        );
        let mut headers = json_headers();
        headers.insert("x-tc-action", HeaderValue::from_static("DescribeRegions"));
        headers.insert("x-tc-version", HeaderValue::from_static("2022-06-27"));

        let signed = signer
            .sign_headers(
                &Method::POST,
                "https://region.tencentcloudapi.com",
                &headers,
                &SigningBody::Text(r#"{"Product":"cvm"}"#),
                SigningMode::Default,
                false,
                date(),
            )
            .unwrap();

        let authorization = signed.get("authorization").unwrap().to_str().unwrap();
        assert!(authorization.contains(
            "SignedHeaders=content-type;host;x-tc-action;x-tc-content-sha256;\
             x-tc-requestclient;x-tc-timestamp;x-tc-version"
        ));
        assert!(authorization.ends_with(
            "Signature=2e9e6e2b803969ee22aa7297daa305cde69b30bc0720f3cf779cf69efa6f42cb"
        ));
    }

    #[test]
    fn test_skip_mode_sets_sentinel() {
        let signer = V3Signer::new(Credential::new("", ""), "cvm");
        let signed = signer
            .sign_headers(
                &Method::POST,
                "https://cvm.tencentcloudapi.com",
                &json_headers(),
                &SigningBody::None,
                SigningMode::Skip,
                false,
                date(),
            )
            .unwrap();
        assert_eq!(signed.get("authorization").unwrap(), "SKIP");
        assert!(signed.get("x-tc-token").is_none());
    }

    #[test]
    fn test_omit_session_token_does_not_change_signature() {
        let signer = V3Signer::new(
            Credential::with_token("MY_TC_SECRET_ID", "MY_TC_SECRET_KEY", "session"),
            "cvm",
        );
        let sign = |omit| {
            signer
                .sign_headers(
                    &Method::POST,
                    "https://cvm.tencentcloudapi.com",
                    &json_headers(),
                    &SigningBody::Text("{}"),
                    SigningMode::Default,
                    omit,
                    date(),
                )
                .unwrap()
        };
        let with_token = sign(false);
        let omitted = sign(true);

        assert_eq!(
            with_token.get("authorization").unwrap(),
            omitted.get("authorization").unwrap()
        );
        assert_eq!(with_token.get("x-tc-token").unwrap(), "session");
        assert_eq!(omitted.get("x-tc-token").unwrap(), "session");
    }

    #[test]
    fn test_empty_credential_is_an_error() {
        let signer = V3Signer::new(Credential::new("", ""), "cvm");
        let result = signer.sign_headers(
            &Method::POST,
            "https://cvm.tencentcloudapi.com",
            &json_headers(),
            &SigningBody::None,
            SigningMode::Default,
            false,
            date(),
        );
        assert!(matches!(result, Err(ApiError::EmptyCredential)));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let signer = V3Signer::new(Credential::new("id", "key"), "cvm");
        let result = signer.sign_headers(
            &Method::POST,
            "not a url",
            &json_headers(),
            &SigningBody::None,
            SigningMode::Default,
            false,
            date(),
        );
        assert!(matches!(result, Err(ApiError::InvalidUrl { .. })));
    }

    #[test]
    fn test_non_default_port_is_part_of_host() {
        let signer = V3Signer::new(Credential::new("id", "key"), "cvm");
        let signed = signer
            .sign_headers(
                &Method::POST,
                "http://localhost:8080/path",
                &json_headers(),
                &SigningBody::None,
                SigningMode::Minimal,
                false,
                date(),
            )
            .unwrap();
        assert_eq!(signed.get("host").unwrap(), "localhost:8080");

        let default_port = signer
            .sign_headers(
                &Method::POST,
                "https://cvm.tencentcloudapi.com:443/",
                &json_headers(),
                &SigningBody::None,
                SigningMode::Minimal,
                false,
                date(),
            )
            .unwrap();
        assert_eq!(default_port.get("host").unwrap(), "cvm.tencentcloudapi.com");
    }
}
