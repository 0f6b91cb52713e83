//! Legacy query-parameter signing (`HmacSHA1` / `HmacSHA256`).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use reqwest::Method;
use time::OffsetDateTime;

use crate::credential::Credential;
use crate::error::ApiError;
use crate::signing::{hmac_sha1, hmac_sha256, RFC3986};

/// HTML form encoding keeps the space literal so it can be turned into `+`
/// after percent-encoding.
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b' ');

/// Digest used for the V1 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum V1Algorithm {
    #[default]
    HmacSha1,
    HmacSha256,
}

impl V1Algorithm {
    fn name(&self) -> &'static str {
        match self {
            V1Algorithm::HmacSha1 => "HmacSHA1",
            V1Algorithm::HmacSha256 => "HmacSHA256",
        }
    }
}

/// Signs requests with the legacy URL-parameter scheme.
#[derive(Debug, Clone)]
pub struct V1Signer {
    credential: Credential,
}

impl V1Signer {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// Returns the full query item list, signature included, sorted
    /// ascending by name.
    #[allow(clippy::too_many_arguments)]
    pub fn sign_query_items(
        &self,
        host: &str,
        path: &str,
        items: &[(String, String)],
        method: &Method,
        algorithm: V1Algorithm,
        omit_session_token: bool,
        nonce: Option<u32>,
        date: OffsetDateTime,
    ) -> Result<Vec<(String, String)>, ApiError> {
        if self.credential.is_empty() {
            return Err(ApiError::EmptyCredential);
        }

        let nonce = nonce.unwrap_or_else(|| rand::thread_rng().gen_range(0..=i32::MAX as u32));

        let mut items: Vec<(String, String)> = items
            .iter()
            .filter(|(name, _)| name != "Signature")
            .cloned()
            .collect();
        set_item(&mut items, "Timestamp", date.unix_timestamp().to_string());
        set_item(&mut items, "Nonce", nonce.to_string());
        set_item(&mut items, "SecretId", self.credential.secret_id.clone());
        if algorithm == V1Algorithm::HmacSha1 {
            items.retain(|(name, _)| name != "SignatureMethod");
        } else {
            set_item(&mut items, "SignatureMethod", algorithm.name().to_string());
        }

        let mut deferred_token = None;
        if let Some(token) = &self.credential.token {
            if omit_session_token {
                deferred_token = Some(token.clone());
            } else {
                set_item(&mut items, "Token", token.clone());
            }
        }

        items.sort();
        // Values enter the signature original string unencoded.
        let joined = items
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let original = format!("{}{}{}?{}", method.as_str(), host, path, joined);

        let digest = match algorithm {
            V1Algorithm::HmacSha1 => {
                hmac_sha1(self.credential.secret_key.as_bytes(), original.as_bytes())
            }
            V1Algorithm::HmacSha256 => {
                hmac_sha256(self.credential.secret_key.as_bytes(), original.as_bytes())
            }
        };
        items.push(("Signature".to_string(), BASE64.encode(digest)));
        if let Some(token) = deferred_token {
            items.push(("Token".to_string(), token));
        }
        items.sort();

        Ok(items)
    }

    /// Renders the signed items as an RFC 3986 query string, for GET
    /// requests.
    #[allow(clippy::too_many_arguments)]
    pub fn signed_query_string(
        &self,
        host: &str,
        path: &str,
        items: &[(String, String)],
        algorithm: V1Algorithm,
        omit_session_token: bool,
        nonce: Option<u32>,
        date: OffsetDateTime,
    ) -> Result<String, ApiError> {
        let items = self.sign_query_items(
            host,
            path,
            items,
            &Method::GET,
            algorithm,
            omit_session_token,
            nonce,
            date,
        )?;
        Ok(encode_items(&items, RFC3986, false))
    }

    /// Renders the signed items as an HTML form body, for POST requests.
    #[allow(clippy::too_many_arguments)]
    pub fn signed_body(
        &self,
        host: &str,
        path: &str,
        items: &[(String, String)],
        algorithm: V1Algorithm,
        omit_session_token: bool,
        nonce: Option<u32>,
        date: OffsetDateTime,
    ) -> Result<String, ApiError> {
        let items = self.sign_query_items(
            host,
            path,
            items,
            &Method::POST,
            algorithm,
            omit_session_token,
            nonce,
            date,
        )?;
        Ok(encode_items(&items, FORM, true))
    }
}

fn set_item(items: &mut Vec<(String, String)>, name: &str, value: String) {
    match items.iter_mut().find(|(n, _)| n == name) {
        Some(entry) => entry.1 = value,
        None => items.push((name.to_string(), value)),
    }
}

fn encode_items(items: &[(String, String)], set: &'static AsciiSet, form: bool) -> String {
    let encode = |s: &str| {
        let encoded = utf8_percent_encode(s, set).to_string();
        if form {
            encoded.replace(' ', "+")
        } else {
            encoded
        }
    };
    items
        .iter()
        .map(|(name, value)| format!("{}={}", encode(name), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
