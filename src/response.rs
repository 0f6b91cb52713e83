//! Response envelope decoding and service-error dispatch.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorContext, ErrorTaxonomy, COMMON_ERRORS};

/// Wire envelope: every response body is a JSON object with a single
/// top-level `Response` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    #[serde(rename = "Response")]
    pub response: T,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Error")]
    error: Option<ErrorContent>,
    #[serde(rename = "RequestId")]
    request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContent {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

/// Decodes a response body into the typed payload, dispatching service
/// errors through the taxonomy.
pub fn decode<T: DeserializeOwned>(
    status: StatusCode,
    headers: HeaderMap,
    body: &[u8],
    taxonomy: Option<&'static ErrorTaxonomy>,
) -> Result<T, ApiError> {
    if status != StatusCode::OK {
        return Err(ApiError::Raw {
            body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
            context: ErrorContext {
                request_id: None,
                message: "Unhandled Error".to_string(),
                status,
                headers,
            },
        });
    }

    let envelope: ResponseEnvelope<serde_json::Value> = serde_json::from_slice(body)?;

    if let Ok(probe) = serde_json::from_value::<ErrorEnvelope>(envelope.response.clone()) {
        if let Some(error) = probe.error {
            let context = ErrorContext {
                request_id: probe.request_id,
                message: error.message,
                status,
                headers,
            };
            return Err(interpret_error(&error.code, context, taxonomy));
        }
    }

    Ok(serde_json::from_value(envelope.response)?)
}

/// Probes the service taxonomy, then the platform-common one, falling back
/// to a raw service error for unrecognized codes. Typed errors are logged
/// here; everything else is logged by the executor.
fn interpret_error(
    code: &str,
    context: ErrorContext,
    taxonomy: Option<&'static ErrorTaxonomy>,
) -> ApiError {
    let context = match taxonomy {
        Some(taxonomy) => match taxonomy.interpret(code, context) {
            Ok(typed) => {
                tracing::error!(code = %typed.code(), request_id = ?typed.context().request_id, "service error: {typed}");
                return ApiError::Service(typed);
            }
            Err(context) => context,
        },
        None => context,
    };
    match COMMON_ERRORS.interpret(code, context) {
        Ok(typed) => {
            tracing::error!(code = %typed.code(), request_id = ?typed.context().request_id, "service error: {typed}");
            ApiError::Service(typed)
        }
        Err(context) => ApiError::RawService {
            code: code.to_string(),
            context,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommonServiceError, TypedServiceError};

    #[derive(Debug, Deserialize, PartialEq)]
    struct DescribeThingsResponse {
        #[serde(rename = "TotalCount")]
        total_count: u64,
        #[serde(rename = "RequestId")]
        request_id: String,
    }

    #[test]
    fn test_decodes_typed_payload() {
        let body = br#"{"Response":{"TotalCount":3,"RequestId":"req-1"}}"#;
        let decoded: DescribeThingsResponse =
            decode(StatusCode::OK, HeaderMap::new(), body, None).unwrap();
        assert_eq!(
            decoded,
            DescribeThingsResponse {
                total_count: 3,
                request_id: "req-1".to_string()
            }
        );
    }

    #[test]
    fn test_error_envelope_maps_to_common_error() {
        let body = br#"{"Response":{"Error":{"Code":"InternalError","Message":"boom"},"RequestId":"req-2"}}"#;
        let err = decode::<DescribeThingsResponse>(StatusCode::OK, HeaderMap::new(), body, None)
            .unwrap_err();
        match err {
            ApiError::Service(typed) => {
                assert_eq!(typed.code(), "InternalError");
                assert_eq!(typed.context().request_id.as_deref(), Some("req-2"));
            }
            other => panic!("expected typed service error, got {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_code_yields_raw_service_error() {
        let body = br#"{"Response":{"Error":{"Code":"Cvm.Weird","Message":"odd"},"RequestId":"req-3"}}"#;
        let err = decode::<DescribeThingsResponse>(StatusCode::OK, HeaderMap::new(), body, None)
            .unwrap_err();
        match err {
            ApiError::RawService { code, context } => {
                assert_eq!(code, "Cvm.Weird");
                assert_eq!(context.message, "odd");
            }
            other => panic!("expected raw service error, got {other:?}"),
        }
    }

    #[test]
    fn test_service_taxonomy_wins_over_common() {
        static CVM_ERRORS: ErrorTaxonomy = ErrorTaxonomy {
            description: "cvm errors",
            domains: &[],
            construct: |code, context| {
                (code == "InvalidInstanceId").then(|| {
                    Box::new(CommonServiceError {
                        code: crate::error::CommonErrorCode::ResourceNotFound,
                        context,
                    }) as Box<dyn TypedServiceError>
                })
            },
        };
        let body = br#"{"Response":{"Error":{"Code":"InvalidInstanceId","Message":"gone"},"RequestId":"r"}}"#;
        let err = decode::<DescribeThingsResponse>(
            StatusCode::OK,
            HeaderMap::new(),
            body,
            Some(&CVM_ERRORS),
        )
        .unwrap_err();
        assert_eq!(err.service_code(), Some("ResourceNotFound"));
    }

    #[test]
    fn test_non_200_yields_raw_error() {
        let err = decode::<DescribeThingsResponse>(
            StatusCode::BAD_GATEWAY,
            HeaderMap::new(),
            b"<html>bad gateway</html>",
            None,
        )
        .unwrap_err();
        match err {
            ApiError::Raw { body, context } => {
                assert_eq!(body.as_deref(), Some("<html>bad gateway</html>"));
                assert_eq!(context.message, "Unhandled Error");
                assert_eq!(context.status, StatusCode::BAD_GATEWAY);
            }
            other => panic!("expected raw error, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_body_is_a_decoding_error() {
        let err =
            decode::<DescribeThingsResponse>(StatusCode::OK, HeaderMap::new(), b"not json", None)
                .unwrap_err();
        assert!(matches!(err, ApiError::Decoding(_)));
    }
}
