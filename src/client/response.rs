//! Buffered HTTP response

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::error::ApiError;

/// A fully read response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Body as UTF-8, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::Decode(format!("HTTP {}: {}", self.status, e)))
    }

    /// Converts a non-success response into the matching error
    pub(crate) fn into_error(self) -> ApiError {
        let body = self.text();
        if self.status == StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized { body }
        } else {
            ApiError::Status {
                status: self.status,
                body,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Dashboard {
        readiness: u32,
    }

    #[test]
    fn test_json_decode() {
        let response = ApiResponse::new(StatusCode::OK, r#"{"readiness": 72}"#);
        assert!(response.is_success());
        assert_eq!(response.json::<Dashboard>().unwrap(), Dashboard { readiness: 72 });
    }

    #[test]
    fn test_json_decode_error() {
        let response = ApiResponse::new(StatusCode::OK, "not json");
        assert!(matches!(response.json::<Dashboard>(), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_into_error() {
        let unauthorized = ApiResponse::new(StatusCode::UNAUTHORIZED, "nope").into_error();
        assert!(matches!(unauthorized, ApiError::Unauthorized { ref body } if body == "nope"));

        let server = ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom").into_error();
        assert!(matches!(
            server,
            ApiError::Status { status: StatusCode::INTERNAL_SERVER_ERROR, .. }
        ));
    }
}
