//! JSON response building shared by the API handlers and the dispatcher.

use http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;

use crate::core::ApiError;

/// Standard content types
pub mod content_type {
    pub const APPLICATION_JSON: &str = "application/json";
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Build a JSON response with the given status
    pub fn json<T: Serialize>(status: StatusCode, data: &T) -> Response<Vec<u8>> {
        match serde_json::to_vec(data) {
            Ok(body) => Self::with_body(status, body),
            Err(e) => {
                log::error!("Failed to serialize JSON response: {e}");
                Self::error_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "JSON serialization failed",
                )
            }
        }
    }

    /// Build a 200 JSON response, used for every successful call
    pub fn success_json<T: Serialize>(data: &T) -> Response<Vec<u8>> {
        Self::json(StatusCode::OK, data)
    }

    /// Build an `{"error": message}` response
    pub fn error_json(status: StatusCode, message: &str) -> Response<Vec<u8>> {
        let body = serde_json::to_vec(&ErrorBody { error: message })
            .unwrap_or_else(|_| br#"{"error":"Internal Server Error"}"#.to_vec());
        Self::with_body(status, body)
    }

    pub fn from_error(err: &ApiError) -> Response<Vec<u8>> {
        Self::error_json(err.status(), &err.message())
    }

    /// Build a bodiless response, used for preflight answers
    pub fn empty(status: StatusCode) -> Response<Vec<u8>> {
        let mut response = Response::new(Vec::new());
        *response.status_mut() = status;
        response
    }

    fn with_body(status: StatusCode, body: Vec<u8>) -> Response<Vec<u8>> {
        let mut response = Response::new(body);
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type::APPLICATION_JSON),
        );
        response
    }
}
