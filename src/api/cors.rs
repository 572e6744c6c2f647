use http::{header, HeaderValue, Response, StatusCode};

use crate::{config::Cors, utils::response::ResponseBuilder};

/// The `Access-Control-Allow-Origin` value for a request, if any.
///
/// With a `*` config every origin is allowed; otherwise the request origin is
/// echoed back only when it is listed.
fn allow_origin<'a>(cors: &'a Cors, origin: Option<&'a str>) -> Option<&'a str> {
    if cors.allow_origins.trim() == "*" {
        return Some("*");
    }

    let origin = origin?;
    cors.allow_origins
        .split(',')
        .map(str::trim)
        .any(|allowed| allowed == origin)
        .then_some(origin)
}

pub(super) fn apply(cors: &Cors, origin: Option<&str>, response: &mut Response<Vec<u8>>) {
    let Some(allowed) = allow_origin(cors, origin) else {
        return;
    };

    match HeaderValue::from_str(allowed) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        Err(e) => {
            log::error!("Invalid origin '{allowed}': {e}");
            return;
        }
    }

    if allowed != "*" {
        response
            .headers_mut()
            .insert(header::VARY, HeaderValue::from_static("Origin"));
    }
}

/// Answer to an `OPTIONS` request. The origin header is added by [`apply`].
pub(super) fn preflight(cors: &Cors) -> Response<Vec<u8>> {
    let mut response = ResponseBuilder::empty(StatusCode::NO_CONTENT);
    let headers = response.headers_mut();
    let max_age = cors.max_age.to_string();

    for (name, value) in [
        (header::ACCESS_CONTROL_ALLOW_METHODS, cors.allow_methods.as_str()),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, cors.allow_headers.as_str()),
        (header::ACCESS_CONTROL_MAX_AGE, max_age.as_str()),
    ] {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(e) => log::error!("Invalid CORS header {name}: {e}"),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed() -> Cors {
        Cors {
            allow_origins: "http://a.test, http://b.test".to_string(),
            ..Cors::default()
        }
    }

    #[test]
    fn test_allow_any_origin() {
        let cors = Cors::default();
        assert_eq!(allow_origin(&cors, None), Some("*"));
        assert_eq!(allow_origin(&cors, Some("http://x.test")), Some("*"));
    }

    #[test]
    fn test_allow_listed_origin() {
        let cors = listed();
        assert_eq!(
            allow_origin(&cors, Some("http://b.test")),
            Some("http://b.test")
        );
        assert_eq!(allow_origin(&cors, Some("http://c.test")), None);
        assert_eq!(allow_origin(&cors, None), None);
    }

    #[test]
    fn test_apply_sets_vary_for_listed_origin() {
        let mut response = ResponseBuilder::empty(StatusCode::OK);
        apply(&listed(), Some("http://a.test"), &mut response);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://a.test"
        );
        assert_eq!(response.headers()[header::VARY], "Origin");

        let mut response = ResponseBuilder::empty(StatusCode::OK);
        apply(&listed(), Some("http://evil.test"), &mut response);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[test]
    fn test_preflight_headers() {
        let response = preflight(&Cors::default());
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET,POST,PUT,DELETE,OPTIONS"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "5");
        assert!(response.body().is_empty());
    }
}
