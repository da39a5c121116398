//! Request extractors: caller identity and validated JSON bodies.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequest, Request},
    http::header,
};
use bastion_control_types::{CallerKey, Error, Validate, parse_validated, validation::codes};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

const API_KEY_HEADER: &str = "x-api-key";
const SESSION_COOKIE: &str = "session";

/// Extract the client IP address from a request.
///
/// Checks proxy headers first, then falls back to the TCP peer address:
/// 1. `X-Forwarded-For`: first IP in the comma-separated list
/// 2. `X-Real-IP`: single IP set by the reverse proxy
/// 3. `ConnectInfo<SocketAddr>`: TCP peer address (direct connection)
pub fn extract_client_ip(req: &Request) -> Option<String> {
    let headers = req.headers();

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

fn header_str<'a>(req: &'a Request, name: impl header::AsHeaderName) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn session_cookie(req: &Request) -> Option<&str> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

/// Resolve the identity used to key rate-limit buckets
///
/// An `X-API-Key` header wins, then a bearer token or `session` cookie, then
/// the client address. Secrets are digested by [`CallerKey`].
pub fn resolve_caller(req: &Request) -> CallerKey {
    if let Some(key) = header_str(req, API_KEY_HEADER) {
        return CallerKey::api_key(key);
    }

    let bearer = header_str(req, header::AUTHORIZATION).and_then(|v| {
        let (scheme, token) = v.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    });
    if let Some(token) = bearer.or_else(|| session_cookie(req)) {
        return CallerKey::session(token);
    }

    extract_client_ip(req).map(CallerKey::ip).unwrap_or_else(CallerKey::unknown)
}

/// JSON body that passed its type's [`Validate`] schema
///
/// Wrong content type and unparsable bodies are rejected as a single
/// validation entry at path `""`.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

fn is_json_content_type(req: &Request) -> bool {
    header_str(req, header::CONTENT_TYPE)
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: Validate + DeserializeOwned + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json_content_type(&req) {
            return Err(Error::invalid_field(
                "",
                codes::INVALID_JSON,
                "Expected request body with Content-Type: application/json",
            )
            .into());
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|_| {
            Error::invalid_field("", codes::INVALID_JSON, "Request body could not be read")
        })?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|_| Error::invalid_field("", codes::INVALID_JSON, "Malformed JSON body"))?;

        Ok(ValidatedJson(parse_validated(value)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use axum::{body::Body, http::Request};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/test");
        for (key, value) in headers {
            builder = builder.header(*key, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn request_with_connect_info(addr: SocketAddr) -> Request<Body> {
        let mut req = Request::builder().uri("/test").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn returns_x_forwarded_for_first_ip() {
        let req = request_with_headers(&[(
            "x-forwarded-for",
            "203.0.113.50, 70.41.3.18, 150.172.238.178",
        )]);
        assert_eq!(extract_client_ip(&req).as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn returns_x_forwarded_for_single_ip() {
        let req = request_with_headers(&[("x-forwarded-for", "203.0.113.50")]);
        assert_eq!(extract_client_ip(&req).as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn returns_x_real_ip_when_no_forwarded_for() {
        let req = request_with_headers(&[("x-real-ip", "198.51.100.42")]);
        assert_eq!(extract_client_ip(&req).as_deref(), Some("198.51.100.42"));
    }

    #[test]
    fn prefers_x_forwarded_for_over_x_real_ip() {
        let req = request_with_headers(&[
            ("x-forwarded-for", "203.0.113.50"),
            ("x-real-ip", "198.51.100.42"),
        ]);
        assert_eq!(extract_client_ip(&req).as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn falls_back_to_connect_info() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345);
        let req = request_with_connect_info(addr);
        assert_eq!(extract_client_ip(&req).as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn returns_none_without_any_source() {
        let req = request_with_headers(&[]);
        assert_eq!(extract_client_ip(&req), None);
    }

    #[test]
    fn skips_empty_forwarded_for() {
        let req = request_with_headers(&[("x-forwarded-for", "")]);
        assert_eq!(extract_client_ip(&req), None);
    }

    #[test]
    fn skips_empty_real_ip() {
        let req = request_with_headers(&[("x-real-ip", "  ")]);
        assert_eq!(extract_client_ip(&req), None);
    }

    #[test]
    fn trims_whitespace_from_forwarded_for() {
        let req = request_with_headers(&[("x-forwarded-for", "  203.0.113.50  , 70.41.3.18")]);
        assert_eq!(extract_client_ip(&req).as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn trims_whitespace_from_real_ip() {
        let req = request_with_headers(&[("x-real-ip", "  198.51.100.42  ")]);
        assert_eq!(extract_client_ip(&req).as_deref(), Some("198.51.100.42"));
    }

    #[test]
    fn prefers_headers_over_connect_info() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 12345);
        let mut req = request_with_headers(&[("x-forwarded-for", "203.0.113.50")]);
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(extract_client_ip(&req).as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn api_key_wins_over_everything() {
        let req = request_with_headers(&[
            ("x-api-key", "k-123"),
            ("authorization", "Bearer t-456"),
            ("x-forwarded-for", "203.0.113.50"),
        ]);
        let caller = resolve_caller(&req);
        assert!(caller.is_api_key());
        assert_eq!(caller, CallerKey::api_key("k-123"));
    }

    #[test]
    fn bearer_token_is_a_session() {
        let req = request_with_headers(&[("authorization", "Bearer t-456")]);
        assert_eq!(resolve_caller(&req), CallerKey::session("t-456"));
    }

    #[test]
    fn session_cookie_is_a_session() {
        let req = request_with_headers(&[("cookie", "theme=dark; session=s-789")]);
        assert_eq!(resolve_caller(&req), CallerKey::session("s-789"));
    }

    #[test]
    fn basic_auth_falls_through_to_ip() {
        let req = request_with_headers(&[
            ("authorization", "Basic dXNlcjpwYXNz"),
            ("x-real-ip", "198.51.100.42"),
        ]);
        assert_eq!(resolve_caller(&req).to_string(), "ip:198.51.100.42");
    }

    #[test]
    fn no_source_is_unknown() {
        let req = request_with_headers(&[]);
        assert_eq!(resolve_caller(&req).to_string(), "ip:unknown");
    }

    #[test]
    fn rendered_key_hides_the_secret() {
        let req = request_with_headers(&[("x-api-key", "super-secret-key")]);
        assert!(!resolve_caller(&req).to_string().contains("super-secret-key"));
    }

    #[derive(Debug, Deserialize)]
    struct Greeting {
        name: String,
    }

    impl Validate for Greeting {
        fn schema() -> Value {
            json!({
                "type": "object",
                "required": ["name"],
                "properties": { "name": { "type": "string", "minLength": 2 } }
            })
        }
    }

    fn json_request(content_type: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/test");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn validated_json_accepts_valid_body() {
        let req = json_request(Some("application/json; charset=utf-8"), r#"{"name":"ok"}"#);
        let ValidatedJson(greeting) = ValidatedJson::<Greeting>::from_request(req, &()).await.unwrap();
        assert_eq!(greeting.name, "ok");
    }

    #[tokio::test]
    async fn validated_json_rejects_wrong_content_type() {
        let req = json_request(Some("text/plain"), r#"{"name":"ok"}"#);
        let err = ValidatedJson::<Greeting>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.0.details()[0].field_path, "");
        assert_eq!(err.0.details()[0].code, codes::INVALID_JSON);
    }

    #[tokio::test]
    async fn validated_json_rejects_malformed_body() {
        let req = json_request(Some("application/json"), r#"{"name": "#);
        let err = ValidatedJson::<Greeting>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.0.error_code(), "VALIDATION_ERROR");
        assert_eq!(err.0.details()[0].code, codes::INVALID_JSON);
    }

    #[tokio::test]
    async fn validated_json_reports_schema_violations() {
        let req = json_request(Some("application/json"), r#"{"name":"x"}"#);
        let err = ValidatedJson::<Greeting>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.0.details()[0].field_path, "name");
        assert_eq!(err.0.details()[0].code, codes::TOO_SMALL);
    }
}
