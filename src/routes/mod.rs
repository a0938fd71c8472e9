//! HTTP routes for Covenant
//!
//! Handlers take the already-buffered body and the request head; reading
//! and size-limiting the body happens once in `server::http`.

pub mod auth_routes;
pub mod health;
pub mod oidc;
pub mod permits;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE, COOKIE};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::server::BoxBody;
use crate::types::CovenantError;

pub use auth_routes::{login, logout, refresh, register};
pub use health::{health_check, readiness_check, version_info};
pub use oidc::{authorize_submit, authorize_validate, jwks, token, userinfo};
pub use permits::{can_transition, confirm_permit, issue_permit, query_proofs};

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type, Authorization, X-Request-Id"),
    );
    response
}

/// JSON error envelope with the error's status
pub fn error_response(err: CovenantError) -> Response<BoxBody> {
    let (status, body) = err.into_status_code_and_body();
    json_response(status, &body)
}

pub fn preflight_response() -> Response<BoxBody> {
    let mut response = json_response(StatusCode::NO_CONTENT, &());
    *response.body_mut() = empty_body();
    response.headers_mut().remove(CONTENT_TYPE);
    response
        .headers_mut()
        .insert("Access-Control-Max-Age", HeaderValue::from_static("86400"));
    response
}

pub(crate) fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub(crate) fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Deserialize a JSON body; an empty body reads as `{}`
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, CovenantError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        &body[..]
    };
    serde_json::from_slice(raw)
        .map_err(|e| CovenantError::InvalidRequest(format!("Invalid JSON: {}", e)))
}

/// Deserialize a JSON or `application/x-www-form-urlencoded` body
pub(crate) fn parse_json_or_form<T: DeserializeOwned>(
    parts: &Parts,
    body: &Bytes,
) -> Result<T, CovenantError> {
    if content_type(parts).starts_with("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| CovenantError::InvalidRequest(format!("Invalid form body: {}", e)))
    } else {
        parse_json(body)
    }
}

pub(crate) fn parse_query<T: DeserializeOwned>(parts: &Parts) -> Result<T, CovenantError> {
    serde_urlencoded::from_str(parts.uri.query().unwrap_or(""))
        .map_err(|e| CovenantError::InvalidRequest(format!("Invalid query: {}", e)))
}

pub(crate) fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn content_type(parts: &Parts) -> String {
    header(parts, CONTENT_TYPE.as_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Value of the named cookie across all `Cookie` headers
pub(crate) fn read_cookie(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Whether the edge proxy saw HTTPS
pub(crate) fn forwarded_https(parts: &Parts) -> bool {
    header(parts, "x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Request;
    use serde::Deserialize;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/x?a=1&b=two");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct Pair {
        a: String,
        b: String,
    }

    #[test]
    fn test_read_cookie() {
        let p = parts(&[("cookie", "theme=dark; hos_refresh=abc.def; other=1")]);
        assert_eq!(read_cookie(&p, "hos_refresh").as_deref(), Some("abc.def"));
        assert!(read_cookie(&p, "missing").is_none());
        assert!(read_cookie(&parts(&[]), "hos_refresh").is_none());
    }

    #[test]
    fn test_forwarded_https() {
        assert!(forwarded_https(&parts(&[("x-forwarded-proto", "https")])));
        assert!(forwarded_https(&parts(&[("x-forwarded-proto", "HTTPS, http")])));
        assert!(!forwarded_https(&parts(&[("x-forwarded-proto", "http")])));
        assert!(!forwarded_https(&parts(&[])));
    }

    #[test]
    fn test_body_parsers() {
        let empty: Pair = parse_json(&Bytes::new()).unwrap();
        assert_eq!(empty.a, "");

        let form = parts(&[("content-type", "application/x-www-form-urlencoded")]);
        let pair: Pair = parse_json_or_form(&form, &Bytes::from("a=x&b=y%20z")).unwrap();
        assert_eq!((pair.a.as_str(), pair.b.as_str()), ("x", "y z"));

        let json = parts(&[("content-type", "application/json")]);
        let pair: Pair = parse_json_or_form(&json, &Bytes::from(r#"{"a":"1"}"#)).unwrap();
        assert_eq!(pair.a, "1");

        assert!(matches!(
            parse_json::<Pair>(&Bytes::from("{not json")),
            Err(CovenantError::InvalidRequest(_))
        ));

        let query: Pair = parse_query(&parts(&[])).unwrap();
        assert_eq!(query.b, "two");
    }
}
