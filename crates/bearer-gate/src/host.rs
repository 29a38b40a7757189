//! The capabilities a host HTTP stack lends to the engine.
//!
//! The engine never touches framework types. A host integration implements
//! [`HostRequest`] and [`HostResponse`]; implementations for the `http` crate's
//! `Request`/`Response` are provided.

use std::sync::Arc;

use http::{HeaderName, HeaderValue, StatusCode};
use tracing::warn;

use crate::verifier::VerifiedToken;

/// Read access to a request plus a slot for the verified token.
pub trait HostRequest {
    /// All values of header `name`, in order. Missing header: empty.
    fn header_values(&self, name: &str) -> Vec<String>;

    /// The request path, without query string.
    fn path(&self) -> String;

    /// Attach the verified token under attribute `name` for downstream handlers.
    fn set_attribute(&mut self, name: &str, token: Arc<VerifiedToken>);
}

/// Write access to a response.
pub trait HostResponse {
    /// Set the status code.
    fn set_status(&mut self, status: u16);

    /// Append a header.
    fn add_header(&mut self, name: &str, value: &str);
}

/// The verified token as stored in `http::Extensions`.
#[derive(Debug, Clone)]
pub struct TokenAttribute {
    /// Attribute name it was stored under.
    pub name: String,
    /// The token.
    pub token: Arc<VerifiedToken>,
}

impl<B> HostRequest for http::Request<B> {
    fn header_values(&self, name: &str) -> Vec<String> {
        self.headers()
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect()
    }

    fn path(&self) -> String {
        self.uri().path().to_string()
    }

    fn set_attribute(&mut self, name: &str, token: Arc<VerifiedToken>) {
        self.extensions_mut().insert(TokenAttribute {
            name: name.to_string(),
            token,
        });
    }
}

impl<B> HostResponse for http::Response<B> {
    fn set_status(&mut self, status: u16) {
        *self.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    }

    fn add_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "dropping response header that is not valid HTTP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn http_request_exposes_headers_in_order() {
        let req = http::Request::builder()
            .uri("/orders/7?verbose=1")
            .header("X-Token", "one")
            .header("X-Token", "two")
            .body(())
            .unwrap();
        assert_eq!(req.header_values("x-token"), vec!["one", "two"]);
        assert!(req.header_values("Authorization").is_empty());
        assert_eq!(HostRequest::path(&req), "/orders/7");
    }

    #[test]
    fn non_ascii_header_values_are_kept() {
        let mut req = http::Request::new(());
        req.headers_mut().insert(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_bytes(b"Bearer \xfftoken").unwrap(),
        );
        assert_eq!(req.header_values("authorization"), vec!["Bearer \u{FFFD}token"]);
    }

    #[test]
    fn attribute_lands_in_extensions() {
        let mut req = http::Request::new(());
        let token = Arc::new(VerifiedToken::from_claims_value("raw", json!({"sub": "a"})).unwrap());
        req.set_attribute("verified_token", token);
        let attr = req.extensions().get::<TokenAttribute>().unwrap();
        assert_eq!(attr.name, "verified_token");
        assert_eq!(attr.token.sub(), Some("a"));
    }

    #[test]
    fn http_response_takes_status_and_headers() {
        let mut resp = http::Response::new(());
        resp.set_status(401);
        resp.add_header("WWW-Authenticate", r#"Bearer realm="x""#);
        resp.add_header("bad header", "v");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers().len(), 1);
        assert_eq!(resp.headers()["www-authenticate"], r#"Bearer realm="x""#);
    }
}
