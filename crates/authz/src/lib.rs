//! Capability guard applied at the routing layer.
//!
//! The reference deployment runs every route open; this crate keeps that the
//! default while giving operators a switch: configure an API key and every
//! mutating request must present it. Reads stay open either way, so a
//! public storefront keeps working while writes are fenced.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

const API_KEY_HEADER: &str = "x-api-key";

/// What a request wants to do, derived from its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
}

impl Capability {
    pub fn of(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Capability::Read,
            _ => Capability::Write,
        }
    }
}

/// Access policy for the whole route surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    /// No key configured: everything is open.
    Open,
    /// Writes must present this key in the `x-api-key` header.
    ApiKey(String),
}

impl AccessPolicy {
    pub fn from_key(api_key: Option<String>) -> Self {
        match api_key {
            Some(key) if !key.is_empty() => AccessPolicy::ApiKey(key),
            _ => AccessPolicy::Open,
        }
    }

    /// Whether a request with these headers may exercise the capability.
    pub fn allows(&self, capability: Capability, headers: &HeaderMap) -> bool {
        match self {
            AccessPolicy::Open => true,
            AccessPolicy::ApiKey(_) if capability == Capability::Read => true,
            AccessPolicy::ApiKey(key) => headers
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|presented| presented == key),
        }
    }
}

/// Axum middleware enforcing the policy. Wire with
/// `axum::middleware::from_fn_with_state`.
pub async fn capability_guard(
    State(policy): State<Arc<AccessPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let capability = Capability::of(request.method());
    if policy.allows(capability, request.headers()) {
        return next.run(request).await;
    }

    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "rejected request without valid api key"
    );

    let body = serde_json::json!({
        "error": {
            "code": "unauthorized",
            "message": "missing or invalid api key",
        }
    });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_key(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[test]
    fn open_policy_allows_everything() {
        let policy = AccessPolicy::from_key(None);
        assert_eq!(policy, AccessPolicy::Open);
        assert!(policy.allows(Capability::Write, &HeaderMap::new()));
    }

    #[test]
    fn empty_key_means_open() {
        assert_eq!(
            AccessPolicy::from_key(Some(String::new())),
            AccessPolicy::Open
        );
    }

    #[test]
    fn keyed_policy_keeps_reads_open() {
        let policy = AccessPolicy::from_key(Some("secret".to_string()));
        assert!(policy.allows(Capability::Read, &HeaderMap::new()));
    }

    #[test]
    fn keyed_policy_checks_writes() {
        let policy = AccessPolicy::from_key(Some("secret".to_string()));
        assert!(!policy.allows(Capability::Write, &HeaderMap::new()));
        assert!(!policy.allows(Capability::Write, &headers_with_key("wrong")));
        assert!(policy.allows(Capability::Write, &headers_with_key("secret")));
    }

    #[test]
    fn method_capability_mapping() {
        assert_eq!(Capability::of(&Method::GET), Capability::Read);
        assert_eq!(Capability::of(&Method::HEAD), Capability::Read);
        assert_eq!(Capability::of(&Method::POST), Capability::Write);
        assert_eq!(Capability::of(&Method::PUT), Capability::Write);
        assert_eq!(Capability::of(&Method::DELETE), Capability::Write);
    }
}
