// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bearer token lifecycle (OAuth2 JWT-bearer grant).
//!
//! ```text
//!            refresh() ok
//! NoToken ----------------> HasToken(exp)
//!                             |    ^
//!                             +----+ refresh() ok
//! ```
//!
//! A failed refresh leaves the previous state untouched, including a
//! stale token. The cached token is only ever replaced as a whole.

use crate::assertion::{sign_assertion, AssertionClaims, SigningKey};
use crate::http::{HttpBody, HttpExecutor, HttpRequest};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Refresh when fewer than this many seconds remain before `exp`.
pub const REFRESH_MARGIN_SECS: i64 = 30;

/// OAuth2 grant type for signed client assertions.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Token endpoint path, relative to the authorization server URL.
pub const TOKEN_PATH: &str = "connect/token";

/// Token acquisition errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Private key unusable or signing failed.
    #[error("signing failure: {0}")]
    SigningFailure(String),

    /// Authorization server unreachable, or its answer could not be decoded.
    #[error("token request failed: {0}")]
    TransportOrDecodeFailure(String),

    /// Authorization server rejected the assertion.
    #[error("{error}: {description}")]
    OAuthRejected { error: String, description: String },
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

/// Error body returned on a non-200 token response.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: f64,
}

/// Owns the signing key and the cached bearer token.
pub struct TokenManager {
    client_id: String,
    auth_url: String,
    scopes: Vec<String>,
    key: SigningKey,
    http: Arc<dyn HttpExecutor>,
    cached_token: Option<String>,
}

impl TokenManager {
    pub fn new(
        client_id: impl Into<String>,
        auth_url: impl Into<String>,
        scopes: Vec<String>,
        key: SigningKey,
        http: Arc<dyn HttpExecutor>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            auth_url: auth_url.into(),
            scopes,
            key,
            http,
            cached_token: None,
        }
    }

    /// Currently cached bearer token, if any.
    pub fn cached_token(&self) -> Option<&str> {
        self.cached_token.as_deref()
    }

    /// `{auth_url}/connect/token`.
    pub fn token_endpoint(&self) -> String {
        format!("{}/{}", self.auth_url.trim_end_matches('/'), TOKEN_PATH)
    }

    /// Whether the cached token must be replaced before use.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(unix_now())
    }

    /// [`needs_refresh`](Self::needs_refresh) against an explicit clock.
    pub fn needs_refresh_at(&self, now: u64) -> bool {
        let Some(token) = self.cached_token.as_deref() else {
            return true;
        };
        match token_expiry(token) {
            Some(exp) => i64::try_from(now)
                .ok()
                .and_then(|now| exp.checked_sub(now))
                .map_or(true, |left| left < REFRESH_MARGIN_SECS),
            None => {
                tracing::debug!("cached token has no readable exp claim");
                true
            }
        }
    }

    /// Exchange a fresh assertion for a new bearer token.
    pub fn refresh(&mut self) -> Result<(), AuthError> {
        self.refresh_at(unix_now())
    }

    /// [`refresh`](Self::refresh) with an explicit issue time.
    pub fn refresh_at(&mut self, now: u64) -> Result<(), AuthError> {
        let claims = AssertionClaims::new(
            &self.client_id,
            &self.auth_url,
            now,
            Uuid::new_v4().to_string(),
        );
        let assertion = sign_assertion(&claims, &self.key)?;

        let endpoint = self.token_endpoint();
        let request = HttpRequest::post(&endpoint).with_body(HttpBody::Form(vec![
            ("grant_type".into(), JWT_BEARER_GRANT.into()),
            ("assertion".into(), assertion),
            ("client_id".into(), self.client_id.clone()),
            ("scope".into(), self.scopes.join(" ")),
        ]));

        let response = self
            .http
            .execute(request)
            .map_err(|e| AuthError::TransportOrDecodeFailure(e.to_string()))?;

        if !response.is_ok() {
            return Err(match serde_json::from_slice::<OAuthErrorBody>(&response.body) {
                Ok(body) => {
                    tracing::warn!(
                        status = response.status,
                        error = %body.error,
                        "token request rejected"
                    );
                    AuthError::OAuthRejected {
                        error: body.error,
                        description: body.error_description,
                    }
                }
                Err(e) => AuthError::TransportOrDecodeFailure(format!(
                    "HTTP {} with unreadable body: {}",
                    response.status, e
                )),
            });
        }

        let token: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            AuthError::TransportOrDecodeFailure(format!("invalid token response: {}", e))
        })?;

        tracing::info!(
            client_id = %self.client_id,
            expires_in = token.expires_in,
            scope = %token.scope,
            "access token refreshed"
        );
        self.cached_token = Some(token.access_token);
        Ok(())
    }

    /// Attach bearer and JSON content-type headers, refreshing first if needed.
    pub fn authorize_outgoing(&mut self, request: &mut HttpRequest) -> Result<(), AuthError> {
        if self.needs_refresh() {
            self.refresh()?;
        }
        let token = self.cached_token.as_deref().ok_or_else(|| {
            AuthError::TransportOrDecodeFailure("no access token after refresh".into())
        })?;
        request.set_header("Authorization", format!("Bearer {}", token));
        request.set_header("Content-Type", "application/json");
        Ok(())
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("client_id", &self.client_id)
            .field("auth_url", &self.auth_url)
            .field("scopes", &self.scopes)
            .field("has_token", &self.cached_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Read the `exp` claim of a compact JWT without verifying its signature.
fn token_expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    // `as` saturates, so out-of-range values must be rejected first.
    if !claim.exp.is_finite() || claim.exp < i64::MIN as f64 || claim.exp >= i64::MAX as f64 {
        return None;
    }
    Some(claim.exp as i64)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, TransportError};
    use std::sync::Mutex;

    const PKCS8_PEM: &[u8] = include_bytes!("../tests/fixtures/rsa_pkcs8.pem");

    /// Replays canned responses and records requests.
    struct StubHttp {
        responses: Mutex<Vec<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubHttp {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpExecutor for StubHttp {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            assert!(!responses.is_empty(), "unexpected HTTP call");
            responses.remove(0)
        }
    }

    fn manager(http: Arc<StubHttp>) -> TokenManager {
        TokenManager::new(
            "dev-client",
            "https://auth.example",
            vec!["messaging.publish".into()],
            SigningKey::from_pem(PKCS8_PEM).unwrap(),
            http,
        )
    }

    /// Unsigned JWT-shaped token with the given expiry.
    fn jwt_with_exp(exp: u64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"dev","exp":{}}}"#, exp));
        format!("{}.{}.c2ln", header, payload)
    }

    fn ok_token(token: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(
            200,
            format!(
                r#"{{"access_token":"{}","token_type":"Bearer","expires_in":3600,"scope":"messaging.publish"}}"#,
                token
            ),
        ))
    }

    fn form_value<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
        match &request.body {
            HttpBody::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_fresh_manager_needs_refresh() {
        let m = manager(StubHttp::new(vec![]));
        assert!(m.cached_token().is_none());
        assert!(m.needs_refresh());
    }

    #[test]
    fn test_needs_refresh_boundary() {
        let now = 1_700_000_000;
        let mut m = manager(StubHttp::new(vec![]));

        m.cached_token = Some(jwt_with_exp(now + 29));
        assert!(m.needs_refresh_at(now));

        m.cached_token = Some(jwt_with_exp(now + 30));
        assert!(!m.needs_refresh_at(now));

        m.cached_token = Some(jwt_with_exp(now + 31));
        assert!(!m.needs_refresh_at(now));

        m.cached_token = Some(jwt_with_exp(now - 10));
        assert!(m.needs_refresh_at(now));
    }

    #[test]
    fn test_needs_refresh_on_malformed_token() {
        let mut m = manager(StubHttp::new(vec![]));
        for bad in ["abc", "a.b", "a.b.c.d", "x.!!!.y", "e30.e30.e30"] {
            m.cached_token = Some(bad.to_string());
            assert!(m.needs_refresh_at(0), "token {:?} should need refresh", bad);
        }
    }

    #[test]
    fn test_needs_refresh_on_out_of_range_exp() {
        let now = 1_700_000_000;
        let mut m = manager(StubHttp::new(vec![]));
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        for exp in ["-1e300", "1e300", "-9.3e18", "9.3e18"] {
            let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
            m.cached_token = Some(format!("{}.{}.sig", header, payload));
            assert!(m.needs_refresh_at(now), "exp {} should need refresh", exp);
        }

        // Far past but in range still needs refresh.
        m.cached_token = Some(format!(
            "{}.{}.sig",
            header,
            URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, i64::MIN + 1))
        ));
        assert!(m.needs_refresh_at(now));
    }

    #[test]
    fn test_refresh_success_caches_token() {
        let http = StubHttp::new(vec![ok_token("abc")]);
        let mut m = manager(http.clone());

        m.refresh_at(1_700_000_000).expect("refresh");
        assert_eq!(m.cached_token(), Some("abc"));

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.url, "https://auth.example/connect/token");
        assert_eq!(form_value(req, "grant_type"), Some(JWT_BEARER_GRANT));
        assert_eq!(form_value(req, "client_id"), Some("dev-client"));
        assert_eq!(form_value(req, "scope"), Some("messaging.publish"));

        let assertion = form_value(req, "assertion").expect("assertion");
        let payload = assertion.split('.').nth(1).unwrap();
        let claims: AssertionClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(claims.iss, "dev-client");
        assert_eq!(claims.sub, "dev-client");
        assert_eq!(claims.aud, "https://auth.example");
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.exp, 1_700_000_180);
        assert!(Uuid::parse_str(&claims.jti).is_ok());
    }

    #[test]
    fn test_refresh_uses_unique_jwt_ids() {
        let http = StubHttp::new(vec![ok_token("t1"), ok_token("t2")]);
        let mut m = manager(http.clone());
        m.refresh_at(100).unwrap();
        m.refresh_at(100).unwrap();
        assert_eq!(m.cached_token(), Some("t2"));

        let requests = http.requests();
        assert_ne!(
            form_value(&requests[0], "assertion"),
            form_value(&requests[1], "assertion")
        );
    }

    #[test]
    fn test_scopes_are_space_joined() {
        let http = StubHttp::new(vec![ok_token("abc")]);
        let mut m = TokenManager::new(
            "dev-client",
            "https://auth.example/",
            vec!["messaging.publish".into(), "messaging.subscribe".into()],
            SigningKey::from_pem(PKCS8_PEM).unwrap(),
            http.clone(),
        );
        m.refresh().unwrap();
        let req = &http.requests()[0];
        assert_eq!(req.url, "https://auth.example/connect/token");
        assert_eq!(
            form_value(req, "scope"),
            Some("messaging.publish messaging.subscribe")
        );
    }

    #[test]
    fn test_refresh_rejected_keeps_previous_token() {
        let http = StubHttp::new(vec![Ok(HttpResponse::new(
            400,
            r#"{"error":"invalid_grant","error_description":"expired"}"#,
        ))]);
        let mut m = manager(http);
        m.cached_token = Some("stale".into());

        let err = m.refresh().unwrap_err();
        match &err {
            AuthError::OAuthRejected { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert_eq!(description, "expired");
            }
            other => panic!("expected OAuthRejected, got {:?}", other),
        }
        assert_eq!(err.to_string(), "invalid_grant: expired");
        assert_eq!(m.cached_token(), Some("stale"));
    }

    #[test]
    fn test_refresh_unreadable_error_body() {
        let http = StubHttp::new(vec![Ok(HttpResponse::new(502, "<html>bad gateway</html>"))]);
        let mut m = manager(http);
        assert!(matches!(
            m.refresh(),
            Err(AuthError::TransportOrDecodeFailure(_))
        ));
        assert!(m.cached_token().is_none());
    }

    #[test]
    fn test_refresh_unreadable_success_body() {
        let http = StubHttp::new(vec![Ok(HttpResponse::new(200, "{}"))]);
        let mut m = manager(http);
        m.cached_token = Some("stale".into());
        assert!(matches!(
            m.refresh(),
            Err(AuthError::TransportOrDecodeFailure(_))
        ));
        assert_eq!(m.cached_token(), Some("stale"));
    }

    #[test]
    fn test_refresh_transport_failure() {
        let http = StubHttp::new(vec![Err(TransportError::Request {
            url: "https://auth.example/connect/token".into(),
            message: "connection refused".into(),
        })]);
        let mut m = manager(http);
        match m.refresh() {
            Err(AuthError::TransportOrDecodeFailure(msg)) => {
                assert!(msg.contains("connection refused"))
            }
            other => panic!("expected TransportOrDecodeFailure, got {:?}", other),
        }
        assert!(m.cached_token().is_none());
    }

    #[test]
    fn test_authorize_outgoing_refreshes_and_sets_headers() {
        let http = StubHttp::new(vec![ok_token("abc")]);
        let mut m = manager(http.clone());

        let mut req = HttpRequest::post("https://messaging.example/messaging");
        m.authorize_outgoing(&mut req).unwrap();

        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(http.requests().len(), 1);
    }

    #[test]
    fn test_authorize_outgoing_reuses_valid_token() {
        let http = StubHttp::new(vec![]);
        let mut m = manager(http.clone());
        let token = jwt_with_exp(unix_now() + 3600);
        m.cached_token = Some(token.clone());

        let mut req = HttpRequest::post("https://messaging.example/messaging");
        m.authorize_outgoing(&mut req).unwrap();

        assert_eq!(
            req.header("Authorization"),
            Some(format!("Bearer {}", token).as_str())
        );
        assert!(http.requests().is_empty());
    }

    #[test]
    fn test_authorize_outgoing_propagates_failure() {
        let http = StubHttp::new(vec![Ok(HttpResponse::new(
            401,
            r#"{"error":"invalid_client","error_description":"unknown client"}"#,
        ))]);
        let mut m = manager(http);

        let mut req = HttpRequest::post("https://messaging.example/messaging");
        let err = m.authorize_outgoing(&mut req).unwrap_err();
        assert!(matches!(err, AuthError::OAuthRejected { .. }));
        assert_eq!(req.header("Authorization"), None);
    }

    #[test]
    fn test_debug_hides_token() {
        let mut m = manager(StubHttp::new(vec![]));
        m.cached_token = Some("secret-token".into());
        let dbg = format!("{:?}", m);
        assert!(dbg.contains("has_token: true"));
        assert!(!dbg.contains("secret-token"));
    }
}
