//! HTTP basic authentication for the whole app.
//!
//! One shared username/password pair. Only SHA-256 digests of the expected
//! values are kept in memory, and comparison is constant-time over the
//! digests so neither length nor content leaks through timing.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const REALM: &str = r#"Basic realm="Therapist Demand", charset="UTF-8""#;

/// Expected credentials, stored as digests.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    username_digest: [u8; 32],
    password_digest: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn digest(value: &[u8]) -> [u8; 32] {
    Sha256::digest(value).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl Credentials {
    /// Build credentials from the configured pair.
    ///
    /// # Errors
    /// Returns a message if either value is empty or the username contains `:`.
    pub fn new(username: &str, password: &str) -> Result<Self, String> {
        if username.is_empty() || password.is_empty() {
            return Err("Basic auth username and password must not be empty".to_string());
        }
        if username.contains(':') {
            return Err("Basic auth username must not contain ':'".to_string());
        }
        Ok(Self {
            username: username.to_string(),
            username_digest: digest(username.as_bytes()),
            password_digest: Zeroizing::new(digest(password.as_bytes())),
        })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check a username/password pair.
    #[must_use]
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(&self.username_digest, &digest(username.as_bytes()));
        let password_ok = constant_time_eq(
            &self.password_digest,
            &Zeroizing::new(digest(password.as_bytes())),
        );
        user_ok & password_ok
    }

    /// Check the `Authorization` header of a request.
    #[must_use]
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        let Some(encoded) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
        else {
            return false;
        };

        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let decoded = Zeroizing::new(decoded);
        let Ok(pair) = std::str::from_utf8(&decoded) else {
            return false;
        };

        match pair.split_once(':') {
            Some((username, password)) => self.verify(username, password),
            None => false,
        }
    }
}

/// Middleware rejecting requests without valid credentials.
pub async fn require_basic_auth(
    State(credentials): State<Credentials>,
    request: Request,
    next: Next,
) -> Response {
    if credentials.authorize(request.headers()) {
        return next.run(request).await;
    }

    tracing::debug!("Rejected unauthenticated request to {}", request.uri().path());
    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_accepts_matching_pair() {
        let creds = Credentials::new("admin", "hunter2:with-colon").unwrap();
        assert!(creds.authorize(&basic("admin", "hunter2:with-colon")));
    }

    #[test]
    fn test_rejects_wrong_or_missing_credentials() {
        let creds = Credentials::new("admin", "hunter2").unwrap();
        assert!(!creds.authorize(&basic("admin", "hunter3")));
        assert!(!creds.authorize(&basic("root", "hunter2")));
        assert!(!creds.authorize(&HeaderMap::new()));

        let mut bearer = HeaderMap::new();
        bearer.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(!creds.authorize(&bearer));

        let mut garbage = HeaderMap::new();
        garbage.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(!creds.authorize(&garbage));
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        assert!(Credentials::new("", "x").is_err());
        assert!(Credentials::new("a", "").is_err());
        assert!(Credentials::new("a:b", "x").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::new("admin", "hunter2").unwrap();
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
