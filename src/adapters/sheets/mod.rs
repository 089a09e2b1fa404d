//! Google Sheets adapter: Implementation of ReferenceSource over the Sheets
//! values API.
//!
//! Credentials are an "authorized user" document (client id, client secret,
//! refresh token) supplied base64-encoded through the environment. Access
//! tokens are obtained with the refresh-token grant and reused until shortly
//! before they expire.
//!
//! # Security
//!
//! - Secrets are zeroized on drop and redacted from `Debug` output
//! - Tokens only travel in request bodies and `Authorization` headers, never
//!   in URLs, so transport errors cannot leak them into logs

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::Engine;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::domain::ReferenceTables;
use crate::ports::{ReferenceError, ReferenceSource};
use crate::DemandError;

/// Sheets values API base.
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// OAuth token endpoint used when the credentials do not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Default range of the slots-by-area-and-language table.
pub const DEFAULT_SLOTS_RANGE: &str = "'Free slots by continent and language'!A:BR";

/// Default range of the per-therapist activity table.
pub const DEFAULT_ACTIVITY_RANGE: &str = "Free_slots!A:BR";

/// Refresh access tokens this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Authorized-user credentials.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AuthorizedUserInfo {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Pre-issued access token, used only when no refresh token is present.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for AuthorizedUserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserInfo")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl AuthorizedUserInfo {
    /// Decode the base64 JSON blob supplied through the environment.
    ///
    /// # Errors
    /// Returns `DemandError::Configuration` if the blob is not base64 JSON
    /// or carries neither a refresh token nor an access token.
    pub fn from_encoded(encoded: &str) -> Result<Self, DemandError> {
        let raw = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| DemandError::Configuration(format!("ENCODED_TOKEN is not valid base64: {e}")))?,
        );
        let info: Self = serde_json::from_slice(&raw).map_err(|e| {
            DemandError::Configuration(format!("ENCODED_TOKEN is not an authorized-user document: {e}"))
        })?;

        if info.refresh_token.is_empty() && info.token.as_deref().map_or(true, str::is_empty) {
            return Err(DemandError::Configuration(
                "ENCODED_TOKEN contains neither refresh_token nor token".into(),
            ));
        }
        Ok(info)
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

/// Spreadsheet ranges holding the two tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRanges {
    pub slots: String,
    pub activity: String,
}

impl Default for SheetRanges {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS_RANGE.to_string(),
            activity: DEFAULT_ACTIVITY_RANGE.to_string(),
        }
    }
}

struct AccessToken {
    value: Zeroizing<String>,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Convert a cell from an unformatted values response to text.
fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decode_value_range(bytes: &[u8]) -> Result<Vec<Vec<String>>, ReferenceError> {
    let range: ValueRange =
        serde_json::from_slice(bytes).map_err(|e| ReferenceError::Decode(e.to_string()))?;
    Ok(range
        .values
        .iter()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn values_url(base: &str, spreadsheet_id: &str, range: &str) -> Result<Url, ReferenceError> {
    let mut url = Url::parse(base).map_err(|e| ReferenceError::Transport(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ReferenceError::Transport(format!("Invalid API base {base}")))?;
        segments.push(spreadsheet_id).push("values").push(range);
    }
    url.query_pairs_mut()
        .append_pair("majorDimension", "ROWS")
        .append_pair("valueRenderOption", "UNFORMATTED_VALUE");
    Ok(url)
}

fn transport_error(e: reqwest::Error) -> ReferenceError {
    if e.is_timeout() {
        ReferenceError::Timeout
    } else {
        // Drop the URL so query strings never reach the message.
        ReferenceError::Transport(e.without_url().to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> ReferenceError {
    let message: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ReferenceError::Unauthorized(message),
        _ => ReferenceError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Reference source reading both tables from one spreadsheet.
pub struct SheetsReferenceSource {
    client: Client,
    credentials: AuthorizedUserInfo,
    spreadsheet_id: String,
    ranges: SheetRanges,
    api_base: String,
    access_token: Mutex<Option<AccessToken>>,
}

impl SheetsReferenceSource {
    /// Create a source with a request timeout applied to every call.
    ///
    /// Must be called outside an async context: the blocking client owns its
    /// own runtime.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        credentials: AuthorizedUserInfo,
        spreadsheet_id: impl Into<String>,
        ranges: SheetRanges,
        timeout: Duration,
    ) -> Result<Self, ReferenceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReferenceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
            spreadsheet_id: spreadsheet_id.into(),
            ranges,
            api_base: SHEETS_API_BASE.to_string(),
            access_token: Mutex::new(None),
        })
    }

    /// Point the source at a different API base (e.g. a local emulator).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn bearer_token(&self) -> Result<Zeroizing<String>, ReferenceError> {
        let mut cached = self
            .access_token
            .lock()
            .map_err(|_| ReferenceError::Transport("Access token lock poisoned".into()))?;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        if self.credentials.refresh_token.is_empty() {
            // Static token: nothing to refresh, let the API reject it if stale.
            return self
                .credentials
                .token
                .as_ref()
                .map(|t| Zeroizing::new(t.clone()))
                .ok_or_else(|| ReferenceError::Unauthorized("No usable credentials".into()));
        }

        tracing::debug!("Refreshing Sheets access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];
        let response = self
            .client
            .post(self.credentials.token_uri())
            .form(&params)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(match status_error(status, body) {
                ReferenceError::Status { message, .. } if status == StatusCode::BAD_REQUEST => {
                    ReferenceError::Unauthorized(message)
                }
                other => other,
            });
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| ReferenceError::Decode(format!("token response: {}", e.without_url())))?;
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let value = Zeroizing::new(token.access_token);

        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    fn forget_token(&self) {
        if let Ok(mut cached) = self.access_token.lock() {
            *cached = None;
        }
    }

    fn read_range(&self, token: &str, range: &str) -> Result<Vec<Vec<String>>, ReferenceError> {
        let url = values_url(&self.api_base, &self.spreadsheet_id, range)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.forget_token();
            }
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, body));
        }

        let bytes = response.bytes().map_err(transport_error)?;
        let rows = decode_value_range(&bytes)?;
        tracing::debug!("Read {} rows from range {}", rows.len(), range);
        Ok(rows)
    }
}

impl ReferenceSource for SheetsReferenceSource {
    fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
        let token = self.bearer_token()?;
        let slots = self.read_range(&token, &self.ranges.slots)?;
        let activity = self.read_range(&token, &self.ranges.activity)?;
        let tables = ReferenceTables::from_rows(&slots, &activity)?;

        tracing::info!(
            "Fetched reference data from spreadsheet ({} slot entries, {} therapists)",
            tables.slots.len(),
            tables.activity.len()
        );
        Ok(Arc::new(tables))
    }

    fn describe(&self) -> String {
        "google-sheets".to_string()
    }
}
