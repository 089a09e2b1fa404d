//! Log sanitization for credentials and contact details.
//!
//! The service handles Google OAuth material (client secrets, refresh and
//! access tokens), HTTP basic-auth headers and the model signing seed. None of
//! these should ever be logged, but transport errors and upstream response
//! bodies end up in log lines, so formatted output is scrubbed before it is
//! written. Patterns covered:
//! - Google access tokens (`ya29.`), refresh tokens (`1//`) and client secrets (`GOCSPX-`)
//! - `Authorization: Basic|Bearer` header values
//! - JWTs and PEM private keys
//! - `key=value` secrets and long hex key material
//! - Email addresses (spreadsheet owners, service accounts)
//!
//! Input is capped at `THERAPIST_DEMAND_SANITIZE_MAX_BYTES` bytes (16 KiB by
//! default) per call.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static SECRET_PATTERNS: OnceLock<SecretPatterns> = OnceLock::new();

const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct SecretPattern {
    regex: Regex,
    replacement: &'static str,
}

struct SecretPatterns {
    fast_set: RegexSet,
    fast_patterns: Vec<SecretPattern>,
    pem: SecretPattern,
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }

    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

fn max_sanitize_bytes() -> usize {
    std::env::var("THERAPIST_DEMAND_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn get_patterns() -> &'static SecretPatterns {
    SECRET_PATTERNS.get_or_init(|| {
        // Order matters: header and token rules run before the generic ones so
        // their more specific labels win.
        let fast_rules: Vec<(&'static str, &'static str)> = vec![
            (
                r"(?i)\b(authorization:\s*(?:basic|bearer))\s+[A-Za-z0-9._~+/=-]+",
                "$1 [REDACTED-CREDENTIAL]",
            ),
            (r"\bya29\.[A-Za-z0-9._-]{10,}", "[REDACTED-ACCESS-TOKEN]"),
            (r"\b1//[A-Za-z0-9._-]{10,}", "[REDACTED-REFRESH-TOKEN]"),
            (r"\bGOCSPX-[A-Za-z0-9_-]{10,}", "[REDACTED-CLIENT-SECRET]"),
            (
                r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b",
                "[REDACTED-JWT]",
            ),
            (
                r#"(?i)\b((?:client[_-]?secret|refresh[_-]?token|access[_-]?token|encoded[_-]?token|password|secret|seed|token)"?\s*[:=]\s*"?)[A-Za-z0-9+/._-]{8,}={0,2}"#,
                "${1}[REDACTED-SECRET]",
            ),
            (
                r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
                "[REDACTED-EMAIL]",
            ),
            (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-KEY]"),
        ];

        // Kept out of the set: a bounded dot-all pattern bloats the combined program.
        let pem = SecretPattern {
            regex: Regex::new(
                r"(?s)-----BEGIN [A-Z0-9 ]{0,40}PRIVATE KEY-----[\s\S]{0,8192}?-----END [A-Z0-9 ]{0,40}PRIVATE KEY-----",
            )
            .expect("Valid regex"),
            replacement: "[REDACTED-PEM-PRIVATE-KEY]",
        };

        let fast_set =
            RegexSet::new(fast_rules.iter().map(|(p, _)| *p)).expect("Valid regex set");
        let fast_patterns = fast_rules
            .into_iter()
            .map(|(pattern, replacement)| SecretPattern {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
            })
            .collect();

        SecretPatterns {
            fast_set,
            fast_patterns,
            pem,
        }
    })
}

/// Replace credentials and email addresses in `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = get_patterns();
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    let mut result = prefix.to_string();
    for idx in patterns.fast_set.matches(prefix).into_iter() {
        let pattern = &patterns.fast_patterns[idx];
        result = pattern
            .regex
            .replace_all(&result, pattern.replacement)
            .into_owned();
    }

    if result.contains("-----BEGIN ") {
        result = patterns
            .pem
            .regex
            .replace_all(&result, patterns.pem.replacement)
            .into_owned();
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

/// Check whether `input` contains anything `sanitize` would redact.
#[must_use]
pub fn contains_secret(input: &str) -> bool {
    let patterns = get_patterns();
    let (prefix, _) = truncate_to_char_boundary(input, max_sanitize_bytes());
    patterns.fast_set.is_match(prefix)
        || (prefix.contains("-----BEGIN ") && patterns.pem.regex.is_match(prefix))
}

/// A `tracing_subscriber` writer wrapper that sanitizes each formatted log
/// line before it reaches the underlying sink.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

pub struct SanitizingWriter<W> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }

    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let sanitized = sanitize(&String::from_utf8_lossy(&line));
            self.inner.write_all(sanitized.as_bytes())?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // A formatter writing one enormous line must not buffer without bound.
        let hard_cap = max_sanitize_bytes().saturating_mul(2);
        if self.buffer.len() > hard_cap {
            let sanitized = sanitize(&String::from_utf8_lossy(&self.buffer));
            self.inner.write_all(sanitized.as_bytes())?;
            self.inner.write_all(b"\n")?;
            self.buffer.clear();
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;
        if !self.buffer.is_empty() {
            let sanitized = sanitize(&String::from_utf8_lossy(&self.buffer));
            self.inner.write_all(sanitized.as_bytes())?;
            self.buffer.clear();
        }
        self.inner.flush()
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter::new(self.inner.make_writer())
    }
}
