//! Bearer token decoding.
//!
//! Session tokens are JWTs in compact serialization
//! (`header.payload.signature`). This module only reads the claims out of
//! the payload segment so the client can tell who is signed in and when the
//! session ends. Signatures are never checked here: the identity service
//! issued the token and is the only party that can judge it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of dot-separated segments in a compact JWT
const TOKEN_SEGMENTS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedToken {
    #[error("Malformed token: expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("Malformed token: payload is not base64url: {0}")]
    Encoding(String),

    #[error("Malformed token: payload is not a claims object: {0}")]
    Payload(String),
}

/// Claims read from a session token.
///
/// Only the registered claims the client cares about are kept. Anything else
/// in the payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Claims {
    /// Subject. The identity service puts the account email here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issued-at, Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiry, Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    /// Expiry instant, if the token states one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    /// A token without an expiry counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => expiry <= now,
            None => true,
        }
    }

    /// Time left before expiry, or `None` if the token is already expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let expiry = self.expires_at()?;
        if expiry <= now {
            return None;
        }
        (expiry - now).to_std().ok()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at()
            .map(|expiry| (expiry - now).num_minutes().max(0))
            .unwrap_or(0)
    }
}

/// Decode the claims of a raw session token without verifying it.
pub fn decode(raw: &str) -> Result<Claims, MalformedToken> {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(MalformedToken::SegmentCount(segments.len()));
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| MalformedToken::Encoding(e.to_string()))?;

    // Go through Value first: a derived struct would also accept a JSON array.
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| MalformedToken::Payload(e.to_string()))?;
    if !value.is_object() {
        return Err(MalformedToken::Payload(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        )));
    }

    serde_json::from_value(value).map_err(|e| MalformedToken::Payload(e.to_string()))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
