//! Shared Access Signature tokens for the management API.
//!
//! Token layout:
//! `SharedAccessSignature sr=<uri>&sig=<signature>&se=<expiry>&skn=<key name>`
//! where the signature is base64(HMAC-SHA256(key, "<uri>\n<expiry>")) and
//! `<uri>` is the URL-encoded, lowercased resource URI.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;

use crate::error::{AdminError, AdminResult};

/// Default token lifetime.
pub const TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Build a token for `resource_uri` that expires at `expiry_epoch` (seconds).
pub fn token(resource_uri: &str, key_name: &str, key: &str, expiry_epoch: u64) -> AdminResult<String> {
    let encoded_uri = utf8_percent_encode(&resource_uri.to_lowercase(), NON_ALPHANUMERIC).to_string();
    let string_to_sign = format!("{encoded_uri}\n{expiry_epoch}");

    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| AdminError::Auth(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={encoded_uri}&sig={}&se={expiry_epoch}&skn={}",
        utf8_percent_encode(&signature, NON_ALPHANUMERIC),
        utf8_percent_encode(key_name, NON_ALPHANUMERIC),
    ))
}

/// Build a token valid for `ttl` from now.
pub fn token_from_now(resource_uri: &str, key_name: &str, key: &str, ttl: Duration) -> AdminResult<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    token(resource_uri, key_name, key, (now + ttl).as_secs())
}
