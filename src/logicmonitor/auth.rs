//! LMv1 request signing.
//!
//! `Authorization: LMv1 {access_id}:{signature}:{epoch_ms}` where the signature
//! is `base64(hex(hmac_sha256(access_key, VERB + epoch_ms + body + resource_path)))`.
//! The resource path is relative to `/santaba/rest` and carries no query string.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "LMv1";

#[derive(Clone)]
pub struct Credentials {
    pub access_id: String,
    pub access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &self.access_id)
            .field("access_key", &"<redacted>")
            .finish()
    }
}

fn message(method: &Method, epoch_ms: i64, body: &str, resource_path: &str) -> String {
    format!("{}{epoch_ms}{body}{resource_path}", method.as_str())
}

fn mac_for(access_key: &str, msg: &str) -> Result<HmacSha256, String> {
    let mut mac = HmacSha256::new_from_slice(access_key.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(msg.as_bytes());
    Ok(mac)
}

pub fn sign_request(
    credentials: &Credentials,
    method: &Method,
    epoch_ms: i64,
    body: &str,
    resource_path: &str,
) -> Result<String, String> {
    let msg = message(method, epoch_ms, body, resource_path);
    let tag = mac_for(&credentials.access_key, &msg)?.finalize().into_bytes();
    let signature = STANDARD.encode(hex::encode(tag));
    Ok(format!(
        "{SCHEME} {}:{signature}:{epoch_ms}",
        credentials.access_id
    ))
}

/// Checks an `Authorization` header value against the request it claims to sign.
pub fn verify_request(
    credentials: &Credentials,
    method: &Method,
    body: &str,
    resource_path: &str,
    header_value: &str,
) -> bool {
    let Some(rest) = header_value
        .trim()
        .strip_prefix(SCHEME)
        .and_then(|s| s.strip_prefix(' '))
    else {
        return false;
    };
    let mut parts = rest.rsplitn(3, ':');
    let (Some(epoch), Some(signature), Some(access_id)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if access_id != credentials.access_id {
        return false;
    }
    let Ok(epoch_ms) = epoch.parse::<i64>() else {
        return false;
    };
    let Ok(hex_sig) = STANDARD.decode(signature.as_bytes()) else {
        return false;
    };
    let Ok(sig) = hex::decode(hex_sig) else {
        return false;
    };
    let msg = message(method, epoch_ms, body, resource_path);
    let Ok(mac) = mac_for(&credentials.access_key, &msg) else {
        return false;
    };
    mac.verify_slice(&sig).is_ok()
}
