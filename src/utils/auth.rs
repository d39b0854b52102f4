use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use uuid::Uuid;

use crate::config::Secrets;

type HmacSha256 = Hmac<Sha256>;

/// HTTP Basic credentials checked in constant time.
///
/// The expected `user:password` pair is kept only as an HMAC tag under a
/// per-process key; a presented pair is accepted when its tag verifies.
#[derive(Clone)]
pub struct BasicAuth {
    key: Vec<u8>,
    expected_tag: Vec<u8>,
}

impl BasicAuth {
    pub fn new(user: &str, password: &str) -> Self {
        let key = Uuid::new_v4().as_bytes().to_vec();
        let expected_tag = tag(&key, format!("{}:{}", user, password).as_bytes());
        Self { key, expected_tag }
    }

    /// `None` when `HTTP_USER` / `HTTP_PWD` are not both set.
    pub fn from_secrets(secrets: &Secrets) -> Option<Self> {
        match (&secrets.http_user, &secrets.http_password) {
            (Some(u), Some(p)) => Some(Self::new(u, p)),
            _ => None,
        }
    }

    /// Checks a raw `Authorization` header value.
    pub fn verify_header(&self, header: Option<&str>) -> bool {
        let Some(value) = header else { return false };
        let Some(encoded) = value.strip_prefix("Basic ").or_else(|| value.strip_prefix("basic ")) else {
            return false;
        };
        let Ok(decoded) = general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };

        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(m) => m,
            Err(_) => return false,
        };
        mac.update(&decoded);
        mac.verify_slice(&self.expected_tag).is_ok()
    }
}

fn tag(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// `Authorization` header value for the given credentials.
pub fn basic_header(user: &str, password: &str) -> String {
    format!("Basic {}", general_purpose::STANDARD.encode(format!("{}:{}", user, password)))
}
