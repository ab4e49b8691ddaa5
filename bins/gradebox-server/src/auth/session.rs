//! HMAC-signed cookies.
//!
//! A sealed value is `base64url(json{exp, data}) "." base64url(hmac)`. The
//! expiry travels inside the signed payload, so a replayed cookie stops
//! working even if the browser ignores `Max-Age`.

use axum::http::header::{HeaderValue, COOKIE};
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

const MIN_KEY_BYTES: usize = 16;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    exp: i64,
    data: T,
}

#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
    secure: bool,
}

impl CookieSigner {
    pub fn new(key: &[u8], secure: bool) -> Result<Self, AuthError> {
        if key.len() < MIN_KEY_BYTES {
            return Err(AuthError::Signing(format!(
                "cookie key must be at least {} bytes",
                MIN_KEY_BYTES
            )));
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|e| AuthError::Signing(e.to_string()))?;
        Ok(Self { mac, secure })
    }

    pub fn seal<T: Serialize>(&self, value: &T, max_age: Duration) -> Result<String, AuthError> {
        let exp = chrono::Utc::now().timestamp() + max_age.as_secs() as i64;
        self.seal_until(value, exp)
    }

    fn seal_until<T: Serialize>(&self, value: &T, exp: i64) -> Result<String, AuthError> {
        let json = serde_json::to_vec(&Envelope { exp, data: value })
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify and decode a sealed value. Bad signatures, malformed input and
    /// expired payloads all yield `None`.
    pub fn open<T: DeserializeOwned>(&self, sealed: &str) -> Option<T> {
        let (payload, signature) = sealed.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let envelope: Envelope<T> = serde_json::from_slice(&json).ok()?;
        if chrono::Utc::now().timestamp() > envelope.exp {
            return None;
        }
        Some(envelope.data)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// `Set-Cookie` value. `cross_site` cookies are sent on cross-origin
    /// uploads, which browsers only allow together with `Secure`.
    pub fn set_cookie(
        &self,
        name: &str,
        value: &str,
        max_age: Duration,
        cross_site: bool,
    ) -> Result<HeaderValue, AuthError> {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly",
            name,
            value,
            max_age.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        if cross_site && self.secure {
            cookie.push_str("; SameSite=None");
        } else {
            cookie.push_str("; SameSite=Lax");
        }
        HeaderValue::from_str(&cookie).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// `Set-Cookie` value that empties the cookie and expires it immediately.
    pub fn clear_cookie(&self, name: &str) -> Result<HeaderValue, AuthError> {
        let mut cookie = format!("{}=; Path=/; Max-Age=0; HttpOnly", name);
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|e| AuthError::Signing(e.to_string()))
    }
}

/// Find a cookie by name across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
