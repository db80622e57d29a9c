//! Bearer token verification.
//!
//! Token issuance belongs to the external auth service; this side only
//! verifies. Tokens have the form `<identity>.<expiry>.<signature>`:
//!
//! - `expiry` is a unix timestamp in seconds
//! - `signature` is HMAC-SHA256 over `<identity>.<expiry>`, base64url
//!   without padding
//!
//! The identity may itself contain dots; the token is split from the right.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use parley_proto::Identity;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing token")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

/// Resolves a presented token to a verified identity.
pub trait Authenticator: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// HMAC-SHA256 shared-secret verifier.
pub struct HmacAuthenticator {
    secret: Vec<u8>,
    max_clock_skew_secs: i64,
}

impl HmacAuthenticator {
    pub fn new(secret: &str, max_clock_skew_secs: u64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            max_clock_skew_secs: i64::try_from(max_clock_skew_secs).unwrap_or(i64::MAX),
        }
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
        mac.update(payload.as_bytes());
        mac
    }

    /// Produce a token for `identity` valid until `expires_at` (unix seconds).
    pub fn issue(&self, identity: &str, expires_at: i64) -> String {
        let payload = format!("{identity}.{expires_at}");
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload).finalize().into_bytes());
        format!("{payload}.{signature}")
    }

    fn verify_at(&self, token: &str, now: i64) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let (payload, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        let (identity, expiry) = payload.rsplit_once('.').ok_or(AuthError::Malformed)?;
        if identity.is_empty() {
            return Err(AuthError::Malformed);
        }
        let expiry: i64 = expiry.parse().map_err(|_| AuthError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;

        self.mac(payload)
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        if expiry.saturating_add(self.max_clock_skew_secs) < now {
            return Err(AuthError::Expired);
        }
        Ok(identity.to_string())
    }
}

impl Authenticator for HmacAuthenticator {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }
}

/// Pull a token out of an upgrade request: `?token=` wins over
/// `Authorization: Bearer`.
pub fn extract_token(query: Option<&str>, authorization: Option<&str>) -> Option<String> {
    let from_query = query.and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "token")
            .map(|(_, v)| v.to_string())
    });
    from_query
        .or_else(|| {
            authorization
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        })
        .filter(|t| !t.is_empty())
}
