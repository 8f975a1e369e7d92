//! Signed session tokens.
//!
//! A token is `base64url(claims JSON) "." base64url(ed25519 signature)`. The
//! signing key is derived from the configured session secret at startup and
//! passed around explicitly.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult, AuthError};
use crate::ledger::models::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub login: String,
    /// Unix seconds
    pub issued_at: i64,
    /// Unix seconds
    pub expires_at: i64,
}

pub struct SessionKeys {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn from_secret(secret: &str, ttl: Duration) -> Self {
        let seed: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: UserId, login: &str) -> AppResult<String> {
        self.issue_at(user_id, login, Utc::now())
    }

    fn issue_at(&self, user_id: UserId, login: &str, now: DateTime<Utc>) -> AppResult<String> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            user_id,
            login: login.to_string(),
            issued_at: now.timestamp(),
            expires_at: now.timestamp().saturating_add(ttl),
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| AppError::Internal(format!("Failed to encode claims: {}", e)))?;
        let payload = BASE64URL.encode(payload);
        let signature = self.signing_key.sign(payload.as_bytes());

        Ok(format!(
            "{}.{}",
            payload,
            BASE64URL.encode(signature.to_bytes())
        ))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::InvalidToken)?;

        let signature: [u8; 64] = BASE64URL
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken)?
            .try_into()
            .map_err(|_| AuthError::InvalidToken)?;

        self.verifying_key
            .verify_strict(payload.as_bytes(), &Signature::from_bytes(&signature))
            .map_err(|_| AuthError::InvalidToken)?;

        let claims: Claims = BASE64URL
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(AuthError::InvalidToken)?;

        if claims.expires_at <= now.timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}
