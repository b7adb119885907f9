//! Signed OAuth `state` for the calendar consent flow.
//!
//! The state is a short-lived HS256 JWT carrying the user id and a nonce, so
//! the callback only stores tokens for the user who started the flow.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// How long a consent round trip may take.
pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    sub: String,
    nonce: String,
    exp: i64,
}

pub struct OAuthStateSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl OAuthStateSigner {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.validate_aud = false;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn sign(&self, user_id: &str) -> Result<String> {
        let claims = StateClaims {
            sub: user_id.to_string(),
            nonce: Uuid::new_v4().to_string(),
            exp: (Utc::now() + Duration::minutes(STATE_TTL_MINUTES)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Failed to sign OAuth state: {}", e)))
    }

    /// User id the state was issued to. Tampered, foreign or expired states fail.
    pub fn verify(&self, state: &str) -> Result<String> {
        let data = decode::<StateClaims>(state, &self.decoding, &self.validation)
            .map_err(|e| Error::Validation(format!("Invalid state parameter: {}", e)))?;

        if data.claims.sub.trim().is_empty() {
            return Err(Error::Validation("Empty user_id in state".to_string()));
        }
        Ok(data.claims.sub)
    }
}
