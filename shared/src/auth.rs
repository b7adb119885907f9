//! Session token authentication utilities.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use lambda_http::{Request, RequestExt};
use serde::{Deserialize, Serialize};

use crate::{Config, Error, Result};

/// Claims of a session JWT issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id)
    pub sub: String,
    /// Session id
    #[serde(default)]
    pub sid: Option<String>,
    /// Authorized party (frontend origin)
    #[serde(default)]
    pub azp: Option<String>,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

/// Decoded user information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Identity provider user id, also stored as `markers.created_by`
    pub user_id: String,
    /// Session the request belongs to, when known
    pub session_id: Option<String>,
}

impl TryFrom<SessionClaims> for AuthenticatedUser {
    type Error = Error;

    fn try_from(claims: SessionClaims) -> Result<Self> {
        if claims.sub.trim().is_empty() {
            return Err(Error::Auth("Empty sub claim".to_string()));
        }

        Ok(Self {
            user_id: claims.sub,
            session_id: claims.sid,
        })
    }
}

/// Verifies session JWTs presented in the `Authorization` header.
///
/// Only used for routes without an API Gateway authorizer. Signature, expiry
/// and issuer are all checked.
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(key: DecodingKey, algorithm: Algorithm, issuer: &str) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Sessions carry `azp`, not `aud`
        validation.validate_aud = false;

        Self { key, validation }
    }

    /// RS256 verifier from the identity provider's PEM public key.
    pub fn from_rsa_pem(pem: &str, issuer: &str) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid session public key: {}", e)))?;
        Ok(Self::new(key, Algorithm::RS256, issuer))
    }

    /// `None` when no session key is configured; header tokens are then refused.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match (&config.session_public_key, &config.session_issuer) {
            (Some(pem), Some(issuer)) => Self::from_rsa_pem(pem, issuer).map(Some),
            _ => Ok(None),
        }
    }

    /// Verify a session token and extract user information.
    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token);

        let token_data = decode::<SessionClaims>(token, &self.key, &self.validation)
            .map_err(|e| Error::Auth(format!("Invalid session token: {}", e)))?;

        AuthenticatedUser::try_from(token_data.claims)
    }
}

/// Extract user from API Gateway authorizer claims.
pub fn extract_user_from_context(claims: &serde_json::Value) -> Result<AuthenticatedUser> {
    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::Auth("Missing sub claim".to_string()))?;

    let session_id = claims.get("sid").and_then(|v| v.as_str()).map(String::from);

    Ok(AuthenticatedUser {
        user_id: sub.to_string(),
        session_id,
    })
}

/// Resolve the caller of a Lambda request.
///
/// Authorizer claims win. Without them the `Authorization` header is accepted
/// only when `verifier` is configured.
pub fn authenticate_request(event: &Request, verifier: Option<&SessionVerifier>) -> Result<AuthenticatedUser> {
    let claims = event
        .request_context_ref()
        .and_then(|context| context.authorizer())
        .and_then(|authorizer| authorizer.fields.get("claims"));

    if let Some(claims) = claims {
        return extract_user_from_context(claims);
    }

    let verifier = verifier.ok_or_else(|| Error::Auth("Missing authorizer claims".to_string()))?;
    let header = event
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Auth("Missing authorization".to_string()))?;

    verifier.verify(header)
}
