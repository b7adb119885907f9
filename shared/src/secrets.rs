//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::info;

use crate::google::GoogleTokens;
use crate::{Error, Result};

/// Cached secrets with lazy initialization.
static SECRETS_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    SECRETS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Database credentials from Secrets Manager.
#[derive(Debug, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
}

/// Google OAuth client registration from Secrets Manager.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// A user's Google Calendar tokens as persisted in Secrets Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCalendarTokens {
    pub provider: String,
    #[serde(flatten)]
    pub tokens: GoogleTokens,
    pub updated_at: DateTime<Utc>,
}

/// Get a secret value from Secrets Manager with caching.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    // Check cache first
    {
        let cache = get_cache().read().await;
        if let Some(value) = cache.get(secret_arn) {
            return Ok(value.clone());
        }
    }

    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))?
        .to_string();

    {
        let mut cache = get_cache().write().await;
        cache.insert(secret_arn.to_string(), secret_string.clone());
    }

    Ok(secret_string)
}

/// Get database credentials from Secrets Manager.
pub async fn get_database_credentials(
    client: &SecretsClient,
    secret_arn: &str,
) -> Result<DatabaseCredentials> {
    let secret_string = get_secret(client, secret_arn).await?;

    serde_json::from_str(&secret_string)
        .map_err(|e| Error::Aws(format!("Failed to parse database credentials: {}", e)))
}

/// Get the Google OAuth client registration from Secrets Manager.
pub async fn get_google_oauth_credentials(
    client: &SecretsClient,
    secret_arn: &str,
) -> Result<GoogleOAuthCredentials> {
    let secret_string = get_secret(client, secret_arn).await?;

    serde_json::from_str(&secret_string)
        .map_err(|e| Error::Aws(format!("Failed to parse Google OAuth credentials: {}", e)))
}

/// Load a user's calendar tokens. Returns `None` when the user never linked a calendar.
///
/// Tokens rotate, so this bypasses the cache.
pub async fn load_calendar_tokens(
    client: &SecretsClient,
    secret_name: &str,
) -> Result<Option<StoredCalendarTokens>> {
    let response = match client.get_secret_value().secret_id(secret_name).send().await {
        Ok(response) => response,
        Err(e) => {
            let not_found = e
                .as_service_error()
                .map(|se| se.is_resource_not_found_exception())
                .unwrap_or(false);
            if not_found {
                return Ok(None);
            }
            return Err(Error::Aws(format!("Failed to get calendar tokens: {}", e)));
        }
    };

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Aws("Calendar token secret has no string value".to_string()))?;

    Ok(Some(serde_json::from_str(secret_string)?))
}

/// Store a user's calendar tokens, creating the secret on first connect.
pub async fn store_calendar_tokens(
    client: &SecretsClient,
    secret_name: &str,
    tokens: &StoredCalendarTokens,
) -> Result<()> {
    let payload = serde_json::to_string(tokens)?;

    let result = client
        .put_secret_value()
        .secret_id(secret_name)
        .secret_string(&payload)
        .send()
        .await;

    match result {
        Ok(_) => {
            info!("Updated calendar tokens in {}", secret_name);
            Ok(())
        }
        Err(e) => {
            let not_found = e
                .as_service_error()
                .map(|se| se.is_resource_not_found_exception())
                .unwrap_or(false);
            if !not_found {
                return Err(Error::Aws(format!("Failed to store tokens: {}", e)));
            }

            client
                .create_secret()
                .name(secret_name)
                .secret_string(payload)
                .send()
                .await
                .map_err(|e| Error::Aws(format!("Failed to create secret: {}", e)))?;

            info!("Created calendar tokens in {}", secret_name);
            Ok(())
        }
    }
}

/// Clear the secrets cache (useful for testing or credential rotation).
pub async fn clear_cache() {
    let mut cache = get_cache().write().await;
    cache.clear();
}
