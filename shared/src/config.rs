//! Configuration management for Lambda functions.

use std::env;

use crate::{Error, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database host
    pub db_host: String,
    /// Database name
    pub db_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: String,
    /// AWS region
    pub aws_region: String,
    /// ARN (or name) of the secret holding the Google OAuth client
    pub google_oauth_secret_arn: String,
    /// Redirect URI registered with Google for the OAuth callback
    pub oauth_redirect_uri: String,
    /// Secret name prefix under which per-user calendar tokens live
    pub calendar_secret_prefix: String,
    /// PEM public key of the session issuer; enables bearer-token auth
    pub session_public_key: Option<String>,
    /// Expected `iss` of session tokens
    pub session_issuer: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_host: required("DATABASE_HOST")?,
            db_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "wayfeel".to_string()),
            db_secret_arn: required("DATABASE_URL_SECRET_ARN")?,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            google_oauth_secret_arn: env::var("GOOGLE_OAUTH_SECRET_ARN")
                .unwrap_or_else(|_| "wayfeel/google-oauth".to_string()),
            oauth_redirect_uri: env::var("OAUTH_REDIRECT_URI").unwrap_or_else(|_| {
                "https://api.example.com/calendar/oauth/callback".to_string()
            }),
            calendar_secret_prefix: env::var("CALENDAR_SECRET_PREFIX")
                .unwrap_or_else(|_| "wayfeel/calendar/".to_string()),
            session_public_key: env::var("SESSION_PUBLIC_KEY").ok().filter(|k| !k.is_empty()),
            session_issuer: env::var("SESSION_ISSUER").ok().filter(|i| !i.is_empty()),
        })
    }

    /// Secret name holding a user's Google Calendar tokens.
    pub fn calendar_secret_name(&self, user_id: &str) -> String {
        format!("{}{}", self.calendar_secret_prefix, user_id)
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::Config(format!("{} not set", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_secret_name() {
        let config = Config {
            db_host: "localhost".to_string(),
            db_name: "wayfeel".to_string(),
            db_secret_arn: "arn:db".to_string(),
            aws_region: "us-east-1".to_string(),
            google_oauth_secret_arn: "wayfeel/google-oauth".to_string(),
            oauth_redirect_uri: "https://example.com/cb".to_string(),
            calendar_secret_prefix: "wayfeel/calendar/".to_string(),
            session_public_key: None,
            session_issuer: None,
        };
        assert_eq!(config.calendar_secret_name("user_2abc"), "wayfeel/calendar/user_2abc");
    }
}
