//! Client configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use shared::{Error, Result};

/// Settings for talking to the Wayfeel API and the maps SDK.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API routes, without trailing slash
    pub api_url: String,
    /// Session token sent as `Authorization: Bearer`
    pub api_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Maps SDK key; the map stays unloaded without it
    pub maps_api_key: Option<String>,
    /// Styled map id
    pub map_id: String,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("WAYFEEL_API_URL")
            .map_err(|_| Error::Config("WAYFEEL_API_URL not set".to_string()))?;

        let timeout = match env::var("WAYFEEL_HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| Error::Config(format!("Invalid WAYFEEL_HTTP_TIMEOUT_SECS: {}", raw)))?,
            Err(_) => Duration::from_secs(10),
        };

        Ok(Self::new(api_url)
            .with_token(env::var("WAYFEEL_API_TOKEN").ok())
            .with_timeout(timeout)
            .with_maps(
                env::var("WAYFEEL_MAPS_API_KEY").ok(),
                env::var("WAYFEEL_MAP_ID").unwrap_or_else(|_| "wayfeel-moods".to_string()),
            ))
    }

    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            timeout: Duration::from_secs(10),
            maps_api_key: None,
            map_id: "wayfeel-moods".to_string(),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_maps(mut self, api_key: Option<String>, map_id: impl Into<String>) -> Self {
        self.maps_api_key = api_key.filter(|k| !k.is_empty());
        self.map_id = map_id.into();
        self
    }
}
