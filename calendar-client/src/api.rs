//! HTTP client for the Wayfeel API routes.
//!
//! Implements every adapter seam against the Lambda endpoints:
//! `GET/POST /markers`, `GET /calendar/google/events`, `PATCH /calendar/events`.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use shared::{EditRequest, EditResponse, Error, ErrorBody, MarkerRecord, NewMarker, Result};
use tracing::debug;

use crate::adapters::{EventPersistence, ExternalCalendarSource, MarkerStore};
use crate::config::ClientConfig;
use crate::range::TimeRange;

#[derive(Debug, Deserialize)]
struct RawEventsResponse {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

/// API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turn a non-success response into an error, preferring the `{error}` body.
async fn upstream_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Error::Upstream { status, message }
}

#[async_trait]
impl MarkerStore for ApiClient {
    async fn fetch_markers(&self, user_id: &str) -> Result<Vec<serde_json::Value>> {
        let response = self
            .authorized(self.http.get(self.url("/markers")))
            .query(&[("user_id", user_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let markers: Vec<serde_json::Value> = response.json().await?;
        debug!("Fetched {} raw markers", markers.len());
        Ok(markers)
    }

    async fn create_marker(&self, marker: &NewMarker) -> Result<MarkerRecord> {
        let response = self
            .authorized(self.http.post(self.url("/markers")))
            .json(marker)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ExternalCalendarSource for ApiClient {
    async fn fetch_busy_blocks(&self, range: &TimeRange) -> Result<Vec<serde_json::Value>> {
        let response = self
            .authorized(self.http.get(self.url("/calendar/google/events")))
            .query(&[("timeMin", range.time_min_iso()), ("timeMax", range.time_max_iso())])
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::NotConnected);
        }
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body: RawEventsResponse = response.json().await?;
        Ok(body.events)
    }
}

#[async_trait]
impl EventPersistence for ApiClient {
    async fn persist_edit(&self, edit: &EditRequest) -> Result<()> {
        let response = self
            .authorized(self.http.patch(self.url("/calendar/events")))
            .json(edit)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let ack: EditResponse = response.json().await?;
        if !ack.ok {
            return Err(Error::Upstream {
                status: 200,
                message: format!("edit of {} not acknowledged", edit.id),
            });
        }
        Ok(())
    }
}
