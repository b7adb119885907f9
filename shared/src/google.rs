//! Google OAuth and Calendar API client.
//!
//! Covers the authorization-code exchange, access token refresh and the
//! paginated events listing that backs the busy-block projection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::ExternalEvent;
use crate::secrets::GoogleOAuthCredentials;
use crate::{Error, Result};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Scopes requested when linking a calendar. Busy blocks only need read access.
pub const CALENDAR_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events.readonly",
];

/// Google OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Google Calendar event from API
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleCalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: GoogleEventTime,
    pub end: Option<GoogleEventTime>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleEventTime {
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventListResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// Client for Google's OAuth and Calendar endpoints.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    credentials: GoogleOAuthCredentials,
    redirect_uri: String,
    token_url: String,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(credentials: GoogleOAuthCredentials, redirect_uri: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            redirect_uri: redirect_uri.into(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: GOOGLE_CALENDAR_API.to_string(),
        }
    }

    /// Point the client at alternative endpoints (used against mock servers).
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    /// Consent screen URL. `state` round-trips back to the callback.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&CALENDAR_SCOPES.join(" ")),
            urlencoding::encode(state)
        )
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokens> {
        let params = [
            ("code", code),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status, message });
        }

        Ok(response.json().await?)
    }

    /// Refresh an access token. A rejected refresh token means the link is gone.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String> {
        let params = [
            ("refresh_token", refresh_token),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
            // invalid_grant: revoked or expired refresh token
            return Err(Error::NotConnected);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status: status.as_u16(), message });
        }

        let tokens: GoogleTokens = response.json().await?;
        Ok(tokens.access_token)
    }

    /// Fetch events from the primary calendar, following pagination.
    pub async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleCalendarEvent>> {
        let url = format!("{}/calendars/primary/events", self.api_base);
        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", "250".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                return Err(Error::NotConnected);
            }
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                return Err(Error::Upstream { status, message });
            }

            let page: GoogleEventListResponse = response.json().await?;
            if let Some(items) = page.items {
                all_events.extend(items);
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Fetched {} Google events", all_events.len());
        Ok(all_events)
    }

    /// Busy blocks for the range: refreshes the token when possible, then lists
    /// events and projects them to the wire shape.
    pub async fn busy_blocks(
        &self,
        tokens: &GoogleTokens,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<ExternalEvent>> {
        let access_token = match &tokens.refresh_token {
            Some(refresh_token) => self.refresh_access_token(refresh_token).await?,
            None => tokens.access_token.clone(),
        };

        let events = self.list_events(&access_token, time_min, time_max).await?;
        Ok(events.iter().filter_map(to_external_event).collect())
    }
}

/// Project a Google event to a busy block. Cancelled or timeless events are dropped.
pub fn to_external_event(event: &GoogleCalendarEvent) -> Option<ExternalEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let Some(start) = event_time_string(&event.start) else {
        warn!("Skipping Google event {} without a start time", event.id);
        return None;
    };

    Some(ExternalEvent {
        id: event.id.clone(),
        title: event.summary.clone(),
        start,
        end: event.end.as_ref().and_then(event_time_string),
    })
}

fn event_time_string(time: &GoogleEventTime) -> Option<String> {
    if let Some(date_time) = &time.date_time {
        let dt = DateTime::parse_from_rfc3339(date_time).ok()?;
        Some(dt.with_timezone(&Utc).to_rfc3339())
    } else if let Some(date) = &time.date {
        // All-day event (date only)
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        Some(date.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new(
            GoogleOAuthCredentials {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
            },
            "https://api.example.com/calendar/oauth/callback",
        )
        .with_endpoints(format!("{}/token", server.uri()), server.uri())
    }

    fn range() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 2, 26, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 3, 23, 59, 59).unwrap(),
        )
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let client = GoogleCalendarClient::new(
            GoogleOAuthCredentials {
                client_id: "abc.apps.googleusercontent.com".to_string(),
                client_secret: "s".to_string(),
            },
            "https://api.example.com/cb",
        );
        let url = client.authorization_url("dXNlcl8yYWJj");
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("state=dXNlcl8yYWJj"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapi.example.com%2Fcb"));
    }

    #[test]
    fn test_cancelled_and_all_day_events() {
        let cancelled = GoogleCalendarEvent {
            id: "a".to_string(),
            summary: None,
            start: GoogleEventTime { date_time: Some("2024-03-01T09:00:00+01:00".to_string()), date: None },
            end: None,
            status: Some("cancelled".to_string()),
        };
        assert!(to_external_event(&cancelled).is_none());

        let all_day = GoogleCalendarEvent {
            id: "b".to_string(),
            summary: Some("Offsite".to_string()),
            start: GoogleEventTime { date_time: None, date: Some("2024-03-01".to_string()) },
            end: Some(GoogleEventTime { date_time: None, date: Some("2024-03-02".to_string()) }),
            status: Some("confirmed".to_string()),
        };
        let block = to_external_event(&all_day).unwrap();
        assert_eq!(block.start, "2024-03-01");
        assert_eq!(block.end.as_deref(), Some("2024-03-02"));

        let timed = GoogleCalendarEvent {
            id: "c".to_string(),
            summary: Some("Standup".to_string()),
            start: GoogleEventTime { date_time: Some("2024-03-01T09:00:00+01:00".to_string()), date: None },
            end: Some(GoogleEventTime { date_time: Some("2024-03-01T09:15:00+01:00".to_string()), date: None }),
            status: None,
        };
        let block = to_external_event(&timed).unwrap();
        assert_eq!(block.start, "2024-03-01T08:00:00+00:00");
    }

    #[tokio::test]
    async fn test_list_events_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{ "id": "second", "start": { "date": "2024-03-02" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{ "id": "first", "start": { "date": "2024-03-01" } }],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let (min, max) = range();
        let events = client(&server).list_events("token-1", min, max).await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unauthorized_means_not_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (min, max) = range();
        let err = client(&server).list_events("stale", min, max).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_busy_blocks_refreshes_token_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    { "id": "ev1", "summary": "Dentist",
                      "start": { "dateTime": "2024-02-27T14:00:00Z" },
                      "end": { "dateTime": "2024-02-27T15:00:00Z" } },
                    { "id": "ev2", "status": "cancelled",
                      "start": { "dateTime": "2024-02-28T14:00:00Z" } }
                ]
            })))
            .mount(&server)
            .await;

        let tokens = GoogleTokens {
            access_token: "expired".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_in: None,
            token_type: None,
            scope: None,
        };
        let (min, max) = range();
        let blocks = client(&server).busy_blocks(&tokens, min, max).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "ev1");
        assert_eq!(blocks[0].title.as_deref(), Some("Dentist"));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_means_not_connected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let err = client(&server).refresh_access_token("revoked").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
