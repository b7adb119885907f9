//! Google Events Lambda - Projects the caller's Google Calendar into busy blocks.
//!
//! Endpoints:
//! - GET /calendar/google/events?timeMin=..&timeMax=.. - Busy blocks in range
//!
//! Responds 401 when the caller has not linked Google Calendar (or the link
//! was revoked); the client treats that as "not connected". A rejected session
//! is answered with 403 so it cannot be mistaken for a missing link.

use chrono::{DateTime, Utc};
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::secrets::{get_google_oauth_credentials, load_calendar_tokens};
use shared::{
    authenticate_request, error_response, failure_response, json_response, Config, ExternalEventsResponse,
    GoogleCalendarClient, SessionVerifier,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Parse and order the requested window.
fn parse_range(time_min: Option<&str>, time_max: Option<&str>) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    let parse = |name: &str, value: Option<&str>| -> Result<DateTime<Utc>, String> {
        let value = value.ok_or_else(|| format!("{} parameter required", name))?;
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| format!("{} must be an ISO 8601 date-time", name))
    };

    let min = parse("timeMin", time_min)?;
    let max = parse("timeMax", time_max)?;
    if max < min {
        return Err("timeMax must not be before timeMin".to_string());
    }
    Ok((min, max))
}

/// 401 on this route means "calendar not linked"; session failures get 403.
fn session_rejected(err: &shared::Error) -> Result<Response<Body>, Error> {
    warn!("Rejected busy-block request: {}", err);
    error_response(403, "Session not authenticated")
}

/// Application state
struct AppState {
    config: Config,
    secrets_client: aws_sdk_secretsmanager::Client,
    google: GoogleCalendarClient,
    verifier: Option<SessionVerifier>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws);

        let credentials = get_google_oauth_credentials(&secrets_client, &config.google_oauth_secret_arn).await?;
        let google = GoogleCalendarClient::new(credentials, config.oauth_redirect_uri.clone());
        let verifier = SessionVerifier::from_config(&config)?;

        Ok(Self {
            config,
            secrets_client,
            google,
            verifier,
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    if (method, path.trim_end_matches('/')) != ("GET", "/calendar/google/events") {
        return error_response(404, "Not found");
    }

    let user = match authenticate_request(&event, state.verifier.as_ref()) {
        Ok(user) => user,
        Err(e) => return session_rejected(&e),
    };

    let params = event.query_string_parameters();
    let (time_min, time_max) = match parse_range(params.first("timeMin"), params.first("timeMax")) {
        Ok(range) => range,
        Err(message) => return error_response(400, message),
    };

    let secret_name = state.config.calendar_secret_name(&user.user_id);
    let stored = match load_calendar_tokens(&state.secrets_client, &secret_name).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return error_response(401, "Google Calendar not connected"),
        Err(e) => {
            error!("Failed to load calendar tokens for {}: {}", user.user_id, e);
            return failure_response(&e);
        }
    };

    match state.google.busy_blocks(&stored.tokens, time_min, time_max).await {
        Ok(events) => {
            info!("Returning {} busy blocks for {}", events.len(), user.user_id);
            json_response(200, &ExternalEventsResponse { events })
        }
        Err(shared::Error::NotConnected) => error_response(401, "Google Calendar not connected"),
        Err(e) => {
            error!("Failed to fetch Google events for {}: {}", user.user_id, e);
            failure_response(&e)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
