//! Google Calendar OAuth Handler
//!
//! Starts the consent flow for the signed-in user and handles the OAuth2
//! callback from Google: exchanges the authorization code for tokens and
//! stores them in Secrets Manager for the busy-block route.
//!
//! Endpoints:
//! - GET /calendar/oauth/start - Consent URL for the caller
//! - GET /calendar/oauth/callback - Redirect target registered with Google

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::secrets::{get_google_oauth_credentials, store_calendar_tokens};
use shared::{
    authenticate_request, error_response, failure_response, json_response, Config, GoogleCalendarClient,
    OAuthStateSigner, SessionVerifier, StoredCalendarTokens,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONNECTED_PAGE: &str = r#"
<!DOCTYPE html>
<html>
<head><title>Calendar Connected</title></head>
<body>
    <h1>Google Calendar Connected!</h1>
    <p>Your calendar events will now show up next to your moods in Wayfeel.</p>
    <p>You can close this window.</p>
</body>
</html>
"#;

/// Routes served by this Lambda
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Start,
    Callback,
    NotFound,
}

fn route(method: &str, raw_path: &str) -> Route {
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    match (method, path.trim_end_matches('/')) {
        ("GET", "/calendar/oauth/start") => Route::Start,
        ("GET", "/calendar/oauth/callback") => Route::Callback,
        _ => Route::NotFound,
    }
}

/// Application state
struct AppState {
    config: Config,
    secrets_client: aws_sdk_secretsmanager::Client,
    google: GoogleCalendarClient,
    state_signer: OAuthStateSigner,
    verifier: Option<SessionVerifier>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws);

        let credentials = get_google_oauth_credentials(&secrets_client, &config.google_oauth_secret_arn).await?;
        // Keyed by the OAuth client secret, which never leaves the server
        let state_signer = OAuthStateSigner::new(credentials.client_secret.as_bytes());
        let google = GoogleCalendarClient::new(credentials, config.oauth_redirect_uri.clone());
        let verifier = SessionVerifier::from_config(&config)?;

        Ok(Self {
            config,
            secrets_client,
            google,
            state_signer,
            verifier,
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    match route(event.method().as_str(), event.uri().path()) {
        // Initiate OAuth flow - returns URL to redirect user to
        Route::Start => {
            let user = match authenticate_request(&event, state.verifier.as_ref()) {
                Ok(user) => user,
                Err(e) => return failure_response(&e),
            };

            let oauth_state = match state.state_signer.sign(&user.user_id) {
                Ok(signed) => signed,
                Err(e) => {
                    error!("Failed to sign OAuth state for {}: {}", user.user_id, e);
                    return failure_response(&e);
                }
            };
            let auth_url = state.google.authorization_url(&oauth_state);

            json_response(
                200,
                &serde_json::json!({
                    "auth_url": auth_url,
                    "message": "Redirect user to auth_url to connect Google Calendar"
                }),
            )
        }

        // OAuth callback from Google
        Route::Callback => {
            let params = event.query_string_parameters();

            if let Some(error) = params.first("error") {
                error!("OAuth error from Google: {}", error);
                return error_response(400, format!("OAuth error: {}", error));
            }

            let Some(code) = params.first("code") else {
                return error_response(400, "Missing authorization code");
            };

            let user_id = match params.first("state").map(|raw| state.state_signer.verify(raw)) {
                Some(Ok(user_id)) => user_id,
                Some(Err(e)) => {
                    warn!("Rejected OAuth callback: {}", e);
                    return failure_response(&e);
                }
                None => return error_response(400, "Missing state parameter"),
            };

            info!("Processing OAuth callback for user {}", user_id);

            let tokens = match state.google.exchange_code(code).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    error!("Token exchange failed for {}: {}", user_id, e);
                    return failure_response(&e);
                }
            };

            let stored = StoredCalendarTokens {
                provider: "google".to_string(),
                tokens,
                updated_at: chrono::Utc::now(),
            };
            let secret_name = state.config.calendar_secret_name(&user_id);
            if let Err(e) = store_calendar_tokens(&state.secrets_client, &secret_name, &stored).await {
                error!("Failed to store tokens for {}: {}", user_id, e);
                return failure_response(&e);
            }

            Ok(Response::builder()
                .status(200)
                .header("content-type", "text/html")
                .body(Body::from(CONNECTED_PAGE))?)
        }

        Route::NotFound => error_response(404, "Not found"),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(route("GET", "/calendar/oauth/start"), Route::Start);
        assert_eq!(route("GET", "/api/calendar/oauth/start/"), Route::Start);
        assert_eq!(route("GET", "/calendar/oauth/callback/"), Route::Callback);
        assert_eq!(route("POST", "/calendar/oauth/callback"), Route::NotFound);
    }
}
