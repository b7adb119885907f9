//! Calendar Events Lambda - Persists drag/resize edits of mood markers.
//!
//! Endpoints:
//! - PATCH /calendar/events - Move or resize one of the caller's markers

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::{
    authenticate_request, error_response, failure_response, json_response, Config, EditRequest, EditResponse,
    SessionVerifier,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// A checked edit, ready to be written.
#[derive(Debug, PartialEq)]
struct MarkerEdit {
    marker_id: Uuid,
    request: EditRequest,
}

/// Only internal events (marker UUIDs) with a non-inverted window are editable.
fn check_edit(request: EditRequest) -> Result<MarkerEdit, String> {
    let marker_id = Uuid::parse_str(&request.id)
        .map_err(|_| format!("Event {} is not an editable marker", request.id))?;

    if request.end < request.start {
        return Err("end must not be before start".to_string());
    }

    Ok(MarkerEdit { marker_id, request })
}

/// Application state
struct AppState {
    db_pool: PgPool,
    verifier: Option<SessionVerifier>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws);

        let db_pool = shared::db::connect(&config, &secrets_client).await?;
        let verifier = SessionVerifier::from_config(&config)?;

        Ok(Self { db_pool, verifier })
    }

    /// Returns false when no marker with that id belongs to the user.
    async fn apply_edit(&self, user_id: &str, edit: &MarkerEdit) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE markers
            SET created_at = $3, end_at = $4
            WHERE id = $1 AND created_by = $2
            "#,
        )
        .bind(edit.marker_id)
        .bind(user_id)
        .bind(edit.request.start)
        .bind(edit.request.end)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    if (method, path.trim_end_matches('/')) != ("PATCH", "/calendar/events") {
        return error_response(404, "Not found");
    }

    let user = match authenticate_request(&event, state.verifier.as_ref()) {
        Ok(user) => user,
        Err(e) => return failure_response(&e),
    };

    let request: EditRequest = shared::parse_body!(event.body());
    let edit = match check_edit(request) {
        Ok(edit) => edit,
        Err(message) => {
            warn!("Rejected edit from {}: {}", user.user_id, message);
            return error_response(400, message);
        }
    };

    match state.apply_edit(&user.user_id, &edit).await {
        Ok(true) => {
            info!(
                "Moved marker {} to {}..{}",
                edit.marker_id,
                edit.request.start.to_rfc3339(),
                edit.request.end.to_rfc3339()
            );
            json_response(200, &EditResponse { ok: true })
        }
        Ok(false) => error_response(404, "Marker not found"),
        Err(e) => {
            error!("Failed to update marker {}: {}", edit.marker_id, e);
            error_response(500, "Failed to update marker")
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
