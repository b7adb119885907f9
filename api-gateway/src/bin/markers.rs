//! Markers Lambda - Reads and creates mood markers.
//!
//! Endpoints:
//! - GET /markers - List the caller's markers
//! - POST /markers - Create a marker

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::{
    authenticate_request, error_response, failure_response, json_response, Config, MarkerRecord, NewMarker,
    SessionVerifier,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use validator::Validate;

const MARKER_COLUMNS: &str =
    "id, created_at, end_at, latitude, longitude, emoji_id, text, created_by, anon";

/// Routes served by this Lambda
#[derive(Debug, PartialEq, Eq)]
enum Route {
    List,
    Create,
    NotFound,
}

fn route(method: &str, raw_path: &str) -> Route {
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let path = path.trim_end_matches('/');

    match (method, path) {
        ("GET", "/markers") => Route::List,
        ("POST", "/markers") => Route::Create,
        _ => Route::NotFound,
    }
}

/// A caller may only list their own markers.
fn may_read(caller: &str, requested: Option<&str>) -> bool {
    requested.map_or(true, |requested| requested == caller)
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

    async fn list_markers(&self, user_id: &str) -> Result<Vec<MarkerRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM markers WHERE created_by = $1 ORDER BY created_at",
            MARKER_COLUMNS
        );

        sqlx::query_as::<_, MarkerRecord>(&query)
            .bind(user_id)
            .fetch_all(&self.db_pool)
            .await
    }

    async fn create_marker(&self, user_id: &str, marker: &NewMarker) -> Result<MarkerRecord, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO markers (id, created_at, end_at, latitude, longitude, emoji_id, text, created_by, anon)
            VALUES ($1, COALESCE($2, NOW()), $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            MARKER_COLUMNS
        );

        sqlx::query_as::<_, MarkerRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(marker.created_at)
            .bind(marker.end_at)
            .bind(marker.latitude)
            .bind(marker.longitude)
            .bind(marker.emoji_id)
            .bind(&marker.text)
            .bind(user_id)
            .bind(marker.anon)
            .fetch_one(&self.db_pool)
            .await
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let route = route(method, event.uri().path());

    let user = match authenticate_request(&event, state.verifier.as_ref()) {
        Ok(user) => user,
        Err(e) => return failure_response(&e),
    };

    match route {
        Route::List => {
            let params = event.query_string_parameters();
            if !may_read(&user.user_id, params.first("user_id")) {
                return error_response(403, "Cannot read another user's markers");
            }

            match state.list_markers(&user.user_id).await {
                Ok(markers) => {
                    info!("Listed {} markers for {}", markers.len(), user.user_id);
                    json_response(200, &markers)
                }
                Err(e) => {
                    error!("Failed to list markers for {}: {}", user.user_id, e);
                    error_response(500, "Failed to load markers")
                }
            }
        }

        Route::Create => {
            let request: NewMarker = shared::parse_body!(event.body());
            if let Err(e) = request.validate() {
                return failure_response(&shared::Error::from(e));
            }

            match state.create_marker(&user.user_id, &request).await {
                Ok(marker) => {
                    info!("Created marker {} for {}", marker.id, user.user_id);
                    json_response(201, &marker)
                }
                Err(e) => {
                    error!("Failed to create marker for {}: {}", user.user_id, e);
                    error_response(500, "Failed to create marker")
                }
            }
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
