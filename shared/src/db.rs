//! Database connection management.

use aws_sdk_secretsmanager::Client as SecretsClient;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::secrets::get_database_credentials;
use crate::{Config, DatabaseCredentials, Error, Result};

/// Build the Postgres connection URL from configuration and credentials.
pub fn database_url(config: &Config, credentials: &DatabaseCredentials) -> String {
    let host = credentials.host.as_deref().unwrap_or(&config.db_host);
    let port = credentials.port.unwrap_or(5432);
    let name = credentials.dbname.as_deref().unwrap_or(&config.db_name);

    format!(
        "postgres://{}:{}@{}:{}/{}",
        credentials.username,
        urlencoding::encode(&credentials.password),
        host,
        port,
        name
    )
}

/// Create a database connection pool.
pub async fn create_pool(config: &Config, credentials: &DatabaseCredentials) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url(config, credentials))
        .await
        .map_err(Error::Database)?;

    Ok(pool)
}

/// Resolve database credentials from Secrets Manager and open a pool.
pub async fn connect(config: &Config, secrets: &SecretsClient) -> Result<PgPool> {
    let credentials = get_database_credentials(secrets, &config.db_secret_arn).await?;
    create_pool(config, &credentials).await
}
