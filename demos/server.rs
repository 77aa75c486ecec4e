//! Demo server: ensures the database and catalog tables exist, then serves the common
//! CRUD endpoints for every table described in the catalogs.

use metacrud::{
    app, ensure_audit_table, ensure_catalog_tables, ensure_database_exists, AppState, PgMetadataRepository, PgStore,
    Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metacrud=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;

    ensure_catalog_tables(&pool).await?;
    if let Some(table) = &settings.audit_table {
        ensure_audit_table(&pool, table).await?;
    }

    let listen_addr = settings.listen_addr.clone();
    let state = AppState::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgMetadataRepository::new(pool)),
        settings,
    );

    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
