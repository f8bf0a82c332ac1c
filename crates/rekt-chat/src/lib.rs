//! REKT chat service
//!
//! Axum REST service backing the prediction chat, the off-chain market
//! mirror and wallet users. Storage is SQLite via sqlx.
//!
//! # Routes
//! - `/api/chats` - GET (by id or paged), POST, PUT `?id=`, DELETE `?id=`
//! - `/api/markets` - GET (by `marketId` or all), POST, PUT, DELETE
//! - `/api/users` - GET (by `walletAddress` or all), POST, PUT, DELETE

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod store;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use store::Store;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tracing::info;

/// Default page size for chat listings
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page a client may request
pub const MAX_PAGE_LIMIT: u32 = 500;

pub fn router(store: Store) -> Router {
    Router::new()
        .route(
            "/api/chats",
            get(routes::chats::get)
                .post(routes::chats::create)
                .put(routes::chats::update)
                .delete(routes::chats::remove),
        )
        .route(
            "/api/markets",
            get(routes::markets::get)
                .post(routes::markets::create)
                .put(routes::markets::update)
                .delete(routes::markets::remove),
        )
        .route(
            "/api/users",
            get(routes::users::get)
                .post(routes::users::create)
                .put(routes::users::update)
                .delete(routes::users::remove),
        )
        .with_state(store)
}

/// Open the database, apply the schema and serve until Ctrl+C
pub async fn serve(config: &ServerConfig) -> Result<()> {
    let pool = db::connect(&config.database_url).await?;
    db::init_schema(&pool).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Chat service listening on {}", config.bind_addr);

    axum::serve(listener, router(Store::new(pool)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down chat service");
        })
        .await
        .context("Chat service failed")
}
