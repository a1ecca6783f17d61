use crate::services::pipeline::pipeline_service;
use axum::{extract::Extension, Router};
use dotenv::dotenv;
use sqlx::PgPool;

pub fn router(pool: PgPool) -> Router {
    // Load environment variables from .env if available
    dotenv().ok();

    Router::new().nest(
        "/pipeline",
        pipeline_service().layer(Extension(pool.clone())),
    )
}
