use super::utils::start_transaction;
use crate::database::symbols::{list_instruments_by_type, InstrumentsQueries};
use crate::response::ApiResponse;
use crate::symbols::{Instrument, InstrumentType};
use crate::Result;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use sqlx::PgPool;
use tracing::{error, info};

// Service
pub fn instrument_service() -> Router {
    Router::new()
        .route("/create", post(create_instrument))
        .route("/get", get(get_instrument))
        .route("/update", put(update_instrument))
        .route("/deactivate", put(deactivate_instrument))
        .route("/list_type", get(list_instruments_type))
}

// Handlers
pub async fn create_instrument(
    Extension(pool): Extension<PgPool>,
    Json(instrument): Json<Instrument>,
) -> Result<impl IntoResponse> {
    info!("Handling request to create an instrument {:?}", instrument);

    // Start the transaction
    let mut tx = start_transaction(&pool).await?;

    match instrument.create(&mut tx).await {
        Ok(id) => {
            if let Err(commit_err) = tx.commit().await {
                error!("Failed to commit transaction: {:?}", commit_err);
                return Err(commit_err.into());
            }

            info!("Successfully created instrument with id {}", id);
            Ok(ApiResponse::new(
                "success",
                &format!("Successfully created instrument with id {}", id),
                StatusCode::OK,
                id,
            ))
        }
        Err(e) => {
            error!("Failed to create instrument: {:?}", e);
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

pub async fn get_instrument(
    Extension(pool): Extension<PgPool>,
    Json(symbol): Json<String>,
) -> Result<impl IntoResponse> {
    info!("Handling request to get instrument {}", symbol);

    match Instrument::read(&pool, &symbol).await {
        Ok(vec) => {
            if !vec.is_empty() {
                Ok(ApiResponse::new(
                    "success",
                    "Successfully retrieved instrument.",
                    StatusCode::OK,
                    vec,
                ))
            } else {
                info!("No instrument found for symbol {}", symbol);
                Ok(ApiResponse::new(
                    "success",
                    &format!("No instrument found for symbol {}", symbol),
                    StatusCode::NOT_FOUND,
                    vec![],
                ))
            }
        }
        Err(e) => {
            error!("Failed to retrieve instrument: {:?}", e);
            Err(e)
        }
    }
}

pub async fn update_instrument(
    Extension(pool): Extension<PgPool>,
    Json(instrument): Json<Instrument>,
) -> Result<impl IntoResponse> {
    info!("Handling request to update instrument {:?}", instrument);

    let mut tx = start_transaction(&pool).await?;

    match instrument.update(&mut tx).await {
        Ok(()) => {
            if let Err(commit_err) = tx.commit().await {
                error!("Failed to commit transaction: {:?}", commit_err);
                return Err(commit_err.into());
            }

            Ok(ApiResponse::new(
                "success",
                "Successfully updated instrument.",
                StatusCode::OK,
                "".to_string(),
            ))
        }
        Err(e) => {
            error!("Failed to update instrument: {:?}", e);
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

pub async fn deactivate_instrument(
    Extension(pool): Extension<PgPool>,
    Json(id): Json<i32>,
) -> Result<impl IntoResponse> {
    info!("Handling request to deactivate instrument {}", id);

    let mut tx = start_transaction(&pool).await?;

    match Instrument::deactivate(&mut tx, id).await {
        Ok(()) => {
            if let Err(commit_err) = tx.commit().await {
                error!("Failed to commit transaction: {:?}", commit_err);
                return Err(commit_err.into());
            }

            Ok(ApiResponse::new(
                "success",
                &format!("Successfully deactivated instrument with id {}", id),
                StatusCode::OK,
                "".to_string(),
            ))
        }
        Err(e) => {
            error!("Failed to deactivate instrument: {:?}", e);
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

pub async fn list_instruments_type(
    Extension(pool): Extension<PgPool>,
    Json(instrument_type): Json<InstrumentType>,
) -> Result<impl IntoResponse> {
    info!(
        "Handling request to list instruments for type {}",
        instrument_type
    );

    match list_instruments_by_type(&pool, instrument_type).await {
        Ok(vec) => Ok(ApiResponse::new(
            "success",
            "Successfully retrieved instruments.",
            StatusCode::OK,
            vec,
        )),
        Err(e) => {
            error!("Failed to list instruments: {:?}", e);
            Err(e)
        }
    }
}
