use crate::Result;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::error;

pub async fn start_transaction(pool: &PgPool) -> Result<Transaction<'static, Postgres>> {
    pool.begin().await.map_err(|e| {
        error!("Failed to connect to database: {:?}", e);
        e.into()
    })
}
