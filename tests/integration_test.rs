use axum::http::StatusCode;
use chrono::Utc;
use ingest::calendar;
use ingest::models::{Job, JobDetail, JobStatus};
use instrument::symbols::{Exchange, Instrument, InstrumentType};
use serde_json::{json, Value};
use serial_test::serial;
use sqlx::PgPool;
use tests::{request, stooq_csv};

async fn init_pool() -> PgPool {
    dotenv::dotenv().ok();
    ingest::database::init::init_db()
        .await
        .expect("Error on init_db pool.")
}

async fn cleanup_symbol(pool: &PgPool, symbol: &str) {
    let id: Option<i32> = sqlx::query_scalar("SELECT id FROM instruments WHERE symbol = $1")
        .bind(symbol)
        .fetch_optional(pool)
        .await
        .unwrap_or(None);

    if let Some(id) = id {
        for table in ["quality_metrics", "price_records"] {
            let _ = sqlx::query(&format!("DELETE FROM {} WHERE instrument_id = $1", table))
                .bind(id)
                .execute(pool)
                .await;
        }
        let _ = sqlx::query("DELETE FROM instruments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await;
    }
}

async fn cleanup_job(pool: &PgPool, job_id: i32) {
    let _ = sqlx::query("DELETE FROM etl_job_details WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await;
    let _ = sqlx::query("DELETE FROM etl_jobs WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_end_to_end_run_and_observability() -> anyhow::Result<()> {
    let pool = init_pool().await;
    let as_of = calendar::latest_trading_day_on_or_before(Utc::now().date_naive());

    // Stand in for the upstream provider.
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", mockito::Matcher::Regex("/q/d/l/.*".to_string()))
        .with_status(200)
        .with_body(stooq_csv(35, as_of))
        .create_async()
        .await;
    std::env::set_var("STOOQ_BASE_URL", server.url());
    std::env::set_var("ETL_FETCH_DELAY_MS", "1");

    // Onboard one instrument through the registry service.
    let registry = instrument::router::router(pool.clone());
    let e2e = Instrument::new(
        None,
        "E2E1",
        "End to end tester",
        InstrumentType::Stock,
        Exchange::Wse,
        "PLN",
        true,
        None,
        None,
    );
    let (status, created): (StatusCode, ingest::response::ApiResponse<i32>) =
        request(registry, "POST", "/instruments/create", Some(&e2e)).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(created.data > 0);

    // Test: trigger a run with a fully automatic configuration.
    let app = ingest::router::router(pool.clone());
    let (status, run_response): (StatusCode, ingest::response::ApiResponse<Job>) =
        request(app.clone(), "POST", "/pipeline/run", Some(&json!({}))).await?;

    // Validate
    assert_eq!(status, StatusCode::OK);
    let job = run_response.data;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_inserted, 35);
    let job_id = job.id.expect("Job id missing.");

    // The observability surface reflects the finished run.
    let (status, polled): (StatusCode, ingest::response::ApiResponse<Option<Job>>) =
        request::<Value, _>(app.clone(), "GET", &format!("/pipeline/jobs/{}", job_id), None)
            .await?;
    assert_eq!(status, StatusCode::OK);
    let polled_job = polled.data.expect("Job not found.");
    assert_eq!(polled_job.records_inserted, 35);
    assert!(polled_job.duration_seconds.is_some());

    let (_, details): (StatusCode, ingest::response::ApiResponse<Vec<JobDetail>>) = request::<
        Value,
        _,
    >(
        app.clone(),
        "GET",
        &format!("/pipeline/jobs/{}/details", job_id),
        None,
    )
    .await?;
    assert_eq!(
        details
            .data
            .iter()
            .filter(|d| d.symbol == "E2E1")
            .count(),
        35
    );

    // Cancelling a finished job is refused.
    let (status, _): (StatusCode, ingest::response::ApiResponse<String>) = request::<Value, _>(
        app.clone(),
        "POST",
        &format!("/pipeline/jobs/{}/cancel", job_id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // Cleanup
    cleanup_job(&pool, job_id).await;
    cleanup_symbol(&pool, "E2E1").await;

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_malformed_config_creates_no_job() -> anyhow::Result<()> {
    let pool = init_pool().await;

    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM etl_jobs")
        .fetch_one(&pool)
        .await?;

    // Test
    let app = ingest::router::router(pool.clone());
    let (status, _): (StatusCode, ingest::response::ApiResponse<String>) = request(
        app,
        "POST",
        "/pipeline/run",
        Some(&json!({ "extraction_mode": "sideways" })),
    )
    .await?;

    // Validate: rejected before any instrument or job record was touched.
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM etl_jobs")
        .fetch_one(&pool)
        .await?;
    assert_eq!(before, after);

    Ok(())
}
