use dotenv::dotenv;
use ingest::database::init::init_db;
use ingest::logger::system_logger;
use ingest::router::router;
use ingest::Result;
use std::env;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if available
    dotenv().ok();

    // Setup Logging
    let _ = system_logger()?;

    // Initialize the database and obtain a connection pool
    let pool = init_db().await.expect("Error on ingest pool.");

    // Initialize the Axum routing service
    let app = router(pool);

    // Define the address to bind to
    let port: u16 = env::var("INGEST_PORT")
        .expect("INGEST_PORT environment variable is not set.")
        .parse()
        .expect("INGEST_PORT environment variable is not a valid u16 integer.");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    // Run the server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Error binding listener.");
    axum::serve(listener, app)
        .await
        .expect("error on connection.");

    Ok(())
}
