use axum::http::{Request, StatusCode};
use axum::{body::Body, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Build a request against an in-process router and decode the standard
/// response envelope.
pub async fn request<B: Serialize, T: DeserializeOwned>(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<&B>,
) -> anyhow::Result<(StatusCode, ingest::response::ApiResponse<T>)> {
    use tower::ServiceExt;

    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(serde_json::to_string(body)?))?
        }
        None => builder.body(Body::empty())?,
    };

    let response = app.oneshot(request).await?;
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let api_response = serde_json::from_slice(&body_bytes)?;

    Ok((status, api_response))
}

/// Daily CSV payload in the provider's shape, ending at `as_of`.
pub fn stooq_csv(days: usize, as_of: chrono::NaiveDate) -> String {
    let mut csv = String::from("Date,Open,High,Low,Close,Volume\n");
    for i in 0..days {
        let date = as_of - chrono::Duration::days((days - 1 - i) as i64);
        csv.push_str(&format!("{},6.70,6.90,6.60,6.80,{}\n", date, 100000 + i));
    }
    csv
}
