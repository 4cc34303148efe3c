//! HTTP request tracking middleware

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;

/// Record request latency and counts per method, route and status
pub async fn track_metrics(req: Request, next: Next) -> Result<Response, StatusCode> {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &endpoint, &status])
        .observe(duration);

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, &status])
        .inc();

    tracing::debug!(%method, %endpoint, %status, duration_ms = duration * 1000.0, "Request served");

    Ok(response)
}

/// Collapse dynamic path parameters so metric labels stay bounded.
///
/// User ids are numeric; segment names appear only under `/segments/`.
fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut previous = "";

    for part in path.split('/').filter(|p| !p.is_empty()) {
        if part.chars().all(|c| c.is_ascii_digit()) {
            normalized.push("{id}");
        } else if previous == "segments" {
            normalized.push("{name}");
        } else {
            normalized.push(part);
        }
        previous = part;
    }

    format!("/{}", normalized.join("/"))
}
