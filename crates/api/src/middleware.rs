use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{Instrument, info, info_span, warn};

/// Wraps each request in a span and logs its outcome.
///
/// Server errors are logged at `warn`; everything else at `info`.
pub async fn trace_requests(req: Request, next: Next) -> Response {
    let span = info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        let started = Instant::now();
        let response = next.run(req).await;
        let status = response.status().as_u16();
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if response.status().is_server_error() {
            warn!(status, elapsed_ms, "request failed");
        } else {
            info!(status, elapsed_ms, "request completed");
        }
        response
    }
    .instrument(span)
    .await
}
