//! Prometheus exposition shared by both binaries.
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Histogram buckets in seconds. Upper buckets cover the outbound request timeout.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Route label for requests no route matched; on the webhook API that is every webhook.
const UNMATCHED_ROUTE: &str = "fallback";

pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router).await
}

/// Install the global recorder. Fails if one is already installed in this process.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets(LATENCY_BUCKETS)?
        .install_recorder()
}

/// Expose `handle` at `/metrics` and count every request of `router`.
pub fn setup_metrics_routes(router: Router, handle: PrometheusHandle) -> Router {
    router
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .layer(middleware::from_fn(track_metrics))
}

fn route_label(req: &Request<Body>) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_owned(), |path| path.as_str().to_owned())
}

/// Count and time requests by method, route and status code.
/// Raw paths are never used as labels, so arbitrary webhook paths cannot blow up cardinality.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = route_label(&req);

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt; // for `collect`
    use tower::ServiceExt; // for `oneshot`

    use super::*;

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn unmatched_requests_share_one_label() {
        assert_eq!(route_label(&request("/any/webhook/path")), "fallback");
    }

    #[tokio::test]
    async fn metrics_route_renders_the_handle() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let router = setup_metrics_routes(Router::new(), recorder.handle());

        let response = router.oneshot(request("/metrics")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(std::str::from_utf8(&body).is_ok());
    }
}
