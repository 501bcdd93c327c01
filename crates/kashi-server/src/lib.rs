// crates/kashi-server/src/lib.rs
//! Kashi server library.
//!
//! Axum HTTP server for the lyric translation pipeline: job submission,
//! status queries, result retrieval and long-poll change notifications, with
//! an in-process worker pool doing the generation calls.

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod queue;
pub mod routes;
pub mod state;
pub mod store;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::jobs::router())
        .merge(routes::debug::router())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::test_support::test_state;

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();

        (status, body_str)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_app(test_state());
        let (status, body) = get(app, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"ok\":true"));
        assert!(body.contains("\"version\""));
        assert!(body.contains("\"uptime_secs\""));
    }

    #[tokio::test]
    async fn test_jobs_requires_auth() {
        let app = create_app(test_state());
        let (status, _) = get(app, "/jobs/recent").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_app(test_state());
        let (status, _) = get(app, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_debug_route_with_dev_auth() {
        let app = create_app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/debug/queue")
                    .header("x-app-secret", "test-app-secret")
                    .header("authorization", "Bearer test-bypass")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["queue"]["depth"], 0);
        assert_eq!(json["waiters"], 0);
    }
}
