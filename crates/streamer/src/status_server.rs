//! Status HTTP server for the restreamer
//!
//! Lets a UI poll the session and issue stop / quality commands against the
//! same supervisor the CLI drives.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SupervisorError;
use crate::status::StreamStatus;
use crate::supervisor::StreamSupervisor;

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityBody {
    pub quality: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, err: SupervisorError) -> Response {
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Handler for GET /status
async fn get_status(State(supervisor): State<StreamSupervisor>) -> Json<StreamStatus> {
    Json(supervisor.status().await)
}

/// Handler for POST /stop
async fn post_stop(State(supervisor): State<StreamSupervisor>) -> Response {
    match supervisor.stop().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, e),
    }
}

/// Handler for GET /quality
async fn get_quality(State(supervisor): State<StreamSupervisor>) -> Json<QualityBody> {
    Json(QualityBody {
        quality: supervisor.quality().await,
    })
}

/// Handler for PUT /quality
async fn put_quality(
    State(supervisor): State<StreamSupervisor>,
    Json(body): Json<QualityBody>,
) -> Response {
    match supervisor.set_quality(&body.quality).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

/// Creates the axum Router with the status and control endpoints
pub fn create_status_router(supervisor: StreamSupervisor) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/stop", post(post_stop))
        .route("/quality", get(get_quality).put(put_quality))
        .with_state(supervisor)
}

/// Runs the status HTTP server on `bind` until the process exits
pub async fn run_status_server(supervisor: StreamSupervisor, bind: &str) -> Result<(), ServerError> {
    let addr: std::net::SocketAddr = bind
        .parse()
        .map_err(|_| ServerError::InvalidAddress(bind.to_string()))?;

    let app = create_status_router(supervisor);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Status server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binaries::BinaryLocator;
    use crate::launcher::Launcher;
    use crate::probe::FixedDuration;
    use crate::supervisor::SupervisorSettings;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn idle_supervisor() -> StreamSupervisor {
        let locator = BinaryLocator::with_paths("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        StreamSupervisor::new(
            Launcher::new(locator),
            Arc::new(FixedDuration(0.0)),
            SupervisorSettings::default(),
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn put_quality_request(quality: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/quality")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_vec(&QualityBody {
                    quality: quality.to_string(),
                })
                .unwrap(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_status_idle() {
        let app = create_status_router(idle_supervisor());

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .expect("should have content-type header");
        assert!(content_type.to_str().unwrap().contains("application/json"));

        let json = body_json(response).await;
        assert_eq!(json["isStreaming"], false);
        assert_eq!(json["connectionHealth"], "disconnected");
        assert_eq!(json["quality"], "high");
        assert_eq!(json["maxRetries"], 3);
    }

    #[tokio::test]
    async fn test_stop_when_idle_conflicts() {
        let app = create_status_router(idle_supervisor());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"], SupervisorError::NotStreaming.to_string());
    }

    #[tokio::test]
    async fn test_quality_round_trip_through_router() {
        let supervisor = idle_supervisor();
        let app = create_status_router(supervisor.clone());

        let response = app.clone().oneshot(put_quality_request("low")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(supervisor.quality().await, "low");

        let response = app
            .oneshot(Request::builder().uri("/quality").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["quality"], "low");
    }

    #[tokio::test]
    async fn test_put_unknown_quality_rejected() {
        let supervisor = idle_supervisor();
        let app = create_status_router(supervisor.clone());

        let response = app.oneshot(put_quality_request("8k")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("8k"));
        assert_eq!(supervisor.quality().await, "high");
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let result = run_status_server(idle_supervisor(), "not an address").await;
        assert!(matches!(result, Err(ServerError::InvalidAddress(_))));
    }
}
