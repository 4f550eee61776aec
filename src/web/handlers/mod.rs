use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::camera::CameraId;
use crate::config::MAX_PROBE_INDEX;
use crate::error::{AppError, Result};
use crate::registry::CameraState;
use crate::state::AppState;
use crate::stream::mjpeg::STREAM_CONTENT_TYPE;
use crate::stream::{capture_snapshot, resolve_client_id, StreamSession};

const USAGE: &str =
    "Use /cam/<index> for stream, /cam/<index>/status, /cam/<index>/restart, /cam/<index>/snapshot, /cameras";

fn parse_camera_id(raw: &str) -> Result<CameraId> {
    raw.parse::<u32>()
        .map(CameraId)
        .map_err(|_| AppError::BadRequest(format!("Invalid camera index: {}", raw)))
}

// ============================================================================
// Health & Info
// ============================================================================

pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": USAGE }))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn not_found() -> AppError {
    AppError::NotFound(USAGE.to_string())
}

// ============================================================================
// Camera status & control
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CameraStatusResponse {
    pub camera_index: u32,
    pub camera_active: bool,
    pub connected_clients: u32,
    pub state: CameraState,
    pub epoch: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
}

pub async fn cam_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CameraStatusResponse>> {
    let id = parse_camera_id(&id)?;
    let status = state.registry.status(id);
    Ok(Json(CameraStatusResponse {
        camera_index: id.index(),
        camera_active: status.active,
        connected_clients: status.viewers,
        state: status.state,
        epoch: status.epoch,
        frames_published: status.frames_published,
        frames_dropped: status.frames_dropped,
    }))
}

#[derive(Debug, Serialize)]
pub struct RestartResponse {
    pub camera_index: u32,
    pub status: &'static str,
}

/// Close the camera now; it reopens on the next viewer
pub async fn cam_restart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RestartResponse>> {
    let id = parse_camera_id(&id)?;
    let was_open = state.registry.restart(id).await;
    info!(camera = %id, was_open, "Camera restart requested");
    Ok(Json(RestartResponse {
        camera_index: id.index(),
        status: "restarting",
    }))
}

#[derive(Debug, Deserialize)]
pub struct CamerasQuery {
    pub max_index: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CamerasResponse {
    pub available_cameras: Vec<u32>,
}

pub async fn list_cameras(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CamerasQuery>,
) -> Result<Json<CamerasResponse>> {
    let max_index = query
        .max_index
        .unwrap_or(state.config.camera.probe_max_index);
    if max_index > MAX_PROBE_INDEX {
        return Err(AppError::BadRequest(format!(
            "max_index must be at most {}",
            MAX_PROBE_INDEX
        )));
    }

    let available = state.registry.list_available(max_index).await;
    Ok(Json(CamerasResponse {
        available_cameras: available.into_iter().map(|id| id.index()).collect(),
    }))
}

// ============================================================================
// Streaming
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub client_id: Option<String>,
}

/// MJPEG stream endpoint
pub async fn cam_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Response> {
    let id = parse_camera_id(&id)?;
    let client_id = resolve_client_id(query.client_id);

    let session =
        StreamSession::attach(&state.registry, id, client_id, state.session_settings()).await?;

    // Capacity 1: a slow viewer only ever holds one pending part
    let (tx, mut rx) = tokio::sync::mpsc::channel::<bytes::Bytes>(1);
    tokio::spawn(session.run(tx));

    let body_stream = async_stream::stream! {
        while let Some(data) = rx.recv().await {
            yield Ok::<bytes::Bytes, std::io::Error>(data);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body_stream))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Single JPEG snapshot
pub async fn cam_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_camera_id(&id)?;

    match capture_snapshot(&state.registry, id, state.session_settings()).await? {
        Some(jpeg) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            jpeg,
        )
            .into_response()),
        None => Err(AppError::ServiceUnavailable(format!(
            "No frame available from camera {}",
            id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::MockBackend;
    use crate::config::AppConfig;
    use crate::registry::{CameraRegistry, RegistryConfig};
    use futures::StreamExt;
    use std::time::Duration;

    fn app_state(mock: &MockBackend) -> Arc<AppState> {
        let registry = Arc::new(CameraRegistry::new(
            Arc::new(mock.clone()),
            RegistryConfig::new().capture_timeout(Duration::from_millis(20)),
        ));
        AppState::new(AppConfig::default(), registry)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_of_idle_camera() {
        let mock = MockBackend::new([0]);
        let state = app_state(&mock);

        let Json(status) = cam_status(State(state), Path("0".to_string())).await.unwrap();
        assert_eq!(status.camera_index, 0);
        assert!(!status.camera_active);
        assert_eq!(status.connected_clients, 0);
        assert_eq!(mock.opens(0), 0);
    }

    #[tokio::test]
    async fn test_invalid_index_is_bad_request() {
        let mock = MockBackend::new([0]);
        let err = cam_status(State(app_state(&mock)), Path("abc".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let response = err.into_response();
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_stream_headers_and_first_part() {
        let mock = MockBackend::new([0]);
        let state = app_state(&mock);

        let response = cam_stream(
            State(state.clone()),
            Path("0".to_string()),
            Query(StreamQuery {
                client_id: Some("test".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");

        let mut body = response.into_body().into_data_stream();
        let part = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: "));

        let Json(status) = cam_status(State(state.clone()), Path("0".to_string()))
            .await
            .unwrap();
        assert!(status.camera_active);
        assert_eq!(status.connected_clients, 1);

        // Viewer goes away: the camera closes
        drop(body);
        for _ in 0..100 {
            if !state.registry.status(CameraId(0)).active {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!state.registry.status(CameraId(0)).active);
    }

    #[tokio::test]
    async fn test_stream_attach_failure_is_503_json() {
        let mock = MockBackend::new([0]);
        mock.claim_externally(0);
        let state = app_state(&mock);

        let err = cam_stream(
            State(state),
            Path("0".to_string()),
            Query(StreamQuery { client_id: None }),
        )
        .await
        .unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("busy"));
    }

    #[tokio::test]
    async fn test_restart_response() {
        let mock = MockBackend::new([0]);
        let state = app_state(&mock);
        let _lease = state.registry.attach(CameraId(0)).await.unwrap();

        let Json(body) = cam_restart(State(state.clone()), Path("0".to_string()))
            .await
            .unwrap();
        assert_eq!(body.camera_index, 0);
        assert_eq!(body.status, "restarting");
        assert!(!state.registry.status(CameraId(0)).active);
        assert_eq!(mock.closes(0), 1);
    }

    #[tokio::test]
    async fn test_list_cameras() {
        let mock = MockBackend::new([0, 2]);
        let state = app_state(&mock);

        let Json(body) = list_cameras(
            State(state.clone()),
            Query(CamerasQuery { max_index: None }),
        )
        .await
        .unwrap();
        assert_eq!(body.available_cameras, vec![0, 2]);

        let Json(body) = list_cameras(
            State(state.clone()),
            Query(CamerasQuery { max_index: Some(1) }),
        )
        .await
        .unwrap();
        assert_eq!(body.available_cameras, vec![0]);

        assert!(list_cameras(State(state), Query(CamerasQuery { max_index: Some(1000) }))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_snapshot() {
        let mock = MockBackend::new([0]);
        let state = app_state(&mock);

        let response = cam_snapshot(State(state.clone()), Path("0".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(state.registry.status(CameraId(0)).viewers, 0);
    }

    #[tokio::test]
    async fn test_index_lists_routes() {
        let Json(body) = index().await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("/cam/<index>/restart"));
        assert!(not_found().await.into_response().status() == StatusCode::NOT_FOUND);
    }
}
