//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::effects::{EffectInfo, EffectRegistry};
use crate::engine::{ControlEvent, EngineHandle, EngineStatus};
use crate::error::{ConfigError, Error};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// Body of the effect and playlist endpoints
#[derive(Debug, Deserialize)]
pub struct EffectRequest {
    pub effect: String,
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Config(ConfigError::Persist(_) | ConfigError::Io(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Error::Config(_) | Error::Playback(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T>(result: Result<T, Error>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// Apply an event on the blocking pool, then read the result back
///
/// Config and playlist writes save the document while holding the config
/// lock, so they stay off the async workers.
async fn apply_blocking<T, F>(state: Arc<AppState>, event: ControlEvent, read: F) -> Result<T, Error>
where
    F: FnOnce(&EngineHandle) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        state.engine.apply(event)?;
        Ok::<T, Error>(read(&state.engine))
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<EngineStatus>> {
    Json(ApiResponse::ok(state.engine.status()))
}

/// Get the full config document
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ApiResponse<AppConfig>> {
    Json(ApiResponse::ok(state.engine.config()))
}

/// Merge a partial config document
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> ApiResult<AppConfig> {
    respond(apply_blocking(state, ControlEvent::UpdateConfig(patch), |e| e.config()).await)
}

/// Pin an effect (manual mode)
pub async fn set_effect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EffectRequest>,
) -> ApiResult<String> {
    let result = state
        .engine
        .apply(ControlEvent::SelectEffect(req.effect))
        .map(|_| state.engine.current_effect());
    respond(result)
}

/// Return to playlist rotation
pub async fn resume_playlist(State(state): State<Arc<AppState>>) -> ApiResult<String> {
    let result = state
        .engine
        .apply(ControlEvent::Resume)
        .map(|_| state.engine.current_effect());
    respond(result)
}

pub async fn playlist_add(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EffectRequest>,
) -> ApiResult<Vec<String>> {
    let event = ControlEvent::PlaylistAdd(req.effect);
    respond(apply_blocking(state, event, |e| e.config().runtime.effects_playlist).await)
}

pub async fn playlist_remove(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EffectRequest>,
) -> ApiResult<Vec<String>> {
    let event = ControlEvent::PlaylistRemove(req.effect);
    respond(apply_blocking(state, event, |e| e.config().runtime.effects_playlist).await)
}

/// Effect catalog
pub async fn get_effects() -> Json<ApiResponse<Vec<EffectInfo>>> {
    Json(ApiResponse::ok(EffectRegistry::catalog()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;

    #[test]
    fn test_error_status_codes() {
        let bad = Error::Playback(PlaybackError::LastEffect);
        assert_eq!(status_for(&bad), StatusCode::BAD_REQUEST);

        let bad = Error::Config(ConfigError::EmptyPlaylist);
        assert_eq!(status_for(&bad), StatusCode::BAD_REQUEST);

        let persist = Error::Config(ConfigError::Persist("disk full".into()));
        assert_eq!(status_for(&persist), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let body = serde_json::to_value(ApiResponse::<()>::error("nope")).unwrap();
        assert_eq!(body, serde_json::json!({"success": false, "error": "nope"}));
    }
}
