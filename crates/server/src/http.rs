//! HTTP router
//!
//! - `GET /v1/chat` - streaming chat (WebSocket upgrade)
//! - `POST /v1/participant/settings` - unary settings mutation
//! - `GET /health`, `GET /metrics`

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use babelroom_core::{
    ParticipantSettingsResponse, SpeechToText as _, UpdateParticipantSettingsRequest,
};

use crate::chat::chat_handler;
use crate::state::AppState;

/// Build the service router
pub fn create_router(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/v1/chat", get(chat_handler))
        .route("/v1/participant/settings", post(update_participant_settings))
        .route("/health", get(health))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "active_sessions": state.sessions.count(),
        "stt_backend": state.engines.stt.display_name(),
    }))
}

/// Mutate a participant's target language and translation flag across
/// every live session of the room.
///
/// The mutation takes effect for the next utterance's target snapshot;
/// the room registry is retargeted immediately.
async fn update_participant_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateParticipantSettingsRequest>,
) -> Json<ParticipantSettingsResponse> {
    let sessions = state.sessions.for_room(&request.room_id);
    let mut updated = 0usize;

    for session in &sessions {
        if session.update_participant(
            &request.participant_id,
            &request.target_language,
            request.translation_enabled,
        ) {
            updated += 1;
        }
    }

    if updated == 0 {
        return Json(ParticipantSettingsResponse {
            success: false,
            message: format!(
                "no live session for participant {} in room {}",
                request.participant_id, request.room_id
            ),
        });
    }

    // Retarget the listener in the room registry (remove-then-insert)
    if request.translation_enabled {
        state.cache.register_listener(
            &request.room_id,
            &request.participant_id,
            &request.target_language,
        );
    } else {
        state
            .cache
            .unregister_listener(&request.room_id, &request.participant_id);
    }

    Json(ParticipantSettingsResponse {
        success: true,
        message: format!("updated {} session(s)", updated),
    })
}
