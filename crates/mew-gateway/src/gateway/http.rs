//! HTTP control plane (§6.2): a small bearer-authenticated surface for health checks and
//! injecting/observing traffic without a live WebSocket connection, grounded on the teacher's
//! `web/http.rs` axum router conventions.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{envelope::Envelope, gateway::ws::AppState, participant::ParticipantSummary};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("participant '{0}' is not connected")]
    ParticipantNotConnected(String),
    #[error("invalid request body: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ParticipantNotConnected(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

pub fn router(space: AppState, control_token: Option<String>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/participants", get(list_participants))
        .route("/participants/:id/messages", post(send_message))
        .with_state((space, control_token))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    participants: usize,
    streams: usize,
    uptime_seconds: u64,
}

async fn health(State((space, _)): State<(AppState, Option<String>)>) -> impl IntoResponse {
    let participants = space.connected_ids().await.len();
    let streams = space.stream_count().await;
    Json(HealthResponse {
        status: "ok",
        participants,
        streams,
        uptime_seconds: space.uptime_seconds(),
    })
}

async fn list_participants(
    State((space, control_token)): State<(AppState, Option<String>)>,
    headers: HeaderMap,
) -> Result<Json<Vec<ParticipantSummary>>, ApiError> {
    authorize(&headers, &control_token)?;
    Ok(Json(space.participant_summaries().await))
}

#[derive(Deserialize)]
pub struct SendMessageQuery {
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
pub struct SendMessageBody {
    pub kind: Option<String>,
    #[serde(default)]
    pub to: Option<Vec<String>>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Serialize)]
struct AcceptedResponse {
    id: String,
    status: &'static str,
    ts: String,
}

/// `POST /participants/{id}/messages`: inject an envelope as if `id` had sent it. Used for
/// scripting and for non-WebSocket participants (§6.2).
async fn send_message(
    State((space, control_token)): State<(AppState, Option<String>)>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<SendMessageQuery>,
    Json(body): Json<SendMessageBody>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    authorize(&headers, &control_token)?;

    let kind = body
        .kind
        .or(query.kind)
        .ok_or_else(|| ApiError::BadRequest("missing 'kind'".to_string()))?;

    let mut builder = Envelope::from_participant(id.clone(), kind).payload(body.payload);
    if let Some(to) = body.to {
        builder = builder.to(to);
    }
    let envelope = builder.build();

    if !space.connected_ids().await.contains(&id) {
        return Err(ApiError::ParticipantNotConnected(id));
    }

    let (stamped, deliveries) = space.handle_envelope(&id, envelope).await;
    for (recipient, envelope) in deliveries {
        space.send_envelope(&recipient, envelope).await;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            id: stamped.id.unwrap_or_default(),
            status: "accepted",
            ts: stamped.ts.unwrap_or_default(),
        }),
    ))
}

fn authorize(headers: &HeaderMap, control_token: &Option<String>) -> Result<(), ApiError> {
    let Some(expected) = control_token else { return Ok(()) };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if provided == Some(expected.as_str()) { Ok(()) } else { Err(ApiError::Unauthorized) }
}
