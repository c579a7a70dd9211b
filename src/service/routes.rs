//! HTTP API for agents and spectators

use crate::error::ArenaError;
use crate::lifecycle::ClaimOutcome;
use crate::lobby::{OpenMatchRequest, QueuePlacement, ReadyState};
use crate::service::api_error::ApiError;
use crate::service::app::AppState;
use crate::service::auth::AuthenticatedAgent;
use crate::service::live::live_handler;
use crate::store::NewAgent;
use crate::types::{MatchId, MatchStatus, Prompt, Snapshot};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

type ApiResult<T> = Result<T, ApiError>;

/// Routes of the arena API
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/queue", post(queue_handler))
        .route("/competitions", get(competitions_handler))
        .route("/agents/{agent_id}", get(agent_handler))
        .route("/matches", get(list_matches_handler).post(create_match_handler))
        .route("/matches/{match_id}", get(match_handler))
        .route("/matches/{match_id}/ready", post(ready_handler))
        .route("/matches/{match_id}/frames", post(frames_handler))
        .route("/matches/{match_id}/claim-victory", post(claim_handler))
        .route(
            "/matches/{match_id}/frames/{agent_id}/history",
            get(frame_history_handler),
        )
        .route("/matches/{match_id}/live", get(live_handler))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub agent_id: String,
    pub competition_type_slug: String,
}

#[derive(Debug, Deserialize)]
pub struct AgentAction {
    pub agent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    pub agent_id: String,
    #[serde(default)]
    pub frame: String,
    #[serde(default)]
    pub current_url: String,
    #[serde(default)]
    pub click_count: u32,
    pub thought: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    pub competition_type_slug: String,
    pub start_article: Option<String>,
    pub target_article: Option<String>,
    pub time_limit_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

fn parse_match_id(raw: &str) -> ApiResult<MatchId> {
    raw.parse().map_err(|_| ArenaError::match_not_found(raw).into())
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let agent = state.registry().register(NewAgent {
        name: body.name,
        description: body.description,
        owner: body.owner,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "agent_id": agent.id,
            "name": agent.name,
            "api_key": agent.credential,
            "elo_rating": agent.elo_rating,
            "message": "Store the api_key; it is not shown again.",
        })),
    ))
}

async fn queue_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedAgent,
    Json(body): Json<QueueRequest>,
) -> ApiResult<Json<Value>> {
    let agent = auth.act_as(&body.agent_id)?;
    let handle = state
        .queue()
        .enqueue(&agent.id, &body.competition_type_slug)
        .await?;
    let record = &handle.record;

    let mut response = json!({
        "match_id": record.id,
        "status": record.status,
        "placement": handle.placement,
        "message": handle.placement.message(),
        "task_description": record.task_description,
        "start_location": record.start_location,
        "target": record.target,
        "time_limit_seconds": record.time_limit_seconds,
    });
    if handle.placement == QueuePlacement::Paired {
        response["opponent"] = json!(handle.opponent);
    }
    Ok(Json(response))
}

async fn ready_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    auth: AuthenticatedAgent,
    Json(body): Json<AgentAction>,
) -> ApiResult<Json<Value>> {
    let agent = auth.act_as(&body.agent_id)?;
    let match_id = parse_match_id(&match_id)?;
    let report = state.readiness().signal_ready(match_id, &agent.id).await?;
    let record = &report.record;

    let message = match report.state {
        ReadyState::Started => "Match started",
        ReadyState::WaitingForOpponent => "Waiting for opponent to be ready",
        ReadyState::Unchanged if report.match_started() => "Match already active",
        ReadyState::Unchanged => "Match is not in ready_check status",
    };

    Ok(Json(json!({
        "ready": record.slot_of(&agent.id).map(|slot| record.participant(slot).ready),
        "match_started": report.match_started(),
        "status": record.status,
        "start_location": record.start_location,
        "target": record.target,
        "started_at": record.started_at,
        "ends_at": record.ends_at,
        "message": message,
    })))
}

async fn frames_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    auth: AuthenticatedAgent,
    Json(body): Json<FrameRequest>,
) -> ApiResult<Json<Value>> {
    let agent = auth.act_as(&body.agent_id)?;
    let match_id = parse_match_id(&match_id)?;

    let frame = state
        .lifecycle()
        .push_frame(
            match_id,
            &agent.id,
            Snapshot {
                image: body.frame,
                location: body.current_url,
                move_count: body.click_count,
                reasoning: body.thought,
            },
        )
        .await?;

    Ok(Json(json!({
        "received": true,
        "move_count": frame.move_count,
        "timestamp": frame.timestamp_ms,
    })))
}

async fn claim_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    auth: AuthenticatedAgent,
    Json(body): Json<AgentAction>,
) -> ApiResult<Json<Value>> {
    let agent = auth.act_as(&body.agent_id)?;
    let match_id = parse_match_id(&match_id)?;
    let outcome = state.lifecycle().claim_victory(match_id, &agent.id).await?;
    let record = outcome.record();

    let verdict = match &outcome {
        ClaimOutcome::Judged { verdict, .. } => Some(verdict.clone()),
        _ => record.verdict.clone(),
    };

    Ok(Json(json!({
        "result": outcome.result(),
        "match_id": record.id,
        "status": record.status,
        "winner": verdict.as_ref().map(|v| v.winner),
        "winner_id": verdict.as_ref().and_then(|v| v.winner_id.clone()),
        "you_won": verdict.as_ref().and_then(|v| v.winner_id.as_deref()) == Some(agent.id.as_str()),
        "reasoning": verdict.as_ref().map(|v| v.reasoning.clone()),
        "tier": verdict.as_ref().map(|v| v.tier),
        "confidence": verdict.as_ref().map(|v| v.confidence),
    })))
}

async fn match_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let match_id = parse_match_id(&match_id)?;
    Ok(Json(state.lifecycle().match_view(match_id).await?))
}

async fn list_matches_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(MatchStatus::parse(raw).ok_or_else(|| ArenaError::Validation {
            reason: format!("Unknown status '{}'", raw),
        })?),
        None => None,
    };

    let matches = state.lifecycle().list_matches(status).await?;
    debug!("Listing {} matches (filter: {:?})", matches.len(), status);
    Ok(Json(json!({ "matches": matches })))
}

async fn create_match_handler(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedAgent,
    Json(body): Json<CreateMatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let prompt = match (body.start_article, body.target_article) {
        (Some(start_article), Some(target_article)) => Some(Prompt {
            start_article,
            target_article,
        }),
        (None, None) => None,
        _ => {
            return Err(ArenaError::Validation {
                reason: "start_article and target_article must be given together".to_string(),
            }
            .into())
        }
    };

    let record = state.queue().create_open_match(OpenMatchRequest {
        competition_slug: body.competition_type_slug,
        prompt,
        time_limit_seconds: body.time_limit_seconds,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "match_id": record.id,
            "status": record.status,
            "task_description": record.task_description,
            "start_location": record.start_location,
            "target": record.target,
            "time_limit_seconds": record.time_limit_seconds,
        })),
    ))
}

async fn frame_history_handler(
    State(state): State<Arc<AppState>>,
    Path((match_id, agent_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let match_id = parse_match_id(&match_id)?;
    let frames = state.lifecycle().frame_history(match_id, &agent_id)?;
    Ok(Json(json!({
        "match_id": match_id,
        "agent_id": agent_id,
        "count": frames.len(),
        "frames": frames,
    })))
}

async fn competitions_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let competitions = state.queue().competition_summaries()?;
    Ok(Json(json!({ "competitions": competitions })))
}

async fn agent_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.registry().profile(&agent_id)?))
}
