//! HTTP/JSON control surface: the `/sms*` routes.

use std::{collections::HashMap, str::FromStr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use smsrelay_common::{Message, MessageId, MessageState, Priority};

use crate::{
    error::{ControlError, Result},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sms", post(submit).get(list_messages))
        .route("/sms/{id}", get(get_message).delete(cancel_message))
        .route("/sms/queue/priority/{id}", post(reprioritize))
        .route("/sms/queue/retry/{id}", post(retry_now))
        .route("/sms/queue/pause", post(pause_queue))
        .route("/sms/queue/resume", post(resume_queue))
        .route("/sms/queue/clear", delete(clear_queue))
        .route("/sms/queue/stats", get(queue_stats))
        .with_state(Arc::new(state))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    recipient: String,
    content: String,
    priority: Option<Priority>,
    scheduled_at: Option<u64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    id: MessageId,
    state: MessageState,
    queued_at: u64,
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>> {
    let queued = state.store.count_by_state(MessageState::Queued).await?;
    if queued >= state.config.high_watermark_queue {
        return Err(ControlError::Overloaded);
    }

    let message = Message::new(
        &request.recipient,
        request.content,
        request.priority.unwrap_or(Priority::Normal),
        request.scheduled_at,
        state.default_retry_policy.clone(),
        request.metadata,
    )?;

    let created_at = message.created_at;
    let state_on_submit = message.state;
    let id = if state_on_submit == MessageState::Queued {
        state.queue.enqueue(message).await?
    } else {
        state.store.insert(message).await?
    };

    Ok(Json(SubmitResponse {
        id,
        state: state_on_submit,
        queued_at: created_at,
    }))
}

async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Message>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get(id).await?))
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

async fn cancel_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>> {
    let id = parse_id(&id)?;
    let message = state.store.get(id).await?;
    // Re-cancelling an already-CANCELLED message is a no-op success
    // rather than a 409, even though CANCELLED is terminal.
    if message.state == MessageState::Cancelled {
        return Ok(Json(OkResponse { ok: true }));
    }
    if message.state.is_terminal() {
        return Err(ControlError::Conflict(format!(
            "message {id} is already in terminal state {}",
            message.state
        )));
    }
    let cancelled = state.queue.remove(id).await?;
    if !cancelled {
        return Err(ControlError::Conflict(format!(
            "message {id} could not be cancelled from its current state"
        )));
    }
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    state: Option<MessageState>,
    priority: Option<Priority>,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

const fn default_page() -> usize {
    1
}

const fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct ListResponse {
    items: Vec<Message>,
    page: usize,
    limit: usize,
    total: usize,
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>> {
    let list_state = params.state.unwrap_or(MessageState::Queued);
    let total = state.store.count_by_state(list_state).await?;
    let offset = params.page.saturating_sub(1) * params.limit;
    let mut items = state
        .store
        .list_by_state(list_state, params.limit, offset)
        .await?;
    if let Some(priority) = params.priority {
        items.retain(|m| m.priority == priority);
    }

    Ok(Json(ListResponse {
        items,
        page: params.page,
        limit: params.limit,
        total,
    }))
}

#[derive(Debug, Deserialize)]
struct ReprioritizeRequest {
    priority: Priority,
}

async fn reprioritize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ReprioritizeRequest>,
) -> Result<Json<OkResponse>> {
    let id = parse_id(&id)?;
    let ok = state.queue.reprioritize(id, request.priority).await?;
    if !ok {
        return Err(ControlError::Conflict(format!(
            "message {id} is not currently QUEUED"
        )));
    }
    Ok(Json(OkResponse { ok: true }))
}

async fn retry_now(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>> {
    let id = parse_id(&id)?;
    let promoted = state.scheduler.promote_now(id).await?;
    if !promoted {
        return Err(ControlError::Conflict(format!(
            "message {id} is not currently SCHEDULED"
        )));
    }
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Serialize)]
struct QueueActionResponse {
    paused: bool,
    queue_depth: usize,
}

async fn pause_queue(State(state): State<Arc<AppState>>) -> Result<Json<QueueActionResponse>> {
    state.dispatcher.pause();
    Ok(Json(QueueActionResponse {
        paused: true,
        queue_depth: state.queue.size().await?,
    }))
}

async fn resume_queue(State(state): State<Arc<AppState>>) -> Result<Json<QueueActionResponse>> {
    state.dispatcher.resume();
    Ok(Json(QueueActionResponse {
        paused: false,
        queue_depth: state.queue.size().await?,
    }))
}

#[derive(Debug, Deserialize)]
struct ClearParams {
    state: Option<MessageState>,
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    deleted: usize,
}

async fn clear_queue(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClearParams>,
) -> Result<Json<ClearResponse>> {
    match params.state.unwrap_or(MessageState::Queued) {
        MessageState::Queued => {
            let deleted = state.queue.clear(None).await?;
            Ok(Json(ClearResponse { deleted }))
        }
        other => Err(ControlError::Conflict(format!(
            "clearing {other} is not supported; only QUEUED can be bulk-cancelled"
        ))),
    }
}

#[derive(Debug, Serialize)]
struct QueueStats {
    totals_by_state: Vec<(MessageState, usize)>,
    average_wait_ms: Option<u64>,
    throughput_last_hour: u64,
    error_rate: f64,
    paused: bool,
    oldest_queued_at: Option<u64>,
}

async fn queue_stats(State(state): State<Arc<AppState>>) -> Result<Json<QueueStats>> {
    let mut totals_by_state = Vec::with_capacity(6);
    for candidate in [
        MessageState::Queued,
        MessageState::Scheduled,
        MessageState::Sending,
        MessageState::Sent,
        MessageState::Failed,
        MessageState::Cancelled,
    ] {
        totals_by_state.push((candidate, state.store.count_by_state(candidate).await?));
    }

    let queued = state
        .store
        .list_by_state(MessageState::Queued, usize::MAX, 0)
        .await?;
    let now = smsrelay_common::now_millis();
    let average_wait_ms = if queued.is_empty() {
        None
    } else {
        let total: u64 = queued
            .iter()
            .map(|m| now.saturating_sub(m.created_at))
            .sum();
        Some(total / queued.len() as u64)
    };
    let oldest = state.queue.oldest().await?;

    let sent = state.metrics.counter_value("sms.sent");
    let failed = state.metrics.counter_value("sms.failed");
    let total_outcomes = sent + failed;
    let error_rate = if total_outcomes == 0 {
        0.0
    } else {
        failed as f64 / total_outcomes as f64
    };

    Ok(Json(QueueStats {
        totals_by_state,
        average_wait_ms,
        throughput_last_hour: state.health.successes_last_hour(),
        error_rate,
        paused: state.dispatcher.is_paused(),
        oldest_queued_at: oldest.map(|m| m.created_at),
    }))
}

fn parse_id(raw: &str) -> Result<MessageId> {
    MessageId::from_str(raw).map_err(|_| ControlError::NotFound)
}
