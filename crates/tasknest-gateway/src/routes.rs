//! Route handlers: the task trigger surface, status, notification
//! drain, and the internal job-fire callback.

use std::sync::Arc;

use axum::Extension;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use tasknest_core::{EventKind, JobSpec, NestError, Priority, Task};
use tasknest_store::{TaskFilter, TaskSort};

use crate::server::{AppState, OwnerId};

/// Maps the error taxonomy onto HTTP statuses. `Upstream` never travels
/// this path — the degradation controller absorbs it before handlers
/// return.
pub struct ApiError(NestError);

impl From<NestError> for ApiError {
    fn from(e: NestError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NestError::Validation(_) | NestError::InvalidRecurrence(_) => StatusCode::BAD_REQUEST,
            NestError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self.0);
        }
        (
            status,
            Json(serde_json::json!({"ok": false, "error": self.0.to_string()})),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ─── Task routes ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTaskBody {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Parsed leniently from text so unknown values surface as a 400.
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub remind_before_mins: Option<u32>,
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    Json(body): Json<CreateTaskBody>,
) -> ApiResult<impl IntoResponse> {
    let mut task = Task::new(&owner.0, &body.title);
    if let Some(description) = body.description {
        task.description = description;
    }
    task.due_at = body.due_at;
    if let Some(priority) = body.priority {
        task.priority = priority;
    }
    if let Some(tags) = body.tags {
        task.tags = tags;
    }
    if let Some(recurrence) = &body.recurrence {
        task.recurrence = recurrence.parse()?;
    }
    task.remind_before_mins = body.remind_before_mins;
    task.normalize_tags();
    task.validate(Utc::now())?;

    state.store.save(&task)?;
    state
        .runtime
        .publisher
        .publish(
            EventKind::Created,
            &owner.0,
            &task.id,
            serde_json::json!({"title": task.title}),
        )
        .await?;
    state.runtime.on_task_saved(&task).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
    /// Free-text search over title and description.
    pub q: Option<String>,
    /// "due", "priority", or "created".
    pub sort: Option<String>,
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let filter = TaskFilter {
        completed: query.completed,
        priority: query.priority,
        tag: query.tag,
        due_after: query.due_after,
        due_before: query.due_before,
        text: query.q,
    };
    let mut tasks = filter.apply(state.store.list(&owner.0)?);
    if let Some(sort) = query.sort.as_deref().and_then(|s| s.parse::<TaskSort>().ok()) {
        sort.apply(&mut tasks);
    }
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.store.get(&owner.0, &id)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub remind_before_mins: Option<u32>,
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskBody>,
) -> ApiResult<Json<Task>> {
    let mut task = state.store.get(&owner.0, &id)?;
    if let Some(title) = body.title {
        task.title = title;
    }
    if let Some(description) = body.description {
        task.description = description;
    }
    if let Some(due_at) = body.due_at {
        task.due_at = Some(due_at);
    }
    if let Some(priority) = body.priority {
        task.priority = priority;
    }
    if let Some(tags) = body.tags {
        task.tags = tags;
        task.normalize_tags();
    }
    if let Some(recurrence) = &body.recurrence {
        task.recurrence = recurrence.parse()?;
    }
    if let Some(mins) = body.remind_before_mins {
        task.remind_before_mins = Some(mins);
    }
    task.updated_at = Utc::now();
    task.validate(Utc::now())?;

    state.store.save(&task)?;
    state
        .runtime
        .publisher
        .publish(
            EventKind::Updated,
            &owner.0,
            &task.id,
            serde_json::json!({"title": task.title}),
        )
        .await?;
    state.runtime.on_task_saved(&task).await?;
    Ok(Json(task))
}

pub async fn complete_task(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let mut task = state.store.get(&owner.0, &id)?;
    if !task.completed {
        task.completed = true;
        task.updated_at = Utc::now();
        state.store.save(&task)?;
        state
            .runtime
            .publisher
            .publish(
                EventKind::Completed,
                &owner.0,
                &task.id,
                serde_json::json!({"title": task.title}),
            )
            .await?;
        state.runtime.on_task_completed(&owner.0, &id).await?;
    }
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    // Resolve first so cross-owner ids 404 before any cascade runs.
    state.store.get(&owner.0, &id)?;
    state.store.delete(&owner.0, &id)?;
    state.runtime.on_task_deleted(&owner.0, &id).await?;
    tracing::info!("task {id} deleted for {} — jobs cancelled", owner.0);
    Ok(Json(serde_json::json!({"ok": true, "deleted": id})))
}

// ─── Notifications & status ──────────────────────────────────────

/// Non-blocking drain of the owner's offline notification queue.
pub async fn drain_notifications(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
) -> Json<Vec<tasknest_core::Notification>> {
    Json(state.hub.drain(&owner.0))
}

/// Health state and per-feature availability for operators and clients.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
) -> Json<serde_json::Value> {
    let availability = state.runtime.controller.availability();
    Json(serde_json::json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "features": availability,
        "connections": state.hub.connection_count(&owner.0),
        "queued_notifications": state.hub.queued_count(&owner.0),
    }))
}

// ─── Internal job callback ──────────────────────────────────────

/// Callback target for the external job service. Authenticated with the
/// shared callback secret — this is infrastructure re-entry, not a
/// user-facing mutation endpoint, and user tokens are not accepted.
pub async fn jobs_fire(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(job): Json<JobSpec>,
) -> Response {
    let expected = &state.config.jobs.callback_secret;
    let presented = headers
        .get("X-Callback-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if expected.is_empty() || presented != expected {
        tracing::warn!("rejected job callback for {} — bad secret", job.id);
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"ok": false, "error": "invalid callback secret"})),
        )
            .into_response();
    }
    tracing::debug!("⏰ external job fired: {}", job.id);
    let id = job.id.clone();
    state.runtime.inject_fired(job);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"ok": true, "accepted": id})),
    )
        .into_response()
}
