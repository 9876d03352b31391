//! Task management handlers
//!
//! Every operation is scoped to the calling principal. Tasks of other users
//! are indistinguishable from missing ones.
//!
//! Author: hephaex@gmail.com

use crate::auth::Principal;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tasklane_core::{
    SortDirection, Task, TaskQuery, TaskSortField, TaskStatus, TaskStore, TaskUpdate,
};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

lazy_static! {
    static ref TITLE_PATTERN: Regex = Regex::new(r"^[a-zA-Z0-9\s-]{1,100}$").unwrap();
    static ref DESCRIPTION_PATTERN: Regex = Regex::new(r"^[a-zA-Z0-9\s.,!?()-]{0,255}$").unwrap();
}

/// Task as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    #[schema(example = "Write release notes")]
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, format = Date, example = "2026-11-01")]
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            due_date: task.due_date,
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// New task
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Letters, digits, spaces and hyphens; at most 100 characters
    pub title: String,
    /// At most 255 characters
    pub description: Option<String>,
    /// Defaults to today
    #[schema(value_type = Option<String>, format = Date)]
    pub due_date: Option<NaiveDate>,
    /// Defaults to PENDING
    pub status: Option<TaskStatus>,
}

/// Partial task update; omitted fields stay as they are
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
}

/// Filter and ordering for task listings
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListTasksQuery {
    /// Only tasks in this state
    pub status: Option<TaskStatus>,
    /// Due on or after this date
    #[param(value_type = Option<String>, format = Date)]
    pub from_date: Option<NaiveDate>,
    /// Due on or before this date
    #[param(value_type = Option<String>, format = Date)]
    pub to_date: Option<NaiveDate>,
    /// dueDate (default), title, status or createdAt
    pub sort_by: Option<TaskSortField>,
    /// asc (default) or desc
    pub sort_direction: Option<SortDirection>,
}

impl TryFrom<ListTasksQuery> for TaskQuery {
    type Error = AppError;

    fn try_from(params: ListTasksQuery) -> Result<Self, Self::Error> {
        if let (Some(from), Some(to)) = (params.from_date, params.to_date) {
            if from > to {
                return Err(AppError::BadRequest(
                    "fromDate must not be after toDate".to_string(),
                ));
            }
        }

        Ok(TaskQuery {
            status: params.status,
            from_date: params.from_date,
            to_date: params.to_date,
            sort_by: params.sort_by.unwrap_or_default(),
            direction: params.sort_direction.unwrap_or_default(),
        })
    }
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() || !TITLE_PATTERN.is_match(title) {
        return Err(AppError::BadRequest(
            "title must be 1-100 letters, digits, spaces or hyphens".to_string(),
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), AppError> {
    if !DESCRIPTION_PATTERN.is_match(description) {
        return Err(AppError::BadRequest(
            "description must be at most 255 characters of letters, digits, spaces or .,!?()-"
                .to_string(),
        ));
    }
    Ok(())
}

/// List the caller's tasks
#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "Task list", body = Vec<TaskResponse>),
        (status = 400, description = "Invalid filter", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(params): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>, AppError> {
    let query = TaskQuery::try_from(params)?;
    let tasks = state.store.list_tasks(principal.user_id, &query).await?;

    debug!(username = %principal.username, count = tasks.len(), "Listed tasks");
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// Get one of the caller's tasks
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task", body = TaskResponse),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskResponse>, AppError> {
    let task = state
        .store
        .find_task(principal.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {id}")))?;

    Ok(Json(task.into()))
}

/// Create a task for the caller
#[utoipa::path(
    post,
    path = "/api/tasks",
    tag = "tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_title(&request.title)?;

    let mut task = Task::new(principal.user_id, request.title);
    if let Some(description) = request.description {
        validate_description(&description)?;
        task = task.with_description(description);
    }
    if let Some(due_date) = request.due_date {
        task = task.with_due_date(due_date);
    }
    if let Some(status) = request.status {
        task = task.with_status(status);
    }

    state.store.insert_task(&task).await?;
    debug!(username = %principal.username, task_id = %task.id, "Task created");

    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

/// Update one of the caller's tasks
#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, AppError> {
    if let Some(title) = &request.title {
        validate_title(title)?;
    }
    if let Some(description) = &request.description {
        validate_description(description)?;
    }

    let not_found = || AppError::NotFound(format!("Task {id}"));
    let mut task = state
        .store
        .find_task(principal.user_id, id)
        .await?
        .ok_or_else(not_found)?;

    let changed = task.apply(TaskUpdate {
        title: request.title,
        description: request.description,
        due_date: request.due_date,
        status: request.status,
    });

    // Deleted between the read and the write.
    if changed && !state.store.update_task(&task).await? {
        return Err(not_found());
    }

    Ok(Json(task.into()))
}

/// Delete one of the caller's tasks
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.store.delete_task(principal.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Task {id}")))
    }
}
