use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Action};
use crate::context::TenantContext;
use crate::errors::{AppError, AppResult};
use crate::events::log_entity_event;
use crate::lifecycle::{self, EntityKind, Visibility};
use crate::models::comment::{CommentCreateRequest, CommentUpdateRequest, DbTaskComment, TaskComment};
use crate::scope::TargetRef;
use crate::utils::utc_now;

use super::tasks::fetch_task;

const COMMENT_COLUMNS: &str = "id, task_id, org_id, department_id, created_by, body, \
                               created_at, updated_at, is_deleted, deleted_at, deleted_by";

fn target(comment: &DbTaskComment) -> TargetRef {
    TargetRef::resource(comment.created_by, comment.org_id, comment.department_id)
}

#[utoipa::path(
    get,
    path = "/tasks/{task_id}/comments",
    tag = "Comments",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "List comments on a task", body = [TaskComment]))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<TaskComment>>> {
    let db_task = fetch_task(&state.pool, task_id, Visibility::Active).await?;
    authz::require(
        &ctx,
        Action::Read,
        EntityKind::TaskComment,
        Some(&TargetRef::resource(db_task.created_by, db_task.org_id, db_task.department_id)),
    )?;

    let sql = format!(
        "SELECT {COMMENT_COLUMNS} FROM task_comments WHERE task_id = ? AND is_deleted = 0 \
         ORDER BY created_at ASC"
    );
    let rows: Vec<DbTaskComment> = sqlx::query_as(&sql).bind(task_id).fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(TaskComment::from).collect()))
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/comments",
    tag = "Comments",
    params(("task_id" = Uuid, Path, description = "Task id")),
    request_body = CommentCreateRequest,
    responses((status = 201, description = "Comment created", body = TaskComment))
)]
pub async fn create_comment(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<CommentCreateRequest>,
) -> AppResult<(StatusCode, Json<TaskComment>)> {
    authz::require(&ctx, Action::Create, EntityKind::TaskComment, None)?;

    // Commenting requires read access to the task itself.
    let db_task = fetch_task(&state.pool, task_id, Visibility::Active).await?;
    authz::require(
        &ctx,
        Action::Read,
        EntityKind::Task,
        Some(&TargetRef::resource(db_task.created_by, db_task.org_id, db_task.department_id)),
    )?;

    if payload.body.trim().is_empty() {
        return Err(AppError::bad_request("comment body must not be empty"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO task_comments (id, task_id, org_id, department_id, created_by, body, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(task_id)
    .bind(db_task.org_id)
    .bind(db_task.department_id)
    .bind(ctx.actor_id)
    .bind(&payload.body)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let comment: TaskComment = fetch_comment(&state.pool, id, Visibility::Active).await?.into();
    log_entity_event(
        &state.events,
        "created",
        Some(ctx.actor_id),
        &comment,
        Some(db_task.created_by),
    );

    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    put,
    path = "/tasks/{task_id}/comments/{id}",
    tag = "Comments",
    params(
        ("task_id" = Uuid, Path, description = "Task id"),
        ("id" = Uuid, Path, description = "Comment id")
    ),
    request_body = CommentUpdateRequest,
    responses((status = 200, description = "Comment updated", body = TaskComment))
)]
pub async fn update_comment(
    State(state): State<AppState>,
    Path((task_id, id)): Path<(Uuid, Uuid)>,
    ctx: TenantContext,
    Json(payload): Json<CommentUpdateRequest>,
) -> AppResult<Json<TaskComment>> {
    let db_comment = fetch_comment(&state.pool, id, Visibility::Active).await?;
    if db_comment.task_id != task_id {
        return Err(AppError::not_found("comment not found"));
    }
    authz::require(&ctx, Action::Update, EntityKind::TaskComment, Some(&target(&db_comment)))?;

    if payload.body.trim().is_empty() {
        return Err(AppError::bad_request("comment body must not be empty"));
    }

    sqlx::query("UPDATE task_comments SET body = ?, updated_at = ? WHERE id = ?")
        .bind(&payload.body)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;

    let comment: TaskComment = fetch_comment(&state.pool, id, Visibility::Active).await?.into();
    log_entity_event(&state.events, "updated", Some(ctx.actor_id), &comment, None);

    Ok(Json(comment))
}

#[utoipa::path(
    delete,
    path = "/tasks/{task_id}/comments/{id}",
    tag = "Comments",
    params(
        ("task_id" = Uuid, Path, description = "Task id"),
        ("id" = Uuid, Path, description = "Comment id")
    ),
    responses((status = 204, description = "Comment soft deleted"))
)]
pub async fn delete_comment(
    State(state): State<AppState>,
    Path((task_id, id)): Path<(Uuid, Uuid)>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_comment = fetch_comment(&state.pool, id, Visibility::Active).await?;
    if db_comment.task_id != task_id {
        return Err(AppError::not_found("comment not found"));
    }
    authz::require(&ctx, Action::Delete, EntityKind::TaskComment, Some(&target(&db_comment)))?;

    lifecycle::soft_delete(&state.pool, EntityKind::TaskComment, id, Some(ctx.actor_id)).await?;

    let comment: TaskComment = db_comment.into();
    log_entity_event(&state.events, "deleted", Some(ctx.actor_id), &comment, None);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/comments/{id}/restore",
    tag = "Comments",
    params(
        ("task_id" = Uuid, Path, description = "Task id"),
        ("id" = Uuid, Path, description = "Comment id")
    ),
    responses((status = 200, description = "Comment restored", body = TaskComment))
)]
pub async fn restore_comment(
    State(state): State<AppState>,
    Path((task_id, id)): Path<(Uuid, Uuid)>,
    ctx: TenantContext,
) -> AppResult<Json<TaskComment>> {
    let db_comment = fetch_comment(&state.pool, id, Visibility::All).await?;
    if db_comment.task_id != task_id {
        return Err(AppError::not_found("comment not found"));
    }
    authz::require(&ctx, Action::Restore, EntityKind::TaskComment, Some(&target(&db_comment)))?;

    lifecycle::restore(&state.pool, EntityKind::TaskComment, id).await?;

    let comment: TaskComment = fetch_comment(&state.pool, id, Visibility::Active).await?.into();
    Ok(Json(comment))
}

async fn fetch_comment(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbTaskComment> {
    let sql = format!(
        "SELECT {COMMENT_COLUMNS} FROM task_comments WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbTaskComment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("comment not found"))
}
