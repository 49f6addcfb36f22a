//! Attachment metadata. The blob itself is parked in an external store under
//! `storage_key`; this service only tracks and authorizes the reference.

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
use crate::models::attachment::{Attachment, AttachmentCreateRequest, DbAttachment};
use crate::scope::TargetRef;
use crate::utils::utc_now;

use super::tasks::fetch_task;

const ATTACHMENT_COLUMNS: &str = "id, task_id, org_id, department_id, created_by, file_name, \
                                  content_type, size_bytes, storage_key, created_at, \
                                  is_deleted, deleted_at, deleted_by";

fn target(attachment: &DbAttachment) -> TargetRef {
    TargetRef::resource(attachment.created_by, attachment.org_id, attachment.department_id)
}

#[utoipa::path(
    get,
    path = "/tasks/{task_id}/attachments",
    tag = "Attachments",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "List attachments on a task", body = [Attachment]))
)]
pub async fn list_attachments(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<Attachment>>> {
    let db_task = fetch_task(&state.pool, task_id, Visibility::Active).await?;
    authz::require(
        &ctx,
        Action::Read,
        EntityKind::Attachment,
        Some(&TargetRef::resource(db_task.created_by, db_task.org_id, db_task.department_id)),
    )?;

    let sql = format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE task_id = ? AND is_deleted = 0 \
         ORDER BY created_at DESC"
    );
    let rows: Vec<DbAttachment> = sqlx::query_as(&sql).bind(task_id).fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Attachment::from).collect()))
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/attachments",
    tag = "Attachments",
    params(("task_id" = Uuid, Path, description = "Task id")),
    request_body = AttachmentCreateRequest,
    responses((status = 201, description = "Attachment recorded", body = Attachment))
)]
pub async fn create_attachment(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<AttachmentCreateRequest>,
) -> AppResult<(StatusCode, Json<Attachment>)> {
    authz::require(&ctx, Action::Create, EntityKind::Attachment, None)?;

    let db_task = fetch_task(&state.pool, task_id, Visibility::Active).await?;
    authz::require(
        &ctx,
        Action::Read,
        EntityKind::Task,
        Some(&TargetRef::resource(db_task.created_by, db_task.org_id, db_task.department_id)),
    )?;

    if payload.size_bytes < 0 {
        return Err(AppError::bad_request("size_bytes must not be negative"));
    }

    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO attachments (id, task_id, org_id, department_id, created_by, file_name, \
                                  content_type, size_bytes, storage_key, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(task_id)
    .bind(db_task.org_id)
    .bind(db_task.department_id)
    .bind(ctx.actor_id)
    .bind(&payload.file_name)
    .bind(&payload.content_type)
    .bind(payload.size_bytes)
    .bind(&payload.storage_key)
    .bind(utc_now())
    .execute(&state.pool)
    .await?;

    let attachment: Attachment = fetch_attachment(&state.pool, id, Visibility::Active).await?.into();
    log_entity_event(&state.events, "created", Some(ctx.actor_id), &attachment, None);

    Ok((StatusCode::CREATED, Json(attachment)))
}

#[utoipa::path(
    get,
    path = "/tasks/{task_id}/attachments/{id}",
    tag = "Attachments",
    params(
        ("task_id" = Uuid, Path, description = "Task id"),
        ("id" = Uuid, Path, description = "Attachment id")
    ),
    responses((status = 200, description = "Attachment detail", body = Attachment))
)]
pub async fn get_attachment(
    State(state): State<AppState>,
    Path((task_id, id)): Path<(Uuid, Uuid)>,
    ctx: TenantContext,
) -> AppResult<Json<Attachment>> {
    let db_attachment = fetch_attachment(&state.pool, id, Visibility::Active).await?;
    if db_attachment.task_id != task_id {
        return Err(AppError::not_found("attachment not found"));
    }
    authz::require(&ctx, Action::Read, EntityKind::Attachment, Some(&target(&db_attachment)))?;

    Ok(Json(db_attachment.into()))
}

#[utoipa::path(
    delete,
    path = "/tasks/{task_id}/attachments/{id}",
    tag = "Attachments",
    params(
        ("task_id" = Uuid, Path, description = "Task id"),
        ("id" = Uuid, Path, description = "Attachment id")
    ),
    responses((status = 204, description = "Attachment soft deleted"))
)]
pub async fn delete_attachment(
    State(state): State<AppState>,
    Path((task_id, id)): Path<(Uuid, Uuid)>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_attachment = fetch_attachment(&state.pool, id, Visibility::Active).await?;
    if db_attachment.task_id != task_id {
        return Err(AppError::not_found("attachment not found"));
    }
    authz::require(&ctx, Action::Delete, EntityKind::Attachment, Some(&target(&db_attachment)))?;

    lifecycle::soft_delete(&state.pool, EntityKind::Attachment, id, Some(ctx.actor_id)).await?;

    let attachment: Attachment = db_attachment.into();
    log_entity_event(&state.events, "deleted", Some(ctx.actor_id), &attachment, None);

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_attachment(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbAttachment> {
    let sql = format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbAttachment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("attachment not found"))
}
