use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Action};
use crate::context::TenantContext;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::{self, EntityKind, Visibility};
use crate::models::notification::{DbNotification, Notification};
use crate::scope::TargetRef;
use crate::utils::utc_now;

const NOTIFICATION_COLUMNS: &str = "id, org_id, recipient_id, event_name, body, read_at, \
                                    created_at, is_deleted, deleted_at, deleted_by";

/// A notification "belongs" to its recipient for scoping purposes.
fn target(notification: &DbNotification) -> TargetRef {
    TargetRef {
        actor_id: Some(notification.recipient_id),
        org_id: Some(notification.org_id),
        department_id: None,
    }
}

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Notifications",
    responses((status = 200, description = "The caller's notifications, newest first", body = [Notification]))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<Notification>>> {
    authz::require(&ctx, Action::Read, EntityKind::Notification, None)?;

    let sql = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
         WHERE recipient_id = ? AND is_deleted = 0 ORDER BY created_at DESC"
    );
    let rows: Vec<DbNotification> = sqlx::query_as(&sql).bind(ctx.actor_id).fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Notification::from).collect()))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "Notifications",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses((status = 200, description = "Notification marked read", body = Notification))
)]
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Notification>> {
    let db_notification = fetch_notification(&state.pool, id, Visibility::Active).await?;
    authz::require(
        &ctx,
        Action::Update,
        EntityKind::Notification,
        Some(&target(&db_notification)),
    )?;

    if db_notification.read_at.is_none() {
        sqlx::query("UPDATE notifications SET read_at = ? WHERE id = ?")
            .bind(utc_now())
            .bind(id)
            .execute(&state.pool)
            .await?;
    }

    let notification: Notification = fetch_notification(&state.pool, id, Visibility::Active).await?.into();
    Ok(Json(notification))
}

#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "Notifications",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses((status = 204, description = "Notification soft deleted"))
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_notification = fetch_notification(&state.pool, id, Visibility::Active).await?;
    authz::require(
        &ctx,
        Action::Delete,
        EntityKind::Notification,
        Some(&target(&db_notification)),
    )?;

    lifecycle::soft_delete(&state.pool, EntityKind::Notification, id, Some(ctx.actor_id)).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_notification(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbNotification> {
    let sql = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbNotification>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("notification not found"))
}
