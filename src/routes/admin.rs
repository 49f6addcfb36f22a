//! Platform administration: the on-demand retention sweep and the explicit
//! hard-delete bypass. Everything here is gated on the platform-admin
//! predicate, not the ordinary matrices.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz;
use crate::context::TenantContext;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::{self, EntityKind, PurgeAuthority};
use crate::utils::utc_now;

#[utoipa::path(
    post,
    path = "/admin/purge",
    tag = "Admin",
    responses((status = 200, description = "Retention sweep executed; per-kind removal counts"))
)]
pub async fn run_purge(State(state): State<AppState>, ctx: TenantContext) -> AppResult<Json<Value>> {
    authz::require_platform_admin(&ctx)?;

    let report = lifecycle::purge_expired(&state.pool, utc_now()).await?;

    let mut removed = serde_json::Map::new();
    for (kind, count) in &report.removed {
        removed.insert(kind.as_str().to_string(), json!(count));
    }

    Ok(Json(json!({
        "total": report.total(),
        "removed": removed,
    })))
}

/// Administrative hard delete. The row must already be tombstoned; this
/// bypasses the retention window, not the soft-delete step.
#[utoipa::path(
    delete,
    path = "/admin/{kind}/{id}",
    tag = "Admin",
    params(
        ("kind" = String, Path, description = "Entity kind, e.g. task or vendor"),
        ("id" = Uuid, Path, description = "Entity id")
    ),
    responses(
        (status = 204, description = "Row permanently removed"),
        (status = 409, description = "Row is not tombstoned")
    )
)]
pub async fn hard_delete_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    authz::require_platform_admin(&ctx)?;

    let kind: EntityKind = kind.parse()?;

    let sql = format!("SELECT is_deleted FROM {} WHERE id = ?", kind.table());
    let tombstoned: Option<bool> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;

    match tombstoned {
        None => return Err(AppError::not_found(format!("{kind} not found"))),
        Some(false) => return Err(AppError::NotDeleted),
        Some(true) => {}
    }

    lifecycle::hard_delete(&state.pool, kind, id, PurgeAuthority::Administrative).await?;

    Ok(StatusCode::NO_CONTENT)
}
