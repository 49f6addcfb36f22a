//! Organization (tenant) management. Create/delete/restore and the
//! cross-tenant listing are platform operations; reading and renaming your
//! own organization is ordinary scoped access.

use axum::extract::{Path, Query, State};
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
use crate::models::organization::{
    DbOrganization, Organization, OrganizationCreateRequest, OrganizationUpdateRequest,
};
use crate::routes::ListQuery;
use crate::scope::TargetRef;
use crate::utils::utc_now;

const ORG_COLUMNS: &str = "id, name, is_platform, created_at, updated_at, is_deleted, deleted_at, deleted_by";

#[utoipa::path(
    get,
    path = "/orgs",
    tag = "Organizations",
    responses((status = 200, description = "List organizations", body = [Organization]))
)]
pub async fn list_organizations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<Organization>>> {
    // Cross-tenant listing is a platform operation, checked ahead of the
    // matrices.
    authz::require_platform_admin(&ctx)?;
    let vis = query.visibility(&ctx)?;

    // The platform org is a sentinel, never a customer; it stays out of
    // listings even for platform admins.
    let sql = format!(
        "SELECT {ORG_COLUMNS} FROM organizations WHERE is_platform = 0{} ORDER BY name",
        vis.tombstone_filter()
    );
    let rows: Vec<DbOrganization> = sqlx::query_as(&sql).fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Organization::from).collect()))
}

#[utoipa::path(
    post,
    path = "/orgs",
    tag = "Organizations",
    request_body = OrganizationCreateRequest,
    responses(
        (status = 201, description = "Organization created", body = Organization),
        (status = 409, description = "Name already in use")
    )
)]
pub async fn create_organization(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<OrganizationCreateRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    authz::require_platform_admin(&ctx)?;
    ensure_name_available(&state.pool, &payload.name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO organizations (id, name, is_platform, created_at, updated_at) VALUES (?, ?, 0, ?, ?)",
    )
    .bind(id)
    .bind(&payload.name)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let org: Organization = fetch_organization(&state.pool, id, Visibility::Active).await?.into();
    Ok((StatusCode::CREATED, Json(org)))
}

#[utoipa::path(
    get,
    path = "/orgs/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses((status = 200, description = "Organization detail", body = Organization))
)]
pub async fn get_organization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Organization>> {
    let db_org = fetch_organization(&state.pool, id, Visibility::Active).await?;
    authz::require(
        &ctx,
        Action::Read,
        EntityKind::Organization,
        Some(&TargetRef::organization(db_org.id)),
    )?;

    Ok(Json(db_org.into()))
}

#[utoipa::path(
    put,
    path = "/orgs/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = OrganizationUpdateRequest,
    responses((status = 200, description = "Organization updated", body = Organization))
)]
pub async fn update_organization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<OrganizationUpdateRequest>,
) -> AppResult<Json<Organization>> {
    let db_org = fetch_organization(&state.pool, id, Visibility::Active).await?;
    ensure_not_platform(&db_org)?;
    authz::require(
        &ctx,
        Action::Update,
        EntityKind::Organization,
        Some(&TargetRef::organization(db_org.id)),
    )?;

    let name = match payload.name {
        Some(name) if name != db_org.name => {
            ensure_name_available(&state.pool, &name, Some(id)).await?;
            name
        }
        Some(name) => name,
        None => db_org.name,
    };

    sqlx::query("UPDATE organizations SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;

    let org: Organization = fetch_organization(&state.pool, id, Visibility::Active).await?.into();
    Ok(Json(org))
}

#[utoipa::path(
    delete,
    path = "/orgs/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses((status = 204, description = "Organization soft deleted with cascade"))
)]
pub async fn delete_organization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    authz::require_platform_admin(&ctx)?;

    let db_org = fetch_organization(&state.pool, id, Visibility::Active).await?;
    ensure_not_platform(&db_org)?;
    authz::require(
        &ctx,
        Action::Delete,
        EntityKind::Organization,
        Some(&TargetRef::organization(db_org.id)),
    )?;

    lifecycle::soft_delete(&state.pool, EntityKind::Organization, id, Some(ctx.actor_id)).await?;

    let org: Organization = db_org.into();
    log_entity_event(&state.events, "deleted", Some(ctx.actor_id), &org, None);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/orgs/{id}/restore",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization restored", body = Organization),
        (status = 409, description = "Not deleted, or an active organization holds the same name")
    )
)]
pub async fn restore_organization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Organization>> {
    authz::require_platform_admin(&ctx)?;

    let db_org = fetch_organization(&state.pool, id, Visibility::All).await?;
    authz::require(
        &ctx,
        Action::Restore,
        EntityKind::Organization,
        Some(&TargetRef::organization(db_org.id)),
    )?;

    lifecycle::restore(&state.pool, EntityKind::Organization, id).await?;

    let org: Organization = fetch_organization(&state.pool, id, Visibility::Active).await?.into();
    log_entity_event(&state.events, "restored", Some(ctx.actor_id), &org, None);

    Ok(Json(org))
}

fn ensure_not_platform(org: &DbOrganization) -> AppResult<()> {
    if org.is_platform {
        return Err(AppError::bad_request("the platform organization cannot be modified"));
    }
    Ok(())
}

async fn ensure_name_available(pool: &SqlitePool, name: &str, exclude: Option<Uuid>) -> AppResult<()> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM organizations WHERE name = ? AND is_deleted = 0 AND id <> ?",
            )
            .bind(name)
            .bind(id)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(1) FROM organizations WHERE name = ? AND is_deleted = 0")
                .bind(name)
                .fetch_one(pool)
                .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict("organization name already in use"));
    }
    Ok(())
}

async fn fetch_organization(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbOrganization> {
    let sql = format!(
        "SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbOrganization>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))
}
