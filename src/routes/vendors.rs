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
use crate::models::vendor::{DbVendor, Vendor, VendorCreateRequest, VendorUpdateRequest};
use crate::routes::ListQuery;
use crate::scope::TargetRef;
use crate::utils::utc_now;

const VENDOR_COLUMNS: &str = "id, org_id, created_by, name, contact_email, phone, \
                              created_at, updated_at, is_deleted, deleted_at, deleted_by";

fn target(vendor: &DbVendor) -> TargetRef {
    TargetRef::org_resource(vendor.created_by, vendor.org_id)
}

#[utoipa::path(
    get,
    path = "/vendors",
    tag = "Vendors",
    responses((status = 200, description = "List vendors", body = [Vendor]))
)]
pub async fn list_vendors(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<Vendor>>> {
    authz::require(&ctx, Action::Read, EntityKind::Vendor, None)?;
    let vis = query.visibility(&ctx)?;

    let sql = format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors WHERE org_id = ?{} ORDER BY name",
        vis.tombstone_filter()
    );
    let rows: Vec<DbVendor> = sqlx::query_as(&sql).bind(ctx.org_id).fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Vendor::from).collect()))
}

#[utoipa::path(
    post,
    path = "/vendors",
    tag = "Vendors",
    request_body = VendorCreateRequest,
    responses(
        (status = 201, description = "Vendor created", body = Vendor),
        (status = 409, description = "Name already in use within the organization")
    )
)]
pub async fn create_vendor(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<VendorCreateRequest>,
) -> AppResult<(StatusCode, Json<Vendor>)> {
    // Managers lack vendor create; the kind matrix handles it.
    authz::require(&ctx, Action::Create, EntityKind::Vendor, None)?;
    ensure_name_available(&state.pool, ctx.org_id, &payload.name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO vendors (id, org_id, created_by, name, contact_email, phone, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(ctx.org_id)
    .bind(ctx.actor_id)
    .bind(&payload.name)
    .bind(&payload.contact_email)
    .bind(&payload.phone)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let vendor: Vendor = fetch_vendor(&state.pool, id, Visibility::Active).await?.into();
    Ok((StatusCode::CREATED, Json(vendor)))
}

#[utoipa::path(
    get,
    path = "/vendors/{id}",
    tag = "Vendors",
    params(("id" = Uuid, Path, description = "Vendor id")),
    responses((status = 200, description = "Vendor detail", body = Vendor))
)]
pub async fn get_vendor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Vendor>> {
    let db_vendor = fetch_vendor(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Read, EntityKind::Vendor, Some(&target(&db_vendor)))?;

    Ok(Json(db_vendor.into()))
}

#[utoipa::path(
    put,
    path = "/vendors/{id}",
    tag = "Vendors",
    params(("id" = Uuid, Path, description = "Vendor id")),
    request_body = VendorUpdateRequest,
    responses((status = 200, description = "Vendor updated", body = Vendor))
)]
pub async fn update_vendor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<VendorUpdateRequest>,
) -> AppResult<Json<Vendor>> {
    let db_vendor = fetch_vendor(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Update, EntityKind::Vendor, Some(&target(&db_vendor)))?;

    let name = match payload.name {
        Some(name) if name != db_vendor.name => {
            ensure_name_available(&state.pool, db_vendor.org_id, &name, Some(id)).await?;
            name
        }
        Some(name) => name,
        None => db_vendor.name.clone(),
    };
    let contact_email = payload.contact_email.or_else(|| db_vendor.contact_email.clone());
    let phone = payload.phone.or_else(|| db_vendor.phone.clone());

    sqlx::query("UPDATE vendors SET name = ?, contact_email = ?, phone = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&contact_email)
        .bind(&phone)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;

    let vendor: Vendor = fetch_vendor(&state.pool, id, Visibility::Active).await?.into();
    Ok(Json(vendor))
}

#[utoipa::path(
    delete,
    path = "/vendors/{id}",
    tag = "Vendors",
    params(("id" = Uuid, Path, description = "Vendor id")),
    responses((status = 204, description = "Vendor soft deleted"))
)]
pub async fn delete_vendor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_vendor = fetch_vendor(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Delete, EntityKind::Vendor, Some(&target(&db_vendor)))?;

    lifecycle::soft_delete(&state.pool, EntityKind::Vendor, id, Some(ctx.actor_id)).await?;

    let vendor: Vendor = db_vendor.into();
    log_entity_event(&state.events, "deleted", Some(ctx.actor_id), &vendor, None);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/vendors/{id}/restore",
    tag = "Vendors",
    params(("id" = Uuid, Path, description = "Vendor id")),
    responses(
        (status = 200, description = "Vendor restored", body = Vendor),
        (status = 409, description = "Not deleted, or an active vendor holds the same name")
    )
)]
pub async fn restore_vendor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Vendor>> {
    let db_vendor = fetch_vendor(&state.pool, id, Visibility::All).await?;
    authz::require(&ctx, Action::Restore, EntityKind::Vendor, Some(&target(&db_vendor)))?;

    lifecycle::restore(&state.pool, EntityKind::Vendor, id).await?;

    let vendor: Vendor = fetch_vendor(&state.pool, id, Visibility::Active).await?.into();
    log_entity_event(&state.events, "restored", Some(ctx.actor_id), &vendor, None);

    Ok(Json(vendor))
}

async fn ensure_name_available(
    pool: &SqlitePool,
    org_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM vendors WHERE org_id = ? AND name = ? AND is_deleted = 0 AND id <> ?",
            )
            .bind(org_id)
            .bind(name)
            .bind(id)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM vendors WHERE org_id = ? AND name = ? AND is_deleted = 0",
            )
            .bind(org_id)
            .bind(name)
            .fetch_one(pool)
            .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict("vendor name already in use"));
    }
    Ok(())
}

async fn fetch_vendor(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbVendor> {
    let sql = format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbVendor>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("vendor not found"))
}
