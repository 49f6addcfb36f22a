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
use crate::models::material::{DbMaterial, Material, MaterialCreateRequest, MaterialUpdateRequest};
use crate::routes::ListQuery;
use crate::scope::TargetRef;
use crate::utils::utc_now;

const MATERIAL_COLUMNS: &str = "id, org_id, department_id, created_by, name, unit, stock_quantity, \
                                created_at, updated_at, is_deleted, deleted_at, deleted_by";

fn target(material: &DbMaterial) -> TargetRef {
    TargetRef::resource(material.created_by, material.org_id, material.department_id)
}

#[utoipa::path(
    get,
    path = "/materials",
    tag = "Materials",
    responses((status = 200, description = "List materials", body = [Material]))
)]
pub async fn list_materials(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<Material>>> {
    authz::require(&ctx, Action::Read, EntityKind::Material, None)?;
    let vis = query.visibility(&ctx)?;

    let sql = format!(
        "SELECT {MATERIAL_COLUMNS} FROM materials WHERE org_id = ?{} ORDER BY name",
        vis.tombstone_filter()
    );
    let rows: Vec<DbMaterial> = sqlx::query_as(&sql).bind(ctx.org_id).fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Material::from).collect()))
}

#[utoipa::path(
    post,
    path = "/materials",
    tag = "Materials",
    request_body = MaterialCreateRequest,
    responses(
        (status = 201, description = "Material created", body = Material),
        (status = 409, description = "Name already in use within the organization")
    )
)]
pub async fn create_material(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<MaterialCreateRequest>,
) -> AppResult<(StatusCode, Json<Material>)> {
    authz::require(&ctx, Action::Create, EntityKind::Material, None)?;
    ensure_name_available(&state.pool, ctx.org_id, &payload.name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO materials (id, org_id, department_id, created_by, name, unit, stock_quantity, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(ctx.org_id)
    .bind(ctx.department_id)
    .bind(ctx.actor_id)
    .bind(&payload.name)
    .bind(&payload.unit)
    .bind(payload.stock_quantity.unwrap_or(0))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let material: Material = fetch_material(&state.pool, id, Visibility::Active).await?.into();
    Ok((StatusCode::CREATED, Json(material)))
}

#[utoipa::path(
    get,
    path = "/materials/{id}",
    tag = "Materials",
    params(("id" = Uuid, Path, description = "Material id")),
    responses((status = 200, description = "Material detail", body = Material))
)]
pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Material>> {
    let db_material = fetch_material(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Read, EntityKind::Material, Some(&target(&db_material)))?;

    Ok(Json(db_material.into()))
}

#[utoipa::path(
    put,
    path = "/materials/{id}",
    tag = "Materials",
    params(("id" = Uuid, Path, description = "Material id")),
    request_body = MaterialUpdateRequest,
    responses((status = 200, description = "Material updated", body = Material))
)]
pub async fn update_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<MaterialUpdateRequest>,
) -> AppResult<Json<Material>> {
    let db_material = fetch_material(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Update, EntityKind::Material, Some(&target(&db_material)))?;

    let name = match payload.name {
        Some(name) if name != db_material.name => {
            ensure_name_available(&state.pool, db_material.org_id, &name, Some(id)).await?;
            name
        }
        Some(name) => name,
        None => db_material.name.clone(),
    };
    let unit = payload.unit.unwrap_or_else(|| db_material.unit.clone());
    let stock_quantity = payload.stock_quantity.unwrap_or(db_material.stock_quantity);
    if stock_quantity < 0 {
        return Err(AppError::bad_request("stock_quantity must not be negative"));
    }

    sqlx::query("UPDATE materials SET name = ?, unit = ?, stock_quantity = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&unit)
        .bind(stock_quantity)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;

    let material: Material = fetch_material(&state.pool, id, Visibility::Active).await?.into();
    Ok(Json(material))
}

#[utoipa::path(
    delete,
    path = "/materials/{id}",
    tag = "Materials",
    params(("id" = Uuid, Path, description = "Material id")),
    responses((status = 204, description = "Material soft deleted"))
)]
pub async fn delete_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_material = fetch_material(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Delete, EntityKind::Material, Some(&target(&db_material)))?;

    lifecycle::soft_delete(&state.pool, EntityKind::Material, id, Some(ctx.actor_id)).await?;

    let material: Material = db_material.into();
    log_entity_event(&state.events, "deleted", Some(ctx.actor_id), &material, None);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/materials/{id}/restore",
    tag = "Materials",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Material restored", body = Material),
        (status = 409, description = "Not deleted, or an active material holds the same name")
    )
)]
pub async fn restore_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Material>> {
    let db_material = fetch_material(&state.pool, id, Visibility::All).await?;
    authz::require(&ctx, Action::Restore, EntityKind::Material, Some(&target(&db_material)))?;

    lifecycle::restore(&state.pool, EntityKind::Material, id).await?;

    let material: Material = fetch_material(&state.pool, id, Visibility::Active).await?.into();
    log_entity_event(&state.events, "restored", Some(ctx.actor_id), &material, None);

    Ok(Json(material))
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
                "SELECT COUNT(1) FROM materials WHERE org_id = ? AND name = ? AND is_deleted = 0 AND id <> ?",
            )
            .bind(org_id)
            .bind(name)
            .bind(id)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM materials WHERE org_id = ? AND name = ? AND is_deleted = 0",
            )
            .bind(org_id)
            .bind(name)
            .fetch_one(pool)
            .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict("material name already in use"));
    }
    Ok(())
}

async fn fetch_material(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbMaterial> {
    let sql = format!(
        "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbMaterial>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("material not found"))
}
