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
use crate::models::department::{
    DbDepartment, Department, DepartmentCreateRequest, DepartmentUpdateRequest,
};
use crate::routes::ListQuery;
use crate::scope::TargetRef;
use crate::utils::utc_now;

const DEPT_COLUMNS: &str = "id, org_id, name, created_at, updated_at, is_deleted, deleted_at, deleted_by";

fn target(dept: &DbDepartment) -> TargetRef {
    TargetRef::department(dept.org_id, dept.id)
}

#[utoipa::path(
    get,
    path = "/departments",
    tag = "Departments",
    responses((status = 200, description = "List departments in the caller's organization", body = [Department]))
)]
pub async fn list_departments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<Department>>> {
    authz::require(&ctx, Action::Read, EntityKind::Department, None)?;
    let vis = query.visibility(&ctx)?;

    let sql = format!(
        "SELECT {DEPT_COLUMNS} FROM departments WHERE org_id = ?{} ORDER BY name",
        vis.tombstone_filter()
    );
    let rows: Vec<DbDepartment> = sqlx::query_as(&sql).bind(ctx.org_id).fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Department::from).collect()))
}

#[utoipa::path(
    post,
    path = "/departments",
    tag = "Departments",
    request_body = DepartmentCreateRequest,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 409, description = "Name already in use within the organization")
    )
)]
pub async fn create_department(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<DepartmentCreateRequest>,
) -> AppResult<(StatusCode, Json<Department>)> {
    authz::require(&ctx, Action::Create, EntityKind::Department, None)?;
    ensure_name_available(&state.pool, ctx.org_id, &payload.name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query("INSERT INTO departments (id, org_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(ctx.org_id)
        .bind(&payload.name)
        .bind(now)
        .bind(now)
        .execute(&state.pool)
        .await?;

    let dept: Department = fetch_department(&state.pool, id, Visibility::Active).await?.into();
    Ok((StatusCode::CREATED, Json(dept)))
}

#[utoipa::path(
    get,
    path = "/departments/{id}",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    responses((status = 200, description = "Department detail", body = Department))
)]
pub async fn get_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Department>> {
    let db_dept = fetch_department(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Read, EntityKind::Department, Some(&target(&db_dept)))?;

    Ok(Json(db_dept.into()))
}

#[utoipa::path(
    put,
    path = "/departments/{id}",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    request_body = DepartmentUpdateRequest,
    responses((status = 200, description = "Department updated", body = Department))
)]
pub async fn update_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<DepartmentUpdateRequest>,
) -> AppResult<Json<Department>> {
    let db_dept = fetch_department(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Update, EntityKind::Department, Some(&target(&db_dept)))?;

    let name = match payload.name {
        Some(name) if name != db_dept.name => {
            ensure_name_available(&state.pool, db_dept.org_id, &name, Some(id)).await?;
            name
        }
        Some(name) => name,
        None => db_dept.name.clone(),
    };

    sqlx::query("UPDATE departments SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;

    let dept: Department = fetch_department(&state.pool, id, Visibility::Active).await?.into();
    Ok(Json(dept))
}

#[utoipa::path(
    delete,
    path = "/departments/{id}",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    responses((status = 204, description = "Department soft deleted; users and tasks cascade"))
)]
pub async fn delete_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_dept = fetch_department(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Delete, EntityKind::Department, Some(&target(&db_dept)))?;

    lifecycle::soft_delete(&state.pool, EntityKind::Department, id, Some(ctx.actor_id)).await?;

    let dept: Department = db_dept.into();
    log_entity_event(&state.events, "deleted", Some(ctx.actor_id), &dept, None);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/departments/{id}/restore",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    responses(
        (status = 200, description = "Department restored", body = Department),
        (status = 409, description = "Not deleted, or an active department holds the same name")
    )
)]
pub async fn restore_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Department>> {
    let db_dept = fetch_department(&state.pool, id, Visibility::All).await?;
    authz::require(&ctx, Action::Restore, EntityKind::Department, Some(&target(&db_dept)))?;

    lifecycle::restore(&state.pool, EntityKind::Department, id).await?;

    let dept: Department = fetch_department(&state.pool, id, Visibility::Active).await?.into();
    log_entity_event(&state.events, "restored", Some(ctx.actor_id), &dept, None);

    Ok(Json(dept))
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
                "SELECT COUNT(1) FROM departments WHERE org_id = ? AND name = ? AND is_deleted = 0 AND id <> ?",
            )
            .bind(org_id)
            .bind(name)
            .bind(id)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM departments WHERE org_id = ? AND name = ? AND is_deleted = 0",
            )
            .bind(org_id)
            .bind(name)
            .fetch_one(pool)
            .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict("department name already in use"));
    }
    Ok(())
}

async fn fetch_department(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbDepartment> {
    let sql = format!(
        "SELECT {DEPT_COLUMNS} FROM departments WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbDepartment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("department not found"))
}
