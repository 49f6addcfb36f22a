use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Action, Role};
use crate::context::TenantContext;
use crate::errors::{AppError, AppResult};
use crate::events::log_entity_event;
use crate::lifecycle::{self, EntityKind, Visibility};
use crate::models::user::{DbUser, User, UserCreateRequest, UserUpdateRequest};
use crate::presence::PresenceStatus;
use crate::routes::ListQuery;
use crate::scope::TargetRef;
use crate::utils::{hash_password, utc_now};

const USER_COLUMNS: &str = "id, org_id, department_id, name, email, password_hash, role, position, \
                            created_at, updated_at, is_deleted, deleted_at, deleted_by";

fn target(user: &DbUser) -> TargetRef {
    TargetRef::user(user.id, user.org_id, user.department_id)
}

/// Privilege order; nobody hands out a role above their own.
fn rank(role: Role) -> u8 {
    match role {
        Role::SuperAdmin => 3,
        Role::Admin => 2,
        Role::Manager => 1,
        Role::User => 0,
    }
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses((status = 200, description = "List users", body = [User]))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<User>>> {
    authz::require(&ctx, Action::Read, EntityKind::User, None)?;
    let vis = query.visibility(&ctx)?;

    // Regular users only hold department-level read; everyone above reads
    // across departments.
    let rows: Vec<DbUser> = if ctx.role == Role::User {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE org_id = ? AND department_id = ?{} ORDER BY name",
            vis.tombstone_filter()
        );
        sqlx::query_as(&sql)
            .bind(ctx.org_id)
            .bind(ctx.department_id)
            .fetch_all(&state.pool)
            .await?
    } else {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE org_id = ?{} ORDER BY name",
            vis.tombstone_filter()
        );
        sqlx::query_as(&sql).bind(ctx.org_id).fetch_all(&state.pool).await?
    };

    let users: Vec<User> = rows.into_iter().map(User::try_from).collect::<Result<_, _>>()?;
    Ok(Json(users))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 409, description = "Email or HOD position already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    authz::require(&ctx, Action::Create, EntityKind::User, None)?;

    if payload.department_id != ctx.department_id && !ctx.is_hod {
        return Err(AppError::Forbidden);
    }
    if rank(payload.role) > rank(ctx.role) {
        return Err(AppError::Forbidden);
    }

    ensure_department_in_org(&state.pool, ctx.org_id, payload.department_id).await?;
    ensure_email_available(&state.pool, ctx.org_id, &payload.email, None).await?;

    if payload.role.is_hod() {
        let position = payload
            .position
            .as_deref()
            .ok_or_else(|| AppError::bad_request("HOD roles require a position label"))?;
        ensure_position_available(&state.pool, payload.department_id, position, None).await?;
    }

    let password_hash = hash_password(&payload.password)?;
    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO users (id, org_id, department_id, name, email, password_hash, role, position, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(ctx.org_id)
    .bind(payload.department_id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(payload.role.as_str())
    .bind(&payload.position)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user(&state.pool, id, Visibility::Active).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "User detail", body = User))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<User>> {
    let db_user = fetch_user(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Read, EntityKind::User, Some(&target(&db_user)))?;

    Ok(Json(db_user.try_into()?))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses((status = 200, description = "User updated", body = User))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let db_user = fetch_user(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Update, EntityKind::User, Some(&target(&db_user)))?;

    let current_role: Role = db_user.role.parse()?;
    let role = payload.role.unwrap_or(current_role);
    // Neither granting nor holding a role above the caller's own.
    if rank(role) > rank(ctx.role) || rank(current_role) > rank(ctx.role) {
        return Err(AppError::Forbidden);
    }

    let department_id = payload.department_id.unwrap_or(db_user.department_id);
    if department_id != db_user.department_id {
        ensure_department_in_org(&state.pool, db_user.org_id, department_id).await?;
    }

    let position = payload.position.or_else(|| db_user.position.clone());
    if role.is_hod() {
        let label = position
            .as_deref()
            .ok_or_else(|| AppError::bad_request("HOD roles require a position label"))?;
        ensure_position_available(&state.pool, department_id, label, Some(id)).await?;
    }

    let name = payload.name.unwrap_or_else(|| db_user.name.clone());

    sqlx::query(
        "UPDATE users SET name = ?, department_id = ?, role = ?, position = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(department_id)
    .bind(role.as_str())
    .bind(&position)
    .bind(utc_now())
    .bind(id)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user(&state.pool, id, Visibility::Active).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 204, description = "User soft deleted"))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_user = fetch_user(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Delete, EntityKind::User, Some(&target(&db_user)))?;

    lifecycle::soft_delete(&state.pool, EntityKind::User, id, Some(ctx.actor_id)).await?;

    let user: User = db_user.try_into()?;
    log_entity_event(&state.events, "deleted", Some(ctx.actor_id), &user, None);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/users/{id}/restore",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User restored", body = User),
        (status = 409, description = "Not deleted, or email/position conflicts with an active user")
    )
)]
pub async fn restore_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<User>> {
    let db_user = fetch_user(&state.pool, id, Visibility::All).await?;
    authz::require(&ctx, Action::Restore, EntityKind::User, Some(&target(&db_user)))?;

    lifecycle::restore(&state.pool, EntityKind::User, id).await?;

    let user: User = fetch_user(&state.pool, id, Visibility::Active).await?.try_into()?;
    log_entity_event(&state.events, "restored", Some(ctx.actor_id), &user, None);

    Ok(Json(user))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceResponse {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Advisory only: backed by the in-memory tracker, empty after a restart.
#[utoipa::path(
    get,
    path = "/users/{id}/presence",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Presence status", body = PresenceResponse))
)]
pub async fn get_presence(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<PresenceResponse>> {
    let db_user = fetch_user(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Read, EntityKind::User, Some(&target(&db_user)))?;

    let (status, last_seen) = state.presence.status(id);
    Ok(Json(PresenceResponse {
        user_id: id,
        status,
        last_seen,
    }))
}

async fn ensure_department_in_org(pool: &SqlitePool, org_id: Uuid, department_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM departments WHERE id = ? AND org_id = ? AND is_deleted = 0",
    )
    .bind(department_id)
    .bind(org_id)
    .fetch_one(pool)
    .await?;

    if count == 0 {
        return Err(AppError::referential_integrity(
            "department does not belong to the organization",
        ));
    }
    Ok(())
}

async fn ensure_email_available(
    pool: &SqlitePool,
    org_id: Uuid,
    email: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM users WHERE org_id = ? AND email = ? AND is_deleted = 0 AND id <> ?",
            )
            .bind(org_id)
            .bind(email)
            .bind(id)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM users WHERE org_id = ? AND email = ? AND is_deleted = 0",
            )
            .bind(org_id)
            .bind(email)
            .fetch_one(pool)
            .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }
    Ok(())
}

async fn ensure_position_available(
    pool: &SqlitePool,
    department_id: Uuid,
    position: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM users WHERE department_id = ? AND position = ? \
                 AND role IN ('super_admin', 'admin') AND is_deleted = 0 AND id <> ?",
            )
            .bind(department_id)
            .bind(position)
            .bind(id)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM users WHERE department_id = ? AND position = ? \
                 AND role IN ('super_admin', 'admin') AND is_deleted = 0",
            )
            .bind(department_id)
            .bind(position)
            .fetch_one(pool)
            .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict("HOD position already held in this department"));
    }
    Ok(())
}

async fn fetch_user(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbUser> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}
