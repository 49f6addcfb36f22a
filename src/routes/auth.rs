use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::context::{load_context, TenantContext};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User};
use crate::routes::MessageResponse;
use crate::utils::{hash_password, utc_now, verify_password};

const USER_COLUMNS: &str = "id, org_id, department_id, name, email, password_hash, role, position, \
                            created_at, updated_at, is_deleted, deleted_at, deleted_by";

/// Tenant signup: a new organization with a default department and its first
/// SuperAdmin in one transaction.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Organization and owner registered", body = AuthResponse),
        (status = 409, description = "Organization name already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<AuthResponse>)> {
    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();

    let org_id = Uuid::new_v4();
    let dept_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    let taken: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM organizations WHERE name = ? AND is_deleted = 0")
            .bind(&payload.organization)
            .fetch_one(&mut *tx)
            .await?;
    if taken > 0 {
        return Err(AppError::conflict("organization name already in use"));
    }

    sqlx::query(
        "INSERT INTO organizations (id, name, is_platform, created_at, updated_at) VALUES (?, ?, 0, ?, ?)",
    )
    .bind(org_id)
    .bind(&payload.organization)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO departments (id, org_id, name, created_at, updated_at) VALUES (?, ?, 'General', ?, ?)",
    )
    .bind(dept_id)
    .bind(org_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO users (id, org_id, department_id, name, email, password_hash, role, position, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'super_admin', 'Owner', ?, ?)",
    )
    .bind(user_id)
    .bind(org_id)
    .bind(dept_id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        state
            .jwt
            .session_cookie(&token)
            .parse()
            .map_err(|_| AppError::internal("invalid cookie value"))?,
    );

    Ok((StatusCode::CREATED, headers, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<AuthResponse>)> {
    // Email is unique per org, not globally; an org name narrows the match
    // when the same address exists in several tenants.
    let candidates: Vec<DbUser> = match &payload.organization {
        Some(org_name) => {
            let sql = format!(
                "SELECT u.{} FROM users u \
                 INNER JOIN organizations o ON o.id = u.org_id \
                 WHERE u.email = ? AND o.name = ? AND u.is_deleted = 0",
                USER_COLUMNS.replace(", ", ", u.")
            );
            sqlx::query_as(&sql)
                .bind(&payload.email)
                .bind(org_name)
                .fetch_all(&state.pool)
                .await?
        }
        None => {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? AND is_deleted = 0");
            sqlx::query_as(&sql)
                .bind(&payload.email)
                .fetch_all(&state.pool)
                .await?
        }
    };

    let db_user = match candidates.len() {
        0 => return Err(AppError::unauthenticated("invalid credentials")),
        1 => candidates.into_iter().next().expect("len checked"),
        _ => {
            return Err(AppError::bad_request(
                "email exists in multiple organizations; specify organization",
            ))
        }
    };

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthenticated("invalid credentials"));
    }

    // Surfaces AccountDeactivated when the user, org or department is
    // tombstoned.
    load_context(&state.pool, db_user.id).await?;

    let token = state.jwt.encode(db_user.id)?;
    let user: User = db_user.try_into()?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        state
            .jwt
            .session_cookie(&token)
            .parse()
            .map_err(|_| AppError::internal("invalid cookie value"))?,
    );

    Ok((headers, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, ctx: TenantContext) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, ctx.actor_id).await?;
    let user: User = db_user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged"))
)]
pub async fn logout(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> AppResult<(HeaderMap, Json<MessageResponse>)> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        state
            .jwt
            .clear_cookie()
            .parse()
            .map_err(|_| AppError::internal("invalid cookie value"))?,
    );

    Ok((headers, Json(MessageResponse::new("Logged out"))))
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND is_deleted = 0");
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}
