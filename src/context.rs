//! Tenant context extraction.
//!
//! The one place actor identity is derived: the verified JWT supplies the
//! user id, everything else (org, department, role, HOD/platform flags) is
//! loaded fresh from the store per request. Components below this layer take
//! the context as given and never re-derive it.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::FromRow;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Role;
use crate::errors::AppError;
use crate::jwt::token_from_parts;

/// Reserved sentinel organization whose members may act across tenants.
/// Seeded by migration; never listed to customers.
pub const PLATFORM_ORG_ID: Uuid = Uuid::from_u128(1);

#[derive(Debug, Clone)]
pub struct TenantContext {
    pub actor_id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub role: Role,
    pub is_hod: bool,
    pub is_platform_admin: bool,
}

#[derive(Debug, FromRow)]
struct ContextRow {
    id: Uuid,
    org_id: Uuid,
    department_id: Uuid,
    role: String,
    user_deleted: bool,
    org_deleted: bool,
    dept_deleted: bool,
    is_platform: bool,
}

/// Load the context for a verified actor id. Bypasses default-exclusion on
/// purpose: a tombstoned user/org/department must produce
/// `AccountDeactivated`, not a blind not-found.
pub async fn load_context(pool: &SqlitePool, actor_id: Uuid) -> Result<TenantContext, AppError> {
    let row = sqlx::query_as::<_, ContextRow>(
        "SELECT u.id, u.org_id, u.department_id, u.role, \
                u.is_deleted AS user_deleted, \
                o.is_deleted AS org_deleted, o.is_platform, \
                d.is_deleted AS dept_deleted \
         FROM users u \
         INNER JOIN organizations o ON o.id = u.org_id \
         INNER JOIN departments d ON d.id = u.department_id \
         WHERE u.id = ?",
    )
    .bind(actor_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::unauthenticated("unknown account"))?;

    if row.user_deleted || row.org_deleted || row.dept_deleted {
        return Err(AppError::AccountDeactivated);
    }

    let role: Role = row.role.parse()?;

    Ok(TenantContext {
        actor_id: row.id,
        org_id: row.org_id,
        department_id: row.department_id,
        role,
        is_hod: role.is_hod(),
        is_platform_admin: row.is_platform,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for TenantContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| AppError::unauthenticated("missing session cookie or bearer token"))?;
        let claims = state.jwt.decode(&token)?;

        let ctx = load_context(&state.pool, claims.sub).await?;

        // Advisory presence: seeing any authenticated request counts.
        state.presence.touch(ctx.actor_id);

        Ok(ctx)
    }
}
