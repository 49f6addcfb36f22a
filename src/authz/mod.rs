//! Authorization engine.
//!
//! Two static matrices must both agree before an action is granted: role x
//! resource kind x action, and role x resolved scope x permission bucket.
//! Unknown roles parse to an error and therefore deny everything. Platform
//! management (organization create/delete/restore, cross-tenant listing) sits
//! behind an explicit predicate checked before any matrix lookup.

mod matrix;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::context::TenantContext;
use crate::errors::AppError;
use crate::lifecycle::EntityKind;
use crate::scope::{resolve_scope, TargetRef};

/// Fixed role set, ordered from most to least privileged. SuperAdmin and
/// Admin form the head-of-department tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
        }
    }

    pub fn is_hod(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = AppError;

    // Fail closed: a role string that does not parse never reaches the
    // matrices, so it can grant nothing.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "user" => Ok(Role::User),
            other => Err(AppError::internal(format!("unrecognized role: {other}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Restore,
}

impl Action {
    /// Coarse bucket used by the scope matrix.
    pub fn bucket(self) -> Bucket {
        match self {
            Action::Read => Bucket::Read,
            Action::Create | Action::Update | Action::Restore => Bucket::Write,
            Action::Delete => Bucket::Delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Read,
    Write,
    Delete,
}

/// Core authorization decision.
///
/// Without a target this is the coarse "may this role ever do this to this
/// kind" pre-check used by list/create endpoints. With a target, the scope
/// resolver and the scope matrix must also agree.
pub fn authorize(
    ctx: &TenantContext,
    action: Action,
    kind: EntityKind,
    target: Option<&TargetRef>,
) -> bool {
    if !matrix::kind_grants(ctx.role, kind, action) {
        deny_trace(ctx, action, kind, "kind matrix");
        return false;
    }

    let Some(target) = target else {
        return true;
    };

    let Some(scope) = resolve_scope(ctx, target) else {
        deny_trace(ctx, action, kind, "no scope");
        return false;
    };

    let granted = matrix::scope_grants(ctx.role, scope).contains(&action.bucket());
    if !granted {
        deny_trace(ctx, action, kind, scope.as_str());
    }
    granted
}

/// `authorize` as a guard. The rejection is always the same opaque
/// `Forbidden`; which rule failed stays in the debug log.
pub fn require(
    ctx: &TenantContext,
    action: Action,
    kind: EntityKind,
    target: Option<&TargetRef>,
) -> Result<(), AppError> {
    if authorize(ctx, action, kind, target) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Platform-management predicate: the actor's org must be the platform org
/// AND the role must be the top role. Checked ahead of any matrix lookup for
/// tenant CRUD and cross-tenant listing.
pub fn is_platform_admin(ctx: &TenantContext) -> bool {
    ctx.is_platform_admin && ctx.role == Role::SuperAdmin
}

pub fn require_platform_admin(ctx: &TenantContext) -> Result<(), AppError> {
    if is_platform_admin(ctx) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn deny_trace(ctx: &TenantContext, action: Action, kind: EntityKind, rule: &str) {
    tracing::debug!(
        actor = %ctx.actor_id,
        role = ctx.role.as_str(),
        action = action.as_str(),
        kind = kind.as_str(),
        rule,
        "authorization denied"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx(role: Role, platform: bool) -> TenantContext {
        TenantContext {
            actor_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            role,
            is_hod: role.is_hod(),
            is_platform_admin: platform,
        }
    }

    #[test]
    fn unknown_roles_fail_closed() {
        assert!("owner".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
        assert!("SuperAdmin".parse::<Role>().is_err());
    }

    #[test]
    fn cross_org_denied_regardless_of_role() {
        let ctx = ctx(Role::SuperAdmin, false);
        let target = TargetRef::resource(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(!authorize(&ctx, Action::Read, EntityKind::Task, Some(&target)));
    }

    #[test]
    fn manager_writes_own_department_tasks() {
        let ctx = ctx(Role::Manager, false);
        // Created by a different user in the manager's department.
        let target = TargetRef::resource(Uuid::new_v4(), ctx.org_id, ctx.department_id);
        assert!(authorize(&ctx, Action::Update, EntityKind::Task, Some(&target)));
        // But ownDept grants no delete bucket to managers.
        assert!(!authorize(&ctx, Action::Delete, EntityKind::Task, Some(&target)));
    }

    #[test]
    fn manager_cannot_delete_users_or_create_vendors() {
        let ctx = ctx(Role::Manager, false);
        let target = TargetRef::user(Uuid::new_v4(), ctx.org_id, ctx.department_id);
        assert!(!authorize(&ctx, Action::Delete, EntityKind::User, Some(&target)));
        assert!(!authorize(&ctx, Action::Create, EntityKind::Vendor, None));
    }

    #[test]
    fn user_role_is_read_and_own_write_only() {
        let ctx = ctx(Role::User, false);

        let own_task = TargetRef::resource(ctx.actor_id, ctx.org_id, ctx.department_id);
        assert!(authorize(&ctx, Action::Update, EntityKind::Task, Some(&own_task)));
        assert!(!authorize(&ctx, Action::Delete, EntityKind::Task, Some(&own_task)));

        let dept_task = TargetRef::resource(Uuid::new_v4(), ctx.org_id, ctx.department_id);
        assert!(authorize(&ctx, Action::Read, EntityKind::Task, Some(&dept_task)));
        assert!(!authorize(&ctx, Action::Update, EntityKind::Task, Some(&dept_task)));
    }

    #[test]
    fn restore_is_hod_only() {
        for (role, allowed) in [
            (Role::SuperAdmin, true),
            (Role::Admin, true),
            (Role::Manager, false),
            (Role::User, false),
        ] {
            let ctx = ctx(role, false);
            assert_eq!(
                authorize(&ctx, Action::Restore, EntityKind::Task, None),
                allowed,
                "restore for {role}"
            );
        }
    }

    #[test]
    fn platform_guard_requires_both_halves() {
        assert!(is_platform_admin(&ctx(Role::SuperAdmin, true)));
        assert!(!is_platform_admin(&ctx(Role::SuperAdmin, false)));
        assert!(!is_platform_admin(&ctx(Role::Admin, true)));
    }

    #[test]
    fn platform_super_admin_reads_across_orgs() {
        let ctx = ctx(Role::SuperAdmin, true);
        let target = TargetRef::organization(Uuid::new_v4());
        assert!(authorize(&ctx, Action::Read, EntityKind::Organization, Some(&target)));
        assert!(authorize(&ctx, Action::Delete, EntityKind::Organization, Some(&target)));
    }
}
