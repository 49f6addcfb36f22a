//! Soft-delete lifecycle engine.
//!
//! Every entity kind carries the same tombstone triple (`is_deleted`,
//! `deleted_at`, `deleted_by`). This module is the only code path that stamps
//! or clears it: soft deletes cascade along the declared edges inside one
//! transaction, restores re-check uniqueness centrally, and permanent removal
//! is locked behind the retention sweep or an explicit administrative bypass.

pub mod cascade;
pub mod purge;

pub use cascade::{CascadeEdge, CascadeReport};
pub use purge::{purge_expired, run_retention_sweeper, PurgeReport};

use chrono::Duration;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::utils::utc_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Organization,
    Department,
    User,
    Task,
    TaskActivity,
    TaskComment,
    Material,
    Vendor,
    Attachment,
    Notification,
}

impl EntityKind {
    /// Leaf-first so the purge sweep removes children before their parents.
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Notification,
        EntityKind::Attachment,
        EntityKind::TaskComment,
        EntityKind::TaskActivity,
        EntityKind::Task,
        EntityKind::Material,
        EntityKind::Vendor,
        EntityKind::User,
        EntityKind::Department,
        EntityKind::Organization,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Organization => "organizations",
            EntityKind::Department => "departments",
            EntityKind::User => "users",
            EntityKind::Task => "tasks",
            EntityKind::TaskActivity => "task_activities",
            EntityKind::TaskComment => "task_comments",
            EntityKind::Material => "materials",
            EntityKind::Vendor => "vendors",
            EntityKind::Attachment => "attachments",
            EntityKind::Notification => "notifications",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::Department => "department",
            EntityKind::User => "user",
            EntityKind::Task => "task",
            EntityKind::TaskActivity => "task_activity",
            EntityKind::TaskComment => "task_comment",
            EntityKind::Material => "material",
            EntityKind::Vendor => "vendor",
            EntityKind::Attachment => "attachment",
            EntityKind::Notification => "notification",
        }
    }

    /// Retention window before a tombstoned row becomes eligible for the
    /// permanent purge. Root tenancy/identity records keep the longest
    /// window; ephemeral records the shortest.
    pub fn retention_days(self) -> i64 {
        match self {
            EntityKind::Organization => 365,
            EntityKind::Department => 365,
            EntityKind::User => 365,
            EntityKind::Task => 180,
            EntityKind::TaskActivity => 180,
            EntityKind::TaskComment => 180,
            EntityKind::Material => 180,
            EntityKind::Vendor => 365,
            EntityKind::Attachment => 90,
            EntityKind::Notification => 30,
        }
    }

    pub fn retention(self) -> Duration {
        Duration::days(self.retention_days())
    }

    /// Declarative cascade table: tombstoning a row of this kind walks these
    /// edges, recursively where a child declares edges of its own.
    pub fn cascade_edges(self) -> &'static [CascadeEdge] {
        match self {
            EntityKind::Organization => &[
                CascadeEdge::new(EntityKind::Department, "org_id", true),
                CascadeEdge::new(EntityKind::User, "org_id", true),
                CascadeEdge::new(EntityKind::Task, "org_id", true),
                CascadeEdge::new(EntityKind::Material, "org_id", true),
                CascadeEdge::new(EntityKind::Vendor, "org_id", true),
                CascadeEdge::new(EntityKind::Notification, "org_id", false),
            ],
            EntityKind::Department => &[
                CascadeEdge::new(EntityKind::User, "department_id", true),
                CascadeEdge::new(EntityKind::Task, "department_id", true),
            ],
            EntityKind::Task => &[
                CascadeEdge::new(EntityKind::TaskComment, "task_id", true),
                CascadeEdge::new(EntityKind::TaskActivity, "task_id", false),
                CascadeEdge::new(EntityKind::Attachment, "task_id", true),
            ],
            _ => &[],
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| AppError::bad_request(format!("unknown entity kind: {value}")))
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tombstone visibility for read paths. `Active` is the default everywhere;
/// `All` must be requested explicitly (admin listings with
/// `?include_deleted=true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Active,
    All,
}

impl Visibility {
    pub fn from_flag(include_deleted: bool) -> Self {
        if include_deleted {
            Visibility::All
        } else {
            Visibility::Active
        }
    }

    /// SQL fragment appended to a WHERE clause that already has at least one
    /// condition.
    pub fn tombstone_filter(self) -> &'static str {
        match self {
            Visibility::Active => " AND is_deleted = 0",
            Visibility::All => "",
        }
    }
}

/// Who is asking for a permanent delete. The request path never gets one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeAuthority {
    /// An ordinary API request; always rejected with `HardDeleteDisabled`.
    Request,
    /// The TTL retention sweep.
    RetentionSweep,
    /// An explicit platform-admin purge that bypasses the guard.
    Administrative,
}

/// Tombstone the row and walk its cascade edges, all in one transaction with
/// the parent stamped first. Fails with `AlreadyDeleted` when the row is
/// already tombstoned.
pub async fn soft_delete(
    pool: &SqlitePool,
    kind: EntityKind,
    id: Uuid,
    actor: Option<Uuid>,
) -> Result<CascadeReport, AppError> {
    let mut tx = pool.begin().await?;

    match fetch_tombstone_state(&mut tx, kind, id).await? {
        None => return Err(AppError::not_found(format!("{kind} not found"))),
        Some(true) => return Err(AppError::AlreadyDeleted),
        Some(false) => {}
    }

    let now = utc_now();
    let sql = format!(
        "UPDATE {} SET is_deleted = 1, deleted_at = ?, deleted_by = ? WHERE id = ? AND is_deleted = 0",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(now)
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let report = cascade::walk(&mut tx, kind, id, now, actor).await?;
    tx.commit().await?;

    tracing::info!(
        kind = kind.as_str(),
        %id,
        cascaded = report.total(),
        "soft-deleted"
    );

    Ok(report)
}

/// Clear the tombstone. Rejected with `NotDeleted` for active rows and with
/// `RestoreConflict` when an active row already holds the same unique key.
/// Restore does not cascade; descendants are restored individually.
pub async fn restore(pool: &SqlitePool, kind: EntityKind, id: Uuid) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    match fetch_tombstone_state(&mut tx, kind, id).await? {
        None => return Err(AppError::not_found(format!("{kind} not found"))),
        Some(false) => return Err(AppError::NotDeleted),
        Some(true) => {}
    }

    if let Some(check) = conflict_check_sql(kind) {
        let conflicts: i64 = sqlx::query_scalar(check).bind(id).fetch_one(&mut *tx).await?;
        if conflicts > 0 {
            return Err(AppError::RestoreConflict);
        }
    }

    let sql = format!(
        "UPDATE {} SET is_deleted = 0, deleted_at = NULL, deleted_by = NULL WHERE id = ?",
        kind.table()
    );
    sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;

    tracing::info!(kind = kind.as_str(), %id, "restored");
    Ok(())
}

/// Permanently remove a row. Only the retention sweep and the administrative
/// bypass may do this; the request path is rejected outright.
pub async fn hard_delete(
    pool: &SqlitePool,
    kind: EntityKind,
    id: Uuid,
    authority: PurgeAuthority,
) -> Result<u64, AppError> {
    if authority == PurgeAuthority::Request {
        return Err(AppError::HardDeleteDisabled);
    }

    let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;

    tracing::warn!(
        kind = kind.as_str(),
        %id,
        authority = ?authority,
        removed = result.rows_affected(),
        "hard-deleted"
    );

    Ok(result.rows_affected())
}

async fn fetch_tombstone_state(
    tx: &mut sqlx::SqliteConnection,
    kind: EntityKind,
    id: Uuid,
) -> Result<Option<bool>, AppError> {
    let sql = format!("SELECT is_deleted FROM {} WHERE id = ?", kind.table());
    let state = sqlx::query_scalar::<_, bool>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    Ok(state)
}

/// Per-kind uniqueness re-check used by `restore`. Each query takes the
/// restoring row's id as `?1` and counts active rows that already hold the
/// same unique key.
fn conflict_check_sql(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Organization => Some(
            "SELECT COUNT(1) FROM organizations \
             WHERE is_deleted = 0 AND id <> ?1 \
               AND name = (SELECT name FROM organizations WHERE id = ?1)",
        ),
        EntityKind::Department => Some(
            "SELECT COUNT(1) FROM departments \
             WHERE is_deleted = 0 AND id <> ?1 \
               AND org_id = (SELECT org_id FROM departments WHERE id = ?1) \
               AND name = (SELECT name FROM departments WHERE id = ?1)",
        ),
        // Users carry two unique keys: email per org, and position per
        // department among active HOD users.
        EntityKind::User => Some(
            "SELECT \
               (SELECT COUNT(1) FROM users \
                WHERE is_deleted = 0 AND id <> ?1 \
                  AND org_id = (SELECT org_id FROM users WHERE id = ?1) \
                  AND email = (SELECT email FROM users WHERE id = ?1)) \
             + (SELECT COUNT(1) FROM users \
                WHERE is_deleted = 0 AND id <> ?1 \
                  AND department_id = (SELECT department_id FROM users WHERE id = ?1) \
                  AND role IN ('super_admin', 'admin') \
                  AND position IS NOT NULL \
                  AND (SELECT role FROM users WHERE id = ?1) IN ('super_admin', 'admin') \
                  AND position = (SELECT position FROM users WHERE id = ?1))",
        ),
        EntityKind::Material => Some(
            "SELECT COUNT(1) FROM materials \
             WHERE is_deleted = 0 AND id <> ?1 \
               AND org_id = (SELECT org_id FROM materials WHERE id = ?1) \
               AND name = (SELECT name FROM materials WHERE id = ?1)",
        ),
        EntityKind::Vendor => Some(
            "SELECT COUNT(1) FROM vendors \
             WHERE is_deleted = 0 AND id <> ?1 \
               AND org_id = (SELECT org_id FROM vendors WHERE id = ?1) \
               AND name = (SELECT name FROM vendors WHERE id = ?1)",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_table_and_retention() {
        for kind in EntityKind::ALL {
            assert!(!kind.table().is_empty());
            assert!(kind.retention_days() > 0);
        }
    }

    #[test]
    fn cascade_children_never_outlive_parents() {
        // A child's retention must not exceed its parent's, otherwise the
        // purge could remove a parent row while tombstoned children still
        // reference it.
        for parent in EntityKind::ALL {
            for edge in parent.cascade_edges() {
                assert!(
                    edge.child.retention_days() <= parent.retention_days(),
                    "{} outlives {}",
                    edge.child,
                    parent
                );
            }
        }
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn default_visibility_excludes_tombstones() {
        assert_eq!(Visibility::default(), Visibility::Active);
        assert_eq!(Visibility::Active.tombstone_filter(), " AND is_deleted = 0");
        assert_eq!(Visibility::All.tombstone_filter(), "");
    }
}
