//! Generic cascade walker over the declarative edge table.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::EntityKind;

/// One declared parent -> child ownership edge. The deleting actor's id is
/// only carried across edges with `propagate_actor` set; system-written rows
/// (activities, notifications) keep `deleted_by` NULL.
#[derive(Debug, Clone, Copy)]
pub struct CascadeEdge {
    pub child: EntityKind,
    pub fk_column: &'static str,
    pub propagate_actor: bool,
}

impl CascadeEdge {
    pub const fn new(child: EntityKind, fk_column: &'static str, propagate_actor: bool) -> Self {
        Self {
            child,
            fk_column,
            propagate_actor,
        }
    }
}

/// Per-kind tombstone counts for one cascade walk.
#[derive(Debug, Default)]
pub struct CascadeReport {
    pub tombstoned: Vec<(EntityKind, u64)>,
}

impl CascadeReport {
    pub fn total(&self) -> u64 {
        self.tombstoned.iter().map(|(_, count)| count).sum()
    }

    pub fn count_for(&self, kind: EntityKind) -> u64 {
        self.tombstoned
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, count)| count)
            .sum()
    }

    fn record(&mut self, kind: EntityKind, count: u64) {
        if let Some(entry) = self.tombstoned.iter_mut().find(|(k, _)| *k == kind) {
            entry.1 += count;
        } else {
            self.tombstoned.push((kind, count));
        }
    }
}

/// Breadth-first walk from an already-tombstoned root. Children are stamped
/// with the root's timestamp; only active rows are touched, so re-walking an
/// already-cascaded subtree is a no-op rather than a double stamp. Runs on
/// the caller's transaction.
pub(super) async fn walk(
    tx: &mut SqliteConnection,
    root: EntityKind,
    root_id: Uuid,
    stamp: DateTime<Utc>,
    actor: Option<Uuid>,
) -> sqlx::Result<CascadeReport> {
    let mut report = CascadeReport::default();
    let mut queue: VecDeque<(EntityKind, Uuid)> = VecDeque::new();
    queue.push_back((root, root_id));

    while let Some((kind, id)) = queue.pop_front() {
        for edge in kind.cascade_edges() {
            let select = format!(
                "SELECT id FROM {} WHERE {} = ? AND is_deleted = 0",
                edge.child.table(),
                edge.fk_column
            );
            let child_ids: Vec<Uuid> = sqlx::query_scalar(&select)
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

            if child_ids.is_empty() {
                continue;
            }

            let deleted_by = if edge.propagate_actor { actor } else { None };
            let update = format!(
                "UPDATE {} SET is_deleted = 1, deleted_at = ?, deleted_by = ? WHERE {} = ? AND is_deleted = 0",
                edge.child.table(),
                edge.fk_column
            );
            let result = sqlx::query(&update)
                .bind(stamp)
                .bind(deleted_by)
                .bind(id)
                .execute(&mut *tx)
                .await?;

            report.record(edge.child, result.rows_affected());

            if !edge.child.cascade_edges().is_empty() {
                for child_id in child_ids {
                    queue.push_back((edge.child, child_id));
                }
            }
        }
    }

    Ok(report)
}
