//! TTL-driven permanent purge of expired tombstones.
//!
//! Runs out of band: a background interval task in the server process plus a
//! CLI subcommand for one-shot sweeps. Purging is irreversible.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::utils::utc_now;

use super::EntityKind;

#[derive(Debug, Default)]
pub struct PurgeReport {
    pub removed: Vec<(EntityKind, u64)>,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.removed.iter().map(|(_, count)| count).sum()
    }
}

/// Remove every tombstoned row whose `deleted_at` is older than its kind's
/// retention window. Idempotent: a second sweep over the same data removes
/// nothing.
pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<PurgeReport, AppError> {
    let mut report = PurgeReport::default();

    // EntityKind::ALL is leaf-first, so child rows sharing a cascade
    // timestamp with their parent are gone before the parent row is removed.
    for kind in EntityKind::ALL {
        let cutoff = now - kind.retention();
        let sql = format!(
            "DELETE FROM {} WHERE is_deleted = 1 AND deleted_at IS NOT NULL AND deleted_at <= ?",
            kind.table()
        );
        let result = sqlx::query(&sql).bind(cutoff).execute(pool).await?;

        if result.rows_affected() > 0 {
            tracing::info!(
                kind = kind.as_str(),
                removed = result.rows_affected(),
                "purged expired tombstones"
            );
            report.removed.push((kind, result.rows_affected()));
        }
    }

    Ok(report)
}

/// Background sweep loop. Interval comes from `PURGE_INTERVAL_SECS`
/// (default one hour).
pub async fn run_retention_sweeper(pool: SqlitePool) {
    let interval_secs = std::env::var("PURGE_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(3600);

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(interval_secs, "retention sweeper started");

    loop {
        ticker.tick().await;
        match purge_expired(&pool, utc_now()).await {
            Ok(report) if report.total() > 0 => {
                tracing::info!(removed = report.total(), "retention sweep finished");
            }
            Ok(_) => {}
            Err(err) => {
                // Sweep failures are retried on the next tick, never fatal.
                tracing::error!(error = %err, "retention sweep failed");
            }
        }
    }
}
