//! Tombstone invariant, default-exclusion reads, and the hard-delete guard,
//! exercised directly against the lifecycle engine.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use uuid::Uuid;

use taskdesk::errors::AppError;
use taskdesk::lifecycle::{self, EntityKind, PurgeAuthority, Visibility};

async fn test_pool() -> Result<(tempfile::TempDir, SqlitePool)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

async fn seed_org(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query("INSERT INTO organizations (id, name, is_platform, created_at, updated_at) VALUES (?, ?, 0, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(id)
}

async fn seed_department(pool: &SqlitePool, org_id: Uuid, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query("INSERT INTO departments (id, org_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(org_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(id)
}

#[derive(Debug, sqlx::FromRow)]
struct Tombstone {
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

async fn tombstone_of(pool: &SqlitePool, kind: EntityKind, id: Uuid) -> Result<Tombstone> {
    let sql = format!(
        "SELECT is_deleted, deleted_at, deleted_by FROM {} WHERE id = ?",
        kind.table()
    );
    Ok(sqlx::query_as(&sql).bind(id).fetch_one(pool).await?)
}

#[tokio::test]
async fn tombstone_invariant_through_delete_and_restore() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;
    let dept = seed_department(&pool, org, "Maintenance").await?;
    let actor = Uuid::new_v4();

    // Created active: all three fields clear.
    let t = tombstone_of(&pool, EntityKind::Department, dept).await?;
    assert!(!t.is_deleted);
    assert!(t.deleted_at.is_none());
    assert!(t.deleted_by.is_none());

    lifecycle::soft_delete(&pool, EntityKind::Department, dept, Some(actor)).await?;
    let t = tombstone_of(&pool, EntityKind::Department, dept).await?;
    assert!(t.is_deleted);
    assert!(t.deleted_at.is_some());
    assert_eq!(t.deleted_by, Some(actor));

    lifecycle::restore(&pool, EntityKind::Department, dept).await?;
    let t = tombstone_of(&pool, EntityKind::Department, dept).await?;
    assert!(!t.is_deleted);
    assert!(t.deleted_at.is_none());
    assert!(t.deleted_by.is_none());

    Ok(())
}

#[tokio::test]
async fn double_delete_and_double_restore_are_rejected() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;
    let dept = seed_department(&pool, org, "Maintenance").await?;

    let err = lifecycle::restore(&pool, EntityKind::Department, dept)
        .await
        .expect_err("restoring an active row must fail");
    assert!(matches!(err, AppError::NotDeleted));

    lifecycle::soft_delete(&pool, EntityKind::Department, dept, None).await?;

    let err = lifecycle::soft_delete(&pool, EntityKind::Department, dept, None)
        .await
        .expect_err("second delete must fail");
    assert!(matches!(err, AppError::AlreadyDeleted));

    lifecycle::restore(&pool, EntityKind::Department, dept).await?;
    let err = lifecycle::restore(&pool, EntityKind::Department, dept)
        .await
        .expect_err("second restore must fail");
    assert!(matches!(err, AppError::NotDeleted));

    Ok(())
}

#[tokio::test]
async fn default_reads_exclude_tombstoned_rows() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;
    let alive = seed_department(&pool, org, "Alive").await?;
    let doomed = seed_department(&pool, org, "Doomed").await?;

    lifecycle::soft_delete(&pool, EntityKind::Department, doomed, None).await?;

    let active_sql = format!(
        "SELECT id FROM departments WHERE org_id = ?{}",
        Visibility::Active.tombstone_filter()
    );
    let active: Vec<Uuid> = sqlx::query_scalar(&active_sql).bind(org).fetch_all(&pool).await?;
    assert_eq!(active, vec![alive]);

    let all_sql = format!(
        "SELECT id FROM departments WHERE org_id = ?{}",
        Visibility::All.tombstone_filter()
    );
    let all: Vec<Uuid> = sqlx::query_scalar(&all_sql).bind(org).fetch_all(&pool).await?;
    assert_eq!(all.len(), 2);

    Ok(())
}

#[tokio::test]
async fn request_path_cannot_hard_delete() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;
    let dept = seed_department(&pool, org, "Maintenance").await?;

    let err = lifecycle::hard_delete(&pool, EntityKind::Department, dept, PurgeAuthority::Request)
        .await
        .expect_err("request-path hard delete must be rejected");
    assert!(matches!(err, AppError::HardDeleteDisabled));

    // The row is untouched.
    let t = tombstone_of(&pool, EntityKind::Department, dept).await?;
    assert!(!t.is_deleted);

    // The administrative bypass works.
    let removed =
        lifecycle::hard_delete(&pool, EntityKind::Department, dept, PurgeAuthority::Administrative)
            .await?;
    assert_eq!(removed, 1);

    Ok(())
}
