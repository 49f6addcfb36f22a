//! Central restore-conflict checking: a tombstoned row may only come back
//! when no active row holds its unique key.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use uuid::Uuid;

use taskdesk::errors::AppError;
use taskdesk::lifecycle::{self, EntityKind};

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

async fn seed_hod(
    pool: &SqlitePool,
    org_id: Uuid,
    dept_id: Uuid,
    email: &str,
    position: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, org_id, department_id, name, email, password_hash, role, position, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 'x', 'admin', ?, ?, ?)",
    )
    .bind(id)
    .bind(org_id)
    .bind(dept_id)
    .bind(email)
    .bind(email)
    .bind(position)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

#[tokio::test]
async fn restore_rejected_when_active_row_took_the_name() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;

    let first = seed_department(&pool, org, "Maintenance").await?;
    lifecycle::soft_delete(&pool, EntityKind::Department, first, None).await?;

    // The name is free again, so a replacement can claim it.
    let replacement = seed_department(&pool, org, "Maintenance").await?;

    let err = lifecycle::restore(&pool, EntityKind::Department, first)
        .await
        .expect_err("restore must conflict with the active namesake");
    assert!(matches!(err, AppError::RestoreConflict));

    // Neither row changed.
    let first_deleted: bool = sqlx::query_scalar("SELECT is_deleted FROM departments WHERE id = ?")
        .bind(first)
        .fetch_one(&pool)
        .await?;
    assert!(first_deleted);
    let replacement_deleted: bool = sqlx::query_scalar("SELECT is_deleted FROM departments WHERE id = ?")
        .bind(replacement)
        .fetch_one(&pool)
        .await?;
    assert!(!replacement_deleted);

    Ok(())
}

#[tokio::test]
async fn restore_succeeds_once_the_conflict_clears() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;

    let first = seed_department(&pool, org, "Maintenance").await?;
    lifecycle::soft_delete(&pool, EntityKind::Department, first, None).await?;
    let replacement = seed_department(&pool, org, "Maintenance").await?;

    // Rename the active namesake; the tombstoned row may come back.
    sqlx::query("UPDATE departments SET name = 'Facilities' WHERE id = ?")
        .bind(replacement)
        .execute(&pool)
        .await?;

    lifecycle::restore(&pool, EntityKind::Department, first).await?;

    let restored: bool = sqlx::query_scalar("SELECT is_deleted FROM departments WHERE id = ?")
        .bind(first)
        .fetch_one(&pool)
        .await?;
    assert!(!restored);

    Ok(())
}

#[tokio::test]
async fn same_name_in_another_org_is_no_conflict() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org_a = seed_org(&pool, "Acme").await?;
    let org_b = seed_org(&pool, "Globex").await?;

    let dept_a = seed_department(&pool, org_a, "Maintenance").await?;
    lifecycle::soft_delete(&pool, EntityKind::Department, dept_a, None).await?;

    // Uniqueness is scoped per tenant.
    seed_department(&pool, org_b, "Maintenance").await?;

    lifecycle::restore(&pool, EntityKind::Department, dept_a).await?;
    Ok(())
}

#[tokio::test]
async fn user_restore_checks_email_and_hod_position() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;
    let dept = seed_department(&pool, org, "Maintenance").await?;

    let original = seed_hod(&pool, org, dept, "head@example.com", "Head of Maintenance").await?;
    lifecycle::soft_delete(&pool, EntityKind::User, original, None).await?;

    // A successor takes the same position with a different email.
    seed_hod(&pool, org, dept, "successor@example.com", "Head of Maintenance").await?;

    let err = lifecycle::restore(&pool, EntityKind::User, original)
        .await
        .expect_err("position is already held");
    assert!(matches!(err, AppError::RestoreConflict));

    Ok(())
}
