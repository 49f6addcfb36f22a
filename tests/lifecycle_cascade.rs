//! Cascade completeness: tombstoning a parent walks every declared edge
//! transitively, stamps children with the parent's timestamp, and carries the
//! actor only across propagating edges.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use uuid::Uuid;

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

async fn seed_user(pool: &SqlitePool, org_id: Uuid, dept_id: Uuid, email: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, org_id, department_id, name, email, password_hash, role, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 'x', 'user', ?, ?)",
    )
    .bind(id)
    .bind(org_id)
    .bind(dept_id)
    .bind(email)
    .bind(email)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn seed_task(pool: &SqlitePool, org_id: Uuid, dept_id: Uuid, creator: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO tasks (id, org_id, department_id, created_by, title, status, variant, variant_payload, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'task', 'open', 'standard', '{\"kind\":\"standard\"}', ?, ?)",
    )
    .bind(id)
    .bind(org_id)
    .bind(dept_id)
    .bind(creator)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn seed_comment(pool: &SqlitePool, task: Uuid, org: Uuid, dept: Uuid, author: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO task_comments (id, task_id, org_id, department_id, created_by, body, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 'hi', ?, ?)",
    )
    .bind(id)
    .bind(task)
    .bind(org)
    .bind(dept)
    .bind(author)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn seed_notification(pool: &SqlitePool, org: Uuid, recipient: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO notifications (id, org_id, recipient_id, event_name, body, created_at) \
         VALUES (?, ?, ?, 'task.status_changed', 'x', ?)",
    )
    .bind(id)
    .bind(org)
    .bind(recipient)
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
async fn org_cascade_reaches_every_descendant() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let actor = Uuid::new_v4();

    // One org, 2 departments, 5 users spread over them, a task with a
    // comment, and a notification.
    let org = seed_org(&pool, "Acme").await?;
    let d1 = seed_department(&pool, org, "One").await?;
    let d2 = seed_department(&pool, org, "Two").await?;
    let mut users = Vec::new();
    for (i, dept) in [(0, d1), (1, d1), (2, d1), (3, d2), (4, d2)] {
        users.push(seed_user(&pool, org, dept, &format!("u{i}@example.com")).await?);
    }
    let task = seed_task(&pool, org, d1, users[0]).await?;
    let comment = seed_comment(&pool, task, org, d1, users[1]).await?;
    let notification = seed_notification(&pool, org, users[0]).await?;

    // A second org that must stay untouched.
    let other_org = seed_org(&pool, "Bystander").await?;
    let other_dept = seed_department(&pool, other_org, "One").await?;
    let other_user = seed_user(&pool, other_org, other_dept, "b@example.com").await?;

    let report = lifecycle::soft_delete(&pool, EntityKind::Organization, org, Some(actor)).await?;

    assert_eq!(report.count_for(EntityKind::Department), 2);
    assert_eq!(report.count_for(EntityKind::User), 5);
    assert_eq!(report.count_for(EntityKind::Task), 1);
    assert_eq!(report.count_for(EntityKind::TaskComment), 1);
    assert_eq!(report.count_for(EntityKind::Notification), 1);

    let parent = tombstone_of(&pool, EntityKind::Organization, org).await?;
    assert!(parent.is_deleted);
    let stamp = parent.deleted_at.expect("parent must carry a timestamp");

    // Every descendant is tombstoned with the parent's timestamp.
    for dept in [d1, d2] {
        let t = tombstone_of(&pool, EntityKind::Department, dept).await?;
        assert!(t.is_deleted);
        assert_eq!(t.deleted_at, Some(stamp));
        assert_eq!(t.deleted_by, Some(actor), "org->department propagates the actor");
    }
    for user in &users {
        let t = tombstone_of(&pool, EntityKind::User, *user).await?;
        assert!(t.is_deleted);
        assert_eq!(t.deleted_at, Some(stamp));
    }
    let t = tombstone_of(&pool, EntityKind::TaskComment, comment).await?;
    assert!(t.is_deleted, "cascade is transitive through tasks");

    // Notifications are a system projection: tombstoned, but without the
    // actor.
    let t = tombstone_of(&pool, EntityKind::Notification, notification).await?;
    assert!(t.is_deleted);
    assert!(t.deleted_by.is_none());

    // The other tenant is untouched.
    for (kind, id) in [
        (EntityKind::Organization, other_org),
        (EntityKind::Department, other_dept),
        (EntityKind::User, other_user),
    ] {
        let t = tombstone_of(&pool, kind, id).await?;
        assert!(!t.is_deleted);
    }

    Ok(())
}

#[tokio::test]
async fn task_cascade_covers_comments_and_attachments() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;
    let dept = seed_department(&pool, org, "One").await?;
    let user = seed_user(&pool, org, dept, "u@example.com").await?;
    let task = seed_task(&pool, org, dept, user).await?;
    let comment = seed_comment(&pool, task, org, dept, user).await?;

    let attachment = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO attachments (id, task_id, org_id, department_id, created_by, file_name, content_type, size_bytes, storage_key, created_at) \
         VALUES (?, ?, ?, ?, ?, 'a.pdf', 'application/pdf', 10, 'blobs/a', ?)",
    )
    .bind(attachment)
    .bind(task)
    .bind(org)
    .bind(dept)
    .bind(user)
    .bind(now)
    .execute(&pool)
    .await?;

    let report = lifecycle::soft_delete(&pool, EntityKind::Task, task, Some(user)).await?;
    assert_eq!(report.count_for(EntityKind::TaskComment), 1);
    assert_eq!(report.count_for(EntityKind::Attachment), 1);

    assert!(tombstone_of(&pool, EntityKind::TaskComment, comment).await?.is_deleted);
    assert!(tombstone_of(&pool, EntityKind::Attachment, attachment).await?.is_deleted);

    // The creator survives a task deletion.
    assert!(!tombstone_of(&pool, EntityKind::User, user).await?.is_deleted);

    Ok(())
}

#[tokio::test]
async fn cascade_skips_already_tombstoned_children() -> Result<()> {
    let (_dir, pool) = test_pool().await?;
    let org = seed_org(&pool, "Acme").await?;
    let dept = seed_department(&pool, org, "One").await?;
    let user = seed_user(&pool, org, dept, "u@example.com").await?;

    // Tombstone the user first, separately.
    lifecycle::soft_delete(&pool, EntityKind::User, user, None).await?;
    let before = tombstone_of(&pool, EntityKind::User, user).await?;

    lifecycle::soft_delete(&pool, EntityKind::Department, dept, Some(Uuid::new_v4())).await?;

    // The earlier tombstone keeps its original stamp: no double-stamping.
    let after = tombstone_of(&pool, EntityKind::User, user).await?;
    assert_eq!(before.deleted_at, after.deleted_at);
    assert_eq!(before.deleted_by, after.deleted_by);

    Ok(())
}
