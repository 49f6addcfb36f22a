//! Tenant isolation: the org boundary is absolute for regular actors, and
//! platform management sits behind the explicit platform-admin gate.

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;
use uuid::Uuid;

use taskdesk::context::PLATFORM_ORG_ID;
use taskdesk::create_app;
use taskdesk::jwt::JwtConfig;
use taskdesk::utils::hash_password;

async fn test_app() -> Result<(tempfile::TempDir, SqlitePool, Router)> {
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

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((dir, pool, app))
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<Response> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    Ok(app.clone().oneshot(request).await?)
}

async fn json_of(resp: Response) -> Result<Value> {
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn register(app: &Router, org: &str, email: &str) -> Result<(String, Value)> {
    let resp = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "organization": org,
            "name": "Owner",
            "email": email,
            "password": "password123"
        })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let value = json_of(resp).await?;
    let token = value.get("token").and_then(|t| t.as_str()).context("token")?.to_string();
    Ok((token, value))
}

/// Seed a SuperAdmin inside the reserved platform org and mint a token for
/// them directly.
async fn seed_platform_admin(pool: &SqlitePool) -> Result<String> {
    let now = Utc::now();
    let dept_id = Uuid::new_v4();
    sqlx::query("INSERT INTO departments (id, org_id, name, created_at, updated_at) VALUES (?, ?, 'Operations', ?, ?)")
        .bind(dept_id)
        .bind(PLATFORM_ORG_ID)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    let user_id = Uuid::new_v4();
    let password_hash = hash_password("password123").map_err(|err| anyhow::anyhow!("{err}"))?;
    sqlx::query(
        "INSERT INTO users (id, org_id, department_id, name, email, password_hash, role, position, created_at, updated_at) \
         VALUES (?, ?, ?, 'Platform Op', 'op@platform.example.com', ?, 'super_admin', 'Operator', ?, ?)",
    )
    .bind(user_id)
    .bind(PLATFORM_ORG_ID)
    .bind(dept_id)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(JwtConfig::from_env()
        .map_err(|err| anyhow::anyhow!("{err}"))?
        .encode(user_id)
        .map_err(|err| anyhow::anyhow!("{err}"))?)
}

#[tokio::test]
async fn cross_tenant_access_is_denied_outright() -> Result<()> {
    let (_dir, _pool, app) = test_app().await?;

    let (token_a, _) = register(&app, "Acme", "a@example.com").await?;
    let (token_b, _) = register(&app, "Globex", "b@example.com").await?;

    // B creates a task in their own org.
    let resp = send(&app, "POST", "/tasks", Some(&token_b), Some(json!({"title": "B's task"}))).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let task = json_of(resp).await?;
    let task_id = task.get("id").and_then(|v| v.as_str()).context("task id")?;

    // A is a SuperAdmin, but the org boundary wins: denied, and the body
    // never explains which rule failed.
    let resp = send(&app, "GET", &format!("/tasks/{task_id}"), Some(&token_a), None).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err = json_of(resp).await?;
    assert_eq!(err.get("message").and_then(|m| m.as_str()), Some("insufficient permissions"));

    let resp = send(
        &app,
        "PUT",
        &format!("/tasks/{task_id}"),
        Some(&token_a),
        Some(json!({"title": "hijack"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn tenant_listing_requires_the_platform_gate() -> Result<()> {
    let (_dir, pool, app) = test_app().await?;

    let (customer_token, _) = register(&app, "Acme", "a@example.com").await?;
    register(&app, "Globex", "b@example.com").await?;

    // A customer SuperAdmin fails the gate regardless of role.
    let resp = send(&app, "GET", "/orgs", Some(&customer_token), None).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // A platform SuperAdmin passes it.
    let platform_token = seed_platform_admin(&pool).await?;
    let resp = send(&app, "GET", "/orgs", Some(&platform_token), None).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let orgs = json_of(resp).await?;
    let names: Vec<&str> = orgs
        .as_array()
        .context("array")?
        .iter()
        .filter_map(|o| o.get("name").and_then(|n| n.as_str()))
        .collect();
    assert!(names.contains(&"Acme"));
    assert!(names.contains(&"Globex"));
    // The sentinel org itself is never listed.
    assert!(!names.contains(&"platform"));

    Ok(())
}

#[tokio::test]
async fn platform_admin_acts_across_tenants() -> Result<()> {
    let (_dir, pool, app) = test_app().await?;

    let (token_b, registration) = register(&app, "Globex", "b@example.com").await?;
    let org_b = registration
        .pointer("/user/org_id")
        .and_then(|v| v.as_str())
        .context("org id")?
        .to_string();

    let resp = send(&app, "POST", "/tasks", Some(&token_b), Some(json!({"title": "B's task"}))).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let task_id = json_of(resp)
        .await?
        .get("id")
        .and_then(|v| v.as_str())
        .context("task id")?
        .to_string();

    let platform_token = seed_platform_admin(&pool).await?;

    // Cross-org read resolves to the crossOrg scope for platform actors.
    let resp = send(&app, "GET", &format!("/tasks/{task_id}"), Some(&platform_token), None).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Deactivating the whole tenant cascades...
    let resp = send(&app, "DELETE", &format!("/orgs/{org_b}"), Some(&platform_token), None).await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // ...and B's session now reads as a deactivated account.
    let resp = send(&app, "GET", "/auth/me", Some(&token_b), None).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err = json_of(resp).await?;
    assert_eq!(err.get("error").and_then(|e| e.as_str()), Some("account_deactivated"));

    Ok(())
}

#[tokio::test]
async fn platform_org_cannot_be_deleted() -> Result<()> {
    let (_dir, pool, app) = test_app().await?;
    let platform_token = seed_platform_admin(&pool).await?;

    let resp = send(
        &app,
        "DELETE",
        &format!("/orgs/{PLATFORM_ORG_ID}"),
        Some(&platform_token),
        None,
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}
