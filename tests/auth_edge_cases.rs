use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

use taskdesk::create_app;

async fn test_app() -> Result<(tempfile::TempDir, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_auth.db");
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
    let app = create_app(pool).await?;
    Ok((dir, app))
}

async fn post_json(app: &Router, uri: &str, body: Value) -> Result<Response> {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?;
    Ok(app.clone().oneshot(req).await?)
}

async fn json_of(resp: Response) -> Result<Value> {
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let (_dir, app) = test_app().await?;

    // 1. Register with short password
    let resp = post_json(
        &app,
        "/auth/register",
        json!({
            "organization": "Shorties",
            "name": "Short Pass",
            "email": "short@example.com",
            "password": "short"
        }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "short password must be rejected");

    // 2. Register a valid tenant
    let resp = post_json(
        &app,
        "/auth/register",
        json!({
            "organization": "Acme",
            "name": "Valid User",
            "email": "valid@example.com",
            "password": "password123"
        }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // The login response establishes the session cookie.
    let set_cookie = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .context("missing set-cookie")?
        .to_string();
    assert!(set_cookie.starts_with("td_token="));
    assert!(set_cookie.contains("HttpOnly"));

    // 3. Duplicate organization name
    let resp = post_json(
        &app,
        "/auth/register",
        json!({
            "organization": "Acme",
            "name": "Copycat",
            "email": "copy@example.com",
            "password": "password123"
        }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // 4. Login with wrong password
    let resp = post_json(
        &app,
        "/auth/login",
        json!({"email": "valid@example.com", "password": "wrongpassword"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 5. Login with non-existent email
    let resp = post_json(
        &app,
        "/auth/login",
        json!({"email": "nobody@example.com", "password": "password123"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 6. Protected route without a token
    let req = Request::builder().method("GET").uri("/tasks").body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 7. The session cookie alone authenticates
    let cookie = set_cookie.split(';').next().context("cookie pair")?;
    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("cookie", cookie)
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let me = json_of(resp).await?;
    assert_eq!(me.get("email").and_then(|e| e.as_str()), Some("valid@example.com"));

    Ok(())
}

#[tokio::test]
async fn deactivated_accounts_lose_their_sessions() -> Result<()> {
    let (_dir, app) = test_app().await?;

    let resp = post_json(
        &app,
        "/auth/register",
        json!({
            "organization": "Acme",
            "name": "Ada",
            "email": "ada@example.com",
            "password": "password123"
        }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let auth = json_of(resp).await?;
    let admin_token = auth.get("token").and_then(|t| t.as_str()).context("token")?.to_string();
    let dept_id = auth
        .pointer("/user/department_id")
        .and_then(|v| v.as_str())
        .context("dept")?
        .to_string();

    // Create a second user and capture a working session for them.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {admin_token}"))
                .body(Body::from(
                    json!({
                        "department_id": dept_id,
                        "name": "Uma",
                        "email": "uma@example.com",
                        "password": "password123",
                        "role": "user"
                    })
                    .to_string(),
                ))?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let user_id = json_of(resp).await?.get("id").and_then(|v| v.as_str()).context("id")?.to_string();

    let resp = post_json(
        &app,
        "/auth/login",
        json!({"email": "uma@example.com", "password": "password123"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let user_token = json_of(resp).await?.get("token").and_then(|t| t.as_str()).context("token")?.to_string();

    // Soft delete the user; their still-valid JWT no longer buys anything.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/users/{user_id}"))
                .header("authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .header("authorization", format!("Bearer {user_token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err = json_of(resp).await?;
    assert_eq!(err.get("error").and_then(|e| e.as_str()), Some("account_deactivated"));

    // Logins are refused too, with the same taxonomy.
    let resp = post_json(
        &app,
        "/auth/login",
        json!({"email": "uma@example.com", "password": "password123"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
