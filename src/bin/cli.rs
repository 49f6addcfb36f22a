//! taskdesk admin CLI: migrations, the one-shot retention sweep, and
//! platform-admin bootstrap.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use taskdesk::context::PLATFORM_ORG_ID;
use taskdesk::lifecycle;
use taskdesk::utils::{hash_password, utc_now};

#[derive(Parser, Debug)]
#[command(author, version, about = "taskdesk admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Run the retention purge sweep once and print what was removed
    Purge,
    /// Create (or reset) a platform SuperAdmin account
    CreatePlatformAdmin {
        email: String,
        password: String,
        #[arg(long, default_value = "Platform Admin")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::Purge => {
            let pool = get_pool().await?;
            let report = lifecycle::purge_expired(&pool, utc_now())
                .await
                .map_err(|err| anyhow::anyhow!("purge failed: {err}"))?;
            if report.removed.is_empty() {
                println!("Nothing to purge");
            } else {
                for (kind, count) in &report.removed {
                    println!("{kind}: {count} removed");
                }
                println!("Total: {} removed", report.total());
            }
        }
        Commands::CreatePlatformAdmin { email, password, name } => {
            let pool = get_pool().await?;
            create_platform_admin(&pool, &email, &password, &name).await?;
            println!("Platform admin ready: {email}");
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    Ok(sqlx::migrate::Migrator::new(dir).await?)
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    fs::create_dir_all(&dir)?;

    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let path = dir.join(format!("{stamp}_{slug}.sql"));
    fs::write(&path, "-- Add migration script here\n")?;
    Ok(path)
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .unwrap_or_default();

    for migration in migrator.iter() {
        let state = if applied.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        println!("{:>14}  {}  {}", migration.version, state, migration.description);
    }
    Ok(())
}

async fn create_platform_admin(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    name: &str,
) -> anyhow::Result<()> {
    let password_hash = hash_password(password).map_err(|err| anyhow::anyhow!("{err}"))?;
    let now = utc_now();

    // The platform org is seeded by migration; the operations department is
    // created on first use.
    let dept_id: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM departments WHERE org_id = ? AND name = 'Operations' AND is_deleted = 0",
    )
    .bind(PLATFORM_ORG_ID)
    .fetch_optional(pool)
    .await?;

    let dept_id = match dept_id {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO departments (id, org_id, name, created_at, updated_at) \
                 VALUES (?, ?, 'Operations', ?, ?)",
            )
            .bind(id)
            .bind(PLATFORM_ORG_ID)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
            id
        }
    };

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM users WHERE org_id = ? AND email = ? AND is_deleted = 0")
            .bind(PLATFORM_ORG_ID)
            .bind(email)
            .fetch_optional(pool)
            .await?;

    match existing {
        Some(id) => {
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(&password_hash)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO users (id, org_id, department_id, name, email, password_hash, role, position, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, 'super_admin', ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(PLATFORM_ORG_ID)
            .bind(dept_id)
            .bind(name)
            .bind(email)
            .bind(&password_hash)
            .bind(format!("Platform Operator {email}"))
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
