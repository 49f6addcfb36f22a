use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Action, Role};
use crate::context::TenantContext;
use crate::errors::{AppError, AppResult};
use crate::events::log_entity_event;
use crate::lifecycle::{self, EntityKind, Visibility};
use crate::models::activity::{DbTaskActivity, TaskActivity};
use crate::models::task::{DbTask, Task, TaskCreateRequest, TaskUpdateRequest, TaskVariant};
use crate::routes::ListQuery;
use crate::scope::TargetRef;
use crate::utils::utc_now;

const TASK_COLUMNS: &str = "id, org_id, department_id, created_by, title, description, status, \
                            variant, variant_payload, due_date, created_at, updated_at, \
                            is_deleted, deleted_at, deleted_by";

fn target(task: &DbTask) -> TargetRef {
    TargetRef::resource(task.created_by, task.org_id, task.department_id)
}

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    responses((status = 200, description = "List tasks", body = [Task]))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<Task>>> {
    authz::require(&ctx, Action::Read, EntityKind::Task, None)?;
    let vis = query.visibility(&ctx)?;

    let rows: Vec<DbTask> = if ctx.role == Role::User {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE org_id = ? AND department_id = ?{} \
             ORDER BY due_date ASC, created_at DESC",
            vis.tombstone_filter()
        );
        sqlx::query_as(&sql)
            .bind(ctx.org_id)
            .bind(ctx.department_id)
            .fetch_all(&state.pool)
            .await?
    } else {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE org_id = ?{} ORDER BY due_date ASC, created_at DESC",
            vis.tombstone_filter()
        );
        sqlx::query_as(&sql).bind(ctx.org_id).fetch_all(&state.pool).await?
    };

    let tasks: Vec<Task> = rows.into_iter().map(Task::try_from).collect::<Result<_, _>>()?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 422, description = "Variant references a missing material or vendor")
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    authz::require(&ctx, Action::Create, EntityKind::Task, None)?;

    let department_id = payload.department_id.unwrap_or(ctx.department_id);
    if department_id != ctx.department_id && !ctx.is_hod {
        return Err(AppError::Forbidden);
    }
    ensure_department_in_org(&state.pool, ctx.org_id, department_id).await?;

    payload.variant.validate()?;
    ensure_variant_references(&state.pool, ctx.org_id, &payload.variant).await?;

    let id = Uuid::new_v4();
    let now = utc_now();
    let status = payload.status.unwrap_or(crate::models::task::TaskStatus::Open);
    let variant_payload = serde_json::to_string(&payload.variant)
        .map_err(|err| AppError::internal(format!("failed to encode variant: {err}")))?;

    sqlx::query(
        "INSERT INTO tasks (id, org_id, department_id, created_by, title, description, status, \
                            variant, variant_payload, due_date, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(ctx.org_id)
    .bind(department_id)
    .bind(ctx.actor_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(status.as_str())
    .bind(payload.variant.discriminator())
    .bind(&variant_payload)
    .bind(payload.due_date)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let task: Task = fetch_task(&state.pool, id, Visibility::Active).await?.try_into()?;
    log_entity_event(&state.events, "created", Some(ctx.actor_id), &task, None);

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "Task detail", body = Task))
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Task>> {
    let db_task = fetch_task(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Read, EntityKind::Task, Some(&target(&db_task)))?;

    Ok(Json(db_task.try_into()?))
}

#[utoipa::path(
    put,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = TaskUpdateRequest,
    responses((status = 200, description = "Task updated", body = Task))
)]
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let db_task = fetch_task(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Update, EntityKind::Task, Some(&target(&db_task)))?;

    let current: Task = db_task.try_into()?;

    let variant = match payload.variant {
        Some(variant) => {
            variant.validate()?;
            // References live in the task's org, which for platform actors
            // need not be the caller's own.
            ensure_variant_references(&state.pool, current.org_id, &variant).await?;
            variant
        }
        None => current.variant.clone(),
    };
    let variant_payload = serde_json::to_string(&variant)
        .map_err(|err| AppError::internal(format!("failed to encode variant: {err}")))?;

    let title = payload.title.unwrap_or_else(|| current.title.clone());
    let description = payload.description.or_else(|| current.description.clone());
    let status = payload.status.unwrap_or(current.status);
    let due_date = payload.due_date.or(current.due_date);

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, status = ?, variant = ?, variant_payload = ?, \
                          due_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&title)
    .bind(&description)
    .bind(status.as_str())
    .bind(variant.discriminator())
    .bind(&variant_payload)
    .bind(due_date)
    .bind(utc_now())
    .bind(id)
    .execute(&state.pool)
    .await?;

    let task: Task = fetch_task(&state.pool, id, Visibility::Active).await?.try_into()?;

    // A status transition is its own event and notifies the task's creator.
    if status != current.status {
        log_entity_event(
            &state.events,
            "status_changed",
            Some(ctx.actor_id),
            &task,
            Some(task.created_by),
        );
    } else {
        log_entity_event(&state.events, "updated", Some(ctx.actor_id), &task, None);
    }

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses((status = 204, description = "Task soft deleted; comments, activities and attachments cascade"))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<StatusCode> {
    let db_task = fetch_task(&state.pool, id, Visibility::Active).await?;
    authz::require(&ctx, Action::Delete, EntityKind::Task, Some(&target(&db_task)))?;

    lifecycle::soft_delete(&state.pool, EntityKind::Task, id, Some(ctx.actor_id)).await?;

    let task: Task = db_task.try_into()?;
    log_entity_event(
        &state.events,
        "deleted",
        Some(ctx.actor_id),
        &task,
        Some(task.created_by),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/restore",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task restored", body = Task),
        (status = 409, description = "Task is not deleted")
    )
)]
pub async fn restore_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Task>> {
    let db_task = fetch_task(&state.pool, id, Visibility::All).await?;
    authz::require(&ctx, Action::Restore, EntityKind::Task, Some(&target(&db_task)))?;

    lifecycle::restore(&state.pool, EntityKind::Task, id).await?;

    let task: Task = fetch_task(&state.pool, id, Visibility::Active).await?.try_into()?;
    log_entity_event(&state.events, "restored", Some(ctx.actor_id), &task, None);

    Ok(Json(task))
}

#[utoipa::path(
    get,
    path = "/tasks/{task_id}/activities",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "Task activity history", body = [TaskActivity]))
)]
pub async fn list_task_activities(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    ctx: TenantContext,
) -> AppResult<Json<Vec<TaskActivity>>> {
    let db_task = fetch_task(&state.pool, task_id, Visibility::Active).await?;
    authz::require(&ctx, Action::Read, EntityKind::TaskActivity, Some(&target(&db_task)))?;

    let rows: Vec<DbTaskActivity> = sqlx::query_as(
        "SELECT id, task_id, org_id, actor_id, event_name, description, properties, prev_hash, hash, \
                occurred_at, is_deleted, deleted_at, deleted_by \
         FROM task_activities WHERE task_id = ? AND is_deleted = 0 ORDER BY occurred_at DESC",
    )
    .bind(task_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(TaskActivity::from).collect()))
}

pub(super) async fn ensure_department_in_org(
    pool: &SqlitePool,
    org_id: Uuid,
    department_id: Uuid,
) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM departments WHERE id = ? AND org_id = ? AND is_deleted = 0",
    )
    .bind(department_id)
    .bind(org_id)
    .fetch_one(pool)
    .await?;

    if count == 0 {
        return Err(AppError::referential_integrity(
            "department does not belong to the organization",
        ));
    }
    Ok(())
}

/// Procurement tasks must point at live material/vendor rows in the same
/// organization.
async fn ensure_variant_references(
    pool: &SqlitePool,
    org_id: Uuid,
    variant: &TaskVariant,
) -> AppResult<()> {
    let TaskVariant::Procurement {
        material_id,
        vendor_id,
        ..
    } = variant
    else {
        return Ok(());
    };

    let material: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM materials WHERE id = ? AND org_id = ? AND is_deleted = 0",
    )
    .bind(material_id)
    .bind(org_id)
    .fetch_one(pool)
    .await?;
    if material == 0 {
        return Err(AppError::referential_integrity("unknown material for procurement task"));
    }

    let vendor: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM vendors WHERE id = ? AND org_id = ? AND is_deleted = 0",
    )
    .bind(vendor_id)
    .bind(org_id)
    .fetch_one(pool)
    .await?;
    if vendor == 0 {
        return Err(AppError::referential_integrity("unknown vendor for procurement task"));
    }

    Ok(())
}

pub(super) async fn fetch_task(pool: &SqlitePool, id: Uuid, vis: Visibility) -> AppResult<DbTask> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?{}",
        vis.tombstone_filter()
    );
    sqlx::query_as::<_, DbTask>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))
}
