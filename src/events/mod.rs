//! Domain event bus.
//!
//! Handlers publish entity events; a background listener materializes two
//! projections: hash-chained task activity rows and in-app notification
//! rows. Publishing is fire-and-forget: a full or closed channel must never
//! fail the API call that produced the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::Loggable;

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// Recipient for the notification projection, when the event warrants
    /// one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify: Option<Uuid>,
    pub payload: Value,
}

/// Publish an entity event named `{entity_type}.{action}`.
pub fn log_entity_event<T: Loggable>(
    bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    notify: Option<Uuid>,
) {
    let event = DomainEvent {
        id: Uuid::new_v4(),
        name: format!("{}.{}", T::entity_type(), action),
        occurred_at: Utc::now(),
        actor_id,
        subject_id: Some(entity.subject_id()),
        org_id: Some(entity.org_id()),
        task_id: entity.task_id(),
        notify,
        payload: serde_json::to_value(entity).unwrap_or_default(),
    };

    let _ = bus.send(serde_json::to_value(&event).unwrap_or_default());
}

fn describe(name: &str) -> &'static str {
    match name {
        "task.created" => "Task created",
        "task.updated" => "Task updated",
        "task.status_changed" => "Task status changed",
        "task.deleted" => "Task deleted",
        "task.restored" => "Task restored",
        "comment.created" => "Comment added",
        "comment.updated" => "Comment edited",
        "comment.deleted" => "Comment deleted",
        "attachment.created" => "Attachment added",
        "attachment.deleted" => "Attachment deleted",
        "user.deleted" => "User deactivated",
        "user.restored" => "User restored",
        "department.deleted" => "Department deleted",
        "department.restored" => "Department restored",
        "organization.deleted" => "Organization deleted",
        "organization.restored" => "Organization restored",
        "material.deleted" => "Material deleted",
        "material.restored" => "Material restored",
        "vendor.deleted" => "Vendor deleted",
        "vendor.restored" => "Vendor restored",
        _ => "System event",
    }
}

/// Consume the bus and write the projections. Failures are logged, never
/// propagated: the originating request has already committed.
pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");

    loop {
        let raw = match rx.recv().await {
            Ok(raw) => raw,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let event: DomainEvent = match serde_json::from_value(raw) {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(error = %err, "malformed event on bus");
                continue;
            }
        };

        if let (Some(task_id), Some(org_id)) = (event.task_id, event.org_id) {
            if let Err(err) = record_task_activity(&pool, &event, task_id, org_id).await {
                tracing::error!(error = %err, event = %event.name, "failed to record task activity");
            }
        }

        if let Some(recipient) = event.notify {
            // Actors are not notified about their own actions.
            if event.actor_id != Some(recipient) {
                if let Err(err) = record_notification(&pool, &event, recipient).await {
                    tracing::error!(error = %err, event = %event.name, "failed to record notification");
                }
            }
        }
    }
}

async fn record_task_activity(
    pool: &SqlitePool,
    event: &DomainEvent,
    task_id: Uuid,
    org_id: Uuid,
) -> sqlx::Result<()> {
    let payload_str = serde_json::to_string(&event.payload).unwrap_or_default();

    // Hash chain over the whole activity stream.
    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM task_activities ORDER BY occurred_at DESC, id DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    let mut hasher = Sha256::new();
    if let Some(ref prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload_str.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        "INSERT INTO task_activities \
         (id, task_id, org_id, actor_id, event_name, description, properties, prev_hash, hash, occurred_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(task_id)
    .bind(org_id)
    .bind(event.actor_id)
    .bind(&event.name)
    .bind(describe(&event.name))
    .bind(&payload_str)
    .bind(&prev_hash)
    .bind(&hash)
    .bind(event.occurred_at)
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_notification(
    pool: &SqlitePool,
    event: &DomainEvent,
    recipient: Uuid,
) -> sqlx::Result<()> {
    let Some(org_id) = event.org_id else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO notifications (id, org_id, recipient_id, event_name, body, read_at, created_at) \
         VALUES (?, ?, ?, ?, ?, NULL, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(org_id)
    .bind(recipient)
    .bind(&event.name)
    .bind(describe(&event.name))
    .bind(event.occurred_at)
    .execute(pool)
    .await?;

    Ok(())
}
