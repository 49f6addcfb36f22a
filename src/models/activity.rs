use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Append-only task history row, written by the event listener rather than
/// any handler. Rows form a hash chain: `hash = SHA256(prev_hash || payload)`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskActivity {
    pub id: Uuid,
    pub task_id: Uuid,
    pub org_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub event_name: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub properties: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTaskActivity {
    pub id: Uuid,
    pub task_id: Uuid,
    pub org_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub event_name: String,
    pub description: String,
    pub properties: Option<String>,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub occurred_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbTaskActivity> for TaskActivity {
    fn from(db: DbTaskActivity) -> Self {
        TaskActivity {
            id: db.id,
            task_id: db.task_id,
            org_id: db.org_id,
            actor_id: db.actor_id,
            event_name: db.event_name,
            description: db.description,
            properties: db
                .properties
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            occurred_at: db.occurred_at,
            is_deleted: db.is_deleted,
            deleted_at: db.deleted_at,
        }
    }
}
