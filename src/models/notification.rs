use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// In-app notification row materialized by the event listener. Delivery
/// beyond this table (email, push) is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub org_id: Uuid,
    pub recipient_id: Uuid,
    pub event_name: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbNotification {
    pub id: Uuid,
    pub org_id: Uuid,
    pub recipient_id: Uuid,
    pub event_name: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbNotification> for Notification {
    fn from(db: DbNotification) -> Self {
        Notification {
            id: db.id,
            org_id: db.org_id,
            recipient_id: db.recipient_id,
            event_name: db.event_name,
            body: db.body,
            read_at: db.read_at,
            created_at: db.created_at,
            is_deleted: db.is_deleted,
            deleted_at: db.deleted_at,
        }
    }
}
