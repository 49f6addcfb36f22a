use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Attachment metadata only; the blob lives behind `storage_key` in an
/// external store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl crate::events::Loggable for Attachment {
    fn entity_type() -> &'static str {
        "attachment"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn org_id(&self) -> Uuid {
        self.org_id
    }
    fn task_id(&self) -> Option<Uuid> {
        Some(self.task_id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAttachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbAttachment> for Attachment {
    fn from(db: DbAttachment) -> Self {
        Attachment {
            id: db.id,
            task_id: db.task_id,
            org_id: db.org_id,
            department_id: db.department_id,
            created_by: db.created_by,
            file_name: db.file_name,
            content_type: db.content_type,
            size_bytes: db.size_bytes,
            storage_key: db.storage_key,
            created_at: db.created_at,
            is_deleted: db.is_deleted,
            deleted_at: db.deleted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachmentCreateRequest {
    #[schema(example = "invoice.pdf")]
    pub file_name: String,
    #[schema(example = "application/pdf")]
    pub content_type: String,
    #[schema(example = 48213)]
    pub size_bytes: i64,
    /// Opaque key in the external blob store.
    #[schema(example = "blobs/2025/10/invoice.pdf")]
    pub storage_key: String,
}
