use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl crate::events::Loggable for TaskComment {
    fn entity_type() -> &'static str {
        "comment"
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
pub struct DbTaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbTaskComment> for TaskComment {
    fn from(db: DbTaskComment) -> Self {
        TaskComment {
            id: db.id,
            task_id: db.task_id,
            org_id: db.org_id,
            department_id: db.department_id,
            created_by: db.created_by,
            body: db.body,
            created_at: db.created_at,
            updated_at: db.updated_at,
            is_deleted: db.is_deleted,
            deleted_at: db.deleted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentCreateRequest {
    #[schema(example = "Filters ordered, ETA Friday.")]
    pub body: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentUpdateRequest {
    pub body: String,
}
