use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl crate::events::Loggable for Organization {
    fn entity_type() -> &'static str {
        "organization"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn org_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbOrganization {
    pub id: Uuid,
    pub name: String,
    pub is_platform: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbOrganization> for Organization {
    fn from(db: DbOrganization) -> Self {
        Organization {
            id: db.id,
            name: db.name,
            created_at: db.created_at,
            updated_at: db.updated_at,
            is_deleted: db.is_deleted,
            deleted_at: db.deleted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationCreateRequest {
    #[schema(example = "Acme Facilities")]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationUpdateRequest {
    pub name: Option<String>,
}
