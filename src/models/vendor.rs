use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Org-level resource: vendors carry no department reference, so scope
/// resolution lands on department granularity via the org rule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Vendor {
    pub id: Uuid,
    pub org_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl crate::events::Loggable for Vendor {
    fn entity_type() -> &'static str {
        "vendor"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn org_id(&self) -> Uuid {
        self.org_id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbVendor {
    pub id: Uuid,
    pub org_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbVendor> for Vendor {
    fn from(db: DbVendor) -> Self {
        Vendor {
            id: db.id,
            org_id: db.org_id,
            created_by: db.created_by,
            name: db.name,
            contact_email: db.contact_email,
            phone: db.phone,
            created_at: db.created_at,
            updated_at: db.updated_at,
            is_deleted: db.is_deleted,
            deleted_at: db.deleted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VendorCreateRequest {
    #[schema(example = "Northside Supply Co")]
    pub name: String,
    #[schema(example = "sales@northside.example.com")]
    pub contact_email: Option<String>,
    #[schema(example = "+1-555-0134")]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VendorUpdateRequest {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
}
