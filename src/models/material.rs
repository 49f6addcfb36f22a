use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Material {
    pub id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    #[schema(example = "box")]
    pub unit: String,
    pub stock_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl crate::events::Loggable for Material {
    fn entity_type() -> &'static str {
        "material"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn org_id(&self) -> Uuid {
        self.org_id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbMaterial {
    pub id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub unit: String,
    pub stock_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbMaterial> for Material {
    fn from(db: DbMaterial) -> Self {
        Material {
            id: db.id,
            org_id: db.org_id,
            department_id: db.department_id,
            created_by: db.created_by,
            name: db.name,
            unit: db.unit,
            stock_quantity: db.stock_quantity,
            created_at: db.created_at,
            updated_at: db.updated_at,
            is_deleted: db.is_deleted,
            deleted_at: db.deleted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MaterialCreateRequest {
    #[schema(example = "HVAC filter 20x20")]
    pub name: String,
    #[schema(example = "box")]
    pub unit: String,
    #[schema(example = 40)]
    pub stock_quantity: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MaterialUpdateRequest {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub stock_quantity: Option<i64>,
}
