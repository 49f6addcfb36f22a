use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            other => Err(AppError::bad_request(format!("unknown task status: {other}"))),
        }
    }
}

/// The three task shapes as one tagged union. Variant payloads are validated
/// exhaustively at construction; there is no inheritance hierarchy and no
/// partially-valid variant row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskVariant {
    Standard,
    Procurement {
        material_id: Uuid,
        vendor_id: Uuid,
        quantity: i64,
    },
    Recurring {
        cadence_days: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        repeat_until: Option<DateTime<Utc>>,
    },
}

impl TaskVariant {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            TaskVariant::Standard => Ok(()),
            TaskVariant::Procurement { quantity, .. } => {
                if *quantity <= 0 {
                    return Err(AppError::bad_request("procurement quantity must be positive"));
                }
                Ok(())
            }
            TaskVariant::Recurring { cadence_days, .. } => {
                if *cadence_days <= 0 {
                    return Err(AppError::bad_request("cadence_days must be positive"));
                }
                Ok(())
            }
        }
    }

    /// Discriminator column value, kept alongside the payload for cheap
    /// filtering.
    pub fn discriminator(&self) -> &'static str {
        match self {
            TaskVariant::Standard => "standard",
            TaskVariant::Procurement { .. } => "procurement",
            TaskVariant::Recurring { .. } => "recurring",
        }
    }
}

impl Default for TaskVariant {
    fn default() -> Self {
        TaskVariant::Standard
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub variant: TaskVariant,
    #[schema(format = DateTime, example = "2025-10-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl crate::events::Loggable for Task {
    fn entity_type() -> &'static str {
        "task"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn org_id(&self) -> Uuid {
        self.org_id
    }
    fn task_id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub variant: String,
    pub variant_payload: String,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        let variant: TaskVariant = serde_json::from_str(&value.variant_payload)
            .map_err(|err| AppError::internal(format!("corrupt task variant payload: {err}")))?;
        if variant.discriminator() != value.variant {
            return Err(AppError::internal(format!(
                "task variant discriminator mismatch: {} vs {}",
                value.variant,
                variant.discriminator()
            )));
        }

        Ok(Task {
            id: value.id,
            org_id: value.org_id,
            department_id: value.department_id,
            created_by: value.created_by,
            title: value.title,
            description: value.description,
            status: value.status.parse()?,
            variant,
            due_date: value.due_date,
            created_at: value.created_at,
            updated_at: value.updated_at,
            is_deleted: value.is_deleted,
            deleted_at: value.deleted_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskCreateRequest {
    #[schema(example = "Replace HVAC filters")]
    pub title: String,
    pub description: Option<String>,
    /// Department the task belongs to; defaults to the caller's department.
    pub department_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub variant: TaskVariant,
    #[schema(format = DateTime, example = "2025-10-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub variant: Option<TaskVariant>,
    #[schema(format = DateTime, example = "2025-11-01T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_payload_round_trips_tagged() {
        let variant = TaskVariant::Procurement {
            material_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            quantity: 12,
        };
        let json = serde_json::to_string(&variant).unwrap();
        assert!(json.contains("\"kind\":\"procurement\""));
        let back: TaskVariant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, variant);
    }

    #[test]
    fn invalid_payloads_are_rejected_at_construction() {
        let zero_quantity = TaskVariant::Procurement {
            material_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(zero_quantity.validate().is_err());

        let bad_cadence = TaskVariant::Recurring {
            cadence_days: -7,
            repeat_until: None,
        };
        assert!(bad_cadence.validate().is_err());

        assert!(TaskVariant::Standard.validate().is_ok());
    }
}
