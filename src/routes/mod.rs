pub mod admin;
pub mod attachments;
pub mod auth;
pub mod comments;
pub mod departments;
pub mod health;
pub mod materials;
pub mod notifications;
pub mod organizations;
pub mod tasks;
pub mod users;
pub mod vendors;

use serde::{Deserialize, Serialize};

use crate::context::TenantContext;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::Visibility;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Common list-endpoint query. Tombstoned rows are excluded unless the
/// caller asks for them explicitly, and only HOD roles may ask.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub include_deleted: Option<bool>,
}

impl ListQuery {
    pub fn visibility(&self, ctx: &TenantContext) -> AppResult<Visibility> {
        let include_deleted = self.include_deleted.unwrap_or(false);
        if include_deleted && !ctx.is_hod {
            return Err(AppError::Forbidden);
        }
        Ok(Visibility::from_flag(include_deleted))
    }
}
