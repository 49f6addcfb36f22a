use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::organizations::list_organizations,
        routes::organizations::create_organization,
        routes::organizations::get_organization,
        routes::organizations::update_organization,
        routes::organizations::delete_organization,
        routes::organizations::restore_organization,
        routes::departments::list_departments,
        routes::departments::create_department,
        routes::departments::get_department,
        routes::departments::update_department,
        routes::departments::delete_department,
        routes::departments::restore_department,
        routes::users::list_users,
        routes::users::create_user,
        routes::users::get_user,
        routes::users::update_user,
        routes::users::delete_user,
        routes::users::restore_user,
        routes::users::get_presence,
        routes::tasks::list_tasks,
        routes::tasks::create_task,
        routes::tasks::get_task,
        routes::tasks::update_task,
        routes::tasks::delete_task,
        routes::tasks::restore_task,
        routes::tasks::list_task_activities,
        routes::comments::list_comments,
        routes::comments::create_comment,
        routes::comments::update_comment,
        routes::comments::delete_comment,
        routes::comments::restore_comment,
        routes::attachments::list_attachments,
        routes::attachments::create_attachment,
        routes::attachments::get_attachment,
        routes::attachments::delete_attachment,
        routes::materials::list_materials,
        routes::materials::create_material,
        routes::materials::get_material,
        routes::materials::update_material,
        routes::materials::delete_material,
        routes::materials::restore_material,
        routes::vendors::list_vendors,
        routes::vendors::create_vendor,
        routes::vendors::get_vendor,
        routes::vendors::update_vendor,
        routes::vendors::delete_vendor,
        routes::vendors::restore_vendor,
        routes::notifications::list_notifications,
        routes::notifications::mark_read,
        routes::notifications::delete_notification,
        routes::admin::run_purge,
        routes::admin::hard_delete_entity,
        routes::health::health
    ),
    components(
        schemas(
            crate::authz::Role,
            crate::presence::PresenceStatus,
            models::user::User,
            models::user::AuthResponse,
            models::user::RegisterRequest,
            models::user::LoginRequest,
            models::user::UserCreateRequest,
            models::user::UserUpdateRequest,
            models::organization::Organization,
            models::organization::OrganizationCreateRequest,
            models::organization::OrganizationUpdateRequest,
            models::department::Department,
            models::department::DepartmentCreateRequest,
            models::department::DepartmentUpdateRequest,
            models::task::Task,
            models::task::TaskStatus,
            models::task::TaskVariant,
            models::task::TaskCreateRequest,
            models::task::TaskUpdateRequest,
            models::comment::TaskComment,
            models::comment::CommentCreateRequest,
            models::comment::CommentUpdateRequest,
            models::activity::TaskActivity,
            models::material::Material,
            models::material::MaterialCreateRequest,
            models::material::MaterialUpdateRequest,
            models::vendor::Vendor,
            models::vendor::VendorCreateRequest,
            models::vendor::VendorUpdateRequest,
            models::attachment::Attachment,
            models::attachment::AttachmentCreateRequest,
            models::notification::Notification,
            routes::users::PresenceResponse,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Authentication and tenant signup"),
        (name = "Organizations", description = "Tenant management (platform-gated)"),
        (name = "Departments", description = "Department management"),
        (name = "Users", description = "User management and presence"),
        (name = "Tasks", description = "Task management"),
        (name = "Comments", description = "Task comments"),
        (name = "Attachments", description = "Task attachment metadata"),
        (name = "Materials", description = "Material catalog"),
        (name = "Vendors", description = "Vendor directory"),
        (name = "Notifications", description = "In-app notifications"),
        (name = "Admin", description = "Platform administration"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

pub fn build_openapi() -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    // Session cookie is the primary scheme; bearer stays for API clients.
    let components = doc
        .pointer_mut("/components")
        .and_then(|c| c.as_object_mut())
        .ok_or_else(|| anyhow::anyhow!("OpenAPI document missing components"))?;
    components.insert(
        "securitySchemes".to_string(),
        serde_json::json!({
            "cookieAuth": {"type": "apiKey", "in": "cookie", "name": crate::jwt::AUTH_COOKIE},
            "bearerAuth": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}
        }),
    );

    if doc.get("security").is_none() {
        doc["security"] = serde_json::json!([{"cookieAuth": []}, {"bearerAuth": []}]);
    }

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}
