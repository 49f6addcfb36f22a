use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::jwt::JwtConfig;
use crate::presence::PresenceTracker;
use crate::routes::{
    admin, attachments, auth, comments, departments, health, materials, notifications,
    organizations, tasks, users, vendors,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub events: EventBus,
    pub presence: PresenceTracker,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, events: EventBus, presence: PresenceTracker) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            events,
            presence,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    let (event_bus, event_rx) = events::init_event_bus();
    tokio::spawn(events::start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus, PresenceTracker::with_defaults());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let org_routes = Router::new()
        .route("/", get(organizations::list_organizations).post(organizations::create_organization))
        .route(
            "/:id",
            get(organizations::get_organization)
                .put(organizations::update_organization)
                .delete(organizations::delete_organization),
        )
        .route("/:id/restore", post(organizations::restore_organization));

    let department_routes = Router::new()
        .route("/", get(departments::list_departments).post(departments::create_department))
        .route(
            "/:id",
            get(departments::get_department)
                .put(departments::update_department)
                .delete(departments::delete_department),
        )
        .route("/:id/restore", post(departments::restore_department));

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route(
            "/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/:id/restore", post(users::restore_user))
        .route("/:id/presence", get(users::get_presence));

    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/:task_id",
            get(tasks::get_task).put(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/:task_id/restore", post(tasks::restore_task))
        .route("/:task_id/activities", get(tasks::list_task_activities));

    // Comments and attachments hang off their task.
    let comment_routes = Router::new()
        .route("/", get(comments::list_comments).post(comments::create_comment))
        .route("/:id", put(comments::update_comment).delete(comments::delete_comment))
        .route("/:id/restore", post(comments::restore_comment));

    let attachment_routes = Router::new()
        .route("/", get(attachments::list_attachments).post(attachments::create_attachment))
        .route(
            "/:id",
            get(attachments::get_attachment).delete(attachments::delete_attachment),
        );

    let material_routes = Router::new()
        .route("/", get(materials::list_materials).post(materials::create_material))
        .route(
            "/:id",
            get(materials::get_material)
                .put(materials::update_material)
                .delete(materials::delete_material),
        )
        .route("/:id/restore", post(materials::restore_material));

    let vendor_routes = Router::new()
        .route("/", get(vendors::list_vendors).post(vendors::create_vendor))
        .route(
            "/:id",
            get(vendors::get_vendor).put(vendors::update_vendor).delete(vendors::delete_vendor),
        )
        .route("/:id/restore", post(vendors::restore_vendor));

    let notification_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/:id", delete(notifications::delete_notification))
        .route("/:id/read", post(notifications::mark_read));

    let admin_routes = Router::new()
        .route("/purge", post(admin::run_purge))
        .route("/:kind/:id", delete(admin::hard_delete_entity));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/orgs", org_routes)
        .nest("/departments", department_routes)
        .nest("/users", user_routes)
        .nest("/tasks", task_routes)
        .nest("/tasks/:task_id/comments", comment_routes)
        .nest("/tasks/:task_id/attachments", attachment_routes)
        .nest("/materials", material_routes)
        .nest("/vendors", vendor_routes)
        .nest("/notifications", notification_routes)
        .nest("/admin", admin_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
