use serde::Serialize;
use uuid::Uuid;

/// Trait for entities whose changes land on the event bus. The entity type
/// becomes the prefix of event names like "task.created".
pub trait Loggable: Serialize + Send + Sync {
    fn entity_type() -> &'static str;

    /// Usually the entity's primary key.
    fn subject_id(&self) -> Uuid;

    fn org_id(&self) -> Uuid;

    /// Set for task-scoped entities; drives the task-activity projection.
    fn task_id(&self) -> Option<Uuid> {
        None
    }
}
