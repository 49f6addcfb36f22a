//! Advisory presence tracking.
//!
//! A process-local last-seen map, injected through `AppState` with an
//! explicit lifecycle (built at startup, cleared at shutdown). Rebuilt empty
//! on restart; nothing here is correctness-critical.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::utc_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    last_seen: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
    away_after: Duration,
    offline_after: Duration,
}

impl PresenceTracker {
    pub fn new(away_after: Duration, offline_after: Duration) -> Self {
        Self {
            last_seen: Arc::new(Mutex::new(HashMap::new())),
            away_after,
            offline_after,
        }
    }

    /// Defaults: away after 5 minutes idle, offline after 30.
    pub fn with_defaults() -> Self {
        Self::new(Duration::minutes(5), Duration::minutes(30))
    }

    pub fn touch(&self, actor_id: Uuid) {
        let mut map = self.last_seen.lock().expect("presence lock poisoned");
        map.insert(actor_id, utc_now());
    }

    pub fn status(&self, actor_id: Uuid) -> (PresenceStatus, Option<DateTime<Utc>>) {
        let map = self.last_seen.lock().expect("presence lock poisoned");
        let Some(&seen) = map.get(&actor_id) else {
            return (PresenceStatus::Offline, None);
        };

        let idle = utc_now() - seen;
        let status = if idle < self.away_after {
            PresenceStatus::Online
        } else if idle < self.offline_after {
            PresenceStatus::Away
        } else {
            PresenceStatus::Offline
        };
        (status, Some(seen))
    }

    pub fn clear(&self) {
        self.last_seen.lock().expect("presence lock poisoned").clear();
    }
}
