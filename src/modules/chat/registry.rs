use std::sync::Arc;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub opened_at: DateTime<Utc>,
}

/// Live chat sessions, shared by every connection.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session until the returned guard is dropped.
    pub fn register(&self) -> SessionGuard {
        let id = Uuid::new_v4();
        self.sessions.insert(id, SessionInfo { opened_at: Utc::now() });
        SessionGuard { id, sessions: self.sessions.clone() }
    }

    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// Age in seconds of the longest-lived open session.
    pub fn oldest_age_secs(&self) -> Option<i64> {
        let now = Utc::now();
        self.sessions
            .iter()
            .map(|s| (now - s.opened_at).num_seconds())
            .max()
    }
}

pub struct SessionGuard {
    id: Uuid,
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
}

impl SessionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
    }
}
