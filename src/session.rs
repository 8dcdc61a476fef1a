use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::template::{ParameterSet, TemplateKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    CollectingInfo,
    ReadyToGenerate,
    TemplateGenerated,
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::CollectingInfo => "COLLECTING_INFO",
            Status::ReadyToGenerate => "READY_TO_GENERATE",
            Status::TemplateGenerated => "TEMPLATE_GENERATED",
            Status::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// One entry of the status audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub from: Status,
    pub to: Status,
    pub reason: &'static str,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub template: TemplateKind,
    pub history: Vec<Turn>,
    pub parameters: ParameterSet,
    status: Status,
    template_url: Option<String>,
    pub last_error: Option<String>,
    pub transitions: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, template: TemplateKind) -> Self {
        Self {
            id,
            template,
            history: Vec::new(),
            parameters: ParameterSet::default(),
            status: Status::CollectingInfo,
            template_url: None,
            last_error: None,
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn template_url(&self) -> Option<&str> {
        self.template_url.as_deref()
    }

    pub fn push_turn(&mut self, role: Role, text: impl Into<String>) {
        self.history.push(Turn { role, text: text.into(), at: Utc::now() });
    }

    /// Time of the latest turn, or creation time for a session with no turns yet.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.history.last().map_or(self.created_at, |t| t.at)
    }

    /// Moves to `to`, recording the change. The template URL only survives in TEMPLATE_GENERATED.
    pub fn transition(&mut self, to: Status, reason: &'static str) {
        if to != Status::TemplateGenerated {
            self.template_url = None;
        }
        if to != Status::Failed {
            self.last_error = None;
        }
        if self.status == to {
            return;
        }
        tracing::info!(session = %self.id, from = %self.status, to = %to, reason, "🔀 Status change");
        self.transitions.push(StatusChange { from: self.status, to, reason, at: Utc::now() });
        self.status = to;
    }

    pub fn mark_generated(&mut self, url: String) {
        self.transition(Status::TemplateGenerated, "render succeeded");
        self.template_url = Some(url);
    }

    pub fn mark_failed(&mut self, reason: String) {
        self.transition(Status::Failed, "render failed");
        self.last_error = Some(reason);
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Process-lifetime session map. Each session sits behind its own async mutex so
/// a turn can hold it across the extractor and renderer awaits.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    /// Returns the session for `id`, creating it when `id` is absent or unknown.
    /// The bool is true when a new session was created.
    pub fn get_or_create(&self, id: Option<String>, template: TemplateKind) -> (SessionHandle, bool) {
        if let Some(existing) = id.as_deref().and_then(|id| self.get(id)) {
            return (existing, false);
        }
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut guard = self.sessions.write();
        // another request may have created it between the read and the write lock
        if let Some(existing) = guard.get(&id) {
            return (existing.clone(), false);
        }
        let handle = Arc::new(Mutex::new(Session::new(id.clone(), template)));
        guard.insert(id, handle.clone());
        (handle, true)
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn creates_then_reuses_sessions() {
        let store = SessionStore::default();
        let (first, created) = store.get_or_create(None, TemplateKind::default());
        assert!(created);
        let id = first.lock().await.id.clone();

        let (again, created) = store.get_or_create(Some(id.clone()), TemplateKind::default());
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn adopts_unknown_session_id() {
        let store = SessionStore::default();
        let (handle, created) = store.get_or_create(Some("abc".into()), TemplateKind::BestHome);
        assert!(created);
        let session = handle.lock().await;
        assert_eq!(session.id, "abc");
        assert_eq!(session.template, TemplateKind::BestHome);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = SessionStore::default();
        store.get_or_create(Some("abc".into()), TemplateKind::default());
        assert!(store.remove("abc"));
        assert!(!store.remove("abc"));
        assert!(store.get("abc").is_none());
    }

    #[test]
    fn transitions_are_recorded_and_url_is_scoped_to_generated() {
        let mut session = Session::new("s".into(), TemplateKind::default());
        session.transition(Status::ReadyToGenerate, "complete");
        session.mark_generated("https://example.com/p.jpg".into());
        assert_eq!(session.template_url(), Some("https://example.com/p.jpg"));

        session.transition(Status::ReadyToGenerate, "parameters changed");
        assert_eq!(session.template_url(), None);

        let path: Vec<_> = session.transitions.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![
                (Status::CollectingInfo, Status::ReadyToGenerate),
                (Status::ReadyToGenerate, Status::TemplateGenerated),
                (Status::TemplateGenerated, Status::ReadyToGenerate),
            ]
        );
    }

    #[test]
    fn updated_at_follows_the_latest_turn() {
        let mut session = Session::new("s".into(), TemplateKind::default());
        assert_eq!(session.updated_at(), session.created_at);
        session.push_turn(Role::User, "hello");
        assert_eq!(session.updated_at(), session.history[0].at);
        assert!(session.updated_at() >= session.created_at);
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&Status::ReadyToGenerate).unwrap(), "\"READY_TO_GENERATE\"");
    }
}
