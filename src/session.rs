//! In-process conversation sessions
//!
//! One session per conversation id, holding the bounded chat history plus
//! the heuristic state. Sessions live behind a per-conversation mutex so
//! concurrent requests for the same conversation serialize; requests for
//! different conversations proceed in parallel. Idle sessions are evicted
//! after a TTL.

use crate::context::{ConversationState, TopicList};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

/// History cap per conversation, counting both roles
pub const MAX_HISTORY_LEN: usize = 30;

/// Default idle lifetime before a session is swept
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

// =================
// Chat history
// =================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One turn in a conversation. When an utterance was rewritten for
/// context, `original_input` keeps what the user actually typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_input: Option<String>,
}

impl ChatEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            original_input: None,
        }
    }

    pub fn user_rewritten(text: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            original_input: Some(original.into()),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
            original_input: None,
        }
    }
}

// =================
// Session
// =================

#[derive(Debug)]
pub struct Session {
    pub history: Vec<ChatEntry>,
    pub topics: TopicList,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            history: Vec::new(),
            topics: TopicList::new(),
            state: ConversationState::default(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Last model turn, for short-response context.
    pub fn last_model_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|e| e.role == ChatRole::Model)
            .map(|e| e.text.as_str())
    }

    /// Last user turn before the one currently being staged.
    pub fn last_user_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|e| e.role == ChatRole::User)
            .map(|e| e.text.as_str())
    }

    /// Drop the middle of an over-long history. The first entry stays so
    /// the opening context survives; the most recent turns stay too.
    pub fn trim_history(&mut self) {
        if self.history.len() <= MAX_HISTORY_LEN {
            return;
        }
        let excess = self.history.len() - MAX_HISTORY_LEN;
        self.history.drain(1..1 + excess);
    }
}

// =================
// Session store
// =================

/// Shared map of live sessions keyed by conversation id.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_SESSION_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Handle for a conversation, creating the session on first sight.
    /// Callers lock the returned mutex for the duration of their turn.
    pub async fn get_or_create(&self, conversation_id: Uuid) -> Arc<Mutex<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&conversation_id) {
                return Arc::clone(session);
            }
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(conversation_id)
                .or_insert_with(|| Arc::new(Mutex::new(Session::new()))),
        )
    }

    /// Evict sessions idle past the TTL. Sessions currently locked by a
    /// turn in flight are skipped and caught by a later sweep. The idle
    /// check is repeated under the write lock: a turn can pick the session
    /// up between the scan and the removal.
    pub async fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut expired = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if let Ok(guard) = session.try_lock() {
                    if guard.last_active < cutoff {
                        expired.push(*id);
                    }
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in expired {
            if remove_if_still_idle(&mut sessions, id, cutoff) {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Swept {} expired conversation session(s)", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Background task that sweeps on an interval until the store drops.
    pub fn spawn_sweeper(&self, every: std::time::Duration) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        });
    }
}

/// Removal half of the sweep. The session must still be unlocked and
/// still idle at removal time, otherwise an in-flight turn would commit
/// into a dropped session.
fn remove_if_still_idle(
    sessions: &mut HashMap<Uuid, Arc<Mutex<Session>>>,
    id: Uuid,
    cutoff: DateTime<Utc>,
) -> bool {
    let still_idle = match sessions.get(&id) {
        Some(session) => match session.try_lock() {
            Ok(guard) => guard.last_active < cutoff,
            Err(_) => false,
        },
        None => false,
    };
    still_idle && sessions.remove(&id).is_some()
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
