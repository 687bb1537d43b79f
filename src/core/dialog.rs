use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const DEFAULT_DIALOG_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    AddAgent,
    RemoveAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Idle,
    Awaiting {
        action: PendingAction,
        expires_at: DateTime<Utc>,
    },
}

/// Per-session admin prompts: a command without an argument waits for the
/// next message, until it arrives, `/cancel` is sent, or the deadline passes.
pub struct AdminDialogs {
    ttl: chrono::Duration,
    sessions: Mutex<HashMap<i64, (PendingAction, DateTime<Utc>)>>,
}

impl Default for AdminDialogs {
    fn default() -> Self {
        Self::new(DEFAULT_DIALOG_TIMEOUT)
    }
}

impl AdminDialogs {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(10)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<i64, (PendingAction, DateTime<Utc>)>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starting a new prompt replaces whatever the session was waiting for.
    pub fn begin(&self, session_id: i64, action: PendingAction, now: DateTime<Utc>) -> DialogState {
        let expires_at = now + self.ttl;
        self.sessions().insert(session_id, (action, expires_at));
        tracing::debug!("Session {} awaiting input for {:?}", session_id, action);
        DialogState::Awaiting { action, expires_at }
    }

    pub fn state(&self, session_id: i64, now: DateTime<Utc>) -> DialogState {
        let mut sessions = self.sessions();
        match sessions.get(&session_id).copied() {
            Some((action, expires_at)) if now < expires_at => {
                DialogState::Awaiting { action, expires_at }
            }
            Some(_) => {
                sessions.remove(&session_id);
                DialogState::Idle
            }
            None => DialogState::Idle,
        }
    }

    /// Consumes the pending prompt; expired prompts yield `None`.
    pub fn take(&self, session_id: i64, now: DateTime<Utc>) -> Option<PendingAction> {
        match self.sessions().remove(&session_id) {
            Some((action, expires_at)) if now < expires_at => Some(action),
            Some((action, _)) => {
                tracing::debug!("Session {} prompt for {:?} expired", session_id, action);
                None
            }
            None => None,
        }
    }

    pub fn cancel(&self, session_id: i64) -> bool {
        self.sessions().remove(&session_id).is_some()
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| now < *expires_at);
        before - sessions.len()
    }
}
