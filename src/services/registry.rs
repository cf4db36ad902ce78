use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::models::CallSession;

pub type SharedSession = Arc<tokio::sync::Mutex<CallSession>>;

/// Process-wide map from call id to live session.
///
/// Sessions are created on the first event for a call id and removed on the
/// terminal event; anything the telephony provider forgot to close falls to
/// the idle sweep. A session's lock is held by the task processing its turn,
/// so the sweep skips locked sessions rather than cancelling in-flight work.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SharedSession>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl_minutes: i64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl: Duration::minutes(idle_ttl_minutes),
        }
    }

    /// Look up a session, creating a fresh one for unknown call ids.
    /// A webhook for an expired call is a normal occurrence, not an error.
    pub fn get_or_create(&self, call_id: &str, company_id: &str) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(call_id.to_string())
            .or_insert_with(|| {
                tracing::info!(call_id, company_id, "creating call session");
                Arc::new(tokio::sync::Mutex::new(CallSession::new(
                    call_id,
                    company_id,
                    Utc::now(),
                )))
            })
            .clone()
    }

    pub fn get(&self, call_id: &str) -> Option<SharedSession> {
        self.sessions.lock().unwrap().get(call_id).cloned()
    }

    pub fn remove(&self, call_id: &str) -> Option<SharedSession> {
        self.sessions.lock().unwrap().remove(call_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions idle past the TTL. Locked sessions have a turn or a
    /// ledger commit in flight and are left for the next sweep.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|call_id, session| match session.try_lock() {
            Ok(guard) => {
                let keep = now - guard.last_activity < self.idle_ttl;
                if !keep {
                    tracing::info!(call_id = %call_id, state = guard.state.as_str(), "evicting idle session");
                }
                keep
            }
            Err(_) => true,
        });
        before - sessions.len()
    }
}
