//! Per-conversation state, keyed by session.
//!
//! Each session owns a bounded ring of recent conversation states and the
//! previous state the manager saw for it. Sessions never share history.
//! The registry is bounded; touching a session marks it recently used and
//! the least recently used one is evicted when a new session would exceed
//! capacity.

use chrono::Utc;
use hebb_core::types::{ConversationState, SessionId, Timestamp};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

/// Recent state history and previous state of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    history: VecDeque<ConversationState>,
    previous: Option<ConversationState>,
    pub created_at: Timestamp,
    pub last_touched: Timestamp,
    #[serde(skip)]
    touch: u64,
}

impl SessionState {
    fn new(at: Timestamp) -> Self {
        Self {
            history: VecDeque::new(),
            previous: None,
            created_at: at,
            last_touched: at,
            touch: 0,
        }
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<ConversationState> {
        self.history.iter().copied().collect()
    }

    pub fn last(&self) -> Option<ConversationState> {
        self.history.back().copied()
    }

    pub fn previous(&self) -> Option<ConversationState> {
        self.previous
    }

    pub fn set_previous(&mut self, state: Option<ConversationState>) {
        self.previous = state;
    }

    /// Append a state, evicting the oldest beyond `capacity`.
    pub fn push(&mut self, state: ConversationState, capacity: usize) {
        self.history.push_back(state);
        while self.history.len() > capacity.max(1) {
            self.history.pop_front();
        }
    }
}

/// Bounded registry of live sessions with least-recently-used eviction.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
    capacity: AtomicUsize,
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: AtomicUsize::new(capacity.max(1)),
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn evict_down_to(&self, sessions: &mut HashMap<SessionId, SessionState>, limit: usize) {
        while sessions.len() > limit {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, s)| s.touch)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(session = %oldest, "evicted least recently used session");
        }
    }

    /// Run `f` against the session, creating it if needed, and mark it used.
    pub fn with_session_at<R>(
        &self,
        id: &SessionId,
        at: Timestamp,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> R {
        let mut sessions = self.sessions.lock();
        if !sessions.contains_key(id) {
            let capacity = self.capacity.load(Ordering::Relaxed);
            self.evict_down_to(&mut sessions, capacity.saturating_sub(1));
        }
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| SessionState::new(at));
        session.touch = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        session.last_touched = at;
        f(session)
    }

    pub fn with_session<R>(&self, id: &SessionId, f: impl FnOnce(&mut SessionState) -> R) -> R {
        self.with_session_at(id, Utc::now(), f)
    }

    /// A copy of the session without marking it used.
    pub fn get(&self, id: &SessionId) -> Option<SessionState> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<SessionState> {
        self.sessions.lock().remove(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Change capacity, evicting immediately if the registry is over it.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity.store(capacity, Ordering::Relaxed);
        let mut sessions = self.sessions.lock();
        self.evict_down_to(&mut sessions, capacity);
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(hebb_core::config::SafetyConfig::default().max_sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationState::*;

    #[test]
    fn history_is_bounded() {
        let registry = SessionRegistry::new(4);
        let id = SessionId::from("a");
        for state in [CasualChat, ProblemStatement, TechnicalExplanation, PositiveFeedback] {
            registry.with_session(&id, |s| s.push(state, 3));
        }
        let session = registry.get(&id).unwrap();
        assert_eq!(session.history(), vec![ProblemStatement, TechnicalExplanation, PositiveFeedback]);
        assert_eq!(session.last(), Some(PositiveFeedback));
    }

    #[test]
    fn sessions_do_not_share_state() {
        let registry = SessionRegistry::new(4);
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        registry.with_session(&a, |s| s.set_previous(Some(DebuggingHelp)));
        registry.with_session(&b, |s| s.set_previous(Some(CasualChat)));
        assert_eq!(registry.get(&a).unwrap().previous(), Some(DebuggingHelp));
        assert_eq!(registry.get(&b).unwrap().previous(), Some(CasualChat));
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let registry = SessionRegistry::new(2);
        let (a, b, c) = (SessionId::from("a"), SessionId::from("b"), SessionId::from("c"));
        registry.with_session(&a, |_| ());
        registry.with_session(&b, |_| ());
        // touch a so b becomes the oldest
        registry.with_session(&a, |_| ());
        registry.with_session(&c, |_| ());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&a));
        assert!(!registry.contains(&b));
        assert!(registry.contains(&c));
        assert_eq!(registry.evictions(), 1);
    }

    #[test]
    fn shrinking_capacity_evicts() {
        let registry = SessionRegistry::new(8);
        for name in ["a", "b", "c", "d"] {
            registry.with_session(&SessionId::from(name), |_| ());
        }
        registry.set_capacity(2);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&SessionId::from("d")));
        assert!(registry.remove(&SessionId::from("d")).is_some());
        assert_eq!(registry.len(), 1);
    }
}
