//! Session Context
//!
//! Per-session query history and preferences, owned by the caller and
//! passed to the enhancer as context. History is bounded to `max_history`
//! per session; the least recently used sessions are evicted beyond
//! `max_sessions`.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{enhance_or_fallback, EnhancedQuery, EnhancementContext, QueryEnhancer};

/// Queries kept per session
pub const DEFAULT_MAX_HISTORY: usize = 5;

/// Sessions kept before the least recently used one is dropped
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Accumulated listening preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPreferences {
    pub preferred_genres: Vec<String>,
    pub avoided_genres: Vec<String>,
    pub preferred_moods: Vec<String>,
}

impl SessionPreferences {
    pub fn is_empty(&self) -> bool {
        self.preferred_genres.is_empty()
            && self.avoided_genres.is_empty()
            && self.preferred_moods.is_empty()
    }

    fn absorb(&mut self, feedback: &SessionFeedback) {
        extend_unique(&mut self.preferred_genres, &feedback.liked_genres);
        extend_unique(&mut self.avoided_genres, &feedback.disliked_genres);
        extend_unique(&mut self.preferred_moods, &feedback.liked_moods);
    }
}

fn extend_unique(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !target.iter().any(|v| v == value) {
            target.push(value.to_string());
        }
    }
}

/// Feedback reported by a listener
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFeedback {
    pub liked_genres: Vec<String>,
    pub disliked_genres: Vec<String>,
    pub liked_moods: Vec<String>,
}

/// Snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub query_count: usize,
    pub recent_queries: Vec<String>,
    pub preferences: SessionPreferences,
}

#[derive(Debug, Default)]
struct Session {
    history: VecDeque<String>,
    preferences: SessionPreferences,
}

/// Thread-safe session registry with LRU eviction
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<LruCache<String, Session>>,
    max_history: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self::with_capacity(max_history, DEFAULT_MAX_SESSIONS)
    }

    /// Bound both per-session history and the number of live sessions
    pub fn with_capacity(max_history: usize, max_sessions: usize) -> Self {
        let capacity = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            max_history: max_history.max(1),
        }
    }

    /// Fresh random session id
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn max_sessions(&self) -> usize {
        self.lock().cap().get()
    }

    // Session data is advisory; a poisoned lock still holds usable state
    fn lock(&self) -> MutexGuard<'_, LruCache<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enhancement context for a session, `None` when it has nothing to offer.
    /// Counts as activity for eviction.
    pub fn context(&self, session_id: &str) -> Option<EnhancementContext> {
        let mut sessions = self.lock();
        let session = sessions.get(session_id)?;
        let context = EnhancementContext {
            previous_queries: session.history.iter().cloned().collect(),
            preferences: session.preferences.clone(),
        };
        (!context.is_empty()).then_some(context)
    }

    /// Append a query, evicting the oldest beyond `max_history`
    pub fn record_query(&self, session_id: &str, query: &str) {
        let mut sessions = self.lock();
        let session = sessions.get_or_insert_mut(session_id.to_string(), Session::default);
        session.history.push_back(query.to_string());
        while session.history.len() > self.max_history {
            session.history.pop_front();
        }
    }

    pub fn add_feedback(&self, session_id: &str, feedback: &SessionFeedback) {
        let mut sessions = self.lock();
        sessions
            .get_or_insert_mut(session_id.to_string(), Session::default)
            .preferences
            .absorb(feedback);
        tracing::debug!(session_id, "Recorded session feedback");
    }

    /// Forget a session, returning whether it existed
    pub fn clear(&self, session_id: &str) -> bool {
        self.lock().pop(session_id).is_some()
    }

    pub fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        let sessions = self.lock();
        let session = sessions.peek(session_id)?;
        Some(SessionSummary {
            session_id: session_id.to_string(),
            query_count: session.history.len(),
            recent_queries: session.history.iter().cloned().collect(),
            preferences: session.preferences.clone(),
        })
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }
}

/// Enhancer that threads session history through each call
pub struct ContextualEnhancer {
    enhancer: Arc<dyn QueryEnhancer>,
    sessions: Arc<SessionStore>,
}

impl ContextualEnhancer {
    pub fn new(enhancer: Arc<dyn QueryEnhancer>, sessions: Arc<SessionStore>) -> Self {
        Self { enhancer, sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Enhance with the session's prior queries as context, then record the
    /// query. Enhancement failures degrade to the fallback.
    pub fn enhance(&self, session_id: &str, query: &str) -> EnhancedQuery {
        let context = self.sessions.context(session_id);
        let enhanced = enhance_or_fallback(self.enhancer.as_ref(), query, context.as_ref());
        self.sessions.record_query(session_id, query);
        enhanced
    }
}
