//! MCP session registry.
//!
//! Maps session ids to the transport adapter that owns the session and the
//! call context captured at handshake time. Sessions are registered once the
//! adapter has generated an id and removed by the adapter's close and error
//! callbacks, so a closed adapter never stays reachable.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::transport::{StreamableHttpTransport, TransportState};
use crate::auth::CallContext;

/// Liveness of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Closed,
}

/// One live MCP session.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub transport: Arc<StreamableHttpTransport>,
    /// Context snapshot taken from the handshake request.
    pub context: Arc<CallContext>,
    pub created_at: Instant,
    last_activity: Arc<Mutex<Instant>>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        transport: Arc<StreamableHttpTransport>,
        context: CallContext,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            transport,
            context: Arc::new(context),
            created_at: now,
            last_activity: Arc::new(Mutex::new(now)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.transport.state() {
            TransportState::Closed => SessionStatus::Closed,
            _ => SessionStatus::Active,
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last request routed to this session.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn age_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} is already registered")]
    Duplicate(String),
}

/// Concurrent map of live sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Ids are unique.
    pub fn put(&self, session: Session) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(SessionError::Duplicate(session.id));
        }
        info!("Created MCP session: {}", session.id);
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Look up a session and record activity on it.
    pub fn get(&self, id: &str) -> Option<Session> {
        let session = self.sessions.read().get(id).cloned()?;
        session.touch();
        Some(session)
    }

    /// Look up a session without touching it.
    pub fn peek(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Forget a session. Removing an absent id is a no-op.
    pub fn remove(&self, id: &str) -> bool {
        if self.sessions.write().remove(id).is_some() {
            info!("Terminated MCP session: {}", id);
            true
        } else {
            false
        }
    }

    /// Close and forget every session. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let drained: Vec<Session> = self.sessions.write().drain().map(|(_, s)| s).collect();
        // Transports are closed outside the lock: their callbacks re-enter `remove`.
        for session in &drained {
            if let Err(e) = session.transport.close() {
                debug!("MCP session {} was already closed: {}", session.id, e);
            }
        }
        if !drained.is_empty() {
            info!("Closed {} MCP session(s)", drained.len());
        }
        drained.len()
    }

    /// Close sessions idle for at least `max_idle`. Returns how many.
    ///
    /// A session with a call in progress or an open standalone stream is
    /// never idle.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let stale: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.idle_for() >= max_idle && !s.transport.is_busy())
            .cloned()
            .collect();

        for session in &stale {
            info!(
                "Cleaning up idle MCP session: {} (age: {}s)",
                session.id,
                session.age_secs()
            );
            if let Err(e) = session.transport.close() {
                warn!("Failed to close MCP session {}: {}", session.id, e);
            }
            self.remove(&session.id);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}
