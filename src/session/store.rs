//! Session Store
//!
//! In-memory registry of device sessions, indexed by device code, user code and
//! OAuth state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{Clock, SystemClock};
use crate::error::{DeviceAuthError, SessionError};
use crate::telemetry::fingerprint;
use crate::types::{DeviceSession, SessionStatus, TokenBundle, DEFAULT_COMPLETED_GRACE_SECS};

/// Result of claiming a session on poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Claim {
    /// No session under that device code.
    Unknown,
    /// Session still in progress; left in place.
    Pending(DeviceSession),
    /// Session reached a terminal status and has been removed.
    Consumed(DeviceSession),
}

/// Counts from one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Sessions moved to `Expired`.
    pub expired: usize,
    /// Terminal sessions dropped after the grace window.
    pub evicted: usize,
}

/// Session store interface (for dependency injection).
///
/// Implementations must never hold a lock across an `.await`; every method is
/// synchronous.
pub trait SessionStore: Send + Sync {
    /// Insert a new session into all indices.
    fn create(&self, session: DeviceSession) -> Result<(), DeviceAuthError>;

    /// Snapshot of a session.
    fn get(&self, device_code: &str) -> Option<DeviceSession>;

    /// Resolve a live OAuth state to its device code.
    fn find_by_state(&self, state: &str) -> Option<String>;

    /// Resolve a normalized user code to its device code.
    fn find_by_user_code(&self, normalized_user_code: &str) -> Option<String>;

    /// Move a session to `status`, recording `message` for `Error`.
    fn update_status(
        &self,
        device_code: &str,
        status: SessionStatus,
        message: Option<String>,
    ) -> Result<DeviceSession, DeviceAuthError>;

    /// Complete a session with its token bundle.
    fn attach_tokens(
        &self,
        device_code: &str,
        tokens: TokenBundle,
    ) -> Result<DeviceSession, DeviceAuthError>;

    /// Record a browser visit: expires a stale session, otherwise marks it authorizing.
    fn touch(&self, device_code: &str) -> Option<DeviceSession>;

    /// Observe a session on behalf of the polling client.
    fn claim(&self, device_code: &str) -> Claim;

    /// Remove a session from all indices.
    fn remove(&self, device_code: &str) -> Option<DeviceSession>;

    /// Expire sessions past their TTL and evict finished ones past the grace window.
    fn sweep_expired(&self) -> SweepStats;

    /// Number of stored sessions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct Sessions {
    by_device_code: HashMap<String, DeviceSession>,
    by_user_code: HashMap<String, String>,
    by_state: HashMap<String, String>,
}

impl Sessions {
    fn remove(&mut self, device_code: &str) -> Option<DeviceSession> {
        let session = self.by_device_code.remove(device_code)?;
        self.by_user_code.remove(&session.normalized_user_code);
        self.by_state.remove(&session.state);
        Some(session)
    }

    /// Apply a transition in place, keeping the state index in step.
    fn transition(
        &mut self,
        device_code: &str,
        status: SessionStatus,
        now: i64,
    ) -> Result<&mut DeviceSession, DeviceAuthError> {
        let session = self.by_device_code.get_mut(device_code).ok_or_else(|| {
            DeviceAuthError::Session(SessionError::NotFound {
                device_code_fingerprint: fingerprint(device_code),
            })
        })?;

        if !session.status.can_transition_to(status) {
            return Err(DeviceAuthError::Session(SessionError::InvalidTransition {
                from: session.status,
                to: status,
            }));
        }

        session.status = status;
        if status.is_terminal() {
            session.completed_at = Some(now);
            self.by_state.remove(&session.state);
        }
        Ok(session)
    }

    fn expire_if_stale(&mut self, device_code: &str, now: i64) -> bool {
        let stale = self
            .by_device_code
            .get(device_code)
            .map(|s| !s.status.is_terminal() && s.is_expired_at(now))
            .unwrap_or(false);
        if stale {
            // Stale non-terminal sessions can always move to Expired.
            let _ = self.transition(device_code, SessionStatus::Expired, now);
        }
        stale
    }
}

/// In-memory session store implementation.
pub struct InMemorySessionStore {
    sessions: Mutex<Sessions>,
    clock: Arc<dyn Clock>,
    completed_grace_secs: u64,
}

impl InMemorySessionStore {
    /// Create new store using the system clock and default grace window.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_COMPLETED_GRACE_SECS)
    }

    /// Create store with a custom clock and grace window.
    pub fn with_clock(clock: Arc<dyn Clock>, completed_grace_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            clock,
            completed_grace_secs,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, session: DeviceSession) -> Result<(), DeviceAuthError> {
        let mut sessions = self.lock();

        if sessions.by_device_code.contains_key(&session.device_code) {
            return Err(SessionError::Conflict { index: "device_code" }.into());
        }
        if sessions
            .by_user_code
            .contains_key(&session.normalized_user_code)
        {
            return Err(SessionError::Conflict { index: "user_code" }.into());
        }
        if sessions.by_state.contains_key(&session.state) {
            return Err(SessionError::Conflict { index: "state" }.into());
        }

        sessions.by_user_code.insert(
            session.normalized_user_code.clone(),
            session.device_code.clone(),
        );
        sessions
            .by_state
            .insert(session.state.clone(), session.device_code.clone());
        sessions
            .by_device_code
            .insert(session.device_code.clone(), session);
        Ok(())
    }

    fn get(&self, device_code: &str) -> Option<DeviceSession> {
        self.lock().by_device_code.get(device_code).cloned()
    }

    fn find_by_state(&self, state: &str) -> Option<String> {
        self.lock().by_state.get(state).cloned()
    }

    fn find_by_user_code(&self, normalized_user_code: &str) -> Option<String> {
        self.lock().by_user_code.get(normalized_user_code).cloned()
    }

    fn update_status(
        &self,
        device_code: &str,
        status: SessionStatus,
        message: Option<String>,
    ) -> Result<DeviceSession, DeviceAuthError> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let session = sessions.transition(device_code, status, now)?;
        if status == SessionStatus::Error {
            session.error = message;
        }
        Ok(session.clone())
    }

    fn attach_tokens(
        &self,
        device_code: &str,
        tokens: TokenBundle,
    ) -> Result<DeviceSession, DeviceAuthError> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let session = sessions.transition(device_code, SessionStatus::Complete, now)?;
        session.tokens = Some(tokens);
        session.error = None;
        Ok(session.clone())
    }

    fn touch(&self, device_code: &str) -> Option<DeviceSession> {
        let now = self.clock.now();
        let mut sessions = self.lock();

        if !sessions.expire_if_stale(device_code, now) {
            let session = sessions.by_device_code.get_mut(device_code)?;
            if !session.status.is_terminal() {
                session.last_touched = Some(now);
                session.status = SessionStatus::Authorizing;
            }
        }

        sessions.by_device_code.get(device_code).cloned()
    }

    fn claim(&self, device_code: &str) -> Claim {
        let now = self.clock.now();
        let mut sessions = self.lock();
        sessions.expire_if_stale(device_code, now);

        let terminal = match sessions.by_device_code.get(device_code) {
            None => return Claim::Unknown,
            Some(session) => session.status.is_terminal(),
        };

        if terminal {
            match sessions.remove(device_code) {
                Some(session) => Claim::Consumed(session),
                None => Claim::Unknown,
            }
        } else {
            match sessions.by_device_code.get(device_code) {
                Some(session) => Claim::Pending(session.clone()),
                None => Claim::Unknown,
            }
        }
    }

    fn remove(&self, device_code: &str) -> Option<DeviceSession> {
        self.lock().remove(device_code)
    }

    fn sweep_expired(&self) -> SweepStats {
        let now = self.clock.now();
        let grace = self.completed_grace_secs as i64;
        let mut sessions = self.lock();
        let mut stats = SweepStats::default();

        let stale: Vec<String> = sessions
            .by_device_code
            .values()
            .filter(|s| !s.status.is_terminal() && s.is_expired_at(now))
            .map(|s| s.device_code.clone())
            .collect();
        for device_code in stale {
            if sessions.expire_if_stale(&device_code, now) {
                stats.expired += 1;
            }
        }

        let finished: Vec<String> = sessions
            .by_device_code
            .values()
            .filter(|s| {
                s.status.is_terminal()
                    && s.completed_at.map(|at| now - at > grace).unwrap_or(true)
            })
            .map(|s| s.device_code.clone())
            .collect();
        for device_code in finished {
            if sessions.remove(&device_code).is_some() {
                stats.evicted += 1;
            }
        }

        stats
    }

    fn len(&self) -> usize {
        self.lock().by_device_code.len()
    }
}
