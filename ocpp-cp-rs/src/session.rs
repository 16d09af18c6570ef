//! Charging session registry
//!
//! One session per connector in use, addressed by opaque [`SessionId`]
//! handles. Handles stay valid to pass around after `close`; every
//! operation re-validates membership in the registry, so a stale handle is
//! a reported no-op rather than a dangling reference.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::AuthorizationStatus;

/// Opaque handle to a charging session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Mutable per-session state, guarded by the session's own mutex.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub id_tag: String,
    pub active: bool,
    /// Assigned on start_transaction
    pub connector_id: Option<i32>,
    /// Assigned by the CSMS in StartTransaction.conf; absent for
    /// transactions accepted optimistically while offline
    pub transaction_id: Option<i32>,
    pub last_auth: Option<AuthorizationStatus>,
    /// Whether this session holds a reference on the metering timer
    pub metering: bool,
}

/// Read-only snapshot of a session for the host application.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub id_tag: String,
    pub active: bool,
    pub connector_id: Option<i32>,
    pub transaction_id: Option<i32>,
    pub last_auth: Option<AuthorizationStatus>,
}

pub(crate) type SessionSlot = Arc<Mutex<SessionState>>;

/// Registry of live sessions. The outer lock orders membership changes;
/// per-session locks order field mutation.
pub(crate) struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn open(&self) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions
            .write()
            .insert(id, Arc::new(Mutex::new(SessionState::default())));
        id
    }

    /// Remove a session. Returns false if the handle was already stale.
    /// The slot itself is freed once the last in-flight user drops its Arc.
    pub fn close(&self, id: SessionId) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    pub fn get(&self, id: SessionId) -> Option<SessionSlot> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn snapshot(&self, id: SessionId) -> Option<SessionInfo> {
        let slot = self.get(id)?;
        let s = slot.lock();
        Some(SessionInfo {
            id,
            id_tag: s.id_tag.clone(),
            active: s.active,
            connector_id: s.connector_id,
            transaction_id: s.transaction_id,
            last_auth: s.last_auth,
        })
    }

    /// Locate the session carrying a CSMS transaction id.
    pub fn find_by_transaction(&self, transaction_id: i32) -> Option<(SessionId, SessionSlot)> {
        let sessions = self.sessions.read();
        for (id, slot) in sessions.iter() {
            if slot.lock().transaction_id == Some(transaction_id) {
                return Some((*id, slot.clone()));
            }
        }
        None
    }

    /// All sessions currently marked active, for metering sweeps.
    pub fn active_sessions(&self) -> Vec<(SessionId, SessionSlot)> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, slot)| slot.lock().active)
            .map(|(id, slot)| (*id, slot.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close() {
        let reg = SessionRegistry::new();
        let id = reg.open();
        assert_eq!(reg.len(), 1);
        assert!(reg.get(id).is_some());

        assert!(reg.close(id));
        assert_eq!(reg.len(), 0);
        // Stale handle is a safe no-op
        assert!(!reg.close(id));
        assert!(reg.get(id).is_none());
        assert!(reg.snapshot(id).is_none());
    }

    #[test]
    fn test_handles_are_unique_across_reopen() {
        let reg = SessionRegistry::new();
        let a = reg.open();
        reg.close(a);
        let b = reg.open();
        assert_ne!(a, b);
    }

    #[test]
    fn test_find_by_transaction() {
        let reg = SessionRegistry::new();
        let a = reg.open();
        let b = reg.open();

        reg.get(b).unwrap().lock().transaction_id = Some(7);

        let (found, _) = reg.find_by_transaction(7).unwrap();
        assert_eq!(found, b);
        assert!(reg.find_by_transaction(8).is_none());

        let _ = a;
    }

    #[test]
    fn test_active_sessions_filter() {
        let reg = SessionRegistry::new();
        let a = reg.open();
        let _b = reg.open();

        {
            let slot = reg.get(a).unwrap();
            let mut s = slot.lock();
            s.active = true;
            s.connector_id = Some(1);
        }

        let active = reg.active_sessions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, a);
    }

    #[test]
    fn test_stale_slot_survives_close_while_held() {
        let reg = SessionRegistry::new();
        let id = reg.open();
        let slot = reg.get(id).unwrap();

        reg.close(id);
        // The Arc we still hold keeps the state alive; mutation is safe
        // but invisible to the registry.
        slot.lock().active = true;
        assert!(reg.snapshot(id).is_none());
    }
}
