use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use super::store::{SessionStore, StoreError};
use crate::token::{self, Claims, MalformedToken};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Malformed(#[from] MalformedToken),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "status", content = "claims", rename_all = "camelCase")]
pub enum SessionState {
    Anonymous,
    Authenticated(Claims),
}

impl SessionState {
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticated(claims) => Some(claims),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Why a session was ended without the user asking for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The token's expiry passed
    Expired,
    /// The service rejected the token with 401
    Rejected,
    /// The stored token could not be decoded
    InvalidToken,
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            LogoutReason::Expired => "token expired",
            LogoutReason::Rejected => "token rejected by service",
            LogoutReason::InvalidToken => "stored token is malformed",
        };
        f.write_str(reason)
    }
}

/// Single source of truth for the session.
///
/// Owns the token store and the in-memory [`SessionState`]. Construct one per
/// process and hand an `Arc` to whatever needs it (gateway, watchdog, shell).
/// Transitions are serialized so the store and the state change together.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    state: watch::Sender<SessionState>,
    transition: Mutex<()>,
}

impl SessionManager {
    /// Start anonymous without looking at the store.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            store,
            state,
            transition: Mutex::new(()),
        }
    }

    /// Rehydrate from a previously stored token.
    ///
    /// A valid, unexpired token yields an authenticated session. An expired
    /// or malformed token, or an unreadable session file, is cleared from the
    /// store and the session starts anonymous.
    pub fn restore(store: Arc<dyn SessionStore>) -> Result<Self, StoreError> {
        let manager = Self::new(store);

        let raw = match manager.store.load() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(manager),
            Err(StoreError::Corrupt(e)) => {
                warn!(error = %e, "Stored session is unreadable, discarding");
                manager.store.clear()?;
                return Ok(manager);
            }
            Err(e) => return Err(e),
        };

        match token::decode(&raw) {
            Ok(claims) if !claims.is_expired_at(Utc::now()) => {
                info!(sub = ?claims.sub, exp = ?claims.exp, "Restored session");
                manager.state.send_replace(SessionState::Authenticated(claims));
            }
            Ok(claims) => {
                info!(exp = ?claims.exp, "Stored session has expired, discarding");
                manager.store.clear()?;
            }
            Err(e) => {
                warn!(error = %e, "Stored session token is malformed, discarding");
                manager.store.clear()?;
            }
        }

        Ok(manager)
    }

    /// Open a session with a token issued by the identity service.
    ///
    /// Nothing changes if the token cannot be decoded or stored.
    pub fn login(&self, raw: &str) -> Result<Claims, SessionError> {
        let claims = token::decode(raw)?;

        let _guard = self.lock();
        self.store.save(raw)?;
        self.state
            .send_replace(SessionState::Authenticated(claims.clone()));

        info!(sub = ?claims.sub, exp = ?claims.exp, "Signed in");
        Ok(claims)
    }

    /// End the session. Calling this while anonymous is a no-op.
    ///
    /// The in-memory state is always anonymous afterwards; a failure to clear
    /// the store is still reported.
    pub fn logout(&self) -> Result<(), StoreError> {
        let _guard = self.lock();
        let cleared = self.store.clear();
        if self.set_anonymous() {
            info!("Signed out");
        }
        cleared
    }

    /// End the session on behalf of the watchdog or the gateway.
    pub fn force_logout(&self, reason: LogoutReason) {
        let _guard = self.lock();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, %reason, "Failed to clear stored session token");
        }
        if self.set_anonymous() {
            warn!(%reason, "Session ended");
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<Claims> {
        self.state.borrow().claims().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// The raw token as currently persisted
    pub fn token(&self) -> Result<Option<String>, StoreError> {
        self.store.load()
    }

    /// Observe state transitions. The current state counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Returns true if the state actually changed.
    fn set_anonymous(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_authenticated() {
                *state = SessionState::Anonymous;
                true
            } else {
                false
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemorySessionStore;
    use crate::token::testing::{token_expiring_in, token_with_payload};

    fn manager_with(store: Arc<MemorySessionStore>) -> SessionManager {
        SessionManager::new(store)
    }

    #[test]
    fn test_login_authenticates_and_persists() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(store.clone());
        let token = token_expiring_in("owner@example.com", 3600);

        let claims = manager.login(&token).unwrap();

        assert_eq!(claims.subject(), Some("owner@example.com"));
        assert_eq!(manager.state(), SessionState::Authenticated(claims.clone()));
        assert_eq!(manager.current_user(), Some(claims));
        assert_eq!(store.load().unwrap(), Some(token));
    }

    #[test]
    fn test_login_malformed_leaves_state_unchanged() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(store.clone());

        let err = manager.login("not-a-token").unwrap_err();
        assert!(matches!(err, SessionError::Malformed(MalformedToken::SegmentCount(1))));
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.load().unwrap().is_none());

        // Same while already signed in: the old session survives
        let good = token_expiring_in("owner@example.com", 3600);
        manager.login(&good).unwrap();
        let before = manager.state();
        assert!(manager.login("a.b").is_err());
        assert_eq!(manager.state(), before);
        assert_eq!(store.load().unwrap(), Some(good));
    }

    #[test]
    fn test_relogin_replaces_token() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(store.clone());
        manager.login(&token_expiring_in("first@example.com", 3600)).unwrap();
        let second = token_expiring_in("second@example.com", 3600);
        manager.login(&second).unwrap();

        assert_eq!(
            manager.current_user().unwrap().subject(),
            Some("second@example.com")
        );
        assert_eq!(store.load().unwrap(), Some(second));
    }

    #[test]
    fn test_logout_clears_and_is_idempotent() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(store.clone());
        manager.login(&token_expiring_in("owner@example.com", 3600)).unwrap();

        let mut rx = manager.subscribe();
        manager.logout().unwrap();
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.load().unwrap().is_none());
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        // Twice more from anonymous: no error, no notification
        manager.logout().unwrap();
        manager.logout().unwrap();
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_observers_see_login() {
        let manager = manager_with(Arc::new(MemorySessionStore::new()));
        let mut rx = manager.subscribe();
        assert!(!rx.has_changed().unwrap());

        manager.login(&token_expiring_in("owner@example.com", 60)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }

    #[test]
    fn test_force_logout_notifies_once() {
        let manager = manager_with(Arc::new(MemorySessionStore::new()));
        manager.login(&token_expiring_in("owner@example.com", 60)).unwrap();
        let mut rx = manager.subscribe();

        manager.force_logout(LogoutReason::Rejected);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        manager.force_logout(LogoutReason::Rejected);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_restore_valid_token() {
        let token = token_expiring_in("owner@example.com", 3600);
        let store = Arc::new(MemorySessionStore::with_token(token.clone()));

        let manager = SessionManager::restore(store.clone()).unwrap();

        assert!(manager.is_authenticated());
        assert_eq!(store.load().unwrap(), Some(token));
    }

    #[test]
    fn test_restore_discards_expired_token() {
        let store = Arc::new(MemorySessionStore::with_token(token_expiring_in(
            "owner@example.com",
            -10,
        )));

        let manager = SessionManager::restore(store.clone()).unwrap();

        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_restore_discards_token_without_expiry() {
        let token = token_with_payload(&serde_json::json!({ "sub": "owner@example.com" }));
        let store = Arc::new(MemorySessionStore::with_token(token));

        let manager = SessionManager::restore(store.clone()).unwrap();

        assert!(!manager.is_authenticated());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_restore_discards_malformed_token() {
        let store = Arc::new(MemorySessionStore::with_token("garbage"));
        let manager = SessionManager::restore(store.clone()).unwrap();
        assert!(!manager.is_authenticated());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_restore_discards_corrupt_file() {
        use crate::auth::FileSessionStore;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileSessionStore::new(dir.path()));
        std::fs::write(store.path(), "not json").unwrap();

        let manager = SessionManager::restore(store.clone()).unwrap();

        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_restore_empty_store() {
        let manager = SessionManager::restore(Arc::new(MemorySessionStore::new())).unwrap();
        assert_eq!(manager.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_session_state_serializes_tagged() {
        let state = SessionState::Authenticated(Claims {
            sub: Some("owner@example.com".to_string()),
            iat: None,
            exp: Some(42),
        });
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            serde_json::json!({
                "status": "authenticated",
                "claims": { "sub": "owner@example.com", "exp": 42 }
            })
        );
        assert_eq!(
            serde_json::to_value(SessionState::Anonymous).unwrap(),
            serde_json::json!({ "status": "anonymous" })
        );
    }
}
