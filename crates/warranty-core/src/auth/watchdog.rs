//! Ends the session when its token expires.
//!
//! [`ExpiryWatchdog::mount`] checks the stored token straight away, logging
//! out before returning if it has already expired, and otherwise arms a
//! single deadline on a background task. The task follows later logins and
//! logouts so there is at most one deadline pending, always for the current
//! token. Dropping the returned [`WatchdogHandle`] stops the task.

use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::session::{LogoutReason, SessionManager, SessionState};
use crate::token::{self, Claims};

type SharedDeadline = Arc<Mutex<Option<Instant>>>;

pub struct ExpiryWatchdog;

impl ExpiryWatchdog {
    /// Inspect the stored token and start watching the session.
    ///
    /// Expects a manager built with [`SessionManager::restore`]: a stored
    /// token that has expired or cannot be decoded is logged out, but a live
    /// one only arms a deadline if the manager is authenticated.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount(manager: &Arc<SessionManager>) -> WatchdogHandle {
        let initial = Self::check_stored(manager);
        let deadline: SharedDeadline = Arc::new(Mutex::new(initial));

        // Subscribe after the check so a logout it caused is not replayed.
        let states = manager.subscribe();
        let task = tokio::spawn(run(
            Arc::downgrade(manager),
            states,
            deadline.clone(),
        ));

        WatchdogHandle {
            task: Some(task),
            deadline,
        }
    }

    fn check_stored(manager: &SessionManager) -> Option<Instant> {
        let claims = match manager.token() {
            Ok(Some(raw)) => match token::decode(&raw) {
                Ok(claims) => claims,
                Err(e) => {
                    warn!(error = %e, "Stored session token is malformed");
                    manager.force_logout(LogoutReason::InvalidToken);
                    return None;
                }
            },
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Could not read stored session token, using in-memory session");
                manager.current_user()?
            }
        };

        // Expired tokens are dropped either way; live ones only back a deadline
        // when there is an in-memory session to end.
        if !claims.is_expired_at(Utc::now()) && !manager.is_authenticated() {
            debug!("Stored token has no in-memory session, not arming");
            return None;
        }
        arm_for(manager, &claims)
    }
}

/// Deadline for `claims`, or log out now if it has already passed.
fn arm_for(manager: &SessionManager, claims: &Claims) -> Option<Instant> {
    match claims.time_until_expiry(Utc::now()) {
        Some(delay) => {
            debug!(delay_secs = delay.as_secs(), "Armed session expiry");
            Some(Instant::now() + delay)
        }
        None => {
            manager.force_logout(LogoutReason::Expired);
            None
        }
    }
}

async fn run(
    manager: Weak<SessionManager>,
    mut states: watch::Receiver<SessionState>,
    deadline: SharedDeadline,
) {
    loop {
        let pending = *deadline.lock().unwrap_or_else(|e| e.into_inner());
        let expiry = async move {
            match pending {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        let next = tokio::select! {
            _ = expiry => {
                if let Some(manager) = manager.upgrade() {
                    manager.force_logout(LogoutReason::Expired);
                }
                None
            }
            changed = states.changed() => {
                if changed.is_err() {
                    // Manager dropped
                    break;
                }
                let state = states.borrow_and_update().clone();
                match (state, manager.upgrade()) {
                    (SessionState::Authenticated(claims), Some(manager)) => {
                        arm_for(&manager, &claims)
                    }
                    _ => None,
                }
            }
        };

        *deadline.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    *deadline.lock().unwrap_or_else(|e| e.into_inner()) = None;
}

/// Owns the watchdog task. Dropping it cancels any pending deadline.
pub struct WatchdogHandle {
    task: Option<JoinHandle<()>>,
    deadline: SharedDeadline,
}

impl WatchdogHandle {
    /// When the session will be ended, if a deadline is pending
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_armed(&self) -> bool {
        self.deadline().is_some()
    }

    /// Stop watching. Equivalent to dropping the handle.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            *self.deadline.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
