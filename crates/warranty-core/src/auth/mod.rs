//! Session lifecycle for the signed-in user.
//!
//! This module provides:
//! - `SessionStore`: durable storage for the bearer token (file, keychain, memory)
//! - `SessionManager`: the two-state session (anonymous / authenticated) and its transitions
//! - `ExpiryWatchdog`: ends the session when the token's expiry passes
//!
//! The manager is built once at startup and shared as an `Arc`; the store is
//! injected into it rather than reached through a global.

pub mod session;
pub mod store;
pub mod watchdog;

pub use session::{LogoutReason, SessionError, SessionManager, SessionState};
pub use store::{
    FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore, StoreError,
};
pub use watchdog::{ExpiryWatchdog, WatchdogHandle};
