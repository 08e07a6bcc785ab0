//! REST API access to the Warranty Manager service.
//!
//! This module provides the `Gateway`, the single path for outbound calls,
//! and `AuthApi` for the identity endpoints (`/auth/login`, `/auth/register`).
//!
//! The service uses JWT bearer token authentication. The gateway attaches
//! the stored token to every request and ends the session on a 401.

pub mod auth;
pub mod error;
pub mod gateway;

pub use auth::{AuthApi, AuthResponse, LoginRequest, RegisterRequest};
pub use error::{ApiError, FieldError};
pub use gateway::Gateway;
