//! Warranty Manager client core.
//!
//! Session lifecycle for the Warranty Manager service: decoding bearer
//! tokens, keeping the current token in durable storage, ending sessions
//! when tokens expire or are rejected, and making authenticated calls.

pub mod api;
pub mod auth;
pub mod config;
pub mod token;

pub use token::{Claims, MalformedToken};
