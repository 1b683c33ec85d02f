//! Core data models for the session-scoped compression service.
//!
//! Sessions have no database row; these types describe what lives on disk
//! under a session directory and what the service reports about it.

pub mod artifact;
pub mod cleanup;
pub mod upload;
