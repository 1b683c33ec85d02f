//! Session lifecycle services: storage, compression, archiving, cleanup.

pub mod archive_service;
pub mod compression_service;
pub mod janitor_service;
pub mod session_service;
