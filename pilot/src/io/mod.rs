//! Capability interfaces and side-effecting adapters.

pub mod artifacts;
pub mod config;
pub mod oracle;
pub mod repository;
pub mod session;
