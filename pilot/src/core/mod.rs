//! Deterministic, pure logic shared by the planner, executor, and judge.
//!
//! Core modules are free of I/O side effects. They operate on in-memory data
//! and return deterministic outputs suitable for tests.

pub mod budget;
pub mod keywords;
pub mod profile;
pub mod retry;
pub mod strategy;
pub mod types;
