//! Resilient goal automation against an unreliable, frame-based web portal.
//!
//! A goal is turned into an [`ExecutionProfile`](core::profile::ExecutionProfile)
//! and an ordered plan ([`planner`]); sub-goals then run in order
//! ([`execution`]), reaching UI targets through a cascading, deadline-bounded
//! resolver ([`navigation`]) and retrying only when structured evidence asks
//! for it ([`core::retry`]). A post-hoc [`judge`] reviews the run and always
//! produces a valid report.
//!
//! - **[`core`]**: Pure, deterministic logic (profiles, keyword tables, retry
//!   decisions, shared types). No I/O.
//! - **[`io`]**: Capability interfaces (session, oracle, repository) and
//!   side-effecting adapters (config, artifacts).

pub mod cli;
pub mod core;
pub mod execution;
pub mod io;
pub mod judge;
pub mod logging;
pub mod navigation;
pub mod planner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
