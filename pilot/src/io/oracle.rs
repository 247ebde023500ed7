//! Reasoning-oracle capability used by the outcome judge.
//!
//! A single request/response call: no streaming and no retries. The caller
//! owns the timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Structured request sent to the oracle.
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest {
    /// Rendered instructions.
    pub prompt: String,
    /// Plan, trace, and answer the oracle must judge.
    pub payload: Value,
    /// JSON Schema the response must conform to.
    pub response_schema: Value,
    pub timeout: Duration,
}

/// Failure reported by an oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle transport failed: {0}")]
    Transport(String),
    #[error("oracle returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("oracle failed: {0}")]
    Other(String),
}

/// Abstraction over language-reasoning backends.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Return a JSON object intended to match `request.response_schema`.
    async fn complete(&self, request: &OracleRequest) -> Result<Value, OracleError>;
}
