//! Retry eligibility decisions driven by structured outcome evidence.
//!
//! `RetryPolicy` is immutable after construction and has no side effects, so a
//! single instance may be shared by reference across concurrent evaluations.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{OutcomeEvidence, UploadStatus, VerificationStatus};

/// Longest accepted pause between attempts.
pub const MAX_BACKOFF_SECONDS: f64 = 3_600.0;

/// Stateless retry decision object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub retryable_upload_statuses: BTreeSet<UploadStatus>,
    pub retry_on_goal_failure: bool,
    pub backoff_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retryable_upload_statuses: [
                UploadStatus::NotConfirmed,
                UploadStatus::NoInputFound,
                UploadStatus::ErrorDetected,
            ]
            .into_iter()
            .collect(),
            retry_on_goal_failure: true,
            backoff_seconds: 1.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_BACKOFF_SECONDS).contains(&self.backoff_seconds) {
            return Err(anyhow!(
                "retry.backoff_seconds must be between 0 and {MAX_BACKOFF_SECONDS}"
            ));
        }
        Ok(())
    }

    /// True while `attempt_index` (0-based) is below `max_retries`.
    pub fn can_retry(&self, attempt_index: u32) -> bool {
        attempt_index < self.max_retries
    }

    pub fn should_retry_upload(&self, status: Option<UploadStatus>) -> bool {
        status.is_some_and(|status| self.retryable_upload_statuses.contains(&status))
    }

    pub fn should_retry_verification(&self, status: Option<VerificationStatus>) -> bool {
        matches!(
            status,
            Some(VerificationStatus::NotConfirmed | VerificationStatus::ErrorDetected)
        )
    }

    /// True if the evidence alone asks for another attempt.
    pub fn evidence_requests_retry(&self, evidence: &OutcomeEvidence) -> bool {
        self.should_retry_upload(evidence.upload_status)
            || self.should_retry_verification(evidence.verification_status)
    }

    /// Combined decision after attempt `attempt_index` finished.
    pub fn should_retry(
        &self,
        attempt_index: u32,
        evidence: &OutcomeEvidence,
        goal_succeeded: bool,
    ) -> bool {
        if !self.can_retry(attempt_index) {
            return false;
        }
        self.evidence_requests_retry(evidence) || (!goal_succeeded && self.retry_on_goal_failure)
    }

    /// Pause between attempts, clamped to [0, `MAX_BACKOFF_SECONDS`] even for
    /// a policy that skipped validation.
    pub fn backoff(&self) -> Duration {
        let seconds = if self.backoff_seconds.is_nan() {
            0.0
        } else {
            self.backoff_seconds.clamp(0.0, MAX_BACKOFF_SECONDS)
        };
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_retries(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn can_retry_is_bounded_by_max_retries() {
        let policy = with_retries(2);
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
        assert!(!policy.can_retry(3));
        assert!(!with_retries(0).can_retry(0));
    }

    #[test]
    fn upload_retry_requires_retryable_status() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_upload(Some(UploadStatus::NotConfirmed)));
        assert!(!policy.should_retry_upload(Some(UploadStatus::Success)));
        assert!(!policy.should_retry_upload(Some(UploadStatus::NoFile)));
        assert!(!policy.should_retry_upload(None));
    }

    #[test]
    fn upload_retry_uses_configured_set() {
        let policy = RetryPolicy {
            retryable_upload_statuses: [UploadStatus::NoFile].into_iter().collect(),
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry_upload(Some(UploadStatus::NoFile)));
        assert!(!policy.should_retry_upload(Some(UploadStatus::NotConfirmed)));
    }

    #[test]
    fn verification_retry_only_for_unconfirmed_or_error() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_verification(Some(VerificationStatus::NotConfirmed)));
        assert!(policy.should_retry_verification(Some(VerificationStatus::ErrorDetected)));
        assert!(!policy.should_retry_verification(Some(VerificationStatus::Confirmed)));
        assert!(!policy.should_retry_verification(Some(VerificationStatus::NotApplicable)));
        assert!(!policy.should_retry_verification(None));
    }

    #[test]
    fn should_retry_combines_budget_evidence_and_goal_failure() {
        let policy = with_retries(1);
        let clean = OutcomeEvidence::default();
        let unconfirmed = OutcomeEvidence {
            upload_status: Some(UploadStatus::NotConfirmed),
            verification_status: None,
        };

        assert!(policy.should_retry(0, &unconfirmed, true));
        assert!(policy.should_retry(0, &clean, false));
        assert!(!policy.should_retry(0, &clean, true));
        assert!(!policy.should_retry(1, &unconfirmed, false));

        let no_goal_retry = RetryPolicy {
            retry_on_goal_failure: false,
            ..policy
        };
        assert!(!no_goal_retry.should_retry(0, &clean, false));
    }

    #[test]
    fn validate_rejects_negative_backoff() {
        let policy = RetryPolicy {
            backoff_seconds: -1.0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[test]
    fn oversized_backoff_is_rejected_and_never_panics() {
        let policy = RetryPolicy {
            backoff_seconds: 1e20,
            ..RetryPolicy::default()
        };
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("backoff_seconds"));
        assert_eq!(policy.backoff(), Duration::from_secs(3_600));

        for seconds in [f64::NAN, f64::INFINITY, -4.0] {
            let policy = RetryPolicy {
                backoff_seconds: seconds,
                ..RetryPolicy::default()
            };
            assert!(policy.validate().is_err());
            assert!(policy.backoff() <= Duration::from_secs(3_600));
        }
    }
}
