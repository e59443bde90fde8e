//! Retry, skip and rollback classification for fault-tolerant chunk steps.

use std::collections::BTreeSet;

use crate::config::descriptor::{RetryPolicy, SkipPolicy, TransactionPolicy};

/// Fault-tolerance rules of one chunk step.
///
/// Error classes are matched by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultTolerancePolicy {
    pub retry_limit: u32,
    pub retryable: BTreeSet<String>,
    pub skip_limit: u32,
    pub skippable: BTreeSet<String>,
    pub never_skip: BTreeSet<String>,
    pub no_rollback: BTreeSet<String>,
    pub reader_transactional_queue: bool,
}

impl FaultTolerancePolicy {
    /// Combine the declared policies; `None` when none is declared.
    pub fn from_policies(
        retry: Option<&RetryPolicy>,
        skip: Option<&SkipPolicy>,
        transaction: Option<&TransactionPolicy>,
    ) -> Option<Self> {
        if retry.is_none() && skip.is_none() && transaction.is_none() {
            return None;
        }

        let mut policy = Self::default();
        if let Some(retry) = retry {
            policy.retry_limit = retry.limit;
            policy.retryable = retry.exceptions.iter().cloned().collect();
        }
        if let Some(skip) = skip {
            policy.skip_limit = skip.limit;
            policy.skippable = skip.exceptions_to_skip.iter().cloned().collect();
            policy.never_skip = skip.exceptions_no_skip.iter().cloned().collect();
        }
        if let Some(transaction) = transaction {
            policy.no_rollback = transaction.no_rollback_exceptions.iter().cloned().collect();
            policy.reader_transactional_queue = transaction.is_reader_in_transaction;
        }
        Some(policy)
    }

    pub fn is_retryable(&self, class: &str) -> bool {
        self.retryable.contains(class)
    }

    /// Whether one more retry is allowed after `attempts_so_far` retries.
    pub fn can_retry(&self, class: &str, attempts_so_far: u32) -> bool {
        self.is_retryable(class) && attempts_so_far < self.retry_limit
    }

    /// No-skip overrides skip.
    pub fn is_skippable(&self, class: &str) -> bool {
        !self.never_skip.contains(class) && self.skippable.contains(class)
    }

    pub fn can_skip(&self, class: &str, skipped_so_far: u32) -> bool {
        self.is_skippable(class) && skipped_so_far < self.skip_limit
    }

    pub fn rolls_back(&self, class: &str) -> bool {
        !self.no_rollback.contains(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FaultTolerancePolicy {
        FaultTolerancePolicy::from_policies(
            Some(&RetryPolicy {
                limit: 3,
                exceptions: vec!["TimeoutError".to_string()],
            }),
            Some(&SkipPolicy {
                limit: 10,
                exceptions_to_skip: vec!["ValidationError".to_string(), "TimeoutError".to_string()],
                exceptions_no_skip: vec!["TimeoutError".to_string()],
            }),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_absent_policies_mean_not_fault_tolerant() {
        assert!(FaultTolerancePolicy::from_policies(None, None, None).is_none());
    }

    #[test]
    fn test_timeout_retried_three_times_never_skipped() {
        let policy = policy();
        assert!(policy.can_retry("TimeoutError", 0));
        assert!(policy.can_retry("TimeoutError", 2));
        assert!(!policy.can_retry("TimeoutError", 3));
        assert!(!policy.is_skippable("TimeoutError"));
        assert!(!policy.can_skip("TimeoutError", 0));
    }

    #[test]
    fn test_validation_error_skipped_up_to_limit() {
        let policy = policy();
        assert!(!policy.is_retryable("ValidationError"));
        assert!(policy.can_skip("ValidationError", 9));
        assert!(!policy.can_skip("ValidationError", 10));
    }

    #[test]
    fn test_no_rollback_and_transactional_reader() {
        let policy = FaultTolerancePolicy::from_policies(
            None,
            None,
            Some(&TransactionPolicy {
                is_reader_in_transaction: true,
                no_rollback_exceptions: vec!["ValidationError".to_string()],
            }),
        )
        .unwrap();
        assert!(policy.reader_transactional_queue);
        assert!(!policy.rolls_back("ValidationError"));
        assert!(policy.rolls_back("IoError"));
        assert_eq!(policy.retry_limit, 0);
    }
}
