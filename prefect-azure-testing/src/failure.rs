// Call recording and failure injection shared by the in-memory clients

use parking_lot::Mutex;
use prefect_azure_credentials::{AzureError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Records calls and hands out queued failures per operation.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<AzureError>>>>,
}

impl CallLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next call to `operation`.
    pub fn fail_next(&self, operation: &str, error: AzureError) {
        self.failures
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Record a call and return a queued failure, if any.
    pub fn enter(&self, operation: &str) -> Result<()> {
        self.calls.lock().push(operation.to_string());
        match self
            .failures
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of calls to `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == operation).count()
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Check if `operation` was called.
    pub fn was_called(&self, operation: &str) -> bool {
        self.call_count(operation) > 0
    }

    /// Clear calls and pending failures.
    pub fn clear(&self) {
        self.calls.lock().clear();
        self.failures.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_is_consumed_once() {
        let log = CallLog::new();
        log.fail_next("download", AzureError::ResourceNotFound("x".into()));

        assert!(log.enter("download").unwrap_err().is_not_found());
        assert!(log.enter("download").is_ok());
        assert_eq!(log.call_count("download"), 2);
        assert!(!log.was_called("upload"));
    }
}
