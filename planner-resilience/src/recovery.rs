//! Recovery classification for failed worker calls

use log::{debug, warn};

/// How a failure should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Caused by the worker's runtime state; a restart may clear it
    Transient,
    /// Caused by the request itself; a restart never helps
    Fatal,
}

impl Recovery {
    /// Classify an HTTP status code.
    ///
    /// Server errors are transient. Every other non-success status is a
    /// structured rejection of the request and therefore fatal.
    pub fn from_status(status: u16) -> Self {
        if (500..600).contains(&status) {
            Recovery::Transient
        } else {
            Recovery::Fatal
        }
    }
}

/// Trait for errors that can be classified for recovery
pub trait Recoverable {
    /// Recovery class of this error
    fn recovery(&self) -> Recovery;

    /// Whether a restart of the worker might clear this error
    fn is_transient(&self) -> bool {
        self.recovery() == Recovery::Transient
    }
}

/// What the caller should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Restart the worker and retry the call
    Restart,
    /// Hand the error to the caller
    Surface,
}

/// Restart budget for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Restart-and-retry cycles allowed per request
    pub max_restarts: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self { max_restarts: 1 }
    }
}

impl RecoveryPolicy {
    pub fn new(max_restarts: u32) -> Self {
        Self { max_restarts }
    }

    /// A policy that never restarts
    pub fn no_restart() -> Self {
        Self { max_restarts: 0 }
    }

    /// Classify an error
    pub fn classify<E: Recoverable + ?Sized>(&self, error: &E) -> Recovery {
        error.recovery()
    }

    /// Decide what to do after a failure, given the restarts already spent
    pub fn decide<E>(&self, error: &E, restarts_used: u32) -> RecoveryDecision
    where
        E: Recoverable + std::fmt::Display + ?Sized,
    {
        match self.classify(error) {
            Recovery::Fatal => {
                debug!("Fatal failure, not restarting: {}", error);
                RecoveryDecision::Surface
            }
            Recovery::Transient if restarts_used < self.max_restarts => {
                warn!(
                    "Transient failure (restart {}/{}): {}",
                    restarts_used + 1,
                    self.max_restarts,
                    error
                );
                RecoveryDecision::Restart
            }
            Recovery::Transient => {
                warn!(
                    "Transient failure after {} restart(s), giving up: {}",
                    restarts_used, error
                );
                RecoveryDecision::Surface
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestError {
        recovery: Recovery,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?} failure", self.recovery)
        }
    }

    impl Recoverable for TestError {
        fn recovery(&self) -> Recovery {
            self.recovery
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(Recovery::from_status(500), Recovery::Transient);
        assert_eq!(Recovery::from_status(503), Recovery::Transient);
        assert_eq!(Recovery::from_status(400), Recovery::Fatal);
        assert_eq!(Recovery::from_status(404), Recovery::Fatal);
        assert_eq!(Recovery::from_status(422), Recovery::Fatal);
    }

    #[test]
    fn test_transient_restarts_within_budget() {
        let policy = RecoveryPolicy::default();
        let error = TestError {
            recovery: Recovery::Transient,
        };

        assert!(error.is_transient());
        assert_eq!(policy.decide(&error, 0), RecoveryDecision::Restart);
        assert_eq!(policy.decide(&error, 1), RecoveryDecision::Surface);
    }

    #[test]
    fn test_fatal_never_restarts() {
        let policy = RecoveryPolicy::new(5);
        let error = TestError {
            recovery: Recovery::Fatal,
        };

        assert!(!error.is_transient());
        assert_eq!(policy.decide(&error, 0), RecoveryDecision::Surface);
    }

    #[test]
    fn test_zero_budget() {
        let policy = RecoveryPolicy::no_restart();
        let error = TestError {
            recovery: Recovery::Transient,
        };
        assert_eq!(policy.classify(&error), Recovery::Transient);
        assert_eq!(policy.decide(&error, 0), RecoveryDecision::Surface);
    }
}
