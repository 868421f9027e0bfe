//! Scoped acquisition with deferred failure.
//!
//! [`SessionGuard`] lets a script express "attempt this instrument; if it is
//! unavailable, skip this measurement block" without wrapping every call
//! site in conditionals. The acquisition error is captured instead of
//! propagated; [`evaluate`](SessionGuard::evaluate) either yields the
//! resource or re-raises the captured error at the point where the script
//! actually needs it. Dropping a guard never panics, whatever its state.

use crate::error::{AppResult, DaqError};

/// Outcome of a guarded acquisition.
pub enum SessionGuard<T> {
    Acquired(T),
    Failed(DaqError),
}

impl<T> SessionGuard<T> {
    /// Run `attempt`, capturing a failure instead of propagating it.
    pub fn acquire(attempt: impl FnOnce() -> AppResult<T>) -> Self {
        match attempt() {
            Ok(resource) => SessionGuard::Acquired(resource),
            Err(err) => {
                log::warn!("-> Guarded acquisition failed: {err}");
                SessionGuard::Failed(err)
            }
        }
    }

    pub fn is_acquired(&self) -> bool {
        matches!(self, SessionGuard::Acquired(_))
    }

    /// The captured acquisition error, if any.
    pub fn failure(&self) -> Option<&DaqError> {
        match self {
            SessionGuard::Acquired(_) => None,
            SessionGuard::Failed(err) => Some(err),
        }
    }

    /// Yield the acquired resource, or re-raise the captured error.
    pub fn evaluate(self) -> AppResult<T> {
        match self {
            SessionGuard::Acquired(resource) => Ok(resource),
            SessionGuard::Failed(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquired_guard_evaluates_to_resource() {
        let guard = SessionGuard::acquire(|| Ok(42));
        assert!(guard.is_acquired());
        assert_eq!(guard.evaluate().unwrap(), 42);
    }

    #[test]
    fn test_failed_guard_captures_error() {
        let guard: SessionGuard<()> = SessionGuard::acquire(|| {
            Err(DaqError::Connection {
                address: "ASRL4::INSTR".into(),
                reason: "port unavailable".into(),
            })
        });
        assert!(!guard.is_acquired());
        assert!(guard.failure().is_some());
        let err = guard.evaluate().unwrap_err();
        assert!(matches!(err, DaqError::Connection { .. }));
    }

    #[test]
    fn test_dropping_failed_guard_does_not_panic() {
        let guard: SessionGuard<String> = SessionGuard::acquire(|| {
            Err(DaqError::AddressBusy("A1".into()))
        });
        drop(guard);
    }
}
