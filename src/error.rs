//! Error types for tapkey_core.
//!
//! The event-processing hot path (`Dispatcher::process` and the timeout
//! callbacks) is infallible by construction: anything that would otherwise be
//! an error degrades to a documented fallback (queue overflow degrades to
//! PLAIN pass-through, unknown releases pass through untouched). `CoreError`
//! exists only for the small set of fallible setup calls.

/// Result alias used by the crate's fallible setup APIs.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced outside the hot event-processing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The behavior table has no remaining capacity for another entry.
    #[error("behavior table is at capacity ({capacity})")]
    BehaviorTableFull {
        /// The fixed capacity that was exceeded.
        capacity: usize,
    },
    /// A duplicate keycode was registered in the behavior table.
    #[error("keycode {0:?} is already registered")]
    DuplicateBehavior(crate::behavior::Keycode),
}
