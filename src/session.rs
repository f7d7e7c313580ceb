//! Per-operation session state shared by every store call

use crate::Error;

/// State carried through one logical topology operation.
///
/// Create it (or call [`Session::begin_operation`]) when a top-level
/// operation starts. It records the last failure for the engine's host and
/// whether the store has been written to, which decides whether reads may
/// reuse cached statements.
#[derive(Debug, Default)]
pub struct Session {
    last_error: Option<String>,
    data_changed: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the mutation flag at the start of a top-level operation
    pub fn begin_operation(&mut self) {
        self.data_changed = false;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn record_error(&mut self, err: &Error) {
        self.last_error = Some(err.to_string());
    }

    pub fn data_changed(&self) -> bool {
        self.data_changed
    }

    /// Flag the store as mutated; returns true on the first mutation
    pub fn mark_changed(&mut self) -> bool {
        let first = !self.data_changed;
        self.data_changed = true;
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_changed_reports_first_transition() {
        let mut session = Session::new();
        assert!(!session.data_changed());
        assert!(session.mark_changed());
        assert!(!session.mark_changed());
        session.begin_operation();
        assert!(!session.data_changed());
    }

    #[test]
    fn test_records_last_error() {
        let mut session = Session::new();
        assert!(session.last_error().is_none());
        session.record_error(&Error::InvalidInput("first".into()));
        session.record_error(&Error::LimitExceeded(3));
        assert_eq!(session.last_error(), Some("Max traversing limit hit: 3"));
    }
}
