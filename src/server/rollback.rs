//! Compensation stack for multi-step requests.
//!
//! Each completed step that reserved or allocated something pushes the
//! action that undoes it. If the request returns early (an error propagated
//! with `?`, or the future is dropped), the actions run in reverse order when
//! the [`Rollback`] is dropped. A successful request calls
//! [`Rollback::commit`] to discard them.
//!
//! Undo actions never replace the request's error: failures are logged and
//! the remaining actions still run.

use crate::error::Result;
use tracing::{debug, warn};

type UndoFn<'a> = Box<dyn FnOnce() -> Result<()> + Send + 'a>;

/// Reverse-order undo actions for one request.
pub struct Rollback<'a> {
    operation: String,
    actions: Vec<(&'static str, UndoFn<'a>)>,
}

impl<'a> Rollback<'a> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            actions: Vec::new(),
        }
    }

    /// Registers the undo action for a completed step.
    pub fn push(&mut self, step: &'static str, undo: impl FnOnce() -> Result<()> + Send + 'a) {
        self.actions.push((step, Box::new(undo)));
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Keeps every step; nothing is undone.
    pub fn commit(mut self) {
        self.actions.clear();
    }

    fn unwind(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        debug!(
            "rolling back {} step(s) of {}",
            self.actions.len(),
            self.operation
        );
        while let Some((step, undo)) = self.actions.pop() {
            if let Err(e) = undo() {
                warn!("{}: undo of {:?} failed: {}", self.operation, step, e);
            }
        }
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        self.unwind();
    }
}

impl std::fmt::Debug for Rollback<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rollback")
            .field("operation", &self.operation)
            .field(
                "steps",
                &self.actions.iter().map(|(step, _)| *step).collect::<Vec<_>>(),
            )
            .finish()
    }
}
