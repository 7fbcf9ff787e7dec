//! Applied external mutations
//!
//! Scripts change the outside world through actions. Every applied action is
//! kept, together with its description, so tooling can list what a run did.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// An external mutation that can describe itself
pub trait Action: Send {
    /// Perform the mutation
    fn apply(&mut self);

    /// Human-readable summary, logged when the action is applied
    fn describe(&self) -> String;
}

/// An action that has already been applied
pub struct AppliedAction {
    pub description: String,
    pub action: Box<dyn Action>,
}

impl fmt::Debug for AppliedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppliedAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Append-only record of applied actions.
///
/// Cloning yields another handle to the same log.
#[derive(Clone, Default)]
pub struct ActionLog {
    entries: Arc<Mutex<Vec<AppliedAction>>>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the action, then record it
    pub fn apply(&self, mut action: Box<dyn Action>) {
        let description = action.describe();
        tracing::info!("{}", description);
        action.apply();

        // Not held while applying: an action may apply further actions.
        self.entries.lock().push(AppliedAction { description, action });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Descriptions in application order
    pub fn descriptions(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.description.clone())
            .collect()
    }

    /// Inspect the applied actions without copying them
    pub fn with_entries<R>(&self, f: impl FnOnce(&[AppliedAction]) -> R) -> R {
        f(&self.entries.lock())
    }
}

impl fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionLog").field("len", &self.len()).finish()
    }
}
