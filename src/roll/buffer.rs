use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::RollResult;

/// Latest face values of a session, shared between the session task and
/// whoever renders them.
///
/// Every access goes through one mutex owned by this buffer, so a reader
/// sees either the previous result or the new one, never a mix.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    latest: Mutex<Option<RollResult>>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the first tick has been written.
    pub fn read(&self) -> Option<RollResult> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Only the owning session writes.
    pub(crate) fn write(&self, result: RollResult) {
        *self.lock() = Some(result);
    }

    // Critical sections are a single assignment or clone, so a poisoned
    // lock still holds a whole result.
    fn lock(&self) -> MutexGuard<'_, Option<RollResult>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
