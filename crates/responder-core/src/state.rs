use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide auto-reply switch.
///
/// Clones share the same flag. Only the owner command path writes it; every
/// message reads the value current at the time it is admitted.
#[derive(Debug, Clone, Default)]
pub struct AutoReplyState {
    active: Arc<AtomicBool>,
}

impl AutoReplyState {
    #[must_use]
    pub fn new(initial: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(initial)),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Sets the flag and returns the previous value.
    pub fn set(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let state = AutoReplyState::new(false);
        let reader = state.clone();
        assert!(!state.set(true));
        assert!(reader.is_active());
    }
}
