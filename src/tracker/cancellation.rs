use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Liveness flag shared between a screen and its pending operations.
///
/// Once cancelled, completions must not touch state owned by the screen.
#[derive(Clone, Debug, Default)]
pub struct LivenessToken {
    cancelled: Arc<AtomicBool>,
}

impl LivenessToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        !self.is_cancelled()
    }
}
