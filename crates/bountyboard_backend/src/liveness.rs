use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared flag guarding an in-flight projection.
/// Once cancelled, a result that arrives later is dropped instead of committed.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    cancelled: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    /// Hand the value back only if the consumer is still around
    pub fn commit<T>(&self, value: T) -> Option<T> {
        if self.is_live() {
            Some(value)
        } else {
            None
        }
    }
}

/// Keeps only the newest request live: starting a new one cancels the previous
#[derive(Debug, Default)]
pub struct Latest {
    current: Liveness,
}

impl Latest {
    pub fn next(&mut self) -> Liveness {
        self.current.cancel();
        self.current = Liveness::new();
        self.current.clone()
    }

    pub fn cancel(&self) {
        self.current.cancel();
    }
}
