//! One-shot synchronization latch.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A cloneable one-shot latch: waiters block until some clone opens it.
///
/// Used to acknowledge stage resets and to signal worker exit. Opening an
/// already-open latch is a no-op, so control operations can release caller
/// latches unconditionally and nobody ever hangs.
#[derive(Clone, Default)]
pub struct Latch {
    inner: Arc<LatchInner>,
}

#[derive(Default)]
struct LatchInner {
    open: Mutex<bool>,
    signal: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release all current and future waiters.
    pub fn open(&self) {
        let mut open = self.inner.open.lock();
        *open = true;
        self.inner.signal.notify_all();
    }

    /// Block until the latch is opened.
    pub fn wait(&self) {
        let mut open = self.inner.open.lock();
        while !*open {
            self.inner.signal.wait(&mut open);
        }
    }

    pub fn is_open(&self) -> bool {
        *self.inner.open.lock()
    }
}

impl std::fmt::Debug for Latch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latch").field("open", &self.is_open()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_open_before_wait_does_not_block() {
        let latch = Latch::new();
        latch.open();
        latch.wait();
        assert!(latch.is_open());
    }

    #[test]
    fn test_wait_blocks_until_opened() {
        let latch = Latch::new();
        let opener = latch.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            opener.open();
        });

        latch.wait();
        assert!(latch.is_open());
        handle.join().unwrap();
    }

    #[test]
    fn test_double_open_is_harmless() {
        let latch = Latch::new();
        latch.open();
        latch.open();
        assert!(latch.is_open());
    }
}
