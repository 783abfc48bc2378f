//! Search control: stop flag, ponder state and the flags the main worker
//! shares with the helpers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Signals shared by every worker of one search and by the caller.
///
/// The stop flag is polled at every node. The caller may raise it at any
/// time through [`stop`](SearchControl::stop) or through its own clone of
/// the `Arc`, including before the search starts. The flag belongs to the
/// caller: a search never lowers it, so lower it with
/// [`reset`](SearchControl::reset) before reusing a control. Pondering
/// is switched off by [`ponderhit`](SearchControl::ponderhit),
/// after which the main worker's clock checks take effect.
#[derive(Debug)]
pub struct SearchControl {
    stopped: Arc<AtomicBool>,
    ponder: AtomicBool,
    aborted: AtomicBool,
    increase_depth: AtomicBool,
}

impl SearchControl {
    pub fn new(stopped: Arc<AtomicBool>) -> Self {
        Self {
            stopped,
            ponder: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            increase_depth: AtomicBool::new(true),
        }
    }

    /// Reset the per-search flags. The stop flag is left as the caller set it.
    pub(crate) fn start(&self, ponder: bool) {
        self.ponder.store(ponder, Ordering::Release);
        self.aborted.store(false, Ordering::Relaxed);
        self.increase_depth.store(true, Ordering::Relaxed);
    }

    /// Lower the stop flag. Call before handing the control to a new search.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    /// Ask every worker to stop as soon as possible.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// The opponent played the expected move: switch to a normal timed search.
    pub fn ponderhit(&self) {
        self.ponder.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_pondering(&self) -> bool {
        self.ponder.load(Ordering::Acquire)
    }

    /// Stop raised by the clock or a node limit, as opposed to a caller stop.
    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
        self.stop();
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn increase_depth(&self) -> bool {
        self.increase_depth.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_increase_depth(&self, value: bool) {
        self.increase_depth.store(value, Ordering::Relaxed);
    }

    /// Reference to the shared stop flag.
    pub fn stop_flag(&self) -> &Arc<AtomicBool> {
        &self.stopped
    }
}

impl Default for SearchControl {
    fn default() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_stop_is_seen() {
        let flag = Arc::new(AtomicBool::new(false));
        let control = SearchControl::new(Arc::clone(&flag));
        assert!(!control.is_stopped());
        flag.store(true, Ordering::Relaxed);
        assert!(control.is_stopped());
        assert!(!control.is_aborted());
    }

    #[test]
    fn start_resets_flags() {
        let control = SearchControl::default();
        control.abort();
        control.set_increase_depth(false);
        assert!(control.is_stopped());
        assert!(control.is_aborted());

        control.start(true);
        assert!(control.is_stopped());
        assert!(!control.is_aborted());
        assert!(control.increase_depth());
        assert!(control.is_pondering());

        control.ponderhit();
        assert!(!control.is_pondering());

        control.reset();
        assert!(!control.is_stopped());
    }

    #[test]
    fn start_keeps_an_early_stop() {
        let flag = Arc::new(AtomicBool::new(false));
        let control = SearchControl::new(Arc::clone(&flag));
        flag.store(true, Ordering::Release);
        control.start(false);
        assert!(control.is_stopped());
    }
}
