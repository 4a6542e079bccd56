#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadline and cancellation signal carried by one request into every
/// external call it makes. Clones share the cancellation flag.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn with_budget(budget: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(budget),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.remaining().is_some_and(|r| r.is_zero())
    }

    /// Timeout for the next external call, capped by `cap`. Zero once the
    /// request is done.
    pub fn call_timeout(&self, cap: Duration) -> Duration {
        if self.is_cancelled() {
            return Duration::ZERO;
        }
        match self.remaining() {
            Some(remaining) => remaining.min(cap),
            None => cap,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_ctx_01_call_timeout_is_capped_by_budget() {
        let ctx = RequestContext::with_budget(Duration::from_millis(50));
        assert!(ctx.call_timeout(Duration::from_secs(5)) <= Duration::from_millis(50));
        assert_eq!(
            RequestContext::unbounded().call_timeout(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn at_ctx_02_cancel_is_shared_by_clones() {
        let ctx = RequestContext::unbounded();
        let clone = ctx.clone();
        assert!(!clone.is_done());
        ctx.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.is_done());
        assert_eq!(clone.call_timeout(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn at_ctx_03_zero_budget_is_done() {
        let ctx = RequestContext::with_budget(Duration::ZERO);
        assert!(ctx.is_done());
        assert_eq!(ctx.call_timeout(Duration::from_secs(1)), Duration::ZERO);
    }
}
