//! Trace-context capture for request submission.
//!
//! The active trace context is captured once, when a call is submitted, and
//! carried through every retry of that call. Retries therefore stay traced
//! even when they run on timer tasks long after the submitting scope is gone.

use std::cell::RefCell;

use alder_client_api::TraceContext;

thread_local! {
    static CURRENT_TRACE: RefCell<Option<TraceContext>> = const { RefCell::new(None) };
}

/// The trace context installed for the current thread, if any.
pub fn current_trace_context() -> Option<TraceContext> {
    CURRENT_TRACE.with(|current| current.borrow().clone())
}

/// Installs a trace context for the lifetime of the guard.
///
/// Nested scopes restore the previous context when dropped.
#[derive(Debug)]
pub struct TraceScope {
    previous: Option<TraceContext>,
}

impl TraceScope {
    /// Install `context` as the current trace context.
    pub fn enter(context: TraceContext) -> Self {
        let previous = CURRENT_TRACE.with(|current| current.borrow_mut().replace(context));
        Self { previous }
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TRACE.with(|current| *current.borrow_mut() = previous);
    }
}
