use crate::{
    error::{InternalError, RuntimeError},
    heap::Heap,
    report::{Reporter, TracingReporter},
    resource::{LimitedTracker, NoLimitTracker, ResourceLimits, ResourceTracker},
    signal::ErrorSignal,
};

/// Everything a conversion needs besides the value and its type: the heap the value
/// lives on, the channel errors are reported through, and the signal the VM polls.
///
/// One context per executing VM. Nothing in it is shared between contexts.
#[derive(Debug)]
pub struct ExecContext<T: ResourceTracker = NoLimitTracker, R: Reporter = TracingReporter> {
    heap: Heap<T>,
    reporter: R,
    signal: ErrorSignal,
}

impl ExecContext {
    /// A context with an unlimited heap that reports through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(Heap::default(), TracingReporter)
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Reporter> ExecContext<LimitedTracker, R> {
    /// A context whose heap enforces `limits`.
    pub fn with_limits(limits: ResourceLimits, reporter: R) -> Self {
        Self::with_parts(Heap::new(0, LimitedTracker::new(limits)), reporter)
    }
}

impl<T: ResourceTracker, R: Reporter> ExecContext<T, R> {
    pub fn with_parts(heap: Heap<T>, reporter: R) -> Self {
        Self {
            heap,
            reporter,
            signal: ErrorSignal::new(),
        }
    }

    #[inline]
    pub fn heap(&self) -> &Heap<T> {
        &self.heap
    }

    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap<T> {
        &mut self.heap
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }

    pub fn signal(&self) -> &ErrorSignal {
        &self.signal
    }

    /// Safe-point poll; see [`ErrorSignal::check_and_clear`].
    pub fn check_and_clear(&self) -> bool {
        self.signal.check_and_clear()
    }

    /// Reports a non-fatal error and raises the signal.
    pub fn runtime_error(&mut self, err: RuntimeError) {
        self.reporter.error(&err);
        self.signal.signal();
    }

    /// Reports an invariant violation and panics.
    ///
    /// # Panics
    /// Always.
    #[cold]
    pub fn fatal(&mut self, err: InternalError) -> ! {
        self.reporter.internal_error(&err);
        panic!("internal error: {err}");
    }

    pub fn into_parts(self) -> (Heap<T>, R) {
        (self.heap, self.reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{report::CollectReporter, types::TypeTag};

    #[test]
    fn runtime_error_reports_and_signals() {
        let mut cx = ExecContext::with_parts(Heap::default(), CollectReporter::new());
        cx.runtime_error(RuntimeError::ValueNotSet);
        assert_eq!(cx.reporter().errors(), [RuntimeError::ValueNotSet]);
        assert!(cx.check_and_clear());
        assert!(!cx.check_and_clear());
    }

    #[test]
    #[should_panic(expected = "internal error: bad type in ZVal constructor: void")]
    fn fatal_panics_with_message() {
        let mut cx = ExecContext::with_parts(Heap::default(), CollectReporter::new());
        cx.fatal(InternalError::BadLowerType { tag: TypeTag::Void });
    }

    #[test]
    fn contexts_do_not_share_signals() {
        let mut a = ExecContext::new();
        let b = ExecContext::new();
        a.runtime_error(RuntimeError::ValueNotSet);
        assert!(!b.check_and_clear());
        assert!(a.check_and_clear());
    }
}
