//! Error reporting channel.
//!
//! Conversions never return errors to their caller. Instead they hand every problem to
//! a [`Reporter`] chosen when the [`ExecContext`](crate::ExecContext) is built:
//!
//! | Reporter | Purpose |
//! |----------|---------|
//! | [`TracingReporter`] | Emits `tracing` events (default) |
//! | [`CollectReporter`] | Keeps every message, for hosts and tests that inspect them |
//! | [`NoReport`] | Discards everything |

use crate::error::{InternalError, RuntimeError};

/// Sink for errors detected while converting values.
///
/// Reporting is separate from signalling: a reporter only records the message, and the
/// context sets its [`ErrorSignal`](crate::ErrorSignal) or panics afterwards.
pub trait Reporter: std::fmt::Debug {
    /// A non-fatal runtime error. Execution continues after this returns.
    fn error(&mut self, err: &RuntimeError);

    /// A fatal invariant violation. The caller panics immediately after this returns.
    fn internal_error(&mut self, err: &InternalError);
}

/// Default reporter: forwards to the `tracing` subscriber installed by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn error(&mut self, err: &RuntimeError) {
        tracing::error!(target: "zval", "{err}");
    }

    fn internal_error(&mut self, err: &InternalError) {
        tracing::error!(target: "zval", internal = true, "internal error: {err}");
    }
}

/// Records every reported error in order.
#[derive(Debug, Clone, Default)]
pub struct CollectReporter {
    errors: Vec<RuntimeError>,
    internal_errors: Vec<InternalError>,
}

impl CollectReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime errors reported so far.
    #[must_use]
    pub fn errors(&self) -> &[RuntimeError] {
        &self.errors
    }

    #[must_use]
    pub fn internal_errors(&self) -> &[InternalError] {
        &self.internal_errors
    }

    /// Takes the runtime errors, leaving the reporter empty.
    pub fn take_errors(&mut self) -> Vec<RuntimeError> {
        std::mem::take(&mut self.errors)
    }
}

impl Reporter for CollectReporter {
    fn error(&mut self, err: &RuntimeError) {
        self.errors.push(err.clone());
    }

    fn internal_error(&mut self, err: &InternalError) {
        self.internal_errors.push(err.clone());
    }
}

/// Reporter that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReport;

impl Reporter for NoReport {
    #[inline]
    fn error(&mut self, _err: &RuntimeError) {}

    #[inline]
    fn internal_error(&mut self, _err: &InternalError) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTag;

    #[test]
    fn collect_reporter_keeps_order() {
        let mut reporter = CollectReporter::new();
        reporter.error(&RuntimeError::ValueNotSet);
        reporter.internal_error(&InternalError::BadLowerType { tag: TypeTag::Void });
        reporter.error(&RuntimeError::ValueNotSet);
        assert_eq!(reporter.errors().len(), 2);
        assert_eq!(
            reporter.internal_errors(),
            [InternalError::BadLowerType { tag: TypeTag::Void }]
        );
        assert_eq!(reporter.take_errors().len(), 2);
        assert!(reporter.errors().is_empty());
    }
}
