use std::cell::Cell;

/// Records that a non-fatal conversion error happened since the last check.
///
/// Each [`ExecContext`](crate::ExecContext) owns one, so independent VMs never observe
/// each other's errors. The VM polls [`check_and_clear`](Self::check_and_clear) at its
/// safe points and turns a `true` into a script-level error.
#[derive(Debug, Default)]
pub struct ErrorSignal {
    raised: Cell<bool>,
}

impl ErrorSignal {
    #[must_use]
    pub const fn new() -> Self {
        Self { raised: Cell::new(false) }
    }

    #[inline]
    pub fn signal(&self) {
        self.raised.set(true);
    }

    /// Reads the flag without clearing it.
    #[inline]
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.get()
    }

    /// Returns whether the signal was raised and resets it.
    #[inline]
    pub fn check_and_clear(&self) -> bool {
        self.raised.replace(false)
    }
}
