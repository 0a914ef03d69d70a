use std::fmt;

/// Error returned when a resource limit is exceeded while allocating boxed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Trait for tracking heap resource usage.
///
/// The heap is generic over its tracker; with [`NoLimitTracker`] every check compiles
/// away to nothing.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded.
    ///
    /// # Arguments
    /// * `get_size` - Lazily computes the approximate size in bytes of the allocation
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called before a live heap entry grows in place by `bytes`.
    ///
    /// The growth is charged against the memory limit only; it is not a new allocation.
    fn on_grow(&mut self, _bytes: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Called when a heap entry is freed, or when previously charged growth is returned.
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Returns the total number of allocations tracked, if this tracker records them.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Returns the current approximate memory usage in bytes, if tracked.
    fn current_memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// Tracker that enforces nothing. The default for every heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _get_size: impl FnOnce() -> usize) {}
}

/// Configurable limits for a [`LimitedTracker`].
///
/// All limits are optional; `ResourceLimits::default()` applies none.
///
/// ```
/// use zval::ResourceLimits;
///
/// let limits = ResourceLimits::new().max_allocations(1_000).max_memory(1 << 20);
/// assert_eq!(limits.allocations(), Some(1_000));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    max_allocations: Option<usize>,
    max_memory: Option<usize>,
}

impl ResourceLimits {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_allocations: None,
            max_memory: None,
        }
    }

    /// Caps the number of live-or-freed allocations made over the heap's lifetime.
    #[must_use]
    pub const fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Caps the approximate number of bytes held by live heap entries.
    #[must_use]
    pub const fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }

    #[must_use]
    pub const fn allocations(&self) -> Option<usize> {
        self.max_allocations
    }

    #[must_use]
    pub const fn memory(&self) -> Option<usize> {
        self.max_memory
    }
}

/// Tracker that enforces [`ResourceLimits`].
#[derive(Debug, Clone, Default)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    allocation_count: usize,
    current_memory: usize,
}

impl LimitedTracker {
    #[must_use]
    pub const fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            current_memory: 0,
        }
    }

    #[must_use]
    pub const fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.limits.max_allocations
            && self.allocation_count >= limit
        {
            return Err(ResourceError::Allocation {
                limit,
                count: self.allocation_count + 1,
            });
        }
        let size = get_size();
        if let Some(limit) = self.limits.max_memory {
            let used = self.current_memory + size;
            if used > limit {
                return Err(ResourceError::Memory { limit, used });
            }
        }
        self.allocation_count += 1;
        self.current_memory += size;
        Ok(())
    }

    fn on_grow(&mut self, bytes: usize) -> Result<(), ResourceError> {
        let used = self.current_memory.saturating_add(bytes);
        if let Some(limit) = self.limits.max_memory
            && used > limit
        {
            return Err(ResourceError::Memory { limit, used });
        }
        self.current_memory = used;
        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.current_memory = self.current_memory.saturating_sub(get_size());
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        Some(self.current_memory)
    }
}
