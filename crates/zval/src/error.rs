use std::fmt;

use crate::{heap::BoxedKind, resource::ResourceError, types::TypeTag};

/// A type-system invariant was violated.
///
/// These indicate a bug in whatever produced the cell or the value (compiler, VM,
/// host binding), never a condition a script can trigger. They are reported through the
/// context's [`Reporter`](crate::Reporter) and then abort the current thread with a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// An absent value was lowered into a type with no null state.
    AbsentValue { tag: TypeTag },
    /// The value's runtime type cannot be stored under the target type.
    TypeInconsistency { target: TypeTag, actual: TypeTag },
    /// The value passed the type check but its payload is not of the kind the target
    /// type stores.
    KindMismatch { target: TypeTag, kind: BoxedKind },
    /// Lowering into error, timer, union or void.
    BadLowerType { tag: TypeTag },
    /// Raising from error, timer, union or void.
    BadRaiseType { tag: TypeTag },
    /// A cell written into a slot of a different type, by a store or a slot copy.
    SlotTypeMismatch { src: TypeTag, dst: TypeTag },
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbsentValue { tag } => write!(f, "absent value for unmanaged type {tag} in ZVal constructor"),
            Self::TypeInconsistency { target, actual } => {
                write!(f, "type inconsistency in ZVal constructor: {actual} stored as {target}")
            }
            Self::KindMismatch { target, kind } => {
                write!(f, "type inconsistency in ZVal constructor: {kind} value stored as {target}")
            }
            Self::BadLowerType { tag } => write!(f, "bad type in ZVal constructor: {tag}"),
            Self::BadRaiseType { tag } => write!(f, "bad ret type return tag: {tag}"),
            Self::SlotTypeMismatch { src, dst } => write!(f, "{src} cell stored into {dst} slot"),
        }
    }
}

impl std::error::Error for InternalError {}

/// A script-level runtime error.
///
/// Reported, recorded on the context's [`ErrorSignal`](crate::ErrorSignal), and otherwise
/// non-fatal: the operation that detected it still returns a best-effort result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A vector's element type disagrees with the slot's declared element type.
    VectorTypeClash {
        expected: TypeTag,
        actual: TypeTag,
        /// Rendering of the offending vector.
        value: String,
    },
    /// A cell was read that never held a valid value of the requested type.
    ValueNotSet,
    /// A vector write addressed an element beyond what can be allocated.
    VectorIndexTooLarge { index: usize },
    /// A box could not be allocated.
    Resource(ResourceError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VectorTypeClash {
                expected,
                actual,
                value,
            } => write!(f, "vector type clash: {expected} vs. {actual} ({value})"),
            Self::ValueNotSet => f.write_str("value used but not set"),
            Self::VectorIndexTooLarge { index } => write!(f, "vector index {index} too large"),
            Self::Resource(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RuntimeError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clash_message_names_both_types() {
        let err = RuntimeError::VectorTypeClash {
            expected: TypeTag::String,
            actual: TypeTag::Int,
            value: "[1, 2]".to_owned(),
        };
        assert_eq!(err.to_string(), "vector type clash: string vs. int ([1, 2])");
    }

    #[test]
    fn resource_error_is_the_source() {
        use std::error::Error;

        let err = RuntimeError::from(ResourceError::Allocation { limit: 1, count: 2 });
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "allocation limit exceeded: 2 > 1");
    }
}
