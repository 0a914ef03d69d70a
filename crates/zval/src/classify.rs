//! Managed/unmanaged classification of type tags.
//!
//! Whether a slot owns a heap reference is decided purely from its static type, never
//! from the cell itself. Both functions here are total over [`TypeTag`] and deliberately
//! avoid wildcard arms.

use crate::types::{Type, TypeTag};

/// How a cell stores values of a given tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellRepr {
    /// Signed 64-bit integer: bool, int, enum.
    Int,
    /// Unsigned 64-bit integer: count.
    Unsigned,
    /// 64-bit float: double, time, interval.
    Double,
    /// Borrowed id of a heap-interned value (ports). The intern pool owns the reference,
    /// so the slot owner never releases it.
    Interned,
    /// Owning id of a boxed value of one concrete kind.
    Managed,
    /// Owning id plus the concrete kind of the boxed value.
    Any,
    /// Tags no cell may ever hold: error, timer, union, void.
    Unstorable,
}

/// Returns the cell representation used for `tag`.
#[must_use]
pub const fn cell_repr(tag: TypeTag) -> CellRepr {
    match tag {
        TypeTag::Bool | TypeTag::Int | TypeTag::Enum => CellRepr::Int,
        TypeTag::Count => CellRepr::Unsigned,
        TypeTag::Double | TypeTag::Time | TypeTag::Interval => CellRepr::Double,
        TypeTag::Port => CellRepr::Interned,
        TypeTag::Addr
        | TypeTag::File
        | TypeTag::Func
        | TypeTag::List
        | TypeTag::Opaque
        | TypeTag::Pattern
        | TypeTag::Record
        | TypeTag::String
        | TypeTag::Subnet
        | TypeTag::Table
        | TypeTag::Type
        | TypeTag::Vector => CellRepr::Managed,
        TypeTag::Any => CellRepr::Any,
        TypeTag::Error | TypeTag::Timer | TypeTag::Union | TypeTag::Void => CellRepr::Unstorable,
    }
}

/// True if cells of this tag hold an owning heap reference that the slot owner must
/// release before the slot is overwritten or discarded.
#[must_use]
pub const fn is_managed_tag(tag: TypeTag) -> bool {
    matches!(cell_repr(tag), CellRepr::Managed | CellRepr::Any)
}

/// True if values of `ty` are managed; see [`is_managed_tag`].
#[inline]
#[must_use]
pub fn is_managed(ty: &Type) -> bool {
    is_managed_tag(ty.tag())
}
