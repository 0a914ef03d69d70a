//! The type-tag-free value cell.
//!
//! A [`ZVal`] is a single 64-bit word. What those bits mean is decided entirely by the
//! static [`Type`] the cell was written under, which the caller must supply on every
//! read. Keeping the tag outside the cell is what lets a frame hold a flat `Vec<ZVal>`
//! and lets the interpreter copy slots without branching on a discriminant.
//!
//! Encoding by [`CellRepr`]:
//!
//! ```text
//! Int        two's-complement i64
//! Unsigned   u64
//! Double     IEEE 754 bits
//! Interned   HeapId + 1                        (0 never written)
//! Managed    HeapId + 1                        (0 = absent)
//! Any        (BoxedKind + 1) << 56 | HeapId + 1 (0 = absent)
//! ```
//!
//! Only slots typed `any` pay for a discriminant, and they keep it in bits that a heap
//! index never reaches, so every cell stays 8 bytes.

use std::fmt;

use crate::{
    classify::{CellRepr, cell_repr},
    heap::{BoxedKind, Heap, HeapId},
    resource::ResourceTracker,
    types::{Type, TypeTag},
};

/// Number of low bits that hold a heap index.
const ID_BITS: u32 = 48;
/// Mask for the heap-index payload.
const ID_MASK: u64 = (1 << ID_BITS) - 1;
/// Bit offset of the kind byte in `any` cells.
const KIND_SHIFT: u32 = 56;

/// Largest heap index a cell can encode.
pub(crate) const MAX_HEAP_INDEX: usize = (ID_MASK - 1) as usize;

/// A compact, untagged value cell.
///
/// `Default` yields numeric zero, which reads as `0`, `0.0` or `false` under a
/// numeric type and as an absent reference under a managed one.
///
/// Copying a cell copies bits only. For managed types the copy is a *borrowed* alias of
/// the same reference; whoever wants a second owning reference must acquire it through
/// the heap (see [`Frame::copy_slot`](crate::Frame::copy_slot)).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ZVal(u64);

const _: () = assert!(std::mem::size_of::<ZVal>() == 8);

/// The reference held by a cell written under `any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyRef {
    pub kind: BoxedKind,
    pub id: HeapId,
}

/// A cell's contents interpreted under a specific type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellView {
    Int(i64),
    Count(u64),
    Double(f64),
    /// A borrowed reference to an interned value. `None` means the slot was never written.
    Interned(Option<HeapId>),
    /// An owning reference, or `None` for an absent value.
    Managed(Option<HeapId>),
    /// An owning reference tagged with its concrete kind, or `None` for an absent value.
    Any(Option<AnyRef>),
    /// The bits do not form a valid reference under the requested type. Only reachable
    /// when a cell is read under a type it was not written under.
    Undecodable(u64),
    /// The requested type can never be stored in a cell.
    Unstorable(TypeTag),
}

impl ZVal {
    #[inline]
    #[must_use]
    pub const fn from_int(value: i64) -> Self {
        Self(value.cast_unsigned())
    }

    #[inline]
    #[must_use]
    pub const fn from_bool(value: bool) -> Self {
        Self(value as u64)
    }

    #[inline]
    #[must_use]
    pub const fn from_count(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn from_double(value: f64) -> Self {
        Self(value.to_bits())
    }

    /// Encodes a concrete managed or interned reference.
    #[inline]
    pub(crate) const fn from_id(id: Option<HeapId>) -> Self {
        match id {
            Some(id) => Self(id.index() as u64 + 1),
            None => Self(0),
        }
    }

    /// Encodes a reference stored under `any`.
    #[inline]
    pub(crate) const fn from_any(any: AnyRef) -> Self {
        Self(((any.kind as u64 + 1) << KIND_SHIFT) | (any.id.index() as u64 + 1))
    }

    /// Interprets the cell under `ty`.
    ///
    /// `ty` must have the same tag as the type the cell was written under (or be `any`
    /// when it was written under `any`). A mismatched type yields garbage numbers or
    /// [`CellView::Undecodable`], never undefined behaviour.
    #[must_use]
    pub fn view(self, ty: &Type) -> CellView {
        match cell_repr(ty.tag()) {
            CellRepr::Int => CellView::Int(self.0.cast_signed()),
            CellRepr::Unsigned => CellView::Count(self.0),
            CellRepr::Double => CellView::Double(f64::from_bits(self.0)),
            CellRepr::Interned => match self.decode_id() {
                Ok(id) => CellView::Interned(id),
                Err(bits) => CellView::Undecodable(bits),
            },
            CellRepr::Managed => match self.decode_id() {
                Ok(id) => CellView::Managed(id),
                Err(bits) => CellView::Undecodable(bits),
            },
            CellRepr::Any => match self.decode_any() {
                Ok(any) => CellView::Any(any),
                Err(bits) => CellView::Undecodable(bits),
            },
            CellRepr::Unstorable => CellView::Unstorable(ty.tag()),
        }
    }

    /// Reads a bool, int or enum cell.
    #[inline]
    #[must_use]
    pub fn as_int(self, ty: &Type) -> i64 {
        debug_assert_eq!(cell_repr(ty.tag()), CellRepr::Int, "as_int on a {} cell", ty.tag());
        self.0.cast_signed()
    }

    #[inline]
    #[must_use]
    pub fn as_bool(self, ty: &Type) -> bool {
        self.as_int(ty) != 0
    }

    /// Reads a count cell.
    #[inline]
    #[must_use]
    pub fn as_count(self, ty: &Type) -> u64 {
        debug_assert_eq!(cell_repr(ty.tag()), CellRepr::Unsigned, "as_count on a {} cell", ty.tag());
        self.0
    }

    /// Reads a double, time or interval cell.
    #[inline]
    #[must_use]
    pub fn as_double(self, ty: &Type) -> f64 {
        debug_assert_eq!(cell_repr(ty.tag()), CellRepr::Double, "as_double on a {} cell", ty.tag());
        f64::from_bits(self.0)
    }

    /// Returns the owning reference held by a managed cell, if any.
    ///
    /// `None` for absent values and for every unmanaged type, including ports whose
    /// interned reference is borrowed.
    #[must_use]
    pub fn managed_id(self, ty: &Type) -> Option<HeapId> {
        match self.view(ty) {
            CellView::Managed(id) => id,
            CellView::Any(any) => any.map(|any| any.id),
            _ => None,
        }
    }

    /// Releases the reference this cell owns under `ty`, if it owns one.
    ///
    /// The cell itself is left untouched; the caller must not read it as managed again.
    pub fn release_if_managed(self, ty: &Type, heap: &mut Heap<impl ResourceTracker>) {
        if let Some(id) = self.managed_id(ty) {
            heap.dec_ref(id);
        }
    }

    fn decode_id(self) -> Result<Option<HeapId>, u64> {
        match self.0 {
            0 => Ok(None),
            bits if bits <= ID_MASK => Ok(Some(HeapId::from_index((bits - 1) as usize))),
            bits => Err(bits),
        }
    }

    fn decode_any(self) -> Result<Option<AnyRef>, u64> {
        if self.0 == 0 {
            return Ok(None);
        }
        let kind_byte = (self.0 >> KIND_SHIFT) as u8;
        let reserved = (self.0 >> ID_BITS) & 0xFF;
        let id_bits = self.0 & ID_MASK;
        if kind_byte == 0 || reserved != 0 || id_bits == 0 {
            return Err(self.0);
        }
        let kind = BoxedKind::from_repr(kind_byte - 1).ok_or(self.0)?;
        Ok(Some(AnyRef {
            kind,
            id: HeapId::from_index((id_bits - 1) as usize),
        }))
    }
}

impl fmt::Debug for ZVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZVal({:#018x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn default_is_numeric_zero() {
        let zv = ZVal::default();
        assert_eq!(zv.as_int(&Type::base(TypeTag::Int)), 0);
        assert_eq!(zv.as_count(&Type::base(TypeTag::Count)), 0);
        assert!(zv.as_double(&Type::base(TypeTag::Double)) == 0.0);
        assert!(!zv.as_bool(&Type::base(TypeTag::Bool)));
        assert_eq!(zv.view(&Type::base(TypeTag::String)), CellView::Managed(None));
        assert_eq!(zv.view(&Type::base(TypeTag::Any)), CellView::Any(None));
    }

    #[test]
    fn negative_int_round_trips() {
        let zv = ZVal::from_int(-42);
        assert_eq!(zv.as_int(&Type::base(TypeTag::Int)), -42);
    }

    #[test]
    fn any_encoding_keeps_kind_and_id() {
        let any = AnyRef {
            kind: BoxedKind::Str,
            id: HeapId::from_index(12345),
        };
        let zv = ZVal::from_any(any);
        assert_eq!(zv.view(&Type::base(TypeTag::Any)), CellView::Any(Some(any)));
        assert_eq!(zv.managed_id(&Type::base(TypeTag::Any)), Some(any.id));
    }

    #[test]
    fn every_kind_survives_any_encoding() {
        use strum::IntoEnumIterator;

        let any_ty = Type::base(TypeTag::Any);
        for kind in BoxedKind::iter() {
            let any = AnyRef {
                kind,
                id: HeapId::from_index(MAX_HEAP_INDEX),
            };
            assert_eq!(ZVal::from_any(any).view(&any_ty), CellView::Any(Some(any)));
        }
    }

    #[test]
    fn any_cell_read_as_concrete_is_undecodable() {
        let zv = ZVal::from_any(AnyRef {
            kind: BoxedKind::Vector,
            id: HeapId::from_index(0),
        });
        assert!(matches!(
            zv.view(&Type::base(TypeTag::Vector)),
            CellView::Undecodable(_)
        ));
    }

    #[test]
    fn numeric_cell_read_as_any_is_undecodable() {
        let zv = ZVal::from_int(-1);
        assert!(matches!(zv.view(&Type::base(TypeTag::Any)), CellView::Undecodable(_)));
    }

    #[test]
    fn port_cell_reads_as_borrowed() {
        let zv = ZVal::from_id(Some(HeapId::from_index(3)));
        let port = Type::base(TypeTag::Port);
        assert_eq!(zv.view(&port), CellView::Interned(Some(HeapId::from_index(3))));
        assert_eq!(zv.managed_id(&port), None);
    }

    #[test]
    fn unstorable_tags_never_decode() {
        for tag in [TypeTag::Error, TypeTag::Timer, TypeTag::Union, TypeTag::Void] {
            assert_eq!(ZVal::default().view(&Type::base(tag)), CellView::Unstorable(tag));
        }
    }

    #[test]
    fn equality_is_bitwise() {
        assert_eq!(ZVal::from_double(1.5), ZVal::from_double(1.5));
        assert_ne!(ZVal::from_double(0.0), ZVal::from_double(-0.0));
        assert_eq!(ZVal::from_count(7), ZVal::from_int(7));
    }
}
