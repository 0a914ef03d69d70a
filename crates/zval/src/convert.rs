//! Conversion between boxed values and cells.
//!
//! [`ZVal::from_val`] lowers a boxed value into a cell under a static type and
//! [`ZVal::to_val`] raises it back. Ownership crosses the boundary explicitly:
//!
//! * lowering a managed value moves the caller's reference into the cell;
//! * lowering an unmanaged value copies the primitive out and releases the box;
//! * raising never consumes the cell: managed cells hand out a new reference to the same
//!   value, unmanaged cells are boxed afresh.
//!
//! Invariant violations are fatal (see [`ExecContext::fatal`]); type clashes that the
//! `any` escape hatch can legitimately produce are reported and raise the context's
//! signal instead.

use crate::{
    classify::{CellRepr, cell_repr, is_managed_tag},
    context::ExecContext,
    error::{InternalError, RuntimeError},
    heap::{BoxedKind, HeapData, HeapId, ValPtr, vector_yield_type},
    report::Reporter,
    resource::{ResourceError, ResourceTracker},
    types::{InternalType, TypePtr, TypeTag},
    values::VectorVal,
    zval::{AnyRef, CellView, ZVal},
};

impl ZVal {
    /// Lowers `val` into a cell under `ty`.
    ///
    /// An absent `val` is only accepted for managed types, where it yields a null cell.
    ///
    /// # Panics
    /// Through [`ExecContext::fatal`] when `val` cannot be stored under `ty`: an absent
    /// value for an unmanaged type, a value whose runtime type is incompatible with `ty`,
    /// or an unstorable `ty`.
    pub fn from_val<T: ResourceTracker, R: Reporter>(
        val: Option<ValPtr>,
        ty: &TypePtr,
        cx: &mut ExecContext<T, R>,
    ) -> Self {
        let tag = ty.tag();
        let Some(val) = val else {
            if is_managed_tag(tag) {
                return Self::default();
            }
            let err = match cell_repr(tag) {
                CellRepr::Unstorable => InternalError::BadLowerType { tag },
                _ => InternalError::AbsentValue { tag },
            };
            cx.fatal(err);
        };

        if cell_repr(tag) == CellRepr::Unstorable {
            reject(val, cx, InternalError::BadLowerType { tag });
        }

        let (actual, kind) = {
            let data = cx.heap().get(val.id());
            (data.runtime_type(), data.kind())
        };
        if actual.tag() != tag
            && tag != TypeTag::Any
            && (ty.internal_type() == InternalType::Other || ty.internal_type() != actual.internal_type())
        {
            reject(
                val,
                cx,
                InternalError::TypeInconsistency {
                    target: tag,
                    actual: actual.tag(),
                },
            );
        }

        match cell_repr(tag) {
            CellRepr::Int => {
                let Some(i) = cx.heap().get(val.id()).as_int() else {
                    reject(val, cx, InternalError::KindMismatch { target: tag, kind });
                };
                val.drop_with_heap(cx.heap_mut());
                Self::from_int(i)
            }
            CellRepr::Unsigned => {
                let Some(c) = cx.heap().get(val.id()).as_count() else {
                    reject(val, cx, InternalError::KindMismatch { target: tag, kind });
                };
                val.drop_with_heap(cx.heap_mut());
                Self::from_count(c)
            }
            CellRepr::Double => {
                let Some(d) = cx.heap().get(val.id()).as_double() else {
                    reject(val, cx, InternalError::KindMismatch { target: tag, kind });
                };
                val.drop_with_heap(cx.heap_mut());
                Self::from_double(d)
            }
            CellRepr::Interned => {
                if kind != BoxedKind::Port {
                    reject(val, cx, InternalError::KindMismatch { target: tag, kind });
                }
                Self::from_id(Some(cx.heap_mut().intern_port(val)))
            }
            CellRepr::Managed => {
                if BoxedKind::for_tag(tag) != Some(kind) {
                    reject(val, cx, InternalError::KindMismatch { target: tag, kind });
                }
                if kind == BoxedKind::Vector {
                    check_vector_yield(&val, ty, &actual, cx);
                }
                Self::from_id(Some(val.into_raw()))
            }
            CellRepr::Any => Self::from_any(AnyRef {
                kind,
                id: val.into_raw(),
            }),
            CellRepr::Unstorable => reject(val, cx, InternalError::BadLowerType { tag }),
        }
    }

    /// Raises the cell back into a boxed value under `ty`, the type it was written under.
    ///
    /// Returns `None` for a null managed cell. A cell that does not hold a live value of
    /// the expected kind is reported as "value used but not set", raises the signal and
    /// also returns `None`, as does a failure to allocate a box.
    ///
    /// # Panics
    /// Through [`ExecContext::fatal`] when `ty` is unstorable.
    pub fn to_val<T: ResourceTracker, R: Reporter>(self, ty: &TypePtr, cx: &mut ExecContext<T, R>) -> Option<ValPtr> {
        let tag = ty.tag();
        let boxed = match self.view(ty) {
            CellView::Int(i) => match tag {
                TypeTag::Bool => cx.heap_mut().boolean(i != 0),
                TypeTag::Enum => cx.heap_mut().enum_val(TypePtr::clone(ty), i),
                _ => cx.heap_mut().int(i),
            },
            CellView::Count(c) => cx.heap_mut().count(c),
            CellView::Double(d) => match tag {
                TypeTag::Interval => cx.heap_mut().interval(d),
                TypeTag::Time => cx.heap_mut().time(d),
                _ => cx.heap_mut().double(d),
            },
            CellView::Interned(Some(id)) => {
                return acquire(id, BoxedKind::Port, cx);
            }
            CellView::Managed(Some(id)) => {
                return match BoxedKind::for_tag(tag) {
                    Some(kind) => acquire(id, kind, cx),
                    None => not_set(cx),
                };
            }
            CellView::Any(Some(AnyRef { kind, id })) => {
                return acquire(id, kind, cx);
            }
            CellView::Managed(None) | CellView::Any(None) => return None,
            CellView::Interned(None) | CellView::Undecodable(_) => return not_set(cx),
            CellView::Unstorable(tag) => cx.fatal(InternalError::BadRaiseType { tag }),
        };
        match boxed {
            Ok(val) => Some(val),
            Err(err) => {
                cx.runtime_error(RuntimeError::Resource(err));
                None
            }
        }
    }
}

/// Releases `val` and aborts with `err`.
fn reject<T: ResourceTracker, R: Reporter>(val: ValPtr, cx: &mut ExecContext<T, R>, err: InternalError) -> ! {
    val.drop_with_heap(cx.heap_mut());
    cx.fatal(err);
}

/// A vector whose element type disagrees with the slot's can reach a concrete slot
/// through `vector of any`. Reported, never fatal.
fn check_vector_yield<T: ResourceTracker, R: Reporter>(
    val: &ValPtr,
    ty: &TypePtr,
    actual: &TypePtr,
    cx: &mut ExecContext<T, R>,
) {
    let expected = vector_yield_type(ty).tag();
    let found = vector_yield_type(actual).tag();
    if expected != found && expected != TypeTag::Any && found != TypeTag::Any {
        let value = cx.heap().describe(val.id());
        cx.runtime_error(RuntimeError::VectorTypeClash {
            expected,
            actual: found,
            value,
        });
    }
}

/// Hands out a new reference to `id` if it is a live value of `kind`.
fn acquire<T: ResourceTracker, R: Reporter>(id: HeapId, kind: BoxedKind, cx: &mut ExecContext<T, R>) -> Option<ValPtr> {
    let live = cx.heap().get_if_live(id).is_some_and(|data| data.kind() == kind);
    if live {
        cx.heap().inc_ref(id);
        Some(ValPtr::from_raw(id))
    } else {
        not_set(cx)
    }
}

fn not_set<T: ResourceTracker, R: Reporter>(cx: &mut ExecContext<T, R>) -> Option<ValPtr> {
    cx.runtime_error(RuntimeError::ValueNotSet);
    None
}

/// Vector access. Elements are stored as cells under the vector's yield type, so every
/// read and write goes through the bridge.
impl<T: ResourceTracker, R: Reporter> ExecContext<T, R> {
    /// Allocates an empty vector of type `ty`.
    ///
    /// # Panics
    /// Through [`ExecContext::fatal`] if `ty` is not a vector type.
    pub fn new_vector(&mut self, ty: TypePtr) -> Result<ValPtr, ResourceError> {
        if ty.tag() != TypeTag::Vector {
            self.fatal(InternalError::TypeInconsistency {
                target: TypeTag::Vector,
                actual: ty.tag(),
            });
        }
        self.heap_mut().allocate(HeapData::Vector(VectorVal::new(ty)))
    }

    /// Number of elements, holes included.
    ///
    /// # Panics
    /// Through [`ExecContext::fatal`] if `vector` is not a vector.
    pub fn vector_len(&mut self, vector: &ValPtr) -> usize {
        self.vector_yield(vector);
        match self.heap().get(vector.id()) {
            HeapData::Vector(v) => v.len(),
            _ => 0,
        }
    }

    /// Raises element `index`. Holes and out-of-range indices yield `None` without error.
    ///
    /// # Panics
    /// Through [`ExecContext::fatal`] if `vector` is not a vector.
    pub fn vector_get(&mut self, vector: &ValPtr, index: usize) -> Option<ValPtr> {
        let yield_ty = self.vector_yield(vector);
        let cell = match self.heap().get(vector.id()) {
            HeapData::Vector(v) => v.elems.get(index).copied().flatten(),
            _ => None,
        }?;
        cell.to_val(&yield_ty, self)
    }

    /// Lowers `elem` into element `index`, releasing whatever the element held before.
    /// Writing past the end extends the vector with holes. The growth is charged to the
    /// heap's tracker first; if it is refused, or `index` is too large to address, the
    /// error is reported, `elem` is released and the vector is left unchanged.
    ///
    /// # Panics
    /// Through [`ExecContext::fatal`] if `vector` is not a vector or `elem` cannot be
    /// stored under its yield type.
    pub fn vector_set(&mut self, vector: &ValPtr, index: usize, elem: Option<ValPtr>) {
        let yield_ty = self.vector_yield(vector);
        if let Err(err) = self.grow_vector(vector.id(), index) {
            if let Some(elem) = elem {
                elem.drop_with_heap(self.heap_mut());
            }
            self.runtime_error(err);
            return;
        }
        let cell = ZVal::from_val(elem, &yield_ty, self);
        let old = match self.heap_mut().get_mut(vector.id()) {
            HeapData::Vector(v) => v.elems[index].replace(cell),
            _ => None,
        };
        if let Some(old) = old {
            old.release_if_managed(&yield_ty, self.heap_mut());
        }
    }

    /// Extends the vector so that `index` is addressable.
    fn grow_vector(&mut self, id: HeapId, index: usize) -> Result<(), RuntimeError> {
        let len = match self.heap().get(id) {
            HeapData::Vector(v) => v.elems.len(),
            _ => return Ok(()),
        };
        if index < len {
            return Ok(());
        }
        let too_large = RuntimeError::VectorIndexTooLarge { index };
        let Some(new_len) = index.checked_add(1) else {
            return Err(too_large);
        };
        let extra = new_len - len;
        let Some(bytes) = extra.checked_mul(size_of::<Option<ZVal>>()) else {
            return Err(too_large);
        };
        self.heap_mut().grow(id, bytes)?;
        if let HeapData::Vector(v) = self.heap_mut().get_mut(id)
            && v.elems.try_reserve_exact(extra).is_ok()
        {
            v.elems.resize(new_len, None);
            return Ok(());
        }
        self.heap_mut().shrink(id, bytes);
        Err(too_large)
    }

    fn vector_yield(&mut self, vector: &ValPtr) -> TypePtr {
        let kind = match self.heap().get(vector.id()) {
            HeapData::Vector(v) => return vector_yield_type(&v.ty),
            other => other.kind(),
        };
        self.fatal(InternalError::KindMismatch {
            target: TypeTag::Vector,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, report::CollectReporter, types::Type};

    fn cx() -> ExecContext<crate::resource::NoLimitTracker, CollectReporter> {
        ExecContext::with_parts(Heap::default(), CollectReporter::new())
    }

    #[test]
    fn int_lowers_into_bool_slot() {
        let mut cx = cx();
        let val = cx.heap_mut().int(5).unwrap();
        let bool_ty = Type::base(TypeTag::Bool);
        let zv = ZVal::from_val(Some(val), &bool_ty, &mut cx);
        assert!(zv.as_bool(&bool_ty));
        assert_eq!(cx.heap().heap_stats().live_objects, 0);
    }

    #[test]
    fn enum_raise_keeps_type() {
        let mut cx = cx();
        let ty = Type::enumeration("Color", [("RED".to_owned(), 0), ("BLUE".to_owned(), 1)]);
        let raised = ZVal::from_int(1).to_val(&ty, &mut cx).unwrap();
        assert_eq!(cx.heap().describe(raised.id()), "BLUE");
        assert!(std::rc::Rc::ptr_eq(&cx.heap().get(raised.id()).runtime_type(), &ty));
        raised.drop_with_heap(cx.heap_mut());
    }

    #[test]
    fn stale_managed_cell_is_not_set() {
        let mut cx = cx();
        let ty = Type::base(TypeTag::String);
        let val = cx.heap_mut().string("gone").unwrap();
        let zv = ZVal::from_val(Some(val), &ty, &mut cx);
        zv.release_if_managed(&ty, cx.heap_mut());
        assert!(zv.to_val(&ty, &mut cx).is_none());
        assert_eq!(cx.reporter().errors(), [RuntimeError::ValueNotSet]);
        assert!(cx.check_and_clear());
    }

    #[test]
    fn vector_set_replaces_and_releases() {
        let mut cx = cx();
        let vec = cx.new_vector(Type::vector(Type::base(TypeTag::String))).unwrap();
        let a = cx.heap_mut().string("a").unwrap();
        let a_id = a.id();
        cx.vector_set(&vec, 2, Some(a));
        assert_eq!(cx.vector_len(&vec), 3);
        assert!(cx.vector_get(&vec, 0).is_none());
        let b = cx.heap_mut().string("b").unwrap();
        cx.vector_set(&vec, 2, Some(b));
        assert!(!cx.heap().is_live(a_id));
        let got = cx.vector_get(&vec, 2).unwrap();
        assert_eq!(cx.heap().describe(got.id()), "b");
        got.drop_with_heap(cx.heap_mut());
        vec.drop_with_heap(cx.heap_mut());
        assert_eq!(cx.heap().heap_stats().live_objects, 0);
        assert!(!cx.check_and_clear());
    }
}
