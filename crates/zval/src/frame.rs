use crate::{
    classify::is_managed,
    context::ExecContext,
    error::InternalError,
    heap::{Heap, ValPtr},
    report::Reporter,
    resource::ResourceTracker,
    types::TypePtr,
    zval::ZVal,
};

/// A cell together with the static type it is always written and read under.
#[derive(Debug)]
struct Slot {
    cell: ZVal,
    ty: TypePtr,
}

/// An arena of typed cells, the register file of one VM activation.
///
/// Each slot's type is fixed at construction, so the frame always knows whether a slot
/// owns a heap reference. Every write releases the reference the slot held before, and
/// [`teardown`](Self::teardown) releases whatever is left. Cells never release
/// themselves: a frame dropped without `teardown` leaks (and panics with the
/// `ref-count-panic` feature).
#[derive(Debug)]
pub struct Frame {
    slots: Vec<Slot>,
}

impl Frame {
    /// Creates a frame with one zeroed slot per type.
    pub fn new(types: impl IntoIterator<Item = TypePtr>) -> Self {
        Self {
            slots: types
                .into_iter()
                .map(|ty| Slot {
                    cell: ZVal::default(),
                    ty,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn slot_type(&self, index: usize) -> &TypePtr {
        &self.slots[index].ty
    }

    /// The raw cell in slot `index`. Interpret it with [`slot_type`](Self::slot_type).
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn cell(&self, index: usize) -> ZVal {
        self.slots[index].cell
    }

    /// Overwrites slot `index` with a cell already encoded under `ty`, taking over the
    /// reference it owns and releasing the old one.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds, or through [`ExecContext::fatal`] when `ty`
    /// does not have the slot's type tag.
    pub fn store<T: ResourceTracker, R: Reporter>(
        &mut self,
        index: usize,
        cell: ZVal,
        ty: &TypePtr,
        cx: &mut ExecContext<T, R>,
    ) {
        self.check_tag(ty, index, cx);
        self.replace(index, cell, cx.heap_mut());
    }

    fn check_tag<T: ResourceTracker, R: Reporter>(&self, src: &TypePtr, dst: usize, cx: &mut ExecContext<T, R>) {
        let (src_tag, dst_tag) = (src.tag(), self.slots[dst].ty.tag());
        if src_tag != dst_tag {
            cx.fatal(InternalError::SlotTypeMismatch {
                src: src_tag,
                dst: dst_tag,
            });
        }
    }

    fn replace(&mut self, index: usize, cell: ZVal, heap: &mut Heap<impl ResourceTracker>) {
        let slot = &mut self.slots[index];
        let old = std::mem::replace(&mut slot.cell, cell);
        old.release_if_managed(&slot.ty, heap);
    }

    /// Lowers `val` under the slot's type and stores the result.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds, or through [`ExecContext::fatal`] when `val`
    /// cannot be stored under the slot's type.
    pub fn assign<T: ResourceTracker, R: Reporter>(
        &mut self,
        index: usize,
        val: Option<ValPtr>,
        cx: &mut ExecContext<T, R>,
    ) {
        let cell = ZVal::from_val(val, &self.slots[index].ty, cx);
        self.replace(index, cell, cx.heap_mut());
    }

    /// Raises slot `index` into a new reference. The slot keeps its own.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn fetch<T: ResourceTracker, R: Reporter>(&self, index: usize, cx: &mut ExecContext<T, R>) -> Option<ValPtr> {
        let slot = &self.slots[index];
        slot.cell.to_val(&slot.ty, cx)
    }

    /// Copies slot `src` into slot `dst`, acquiring a new reference for managed types.
    ///
    /// # Panics
    /// Panics if either index is out of bounds, or through [`ExecContext::fatal`] when
    /// the two slots have different type tags.
    pub fn copy_slot<T: ResourceTracker, R: Reporter>(&mut self, src: usize, dst: usize, cx: &mut ExecContext<T, R>) {
        self.check_tag(&self.slots[src].ty, dst, cx);
        let cell = self.slots[src].cell;
        if let Some(id) = cell.managed_id(&self.slots[src].ty) {
            cx.heap().inc_ref(id);
        }
        self.replace(dst, cell, cx.heap_mut());
    }

    /// Releases slot `index` and resets it to zero.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn clear_slot(&mut self, index: usize, heap: &mut Heap<impl ResourceTracker>) {
        self.replace(index, ZVal::default(), heap);
    }

    /// Number of slots currently holding an owned reference.
    #[must_use]
    pub fn owned_references(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| is_managed(&slot.ty) && slot.cell.managed_id(&slot.ty).is_some())
            .count()
    }

    /// Releases every managed slot and consumes the frame.
    pub fn teardown(mut self, heap: &mut Heap<impl ResourceTracker>) {
        for slot in self.slots.drain(..) {
            slot.cell.release_if_managed(&slot.ty, heap);
        }
    }
}

/// Catches frames discarded while still owning references.
#[cfg(feature = "ref-count-panic")]
impl Drop for Frame {
    fn drop(&mut self) {
        if !std::thread::panicking() && self.owned_references() > 0 {
            panic!("Frame dropped with {} owned references; call teardown", self.owned_references());
        }
    }
}
