use std::{
    cell::Cell,
    collections::BTreeMap,
    fmt::Write,
    net::IpAddr,
    rc::Rc,
};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use strum::{Display, EnumIter, FromRepr, IntoStaticStr};

use crate::{
    resource::{NoLimitTracker, ResourceError, ResourceTracker},
    types::{Type, TypePtr, TypeTag},
    values::{
        EnumVal, FileVal, FuncVal, ListVal, OpaqueVal, PatternVal, PortVal, RecordVal, SubNetVal, TableVal,
        TransportProto, VectorVal,
    },
    zval::{CellView, MAX_HEAP_INDEX, ZVal},
};

/// Unique identifier for values stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// The concrete kinds of boxed value.
///
/// The discriminant is stable: it is what a cell written under `any` stores to remember
/// which kind it points at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr, IntoStaticStr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum BoxedKind {
    Addr,
    Bool,
    Count,
    Double,
    Enum,
    File,
    Func,
    Int,
    Interval,
    List,
    Opaque,
    Pattern,
    Port,
    Record,
    Str,
    SubNet,
    Table,
    Time,
    Type,
    Vector,
}

impl BoxedKind {
    /// The kind a value must have to be stored under `tag`, or `None` for `any` and the
    /// unstorable tags.
    #[must_use]
    pub const fn for_tag(tag: TypeTag) -> Option<Self> {
        Some(match tag {
            TypeTag::Addr => Self::Addr,
            TypeTag::Bool => Self::Bool,
            TypeTag::Count => Self::Count,
            TypeTag::Double => Self::Double,
            TypeTag::Enum => Self::Enum,
            TypeTag::File => Self::File,
            TypeTag::Func => Self::Func,
            TypeTag::Int => Self::Int,
            TypeTag::Interval => Self::Interval,
            TypeTag::List => Self::List,
            TypeTag::Opaque => Self::Opaque,
            TypeTag::Pattern => Self::Pattern,
            TypeTag::Port => Self::Port,
            TypeTag::Record => Self::Record,
            TypeTag::String => Self::Str,
            TypeTag::Subnet => Self::SubNet,
            TypeTag::Table => Self::Table,
            TypeTag::Time => Self::Time,
            TypeTag::Type => Self::Type,
            TypeTag::Vector => Self::Vector,
            TypeTag::Any | TypeTag::Error | TypeTag::Timer | TypeTag::Union | TypeTag::Void => return None,
        })
    }
}

/// HeapData captures every boxed value that lives in the arena.
#[derive(Debug)]
pub enum HeapData {
    Addr(IpAddr),
    Bool(bool),
    Count(u64),
    Double(f64),
    Enum(EnumVal),
    File(FileVal),
    Func(FuncVal),
    Int(i64),
    Interval(f64),
    List(ListVal),
    Opaque(OpaqueVal),
    Pattern(PatternVal),
    Port(PortVal),
    Record(RecordVal),
    /// Script strings are byte strings.
    Str(Vec<u8>),
    SubNet(SubNetVal),
    Table(TableVal),
    Time(f64),
    /// A first-class type value; the payload is the described type.
    Type(TypePtr),
    Vector(VectorVal),
}

impl HeapData {
    #[must_use]
    pub fn kind(&self) -> BoxedKind {
        match self {
            Self::Addr(_) => BoxedKind::Addr,
            Self::Bool(_) => BoxedKind::Bool,
            Self::Count(_) => BoxedKind::Count,
            Self::Double(_) => BoxedKind::Double,
            Self::Enum(_) => BoxedKind::Enum,
            Self::File(_) => BoxedKind::File,
            Self::Func(_) => BoxedKind::Func,
            Self::Int(_) => BoxedKind::Int,
            Self::Interval(_) => BoxedKind::Interval,
            Self::List(_) => BoxedKind::List,
            Self::Opaque(_) => BoxedKind::Opaque,
            Self::Pattern(_) => BoxedKind::Pattern,
            Self::Port(_) => BoxedKind::Port,
            Self::Record(_) => BoxedKind::Record,
            Self::Str(_) => BoxedKind::Str,
            Self::SubNet(_) => BoxedKind::SubNet,
            Self::Table(_) => BoxedKind::Table,
            Self::Time(_) => BoxedKind::Time,
            Self::Type(_) => BoxedKind::Type,
            Self::Vector(_) => BoxedKind::Vector,
        }
    }

    /// The script-level type of this value.
    #[must_use]
    pub fn runtime_type(&self) -> TypePtr {
        match self {
            Self::Enum(e) => Rc::clone(&e.ty),
            Self::Opaque(o) => Rc::clone(&o.ty),
            Self::Record(r) => Rc::clone(&r.ty),
            Self::Table(t) => Rc::clone(&t.ty),
            Self::Vector(v) => Rc::clone(&v.ty),
            Self::Addr(_) => Type::base(TypeTag::Addr),
            Self::Bool(_) => Type::base(TypeTag::Bool),
            Self::Count(_) => Type::base(TypeTag::Count),
            Self::Double(_) => Type::base(TypeTag::Double),
            Self::File(_) => Type::base(TypeTag::File),
            Self::Func(_) => Type::base(TypeTag::Func),
            Self::Int(_) => Type::base(TypeTag::Int),
            Self::Interval(_) => Type::base(TypeTag::Interval),
            Self::List(_) => Type::base(TypeTag::List),
            Self::Pattern(_) => Type::base(TypeTag::Pattern),
            Self::Port(_) => Type::base(TypeTag::Port),
            Self::Str(_) => Type::base(TypeTag::String),
            Self::SubNet(_) => Type::base(TypeTag::Subnet),
            Self::Time(_) => Type::base(TypeTag::Time),
            Self::Type(_) => Type::base(TypeTag::Type),
        }
    }

    /// Extracts the signed-integer representation of a bool, int or enum value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            Self::Enum(e) => Some(e.value),
            _ => None,
        }
    }

    /// Extracts the unsigned representation of a count or port value.
    #[must_use]
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(c) => Some(*c),
            Self::Port(p) => Some(p.raw()),
            _ => None,
        }
    }

    /// Extracts the floating-point representation of a double, time or interval value.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) | Self::Interval(d) | Self::Time(d) => Some(*d),
            _ => None,
        }
    }

    /// Approximate size in bytes, fed to the resource tracker.
    fn estimate_size(&self) -> usize {
        let payload = match self {
            Self::Str(s) => s.len(),
            Self::List(l) => l.elems.len() * size_of::<ValPtr>(),
            Self::Opaque(o) => o.state.len(),
            Self::Pattern(p) => p.source().len(),
            Self::Record(r) => r.fields.len() * size_of::<Option<ValPtr>>(),
            Self::Table(t) => t.entries.len() * size_of::<(ValPtr, Option<ValPtr>)>(),
            Self::Vector(v) => v.elems.len() * size_of::<Option<ZVal>>(),
            Self::File(f) => f.name.len(),
            Self::Func(f) => f.name.len(),
            _ => 0,
        };
        size_of::<HeapValue>() + payload
    }

    /// Consumes the payload, collecting the ids of every reference it owned.
    fn into_child_ids(self, out: &mut SmallVec<[HeapId; 8]>) {
        match self {
            Self::List(list) => out.extend(list.elems.into_iter().map(ValPtr::into_raw)),
            Self::Record(record) => out.extend(record.fields.into_iter().flatten().map(ValPtr::into_raw)),
            Self::Table(table) => {
                for (key, value) in table.entries {
                    out.push(key.into_raw());
                    if let Some(value) = value {
                        out.push(value.into_raw());
                    }
                }
            }
            Self::Vector(vector) => {
                let elem_ty = vector_yield_type(&vector.ty);
                out.extend(vector.elems.into_iter().flatten().filter_map(|zv| zv.managed_id(&elem_ty)));
            }
            _ => {}
        }
    }
}

/// Element type of a vector type; bare vectors hold `any`.
pub(crate) fn vector_yield_type(ty: &Type) -> TypePtr {
    ty.yield_type().cloned().unwrap_or_else(|| Type::base(TypeTag::Any))
}

/// An owned, strong reference to a boxed value.
///
/// NOTE: `Clone` is intentionally NOT derived. Use [`clone_with_heap`](Self::clone_with_heap)
/// to acquire a second reference and [`drop_with_heap`](Self::drop_with_heap) to release
/// one. Letting a `ValPtr` fall out of scope leaks its reference (and panics with the
/// `ref-count-panic` feature).
#[derive(Debug, PartialEq, Eq)]
pub struct ValPtr(HeapId);

impl ValPtr {
    #[inline]
    #[must_use]
    pub fn id(&self) -> HeapId {
        self.0
    }

    /// Acquires a new reference to the same value.
    #[must_use]
    pub fn clone_with_heap(&self, heap: &Heap<impl ResourceTracker>) -> Self {
        heap.inc_ref(self.0);
        Self(self.0)
    }

    /// Releases this reference.
    pub fn drop_with_heap(self, heap: &mut Heap<impl ResourceTracker>) {
        heap.dec_ref(self.into_raw());
    }

    /// Gives up the handle without touching the refcount; the caller now accounts for
    /// the reference by id.
    #[inline]
    pub(crate) fn into_raw(self) -> HeapId {
        let id = self.0;
        std::mem::forget(self);
        id
    }

    /// Adopts a reference that has already been counted.
    #[inline]
    pub(crate) fn from_raw(id: HeapId) -> Self {
        Self(id)
    }
}

/// Catches references that go out of scope without being released.
#[cfg(feature = "ref-count-panic")]
impl Drop for ValPtr {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            panic!("ValPtr({}) dropped without drop_with_heap", self.0.index());
        }
    }
}

/// Trait for types that require heap access for proper cleanup.
///
/// Rust's standard `Drop` trait cannot decrement heap reference counts because it has no
/// access to the `Heap`. This trait provides an explicit drop-with-heap method so that
/// references (and containers of them) release their counts when no longer needed.
pub trait DropWithHeap<T: ResourceTracker> {
    /// Consume `self` and decrement reference counts for any references contained within.
    fn drop_with_heap(self, heap: &mut Heap<T>);
}

impl<T: ResourceTracker> DropWithHeap<T> for ValPtr {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        Self::drop_with_heap(self, heap);
    }
}

impl<T: ResourceTracker, U: DropWithHeap<T>> DropWithHeap<T> for Option<U> {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        if let Some(value) = self {
            value.drop_with_heap(heap);
        }
    }
}

impl<T: ResourceTracker, U: DropWithHeap<T>> DropWithHeap<T> for Vec<U> {
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        for value in self {
            value.drop_with_heap(heap);
        }
    }
}

/// Snapshot of heap state at a point in time.
///
/// Comparing two snapshots is the quickest way to check that a sequence of lowerings,
/// raisings and slot releases left no reference behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live objects on the heap, interned ports included.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by kind name.
    pub objects_by_kind: BTreeMap<&'static str, usize>,
    /// Number of distinct ports in the intern pool.
    pub interned_ports: usize,
}

#[derive(Debug)]
struct HeapValue {
    refcount: Cell<usize>,
    /// Bytes charged to the tracker for this entry, refunded exactly when it is freed.
    charged: usize,
    data: HeapData,
}

/// Reference-counted arena that backs all boxed values.
///
/// Uses a free list to reuse slots from freed values, keeping memory usage constant for
/// long-running loops that repeatedly allocate and free values. When a value is freed
/// via `dec_ref`, its slot id is added to the free list; new allocations pop from the
/// free list when available, otherwise append.
///
/// Ports are interned: the heap keeps one reference to every distinct port it has handed
/// out through [`port`](Self::port) or [`intern_port`](Self::intern_port), so cells may
/// hold them by borrowed id.
#[derive(Debug)]
pub struct Heap<T: ResourceTracker = NoLimitTracker> {
    entries: Vec<Option<HeapValue>>,
    /// IDs of freed slots available for reuse. Populated by `dec_ref`, consumed by `allocate`.
    free_list: Vec<HeapId>,
    tracker: T,
    ports: AHashMap<PortVal, HeapId>,
}

impl Default for Heap<NoLimitTracker> {
    fn default() -> Self {
        Self::new(0, NoLimitTracker)
    }
}

impl<T: ResourceTracker> Heap<T> {
    /// Creates a new heap with the given resource tracker.
    pub fn new(capacity: usize, tracker: T) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            tracker,
            ports: AHashMap::new(),
        }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Allocates a new heap entry with a refcount of one, returning the owning reference.
    ///
    /// Returns `Err(ResourceError)` if the allocation would exceed configured limits.
    pub fn allocate(&mut self, data: HeapData) -> Result<ValPtr, ResourceError> {
        let charged = data.estimate_size();
        self.tracker.on_allocate(|| charged)?;

        let new_entry = HeapValue {
            refcount: Cell::new(1),
            charged,
            data,
        };

        let id = if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(new_entry);
            id
        } else {
            let id = HeapId(self.entries.len());
            assert!(id.index() <= MAX_HEAP_INDEX, "Heap::allocate: heap index space exhausted");
            self.entries.push(Some(new_entry));
            id
        };

        Ok(ValPtr(id))
    }

    pub fn boolean(&mut self, value: bool) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Bool(value))
    }

    pub fn int(&mut self, value: i64) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Int(value))
    }

    pub fn count(&mut self, value: u64) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Count(value))
    }

    pub fn double(&mut self, value: f64) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Double(value))
    }

    /// Allocates an interval of `seconds`.
    pub fn interval(&mut self, seconds: f64) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Interval(seconds))
    }

    /// Allocates a time value, in seconds since the epoch.
    pub fn time(&mut self, seconds: f64) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Time(seconds))
    }

    pub fn string(&mut self, value: impl Into<Vec<u8>>) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Str(value.into()))
    }

    pub fn addr(&mut self, addr: IpAddr) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Addr(addr))
    }

    pub fn subnet(&mut self, prefix: IpAddr, width: u8) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::SubNet(SubNetVal::new(prefix, width)))
    }

    pub fn enum_val(&mut self, ty: TypePtr, value: i64) -> Result<ValPtr, ResourceError> {
        debug_assert_eq!(ty.tag(), TypeTag::Enum);
        self.allocate(HeapData::Enum(EnumVal { ty, value }))
    }

    pub fn type_val(&mut self, ty: TypePtr) -> Result<ValPtr, ResourceError> {
        self.allocate(HeapData::Type(ty))
    }

    /// Returns a new reference to the interned port `number/proto`, allocating it on
    /// first use.
    pub fn port(&mut self, number: u16, proto: TransportProto) -> Result<ValPtr, ResourceError> {
        let port = PortVal::new(number, proto);
        if let Some(&id) = self.ports.get(&port) {
            self.inc_ref(id);
            return Ok(ValPtr(id));
        }
        let val = self.allocate(HeapData::Port(port))?;
        // the pool keeps its own reference so the port is never freed
        self.inc_ref(val.id());
        self.ports.insert(port, val.id());
        Ok(val)
    }

    /// Moves `val`'s reference into the port pool and returns the pooled id.
    ///
    /// If an equal port is already pooled, `val` is released and the existing entry is
    /// returned, so equal ports always resolve to one id.
    ///
    /// # Panics
    /// Panics if `val` is not a port.
    pub(crate) fn intern_port(&mut self, val: ValPtr) -> HeapId {
        let HeapData::Port(port) = self.get(val.id()) else {
            panic!("Heap::intern_port: value is not a port");
        };
        let port = *port;
        if let Some(&id) = self.ports.get(&port) {
            val.drop_with_heap(self);
            id
        } else {
            let id = val.into_raw();
            self.ports.insert(port, id);
            id
        }
    }

    /// Charges `bytes` of growth to the live entry `id`.
    ///
    /// Containers grown in place through [`get_mut`](Self::get_mut) must be charged here
    /// first, so the tracker keeps accounting for what live entries actually hold.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn grow(&mut self, id: HeapId, bytes: usize) -> Result<(), ResourceError> {
        self.tracker.on_grow(bytes)?;
        self.entry_mut(id, "Heap::grow").charged += bytes;
        Ok(())
    }

    /// Returns `bytes` previously charged with [`grow`](Self::grow).
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn shrink(&mut self, id: HeapId, bytes: usize) {
        let entry = self.entry_mut(id, "Heap::shrink");
        let bytes = bytes.min(entry.charged);
        entry.charged -= bytes;
        self.tracker.on_free(|| bytes);
    }

    fn entry_mut(&mut self, id: HeapId, caller: &str) -> &mut HeapValue {
        match self.entries.get_mut(id.index()) {
            Some(Some(entry)) => entry,
            Some(None) => panic!("{caller}: object already freed"),
            None => panic!("{caller}: slot missing"),
        }
    }

    /// Increments the reference count for an existing heap entry.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn inc_ref(&self, id: HeapId) {
        let value = self
            .entries
            .get(id.index())
            .expect("Heap::inc_ref: slot missing")
            .as_ref()
            .expect("Heap::inc_ref: object already freed");
        value.refcount.set(value.refcount.get() + 1);
    }

    /// Decrements the reference count and frees the value (plus children) once it hits zero.
    ///
    /// Children are released with an explicit work list rather than recursion so that long
    /// chains of nested containers cannot overflow the stack.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn dec_ref(&mut self, id: HeapId) {
        let mut pending: SmallVec<[HeapId; 8]> = smallvec![id];
        while let Some(id) = pending.pop() {
            let slot = self.entries.get_mut(id.index()).expect("Heap::dec_ref: slot missing");
            let entry = slot.as_ref().expect("Heap::dec_ref: object already freed");
            let count = entry.refcount.get();
            if count > 1 {
                entry.refcount.set(count - 1);
                continue;
            }
            let value = slot.take().expect("Heap::dec_ref: object already freed");
            self.free_list.push(id);
            self.tracker.on_free(|| value.charged);
            if let HeapData::Port(port) = &value.data
                && self.ports.get(port) == Some(&id)
            {
                self.ports.remove(port);
            }
            value.data.into_child_ids(&mut pending);
        }
    }

    /// Returns an immutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self
            .entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
            .data
    }

    /// Returns heap data if the slot is live, `None` when it is missing or freed.
    #[must_use]
    pub fn get_if_live(&self, id: HeapId) -> Option<&HeapData> {
        self.entries.get(id.index())?.as_ref().map(|entry| &entry.data)
    }

    /// Returns a mutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self
            .entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
            .data
    }

    #[must_use]
    pub fn is_live(&self, id: HeapId) -> bool {
        self.get_if_live(id).is_some()
    }

    /// Returns the current refcount for a live heap value.
    ///
    /// This is primarily used for testing reference counting behavior.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    #[must_use]
    pub fn get_refcount(&self, id: HeapId) -> usize {
        self.entries
            .get(id.index())
            .expect("Heap::get_refcount: slot missing")
            .as_ref()
            .expect("Heap::get_refcount: object already freed")
            .refcount
            .get()
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        let mut objects_by_kind = BTreeMap::new();
        let mut live_objects = 0;
        for entry in self.entries.iter().flatten() {
            live_objects += 1;
            *objects_by_kind.entry(entry.data.kind().into()).or_insert(0) += 1;
        }
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_kind,
            interned_ports: self.ports.len(),
        }
    }

    /// Renders a value the way error messages show it.
    #[must_use]
    pub fn describe(&self, id: HeapId) -> String {
        let mut out = String::new();
        self.describe_into(id, &mut out, 0);
        out
    }

    fn describe_into(&self, id: HeapId, out: &mut String, depth: usize) {
        const MAX_DEPTH: usize = 16;
        let Some(data) = self.get_if_live(id) else {
            out.push_str("<freed>");
            return;
        };
        if depth > MAX_DEPTH {
            out.push_str("...");
            return;
        }
        let depth = depth + 1;
        let _ = match data {
            HeapData::Addr(addr) => write!(out, "{addr}"),
            HeapData::Bool(b) => write!(out, "{}", if *b { "T" } else { "F" }),
            HeapData::Count(c) => write!(out, "{c}"),
            HeapData::Double(d) | HeapData::Time(d) => write!(out, "{d}"),
            HeapData::Interval(d) => write!(out, "{d} secs"),
            HeapData::Int(i) => write!(out, "{i}"),
            HeapData::Enum(e) => match e.ty.enum_label(e.value) {
                Some(label) => write!(out, "{label}"),
                None => write!(out, "{}", e.value),
            },
            HeapData::File(f) => write!(out, "file \"{}\"", f.name),
            HeapData::Func(f) => write!(out, "{}", f.name),
            HeapData::Opaque(o) => write!(out, "<{}>", o.ty),
            HeapData::Pattern(p) => write!(out, "/{}/", p.source()),
            HeapData::Port(p) => write!(out, "{p}"),
            HeapData::Str(s) => write!(out, "{}", s.escape_ascii()),
            HeapData::SubNet(s) => write!(out, "{s}"),
            HeapData::Type(t) => write!(out, "{t}"),
            HeapData::List(list) => {
                for (i, elem) in list.elems.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.describe_into(elem.id(), out, depth);
                }
                Ok(())
            }
            HeapData::Record(record) => {
                out.push('[');
                let fields = record.ty.fields();
                for (i, field) in record.fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if let Some(def) = fields.get(i) {
                        let _ = write!(out, "{}=", def.name);
                    }
                    match field {
                        Some(value) => self.describe_into(value.id(), out, depth),
                        None => out.push_str("<uninitialized>"),
                    }
                }
                out.push(']');
                Ok(())
            }
            HeapData::Table(table) => {
                out.push('{');
                for (i, (key, value)) in table.entries.iter().enumerate() {
                    out.push_str(if i > 0 { ", " } else { " " });
                    self.describe_into(key.id(), out, depth);
                    if let Some(value) = value {
                        out.push_str(" = ");
                        self.describe_into(value.id(), out, depth);
                    }
                }
                if !table.entries.is_empty() {
                    out.push(' ');
                }
                out.push('}');
                Ok(())
            }
            HeapData::Vector(vector) => {
                let elem_ty = vector_yield_type(&vector.ty);
                out.push('[');
                for (i, elem) in vector.elems.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match elem {
                        Some(zv) => self.describe_cell(*zv, &elem_ty, out, depth),
                        None => out.push_str("<hole>"),
                    }
                }
                out.push(']');
                Ok(())
            }
        };
    }

    fn describe_cell(&self, zv: ZVal, ty: &Type, out: &mut String, depth: usize) {
        let _ = match zv.view(ty) {
            CellView::Int(i) => match ty.tag() {
                TypeTag::Bool => write!(out, "{}", if i == 0 { "F" } else { "T" }),
                TypeTag::Enum => match ty.enum_label(i) {
                    Some(label) => write!(out, "{label}"),
                    None => write!(out, "{i}"),
                },
                _ => write!(out, "{i}"),
            },
            CellView::Count(c) => write!(out, "{c}"),
            CellView::Double(d) if ty.tag() == TypeTag::Interval => write!(out, "{d} secs"),
            CellView::Double(d) => write!(out, "{d}"),
            CellView::Interned(Some(id)) | CellView::Managed(Some(id)) => {
                self.describe_into(id, out, depth);
                Ok(())
            }
            CellView::Any(Some(any)) => {
                self.describe_into(any.id, out, depth);
                Ok(())
            }
            CellView::Interned(None) | CellView::Managed(None) | CellView::Any(None) => write!(out, "<absent>"),
            CellView::Undecodable(_) | CellView::Unstorable(_) => write!(out, "<invalid>"),
        };
    }
}

/// Marks every owned child as released before the arena's storage is dropped, so the
/// `ref-count-panic` check on `ValPtr` only fires for references that escaped the heap.
#[cfg(feature = "ref-count-panic")]
impl<T: ResourceTracker> Drop for Heap<T> {
    fn drop(&mut self) {
        let mut scratch = SmallVec::new();
        for entry in self.entries.drain(..).flatten() {
            entry.data.into_child_ids(&mut scratch);
            scratch.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::default();
        let a = heap.int(1).unwrap();
        let a_id = a.id();
        a.drop_with_heap(&mut heap);
        assert!(!heap.is_live(a_id));
        let b = heap.int(2).unwrap();
        assert_eq!(b.id(), a_id);
        assert_eq!(heap.heap_stats().free_slots, 0);
        b.drop_with_heap(&mut heap);
    }

    #[test]
    fn freeing_a_list_releases_its_elements() {
        let mut heap = Heap::default();
        let s = heap.string("x").unwrap();
        let s_id = s.id();
        let extra = s.clone_with_heap(&heap);
        let list = heap.allocate(HeapData::List(ListVal { elems: vec![s] })).unwrap();
        assert_eq!(heap.get_refcount(s_id), 2);
        list.drop_with_heap(&mut heap);
        assert_eq!(heap.get_refcount(s_id), 1);
        extra.drop_with_heap(&mut heap);
        assert_eq!(heap.heap_stats().live_objects, 0);
    }

    #[test]
    fn ports_are_interned() {
        let mut heap = Heap::default();
        let a = heap.port(80, TransportProto::Tcp).unwrap();
        let b = heap.port(80, TransportProto::Tcp).unwrap();
        let c = heap.port(80, TransportProto::Udp).unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(heap.heap_stats().interned_ports, 2);
        let a_id = a.id();
        a.drop_with_heap(&mut heap);
        b.drop_with_heap(&mut heap);
        // the pool's own reference keeps it alive
        assert!(heap.is_live(a_id));
        c.drop_with_heap(&mut heap);
    }

    #[test]
    fn intern_port_merges_equal_ports() {
        let mut heap = Heap::default();
        let pooled = heap.port(53, TransportProto::Udp).unwrap();
        let loose = heap.allocate(HeapData::Port(PortVal::new(53, TransportProto::Udp))).unwrap();
        let loose_id = loose.id();
        assert_eq!(heap.intern_port(loose), pooled.id());
        assert!(!heap.is_live(loose_id));
        pooled.drop_with_heap(&mut heap);
    }

    #[test]
    fn describe_renders_nested_values() {
        let mut heap = Heap::default();
        let ty = Type::record([
            ("host".to_owned(), Type::base(TypeTag::Addr)),
            ("note".to_owned(), Type::base(TypeTag::String)),
        ]);
        let host = heap.addr("10.0.0.1".parse().unwrap()).unwrap();
        let rec = heap
            .allocate(HeapData::Record(RecordVal {
                ty,
                fields: vec![Some(host), None],
            }))
            .unwrap();
        assert_eq!(heap.describe(rec.id()), "[host=10.0.0.1, note=<uninitialized>]");
        rec.drop_with_heap(&mut heap);
    }

    #[test]
    fn for_tag_covers_storable_tags() {
        use strum::IntoEnumIterator;

        for tag in TypeTag::iter() {
            let expected_none = matches!(
                tag,
                TypeTag::Any | TypeTag::Error | TypeTag::Timer | TypeTag::Union | TypeTag::Void
            );
            assert_eq!(BoxedKind::for_tag(tag).is_none(), expected_none, "{tag}");
        }
    }
}
