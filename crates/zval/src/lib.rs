#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "heap ids are bounded by MAX_HEAP_INDEX")]
// first so every other module can name heap types
mod heap;

mod classify;
mod context;
mod convert;
mod error;
mod frame;
mod report;
mod resource;
mod signal;
mod types;
mod values;
mod zval;

pub use crate::{
    classify::{CellRepr, cell_repr, is_managed, is_managed_tag},
    context::ExecContext,
    error::{InternalError, RuntimeError},
    frame::Frame,
    heap::{BoxedKind, DropWithHeap, Heap, HeapData, HeapId, HeapStats, ValPtr},
    report::{CollectReporter, NoReport, Reporter, TracingReporter},
    resource::{LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker},
    signal::ErrorSignal,
    types::{InternalType, RecordField, Type, TypePtr, TypeTag},
    values::{
        EnumVal, FileVal, FuncVal, ListVal, OpaqueVal, PatternVal, PortVal, RecordVal, SubNetVal, TableVal,
        TransportProto, VectorVal,
    },
    zval::{AnyRef, CellView, ZVal},
};
