//! Tests for the typed slot arena.
//!
//! Every write releases the slot's previous reference and teardown releases the rest,
//! so a frame's activity never changes the heap's live population.

use pretty_assertions::assert_eq;
use zval::{ExecContext, Frame, HeapStats, TransportProto, Type, TypeTag, ZVal};

fn live(stats: &HeapStats) -> (usize, Vec<(&'static str, usize)>) {
    (
        stats.live_objects,
        stats.objects_by_kind.iter().map(|(k, v)| (*k, *v)).collect(),
    )
}

// =============================================================================
// 1. Overwrite
// =============================================================================

#[test]
fn assign_releases_previous_value() {
    let mut cx = ExecContext::new();
    let mut frame = Frame::new([Type::base(TypeTag::String)]);

    let a = cx.heap_mut().string("first").unwrap();
    let a_id = a.id();
    frame.assign(0, Some(a), &mut cx);
    assert!(cx.heap().is_live(a_id));

    let b = cx.heap_mut().string("second").unwrap();
    let b_id = b.id();
    frame.assign(0, Some(b), &mut cx);
    assert!(!cx.heap().is_live(a_id));
    assert_eq!(cx.heap().get_refcount(b_id), 1);

    frame.teardown(cx.heap_mut());
    assert!(!cx.heap().is_live(b_id));
}

#[test]
fn unmanaged_slots_overwrite_freely() {
    let mut cx = ExecContext::new();
    let ty = Type::base(TypeTag::Count);
    let mut frame = Frame::new([ty.clone()]);
    frame.store(0, ZVal::from_count(1), &ty, &mut cx);
    frame.store(0, ZVal::from_count(2), &ty, &mut cx);
    assert_eq!(frame.cell(0).as_count(&ty), 2);
    let raised = frame.fetch(0, &mut cx).unwrap();
    assert_eq!(cx.heap().get(raised.id()).as_count(), Some(2));
    raised.drop_with_heap(cx.heap_mut());
    frame.teardown(cx.heap_mut());
}

/// A cell encoded under one type never reaches a slot of another, where it would be
/// released as whatever that slot's type says it holds.
#[test]
#[should_panic(expected = "count cell stored into string slot")]
fn store_under_a_different_type_is_fatal() {
    let mut cx = ExecContext::new();
    let mut frame = Frame::new([Type::base(TypeTag::String)]);
    let bystander = cx.heap_mut().string("bystander").unwrap();
    let id = bystander.id();
    // the count's bits alias a reference to `bystander`
    let cell = ZVal::from_count(u64::try_from(id.index()).unwrap() + 1);
    frame.store(0, cell, &Type::base(TypeTag::Count), &mut cx);
}

#[test]
fn store_keeps_the_reference_it_is_given() {
    let mut cx = ExecContext::new();
    let ty = Type::base(TypeTag::String);
    let mut frame = Frame::new([ty.clone()]);
    let s = cx.heap_mut().string("owned").unwrap();
    let id = s.id();
    let cell = ZVal::from_val(Some(s), &ty, &mut cx);
    frame.store(0, cell, &ty, &mut cx);
    assert_eq!(cx.heap().get_refcount(id), 1);
    frame.teardown(cx.heap_mut());
    assert!(!cx.heap().is_live(id));
}

// =============================================================================
// 2. Teardown
// =============================================================================

/// A frame mixing every representation leaves the heap as it found it.
#[test]
fn teardown_restores_heap_population() {
    let mut cx = ExecContext::new();
    // intern the port up front so the pool's entry is part of the baseline
    let port = cx.heap_mut().port(8080, TransportProto::Tcp).unwrap();
    let baseline = live(&cx.heap().heap_stats());

    let mut frame = Frame::new([
        Type::base(TypeTag::Int),
        Type::base(TypeTag::String),
        Type::base(TypeTag::Any),
        Type::vector(Type::base(TypeTag::Count)),
        Type::base(TypeTag::Port),
        Type::base(TypeTag::Record),
    ]);
    let i = cx.heap_mut().int(-3).unwrap();
    frame.assign(0, Some(i), &mut cx);
    let s = cx.heap_mut().string("payload").unwrap();
    frame.assign(1, Some(s), &mut cx);
    let a = cx.heap_mut().addr("2001:db8::1".parse().unwrap()).unwrap();
    frame.assign(2, Some(a), &mut cx);
    let v = cx.new_vector(Type::vector(Type::base(TypeTag::Count))).unwrap();
    let c = cx.heap_mut().count(7).unwrap();
    cx.vector_set(&v, 0, Some(c));
    frame.assign(3, Some(v), &mut cx);
    frame.assign(4, Some(port), &mut cx);
    // absent record
    frame.assign(5, None, &mut cx);

    assert_eq!(frame.owned_references(), 3);
    assert_ne!(live(&cx.heap().heap_stats()), baseline);

    frame.teardown(cx.heap_mut());
    assert_eq!(live(&cx.heap().heap_stats()), baseline);
    assert!(!cx.check_and_clear());
}

// =============================================================================
// 3. Copy
// =============================================================================

#[test]
fn copy_slot_acquires_a_reference() {
    let mut cx = ExecContext::new();
    let ty = Type::base(TypeTag::Subnet);
    let mut frame = Frame::new([ty.clone(), ty]);
    let net = cx.heap_mut().subnet("10.0.0.0".parse().unwrap(), 8).unwrap();
    let id = net.id();
    frame.assign(0, Some(net), &mut cx);

    frame.copy_slot(0, 1, &mut cx);
    assert_eq!(frame.cell(0), frame.cell(1));
    assert_eq!(cx.heap().get_refcount(id), 2);

    frame.clear_slot(0, cx.heap_mut());
    assert_eq!(cx.heap().get_refcount(id), 1);
    frame.teardown(cx.heap_mut());
    assert!(!cx.heap().is_live(id));
}

#[test]
fn copy_slot_onto_itself_keeps_the_value() {
    let mut cx = ExecContext::new();
    let mut frame = Frame::new([Type::base(TypeTag::String)]);
    let s = cx.heap_mut().string("self").unwrap();
    let id = s.id();
    frame.assign(0, Some(s), &mut cx);
    frame.copy_slot(0, 0, &mut cx);
    assert_eq!(cx.heap().get_refcount(id), 1);
    frame.teardown(cx.heap_mut());
    assert!(!cx.heap().is_live(id));
}

#[test]
#[should_panic(expected = "string cell stored into count slot")]
fn copy_between_different_types_is_fatal() {
    let mut cx = ExecContext::new();
    let mut frame = Frame::new([Type::base(TypeTag::String), Type::base(TypeTag::Count)]);
    frame.copy_slot(0, 1, &mut cx);
}
