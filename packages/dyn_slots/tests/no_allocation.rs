//! Verifies the allocation behavior of the containers.
//!
//! Building a container allocates one storage block. Copying or moving a whole container into a
//! new one allocates one block of the same size. Every other operation, including moving and
//! dropping the container value itself, allocates nothing.

#![cfg(not(miri))] // Miri replaces the global allocator, so cannot be used here.

use std::fmt::Debug;
use std::hint::black_box;

use alloc_tracker::{Allocator, Session};
use dyn_slots::{SlotArray, SlotVec, element};
use new_zealand::nz;

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

#[expect(dead_code, reason = "fields give the elements their size and are only printed via Debug")]
#[derive(Clone, Copy, Debug)]
struct Small(u16);

#[expect(dead_code, reason = "fields give the elements their size and are only printed via Debug")]
#[derive(Clone, Debug)]
struct Tagged {
    tag: &'static str,
    value: u64,
}

#[expect(dead_code, reason = "fields give the elements their size and are only printed via Debug")]
#[derive(Debug)]
struct Fixed([u32; 4]);

#[expect(dead_code, reason = "fields give the elements their size and are only printed via Debug")]
#[derive(Debug)]
struct Anchored(u8);

element!(Small => dyn Debug, copy);
element!(Tagged => dyn Debug, clone);
element!(Fixed => dyn Debug);
element!(Anchored => dyn Debug, immovable);

fn new_vector() -> SlotVec<dyn Debug> {
    SlotVec::builder()
        .capacity(nz!(8))
        .fits::<Small>()
        .fits::<Tagged>()
        .fits::<Fixed>()
        .fits::<Anchored>()
        .build()
}

fn new_array() -> SlotArray<dyn Debug> {
    SlotArray::builder()
        .capacity(nz!(4))
        .fits::<Small>()
        .fits::<Tagged>()
        .fits::<Fixed>()
        .build()
}

fn vector_sized_array() -> SlotArray<dyn Debug> {
    SlotArray::builder()
        .capacity(nz!(8))
        .fits::<Small>()
        .fits::<Tagged>()
        .fits::<Fixed>()
        .fits::<Anchored>()
        .build()
}

fn tagged(value: u64) -> Tagged {
    Tagged { tag: "t", value }
}

#[test]
fn building_allocates_one_block() {
    let session = Session::new();

    let vector_op = session.operation("build_vector");
    let vec = {
        let _span = vector_op.measure_thread();
        new_vector()
    };

    let array_op = session.operation("build_array");
    let array = {
        let _span = array_op.measure_thread();
        vector_sized_array()
    };

    let block = vector_op.total_bytes_allocated();
    let slot_bytes = u64::try_from(vec.capacity() * vec.slot_size()).unwrap();

    // The slots and their bookkeeping share the block.
    assert!(block > slot_bytes);
    assert_eq!(array_op.total_bytes_allocated(), block);
    assert_eq!(array.len(), vec.capacity());
}

#[test]
fn whole_container_copy_and_move_allocate_one_block_each() {
    let session = Session::new();

    let build_op = session.operation("build");
    let mut vec = {
        let _span = build_op.measure_thread();
        new_vector()
    };

    vec.push(Small(1)).unwrap();
    vec.push(tagged(2)).unwrap();

    let clone_op = session.operation("try_clone");
    let copy = {
        let _span = clone_op.measure_thread();
        vec.try_clone().unwrap()
    };

    let take_op = session.operation("take");
    let moved = {
        let _span = take_op.measure_thread();
        vec.take().unwrap()
    };

    let block = build_op.total_bytes_allocated();

    assert_eq!(clone_op.total_bytes_allocated(), block);
    assert_eq!(take_op.total_bytes_allocated(), block);
    assert_eq!(copy.len(), 2);
    assert_eq!(moved.len(), 2);
    assert!(vec.is_empty());
}

#[test]
fn moving_and_dropping_containers_do_not_allocate() {
    let session = Session::new();

    let mut vec = new_vector();
    vec.push(tagged(1)).unwrap();

    let mut array = new_array();
    array.emplace(2, Small(2)).unwrap();

    let op = session.operation("move_and_drop");

    let moved = {
        let _span = op.measure_thread();

        let relocated = black_box(vec);
        drop(black_box(array));

        relocated
    };

    assert_eq!(op.total_bytes_allocated(), 0);
    assert_eq!(moved.len(), 1);
}

#[test]
fn vector_mutations_do_not_allocate() {
    let session = Session::new();
    let mut vec = new_vector();

    let op = session.operation("vector_mutations");

    {
        let _span = op.measure_thread();

        vec.push(Small(1)).unwrap();
        vec.push(tagged(2)).unwrap();
        vec.push(Fixed([3; 4])).unwrap();
        vec.insert(0, Small(0)).unwrap();
        vec.insert(2, tagged(9)).unwrap();
        vec.try_push_with::<_, ()>(|| Ok(Small(5))).unwrap();

        vec.remove(2).unwrap();
        vec.remove_range(1..3).unwrap();
        vec.pop().unwrap();

        vec.resize(6).unwrap();
        vec.truncate(2);
        vec.reserve(8).unwrap();
        vec.shrink_to_fit();

        // Rejected operations do not allocate either.
        vec.push(Anchored(1)).unwrap();
        _ = black_box(vec.insert(0, Small(7)));
        _ = black_box(vec.remove(0));
        _ = black_box(vec.resize(100));

        vec.clear();
    }

    assert_eq!(op.total_bytes_allocated(), 0);
}

#[test]
fn vector_reads_do_not_allocate() {
    let session = Session::new();
    let mut vec = new_vector();

    vec.push(Small(1)).unwrap();
    vec.push(tagged(2)).unwrap();
    vec.resize(4).unwrap();

    let op = session.operation("vector_reads");

    {
        let _span = op.measure_thread();

        black_box(vec.front().unwrap());
        black_box(vec.back().unwrap());
        black_box(vec.at(1).unwrap());
        black_box(vec.get(3));
        black_box(vec.data());
        black_box(vec.is_copyable());
        black_box(vec.is_movable());
        black_box(vec.element_type(0).unwrap());

        let occupied = vec.iter().flatten().count();
        black_box(occupied);

        let reversed = vec.iter().rev().filter(Option::is_none).count();
        black_box(reversed);

        for element in vec.iter_mut().flatten() {
            black_box(element);
        }

        let first = vec.get(0).unwrap();
        black_box(vec.index_of(first));
    }

    assert_eq!(op.total_bytes_allocated(), 0);
}

#[test]
fn vector_assignment_does_not_allocate() {
    let session = Session::new();

    let mut source = new_vector();
    source.push(Small(1)).unwrap();
    source.push(tagged(2)).unwrap();

    let mut target = new_vector();
    target.push(tagged(7)).unwrap();

    let mut moved_into = new_vector();

    let op = session.operation("vector_assignment");

    {
        let _span = op.measure_thread();

        target.try_clone_from(&source).unwrap();
        moved_into.move_from(&mut source).unwrap();
    }

    assert_eq!(op.total_bytes_allocated(), 0);
    assert_eq!(target.len(), 2);
    assert_eq!(moved_into.len(), 2);
}

#[test]
fn array_operations_do_not_allocate() {
    let session = Session::new();

    let mut array = new_array();
    let mut other = new_array();
    let mut moved_into = new_array();

    let op = session.operation("array_operations");

    {
        let _span = op.measure_thread();

        array.emplace(0, Small(1)).unwrap();
        array.emplace(3, tagged(3)).unwrap();
        array.emplace(0, Fixed([0; 4])).unwrap();
        array.try_emplace_with::<_, ()>(1, || Ok(Small(2))).unwrap();
        _ = black_box(array.try_emplace_with::<Small, _>(2, || Err(())));

        black_box(array.front());
        black_box(array.back());
        black_box(array.at(3).unwrap());
        black_box(array.iter().flatten().count());

        array.emplace(0, Small(4)).unwrap();
        other.try_clone_from(&array).unwrap();
        moved_into.move_from(&mut other).unwrap();

        array.clear();
    }

    assert_eq!(op.total_bytes_allocated(), 0);
    assert!(moved_into.at(3).unwrap().is_some());
}
