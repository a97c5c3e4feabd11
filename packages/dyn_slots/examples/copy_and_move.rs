//! Demonstrates how element capabilities govern whole-container copies, moves and shifts.
//!
//! Each element type declares whether it can be copied and whether it can be relocated. The
//! containers report the combined capabilities of their current contents and refuse the
//! operations that some element cannot support.

use std::fmt::Debug;

use dyn_slots::{SlotVec, descriptor_of, element};
use new_zealand::nz;

/// Copyable and relocatable as raw bytes.
#[derive(Clone, Copy, Debug)]
struct Point {
    _x: i32,
    _y: i32,
}

/// Copyable through `Clone`, relocatable.
#[derive(Clone, Debug)]
struct Label {
    _text: &'static str,
}

/// Relocatable but not copyable.
#[derive(Debug)]
struct Ticket {
    _serial: u64,
}

/// Neither copyable nor relocatable, e.g. because its address was handed out elsewhere.
#[derive(Debug)]
struct Registration {
    _handle: u32,
}

element!(Point => dyn Debug, copy);
element!(Label => dyn Debug, clone);
element!(Ticket => dyn Debug);
element!(Registration => dyn Debug, immovable);

fn new_vec() -> SlotVec<dyn Debug> {
    SlotVec::builder()
        .capacity(nz!(4))
        .fits::<Point>()
        .fits::<Label>()
        .fits::<Ticket>()
        .fits::<Registration>()
        .build()
}

fn report(name: &str, vec: &SlotVec<dyn Debug>) {
    println!(
        "{name}: {} elements, copyable = {}, movable = {}",
        vec.len(),
        vec.is_copyable(),
        vec.is_movable()
    );
}

fn main() -> Result<(), dyn_slots::Error> {
    for (name, descriptor) in [
        ("Point", descriptor_of::<Point>()),
        ("Label", descriptor_of::<Label>()),
        ("Ticket", descriptor_of::<Ticket>()),
        ("Registration", descriptor_of::<Registration>()),
    ] {
        println!(
            "{name}: {} bytes, copy = {}, move = {}, bitwise = {}",
            descriptor.size(),
            descriptor.is_copy_constructible(),
            descriptor.is_move_constructible(),
            descriptor.is_trivially_relocatable()
        );
    }

    let mut copyable = new_vec();
    copyable.push(Point { _x: 1, _y: 2 })?;
    copyable.push(Label { _text: "origin" })?;
    report("copyable", &copyable);

    let copy = copyable.try_clone()?;
    println!("copied: {:?}", copy.iter().flatten().collect::<Vec<_>>());

    let mut move_only = new_vec();
    move_only.push(Ticket { _serial: 77 })?;
    report("move_only", &move_only);

    if let Err(error) = move_only.try_clone() {
        println!("copy refused: {error}");
    }

    let moved = move_only.take()?;
    report("move_only after take", &move_only);
    report("moved", &moved);

    let mut pinned = new_vec();
    pinned.push(Registration { _handle: 1 })?;
    pinned.push(Point { _x: 0, _y: 0 })?;
    report("pinned", &pinned);

    // Inserting after the pinned element leaves it in place.
    pinned.insert(1, Label { _text: "after" })?;

    // Inserting before it would need to relocate it.
    if let Err(error) = pinned.insert(0, Label { _text: "before" }) {
        println!("insert refused: {error}");
    }

    // Removal only shifts when something follows the removed range.
    if let Err(error) = pinned.remove(1) {
        println!("remove refused: {error}");
    }

    pinned.pop()?;
    pinned.pop()?;
    pinned.pop()?;
    report("pinned after popping everything", &pinned);

    Ok(())
}
