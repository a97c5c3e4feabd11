//! Basic usage example for `SlotArray` and `SlotVec`.
//!
//! This example stores several shapes of different concrete types behind a common trait,
//! first in a fixed array of slots and then in a vector that supports insertion and removal.

use dyn_slots::{SlotArray, SlotVec, element};
use new_zealand::nz;

trait Shape {
    fn name(&self) -> &'static str;
    fn area(&self) -> f64;
}

#[derive(Clone, Copy)]
struct Circle {
    radius: f64,
}

#[derive(Clone, Copy)]
struct Rectangle {
    width: f64,
    height: f64,
}

#[derive(Clone)]
struct Polygon {
    corners: [(f64, f64); 3],
}

impl Shape for Circle {
    fn name(&self) -> &'static str {
        "circle"
    }

    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

impl Shape for Rectangle {
    fn name(&self) -> &'static str {
        "rectangle"
    }

    fn area(&self) -> f64 {
        self.width * self.height
    }
}

impl Shape for Polygon {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn area(&self) -> f64 {
        let [(ax, ay), (bx, by), (cx, cy)] = self.corners;
        (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by)).abs() / 2.0
    }
}

element!(Circle => dyn Shape, copy);
element!(Rectangle => dyn Shape, copy);
element!(Polygon => dyn Shape, clone);

fn main() -> Result<(), dyn_slots::Error> {
    // Every slot is sized for the largest of the listed types.
    let mut board = SlotArray::<dyn Shape>::builder()
        .capacity(nz!(4))
        .fits::<Circle>()
        .fits::<Rectangle>()
        .fits::<Polygon>()
        .build();

    println!(
        "Created SlotArray with {} slots of {} bytes each",
        board.len(),
        board.slot_size()
    );

    board.emplace(0, Circle { radius: 1.0 })?;
    board.emplace(
        2,
        Rectangle {
            width: 2.0,
            height: 3.0,
        },
    )?;

    for (index, slot) in board.iter().enumerate() {
        match slot {
            Some(shape) => println!("slot {index}: {} with area {:.2}", shape.name(), shape.area()),
            None => println!("slot {index}: empty"),
        }
    }

    // Constructing into an occupied slot replaces the previous value.
    board.emplace(
        0,
        Polygon {
            corners: [(0.0, 0.0), (4.0, 0.0), (0.0, 3.0)],
        },
    )?;
    println!("slot 0 now holds a {}", board.at(0)?.map_or("nothing", Shape::name));

    let mut queue = SlotVec::<dyn Shape>::builder()
        .capacity(nz!(3))
        .fits::<Circle>()
        .fits::<Rectangle>()
        .build();

    queue.push(Circle { radius: 2.0 })?;
    queue.push(Rectangle {
        width: 1.0,
        height: 1.0,
    })?;
    queue.insert(0, Circle { radius: 0.5 })?;

    let total: f64 = queue.iter().flatten().map(Shape::area).sum();
    println!("{} shapes in the queue, total area {total:.2}", queue.len());

    match queue.push(Circle { radius: 9.0 }) {
        Err(error) => println!("fourth push rejected: {error}"),
        Ok(_) => println!("fourth push unexpectedly succeeded"),
    }

    queue.remove(1)?;
    println!("after removing the middle shape: {} left", queue.len());

    Ok(())
}
