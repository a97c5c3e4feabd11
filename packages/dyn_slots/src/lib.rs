//! Fixed-capacity containers that store values of different concrete types behind a common
//! base type (usually a trait object), each value living in one of a number of uniformly sized
//! slots reserved up front.
//!
//! This crate provides two containers:
//!
//! * [`SlotArray`] - a fixed number of independent slots, each either empty or occupied.
//! * [`SlotVec`] - a dense sequence with a length and a fixed capacity, supporting insertion
//!   and removal in the middle by shifting elements.
//!
//! Each container makes exactly one heap allocation, when it is built, holding the slots and all
//! bookkeeping. It never allocates again. Moving a container value does not allocate either;
//! only creating a new container through `try_clone()` or `take()` does. Every
//! element is stored inline in its slot, so the element type only needs to fit the slot size
//! and alignment chosen at build time.
//!
//! # Key Features
//!
//! - **Heterogeneous storage**: any type that fits a slot and converts to the base type
//! - **No allocation after construction**: inserting, removing and shifting reuse the slots
//! - **Per-type capabilities**: each type declares whether it can be copied and whether it can
//!   be relocated, and the containers refuse operations the stored types do not support
//! - **Capability queries**: [`SlotArray::is_copyable()`] and [`SlotVec::is_movable()`] tell
//!   up front whether a whole-container copy or a shift will succeed
//! - **Thread mobility**: containers are [`Send`] if the base type is [`Send`]
//!
//! # Declaring element types
//!
//! A type becomes storable by implementing [`Element`] and [`Upcast<B>`][Upcast]. The
//! [`element!`] macro does both:
//!
//! ```rust
//! use dyn_slots::element;
//!
//! trait Shape {
//!     fn area(&self) -> f64;
//! }
//!
//! #[derive(Clone, Copy)]
//! struct Circle {
//!     radius: f64,
//! }
//!
//! impl Shape for Circle {
//!     fn area(&self) -> f64 {
//!         std::f64::consts::PI * self.radius * self.radius
//!     }
//! }
//!
//! // Circle can be copied bitwise and relocated freely.
//! element!(Circle => dyn Shape, copy);
//! ```
//!
//! # Examples
//!
//! ## Slot array
//!
//! ```rust
//! use dyn_slots::{SlotArray, element};
//! use new_zealand::nz;
//!
//! trait Shape {
//!     fn area(&self) -> f64;
//! }
//!
//! struct Square(f64);
//!
//! struct Rectangle(f64, f64);
//!
//! impl Shape for Square {
//!     fn area(&self) -> f64 {
//!         self.0 * self.0
//!     }
//! }
//!
//! impl Shape for Rectangle {
//!     fn area(&self) -> f64 {
//!         self.0 * self.1
//!     }
//! }
//!
//! element!(Square => dyn Shape);
//! element!(Rectangle => dyn Shape);
//!
//! let mut shapes = SlotArray::<dyn Shape>::builder()
//!     .capacity(nz!(4))
//!     .fits::<Square>()
//!     .fits::<Rectangle>()
//!     .build();
//!
//! shapes.emplace(0, Square(2.0))?;
//! shapes.emplace(2, Rectangle(2.0, 3.0))?;
//!
//! let total: f64 = shapes.iter().flatten().map(|shape| shape.area()).sum();
//! assert_eq!(total, 10.0);
//!
//! assert!(shapes.at(1)?.is_none());
//! # Ok::<(), dyn_slots::Error>(())
//! ```
//!
//! ## Slot vector
//!
//! ```rust
//! use dyn_slots::{SlotVec, element};
//! use new_zealand::nz;
//!
//! trait Greeter {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//!
//! struct Maori;
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! impl Greeter for Maori {
//!     fn greet(&self) -> String {
//!         "kia ora".to_string()
//!     }
//! }
//!
//! element!(English => dyn Greeter);
//! element!(Maori => dyn Greeter);
//!
//! let mut greeters = SlotVec::<dyn Greeter>::builder()
//!     .capacity(nz!(4))
//!     .slot_size(8)
//!     .alignment(8)
//!     .build();
//!
//! greeters.push(English)?;
//! greeters.insert(0, Maori)?;
//!
//! assert_eq!(greeters.front()?.unwrap().greet(), "kia ora");
//!
//! greeters.remove(0)?;
//! assert_eq!(greeters.len(), 1);
//! # Ok::<(), dyn_slots::Error>(())
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod array;
mod builder;
mod cache;
mod capabilities;
mod config;
mod descriptor;
mod error;
mod iter;
mod slab;
mod upcast;
mod vec;

pub use array::SlotArray;
pub use builder::{SlotArrayBuilder, SlotVecBuilder};
pub use config::SlotConfig;
pub use descriptor::{Duplicate, Element, TypeDescriptor, descriptor_of};
pub use error::{EmplaceError, Error};
pub(crate) use error::Result;
pub use iter::{Iter, IterMut};
pub use upcast::Upcast;
pub use vec::SlotVec;
