//! Integration tests for `dyn_slots` covering typical usage of both containers through the
//! public API only.

use std::cell::Cell;
use std::fmt::Debug;
use std::rc::Rc;
use std::{ptr, thread};

use dyn_slots::{EmplaceError, Error, SlotArray, SlotVec, descriptor_of, element};
use new_zealand::nz;
use static_assertions::{assert_impl_all, assert_not_impl_any};

trait Animal {
    fn name(&self) -> String;
    fn speak(&self) -> &'static str;
}

#[derive(Clone)]
struct Dog {
    name: String,
}

impl Animal for Dog {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn speak(&self) -> &'static str {
        "woof"
    }
}

#[derive(Clone, Copy)]
struct Bird {
    wingspan_cm: u32,
    legs: u8,
}

impl Animal for Bird {
    fn name(&self) -> String {
        format!("bird with {} cm wings and {} legs", self.wingspan_cm, self.legs)
    }

    fn speak(&self) -> &'static str {
        "tweet"
    }
}

/// Owns a resource that cannot be copied, but can be moved.
struct Hermit {
    id: u32,
    drops: Rc<Cell<usize>>,
}

impl Drop for Hermit {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

impl Animal for Hermit {
    fn name(&self) -> String {
        format!("hermit {}", self.id)
    }

    fn speak(&self) -> &'static str {
        "..."
    }
}

/// Registered with an external party by address, so it must stay where it was constructed.
struct Barnacle {
    id: u32,
    drops: Rc<Cell<usize>>,
}

impl Drop for Barnacle {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

impl Animal for Barnacle {
    fn name(&self) -> String {
        format!("barnacle {}", self.id)
    }

    fn speak(&self) -> &'static str {
        "(silence)"
    }
}

/// Counts every clone, so tests can tell a shift by copy from a shift by move.
struct Sheep {
    id: u32,
    clones: Rc<Cell<usize>>,
}

impl Clone for Sheep {
    fn clone(&self) -> Self {
        self.clones.set(self.clones.get() + 1);

        Self {
            id: self.id,
            clones: Rc::clone(&self.clones),
        }
    }
}

impl Animal for Sheep {
    fn name(&self) -> String {
        format!("sheep {}", self.id)
    }

    fn speak(&self) -> &'static str {
        "baa"
    }
}

element!(Dog => dyn Animal, clone);
element!(Bird => dyn Animal, copy);
element!(Hermit => dyn Animal);
element!(Barnacle => dyn Animal, immovable);
element!(Sheep => dyn Animal, clone);

#[derive(Debug)]
#[expect(dead_code, reason = "field is only printed via Debug")]
struct Reading(f32);

element!(Reading => dyn Debug + Send);

assert_impl_all!(SlotArray<dyn Debug + Send>: Send, Debug);
assert_impl_all!(SlotVec<dyn Debug + Send>: Send, Debug);
assert_not_impl_any!(SlotArray<dyn Debug + Send>: Sync);
assert_not_impl_any!(SlotVec<dyn Debug + Send>: Sync);
assert_not_impl_any!(SlotArray<dyn Animal>: Send, Sync);
assert_not_impl_any!(SlotVec<dyn Animal>: Send, Sync);

fn zoo() -> SlotVec<dyn Animal> {
    SlotVec::builder()
        .capacity(nz!(4))
        .fits::<Dog>()
        .fits::<Bird>()
        .fits::<Hermit>()
        .fits::<Barnacle>()
        .fits::<Sheep>()
        .build()
}

fn names(animals: &SlotVec<dyn Animal>) -> Vec<String> {
    animals
        .iter()
        .map(|animal| animal.map_or_else(|| "-".to_string(), Animal::name))
        .collect()
}

fn dog(name: &str) -> Dog {
    Dog {
        name: name.to_string(),
    }
}

#[test]
fn array_holds_mixed_types_in_chosen_slots() {
    let mut array = SlotArray::<dyn Animal>::builder()
        .capacity(nz!(4))
        .fits::<Dog>()
        .fits::<Bird>()
        .build();

    array.emplace(0, dog("rex")).unwrap();
    array.emplace(
        2,
        Bird {
            wingspan_cm: 30,
            legs: 2,
        },
    )
    .unwrap();

    assert_eq!(array.len(), 4);
    assert!(array.at(1).unwrap().is_none());
    assert!(array.at(3).unwrap().is_none());
    assert_eq!(array.at(0).unwrap().unwrap().speak(), "woof");
    assert_eq!(array.at(2).unwrap().unwrap().speak(), "tweet");

    // Copying is allowed because both types can be copied.
    let copy = array.try_clone().unwrap();
    assert_eq!(copy.at(0).unwrap().unwrap().name(), "rex");
}

#[test]
fn slot_is_sized_for_the_largest_type() {
    let array = SlotArray::<dyn Animal>::builder()
        .capacity(nz!(2))
        .fits::<Bird>()
        .fits::<Dog>()
        .build();

    assert_eq!(array.slot_size(), size_of::<Dog>().max(size_of::<Bird>()));
    assert_eq!(array.alignment(), align_of::<Dog>().max(align_of::<Bird>()));
}

#[test]
fn every_element_is_aligned_to_the_slot() {
    #[repr(align(32))]
    #[derive(Debug)]
    #[expect(dead_code, reason = "field is only printed via Debug")]
    struct Wide(u8);

    element!(Wide => dyn Debug);

    let mut vec = SlotVec::<dyn Debug>::builder()
        .capacity(nz!(5))
        .slot_size(32)
        .alignment(32)
        .build();

    for value in 0..5 {
        vec.push(Wide(value)).unwrap();
    }

    for pointer in vec.data().iter().flatten() {
        assert_eq!(pointer.as_ptr().cast::<u8>().addr() % 32, 0);
    }

    assert_eq!(format!("{:?}", vec.back().unwrap().unwrap()), "Wide(4)");
}

#[test]
#[should_panic]
fn storing_a_type_that_does_not_fit_panics() {
    let mut vec = SlotVec::<dyn Animal>::builder()
        .capacity(nz!(2))
        .fits::<Bird>()
        .build();

    _ = vec.push(dog("too big"));
}

#[test]
fn vector_rejects_append_beyond_capacity() {
    let mut animals = SlotVec::<dyn Animal>::builder()
        .capacity(nz!(3))
        .fits::<Dog>()
        .build();

    animals.push(dog("a")).unwrap();
    animals.push(dog("b")).unwrap();
    animals.push(dog("c")).unwrap();
    assert_eq!(animals.len(), 3);

    let result = animals.push(dog("d"));

    assert!(matches!(
        result,
        Err(Error::CapacityExceeded {
            capacity: 3,
            requested: 4
        })
    ));
    assert_eq!(animals.len(), 3);
    assert_eq!(names(&animals), ["a", "b", "c"]);
}

#[test]
fn move_only_vector_can_move_but_not_copy() {
    let drops = Rc::new(Cell::new(0));
    let mut animals = zoo();

    animals
        .push(Hermit {
            id: 1,
            drops: Rc::clone(&drops),
        })
        .unwrap();

    assert!(!animals.is_copyable());
    assert!(animals.is_movable());

    assert!(matches!(
        animals.try_clone(),
        Err(Error::CopyNotSupported { type_name }) if type_name.ends_with("Hermit")
    ));

    let moved = animals.take().unwrap();

    assert_eq!(animals.len(), 0);
    assert_eq!(names(&moved), ["hermit 1"]);

    // Moving relocates, it does not copy and destroy.
    assert_eq!(drops.get(), 0);

    drop(moved);
    assert_eq!(drops.get(), 1);
}

#[test]
fn pinned_elements_only_leave_from_the_tail() {
    let drops = Rc::new(Cell::new(0));
    let mut animals = zoo();

    for id in 0..3 {
        animals
            .push(Barnacle {
                id,
                drops: Rc::clone(&drops),
            })
            .unwrap();
    }

    assert!(!animals.is_copyable());
    assert!(!animals.is_movable());

    animals.pop().unwrap();
    assert_eq!(drops.get(), 1);

    assert!(matches!(
        animals.remove(0),
        Err(Error::TransferNotSupported { type_name }) if type_name.ends_with("Barnacle")
    ));
    assert_eq!(names(&animals), ["barnacle 0", "barnacle 1"]);
    assert_eq!(drops.get(), 1);

    animals.remove(1).unwrap();
    assert_eq!(names(&animals), ["barnacle 0"]);
    assert_eq!(drops.get(), 2);
}

#[test]
fn pinned_elements_stay_at_their_address() {
    let drops = Rc::new(Cell::new(0));
    let mut animals = zoo();

    animals.push(dog("first")).unwrap();
    let barnacle: *const Barnacle = animals
        .push(Barnacle {
            id: 7,
            drops: Rc::clone(&drops),
        })
        .unwrap();

    // Removing after the pinned element never needs to relocate it.
    animals.push(dog("last")).unwrap();
    animals.pop().unwrap();

    let current = animals.get(1).unwrap();
    assert!(ptr::addr_eq(ptr::from_ref(current), barnacle));
}

#[test]
fn insert_at_front_shifts_by_moving_only() {
    let clones = Rc::new(Cell::new(0));
    let mut flock = zoo();

    for id in 0..3 {
        flock
            .push(Sheep {
                id,
                clones: Rc::clone(&clones),
            })
            .unwrap();
    }

    flock
        .insert(
            0,
            Sheep {
                id: 100,
                clones: Rc::clone(&clones),
            },
        )
        .unwrap();

    assert_eq!(clones.get(), 0);
    assert_eq!(names(&flock), ["sheep 100", "sheep 0", "sheep 1", "sheep 2"]);
}

#[test]
fn failed_construction_leaves_containers_consistent() {
    let mut animals = zoo();
    animals.push(dog("a")).unwrap();

    let result = animals.try_insert_with::<Dog, _>(0, || Err("no name"));

    assert!(matches!(
        result,
        Err(EmplaceError::ElementConstructionFailed("no name"))
    ));
    assert_eq!(names(&animals), ["a"]);

    let mut array = SlotArray::<dyn Animal>::builder()
        .capacity(nz!(2))
        .fits::<Dog>()
        .build();
    array.emplace(1, dog("b")).unwrap();

    let result = array.try_emplace_with::<Dog, _>(1, || Err(42));

    assert!(matches!(
        result,
        Err(EmplaceError::ElementConstructionFailed(42))
    ));
    assert!(array.at(1).unwrap().is_none());
}

#[test]
fn every_element_is_dropped_exactly_once() {
    let drops = Rc::new(Cell::new(0));

    {
        let mut animals = zoo();

        for id in 0..4 {
            animals
                .push(Hermit {
                    id,
                    drops: Rc::clone(&drops),
                })
                .unwrap();
        }

        animals.remove(1).unwrap();
        assert_eq!(drops.get(), 1);

        animals
            .insert(
                0,
                Hermit {
                    id: 9,
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();

        let mut other = zoo();
        other.move_from(&mut animals).unwrap();
        assert_eq!(drops.get(), 1);

        other.truncate(2);
        assert_eq!(drops.get(), 3);
    }

    assert_eq!(drops.get(), 5);
}

#[test]
fn copy_assign_replaces_contents() {
    let mut source = zoo();
    source.push(dog("a")).unwrap();
    source
        .push(Bird {
            wingspan_cm: 10,
            legs: 2,
        })
        .unwrap();

    let mut target = zoo();
    target.push(dog("z")).unwrap();
    target.push(dog("y")).unwrap();
    target.push(dog("x")).unwrap();

    target.try_clone_from(&source).unwrap();

    assert_eq!(names(&target), names(&source));
    assert_eq!(target.len(), 2);
}

#[test]
fn descriptors_report_declared_capabilities() {
    let bird = descriptor_of::<Bird>();
    assert!(bird.is_trivially_relocatable());
    assert!(bird.is_copy_constructible());
    assert!(bird.is_move_constructible());
    assert_eq!(bird.size(), size_of::<Bird>());

    let barnacle = descriptor_of::<Barnacle>();
    assert!(!barnacle.is_copy_constructible());
    assert!(!barnacle.is_move_constructible());

    let mut array = SlotArray::<dyn Animal>::builder()
        .capacity(nz!(1))
        .fits::<Bird>()
        .build();
    array
        .emplace(
            0,
            Bird {
                wingspan_cm: 1,
                legs: 2,
            },
        )
        .unwrap();

    assert!(array.element_type(0).unwrap().unwrap().is_same_type(bird));
}

#[test]
fn containers_move_between_threads() {
    let mut readings = SlotVec::<dyn Debug + Send>::builder()
        .capacity(nz!(2))
        .fits::<Reading>()
        .build();
    readings.push(Reading(1.5)).unwrap();

    let rendered = thread::spawn(move || format!("{:?}", readings.front().unwrap().unwrap()))
        .join()
        .unwrap();

    assert_eq!(rendered, "Reading(1.5)");
}
