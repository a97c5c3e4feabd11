use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::{any, fmt};

use tracing::{debug, trace};

use crate::cache::PointerCache;
use crate::capabilities::Capabilities;
use crate::slab::SlotSlab;
use crate::{
    Element, EmplaceError, Error, Iter, IterMut, Result, SlotArrayBuilder, SlotConfig,
    TypeDescriptor, Upcast,
};

/// A fixed number of slots, each holding either nothing or one value of any concrete type that
/// fits the slot and can be viewed as `B`.
///
/// Every index always exists: [`len()`][Self::len] is the configured capacity, and individual
/// slots report whether they are occupied when accessed. A slot can be filled or overwritten
/// with [`emplace()`][Self::emplace] and the whole array emptied with [`clear()`][Self::clear].
///
/// All storage is allocated in a single block when the array is built. No operation on an
/// existing array allocates memory, and elements never change address unless the whole array
/// is moved into another array via [`take()`][Self::take] or [`move_from()`][Self::move_from].
///
/// # Example
///
/// ```
/// use dyn_slots::{SlotArray, element};
/// use new_zealand::nz;
///
/// trait Component {
///     fn name(&self) -> &'static str;
/// }
///
/// struct Position(f32, f32);
/// struct Velocity(f32, f32, f32);
///
/// impl Component for Position {
///     fn name(&self) -> &'static str {
///         "position"
///     }
/// }
///
/// impl Component for Velocity {
///     fn name(&self) -> &'static str {
///         "velocity"
///     }
/// }
///
/// element!(Position => dyn Component);
/// element!(Velocity => dyn Component);
///
/// let mut components = SlotArray::<dyn Component>::builder()
///     .capacity(nz!(4))
///     .fits::<Position>()
///     .fits::<Velocity>()
///     .build();
///
/// components.emplace(0, Position(1.0, 2.0))?;
/// components.emplace(2, Velocity(0.0, 1.0, 0.0))?;
///
/// let names: Vec<_> = components
///     .iter()
///     .map(|slot| slot.map(|component| component.name()))
///     .collect();
///
/// assert_eq!(names, [Some("position"), None, Some("velocity"), None]);
/// # Ok::<(), dyn_slots::Error>(())
/// ```
///
/// # Thread safety
///
/// The array is [`Send`] if `B` is [`Send`] (e.g. `dyn Component + Send`). It is never
/// [`Sync`] because reads update an internal cache.
pub struct SlotArray<B: ?Sized> {
    slab: SlotSlab<B>,
    capabilities: Capabilities,
    cache: PointerCache<B>,
}

impl<B: ?Sized> SlotArray<B> {
    /// Creates a builder for configuring and constructing a [`SlotArray`].
    #[inline]
    pub fn builder() -> SlotArrayBuilder<B> {
        SlotArrayBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(config: SlotConfig) -> Self {
        let slab = SlotSlab::new(config);

        // SAFETY: The buffer belongs to the slab, which is owned by the same container as the
        // cache and hands the buffer to nobody else.
        let cache = unsafe { PointerCache::new(slab.cache_buffer()) };

        Self {
            slab,
            capabilities: Capabilities::EMPTY,
            cache,
        }
    }

    /// Recomputes the capability flags and invalidates the pointer cache.
    ///
    /// Must be called after every structural mutation, and before handing control to user code
    /// that may panic, so the array is consistent if unwinding drops it.
    fn refresh(&mut self) {
        self.capabilities = Capabilities::scan(self.slab.occupants());
        self.cache.invalidate();
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    /// Stores `value` in the slot at `index`, returning a reference to the stored value.
    ///
    /// If the slot is occupied, the current value is dropped first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    ///
    /// # Example
    ///
    /// ```
    /// use std::fmt::Display;
    ///
    /// use dyn_slots::{SlotArray, element};
    /// use new_zealand::nz;
    ///
    /// struct Celsius(f64);
    ///
    /// impl Display for Celsius {
    ///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    ///         write!(f, "{} C", self.0)
    ///     }
    /// }
    ///
    /// element!(Celsius => dyn Display);
    ///
    /// let mut readings = SlotArray::<dyn Display>::builder()
    ///     .capacity(nz!(2))
    ///     .fits::<Celsius>()
    ///     .build();
    ///
    /// let reading = readings.emplace(1, Celsius(21.5))?;
    /// reading.0 += 1.0;
    ///
    /// assert_eq!(readings.at(1)?.unwrap().to_string(), "22.5 C");
    /// # Ok::<(), dyn_slots::Error>(())
    /// ```
    pub fn emplace<T>(&mut self, index: usize, value: T) -> Result<&mut T>
    where
        T: Element + Upcast<B>,
    {
        self.check_index(index)?;

        self.slab.destroy(index);
        self.refresh();

        let mut ptr = self.slab.construct(index, value);
        self.refresh();

        // SAFETY: The value was just constructed and we hold an exclusive borrow of the array,
        // which the returned reference inherits.
        Ok(unsafe { ptr.as_mut() })
    }

    /// Stores the value returned by `f` in the slot at `index`.
    ///
    /// The current occupant, if any, is dropped before `f` is called. If `f` fails, its error is
    /// returned and the slot is left empty; the previous occupant is not restored.
    ///
    /// # Errors
    ///
    /// Returns [`EmplaceError::Container`] if `index >= len()` and
    /// [`EmplaceError::ElementConstructionFailed`] if `f` fails.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    pub fn try_emplace_with<T, E>(
        &mut self,
        index: usize,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<&mut T, EmplaceError<E>>
    where
        T: Element + Upcast<B>,
    {
        self.check_index(index)?;

        self.slab.destroy(index);
        self.refresh();

        let result = self.slab.construct_with(index, f);
        self.refresh();

        match result {
            // SAFETY: The value was just constructed and we hold an exclusive borrow of the
            // array, which the returned reference inherits.
            Ok(mut ptr) => Ok(unsafe { ptr.as_mut() }),
            Err(error) => {
                debug!(
                    index,
                    element = any::type_name::<T>(),
                    "element construction failed, slot left empty"
                );

                Err(EmplaceError::ElementConstructionFailed(error))
            }
        }
    }

    /// Lets `f` initialize a value directly in the slot at `index`, dropping any current
    /// occupant first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    ///
    /// # Safety
    ///
    /// `f` must fully initialize the value before returning.
    pub unsafe fn emplace_in_place<T>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut MaybeUninit<T>),
    ) -> Result<&mut T>
    where
        T: Element + Upcast<B>,
    {
        self.check_index(index)?;

        self.slab.destroy(index);
        self.refresh();

        // SAFETY: Forwarding safety requirements to the caller.
        let mut ptr = unsafe { self.slab.construct_in_place(index, f) };
        self.refresh();

        // SAFETY: The value was just initialized and we hold an exclusive borrow of the array,
        // which the returned reference inherits.
        Ok(unsafe { ptr.as_mut() })
    }

    /// Drops every element, leaving all slots empty.
    pub fn clear(&mut self) {
        self.slab.destroy_range(0..self.len());
        self.refresh();
    }

    /// Returns the element at `index`, or `None` if the slot is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn at(&self, index: usize) -> Result<Option<&B>> {
        self.check_index(index)?;
        Ok(self.get(index))
    }

    /// Returns the element at `index` mutably, or `None` if the slot is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn at_mut(&mut self, index: usize) -> Result<Option<&mut B>> {
        self.check_index(index)?;
        Ok(self.get_mut(index))
    }

    /// Returns the element at `index`, or `None` if the slot is empty or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&B> {
        let occupant = self.slab.occupant(index)?;

        // SAFETY: The occupant record guarantees a live element and the shared borrow of the
        // array prevents mutation for the lifetime of the returned reference.
        Some(unsafe { occupant.ptr.as_ref() })
    }

    /// Returns the element at `index` mutably, or `None` if the slot is empty or out of range.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut B> {
        let mut ptr = self.slab.occupant(index)?.ptr;

        // SAFETY: The occupant record guarantees a live element and the exclusive borrow of the
        // array is inherited by the returned reference.
        Some(unsafe { ptr.as_mut() })
    }

    /// Returns the element at `index` without bounds checking, or `None` if the slot is empty.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len()`][Self::len].
    #[must_use]
    pub unsafe fn get_unchecked(&self, index: usize) -> Option<&B> {
        // SAFETY: The caller guarantees the index is in bounds.
        let record = unsafe { self.slab.occupants().get_unchecked(index) };
        let ptr = (*record)?.ptr;

        // SAFETY: The occupant record guarantees a live element and the shared borrow of the
        // array prevents mutation for the lifetime of the returned reference.
        Some(unsafe { ptr.as_ref() })
    }

    /// Returns the element at `index` mutably without bounds checking, or `None` if the slot is
    /// empty.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len()`][Self::len].
    #[must_use]
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> Option<&mut B> {
        // SAFETY: The caller guarantees the index is in bounds.
        let record = unsafe { self.slab.occupants().get_unchecked(index) };
        let mut ptr = (*record)?.ptr;

        // SAFETY: The occupant record guarantees a live element and the exclusive borrow of the
        // array is inherited by the returned reference.
        Some(unsafe { ptr.as_mut() })
    }

    /// Returns the element in the first slot, or `None` if that slot is empty.
    #[must_use]
    pub fn front(&self) -> Option<&B> {
        self.get(0)
    }

    /// Returns the element in the first slot mutably, or `None` if that slot is empty.
    #[must_use]
    pub fn front_mut(&mut self) -> Option<&mut B> {
        self.get_mut(0)
    }

    /// Returns the element in the last slot, or `None` if that slot is empty.
    #[must_use]
    pub fn back(&self) -> Option<&B> {
        self.get(self.last_index())
    }

    /// Returns the element in the last slot mutably, or `None` if that slot is empty.
    #[must_use]
    pub fn back_mut(&mut self) -> Option<&mut B> {
        self.get_mut(self.last_index())
    }

    fn last_index(&self) -> usize {
        // Cannot underflow because the capacity is non-zero.
        self.len().wrapping_sub(1)
    }

    /// Returns the address of every slot's element, with `None` for empty slots.
    #[must_use]
    pub fn data(&self) -> &[Option<NonNull<B>>] {
        self.cache.view(self.slab.occupants())
    }

    /// Iterates over all slots in index order.
    pub fn iter(&self) -> Iter<'_, B> {
        Iter::new(self.data())
    }

    /// Iterates mutably over all slots in index order.
    pub fn iter_mut(&mut self) -> IterMut<'_, B> {
        let pointers = self.cache.view(self.slab.occupants());

        // SAFETY: We hold an exclusive borrow of the array for the lifetime of the iterator.
        unsafe { IterMut::new(pointers) }
    }

    /// The number of slots. Always equal to the capacity, regardless of occupancy.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.slab.capacity()
    }

    /// Whether the array has no slots. Always `false`, because the capacity is never zero.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of slots.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slab.capacity()
    }

    /// The largest number of elements the array can hold. Same as the capacity.
    #[must_use]
    #[inline]
    pub fn max_size(&self) -> usize {
        self.slab.capacity()
    }

    /// Bytes reserved for each element.
    #[must_use]
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slab.config().slot_size()
    }

    /// Alignment guaranteed for each slot.
    #[must_use]
    #[inline]
    pub fn alignment(&self) -> usize {
        self.slab.config().alignment()
    }

    /// The configuration the array was built with.
    #[must_use]
    #[inline]
    pub fn config(&self) -> SlotConfig {
        self.slab.config()
    }

    /// Whether every element can be copied, so [`try_clone()`][Self::try_clone] will succeed.
    ///
    /// An array without elements is copyable.
    #[must_use]
    #[inline]
    pub fn is_copyable(&self) -> bool {
        self.capabilities.copyable
    }

    /// Whether every element can be moved to another slot.
    ///
    /// An array without elements is movable.
    #[must_use]
    #[inline]
    pub fn is_movable(&self) -> bool {
        self.capabilities.movable
    }

    /// Describes the concrete type of the element at `index`, or `None` if the slot is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn element_type(&self, index: usize) -> Result<Option<&'static TypeDescriptor>> {
        self.check_index(index)?;
        Ok(self.slab.occupant(index).map(|occupant| occupant.descriptor))
    }

    /// Returns the index of the slot holding `element`, or `None` if the element is not stored
    /// in this array.
    #[must_use]
    pub fn index_of(&self, element: &B) -> Option<usize> {
        self.data().iter().position(|pointer| {
            pointer.is_some_and(|pointer| ptr::addr_eq(pointer.as_ptr(), ptr::from_ref(element)))
        })
    }

    /// Creates an independent copy of the array, with the same configuration and a copy of
    /// every element in the same slot.
    ///
    /// This allocates the storage block of the new array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CopyNotSupported`] if any element cannot be copied.
    pub fn try_clone(&self) -> Result<Self> {
        self.check_copyable()?;

        trace!(len = self.len(), "copying array");

        let mut copy = Self::new_inner(self.config());

        for index in 0..self.len() {
            let result = copy.slab.duplicate_from(index, &self.slab, index);
            copy.refresh();
            result?;
        }

        Ok(copy)
    }

    /// Replaces the contents of this array with a copy of every element of `source`.
    ///
    /// Elements already present in a slot are assigned to in place if they have the same type
    /// as the source element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CopyNotSupported`] if any element of `source` cannot be copied. This
    /// array is left untouched in that case.
    ///
    /// # Panics
    ///
    /// Panics if the two arrays have different configurations.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<()> {
        assert_eq!(
            self.config(),
            source.config(),
            "arrays can only be copied between identical configurations"
        );

        source.check_copyable()?;

        trace!(len = self.len(), "copy-assigning array");

        for index in 0..self.len() {
            let result = self.slab.assign_from(index, &source.slab, index);
            self.refresh();
            result?;
        }

        Ok(())
    }

    /// Moves every element into a new array with the same configuration, leaving this array
    /// with only empty slots.
    ///
    /// This allocates the storage block of the new array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferNotSupported`] if any element can be neither moved nor copied.
    /// Nothing is moved in that case.
    pub fn take(&mut self) -> Result<Self> {
        let mut target = Self::new_inner(self.config());
        target.move_from(self)?;
        Ok(target)
    }

    /// Replaces the contents of this array with the elements of `source`, leaving `source` with
    /// only empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferNotSupported`] if any element of `source` can be neither moved
    /// nor copied. Neither array is modified in that case.
    ///
    /// # Panics
    ///
    /// Panics if the two arrays have different configurations.
    pub fn move_from(&mut self, source: &mut Self) -> Result<()> {
        assert_eq!(
            self.config(),
            source.config(),
            "arrays can only be moved between identical configurations"
        );

        source.check_transferable()?;

        trace!(len = self.len(), "moving array");

        self.clear();

        for index in 0..self.len() {
            let result = self.slab.transfer_from(index, &mut source.slab, index);
            self.refresh();
            source.refresh();
            result?;
        }

        Ok(())
    }

    fn check_copyable(&self) -> Result<()> {
        if self.capabilities.copyable {
            return Ok(());
        }

        let blocker = self
            .slab
            .find(0..self.len(), |descriptor| !descriptor.is_copy_constructible())
            .expect("copyable flag is only cleared when a non-copyable element exists");

        debug!(element = blocker.type_name(), "array copy rejected");

        Err(Error::CopyNotSupported {
            type_name: blocker.type_name(),
        })
    }

    fn check_transferable(&self) -> Result<()> {
        let blocker = self.slab.find(0..self.len(), |descriptor| {
            !descriptor.is_move_constructible() && !descriptor.is_copy_constructible()
        });

        match blocker {
            None => Ok(()),
            Some(descriptor) => {
                debug!(element = descriptor.type_name(), "array move rejected");

                Err(Error::TransferNotSupported {
                    type_name: descriptor.type_name(),
                })
            }
        }
    }
}

impl<'a, B: ?Sized> IntoIterator for &'a SlotArray<B> {
    type Item = Option<&'a B>;
    type IntoIter = Iter<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, B: ?Sized> IntoIterator for &'a mut SlotArray<B> {
    type Item = Option<&'a mut B>;
    type IntoIter = IterMut<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<B: ?Sized> fmt::Debug for SlotArray<B> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<_> = self
            .slab
            .occupants()
            .iter()
            .map(|record| record.map(|occupant| occupant.descriptor.type_name()))
            .collect();

        f.debug_struct(any::type_name::<Self>())
            .field("config", &self.config())
            .field("capabilities", &self.capabilities)
            .field("slots", &types)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::undocumented_unsafe_blocks,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::cell::Cell;
    use std::fmt::Debug;
    use std::rc::Rc;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::element;

    assert_impl_all!(SlotArray<dyn Debug + Send>: Send, Debug);
    assert_not_impl_any!(SlotArray<dyn Debug + Send>: Sync);
    assert_not_impl_any!(SlotArray<dyn Debug>: Send, Sync);

    trait Animal {
        fn speak(&self) -> String;
        fn rename(&mut self, name: &str);
    }

    #[derive(Clone)]
    struct Dog {
        name: String,
    }

    impl Animal for Dog {
        fn speak(&self) -> String {
            format!("{} says woof", self.name)
        }

        fn rename(&mut self, name: &str) {
            name.clone_into(&mut self.name);
        }
    }

    #[derive(Clone, Copy)]
    struct Bird {
        wings: u8,
    }

    impl Animal for Bird {
        fn speak(&self) -> String {
            format!("{} wings flap", self.wings)
        }

        fn rename(&mut self, _name: &str) {}
    }

    struct Snail {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Snail {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl Animal for Snail {
        fn speak(&self) -> String {
            "...".to_string()
        }

        fn rename(&mut self, _name: &str) {}
    }

    struct Rock;

    impl Animal for Rock {
        fn speak(&self) -> String {
            "rock".to_string()
        }

        fn rename(&mut self, _name: &str) {}
    }

    element!(Dog => dyn Animal, clone);
    element!(Bird => dyn Animal, copy);
    element!(Snail => dyn Animal);
    element!(Rock => dyn Animal, immovable);

    fn zoo() -> SlotArray<dyn Animal> {
        SlotArray::builder()
            .capacity(nz!(4))
            .fits::<Dog>()
            .fits::<Bird>()
            .fits::<Snail>()
            .build()
    }

    fn dog(name: &str) -> Dog {
        Dog {
            name: name.to_string(),
        }
    }

    fn speech(array: &SlotArray<dyn Animal>) -> Vec<Option<String>> {
        array.iter().map(|slot| slot.map(Animal::speak)).collect()
    }

    #[test]
    fn new_array_has_all_slots_empty() {
        let array = zoo();

        assert_eq!(array.len(), 4);
        assert_eq!(array.capacity(), 4);
        assert_eq!(array.max_size(), 4);
        assert!(!array.is_empty());
        assert!(array.iter().all(|slot| slot.is_none()));
        assert!(array.is_copyable());
        assert!(array.is_movable());
    }

    #[test]
    fn sparse_construction() {
        let mut array = zoo();

        array.emplace(0, dog("rex")).unwrap();
        array.emplace(2, Bird { wings: 2 }).unwrap();

        assert_eq!(array.len(), 4);
        assert_eq!(array.at(0).unwrap().unwrap().speak(), "rex says woof");
        assert!(array.at(1).unwrap().is_none());
        assert_eq!(array.at(2).unwrap().unwrap().speak(), "2 wings flap");
        assert!(array.at(3).unwrap().is_none());
    }

    #[test]
    fn emplace_out_of_range_fails() {
        let mut array = zoo();

        let result = array.emplace(4, dog("rex"));

        assert_eq!(
            result.map(|_| ()).unwrap_err(),
            Error::IndexOutOfRange { index: 4, len: 4 }
        );
    }

    #[test]
    fn emplace_returns_typed_reference() {
        let mut array = zoo();

        let stored = array.emplace(1, dog("rex")).unwrap();
        stored.name.push_str(" jr");

        assert_eq!(array.get(1).unwrap().speak(), "rex jr says woof");
    }

    #[test]
    fn overwrite_drops_previous_occupant() {
        let drops = Rc::new(Cell::new(0));
        let mut array = zoo();

        array
            .emplace(
                3,
                Snail {
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();
        array.emplace(3, Bird { wings: 4 }).unwrap();

        assert_eq!(drops.get(), 1);
        assert_eq!(array.back().unwrap().speak(), "4 wings flap");
    }

    #[test]
    fn failed_overwrite_leaves_slot_empty() {
        let mut array = zoo();
        array.emplace(0, dog("rex")).unwrap();

        let result = array.try_emplace_with::<Dog, _>(0, || Err("no dogs today"));

        assert!(matches!(
            result,
            Err(EmplaceError::ElementConstructionFailed("no dogs today"))
        ));
        assert!(array.at(0).unwrap().is_none());
        assert!(array.data()[0].is_none());
    }

    #[test]
    fn try_emplace_with_success() {
        let mut array = zoo();

        let stored = array
            .try_emplace_with::<_, std::convert::Infallible>(2, || Ok(Bird { wings: 6 }))
            .unwrap();

        assert_eq!(stored.wings, 6);
        assert_eq!(array.get(2).unwrap().speak(), "6 wings flap");
    }

    #[test]
    fn try_emplace_with_out_of_range() {
        let mut array = zoo();

        let result = array.try_emplace_with::<Dog, ()>(9, || Ok(dog("never")));

        assert!(matches!(
            result,
            Err(EmplaceError::Container(Error::IndexOutOfRange { index: 9, len: 4 }))
        ));
    }

    #[test]
    fn emplace_in_place_initializes_slot() {
        let mut array = zoo();

        let stored = unsafe {
            array.emplace_in_place(1, |uninit: &mut MaybeUninit<Bird>| {
                uninit.write(Bird { wings: 3 });
            })
        }
        .unwrap();

        assert_eq!(stored.wings, 3);
        assert_eq!(array.get(1).unwrap().speak(), "3 wings flap");
    }

    #[test]
    fn clear_empties_every_slot() {
        let drops = Rc::new(Cell::new(0));
        let mut array = zoo();

        array
            .emplace(
                0,
                Snail {
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();
        array.emplace(1, Rock).unwrap();

        array.clear();

        assert_eq!(drops.get(), 1);
        assert!(array.iter().all(|slot| slot.is_none()));
        assert!(array.is_copyable());
        assert!(array.is_movable());

        // Clearing again is a no-op.
        array.clear();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn checked_and_unchecked_access() {
        let mut array = zoo();
        array.emplace(3, dog("rex")).unwrap();

        assert!(matches!(
            array.at(4),
            Err(Error::IndexOutOfRange { index: 4, len: 4 })
        ));
        assert!(array.get(4).is_none());
        assert!(array.at_mut(7).is_err());

        let back = unsafe { array.get_unchecked(3) }.unwrap();
        assert_eq!(back.speak(), "rex says woof");
        assert!(unsafe { array.get_unchecked(0) }.is_none());

        unsafe { array.get_unchecked_mut(3) }.unwrap().rename("max");
        assert_eq!(array.get(3).unwrap().speak(), "max says woof");
    }

    #[test]
    fn front_and_back_are_fixed_positions() {
        let mut array = zoo();

        assert!(array.front().is_none());
        assert!(array.back().is_none());

        array.emplace(0, dog("first")).unwrap();
        array.emplace(3, dog("last")).unwrap();

        array.front_mut().unwrap().rename("alpha");
        array.back_mut().unwrap().rename("omega");

        assert_eq!(array.front().unwrap().speak(), "alpha says woof");
        assert_eq!(array.back().unwrap().speak(), "omega says woof");
    }

    #[test]
    fn iteration_in_both_directions() {
        let mut array = zoo();
        array.emplace(0, Bird { wings: 1 }).unwrap();
        array.emplace(3, Bird { wings: 2 }).unwrap();

        let forward: Vec<_> = array.iter().map(|slot| slot.is_some()).collect();
        let backward: Vec<_> = array.iter().rev().map(|slot| slot.is_some()).collect();

        assert_eq!(forward, [true, false, false, true]);
        assert_eq!(backward, [true, false, false, true]);
        assert_eq!(array.iter().len(), 4);

        for animal in (&mut array).into_iter().flatten() {
            animal.rename("ignored");
        }

        let last = array.iter().next_back().unwrap().unwrap();
        assert_eq!(last.speak(), "2 wings flap");
    }

    #[test]
    fn iter_mut_modifies_elements() {
        let mut array = zoo();
        array.emplace(1, dog("a")).unwrap();
        array.emplace(2, dog("b")).unwrap();

        for animal in array.iter_mut().flatten() {
            animal.rename("same");
        }

        assert_eq!(
            speech(&array),
            [
                None,
                Some("same says woof".to_string()),
                Some("same says woof".to_string()),
                None
            ]
        );
    }

    #[test]
    fn data_view_tracks_mutations() {
        let mut array = zoo();

        assert!(array.data().iter().all(Option::is_none));

        let stored: *const Dog = array.emplace(2, dog("rex")).unwrap();

        let data = array.data();
        assert_eq!(data.len(), 4);
        assert!(ptr::addr_eq(data[2].unwrap().as_ptr(), stored));
    }

    #[test]
    fn index_of_translates_address() {
        let mut array = zoo();
        array.emplace(2, dog("rex")).unwrap();

        let element = array.get(2).unwrap();
        assert_eq!(array.index_of(element), Some(2));

        let outsider = dog("stranger");
        assert_eq!(array.index_of(&outsider), None);
    }

    #[test]
    fn element_type_reports_descriptor() {
        let mut array = zoo();
        array.emplace(0, Bird { wings: 2 }).unwrap();

        let descriptor = array.element_type(0).unwrap().unwrap();
        assert!(descriptor.type_name().ends_with("Bird"));
        assert!(descriptor.is_trivially_relocatable());

        assert!(array.element_type(1).unwrap().is_none());
        assert!(array.element_type(4).is_err());
    }

    #[test]
    fn capability_flags_follow_contents() {
        let drops = Rc::new(Cell::new(0));
        let mut array = zoo();

        array.emplace(0, dog("rex")).unwrap();
        assert!(array.is_copyable());
        assert!(array.is_movable());

        array
            .emplace(
                1,
                Snail {
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();
        assert!(!array.is_copyable());
        assert!(array.is_movable());

        array.emplace(2, Rock).unwrap();
        assert!(!array.is_movable());

        array.emplace(1, Bird { wings: 2 }).unwrap();
        array.emplace(2, Bird { wings: 2 }).unwrap();
        assert!(array.is_copyable());
        assert!(array.is_movable());
    }

    #[test]
    fn clone_copies_every_slot() {
        let mut array = zoo();
        array.emplace(0, dog("rex")).unwrap();
        array.emplace(3, Bird { wings: 2 }).unwrap();

        let copy = array.try_clone().unwrap();

        assert_eq!(speech(&copy), speech(&array));

        // The copy is independent.
        array.get_mut(0).unwrap().rename("changed");
        assert_eq!(copy.get(0).unwrap().speak(), "rex says woof");
    }

    #[test]
    fn clone_of_move_only_fails() {
        let drops = Rc::new(Cell::new(0));
        let mut array = zoo();
        array
            .emplace(
                1,
                Snail {
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();

        let result = array.try_clone();

        assert!(matches!(result, Err(Error::CopyNotSupported { type_name }) if type_name.ends_with("Snail")));
    }

    #[test]
    fn clone_from_assigns_and_replaces() {
        let mut source = zoo();
        source.emplace(0, dog("rex")).unwrap();
        source.emplace(1, Bird { wings: 2 }).unwrap();

        let mut target = zoo();
        let reused: *const Dog = target.emplace(0, dog("old")).unwrap();
        target.emplace(1, dog("replaced")).unwrap();
        target.emplace(2, Rock).unwrap();

        target.try_clone_from(&source).unwrap();

        assert_eq!(speech(&target), speech(&source));
        assert!(ptr::addr_eq(target.data()[0].unwrap().as_ptr(), reused));
        assert!(target.is_movable());
    }

    #[test]
    fn clone_from_uncopyable_source_leaves_target_untouched() {
        let drops = Rc::new(Cell::new(0));
        let mut source = zoo();
        source
            .emplace(
                0,
                Snail {
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();

        let mut target = zoo();
        target.emplace(0, dog("kept")).unwrap();

        let result = target.try_clone_from(&source);

        assert!(matches!(result, Err(Error::CopyNotSupported { .. })));
        assert_eq!(target.get(0).unwrap().speak(), "kept says woof");
    }

    #[test]
    #[should_panic]
    fn clone_from_with_different_config_panics() {
        let source = zoo();
        let mut target = SlotArray::<dyn Animal>::builder()
            .capacity(nz!(2))
            .fits::<Dog>()
            .build();

        _ = target.try_clone_from(&source);
    }

    #[test]
    fn take_moves_everything_and_empties_source() {
        let drops = Rc::new(Cell::new(0));
        let mut array = zoo();
        array.emplace(0, dog("rex")).unwrap();
        array
            .emplace(
                2,
                Snail {
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();

        let moved = array.take().unwrap();

        assert_eq!(drops.get(), 0);
        assert!(array.iter().all(|slot| slot.is_none()));
        assert_eq!(moved.get(0).unwrap().speak(), "rex says woof");
        assert_eq!(moved.get(2).unwrap().speak(), "...");

        drop(moved);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn move_from_replaces_target_contents() {
        let mut source = zoo();
        source.emplace(1, Bird { wings: 8 }).unwrap();

        let mut target = zoo();
        target.emplace(0, dog("old")).unwrap();

        target.move_from(&mut source).unwrap();

        assert!(target.get(0).is_none());
        assert_eq!(target.get(1).unwrap().speak(), "8 wings flap");
        assert!(source.get(1).is_none());
    }

    #[test]
    fn move_of_stuck_element_fails_up_front() {
        let mut array = zoo();
        array.emplace(0, dog("rex")).unwrap();
        array.emplace(1, Rock).unwrap();

        let result = array.take();

        assert!(matches!(result, Err(Error::TransferNotSupported { type_name }) if type_name.ends_with("Rock")));
        assert_eq!(array.get(0).unwrap().speak(), "rex says woof");
        assert_eq!(array.get(1).unwrap().speak(), "rock");
    }

    #[test]
    fn rust_move_keeps_element_addresses() {
        let mut array = zoo();
        let before: *const Dog = array.emplace(1, dog("rex")).unwrap();

        let boxed = Box::new(array);

        assert!(ptr::addr_eq(boxed.data()[1].unwrap().as_ptr(), before));
    }

    #[test]
    #[should_panic]
    fn oversized_element_panics() {
        let mut array = SlotArray::<dyn Animal>::builder()
            .capacity(nz!(1))
            .fits::<Bird>()
            .build();

        _ = array.emplace(0, dog("too big"));
    }

    #[test]
    fn drop_destroys_elements() {
        let drops = Rc::new(Cell::new(0));

        {
            let mut array = zoo();
            for index in 0..4 {
                array
                    .emplace(
                        index,
                        Snail {
                            drops: Rc::clone(&drops),
                        },
                    )
                    .unwrap();
            }
        }

        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn debug_lists_slot_types() {
        let mut array = zoo();
        array.emplace(1, Bird { wings: 2 }).unwrap();

        let debug = format!("{array:?}");

        assert!(debug.contains("Bird"));
        assert!(debug.contains("None"));
    }
}
