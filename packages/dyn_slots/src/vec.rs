use std::mem::MaybeUninit;
use std::ops::{Bound, RangeBounds};
use std::ptr::{self, NonNull};
use std::{any, fmt};

use tracing::{debug, trace};

use crate::cache::PointerCache;
use crate::capabilities::Capabilities;
use crate::slab::SlotSlab;
use crate::{
    Element, EmplaceError, Error, Iter, IterMut, Result, SlotConfig, SlotVecBuilder,
    TypeDescriptor, Upcast,
};

/// A vector of up to a fixed number of values of any concrete types that fit the configured
/// slot and can be viewed as `B`.
///
/// Elements occupy the positions `0..len()`, in order. Inserting or removing in the middle
/// shifts the following elements, relocating them through the operations their types declare
/// via [`Element`]. Elements that can be neither moved nor copied are never shifted: operations
/// that would need to do so fail with [`Error::TransferNotSupported`] instead.
///
/// Growing the vector with [`resize()`][Self::resize] creates empty positions, which are
/// reported as `None` by accessors and iterators.
///
/// All storage is allocated in a single block when the vector is built. No operation on an
/// existing vector allocates memory.
///
/// # Example
///
/// ```
/// use dyn_slots::{SlotVec, element};
/// use new_zealand::nz;
///
/// trait Command {
///     fn describe(&self) -> String;
/// }
///
/// struct Move {
///     dx: i32,
///     dy: i32,
/// }
///
/// struct Say(&'static str);
///
/// impl Command for Move {
///     fn describe(&self) -> String {
///         format!("move by ({}, {})", self.dx, self.dy)
///     }
/// }
///
/// impl Command for Say {
///     fn describe(&self) -> String {
///         format!("say {:?}", self.0)
///     }
/// }
///
/// element!(Move => dyn Command);
/// element!(Say => dyn Command);
///
/// let mut script = SlotVec::<dyn Command>::builder()
///     .capacity(nz!(8))
///     .fits::<Move>()
///     .fits::<Say>()
///     .build();
///
/// script.push(Move { dx: 1, dy: 0 })?;
/// script.push(Say("done"))?;
/// script.insert(1, Say("halfway"))?;
///
/// let described: Vec<_> = script.iter().flatten().map(|command| command.describe()).collect();
///
/// assert_eq!(
///     described,
///     ["move by (1, 0)", "say \"halfway\"", "say \"done\""]
/// );
/// # Ok::<(), dyn_slots::Error>(())
/// ```
///
/// # Thread safety
///
/// The vector is [`Send`] if `B` is [`Send`]. It is never [`Sync`] because reads update an
/// internal cache.
pub struct SlotVec<B: ?Sized> {
    slab: SlotSlab<B>,
    len: usize,
    capabilities: Capabilities,
    cache: PointerCache<B>,
}

impl<B: ?Sized> SlotVec<B> {
    /// Creates a builder for configuring and constructing a [`SlotVec`].
    #[inline]
    pub fn builder() -> SlotVecBuilder<B> {
        SlotVecBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(config: SlotConfig) -> Self {
        let slab = SlotSlab::new(config);

        // SAFETY: The buffer belongs to the slab, which is owned by the same container as the
        // cache and hands the buffer to nobody else.
        let cache = unsafe { PointerCache::new(slab.cache_buffer()) };

        Self {
            slab,
            len: 0,
            capabilities: Capabilities::EMPTY,
            cache,
        }
    }

    /// Recomputes the capability flags over `0..len` and invalidates the pointer cache.
    fn refresh(&mut self) {
        self.capabilities = Capabilities::scan(self.live_records());
        self.cache.invalidate();
    }

    fn live_records(&self) -> &[Option<crate::slab::Occupant<B>>] {
        self.slab
            .occupants()
            .get(..self.len)
            .expect("length never exceeds capacity")
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.len {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            })
        }
    }

    fn check_room(&self) -> Result<()> {
        if self.len < self.capacity() {
            return Ok(());
        }

        debug!(capacity = self.capacity(), "vector is full");

        Err(Error::CapacityExceeded {
            capacity: self.capacity(),
            // Cannot overflow because len is bounded by the capacity of an allocated block.
            requested: self.len.wrapping_add(1),
        })
    }

    /// Validates an insertion at `index` without changing anything.
    fn check_insert(&self, index: usize) -> Result<()> {
        if index > self.len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            });
        }

        self.check_room()?;

        // Every element from the insertion point onwards will shift one slot to the right.
        let blocker = self.slab.find(index..self.len, |descriptor| {
            !descriptor.is_move_constructible() && !descriptor.is_copy_constructible()
        });

        if let Some(descriptor) = blocker {
            debug!(
                index,
                element = descriptor.type_name(),
                "insert rejected, element cannot be shifted"
            );

            return Err(Error::TransferNotSupported {
                type_name: descriptor.type_name(),
            });
        }

        Ok(())
    }

    /// Appends `value` to the end of the vector, returning a reference to the stored value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if the vector is full. The value is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    pub fn push<T>(&mut self, value: T) -> Result<&mut T>
    where
        T: Element + Upcast<B>,
    {
        self.check_room()?;

        let mut ptr = self.slab.construct(self.len, value);
        self.len = self.len.wrapping_add(1);
        self.refresh();

        // SAFETY: The value was just constructed and we hold an exclusive borrow of the vector,
        // which the returned reference inherits.
        Ok(unsafe { ptr.as_mut() })
    }

    /// Appends the value returned by `f` to the end of the vector.
    ///
    /// The capacity is checked before `f` is called. If `f` fails, the vector is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`EmplaceError::Container`] if the vector is full and
    /// [`EmplaceError::ElementConstructionFailed`] if `f` fails.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    pub fn try_push_with<T, E>(
        &mut self,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<&mut T, EmplaceError<E>>
    where
        T: Element + Upcast<B>,
    {
        self.check_room()?;

        let value = f().map_err(EmplaceError::ElementConstructionFailed)?;

        Ok(self.push(value)?)
    }

    /// Appends a value that `f` initializes directly in the vector's storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if the vector is full. `f` is not called.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    ///
    /// # Safety
    ///
    /// `f` must fully initialize the value before returning.
    pub unsafe fn push_in_place<T>(&mut self, f: impl FnOnce(&mut MaybeUninit<T>)) -> Result<&mut T>
    where
        T: Element + Upcast<B>,
    {
        self.check_room()?;

        // SAFETY: Forwarding safety requirements to the caller.
        let mut ptr = unsafe { self.slab.construct_in_place(self.len, f) };
        self.len = self.len.wrapping_add(1);
        self.refresh();

        // SAFETY: The value was just initialized and we hold an exclusive borrow of the vector,
        // which the returned reference inherits.
        Ok(unsafe { ptr.as_mut() })
    }

    /// Inserts `value` at `index`, shifting every element after it one position to the right.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`] if `index > len()`.
    /// * [`Error::CapacityExceeded`] if the vector is full.
    /// * [`Error::TransferNotSupported`] if an element that would need to shift can be neither
    ///   moved nor copied.
    ///
    /// On error the vector is unchanged and the value is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    pub fn insert<T>(&mut self, index: usize, value: T) -> Result<&mut T>
    where
        T: Element + Upcast<B>,
    {
        self.check_insert(index)?;
        Ok(self.insert_unchecked(index, value))
    }

    /// Inserts the value returned by `f` at `index`, shifting every element after it one
    /// position to the right.
    ///
    /// All checks happen before `f` is called. If `f` fails, the vector is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`EmplaceError::Container`] for the same reasons as [`insert()`][Self::insert]
    /// and [`EmplaceError::ElementConstructionFailed`] if `f` fails.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger or more strictly aligned than a slot.
    pub fn try_insert_with<T, E>(
        &mut self,
        index: usize,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<&mut T, EmplaceError<E>>
    where
        T: Element + Upcast<B>,
    {
        self.check_insert(index)?;

        let value = f().map_err(EmplaceError::ElementConstructionFailed)?;

        Ok(self.insert_unchecked(index, value))
    }

    /// Inserts after [`check_insert()`][Self::check_insert] has succeeded.
    ///
    /// The new length is committed before anything shifts. If a `Clone` used to shift a pinned
    /// element panics, the slot it was copying into remains as an empty position and every
    /// element stays within `0..len`.
    fn insert_unchecked<T>(&mut self, index: usize, value: T) -> &mut T
    where
        T: Element + Upcast<B>,
    {
        self.slab.assert_fits::<T>();

        let old_len = self.len;

        // Cannot overflow because check_insert() verified there is a free slot.
        self.len = old_len.wrapping_add(1);
        self.refresh();

        if index < old_len {
            trace!(index, len = old_len, "shifting tail right");

            // Highest index first, so every transfer targets a slot that was just vacated.
            for from in (index..old_len).rev() {
                self.slab
                    .transfer(from, from.wrapping_add(1))
                    .expect("check_insert() verified that every shifted element can be moved or copied");
            }
        }

        let mut ptr = self.slab.construct(index, value);
        self.refresh();

        // SAFETY: The value was just constructed and we hold an exclusive borrow of the vector,
        // which the returned reference inherits.
        unsafe { ptr.as_mut() }
    }

    /// Removes and drops the last element.
    ///
    /// This never shifts anything, so it works for every element type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the vector is empty.
    pub fn pop(&mut self) -> Result<()> {
        if self.len == 0 {
            return Err(Error::IndexOutOfRange { index: 0, len: 0 });
        }

        self.len = self.len.wrapping_sub(1);
        self.slab.destroy(self.len);
        self.refresh();

        Ok(())
    }

    /// Removes and drops the element at `index`, shifting every element after it one position
    /// to the left.
    ///
    /// # Errors
    ///
    /// See [`remove_range()`][Self::remove_range].
    pub fn remove(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;

        // Cannot overflow because index < len.
        self.remove_range(index..index.wrapping_add(1))
    }

    /// Removes and drops the elements in `range`, shifting every element after the range to the
    /// left to close the gap.
    ///
    /// Removing a range that extends to the end of the vector never shifts anything.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`] if the range is inverted or extends beyond `len()`.
    /// * [`Error::TransferNotSupported`] if elements would need to shift while the vector holds
    ///   an element that cannot be moved ([`is_movable()`][Self::is_movable] is `false`).
    ///
    /// On error the vector is unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use std::fmt::Debug;
    ///
    /// use dyn_slots::{SlotVec, element};
    /// use new_zealand::nz;
    ///
    /// #[derive(Debug)]
    /// struct Sample(u32);
    ///
    /// element!(Sample => dyn Debug);
    ///
    /// let mut samples = SlotVec::<dyn Debug>::builder()
    ///     .capacity(nz!(5))
    ///     .fits::<Sample>()
    ///     .build();
    ///
    /// for value in 0..5 {
    ///     samples.push(Sample(value))?;
    /// }
    ///
    /// samples.remove_range(1..3)?;
    ///
    /// assert_eq!(samples.len(), 3);
    /// assert_eq!(format!("{:?}", samples.at(1)?.unwrap()), "Sample(3)");
    /// # Ok::<(), dyn_slots::Error>(())
    /// ```
    pub fn remove_range(&mut self, range: impl RangeBounds<usize>) -> Result<()> {
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.checked_add(1).ok_or(Error::IndexOutOfRange {
                index: start,
                len: self.len,
            })?,
            Bound::Unbounded => 0,
        };

        let end = match range.end_bound() {
            Bound::Included(&end) => end.checked_add(1).ok_or(Error::IndexOutOfRange {
                index: end,
                len: self.len,
            })?,
            Bound::Excluded(&end) => end,
            Bound::Unbounded => self.len,
        };

        if end > self.len {
            return Err(Error::IndexOutOfRange {
                index: end,
                len: self.len,
            });
        }

        if start > end {
            return Err(Error::IndexOutOfRange {
                index: start,
                len: self.len,
            });
        }

        if start == end {
            return Ok(());
        }

        let shift_needed = end < self.len;

        if shift_needed && !self.capabilities.movable {
            let blocker = self
                .slab
                .find(0..self.len, |descriptor| !descriptor.is_move_constructible())
                .expect("movable flag is only cleared when an immovable element exists");

            debug!(
                start,
                end,
                element = blocker.type_name(),
                "removal rejected, remaining elements cannot be shifted"
            );

            return Err(Error::TransferNotSupported {
                type_name: blocker.type_name(),
            });
        }

        self.slab.destroy_range(start..end);

        if shift_needed {
            trace!(start, end, len = self.len, "shifting tail left");

            // Lowest index first, so every transfer targets a slot that was just vacated.
            // Cannot underflow because from >= end > start.
            let distance = end.wrapping_sub(start);

            for from in end..self.len {
                self.slab
                    .transfer(from, from.wrapping_sub(distance))
                    .expect("movable flag guarantees every element can be relocated");
            }
        }

        self.len = self.len.wrapping_sub(end.wrapping_sub(start));
        self.refresh();

        Ok(())
    }

    /// Drops every element, leaving the vector empty.
    pub fn clear(&mut self) {
        self.slab.destroy_range(0..self.len);
        self.len = 0;
        self.refresh();
    }

    /// Changes the length of the vector.
    ///
    /// Shrinking drops the elements at the end. Growing adds empty positions, which read as
    /// `None` until something is constructed there; no element is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if `new_len` is greater than the capacity.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.capacity() {
            debug!(new_len, capacity = self.capacity(), "resize rejected");

            return Err(Error::CapacityExceeded {
                capacity: self.capacity(),
                requested: new_len,
            });
        }

        while self.len > new_len {
            self.len = self.len.wrapping_sub(1);
            self.slab.destroy(self.len);
        }

        self.len = new_len;
        self.refresh();

        Ok(())
    }

    /// Shortens the vector to `len` elements, dropping the rest. Does nothing if the vector is
    /// already that short.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.slab.destroy_range(len..self.len);
            self.len = len;
            self.refresh();
        }
    }

    /// Verifies that the vector can hold `capacity` elements in total.
    ///
    /// The capacity is fixed when the vector is built, so this never changes anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if `capacity` is greater than the fixed capacity.
    pub fn reserve(&self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }

        debug!(requested = capacity, capacity = self.capacity(), "reserve rejected");

        Err(Error::CapacityExceeded {
            capacity: self.capacity(),
            requested: capacity,
        })
    }

    /// Does nothing. The capacity is fixed when the vector is built.
    #[cfg_attr(test, mutants::skip)] // Nothing to mutate.
    pub fn shrink_to_fit(&mut self) {}

    /// Returns the element at `index`, or `None` if that position is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn at(&self, index: usize) -> Result<Option<&B>> {
        self.check_index(index)?;
        Ok(self.get(index))
    }

    /// Returns the element at `index` mutably, or `None` if that position is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn at_mut(&mut self, index: usize) -> Result<Option<&mut B>> {
        self.check_index(index)?;
        Ok(self.get_mut(index))
    }

    /// Returns the element at `index`, or `None` if the position is empty or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&B> {
        if index >= self.len {
            return None;
        }

        let occupant = self.slab.occupant(index)?;

        // SAFETY: The occupant record guarantees a live element and the shared borrow of the
        // vector prevents mutation for the lifetime of the returned reference.
        Some(unsafe { occupant.ptr.as_ref() })
    }

    /// Returns the element at `index` mutably, or `None` if the position is empty or out of
    /// range.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut B> {
        if index >= self.len {
            return None;
        }

        let mut ptr = self.slab.occupant(index)?.ptr;

        // SAFETY: The occupant record guarantees a live element and the exclusive borrow of the
        // vector is inherited by the returned reference.
        Some(unsafe { ptr.as_mut() })
    }

    /// Returns the element at `index` without bounds checking, or `None` if the position is
    /// empty.
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
        // vector prevents mutation for the lifetime of the returned reference.
        Some(unsafe { ptr.as_ref() })
    }

    /// Returns the element at `index` mutably without bounds checking, or `None` if the
    /// position is empty.
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
        // vector is inherited by the returned reference.
        Some(unsafe { ptr.as_mut() })
    }

    /// Returns the first element, or `None` if the first position is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the vector is empty.
    pub fn front(&self) -> Result<Option<&B>> {
        self.at(0)
    }

    /// Returns the first element mutably, or `None` if the first position is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the vector is empty.
    pub fn front_mut(&mut self) -> Result<Option<&mut B>> {
        self.at_mut(0)
    }

    /// Returns the last element, or `None` if the last position is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the vector is empty.
    pub fn back(&self) -> Result<Option<&B>> {
        self.at(self.last_index()?)
    }

    /// Returns the last element mutably, or `None` if the last position is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the vector is empty.
    pub fn back_mut(&mut self) -> Result<Option<&mut B>> {
        let index = self.last_index()?;
        self.at_mut(index)
    }

    fn last_index(&self) -> Result<usize> {
        self.len
            .checked_sub(1)
            .ok_or(Error::IndexOutOfRange { index: 0, len: 0 })
    }

    /// Returns the address of the element at every position, with `None` for empty positions.
    #[must_use]
    pub fn data(&self) -> &[Option<NonNull<B>>] {
        self.cache.view(self.live_records())
    }

    /// Iterates over the positions `0..len()` in order.
    pub fn iter(&self) -> Iter<'_, B> {
        Iter::new(self.data())
    }

    /// Iterates mutably over the positions `0..len()` in order.
    pub fn iter_mut(&mut self) -> IterMut<'_, B> {
        let pointers = self.cache.view(self.live_records());

        // SAFETY: We hold an exclusive borrow of the vector for the lifetime of the iterator.
        unsafe { IterMut::new(pointers) }
    }

    /// The number of positions in use, including empty ones created by
    /// [`resize()`][Self::resize].
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector has no positions in use.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The maximum number of elements.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slab.capacity()
    }

    /// The largest number of elements the vector can hold. Same as the capacity.
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

    /// The configuration the vector was built with.
    #[must_use]
    #[inline]
    pub fn config(&self) -> SlotConfig {
        self.slab.config()
    }

    /// Whether every element can be copied, so [`try_clone()`][Self::try_clone] will succeed.
    ///
    /// An empty vector is copyable.
    #[must_use]
    #[inline]
    pub fn is_copyable(&self) -> bool {
        self.capabilities.copyable
    }

    /// Whether every element can be moved, so removal from the middle will succeed.
    ///
    /// An empty vector is movable.
    #[must_use]
    #[inline]
    pub fn is_movable(&self) -> bool {
        self.capabilities.movable
    }

    /// Describes the concrete type of the element at `index`, or `None` if the position is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn element_type(&self, index: usize) -> Result<Option<&'static TypeDescriptor>> {
        self.check_index(index)?;
        Ok(self.slab.occupant(index).map(|occupant| occupant.descriptor))
    }

    /// Returns the position of `element`, or `None` if it is not stored in this vector.
    #[must_use]
    pub fn index_of(&self, element: &B) -> Option<usize> {
        self.data().iter().position(|pointer| {
            pointer.is_some_and(|pointer| ptr::addr_eq(pointer.as_ptr(), ptr::from_ref(element)))
        })
    }

    /// Creates an independent copy of the vector, with the same configuration and a copy of
    /// every element at the same position.
    ///
    /// This allocates the storage block of the new vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CopyNotSupported`] if any element cannot be copied.
    pub fn try_clone(&self) -> Result<Self> {
        self.check_copyable()?;

        trace!(len = self.len, "copying vector");

        let mut copy = Self::new_inner(self.config());

        for index in 0..self.len {
            let result = copy.slab.duplicate_from(index, &self.slab, index);

            // Positions are committed one at a time so a panicking clone leaves a consistent
            // prefix behind.
            copy.len = index.wrapping_add(1);
            copy.refresh();
            result?;
        }

        Ok(copy)
    }

    /// Replaces the contents of this vector with a copy of every element of `source`.
    ///
    /// Elements already present at a position are assigned to in place if they have the same
    /// type as the source element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CopyNotSupported`] if any element of `source` cannot be copied. This
    /// vector is left untouched in that case.
    ///
    /// # Panics
    ///
    /// Panics if the two vectors have different configurations.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<()> {
        assert_eq!(
            self.config(),
            source.config(),
            "vectors can only be copied between identical configurations"
        );

        source.check_copyable()?;

        trace!(len = source.len, "copy-assigning vector");

        self.truncate(source.len);

        for index in 0..source.len {
            let result = self.slab.assign_from(index, &source.slab, index);
            self.len = self.len.max(index.wrapping_add(1));
            self.refresh();
            result?;
        }

        Ok(())
    }

    /// Moves every element into a new vector with the same configuration, leaving this vector
    /// empty.
    ///
    /// This allocates the storage block of the new vector.
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

    /// Replaces the contents of this vector with the elements of `source`, leaving `source`
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferNotSupported`] if any element of `source` can be neither moved
    /// nor copied. Neither vector is modified in that case.
    ///
    /// # Panics
    ///
    /// Panics if the two vectors have different configurations.
    pub fn move_from(&mut self, source: &mut Self) -> Result<()> {
        assert_eq!(
            self.config(),
            source.config(),
            "vectors can only be moved between identical configurations"
        );

        let blocker = source.slab.find(0..source.len, |descriptor| {
            !descriptor.is_move_constructible() && !descriptor.is_copy_constructible()
        });

        if let Some(descriptor) = blocker {
            debug!(element = descriptor.type_name(), "vector move rejected");

            return Err(Error::TransferNotSupported {
                type_name: descriptor.type_name(),
            });
        }

        trace!(len = source.len, "moving vector");

        self.clear();

        let len = source.len;

        for index in 0..len {
            let result = self.slab.transfer_from(index, &mut source.slab, index);
            self.len = index.wrapping_add(1);
            self.refresh();
            source.refresh();
            result?;
        }

        source.len = 0;
        source.refresh();

        Ok(())
    }

    fn check_copyable(&self) -> Result<()> {
        if self.capabilities.copyable {
            return Ok(());
        }

        let blocker = self
            .slab
            .find(0..self.len, |descriptor| !descriptor.is_copy_constructible())
            .expect("copyable flag is only cleared when a non-copyable element exists");

        debug!(element = blocker.type_name(), "vector copy rejected");

        Err(Error::CopyNotSupported {
            type_name: blocker.type_name(),
        })
    }
}

impl<'a, B: ?Sized> IntoIterator for &'a SlotVec<B> {
    type Item = Option<&'a B>;
    type IntoIter = Iter<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, B: ?Sized> IntoIterator for &'a mut SlotVec<B> {
    type Item = Option<&'a mut B>;
    type IntoIter = IterMut<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<B: ?Sized> fmt::Debug for SlotVec<B> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<_> = self
            .live_records()
            .iter()
            .map(|record| record.map(|occupant| occupant.descriptor.type_name()))
            .collect();

        f.debug_struct(any::type_name::<Self>())
            .field("config", &self.config())
            .field("len", &self.len)
            .field("capabilities", &self.capabilities)
            .field("elements", &types)
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
    use std::num::NonZero;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::element;

    assert_impl_all!(SlotVec<dyn Debug + Send>: Send, Debug);
    assert_not_impl_any!(SlotVec<dyn Debug + Send>: Sync);
    assert_not_impl_any!(SlotVec<dyn Debug>: Send, Sync);

    trait Task {
        fn label(&self) -> String;
    }

    /// Movable and copyable, counts clones so tests can verify that shifting moves.
    struct Job {
        id: u32,
        clones: Rc<Cell<usize>>,
    }

    impl Clone for Job {
        fn clone(&self) -> Self {
            self.clones.set(self.clones.get() + 1);

            Self {
                id: self.id,
                clones: Rc::clone(&self.clones),
            }
        }
    }

    impl Task for Job {
        fn label(&self) -> String {
            format!("job {}", self.id)
        }
    }

    /// Move-only.
    struct Lease(u32);

    impl Task for Lease {
        fn label(&self) -> String {
            format!("lease {}", self.0)
        }
    }

    /// Neither movable nor copyable.
    struct Socket {
        port: u16,
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Socket {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl Task for Socket {
        fn label(&self) -> String {
            format!("socket {}", self.port)
        }
    }

    /// Copyable but pinned in place.
    #[derive(Clone)]
    struct Anchor(u32);

    impl Task for Anchor {
        fn label(&self) -> String {
            format!("anchor {}", self.0)
        }
    }

    /// Copyable but pinned in place, with a clone that can be made to panic.
    struct Fragile {
        id: u32,
        panic_on_clone: bool,
        drops: Rc<Cell<usize>>,
    }

    impl Clone for Fragile {
        fn clone(&self) -> Self {
            assert!(!self.panic_on_clone, "fragile {} cannot be cloned", self.id);

            Self {
                id: self.id,
                panic_on_clone: false,
                drops: Rc::clone(&self.drops),
            }
        }
    }

    impl Drop for Fragile {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl Task for Fragile {
        fn label(&self) -> String {
            format!("fragile {}", self.id)
        }
    }

    /// Larger than any slot of the test vectors.
    struct Oversized([u64; 16]);

    impl Task for Oversized {
        fn label(&self) -> String {
            format!("oversized {}", self.0.len())
        }
    }

    element!(Job => dyn Task, clone);
    element!(Lease => dyn Task);
    element!(Socket => dyn Task, immovable);
    element!(Anchor => dyn Task, clone, immovable);
    element!(Fragile => dyn Task, clone, immovable);
    element!(Oversized => dyn Task);

    fn queue(capacity: NonZero<usize>) -> SlotVec<dyn Task> {
        SlotVec::builder()
            .capacity(capacity)
            .fits::<Job>()
            .fits::<Lease>()
            .fits::<Socket>()
            .fits::<Anchor>()
            .fits::<Fragile>()
            .build()
    }

    fn labels(vec: &SlotVec<dyn Task>) -> Vec<Option<String>> {
        vec.iter().map(|slot| slot.map(Task::label)).collect()
    }

    fn job(id: u32, clones: &Rc<Cell<usize>>) -> Job {
        Job {
            id,
            clones: Rc::clone(clones),
        }
    }

    fn socket(port: u16, drops: &Rc<Cell<usize>>) -> Socket {
        Socket {
            port,
            drops: Rc::clone(drops),
        }
    }

    fn fragile(id: u32, panic_on_clone: bool, drops: &Rc<Cell<usize>>) -> Fragile {
        Fragile {
            id,
            panic_on_clone,
            drops: Rc::clone(drops),
        }
    }

    fn some(label: &str) -> Option<String> {
        Some(label.to_string())
    }

    #[test]
    fn new_vector_is_empty() {
        let vec = queue(nz!(3));

        assert_eq!(vec.len(), 0);
        assert!(vec.is_empty());
        assert_eq!(vec.capacity(), 3);
        assert_eq!(vec.max_size(), 3);
        assert_eq!(vec.iter().count(), 0);
        assert!(vec.data().is_empty());
        assert!(vec.is_copyable());
        assert!(vec.is_movable());
    }

    #[test]
    fn push_until_full() {
        let mut vec = queue(nz!(3));

        vec.push(Lease(1)).unwrap();
        vec.push(Lease(2)).unwrap();
        vec.push(Lease(3)).unwrap();

        assert_eq!(vec.len(), 3);

        let result = vec.push(Lease(4));

        assert!(matches!(
            result,
            Err(Error::CapacityExceeded {
                capacity: 3,
                requested: 4
            })
        ));
        assert_eq!(vec.len(), 3);
    }

    #[test]
    fn try_push_with_failure_leaves_vector_unchanged() {
        let mut vec = queue(nz!(2));
        vec.push(Lease(1)).unwrap();

        let result = vec.try_push_with::<Lease, _>(|| Err("refused"));

        assert!(matches!(
            result,
            Err(EmplaceError::ElementConstructionFailed("refused"))
        ));
        assert_eq!(vec.len(), 1);
        assert_eq!(labels(&vec), [some("lease 1")]);
    }

    #[test]
    fn try_push_with_full_vector_does_not_call_constructor() {
        let mut vec = queue(nz!(1));
        vec.push(Lease(1)).unwrap();

        let called = Cell::new(false);
        let result = vec.try_push_with::<Lease, ()>(|| {
            called.set(true);
            Ok(Lease(2))
        });

        assert!(matches!(
            result,
            Err(EmplaceError::Container(Error::CapacityExceeded { .. }))
        ));
        assert!(!called.get());
    }

    #[test]
    fn push_in_place_appends() {
        let mut vec = queue(nz!(2));

        let stored = unsafe {
            vec.push_in_place(|uninit: &mut MaybeUninit<Lease>| {
                uninit.write(Lease(9));
            })
        }
        .unwrap();

        assert_eq!(stored.0, 9);
        assert_eq!(labels(&vec), [some("lease 9")]);
    }

    #[test]
    fn insert_at_front_shifts_by_moving() {
        let clones = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(4));

        for id in 0..3 {
            vec.push(job(id, &clones)).unwrap();
        }

        vec.insert(0, job(99, &clones)).unwrap();

        assert_eq!(clones.get(), 0);
        assert_eq!(
            labels(&vec),
            [some("job 99"), some("job 0"), some("job 1"), some("job 2")]
        );
    }

    #[test]
    fn insert_in_middle_and_at_end() {
        let mut vec = queue(nz!(4));
        vec.push(Lease(1)).unwrap();
        vec.push(Lease(3)).unwrap();

        vec.insert(1, Lease(2)).unwrap();
        vec.insert(3, Lease(4)).unwrap();

        assert_eq!(
            labels(&vec),
            [some("lease 1"), some("lease 2"), some("lease 3"), some("lease 4")]
        );
    }

    #[test]
    fn insert_shifts_pinned_copyable_elements_by_copy() {
        let mut vec = queue(nz!(3));
        vec.push(Anchor(1)).unwrap();

        vec.insert(0, Anchor(0)).unwrap();

        assert_eq!(labels(&vec), [some("anchor 0"), some("anchor 1")]);
    }

    #[test]
    fn insert_rejections_leave_vector_unchanged() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(3));
        vec.push(socket(80, &drops)).unwrap();
        vec.push(Lease(1)).unwrap();

        assert!(matches!(
            vec.insert(3, Lease(2)),
            Err(Error::IndexOutOfRange { index: 3, len: 2 })
        ));
        assert!(matches!(
            vec.insert(0, Lease(2)),
            Err(Error::TransferNotSupported { type_name }) if type_name.ends_with("Socket")
        ));

        // Inserting after the immovable element does not move it.
        vec.insert(1, Lease(2)).unwrap();

        assert!(matches!(
            vec.insert(1, Lease(3)),
            Err(Error::CapacityExceeded { .. })
        ));

        assert_eq!(
            labels(&vec),
            [some("socket 80"), some("lease 2"), some("lease 1")]
        );
        assert_eq!(drops.get(), 0);
    }

    #[test]
    fn try_insert_with_checks_before_constructing() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(3));
        vec.push(socket(1, &drops)).unwrap();

        let called = Cell::new(false);
        let result = vec.try_insert_with::<Lease, ()>(0, || {
            called.set(true);
            Ok(Lease(0))
        });

        assert!(matches!(
            result,
            Err(EmplaceError::Container(Error::TransferNotSupported { .. }))
        ));
        assert!(!called.get());

        let result = vec.try_insert_with::<Lease, &str>(1, || Err("no lease"));
        assert!(matches!(
            result,
            Err(EmplaceError::ElementConstructionFailed("no lease"))
        ));
        assert_eq!(vec.len(), 1);

        vec.try_insert_with::<_, ()>(1, || Ok(Lease(5))).unwrap();
        assert_eq!(labels(&vec), [some("socket 1"), some("lease 5")]);
    }

    #[test]
    fn pop_always_works_from_the_tail() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(2));
        vec.push(socket(1, &drops)).unwrap();
        vec.push(socket(2, &drops)).unwrap();

        vec.pop().unwrap();
        assert_eq!(drops.get(), 1);
        assert_eq!(labels(&vec), [some("socket 1")]);

        vec.pop().unwrap();
        assert_eq!(drops.get(), 2);
        assert!(vec.is_empty());

        assert!(matches!(
            vec.pop(),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn immovable_elements_only_removable_at_tail() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(3));
        vec.push(socket(1, &drops)).unwrap();
        vec.push(socket(2, &drops)).unwrap();
        vec.push(socket(3, &drops)).unwrap();

        assert!(!vec.is_copyable());
        assert!(!vec.is_movable());

        let result = vec.remove(0);
        assert!(matches!(result, Err(Error::TransferNotSupported { .. })));
        assert_eq!(vec.len(), 3);
        assert_eq!(drops.get(), 0);

        vec.remove(2).unwrap();
        assert_eq!(drops.get(), 1);

        vec.remove_range(1..).unwrap();
        assert_eq!(drops.get(), 2);
        assert_eq!(labels(&vec), [some("socket 1")]);
    }

    #[test]
    fn remove_shifts_left_in_order() {
        let clones = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(5));
        for id in 0..5 {
            vec.push(job(id, &clones)).unwrap();
        }

        vec.remove(1).unwrap();
        assert_eq!(
            labels(&vec),
            [some("job 0"), some("job 2"), some("job 3"), some("job 4")]
        );

        vec.remove_range(..2).unwrap();
        assert_eq!(labels(&vec), [some("job 3"), some("job 4")]);

        vec.remove_range(0..=0).unwrap();
        assert_eq!(labels(&vec), [some("job 4")]);

        assert_eq!(clones.get(), 0);
    }

    #[test]
    fn insert_then_remove_restores_contents() {
        let mut vec = queue(nz!(4));
        vec.push(Lease(1)).unwrap();
        vec.push(Lease(2)).unwrap();
        vec.push(Lease(3)).unwrap();
        let before = labels(&vec);

        vec.insert(1, Lease(7)).unwrap();
        vec.remove(1).unwrap();

        assert_eq!(labels(&vec), before);
    }

    #[test]
    fn remove_range_validation() {
        let mut vec = queue(nz!(4));
        vec.push(Lease(1)).unwrap();
        vec.push(Lease(2)).unwrap();

        assert!(matches!(
            vec.remove_range(1..3),
            Err(Error::IndexOutOfRange { index: 3, len: 2 })
        ));
        let (start, end) = (2, 1);
        assert!(matches!(
            vec.remove_range(start..end),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            vec.remove(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));

        // Empty ranges are accepted and change nothing.
        vec.remove_range(1..1).unwrap();
        assert_eq!(vec.len(), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(3));
        vec.push(socket(1, &drops)).unwrap();
        vec.push(socket(2, &drops)).unwrap();

        vec.clear();

        assert!(vec.is_empty());
        assert_eq!(drops.get(), 2);
        assert!(vec.is_copyable());
        assert!(vec.is_movable());

        vec.clear();
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn resize_grows_with_holes_and_shrinks_from_tail() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(4));
        vec.push(socket(1, &drops)).unwrap();

        vec.resize(3).unwrap();

        assert_eq!(vec.len(), 3);
        assert_eq!(labels(&vec), [some("socket 1"), None, None]);
        assert!(vec.at(2).unwrap().is_none());
        assert!(vec.back().unwrap().is_none());

        // A hole can be filled by pushing after it.
        vec.push(Lease(4)).unwrap();
        assert_eq!(vec.len(), 4);

        assert!(matches!(
            vec.resize(5),
            Err(Error::CapacityExceeded {
                capacity: 4,
                requested: 5
            })
        ));

        vec.resize(0).unwrap();
        assert!(vec.is_empty());
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn holes_do_not_affect_capabilities() {
        let mut vec = queue(nz!(3));
        vec.resize(2).unwrap();

        assert!(vec.is_copyable());
        assert!(vec.is_movable());

        let copy = vec.try_clone().unwrap();
        assert_eq!(copy.len(), 2);
        assert!(copy.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn truncate_drops_tail() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(3));
        vec.push(socket(1, &drops)).unwrap();
        vec.push(socket(2, &drops)).unwrap();

        vec.truncate(5);
        assert_eq!(vec.len(), 2);

        vec.truncate(1);
        assert_eq!(vec.len(), 1);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn reserve_and_shrink_to_fit() {
        let mut vec = queue(nz!(3));

        vec.reserve(0).unwrap();
        vec.reserve(3).unwrap();
        assert!(matches!(
            vec.reserve(4),
            Err(Error::CapacityExceeded {
                capacity: 3,
                requested: 4
            })
        ));

        vec.push(Lease(1)).unwrap();
        vec.shrink_to_fit();
        assert_eq!(vec.capacity(), 3);
        assert_eq!(vec.len(), 1);
    }

    #[test]
    fn front_and_back() {
        let mut vec = queue(nz!(3));

        assert!(matches!(vec.front(), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(vec.back(), Err(Error::IndexOutOfRange { .. })));
        assert!(vec.front_mut().is_err());
        assert!(vec.back_mut().is_err());

        vec.push(Lease(1)).unwrap();
        vec.push(Lease(2)).unwrap();

        assert_eq!(vec.front().unwrap().unwrap().label(), "lease 1");
        assert_eq!(vec.back().unwrap().unwrap().label(), "lease 2");
        assert!(vec.front_mut().unwrap().is_some());
        assert!(vec.back_mut().unwrap().is_some());
    }

    #[test]
    fn access_is_scoped_to_length() {
        let mut vec = queue(nz!(3));
        vec.push(Lease(1)).unwrap();

        assert!(vec.get(1).is_none());
        assert!(vec.get_mut(1).is_none());
        assert!(matches!(
            vec.at(1),
            Err(Error::IndexOutOfRange { index: 1, len: 1 })
        ));
        assert!(vec.at_mut(1).is_err());

        assert_eq!(unsafe { vec.get_unchecked(0) }.unwrap().label(), "lease 1");
        assert!(unsafe { vec.get_unchecked_mut(0) }.is_some());

        assert!(vec.element_type(0).unwrap().unwrap().type_name().ends_with("Lease"));
        assert!(vec.element_type(1).is_err());
    }

    #[test]
    fn iteration_in_both_directions() {
        let mut vec = queue(nz!(3));
        vec.push(Lease(1)).unwrap();
        vec.push(Lease(2)).unwrap();
        vec.push(Lease(3)).unwrap();

        let reversed: Vec<_> = vec
            .iter()
            .rev()
            .map(|slot| slot.unwrap().label())
            .collect();
        assert_eq!(reversed, ["lease 3", "lease 2", "lease 1"]);

        let mut visited = 0;
        for slot in &mut vec {
            assert!(slot.is_some());
            visited += 1;
        }
        assert_eq!(visited, 3);

        assert_eq!((&vec).into_iter().len(), 3);
        assert_eq!(vec.iter_mut().rev().count(), 3);
    }

    #[test]
    fn index_of_follows_shifts() {
        let mut vec = queue(nz!(3));
        vec.push(Lease(1)).unwrap();
        vec.push(Lease(2)).unwrap();

        vec.insert(0, Lease(0)).unwrap();

        let element = vec.get(2).unwrap();
        assert_eq!(vec.index_of(element), Some(2));
        assert_eq!(element.label(), "lease 2");

        let outsider = Lease(5);
        assert_eq!(vec.index_of(&outsider), None);
    }

    #[test]
    fn data_view_covers_length_only() {
        let mut vec = queue(nz!(4));
        vec.push(Lease(1)).unwrap();

        assert_eq!(vec.data().len(), 1);

        vec.resize(3).unwrap();

        let data = vec.data();
        assert_eq!(data.len(), 3);
        assert!(data[0].is_some());
        assert!(data[1].is_none());
    }

    #[test]
    fn move_only_vector_moves_but_does_not_copy() {
        let mut vec = queue(nz!(2));
        vec.push(Lease(1)).unwrap();

        assert!(!vec.is_copyable());
        assert!(vec.is_movable());

        assert!(matches!(
            vec.try_clone(),
            Err(Error::CopyNotSupported { type_name }) if type_name.ends_with("Lease")
        ));

        let moved = vec.take().unwrap();

        assert!(vec.is_empty());
        assert_eq!(labels(&moved), [some("lease 1")]);
    }

    #[test]
    fn clone_is_independent_copy() {
        let clones = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(3));
        vec.push(job(1, &clones)).unwrap();
        vec.push(Anchor(2)).unwrap();

        let copy = vec.try_clone().unwrap();

        assert_eq!(clones.get(), 1);
        assert_eq!(labels(&copy), labels(&vec));

        vec.clear();
        assert_eq!(labels(&copy), [some("job 1"), some("anchor 2")]);
    }

    #[test]
    fn clone_from_reuses_and_trims() {
        let clones = Rc::new(Cell::new(0));
        let mut source = queue(nz!(3));
        source.push(job(1, &clones)).unwrap();

        let mut target = queue(nz!(3));
        let reused: *const Job = target.push(job(7, &clones)).unwrap();
        target.push(Lease(2)).unwrap();
        target.push(Lease(3)).unwrap();

        target.try_clone_from(&source).unwrap();

        assert_eq!(labels(&target), [some("job 1")]);
        assert!(ptr::addr_eq(target.data()[0].unwrap().as_ptr(), reused));
        assert!(target.is_copyable());
    }

    #[test]
    fn clone_from_grows_target() {
        let mut source = queue(nz!(3));
        source.push(Anchor(1)).unwrap();
        source.push(Anchor(2)).unwrap();

        let mut target = queue(nz!(3));

        target.try_clone_from(&source).unwrap();

        assert_eq!(labels(&target), [some("anchor 1"), some("anchor 2")]);
    }

    #[test]
    fn clone_from_uncopyable_source_fails_cleanly() {
        let mut source = queue(nz!(2));
        source.push(Lease(1)).unwrap();

        let mut target = queue(nz!(2));
        target.push(Anchor(5)).unwrap();

        assert!(matches!(
            target.try_clone_from(&source),
            Err(Error::CopyNotSupported { .. })
        ));
        assert_eq!(labels(&target), [some("anchor 5")]);
    }

    #[test]
    fn move_from_replaces_contents() {
        let drops = Rc::new(Cell::new(0));
        let mut source = queue(nz!(3));
        source.push(Lease(1)).unwrap();
        source.push(Anchor(2)).unwrap();

        let mut target = queue(nz!(3));
        target.push(socket(9, &drops)).unwrap();

        target.move_from(&mut source).unwrap();

        assert_eq!(drops.get(), 1);
        assert!(source.is_empty());
        assert_eq!(labels(&target), [some("lease 1"), some("anchor 2")]);
    }

    #[test]
    fn move_of_immovable_uncopyable_fails_up_front() {
        let drops = Rc::new(Cell::new(0));
        let mut source = queue(nz!(2));
        source.push(Lease(1)).unwrap();
        source.push(socket(2, &drops)).unwrap();

        let mut target = queue(nz!(2));
        target.push(Lease(7)).unwrap();

        assert!(matches!(
            target.move_from(&mut source),
            Err(Error::TransferNotSupported { type_name }) if type_name.ends_with("Socket")
        ));
        assert_eq!(source.len(), 2);
        assert_eq!(labels(&target), [some("lease 7")]);
    }

    #[test]
    #[should_panic]
    fn move_between_different_configs_panics() {
        let mut source = queue(nz!(2));
        let mut target = queue(nz!(3));

        _ = target.move_from(&mut source);
    }

    #[test]
    fn insert_with_panicking_clone_keeps_every_element_visible() {
        let drops = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(4));
        vec.push(fragile(0, true, &drops)).unwrap();
        vec.push(fragile(1, false, &drops)).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            _ = vec.insert(0, fragile(9, false, &drops));
        }));

        assert!(result.is_err());

        // Fragile 1 was copied one slot to the right and the original dropped, then copying
        // fragile 0 panicked and the value being inserted was dropped during unwinding.
        assert_eq!(drops.get(), 2);
        assert_eq!(vec.len(), 3);
        assert_eq!(labels(&vec), [some("fragile 0"), None, some("fragile 1")]);

        vec.push(fragile(5, false, &drops)).unwrap();

        assert_eq!(drops.get(), 2);
        assert_eq!(
            labels(&vec),
            [some("fragile 0"), None, some("fragile 1"), some("fragile 5")]
        );

        drop(vec);

        assert_eq!(drops.get(), 5);
    }

    #[test]
    fn insert_of_unfitting_type_panics_before_shifting() {
        let clones = Rc::new(Cell::new(0));
        let mut vec = queue(nz!(3));
        vec.push(job(1, &clones)).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            _ = vec.insert(0, Oversized([0; 16]));
        }));

        assert!(result.is_err());
        assert_eq!(vec.len(), 1);
        assert_eq!(labels(&vec), [some("job 1")]);
    }

    #[test]
    fn debug_lists_element_types() {
        let mut vec = queue(nz!(2));
        vec.push(Lease(1)).unwrap();

        let debug = format!("{vec:?}");

        assert!(debug.contains("Lease"));
        assert!(debug.contains("len: 1"));
    }
}
