use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;
use std::{any, fmt};

use crate::config::ConfigDraft;
use crate::{SlotArray, SlotVec};

/// Builder for creating an instance of [`SlotArray`].
///
/// The capacity and the slot layout are mandatory. The slot layout can be given directly via
/// `.slot_layout()`, piecewise via `.slot_size()` and `.alignment()`, or derived from the
/// element types via repeated calls to `.fits::<T>()`, which grow the slot until every listed
/// type fits.
///
/// # Examples
///
/// ```
/// use dyn_slots::SlotArray;
/// use new_zealand::nz;
///
/// let array = SlotArray::<dyn std::fmt::Debug>::builder()
///     .capacity(nz!(8))
///     .fits::<u64>()
///     .fits::<[u8; 24]>()
///     .build();
///
/// assert_eq!(array.len(), 8);
/// assert_eq!(array.slot_size(), 24);
/// assert_eq!(array.alignment(), 8);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[must_use]
pub struct SlotArrayBuilder<B: ?Sized> {
    draft: ConfigDraft,

    _base: PhantomData<fn() -> Box<B>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<B: ?Sized> SlotArrayBuilder<B> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            draft: ConfigDraft::new(),
            _base: PhantomData,
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of slots.
    #[inline]
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.draft.set_capacity(capacity);
        self
    }

    /// Sets the size and alignment of every slot.
    #[inline]
    pub fn slot_layout(mut self, layout: Layout) -> Self {
        self.draft.set_slot_layout(layout);
        self
    }

    /// Sets the number of bytes reserved for every element.
    ///
    /// # Panics
    ///
    /// Panics if the size overflows `isize` when rounded up to the alignment.
    #[inline]
    pub fn slot_size(mut self, size: usize) -> Self {
        self.draft.set_slot_size(size);
        self
    }

    /// Sets the alignment of every slot.
    ///
    /// # Panics
    ///
    /// Panics if the alignment is not a power of two.
    #[inline]
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.draft.set_alignment(alignment);
        self
    }

    /// Grows the slot size and alignment as needed so that a `T` fits into a slot.
    #[inline]
    pub fn fits<T>(mut self) -> Self {
        self.draft.fit(Layout::new::<T>());
        self
    }

    /// Builds the array with the specified configuration, allocating its storage.
    ///
    /// # Panics
    ///
    /// Panics if the capacity was never set or if the slot size is zero.
    #[must_use]
    #[inline]
    pub fn build(self) -> SlotArray<B> {
        SlotArray::new_inner(self.draft.finish())
    }
}

impl<B: ?Sized> fmt::Debug for SlotArrayBuilder<B> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(any::type_name::<Self>())
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}

/// Builder for creating an instance of [`SlotVec`].
///
/// Accepts the same settings as [`SlotArrayBuilder`].
///
/// # Examples
///
/// ```
/// use dyn_slots::SlotVec;
/// use new_zealand::nz;
///
/// let vec = SlotVec::<dyn std::fmt::Debug>::builder()
///     .capacity(nz!(3))
///     .slot_size(32)
///     .alignment(16)
///     .build();
///
/// assert_eq!(vec.capacity(), 3);
/// assert!(vec.is_empty());
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[must_use]
pub struct SlotVecBuilder<B: ?Sized> {
    draft: ConfigDraft,

    _base: PhantomData<fn() -> Box<B>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<B: ?Sized> SlotVecBuilder<B> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            draft: ConfigDraft::new(),
            _base: PhantomData,
            _not_sync: PhantomData,
        }
    }

    /// Sets the maximum number of elements.
    #[inline]
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.draft.set_capacity(capacity);
        self
    }

    /// Sets the size and alignment of every slot.
    #[inline]
    pub fn slot_layout(mut self, layout: Layout) -> Self {
        self.draft.set_slot_layout(layout);
        self
    }

    /// Sets the number of bytes reserved for every element.
    ///
    /// # Panics
    ///
    /// Panics if the size overflows `isize` when rounded up to the alignment.
    #[inline]
    pub fn slot_size(mut self, size: usize) -> Self {
        self.draft.set_slot_size(size);
        self
    }

    /// Sets the alignment of every slot.
    ///
    /// # Panics
    ///
    /// Panics if the alignment is not a power of two.
    #[inline]
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.draft.set_alignment(alignment);
        self
    }

    /// Grows the slot size and alignment as needed so that a `T` fits into a slot.
    #[inline]
    pub fn fits<T>(mut self) -> Self {
        self.draft.fit(Layout::new::<T>());
        self
    }

    /// Builds the vector with the specified configuration, allocating its storage.
    ///
    /// # Panics
    ///
    /// Panics if the capacity was never set or if the slot size is zero.
    #[must_use]
    #[inline]
    pub fn build(self) -> SlotVec<B> {
        SlotVec::new_inner(self.draft.finish())
    }
}

impl<B: ?Sized> fmt::Debug for SlotVecBuilder<B> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(any::type_name::<Self>())
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SlotArrayBuilder<dyn Debug>: Send, Debug);
    assert_not_impl_any!(SlotArrayBuilder<dyn Debug>: Sync);
    assert_impl_all!(SlotVecBuilder<dyn Debug>: Send, Debug);
    assert_not_impl_any!(SlotVecBuilder<dyn Debug>: Sync);

    #[test]
    fn array_builder_applies_layout() {
        let array = SlotArrayBuilder::<dyn Debug>::new()
            .capacity(nz!(5))
            .slot_layout(Layout::from_size_align(40, 8).unwrap())
            .build();

        assert_eq!(array.len(), 5);
        assert_eq!(array.slot_size(), 40);
        assert_eq!(array.alignment(), 8);
    }

    #[test]
    fn vec_builder_fits_types() {
        let vec = SlotVecBuilder::<dyn Debug>::new()
            .capacity(nz!(2))
            .fits::<u16>()
            .fits::<String>()
            .build();

        assert_eq!(vec.capacity(), 2);
        assert_eq!(vec.slot_size(), size_of::<String>());
        assert_eq!(vec.alignment(), align_of::<String>());
    }

    #[test]
    #[should_panic]
    fn array_build_without_capacity_panics() {
        let _array = SlotArrayBuilder::<dyn Debug>::new().fits::<u32>().build();
    }

    #[test]
    #[should_panic]
    fn vec_build_without_slot_size_panics() {
        let _vec = SlotVecBuilder::<dyn Debug>::new().capacity(nz!(1)).build();
    }
}
