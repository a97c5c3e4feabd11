use std::alloc::{Layout, alloc, dealloc};
use std::any;
use std::mem::MaybeUninit;
use std::ops::Range;
use std::ptr::NonNull;
use std::slice;

use crate::descriptor::{self, TypeDescriptor};
use crate::upcast::{UpcastFn, upcast_erased};
use crate::{Element, Result, SlotConfig, Upcast, descriptor_of};

/// A live value in a slot, as seen through the base type `B`.
pub(crate) struct Occupant<B: ?Sized> {
    /// Address of the value, already converted to the base type.
    pub(crate) ptr: NonNull<B>,

    /// Describes the concrete type of the value.
    pub(crate) descriptor: &'static TypeDescriptor,

    /// Recreates `ptr` for the same concrete type at a different slot address.
    upcast: UpcastFn<B>,
}

impl<B: ?Sized> Occupant<B> {
    fn erased(&self) -> NonNull<()> {
        self.ptr.cast::<()>()
    }

    /// The same kind of occupant, living at `target` instead.
    fn relocated(&self, target: NonNull<()>) -> Self {
        Self {
            ptr: (self.upcast)(target),
            descriptor: self.descriptor,
            upcast: self.upcast,
        }
    }
}

impl<B: ?Sized> Clone for Occupant<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: ?Sized> Copy for Occupant<B> {}

/// A fixed number of equally sized memory slots, each either empty or holding one value of any
/// concrete type that fits the slot and converts to the base type `B`.
///
/// Everything the container needs lives in one memory block, allocated when the slab is created
/// and released when it is dropped. The block starts with the slots themselves, followed by one
/// occupancy record per slot and finally the scratch buffer of the container's pointer cache.
/// Values are only relocated when explicitly transferred between slots.
pub(crate) struct SlotSlab<B: ?Sized> {
    config: SlotConfig,

    /// Distance between adjacent slots, padded so every slot starts at the configured alignment.
    stride: usize,

    /// Layout of the entire block, for deallocation.
    storage_layout: Layout,

    first_slot_ptr: NonNull<u8>,

    /// One record per slot, kept apart from the slots so the slot memory contains nothing but
    /// element bytes.
    occupants: NonNull<[Option<Occupant<B>>]>,

    /// One pointer per slot, handed to the container's pointer cache.
    cache_buffer: NonNull<[Option<NonNull<B>>]>,
}

impl<B: ?Sized> SlotSlab<B> {
    /// Allocates storage for all slots described by `config`. All slots start empty.
    #[must_use]
    pub(crate) fn new(config: SlotConfig) -> Self {
        let stride = config.stride();
        let capacity = config.capacity().get();

        let slots_layout = stride
            .checked_mul(capacity)
            .and_then(|size| Layout::from_size_align(size, config.alignment()).ok())
            .expect("slot layout calculation cannot fail for reasonable capacity values");

        let records_layout = Layout::array::<Option<Occupant<B>>>(capacity)
            .expect("record layout calculation cannot fail for reasonable capacity values");

        let cache_layout = Layout::array::<Option<NonNull<B>>>(capacity)
            .expect("cache layout calculation cannot fail for reasonable capacity values");

        let (with_records, records_offset) = slots_layout
            .extend(records_layout)
            .expect("storage layout calculation cannot fail for reasonable capacity values");

        let (storage_layout, cache_offset) = with_records
            .extend(cache_layout)
            .expect("storage layout calculation cannot fail for reasonable capacity values");

        let storage_layout = storage_layout.pad_to_align();

        // SAFETY: The layout is non-zero-sized because both the slot size (validated by
        // SlotConfig) and the capacity are non-zero.
        let first_slot_ptr = NonNull::new(unsafe { alloc(storage_layout) })
            .expect("we do not intend to handle allocation failure as a real possibility - OOM results in panic");

        // SAFETY: Layout::extend placed the record array at this offset within the block we just
        // allocated, aligned for its element type.
        let occupants = unsafe { fill_array(first_slot_ptr, records_offset, capacity, None) };

        // SAFETY: Layout::extend placed the cache array at this offset within the block we just
        // allocated, aligned for its element type, and after the end of the record array.
        let cache_buffer = unsafe { fill_array(first_slot_ptr, cache_offset, capacity, None) };

        Self {
            config,
            stride,
            storage_layout,
            first_slot_ptr,
            occupants,
            cache_buffer,
        }
    }

    pub(crate) fn config(&self) -> SlotConfig {
        self.config
    }

    pub(crate) fn capacity(&self) -> usize {
        self.occupants.len()
    }

    pub(crate) fn occupants(&self) -> &[Option<Occupant<B>>] {
        // SAFETY: Every record was initialized in new() and is only written through `&mut self`.
        unsafe { self.occupants.as_ref() }
    }

    /// Memory for the container's pointer cache. Nothing in the slab reads or writes it.
    pub(crate) fn cache_buffer(&self) -> NonNull<[Option<NonNull<B>>]> {
        self.cache_buffer
    }

    pub(crate) fn occupant(&self, index: usize) -> Option<Occupant<B>> {
        self.occupants().get(index).copied().flatten()
    }

    fn record_mut(&mut self, index: usize) -> &mut Option<Occupant<B>> {
        let capacity = self.capacity();

        // SAFETY: Every record was initialized in new() and the exclusive borrow of the slab
        // is inherited by the returned reference.
        let records = unsafe { self.occupants.as_mut() };

        records.get_mut(index).unwrap_or_else(|| {
            panic!("slot {index} index out of bounds in slab of capacity {capacity}")
        })
    }

    fn slot_ptr(&self, index: usize) -> NonNull<()> {
        assert!(
            index < self.capacity(),
            "slot {index} index out of bounds in slab of capacity {}",
            self.capacity()
        );

        // Guarded by bounds check above, so we are guaranteed that the pointer is valid.
        // This cannot overflow because that would imply the slab extends beyond virtual memory.
        let offset = index.wrapping_mul(self.stride);

        // SAFETY: The offset is within our allocation due to the bounds check above.
        unsafe { self.first_slot_ptr.byte_add(offset).cast::<()>() }
    }

    /// Panics unless `T` fits a slot.
    pub(crate) fn assert_fits<T>(&self) {
        let layout = Layout::new::<T>();

        assert!(
            self.config.fits(layout),
            "type {} with size {} and alignment {} does not fit a slot with size {} and alignment {}",
            any::type_name::<T>(),
            layout.size(),
            layout.align(),
            self.config.slot_size(),
            self.config.alignment()
        );
    }

    /// Stores `value` in the slot, destroying any current occupant first.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not fit a slot or the index is out of bounds.
    pub(crate) fn construct<T>(&mut self, index: usize, value: T) -> NonNull<T>
    where
        T: Element + Upcast<B>,
    {
        // SAFETY: The closure initializes the value.
        unsafe {
            self.construct_in_place(index, |uninit: &mut MaybeUninit<T>| {
                uninit.write(value);
            })
        }
    }

    /// Stores the value returned by `f` in the slot, destroying any current occupant first.
    ///
    /// The current occupant is destroyed before `f` is called. If `f` fails, the slot is left
    /// empty.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not fit a slot or the index is out of bounds.
    pub(crate) fn construct_with<T, E>(
        &mut self,
        index: usize,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<NonNull<T>, E>
    where
        T: Element + Upcast<B>,
    {
        self.assert_fits::<T>();
        self.destroy(index);

        let value = f()?;

        Ok(self.construct(index, value))
    }

    /// Lets `f` initialize a value directly in the slot, destroying any current occupant first.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not fit a slot or the index is out of bounds.
    ///
    /// # Safety
    ///
    /// `f` must initialize the value before returning.
    pub(crate) unsafe fn construct_in_place<T>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut MaybeUninit<T>),
    ) -> NonNull<T>
    where
        T: Element + Upcast<B>,
    {
        self.assert_fits::<T>();
        self.destroy(index);

        let slot_ptr = self.slot_ptr(index).cast::<MaybeUninit<T>>();

        // SAFETY: The slot is within our allocation, aligned for T (checked by assert_fits)
        // and empty, so nothing else references it.
        f(unsafe { &mut *slot_ptr.as_ptr() });

        *self.record_mut(index) = Some(Occupant {
            ptr: T::upcast(slot_ptr.cast::<T>()),
            descriptor: descriptor_of::<T>(),
            upcast: upcast_erased::<T, B>,
        });

        slot_ptr.cast::<T>()
    }

    /// Drops the occupant of the slot, if any.
    pub(crate) fn destroy(&mut self, index: usize) {
        // The record is cleared before the destructor runs, so a panicking destructor cannot
        // cause a double drop.
        let Some(occupant) = self.record_mut(index).take() else {
            return;
        };

        // SAFETY: The occupant record guarantees a live value of the described type, and the
        // record has been cleared so nothing refers to it anymore.
        unsafe { occupant.descriptor.destroy(occupant.erased()) };
    }

    /// Drops every occupant within `range`.
    pub(crate) fn destroy_range(&mut self, range: Range<usize>) {
        for index in range {
            self.destroy(index);
        }
    }

    /// Relocates the occupant of `from` into the empty slot `to`, leaving `from` empty.
    ///
    /// Nothing happens if `from` is empty.
    ///
    /// # Panics
    ///
    /// Panics if `to` is occupied.
    pub(crate) fn transfer(&mut self, from: usize, to: usize) -> Result<()> {
        let Some(occupant) = self.occupant(from) else {
            return Ok(());
        };

        assert!(
            self.occupant(to).is_none(),
            "transfer target slot {to} must be empty"
        );

        let target = self.slot_ptr(to);

        // SAFETY: The occupant is live and the target is an empty slot of the same slab, so the
        // two do not overlap and the target fits the occupant's type.
        unsafe { descriptor::transfer(occupant.descriptor, occupant.erased(), target) }?;

        *self.record_mut(from) = None;
        *self.record_mut(to) = Some(occupant.relocated(target));

        Ok(())
    }

    /// Relocates the occupant of `source[from]` into the empty slot `self[to]`, leaving the
    /// source slot empty.
    ///
    /// # Panics
    ///
    /// Panics if the target is occupied or if the slabs have different configurations.
    pub(crate) fn transfer_from(&mut self, to: usize, source: &mut Self, from: usize) -> Result<()> {
        let Some(occupant) = source.occupant(from) else {
            return Ok(());
        };

        assert_eq!(
            self.config, source.config,
            "elements can only be transferred between slabs with identical configuration"
        );
        assert!(
            self.occupant(to).is_none(),
            "transfer target slot {to} must be empty"
        );

        let target = self.slot_ptr(to);

        // SAFETY: The occupant is live, the target is an empty slot of a different allocation
        // with the same slot layout.
        unsafe { descriptor::transfer(occupant.descriptor, occupant.erased(), target) }?;

        *source.record_mut(from) = None;
        *self.record_mut(to) = Some(occupant.relocated(target));

        Ok(())
    }

    /// Copy-constructs the occupant of `source[from]` into the empty slot `self[to]`.
    ///
    /// Nothing happens if the source slot is empty.
    ///
    /// # Panics
    ///
    /// Panics if the target is occupied or if the slabs have different configurations.
    pub(crate) fn duplicate_from(&mut self, to: usize, source: &Self, from: usize) -> Result<()> {
        let Some(occupant) = source.occupant(from) else {
            return Ok(());
        };

        assert_eq!(
            self.config, source.config,
            "elements can only be copied between slabs with identical configuration"
        );
        assert!(
            self.occupant(to).is_none(),
            "copy target slot {to} must be empty"
        );

        let target = self.slot_ptr(to);

        // SAFETY: The occupant is live and the target is an empty slot of a different allocation
        // with the same slot layout.
        unsafe { descriptor::duplicate(occupant.descriptor, occupant.erased(), target) }?;

        *self.record_mut(to) = Some(occupant.relocated(target));

        Ok(())
    }

    /// Makes `self[to]` a copy of `source[from]`.
    ///
    /// If both slots hold values of the same type that supports copy-assignment, the existing
    /// value is assigned to in place. Otherwise the current occupant is destroyed and the
    /// source is copy-constructed. An empty source empties the target.
    pub(crate) fn assign_from(&mut self, to: usize, source: &Self, from: usize) -> Result<()> {
        let Some(occupant) = source.occupant(from) else {
            self.destroy(to);
            return Ok(());
        };

        let same_type = self
            .occupant(to)
            .filter(|current| current.descriptor.is_same_type(occupant.descriptor));

        if let Some(current) = same_type {
            // SAFETY: Both are live values of the same type in different allocations.
            let assigned = unsafe {
                descriptor::duplicate_assign(current.descriptor, occupant.erased(), current.erased())
            };

            if assigned {
                return Ok(());
            }
        }

        self.destroy(to);
        self.duplicate_from(to, source, from)
    }

    /// Returns the first occupant within `range` that matches `predicate`.
    pub(crate) fn find(
        &self,
        range: Range<usize>,
        predicate: impl Fn(&TypeDescriptor) -> bool,
    ) -> Option<&'static TypeDescriptor> {
        self.occupants()
            .get(range)
            .into_iter()
            .flatten()
            .flatten()
            .map(|occupant| occupant.descriptor)
            .find(|&descriptor| predicate(descriptor))
    }
}

impl<B: ?Sized> Drop for SlotSlab<B> {
    fn drop(&mut self) {
        self.destroy_range(0..self.capacity());

        // SAFETY: The block was allocated in new() with this exact layout and every occupant
        // has been destroyed above. The records and the cache buffer hold plain `Copy` values
        // that need no cleanup.
        unsafe {
            dealloc(self.first_slot_ptr.as_ptr(), self.storage_layout);
        }
    }
}

/// Initializes `len` consecutive values of `T` at `offset` bytes into `block` to `value`.
///
/// # Safety
///
/// The array must lie within the allocation that starts at `block`, be aligned for `T` and not
/// be referenced by anything else.
unsafe fn fill_array<T: Copy>(
    block: NonNull<u8>,
    offset: usize,
    len: usize,
    value: T,
) -> NonNull<[T]> {
    // SAFETY: Forwarding safety requirements to the caller.
    let first = unsafe { block.byte_add(offset) }.cast::<MaybeUninit<T>>();

    // SAFETY: Forwarding safety requirements to the caller.
    let array = unsafe { slice::from_raw_parts_mut(first.as_ptr(), len) };
    array.fill(MaybeUninit::new(value));

    NonNull::slice_from_raw_parts(first.cast::<T>(), len)
}

// SAFETY: The slab exclusively owns its occupants. Every occupant can be viewed as a `B` and
// the Upcast contract guarantees that the concrete type satisfies the auto traits of `B`, so
// if `B` is Send then so is every occupant.
unsafe impl<B: ?Sized + Send> Send for SlotSlab<B> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::cell::Cell;
    use std::num::NonZero;
    use std::rc::Rc;

    use super::*;
    use crate::{Error, element};

    trait Gauge {
        fn value(&self) -> u32;
    }

    #[derive(Clone)]
    struct Counted {
        value: u32,
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl Gauge for Counted {
        fn value(&self) -> u32 {
            self.value
        }
    }

    struct Fixed(u32);

    impl Gauge for Fixed {
        fn value(&self) -> u32 {
            self.0
        }
    }

    #[derive(Clone, Copy)]
    struct Wide([u64; 2]);

    impl Gauge for Wide {
        fn value(&self) -> u32 {
            u32::try_from(self.0[0]).unwrap()
        }
    }

    struct TooBig([u64; 8]);

    impl Gauge for TooBig {
        fn value(&self) -> u32 {
            u32::try_from(self.0.len()).unwrap()
        }
    }

    element!(Counted => dyn Gauge, clone);
    element!(Fixed => dyn Gauge, immovable);
    element!(Wide => dyn Gauge, copy);
    element!(TooBig => dyn Gauge);

    fn slab(capacity: usize) -> SlotSlab<dyn Gauge> {
        let layout = Layout::from_size_align(24, 8).unwrap();
        SlotSlab::new(SlotConfig::new(NonZero::new(capacity).unwrap(), layout))
    }

    fn value_at(slab: &SlotSlab<dyn Gauge>, index: usize) -> Option<u32> {
        slab.occupant(index)
            .map(|occupant| unsafe { occupant.ptr.as_ref() }.value())
    }

    fn counted(value: u32, drops: &Rc<Cell<usize>>) -> Counted {
        Counted {
            value,
            drops: Rc::clone(drops),
        }
    }

    #[test]
    fn slots_are_aligned_and_spaced_by_stride() {
        let slab = slab(3);

        assert_eq!(slab.stride, 24);

        for index in 0..3 {
            let address = slab.slot_ptr(index).as_ptr().addr();
            assert_eq!(address % 8, 0);
        }

        let first = slab.slot_ptr(0).as_ptr().addr();
        let third = slab.slot_ptr(2).as_ptr().addr();
        assert_eq!(third - first, 48);
    }

    #[test]
    fn records_and_cache_buffer_share_the_slot_block() {
        let slab = slab(3);

        let block_start = slab.first_slot_ptr.as_ptr().addr();
        let block_end = block_start + slab.storage_layout.size();
        let slots_end = block_start + 3 * slab.stride;

        let records_start = slab.occupants().as_ptr().addr();
        let records_end = records_start + size_of_val(slab.occupants());

        let cache_start = slab.cache_buffer().cast::<u8>().as_ptr().addr();
        let cache_end = cache_start + 3 * size_of::<Option<NonNull<dyn Gauge>>>();

        assert!(slots_end <= records_start);
        assert!(records_end <= cache_start);
        assert!(cache_end <= block_end);

        assert_eq!(slab.occupants().len(), 3);
        assert_eq!(slab.cache_buffer().len(), 3);
        assert!(slab.occupants().iter().all(Option::is_none));
        assert_eq!(slab.storage_layout.align(), 8);
    }

    #[test]
    fn construct_records_occupant() {
        let mut slab = slab(2);

        let ptr = slab.construct(1, Wide([5, 0]));

        assert_eq!(value_at(&slab, 0), None);
        assert_eq!(value_at(&slab, 1), Some(5));
        assert_eq!(ptr.cast::<()>(), slab.slot_ptr(1));
    }

    #[test]
    fn construct_overwrites_and_drops_previous() {
        let drops = Rc::new(Cell::new(0));
        let mut slab = slab(1);

        _ = slab.construct(0, counted(1, &drops));
        _ = slab.construct(0, counted(2, &drops));

        assert_eq!(drops.get(), 1);
        assert_eq!(value_at(&slab, 0), Some(2));
    }

    #[test]
    fn failed_construction_leaves_slot_empty() {
        let drops = Rc::new(Cell::new(0));
        let mut slab = slab(1);

        _ = slab.construct(0, counted(1, &drops));

        let result = slab.construct_with::<Counted, &str>(0, || Err("nope"));

        assert_eq!(result.unwrap_err(), "nope");
        assert_eq!(drops.get(), 1);
        assert_eq!(value_at(&slab, 0), None);
    }

    #[test]
    #[should_panic]
    fn oversized_type_panics() {
        let mut slab = slab(1);
        _ = slab.construct(0, TooBig([0; 8]));
    }

    #[test]
    fn destroy_empty_slot_is_noop() {
        let mut slab = slab(2);

        slab.destroy(1);

        assert_eq!(value_at(&slab, 1), None);
    }

    #[test]
    fn transfer_moves_occupant() {
        let drops = Rc::new(Cell::new(0));
        let mut slab = slab(3);

        _ = slab.construct(0, counted(10, &drops));
        slab.transfer(0, 2).unwrap();

        assert_eq!(value_at(&slab, 0), None);
        assert_eq!(value_at(&slab, 2), Some(10));
        assert_eq!(drops.get(), 0);

        let occupant = slab.occupant(2).unwrap();
        assert_eq!(occupant.ptr.cast::<()>(), slab.slot_ptr(2));
    }

    #[test]
    fn transfer_of_immovable_fails_without_changes() {
        let mut slab = slab(2);

        _ = slab.construct(0, Fixed(3));

        let result = slab.transfer(0, 1);

        assert!(matches!(result, Err(Error::TransferNotSupported { .. })));
        assert_eq!(value_at(&slab, 0), Some(3));
        assert_eq!(value_at(&slab, 1), None);
    }

    #[test]
    #[should_panic]
    fn transfer_into_occupied_slot_panics() {
        let mut slab = slab(2);

        _ = slab.construct(0, Wide([1, 0]));
        _ = slab.construct(1, Wide([2, 0]));

        _ = slab.transfer(0, 1);
    }

    #[test]
    fn transfer_between_slabs() {
        let mut source = slab(2);
        let mut target = slab(2);

        _ = source.construct(1, Wide([8, 0]));
        target.transfer_from(0, &mut source, 1).unwrap();

        assert_eq!(value_at(&source, 1), None);
        assert_eq!(value_at(&target, 0), Some(8));
    }

    #[test]
    fn duplicate_from_keeps_source() {
        let drops = Rc::new(Cell::new(0));
        let mut source = slab(1);
        let mut target = slab(1);

        _ = source.construct(0, counted(4, &drops));
        target.duplicate_from(0, &source, 0).unwrap();

        assert_eq!(value_at(&source, 0), Some(4));
        assert_eq!(value_at(&target, 0), Some(4));

        drop(source);
        drop(target);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn duplicate_of_uncopyable_fails() {
        let mut source = slab(1);
        let mut target = slab(1);

        _ = source.construct(0, Fixed(1));

        let result = target.duplicate_from(0, &source, 0);

        assert!(matches!(result, Err(Error::CopyNotSupported { .. })));
        assert_eq!(value_at(&target, 0), None);
    }

    #[test]
    fn assign_from_reuses_same_type() {
        let drops = Rc::new(Cell::new(0));
        let mut source = slab(1);
        let mut target = slab(1);

        _ = source.construct(0, counted(7, &drops));
        let target_ptr = target.construct(0, counted(1, &drops));

        target.assign_from(0, &source, 0).unwrap();

        assert_eq!(value_at(&target, 0), Some(7));
        assert_eq!(target.occupant(0).unwrap().ptr.cast::<()>(), target_ptr.cast::<()>());
    }

    #[test]
    fn assign_from_replaces_other_type() {
        let mut source = slab(1);
        let mut target = slab(1);

        _ = source.construct(0, Wide([9, 0]));
        _ = target.construct(0, Fixed(1));

        target.assign_from(0, &source, 0).unwrap();

        assert_eq!(value_at(&target, 0), Some(9));
        assert!(
            target
                .occupant(0)
                .unwrap()
                .descriptor
                .is_same_type(descriptor_of::<Wide>())
        );
    }

    #[test]
    fn assign_from_empty_source_empties_target() {
        let source = slab(1);
        let mut target = slab(1);

        _ = target.construct(0, Wide([9, 0]));

        target.assign_from(0, &source, 0).unwrap();

        assert_eq!(value_at(&target, 0), None);
    }

    #[test]
    fn find_reports_first_match_in_range() {
        let mut slab = slab(4);

        _ = slab.construct(0, Fixed(1));
        _ = slab.construct(2, Wide([0, 0]));
        _ = slab.construct(3, Fixed(2));

        let immovable = slab.find(1..4, |descriptor| !descriptor.is_move_constructible());
        assert!(immovable.unwrap().is_same_type(descriptor_of::<Fixed>()));

        assert!(slab.find(1..3, |descriptor| !descriptor.is_move_constructible()).is_none());
    }

    #[test]
    fn drop_destroys_all_occupants() {
        let drops = Rc::new(Cell::new(0));

        {
            let mut slab = slab(3);
            _ = slab.construct(0, counted(1, &drops));
            _ = slab.construct(2, counted(2, &drops));
        }

        assert_eq!(drops.get(), 2);
    }
}
