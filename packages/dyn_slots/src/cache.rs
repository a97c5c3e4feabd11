use std::cell::Cell;
use std::ptr::NonNull;

use crate::slab::Occupant;

/// A flat list of element addresses (or `None` for empty slots), derived from the slot records
/// on demand.
///
/// Every structural mutation of the container invalidates the cache. The next read rebuilds it
/// in full. The buffer is part of the slab's storage block, so the cache never allocates.
pub(crate) struct PointerCache<B: ?Sized> {
    /// Room for one pointer per slot.
    pointers: NonNull<[Option<NonNull<B>>]>,

    /// Number of entries that are valid, or `None` if the cache must be rebuilt.
    valid_len: Cell<Option<usize>>,
}

impl<B: ?Sized> PointerCache<B> {
    /// Creates a stale cache that stores its entries in `pointers`.
    ///
    /// # Safety
    ///
    /// `pointers` must stay valid for as long as the cache is used, and nothing else may access
    /// it during that time.
    pub(crate) unsafe fn new(pointers: NonNull<[Option<NonNull<B>>]>) -> Self {
        Self {
            pointers,
            valid_len: Cell::new(None),
        }
    }

    /// Marks the cache as stale.
    ///
    /// Takes `&mut self` so no view handed out by [`view()`][Self::view] can still be alive.
    pub(crate) fn invalidate(&mut self) {
        self.valid_len.set(None);
    }

    /// Returns the element addresses for the given slot records, rebuilding if stale.
    ///
    /// The records must be the same ones (same slab, same length) for as long as the cache is
    /// valid. The containers guarantee this by invalidating on every structural mutation.
    pub(crate) fn view(&self, occupants: &[Option<Occupant<B>>]) -> &[Option<NonNull<B>>] {
        let len = occupants.len();

        match self.valid_len.get() {
            Some(valid_len) => assert_eq!(
                valid_len, len,
                "pointer cache must be invalidated before the container length changes"
            ),
            None => {
                // SAFETY: The cache is stale, which means no view is alive: every view borrows
                // `self`, and invalidation requires `&mut self`. The only other writer is this
                // block, and the type is not Sync, so nothing else accesses the buffer
                // concurrently. The creator guarantees the buffer is valid and ours alone.
                let pointers = unsafe { &mut *self.pointers.as_ptr() };

                for (pointer, occupant) in pointers.iter_mut().zip(occupants) {
                    *pointer = occupant.map(|occupant| occupant.ptr);
                }

                self.valid_len.set(Some(len));
            }
        }

        // SAFETY: The buffer is only written while stale, and it is valid now.
        let pointers = unsafe { self.pointers.as_ref() };

        pointers
            .get(..len)
            .expect("cache buffer has room for every slot of the container")
    }
}

// SAFETY: The cached pointers refer to elements owned by the same container, which only
// implements Send if the elements are Send.
unsafe impl<B: ?Sized + Send> Send for PointerCache<B> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::alloc::Layout;

    use new_zealand::nz;

    use super::*;
    use crate::slab::SlotSlab;
    use crate::{SlotConfig, element};

    trait Marker {}

    struct Item;
    impl Marker for Item {}

    element!(Item => dyn Marker);

    #[test]
    fn view_reflects_occupancy() {
        let mut slab = SlotSlab::<dyn Marker>::new(SlotConfig::new(nz!(3), Layout::new::<u8>()));
        let cache = unsafe { PointerCache::new(slab.cache_buffer()) };

        let constructed = slab.construct(1, Item);

        let view = cache.view(slab.occupants());

        assert_eq!(view.len(), 3);
        assert!(view[0].is_none());
        assert_eq!(view[1].unwrap().cast::<()>(), constructed.cast::<()>());
        assert!(view[2].is_none());
    }

    #[test]
    fn invalidation_triggers_rebuild() {
        let mut slab = SlotSlab::<dyn Marker>::new(SlotConfig::new(nz!(2), Layout::new::<u8>()));
        let mut cache = unsafe { PointerCache::new(slab.cache_buffer()) };

        assert!(cache.view(slab.occupants()).iter().all(Option::is_none));

        _ = slab.construct(0, Item);

        // Stale until invalidated.
        assert!(cache.view(slab.occupants())[0].is_none());

        cache.invalidate();

        assert!(cache.view(slab.occupants())[0].is_some());
    }

    #[test]
    fn view_length_follows_records() {
        let slab = SlotSlab::<dyn Marker>::new(SlotConfig::new(nz!(4), Layout::new::<u8>()));
        let mut cache = unsafe { PointerCache::new(slab.cache_buffer()) };

        assert_eq!(cache.view(slab.occupants().get(..2).unwrap()).len(), 2);

        cache.invalidate();

        assert_eq!(cache.view(slab.occupants()).len(), 4);
    }

    #[test]
    #[should_panic]
    fn length_change_without_invalidation_panics() {
        let slab = SlotSlab::<dyn Marker>::new(SlotConfig::new(nz!(4), Layout::new::<u8>()));
        let cache = unsafe { PointerCache::new(slab.cache_buffer()) };

        _ = cache.view(slab.occupants().get(..2).unwrap());
        _ = cache.view(slab.occupants());
    }
}
