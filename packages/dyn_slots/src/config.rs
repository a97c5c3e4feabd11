use std::alloc::Layout;
use std::num::NonZero;

/// The fixed shape of a container: how many slots it has and how much memory each slot
/// reserves.
///
/// Created by [`SlotArrayBuilder`][crate::SlotArrayBuilder] or
/// [`SlotVecBuilder`][crate::SlotVecBuilder] and fixed for the lifetime of the container.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SlotConfig {
    capacity: NonZero<usize>,
    slot_layout: Layout,
}

impl SlotConfig {
    pub(crate) fn new(capacity: NonZero<usize>, slot_layout: Layout) -> Self {
        assert!(
            slot_layout.size() > 0,
            "slot layout must have a non-zero size"
        );

        Self {
            capacity,
            slot_layout,
        }
    }

    /// Number of slots in the container.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// Bytes reserved for each element.
    #[must_use]
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_layout.size()
    }

    /// Alignment guaranteed for each slot.
    #[must_use]
    #[inline]
    pub fn alignment(&self) -> usize {
        self.slot_layout.align()
    }

    /// The layout of a single slot.
    #[must_use]
    #[inline]
    pub fn slot_layout(&self) -> Layout {
        self.slot_layout
    }

    /// Distance in bytes between the starts of two adjacent slots.
    pub(crate) fn stride(&self) -> usize {
        self.slot_layout.pad_to_align().size()
    }

    /// Whether a value with the given layout can be stored in a slot.
    #[must_use]
    pub fn fits(&self, layout: Layout) -> bool {
        layout.size() <= self.slot_layout.size() && layout.align() <= self.slot_layout.align()
    }
}

/// Configuration under construction, shared by the builders of both container types.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConfigDraft {
    capacity: Option<NonZero<usize>>,
    slot_layout: Layout,
}

impl ConfigDraft {
    pub(crate) fn new() -> Self {
        Self {
            capacity: None,
            slot_layout: Layout::new::<()>(),
        }
    }

    pub(crate) fn set_capacity(&mut self, capacity: NonZero<usize>) {
        self.capacity = Some(capacity);
    }

    pub(crate) fn set_slot_layout(&mut self, layout: Layout) {
        self.slot_layout = layout;
    }

    pub(crate) fn set_slot_size(&mut self, size: usize) {
        self.slot_layout = Layout::from_size_align(size, self.slot_layout.align())
            .expect("slot size must not overflow isize when rounded up to the slot alignment");
    }

    pub(crate) fn set_alignment(&mut self, alignment: usize) {
        assert!(
            alignment.is_power_of_two(),
            "slot alignment must be a power of two, got {alignment}"
        );

        self.slot_layout = Layout::from_size_align(self.slot_layout.size(), alignment)
            .expect("slot size must not overflow isize when rounded up to the slot alignment");
    }

    /// Grows the slot layout so that a value with `layout` fits.
    pub(crate) fn fit(&mut self, layout: Layout) {
        let size = self.slot_layout.size().max(layout.size());
        let align = self.slot_layout.align().max(layout.align());

        self.slot_layout = Layout::from_size_align(size, align)
            .expect("slot size must not overflow isize when rounded up to the slot alignment");
    }

    pub(crate) fn finish(self) -> SlotConfig {
        let capacity = self
            .capacity
            .expect("capacity must be set using .capacity() before calling .build()");

        assert!(
            self.slot_layout.size() > 0,
            "slot size must be set using .slot_size(), .slot_layout() or .fits::<T>() before calling .build()"
        );

        SlotConfig::new(capacity, self.slot_layout)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn draft_grows_to_fit_every_type() {
        let mut draft = ConfigDraft::new();
        draft.set_capacity(nz!(4));
        draft.fit(Layout::new::<u8>());
        draft.fit(Layout::new::<[u16; 5]>());
        draft.fit(Layout::new::<u64>());

        let config = draft.finish();

        assert_eq!(config.capacity().get(), 4);
        assert_eq!(config.slot_size(), 10);
        assert_eq!(config.alignment(), 8);
        assert_eq!(config.stride(), 16);
    }

    #[test]
    fn explicit_size_and_alignment() {
        let mut draft = ConfigDraft::new();
        draft.set_capacity(nz!(2));
        draft.set_slot_size(24);
        draft.set_alignment(16);

        let config = draft.finish();

        assert_eq!(config.slot_size(), 24);
        assert_eq!(config.alignment(), 16);
        assert_eq!(config.stride(), 32);
        assert_eq!(config.slot_layout(), Layout::from_size_align(24, 16).unwrap());
    }

    #[test]
    fn fits_checks_size_and_alignment() {
        let config = SlotConfig::new(nz!(1), Layout::from_size_align(16, 4).unwrap());

        assert!(config.fits(Layout::new::<[u32; 4]>()));
        assert!(config.fits(Layout::new::<u8>()));
        assert!(!config.fits(Layout::new::<[u32; 5]>()));
        assert!(!config.fits(Layout::new::<u64>()));
    }

    #[test]
    #[should_panic]
    fn missing_capacity_panics() {
        let mut draft = ConfigDraft::new();
        draft.set_slot_size(8);

        let _config = draft.finish();
    }

    #[test]
    #[should_panic]
    fn zero_sized_slot_panics() {
        let mut draft = ConfigDraft::new();
        draft.set_capacity(nz!(8));

        let _config = draft.finish();
    }

    #[test]
    #[should_panic]
    fn non_power_of_two_alignment_panics() {
        let mut draft = ConfigDraft::new();
        draft.set_alignment(3);
    }
}
