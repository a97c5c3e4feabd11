use crate::slab::Occupant;

/// Container-wide capability flags, derived from the types of the current occupants.
///
/// An empty container is both copyable and movable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Capabilities {
    pub(crate) copyable: bool,
    pub(crate) movable: bool,
}

impl Capabilities {
    pub(crate) const EMPTY: Self = Self {
        copyable: true,
        movable: true,
    };

    /// Derives the flags from a full scan of the given slot records.
    pub(crate) fn scan<B: ?Sized>(occupants: &[Option<Occupant<B>>]) -> Self {
        occupants
            .iter()
            .flatten()
            .fold(Self::EMPTY, |capabilities, occupant| Self {
                copyable: capabilities.copyable && occupant.descriptor.is_copy_constructible(),
                movable: capabilities.movable && occupant.descriptor.is_move_constructible(),
            })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::alloc::Layout;

    use new_zealand::nz;

    use super::*;
    use crate::slab::SlotSlab;
    use crate::{SlotConfig, element};

    trait Thing {}

    #[derive(Clone)]
    struct Copyable;
    impl Thing for Copyable {}

    struct MoveOnly;
    impl Thing for MoveOnly {}

    struct Stuck;
    impl Thing for Stuck {}

    element!(Copyable => dyn Thing, clone);
    element!(MoveOnly => dyn Thing);
    element!(Stuck => dyn Thing, immovable);

    fn slab() -> SlotSlab<dyn Thing> {
        SlotSlab::new(SlotConfig::new(nz!(4), Layout::new::<u64>()))
    }

    #[test]
    fn empty_is_copyable_and_movable() {
        assert_eq!(Capabilities::scan(slab().occupants()), Capabilities::EMPTY);
    }

    #[test]
    fn move_only_element_blocks_copy() {
        let mut slab = slab();
        _ = slab.construct(0, Copyable);
        _ = slab.construct(3, MoveOnly);

        let capabilities = Capabilities::scan(slab.occupants());

        assert!(!capabilities.copyable);
        assert!(capabilities.movable);
    }

    #[test]
    fn stuck_element_blocks_both() {
        let mut slab = slab();
        _ = slab.construct(1, Stuck);

        let capabilities = Capabilities::scan(slab.occupants());

        assert!(!capabilities.copyable);
        assert!(!capabilities.movable);
    }

    #[test]
    fn scan_only_covers_given_records() {
        let mut slab = slab();
        _ = slab.construct(0, Copyable);
        _ = slab.construct(2, Stuck);

        let prefix = slab.occupants().get(..2).unwrap();

        assert_eq!(Capabilities::scan(prefix), Capabilities::EMPTY);
    }
}
