use std::alloc::Layout;
use std::any::{TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use tracing::trace;

use crate::{Error, Result};

/// Erased operation that drops the value at the given address.
type DropFn = unsafe fn(NonNull<()>);

/// Erased operation that reads the value at `src` and writes it to `dst`.
///
/// For moves, the source is left logically uninitialized. For copies, the source is untouched.
type TransferFn = unsafe fn(src: NonNull<()>, dst: NonNull<()>);

/// A concrete type that can be stored in a [`SlotArray`][crate::SlotArray] or
/// [`SlotVec`][crate::SlotVec].
///
/// The containers cannot inspect a type to learn whether it can be cloned or whether it may be
/// relocated after construction, so every stored type declares this once by implementing
/// `Element`. The defaults describe a type that can be moved between slots but not copied.
///
/// Most types are declared with the [`element!`][crate::element] macro, which also implements
/// [`Upcast`][crate::Upcast] for the base type of the container.
///
/// # Examples
///
/// ```
/// use dyn_slots::{Duplicate, Element};
///
/// #[derive(Clone)]
/// struct Label(String);
///
/// impl Element for Label {
///     const DUPLICATE: Duplicate<Self> = Duplicate::cloned();
/// }
///
/// struct Token(u64);
///
/// // Move-only.
/// impl Element for Token {}
/// ```
pub trait Element: Sized + 'static {
    /// How values of this type are duplicated when a whole container is copied.
    const DUPLICATE: Duplicate<Self> = Duplicate::unsupported();

    /// Whether a value may be relocated to another slot after it has been constructed.
    ///
    /// Types that hand out their own address (for example, by registering it with some other
    /// component) set this to `false`. The containers then never move such a value: shifting
    /// falls back to copying if [`DUPLICATE`][Self::DUPLICATE] allows it and otherwise fails
    /// with [`Error::TransferNotSupported`].
    const MOVABLE: bool = true;
}

/// Describes how values of `T` are duplicated.
///
/// Used as the value of [`Element::DUPLICATE`].
pub struct Duplicate<T> {
    construct: Option<TransferFn>,
    assign: Option<TransferFn>,
    bitwise: bool,

    _element: PhantomData<fn() -> T>,
}

impl<T> Duplicate<T> {
    /// Values cannot be duplicated. A container holding such a value cannot be copied.
    #[must_use]
    pub const fn unsupported() -> Self {
        Self {
            construct: None,
            assign: None,
            bitwise: false,
            _element: PhantomData,
        }
    }
}

impl<T: Clone> Duplicate<T> {
    /// Values are duplicated with [`Clone::clone`], and copied onto an existing value of the
    /// same type with [`Clone::clone_from`].
    #[must_use]
    pub const fn cloned() -> Self {
        Self {
            construct: Some(clone_fn::<T> as TransferFn),
            assign: Some(clone_from_fn::<T> as TransferFn),
            bitwise: false,
            _element: PhantomData,
        }
    }
}

impl<T: Copy> Duplicate<T> {
    /// Values are plain bytes: copying the bytes duplicates the value.
    ///
    /// This also lets the containers relocate values with a raw byte copy, bypassing the
    /// per-type operations entirely.
    #[must_use]
    pub const fn bitwise() -> Self {
        Self {
            construct: Some(copy_fn::<T> as TransferFn),
            assign: Some(copy_fn::<T> as TransferFn),
            bitwise: true,
            _element: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Duplicate<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("copyable", &self.construct.is_some())
            .field("bitwise", &self.bitwise)
            .finish()
    }
}

/// Everything the containers need to know about a concrete element type, with the type
/// itself forgotten.
///
/// There is exactly one descriptor per element type, obtained via [`descriptor_of()`]. It is
/// computed at compile time, so looking it up never allocates, locks or fails.
pub struct TypeDescriptor {
    layout: Layout,
    trivially_relocatable: bool,
    type_name: fn() -> &'static str,
    type_id: fn() -> TypeId,

    drop: DropFn,
    relocate: Option<TransferFn>,
    duplicate: Option<TransferFn>,
    duplicate_assign: Option<TransferFn>,
}

impl TypeDescriptor {
    const fn new<T: Element>() -> Self {
        let duplicate = T::DUPLICATE;

        Self {
            layout: Layout::new::<T>(),
            trivially_relocatable: duplicate.bitwise,
            type_name: type_name::<T>,
            type_id: TypeId::of::<T>,
            drop: drop_fn::<T>,
            relocate: if T::MOVABLE {
                Some(relocate_fn::<T> as TransferFn)
            } else {
                None
            },
            duplicate: duplicate.construct,
            duplicate_assign: duplicate.assign,
        }
    }

    /// Memory layout of the element type.
    #[must_use]
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Size of the element type in bytes.
    #[must_use]
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Alignment of the element type in bytes.
    #[must_use]
    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Whether a raw byte copy is a valid way to both duplicate and relocate a value.
    #[must_use]
    #[inline]
    pub fn is_trivially_relocatable(&self) -> bool {
        self.trivially_relocatable
    }

    /// Whether values can be duplicated.
    #[must_use]
    #[inline]
    pub fn is_copy_constructible(&self) -> bool {
        self.duplicate.is_some()
    }

    /// Whether values can be relocated to another slot.
    #[must_use]
    #[inline]
    pub fn is_move_constructible(&self) -> bool {
        self.relocate.is_some()
    }

    /// Name of the element type, for diagnostics.
    #[must_use]
    #[inline]
    pub fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    /// Whether this descriptor describes the same concrete type as `other`.
    ///
    /// Descriptors are compared by type identity, not by address.
    #[must_use]
    #[inline]
    pub fn is_same_type(&self, other: &Self) -> bool {
        (self.type_id)() == (other.type_id)()
    }

    /// Drops the value at `target`.
    ///
    /// # Safety
    ///
    /// `target` must point to a live value of the described type, which must not be used
    /// again afterwards.
    pub(crate) unsafe fn destroy(&self, target: NonNull<()>) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { (self.drop)(target) }
    }
}

impl fmt::Debug for TypeDescriptor {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("type_name", &self.type_name())
            .field("layout", &self.layout)
            .field("trivially_relocatable", &self.trivially_relocatable)
            .field("copy_constructible", &self.is_copy_constructible())
            .field("move_constructible", &self.is_move_constructible())
            .finish_non_exhaustive()
    }
}

/// Holds the compile-time descriptor for one element type.
struct Registry<T>(PhantomData<T>);

impl<T: Element> Registry<T> {
    const DESCRIPTOR: &'static TypeDescriptor = &TypeDescriptor::new::<T>();
}

/// Returns the descriptor of the element type `T`.
///
/// # Examples
///
/// ```
/// use dyn_slots::{Duplicate, Element, descriptor_of};
///
/// #[derive(Clone)]
/// struct Label(String);
///
/// impl Element for Label {
///     const DUPLICATE: Duplicate<Self> = Duplicate::cloned();
/// }
///
/// let descriptor = descriptor_of::<Label>();
///
/// assert!(descriptor.is_copy_constructible());
/// assert!(descriptor.is_move_constructible());
/// assert!(!descriptor.is_trivially_relocatable());
/// assert_eq!(descriptor.size(), size_of::<Label>());
/// ```
#[must_use]
#[inline]
pub fn descriptor_of<T: Element>() -> &'static TypeDescriptor {
    Registry::<T>::DESCRIPTOR
}

/// Relocates the value at `src` into the empty memory at `dst`, leaving `src` empty.
///
/// Moves the value if its type can be moved, otherwise copies it and drops the original.
/// Trivially relocatable values are copied byte for byte.
///
/// # Safety
///
/// `src` must point to a live value of the described type and `dst` must point to memory that
/// is valid for writes of that type and does not overlap `src`.
///
/// On success, the value at `src` must be treated as uninitialized. On failure, nothing has
/// been touched.
pub(crate) unsafe fn transfer(
    descriptor: &TypeDescriptor,
    src: NonNull<()>,
    dst: NonNull<()>,
) -> Result<()> {
    if descriptor.trivially_relocatable {
        // SAFETY: Forwarding safety requirements to the caller. The byte copy is a valid
        // move for trivially relocatable types.
        unsafe {
            ptr::copy_nonoverlapping(
                src.cast::<u8>().as_ptr(),
                dst.cast::<u8>().as_ptr(),
                descriptor.size(),
            );
        }

        return Ok(());
    }

    if let Some(relocate) = descriptor.relocate {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { relocate(src, dst) };
        return Ok(());
    }

    if let Some(duplicate) = descriptor.duplicate {
        trace!(
            type_name = descriptor.type_name(),
            "element is not movable, transferring by copy"
        );

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { duplicate(src, dst) };

        // The copy is in place, so the original is released as part of the same transfer.
        // SAFETY: Forwarding safety requirements to the caller. The value at `src` is live
        // and is not used again.
        unsafe { descriptor.destroy(src) };

        return Ok(());
    }

    Err(Error::TransferNotSupported {
        type_name: descriptor.type_name(),
    })
}

/// Copy-constructs the value at `src` into the empty memory at `dst`.
///
/// # Safety
///
/// `src` must point to a live value of the described type and `dst` must point to memory that
/// is valid for writes of that type and does not overlap `src`.
pub(crate) unsafe fn duplicate(
    descriptor: &TypeDescriptor,
    src: NonNull<()>,
    dst: NonNull<()>,
) -> Result<()> {
    if descriptor.trivially_relocatable {
        // SAFETY: Forwarding safety requirements to the caller. The byte copy is a valid
        // duplicate for trivially relocatable types.
        unsafe {
            ptr::copy_nonoverlapping(
                src.cast::<u8>().as_ptr(),
                dst.cast::<u8>().as_ptr(),
                descriptor.size(),
            );
        }

        return Ok(());
    }

    let Some(duplicate) = descriptor.duplicate else {
        return Err(Error::CopyNotSupported {
            type_name: descriptor.type_name(),
        });
    };

    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { duplicate(src, dst) };

    Ok(())
}

/// Copy-assigns the value at `src` onto the live value at `dst`, if the type supports it.
///
/// Returns `false` without touching anything if the type has no copy-assign operation.
///
/// # Safety
///
/// Both `src` and `dst` must point to live values of the described type and must not overlap.
pub(crate) unsafe fn duplicate_assign(
    descriptor: &TypeDescriptor,
    src: NonNull<()>,
    dst: NonNull<()>,
) -> bool {
    let Some(assign) = descriptor.duplicate_assign else {
        return false;
    };

    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { assign(src, dst) };

    true
}

unsafe fn drop_fn<T>(target: NonNull<()>) {
    // SAFETY: TypeDescriptor::destroy() callers ensure safety requirements are met.
    unsafe {
        ptr::drop_in_place(target.cast::<T>().as_ptr());
    }
}

unsafe fn relocate_fn<T>(src: NonNull<()>, dst: NonNull<()>) {
    // SAFETY: transfer() callers ensure safety requirements are met.
    unsafe {
        ptr::copy_nonoverlapping(src.cast::<T>().as_ptr(), dst.cast::<T>().as_ptr(), 1);
    }
}

unsafe fn clone_fn<T: Clone>(src: NonNull<()>, dst: NonNull<()>) {
    // SAFETY: duplicate() callers ensure src points to a live T.
    let source = unsafe { src.cast::<T>().as_ref() };
    let copy = source.clone();

    // SAFETY: duplicate() callers ensure dst is valid for writes of T.
    unsafe {
        dst.cast::<T>().write(copy);
    }
}

unsafe fn clone_from_fn<T: Clone>(src: NonNull<()>, dst: NonNull<()>) {
    // SAFETY: duplicate_assign() callers ensure src points to a live T.
    let source = unsafe { src.cast::<T>().as_ref() };

    // SAFETY: duplicate_assign() callers ensure dst points to a live T that does not overlap
    // src and that nothing else references it for the duration of the call.
    let target = unsafe { dst.cast::<T>().as_mut() };

    target.clone_from(source);
}

unsafe fn copy_fn<T: Copy>(src: NonNull<()>, dst: NonNull<()>) {
    // SAFETY: The callers ensure src points to a live T and dst is valid for writes of T.
    unsafe {
        ptr::copy_nonoverlapping(src.cast::<T>().as_ptr(), dst.cast::<T>().as_ptr(), 1);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::cell::Cell;
    use std::mem::MaybeUninit;
    use std::rc::Rc;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(TypeDescriptor: Send, Sync, fmt::Debug);

    /// Test helper that counts how many times it has been dropped and cloned.
    #[derive(Debug)]
    struct Tracked {
        drops: Rc<Cell<usize>>,
        clones: Rc<Cell<usize>>,
        value: u32,
    }

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            self.clones.set(self.clones.get() + 1);

            Self {
                drops: Rc::clone(&self.drops),
                clones: Rc::clone(&self.clones),
                value: self.value,
            }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl Element for Tracked {
        const DUPLICATE: Duplicate<Self> = Duplicate::cloned();
    }

    /// Copyable but pinned to its slot.
    struct Anchored(Tracked);

    impl Clone for Anchored {
        fn clone(&self) -> Self {
            Self(self.0.clone())
        }
    }

    impl Element for Anchored {
        const DUPLICATE: Duplicate<Self> = Duplicate::cloned();
        const MOVABLE: bool = false;
    }

    struct MoveOnly(String);

    impl Element for MoveOnly {}

    struct Immovable;

    impl Element for Immovable {
        const MOVABLE: bool = false;
    }

    #[derive(Clone, Copy)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl Element for Point {
        const DUPLICATE: Duplicate<Self> = Duplicate::bitwise();
    }

    fn tracked(value: u32) -> (Tracked, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let drops = Rc::new(Cell::new(0));
        let clones = Rc::new(Cell::new(0));

        (
            Tracked {
                drops: Rc::clone(&drops),
                clones: Rc::clone(&clones),
                value,
            },
            drops,
            clones,
        )
    }

    fn erase<T>(value: &mut MaybeUninit<T>) -> NonNull<()> {
        NonNull::from(value).cast()
    }

    #[test]
    fn capability_flags_follow_declarations() {
        let cloned = descriptor_of::<Tracked>();
        assert!(cloned.is_copy_constructible());
        assert!(cloned.is_move_constructible());
        assert!(!cloned.is_trivially_relocatable());

        let move_only = descriptor_of::<MoveOnly>();
        assert!(!move_only.is_copy_constructible());
        assert!(move_only.is_move_constructible());

        let immovable = descriptor_of::<Immovable>();
        assert!(!immovable.is_copy_constructible());
        assert!(!immovable.is_move_constructible());

        let bitwise = descriptor_of::<Point>();
        assert!(bitwise.is_copy_constructible());
        assert!(bitwise.is_trivially_relocatable());
    }

    #[test]
    fn layout_matches_type() {
        let descriptor = descriptor_of::<Point>();

        assert_eq!(descriptor.layout(), Layout::new::<Point>());
        assert_eq!(descriptor.size(), 16);
        assert_eq!(descriptor.alignment(), align_of::<i64>());
    }

    #[test]
    fn same_type_is_recognized_by_identity() {
        assert!(descriptor_of::<Point>().is_same_type(descriptor_of::<Point>()));
        assert!(!descriptor_of::<Point>().is_same_type(descriptor_of::<MoveOnly>()));
    }

    #[test]
    fn type_name_is_reported() {
        assert!(descriptor_of::<MoveOnly>().type_name().ends_with("MoveOnly"));
    }

    #[test]
    fn destroy_runs_destructor_once() {
        let (value, drops, _) = tracked(1);
        let mut slot = MaybeUninit::new(value);

        unsafe { descriptor_of::<Tracked>().destroy(erase(&mut slot)) };

        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn transfer_moves_without_cloning() {
        let (value, drops, clones) = tracked(42);
        let mut src = MaybeUninit::new(value);
        let mut dst = MaybeUninit::<Tracked>::uninit();

        unsafe { transfer(descriptor_of::<Tracked>(), erase(&mut src), erase(&mut dst)) }
            .unwrap();

        assert_eq!(clones.get(), 0);
        assert_eq!(drops.get(), 0);

        let moved = unsafe { dst.assume_init() };
        assert_eq!(moved.value, 42);
    }

    #[test]
    fn transfer_falls_back_to_copy_and_releases_source() {
        let (value, drops, clones) = tracked(7);
        let mut src = MaybeUninit::new(Anchored(value));
        let mut dst = MaybeUninit::<Anchored>::uninit();

        unsafe { transfer(descriptor_of::<Anchored>(), erase(&mut src), erase(&mut dst)) }
            .unwrap();

        assert_eq!(clones.get(), 1);
        assert_eq!(drops.get(), 1);

        let copied = unsafe { dst.assume_init() };
        assert_eq!(copied.0.value, 7);
    }

    #[test]
    fn transfer_of_immovable_uncopyable_fails() {
        let mut src = MaybeUninit::new(Immovable);
        let mut dst = MaybeUninit::<Immovable>::uninit();

        let result =
            unsafe { transfer(descriptor_of::<Immovable>(), erase(&mut src), erase(&mut dst)) };

        assert!(matches!(result, Err(Error::TransferNotSupported { .. })));
    }

    #[test]
    fn transfer_of_bitwise_type_copies_bytes() {
        let mut src = MaybeUninit::new(Point { x: 3, y: -4 });
        let mut dst = MaybeUninit::<Point>::uninit();

        unsafe { transfer(descriptor_of::<Point>(), erase(&mut src), erase(&mut dst)) }.unwrap();

        let moved = unsafe { dst.assume_init() };
        assert_eq!((moved.x, moved.y), (3, -4));
    }

    #[test]
    fn duplicate_clones_and_keeps_source() {
        let (value, drops, clones) = tracked(9);
        let mut src = MaybeUninit::new(value);
        let mut dst = MaybeUninit::<Tracked>::uninit();

        unsafe { duplicate(descriptor_of::<Tracked>(), erase(&mut src), erase(&mut dst)) }
            .unwrap();

        assert_eq!(clones.get(), 1);
        assert_eq!(drops.get(), 0);

        let (original, copy) = unsafe { (src.assume_init(), dst.assume_init()) };
        assert_eq!(original.value, copy.value);
    }

    #[test]
    fn duplicate_of_move_only_fails() {
        let mut src = MaybeUninit::new(MoveOnly("x".to_string()));
        let mut dst = MaybeUninit::<MoveOnly>::uninit();

        let result =
            unsafe { duplicate(descriptor_of::<MoveOnly>(), erase(&mut src), erase(&mut dst)) };

        assert!(matches!(result, Err(Error::CopyNotSupported { .. })));

        let untouched = unsafe { src.assume_init() };
        assert_eq!(untouched.0, "x");
    }

    #[test]
    fn duplicate_assign_uses_clone_from() {
        let (first, _, _) = tracked(1);
        let (second, second_drops, _) = tracked(2);
        let mut src = MaybeUninit::new(first);
        let mut dst = MaybeUninit::new(second);

        let assigned = unsafe {
            duplicate_assign(descriptor_of::<Tracked>(), erase(&mut src), erase(&mut dst))
        };

        assert!(assigned);

        // The default clone_from() drops the previous target value.
        assert_eq!(second_drops.get(), 1);

        let (original, target) = unsafe { (src.assume_init(), dst.assume_init()) };
        assert_eq!(original.value, 1);
        assert_eq!(target.value, 1);
    }

    #[test]
    fn duplicate_assign_without_support_does_nothing() {
        let mut src = MaybeUninit::new(MoveOnly("a".to_string()));
        let mut dst = MaybeUninit::new(MoveOnly("b".to_string()));

        let assigned = unsafe {
            duplicate_assign(descriptor_of::<MoveOnly>(), erase(&mut src), erase(&mut dst))
        };

        assert!(!assigned);

        let (source, target) = unsafe { (src.assume_init(), dst.assume_init()) };
        assert_eq!(source.0, "a");
        assert_eq!(target.0, "b");
    }
}
