use std::ptr::NonNull;

/// Converts a pointer to a concrete element into a pointer to the base type `B` that the
/// container exposes, typically a trait object.
///
/// This is almost always implemented via the [`element!`][crate::element] macro, which relies
/// on the compiler's unsizing coercion.
///
/// # Safety
///
/// The returned pointer must address the same object as the input pointer and its metadata
/// (e.g. vtable) must describe `Self`. `Self` must satisfy every auto trait bound that `B`
/// carries (e.g. if `B` is `dyn Shape + Send`, then `Self` must be `Send`).
///
/// # Examples
///
/// ```
/// use std::ptr::NonNull;
///
/// use dyn_slots::{Element, Upcast};
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// impl Element for Square {}
///
/// // SAFETY: Unsizing coercion preserves the address and attaches the vtable of Square.
/// unsafe impl Upcast<dyn Shape> for Square {
///     fn upcast(ptr: NonNull<Self>) -> NonNull<dyn Shape> {
///         ptr
///     }
/// }
/// ```
pub unsafe trait Upcast<B: ?Sized> {
    /// Converts the pointer. See the trait-level safety requirements.
    fn upcast(ptr: NonNull<Self>) -> NonNull<B>;
}

/// Type-erased form of [`Upcast::upcast`], stored next to every occupant so a base pointer can
/// be recreated for any slot address the occupant is moved or copied to.
pub(crate) type UpcastFn<B> = fn(NonNull<()>) -> NonNull<B>;

pub(crate) fn upcast_erased<T: Upcast<B>, B: ?Sized>(ptr: NonNull<()>) -> NonNull<B> {
    T::upcast(ptr.cast::<T>())
}

/// Declares a type as storable in [`SlotArray<B>`][crate::SlotArray] and
/// [`SlotVec<B>`][crate::SlotVec], implementing both [`Element`][crate::Element] and
/// [`Upcast<B>`][crate::Upcast].
///
/// The type is followed by `=>` and the base type, then by an optional list of capabilities:
///
/// * `clone` - whole containers holding this type can be copied using [`Clone`].
/// * `copy` - as `clone`, but the type is [`Copy`] and can be duplicated and relocated as raw
///   bytes.
/// * `immovable` - the value must never be relocated to another slot once constructed.
///
/// Without capabilities the type can be moved between slots but not copied.
///
/// # Examples
///
/// ```
/// use dyn_slots::element;
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
///
/// #[derive(Clone, Copy)]
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// #[derive(Clone)]
/// struct Polygon(Vec<(f64, f64)>);
///
/// impl Shape for Polygon {
///     fn area(&self) -> f64 {
///         0.0
///     }
/// }
///
/// element!(Square => dyn Shape, copy);
/// element!(Polygon => dyn Shape, clone);
/// ```
#[macro_export]
macro_rules! element {
    ($t:ty => $base:ty $(, $capability:ident)* $(,)?) => {
        impl $crate::Element for $t {
            $($crate::__element_capability!($capability);)*
        }

        // SAFETY: Unsizing coercion preserves the address and attaches metadata for the
        // concrete type. The compiler rejects the coercion if auto trait bounds of the base
        // type are not satisfied.
        unsafe impl $crate::Upcast<$base> for $t {
            #[inline]
            fn upcast(ptr: ::std::ptr::NonNull<Self>) -> ::std::ptr::NonNull<$base> {
                ptr
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __element_capability {
    (clone) => {
        const DUPLICATE: $crate::Duplicate<Self> = $crate::Duplicate::cloned();
    };
    (copy) => {
        const DUPLICATE: $crate::Duplicate<Self> = $crate::Duplicate::bitwise();
    };
    (immovable) => {
        const MOVABLE: bool = false;
    };
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Display;

    use super::*;
    use crate::{Element, descriptor_of};

    trait Named {
        fn name(&self) -> String;
    }

    #[derive(Clone, Copy)]
    struct Plain(u8);

    impl Named for Plain {
        fn name(&self) -> String {
            format!("plain {}", self.0)
        }
    }

    #[derive(Clone)]
    struct Owned(String);

    impl Named for Owned {
        fn name(&self) -> String {
            self.0.clone()
        }
    }

    struct Pinned;

    impl Named for Pinned {
        fn name(&self) -> String {
            "pinned".to_string()
        }
    }

    struct Count(u64);

    impl Display for Count {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    struct PinnedClone;

    impl Clone for PinnedClone {
        fn clone(&self) -> Self {
            Self
        }
    }

    impl Named for PinnedClone {
        fn name(&self) -> String {
            "pinned clone".to_string()
        }
    }

    element!(Plain => dyn Named, copy);
    element!(Owned => dyn Named, clone,);
    element!(Pinned => dyn Named, immovable);
    element!(PinnedClone => dyn Named, clone, immovable);
    element!(Count => dyn Display);

    #[test]
    fn capabilities_are_declared() {
        assert!(descriptor_of::<Plain>().is_trivially_relocatable());
        assert!(descriptor_of::<Owned>().is_copy_constructible());
        assert!(!descriptor_of::<Owned>().is_trivially_relocatable());
        assert!(!descriptor_of::<Pinned>().is_move_constructible());
        assert!(!descriptor_of::<Pinned>().is_copy_constructible());
        assert!(!descriptor_of::<PinnedClone>().is_move_constructible());
        assert!(descriptor_of::<PinnedClone>().is_copy_constructible());
        assert!(descriptor_of::<Count>().is_move_constructible());
        assert!(!descriptor_of::<Count>().is_copy_constructible());

        assert!(Plain::MOVABLE);
        assert!(!Pinned::MOVABLE);
    }

    #[test]
    fn upcast_preserves_address_and_dispatch() {
        let mut value = Owned("hello".to_string());
        let ptr = NonNull::from(&mut value);

        let base = <Owned as Upcast<dyn Named>>::upcast(ptr);

        assert_eq!(base.cast::<()>(), ptr.cast::<()>());

        // SAFETY: The pointer was just created from a live value.
        let name = unsafe { base.as_ref() }.name();
        assert_eq!(name, "hello");
    }

    #[test]
    fn erased_upcast_recreates_base_pointer() {
        let mut value = Count(42);
        let erased = NonNull::from(&mut value).cast::<()>();

        let base = upcast_erased::<Count, dyn Display>(erased);

        // SAFETY: The pointer was just created from a live value.
        let text = unsafe { base.as_ref() }.to_string();
        assert_eq!(text, "42");
    }
}
