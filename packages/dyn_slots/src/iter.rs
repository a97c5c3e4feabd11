use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::{any, fmt, slice};

/// Iterator over the slots of a [`SlotArray`][crate::SlotArray] or [`SlotVec`][crate::SlotVec],
/// yielding `None` for empty slots.
///
/// Created by the `iter()` method of either container.
pub struct Iter<'a, B: ?Sized> {
    pointers: slice::Iter<'a, Option<NonNull<B>>>,
}

impl<'a, B: ?Sized> Iter<'a, B> {
    pub(crate) fn new(pointers: &'a [Option<NonNull<B>>]) -> Self {
        Self {
            pointers: pointers.iter(),
        }
    }

    fn deref(pointer: Option<NonNull<B>>) -> Option<&'a B> {
        // SAFETY: The pointers come from the container's pointer cache, which only holds the
        // addresses of live elements. The container is borrowed for 'a, so the elements cannot
        // be mutated or destroyed while the iterator exists.
        pointer.map(|ptr| unsafe { ptr.as_ref() })
    }
}

impl<'a, B: ?Sized> Iterator for Iter<'a, B> {
    type Item = Option<&'a B>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.pointers.next().copied().map(Self::deref)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pointers.size_hint()
    }
}

impl<B: ?Sized> DoubleEndedIterator for Iter<'_, B> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.pointers.next_back().copied().map(Self::deref)
    }
}

impl<B: ?Sized> ExactSizeIterator for Iter<'_, B> {}

impl<B: ?Sized> FusedIterator for Iter<'_, B> {}

impl<B: ?Sized> Clone for Iter<'_, B> {
    fn clone(&self) -> Self {
        Self {
            pointers: self.pointers.clone(),
        }
    }
}

impl<B: ?Sized> fmt::Debug for Iter<'_, B> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(any::type_name::<Self>())
            .field("remaining", &self.pointers.len())
            .finish()
    }
}

/// Mutable iterator over the slots of a [`SlotArray`][crate::SlotArray] or
/// [`SlotVec`][crate::SlotVec], yielding `None` for empty slots.
///
/// Created by the `iter_mut()` method of either container.
pub struct IterMut<'a, B: ?Sized> {
    pointers: slice::Iter<'a, Option<NonNull<B>>>,

    _elements: PhantomData<&'a mut B>,
}

impl<'a, B: ?Sized> IterMut<'a, B> {
    /// # Safety
    ///
    /// The caller must hold exclusive access to the elements behind `pointers` for `'a`.
    pub(crate) unsafe fn new(pointers: &'a [Option<NonNull<B>>]) -> Self {
        Self {
            pointers: pointers.iter(),
            _elements: PhantomData,
        }
    }

    fn deref(pointer: Option<NonNull<B>>) -> Option<&'a mut B> {
        // SAFETY: The creator of the iterator guarantees exclusive access for 'a, and every
        // pointer is yielded at most once because the slice iterator advances past it.
        pointer.map(|mut ptr| unsafe { ptr.as_mut() })
    }
}

impl<'a, B: ?Sized> Iterator for IterMut<'a, B> {
    type Item = Option<&'a mut B>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.pointers.next().copied().map(Self::deref)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pointers.size_hint()
    }
}

impl<B: ?Sized> DoubleEndedIterator for IterMut<'_, B> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.pointers.next_back().copied().map(Self::deref)
    }
}

impl<B: ?Sized> ExactSizeIterator for IterMut<'_, B> {}

impl<B: ?Sized> FusedIterator for IterMut<'_, B> {}

impl<B: ?Sized> fmt::Debug for IterMut<'_, B> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(any::type_name::<Self>())
            .field("remaining", &self.pointers.len())
            .finish()
    }
}
