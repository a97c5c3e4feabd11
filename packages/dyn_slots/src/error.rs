use thiserror::Error;

/// Errors returned by operations on [`SlotArray`][crate::SlotArray] and
/// [`SlotVec`][crate::SlotVec].
///
/// Violations of the slot layout (storing a type that is larger or more strictly aligned than
/// the configured slot) are programming errors and panic instead of returning an error.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A checked accessor, insertion position or removal range referred to a position outside
    /// the container.
    #[error("index {index} is out of range for a container of length {len}")]
    IndexOutOfRange {
        /// The offending index (for ranges, the offending bound).
        index: usize,

        /// The length of the container at the time of the call.
        len: usize,
    },

    /// The operation would need more slots than the container was configured with.
    #[error("requested {requested} slots but the container capacity is fixed at {capacity}")]
    CapacityExceeded {
        /// The fixed capacity of the container.
        capacity: usize,

        /// The number of slots the operation would have needed.
        requested: usize,
    },

    /// A whole-container copy was attempted while the container holds an element that cannot
    /// be duplicated.
    #[error("cannot copy the container: element of type {type_name} is not copyable")]
    CopyNotSupported {
        /// Name of the first element type found to be not copyable.
        type_name: &'static str,
    },

    /// An element would need to change slots but can be neither moved nor copied.
    #[error("element of type {type_name} can be neither moved nor copied to another slot")]
    TransferNotSupported {
        /// Name of the element type that blocked the operation.
        type_name: &'static str,
    },
}

/// Error returned by the fallible in-place construction methods, such as
/// [`SlotVec::try_push_with()`][crate::SlotVec::try_push_with].
///
/// Either the container refused the operation before the element was constructed, or the
/// element's own constructor failed, in which case its error is returned verbatim.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum EmplaceError<E> {
    /// The container rejected the operation.
    #[error(transparent)]
    Container(#[from] Error),

    /// The element constructor returned an error.
    #[error("element construction failed: {0}")]
    ElementConstructionFailed(E),
}

/// A specialized `Result` type for container operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Copy, std::error::Error);
    assert_impl_all!(EmplaceError<std::io::Error>: Send, Sync, std::error::Error);

    #[test]
    fn index_out_of_range_message_names_index_and_len() {
        let error = Error::IndexOutOfRange { index: 7, len: 4 };

        let message = error.to_string();
        assert!(message.contains('7'));
        assert!(message.contains('4'));
    }

    #[test]
    fn transfer_not_supported_names_type() {
        let error = Error::TransferNotSupported {
            type_name: "my_crate::Anchor",
        };

        assert!(error.to_string().contains("my_crate::Anchor"));
    }

    #[test]
    fn container_error_converts_into_emplace_error() {
        let error = Error::CapacityExceeded {
            capacity: 3,
            requested: 4,
        };

        let emplace_error: EmplaceError<std::fmt::Error> = error.into();

        assert_eq!(emplace_error, EmplaceError::Container(error));
        assert_eq!(emplace_error.to_string(), error.to_string());
    }

    #[test]
    fn element_error_is_passed_through() {
        let emplace_error = EmplaceError::ElementConstructionFailed("out of widgets");

        assert!(emplace_error.to_string().contains("out of widgets"));
        assert!(matches!(
            emplace_error,
            EmplaceError::ElementConstructionFailed("out of widgets")
        ));
    }
}
