//! Store Errors
//!
//! Every error in this crate signals a broken contract between the store and
//! one of its collaborators: a value read before the check that guards it, a
//! frame inserted twice, a binding whose source yields the wrong type. None of
//! them describe bad user data. Invalid pushed values are recovered inside the
//! binding entry (the property's default is substituted) and never reach this
//! type.

use std::any::TypeId;

use thiserror::Error;

use crate::store::FrameId;

/// Errors raised by the value store, its frames and entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The value of an entry was read before its source produced one.
    ///
    /// Callers are expected to check `has_value()` first.
    #[error("entry for property '{property}' has no value")]
    EntryHasNoValue { property: &'static str },

    /// An operation that needs an attached store ran on a detached entry.
    #[error("entry for property '{property}' is not attached to a value store")]
    MissingOwner { property: &'static str },

    /// A frame operation needed a store the frame is not attached to.
    #[error("frame {frame} is not attached to this value store")]
    FrameNotAttached { frame: FrameId },

    /// A binding source does not produce values of the property's type.
    #[error("binding source for property '{property}' has unexpected item type {found:?} (expected {expected:?})")]
    UnexpectedSourceShape {
        property: &'static str,
        expected: TypeId,
        found: TypeId,
    },

    /// Direct properties never take part in frame resolution.
    #[error("direct property '{property}' cannot be added to a frame")]
    DirectProperty { property: &'static str },

    /// The frame already holds an entry for the property.
    #[error("frame already has an entry for property '{property}'")]
    DuplicateEntry { property: &'static str },

    /// Single-value frames cannot be mutated in place.
    #[error("frame {frame} holds a single entry and cannot be mutated")]
    ImmutableFrame { frame: FrameId },

    /// The frame is attached to a store already; detach it first.
    #[error("frame {frame} is already attached to a value store")]
    FrameAlreadyAttached { frame: FrameId },

    /// The frame was disposed and cannot be used again.
    #[error("frame {frame} has been disposed")]
    FrameDisposed { frame: FrameId },

    /// A reactive entry can belong to a single frame only.
    #[error("binding entry for property '{property}' already belongs to a frame")]
    EntryAlreadyOwned { property: &'static str },

    /// Frames that share an activator must not carry per-frame binding state.
    #[error("activator is shared between frames, which cannot hold binding entries")]
    SharedActivatorState,

    /// A typed read used a property whose values have a different type.
    #[error("value of property '{property}' is not of the requested type")]
    ValueTypeMismatch { property: &'static str },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_property() {
        let err = StoreError::EntryHasNoValue { property: "Width" };
        assert_eq!(err.to_string(), "entry for property 'Width' has no value");

        let err = StoreError::DirectProperty { property: "Bounds" };
        assert!(err.to_string().contains("Bounds"));
    }

    #[test]
    fn frame_errors_name_the_frame() {
        let err = StoreError::FrameDisposed { frame: FrameId::new() };
        assert!(err.to_string().starts_with("frame #"));
    }
}
