//! The owning object's side of the contract.
//!
//! Every effective-value change computed by a [`ValueStore`](crate::ValueStore)
//! ends up at its [`PropertyOwner`].

use crate::property::{AnyProperty, ErasedValue, PropertyValue};

use super::priority::Priority;

/// An object whose properties are resolved by a value store.
pub trait PropertyOwner {
    /// The effective value of a property changed.
    fn property_changed(&self, change: &PropertyChange);

    /// A different frame now supplies an equal value.
    ///
    /// Only called when enabled in the store's configuration.
    fn effective_source_changed(&self, change: &PropertyChange) {
        let _ = change;
    }
}

/// Describes a transition of a property's effective value.
///
/// A priority of `None` means the value was (or is) the property's default.
#[derive(Debug, Clone)]
pub struct PropertyChange {
    property: AnyProperty,
    old_value: ErasedValue,
    new_value: ErasedValue,
    old_priority: Option<Priority>,
    new_priority: Option<Priority>,
}

impl PropertyChange {
    pub(crate) fn new(
        property: AnyProperty,
        old: (ErasedValue, Option<Priority>),
        new: (ErasedValue, Option<Priority>),
    ) -> Self {
        Self {
            property,
            old_value: old.0,
            new_value: new.0,
            old_priority: old.1,
            new_priority: new.1,
        }
    }

    /// The property that changed.
    pub fn property(&self) -> &AnyProperty {
        &self.property
    }

    /// The effective value before the change.
    pub fn old_value(&self) -> &ErasedValue {
        &self.old_value
    }

    /// The effective value after the change.
    pub fn new_value(&self) -> &ErasedValue {
        &self.new_value
    }

    /// The old value as a `T`.
    pub fn old_as<T: PropertyValue>(&self) -> Option<T> {
        self.old_value.downcast()
    }

    /// The new value as a `T`.
    pub fn new_as<T: PropertyValue>(&self) -> Option<T> {
        self.new_value.downcast()
    }

    /// Priority of the frame that supplied the old value.
    pub fn old_priority(&self) -> Option<Priority> {
        self.old_priority
    }

    /// Priority of the frame that supplies the new value.
    pub fn new_priority(&self) -> Option<Priority> {
        self.new_priority
    }

    /// Whether the value itself changed, as opposed to only its source.
    pub fn value_changed(&self) -> bool {
        self.old_value != self.new_value
    }
}
