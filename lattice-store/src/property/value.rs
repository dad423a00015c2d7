//! Type-erased property values.
//!
//! Frames hold entries for many properties of different types, so values
//! travel through the store as [`ErasedValue`]. The wrapper keeps enough of
//! the concrete type around to compare two values for equality, which the
//! store needs to suppress notifications for unchanged values.

use std::any::{Any, TypeId};
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Bound for every type that can be stored in a property.
pub trait PropertyValue: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T> PropertyValue for T where T: Clone + PartialEq + Debug + Send + Sync + 'static {}

/// A cheaply clonable, type-erased property value.
///
/// # Example
///
/// ```rust
/// use lattice_store::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert_eq!(value, ErasedValue::new(42_i32));
/// assert_ne!(value, ErasedValue::new(42_i64));
/// ```
#[derive(Clone)]
pub struct ErasedValue {
    inner: Arc<dyn DynValue>,
}

impl ErasedValue {
    /// Erase a concrete value.
    pub fn new<T: PropertyValue>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// The [`TypeId`] of the contained value.
    pub fn value_type(&self) -> TypeId {
        self.inner.as_any().type_id()
    }

    /// Returns `true` if the contained value is a `T`.
    pub fn is<T: PropertyValue>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    /// Borrow the contained value as a `T`.
    pub fn downcast_ref<T: PropertyValue>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref()
    }

    /// Clone the contained value out as a `T`.
    pub fn downcast<T: PropertyValue>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl PartialEq for ErasedValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.dyn_eq(other.inner.as_any())
    }
}

impl Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.dyn_fmt(f)
    }
}

/// Object-safe view of a [`PropertyValue`].
trait DynValue: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn Any) -> bool;
    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: PropertyValue> DynValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}
