//! Property identity.
//!
//! A property is declared once and shared by every object that uses it. The
//! declaration is an immutable token: a globally unique [`PropertyId`], a
//! name for diagnostics, and the property's [`PropertyMetadata`].
//!
//! [`Property<T>`] is the typed token used by callers. Frames hold entries for
//! properties of many types, so inside the store the token travels as an
//! [`AnyProperty`].

use std::any::TypeId;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::metadata::PropertyMetadata;
use super::value::{ErasedValue, PropertyValue};

/// Counter for generating unique property IDs.
static PROPERTY_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Globally unique identifier of a declared property.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u32);

impl PropertyId {
    fn next() -> Self {
        Self(PROPERTY_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw index of this ID.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({})", self.0)
    }
}

struct PropertyInner<T: PropertyValue> {
    id: PropertyId,
    name: &'static str,
    metadata: PropertyMetadata<T>,
}

/// A typed property token.
///
/// Cloning is cheap; every clone refers to the same declaration.
///
/// # Example
///
/// ```rust
/// use lattice_store::{Property, PropertyMetadata};
///
/// let width = Property::register("Width", PropertyMetadata::new(0.0_f64));
/// assert_eq!(width.name(), "Width");
/// assert_eq!(width.default_value(), 0.0);
/// assert_eq!(width.clone(), width);
/// ```
pub struct Property<T: PropertyValue> {
    inner: Arc<PropertyInner<T>>,
}

impl<T: PropertyValue> Property<T> {
    /// Declare a new property.
    pub fn register(name: &'static str, metadata: PropertyMetadata<T>) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                id: PropertyId::next(),
                name,
                metadata,
            }),
        }
    }

    /// The property's unique ID.
    pub fn id(&self) -> PropertyId {
        self.inner.id
    }

    /// The name given at registration.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The property's metadata.
    pub fn metadata(&self) -> &PropertyMetadata<T> {
        &self.inner.metadata
    }

    /// Whether the property bypasses frame resolution.
    pub fn is_direct(&self) -> bool {
        self.inner.metadata.is_direct()
    }

    /// The default value for owners without an override.
    pub fn default_value(&self) -> T {
        self.inner.metadata.default_value()
    }

    /// The default value for an owner of the given type.
    pub fn default_for(&self, owner_type: TypeId) -> T {
        self.inner.metadata.default_for(owner_type)
    }

    /// Specialise the default value for owners of type `O`.
    pub fn override_default<O: 'static>(&self, value: T) -> Option<T> {
        self.inner
            .metadata
            .override_default(TypeId::of::<O>(), value)
    }

    /// Run the property's validation predicate.
    pub fn validate(&self, value: &T) -> bool {
        self.inner.metadata.validate(value)
    }

    /// Erase the value type.
    pub fn erase(&self) -> AnyProperty {
        AnyProperty {
            inner: self.inner.clone(),
        }
    }
}

impl<T: PropertyValue> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PropertyValue> PartialEq for Property<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T: PropertyValue> Eq for Property<T> {}

impl<T: PropertyValue> Hash for Property<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<T: PropertyValue> Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: PropertyValue> From<&Property<T>> for AnyProperty {
    fn from(property: &Property<T>) -> Self {
        property.erase()
    }
}

impl From<&AnyProperty> for AnyProperty {
    fn from(property: &AnyProperty) -> Self {
        property.clone()
    }
}

/// Object-safe view of a property declaration.
trait ErasedProperty: Send + Sync {
    fn id(&self) -> PropertyId;
    fn name(&self) -> &'static str;
    fn is_direct(&self) -> bool;
    fn value_type(&self) -> TypeId;
    fn default_for(&self, owner_type: TypeId) -> ErasedValue;
    fn validate(&self, value: &ErasedValue) -> bool;
}

impl<T: PropertyValue> ErasedProperty for PropertyInner<T> {
    fn id(&self) -> PropertyId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn is_direct(&self) -> bool {
        self.metadata.is_direct()
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn default_for(&self, owner_type: TypeId) -> ErasedValue {
        ErasedValue::new(self.metadata.default_for(owner_type))
    }

    fn validate(&self, value: &ErasedValue) -> bool {
        value
            .downcast_ref::<T>()
            .is_some_and(|value| self.metadata.validate(value))
    }
}

/// A property token with its value type erased.
#[derive(Clone)]
pub struct AnyProperty {
    inner: Arc<dyn ErasedProperty>,
}

impl AnyProperty {
    /// The property's unique ID.
    pub fn id(&self) -> PropertyId {
        self.inner.id()
    }

    /// The name given at registration.
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Whether the property bypasses frame resolution.
    pub fn is_direct(&self) -> bool {
        self.inner.is_direct()
    }

    /// The [`TypeId`] of the property's values.
    pub fn value_type(&self) -> TypeId {
        self.inner.value_type()
    }

    /// The default value for an owner of the given type.
    pub fn default_for(&self, owner_type: TypeId) -> ErasedValue {
        self.inner.default_for(owner_type)
    }

    /// Validate an erased value. Values of the wrong type are rejected.
    pub fn validate(&self, value: &ErasedValue) -> bool {
        self.inner.validate(value)
    }
}

impl PartialEq for AnyProperty {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AnyProperty {}

impl Hash for AnyProperty {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Debug for AnyProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyProperty")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}
