//! Property Metadata
//!
//! Metadata is everything the value store needs to know about a property
//! besides its identity: the default value (optionally specialised per owner
//! type), an optional validation predicate, and whether the property is
//! "direct". Direct properties are stored on the object itself and never take
//! part in frame-based resolution.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{self, Debug};

use parking_lot::RwLock;

use super::value::PropertyValue;

/// Predicate deciding whether a raw value pushed by a binding is acceptable.
pub type ValidateCallback<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Metadata for a property holding values of type `T`.
///
/// # Example
///
/// ```rust
/// use lattice_store::PropertyMetadata;
///
/// let metadata = PropertyMetadata::builder(1.0_f64)
///     .validate(|v| *v >= 0.0)
///     .build();
///
/// assert_eq!(metadata.default_value(), 1.0);
/// assert!(metadata.validate(&2.0));
/// assert!(!metadata.validate(&-1.0));
/// ```
pub struct PropertyMetadata<T: PropertyValue> {
    default_value: T,
    /// Defaults specialised for particular owner types.
    ///
    /// Properties are usually declared once and shared by every object, so
    /// overrides registered later have to be visible from any thread.
    overrides: RwLock<HashMap<TypeId, T>>,
    validate: Option<ValidateCallback<T>>,
    direct: bool,
}

impl<T: PropertyValue> PropertyMetadata<T> {
    /// Metadata with the given default and no validation.
    pub fn new(default_value: T) -> Self {
        Self::builder(default_value).build()
    }

    /// Start building metadata with the given default.
    pub fn builder(default_value: T) -> PropertyMetadataBuilder<T> {
        PropertyMetadataBuilder::new(default_value)
    }

    /// The default used when no owner-specific override exists.
    pub fn default_value(&self) -> T {
        self.default_value.clone()
    }

    /// The default for an owner of the given type.
    pub fn default_for(&self, owner_type: TypeId) -> T {
        self.overrides
            .read()
            .get(&owner_type)
            .cloned()
            .unwrap_or_else(|| self.default_value.clone())
    }

    /// Register a default for owners of type `owner_type`.
    ///
    /// Returns the previous override, if any.
    pub fn override_default(&self, owner_type: TypeId, value: T) -> Option<T> {
        self.overrides.write().insert(owner_type, value)
    }

    /// Run the validation predicate. Properties without one accept every value.
    pub fn validate(&self, value: &T) -> bool {
        self.validate.as_ref().map_or(true, |validate| validate(value))
    }

    /// Whether a validation predicate is set.
    pub fn has_validator(&self) -> bool {
        self.validate.is_some()
    }

    /// Whether the property bypasses frame resolution.
    pub fn is_direct(&self) -> bool {
        self.direct
    }
}

impl<T: PropertyValue> Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value)
            .field("override_count", &self.overrides.read().len())
            .field("has_validator", &self.validate.is_some())
            .field("direct", &self.direct)
            .finish()
    }
}

/// Builder for [`PropertyMetadata`].
pub struct PropertyMetadataBuilder<T: PropertyValue> {
    default_value: T,
    validate: Option<ValidateCallback<T>>,
    direct: bool,
}

impl<T: PropertyValue> PropertyMetadataBuilder<T> {
    /// Create a builder with the given default value.
    pub fn new(default_value: T) -> Self {
        Self {
            default_value,
            validate: None,
            direct: false,
        }
    }

    /// Set the validation predicate for values pushed by bindings.
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Box::new(validate));
        self
    }

    /// Mark the property as direct.
    pub fn direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Finish building.
    pub fn build(self) -> PropertyMetadata<T> {
        PropertyMetadata {
            default_value: self.default_value,
            overrides: RwLock::new(HashMap::new()),
            validate: self.validate,
            direct: self.direct,
        }
    }
}

impl<T: PropertyValue> Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("default_value", &self.default_value)
            .field("has_validator", &self.validate.is_some())
            .field("direct", &self.direct)
            .finish()
    }
}
