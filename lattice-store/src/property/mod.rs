//! Property Declarations
//!
//! Properties are declared once, usually at startup, and shared by every
//! object that exposes them. A declaration carries the property's identity,
//! its default value and an optional validation predicate. The value store
//! consumes these tokens; it never creates them.

mod id;
mod metadata;
mod value;

pub use id::{AnyProperty, Property, PropertyId};
pub use metadata::{PropertyMetadata, PropertyMetadataBuilder, ValidateCallback};
pub use value::{ErasedValue, PropertyValue};
