//! Lattice Store
//!
//! This crate provides the per-object property value store for the Lattice
//! reactive UI framework. It implements:
//!
//! - Property declarations with defaults and validation
//! - Push-based reactive sources, subjects and activators
//! - Prioritized value frames, static and reactive entries
//! - Lazy, reentrancy-safe resolution of effective values
//!
//! Everything here is single-threaded: stores, frames and sources are shared
//! with `Rc` and mutated through `Cell`/`RefCell`. Property declarations are
//! the exception; they are global and `Send + Sync`.
//!
//! # Architecture
//!
//! The crate is organized into three modules:
//!
//! - `property`: Property tokens, metadata and type-erased values
//! - `reactive`: Observers, subscriptions, subjects and activators
//! - `store`: Entries, frames and the value store itself
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use lattice_store::reactive::Subject;
//! use lattice_store::{Priority, Property, PropertyChange, PropertyMetadata, PropertyOwner, ValueStore};
//!
//! #[derive(Default)]
//! struct Label {
//!     log: RefCell<Vec<String>>,
//! }
//!
//! impl PropertyOwner for Label {
//!     fn property_changed(&self, change: &PropertyChange) {
//!         let text: String = change.new_as().unwrap();
//!         self.log.borrow_mut().push(text);
//!     }
//! }
//!
//! let text = Property::register("Text", PropertyMetadata::new(String::new()));
//! let label = Rc::new(Label::default());
//! let store = ValueStore::new(&label);
//!
//! // Bind the text to a source.
//! let source = Subject::<String>::new();
//! store.bind(&text, source.clone(), Priority::new(0)).unwrap();
//!
//! source.next("Hello".to_string());
//! source.next("Hello".to_string()); // equal pushes are ignored
//! source.next("World".to_string());
//!
//! assert_eq!(*label.log.borrow(), vec!["Hello", "World"]);
//! ```

mod error;
pub mod property;
pub mod reactive;
pub mod store;

pub use error::{Result, StoreError};
pub use property::{AnyProperty, ErasedValue, Property, PropertyId, PropertyMetadata, PropertyValue};
pub use reactive::Activator;
pub use store::{
    BindingLifecycle, Entry, Frame, FrameDiagnostic, FrameId, LazyValueStore, Priority,
    PropertyChange, PropertyOwner, StoreConfig, TieBreak, ValueStore,
};
