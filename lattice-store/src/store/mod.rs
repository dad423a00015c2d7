//! Value Store
//!
//! This module resolves, for one object, the effective value of each of its
//! properties from many competing sources.
//!
//! # Concepts
//!
//! ## Entries
//!
//! An [`Entry`] is what one source says about one property: a fixed value,
//! or a binding to a reactive source.
//!
//! ## Frames
//!
//! A [`Frame`] groups entries under one [`Priority`] and, optionally, one
//! [`Activator`](crate::Activator). Local assignments, animations and applied
//! style rules are all frames.
//!
//! ## Resolution
//!
//! The [`ValueStore`] orders its frames by priority and picks, per property,
//! the first active frame whose entry has a value. Every change to the
//! effective value is reported to the object's [`PropertyOwner`].
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use lattice_store::{
//!     Activator, Entry, Frame, Priority, Property, PropertyChange, PropertyMetadata,
//!     PropertyOwner, ValueStore,
//! };
//!
//! struct Control;
//!
//! impl PropertyOwner for Control {
//!     fn property_changed(&self, _change: &PropertyChange) {}
//! }
//!
//! let background = Property::register("Background", PropertyMetadata::new("white".to_string()));
//! let control = Rc::new(Control);
//! let store = ValueStore::new(&control);
//!
//! // A style rule that only applies while the pointer is over the control.
//! let pointer_over = Activator::new(false);
//! let hover = Frame::activated(Priority::new(20), pointer_over.clone()).unwrap();
//! hover.add(Entry::value(&background, "blue".to_string())).unwrap();
//! store.insert_frame(&hover).unwrap();
//!
//! assert_eq!(store.get_value(&background).unwrap(), "white");
//! pointer_over.set_active(true);
//! assert_eq!(store.get_value(&background).unwrap(), "blue");
//! ```

mod config;
mod entry;
mod frame;
mod owner;
mod priority;
mod value_store;

pub use config::{StoreConfig, StoreConfigBuilder, TieBreak};
pub use entry::{BindingLifecycle, Entry};
pub use frame::{Frame, FrameId};
pub use owner::{PropertyChange, PropertyOwner};
pub use priority::Priority;
pub use value_store::{FrameDiagnostic, LazyValueStore, ValueStore};
