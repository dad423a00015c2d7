//! Reactive Plumbing
//!
//! This module holds the push-based contracts the value store is built on:
//! observers and observables, unsubscribe handles, a broadcast [`Subject`],
//! and the boolean [`Activator`] that gates conditional frames.
//!
//! # Concepts
//!
//! ## Sources
//!
//! A source pushes zero or more values and may then terminate. Pushes are
//! synchronous calls on the source's stack; a source may even push from
//! inside `subscribe`. Everything downstream is written to tolerate that.
//!
//! ## Subscriptions
//!
//! Subscribing returns a [`Subscription`]. Disposing it (or dropping it)
//! detaches the observer. Disposal is idempotent.
//!
//! ## Activators
//!
//! An [`Activator`] is a shared boolean source that only pushes transitions.
//! Many frames may subscribe to the same activator.

mod activator;
mod observable;
mod subject;
mod subscriber;
mod subscription;

pub use activator::Activator;
pub use observable::{
    create, BindingValue, ErasedSource, FnObservable, Observable, Observer, SourceError,
    SourceShape,
};
pub(crate) use observable::BindingPush;
pub use subject::Subject;
pub use subscriber::SubscriberId;
pub use subscription::Subscription;
