//! Push-based sources.
//!
//! The store never polls. Bindings and activators are fed by sources that
//! push zero or more values and may then terminate, gracefully or with an
//! error. The engine treats both kinds of termination the same way.
//!
//! Two push shapes are understood by binding entries:
//!
//! - plain values (`Observable<T>`)
//! - [`BindingValue<T>`], which can also say "I have no value right now"
//!
//! Inside a frame, sources are held as an [`ErasedSource`] tagged with its item
//! type. The tag is checked against the property when the binding subscribes.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use thiserror::Error;

use super::subscription::Subscription;
use crate::property::{ErasedValue, PropertyValue};

/// Error reported by a source when it terminates abnormally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("source failed: {message}")]
pub struct SourceError {
    message: String,
}

impl SourceError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Receiver of pushes from an [`Observable`].
pub trait Observer<T> {
    /// A new value was produced.
    fn on_next(&self, value: T);

    /// The source ended gracefully. No further calls follow.
    fn on_completed(&self);

    /// The source ended with an error. No further calls follow.
    ///
    /// Defaults to treating the error as completion.
    fn on_error(&self, error: SourceError) {
        let _ = error;
        self.on_completed();
    }
}

/// A push-based source of `T` values.
pub trait Observable<T> {
    /// Register an observer. Sources may push synchronously from inside this
    /// call.
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Subscription;
}

impl<T, O> Observable<T> for Rc<O>
where
    O: Observable<T> + ?Sized,
{
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Subscription {
        (**self).subscribe(observer)
    }
}

/// An [`Observable`] built from a subscribe function.
pub struct FnObservable<T, F> {
    subscribe: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> Observable<T> for FnObservable<T, F>
where
    F: Fn(Rc<dyn Observer<T>>) -> Subscription,
{
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Subscription {
        (self.subscribe)(observer)
    }
}

impl<T, F> fmt::Debug for FnObservable<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObservable").finish_non_exhaustive()
    }
}

/// Build an observable from a subscribe function.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use lattice_store::reactive::{self, Observable, Observer, Subscription};
///
/// // Emits once, synchronously, then completes.
/// let source = reactive::create(|observer: Rc<dyn Observer<i32>>| {
///     observer.on_next(7);
///     observer.on_completed();
///     Subscription::empty()
/// });
/// # let _ = source;
/// ```
pub fn create<T, F>(subscribe: F) -> FnObservable<T, F>
where
    F: Fn(Rc<dyn Observer<T>>) -> Subscription,
{
    FnObservable {
        subscribe,
        _marker: PhantomData,
    }
}

/// A push that either carries a value or withdraws the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingValue<T> {
    /// The source produced a value.
    Value(T),
    /// The source has no value; the entry falls back to "no value".
    Unset,
}

impl<T> BindingValue<T> {
    /// Whether this push carries a value.
    pub fn has_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl<T> From<Option<T>> for BindingValue<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unset, Self::Value)
    }
}

/// What a source is declared to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// Plain values.
    Values,
    /// [`BindingValue`] pushes.
    BindingValues,
}

/// A push after type erasure.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindingPush {
    Value(ErasedValue),
    Unset,
}

type ErasedSubscribe = Box<dyn Fn(Rc<dyn Observer<BindingPush>>) -> Subscription>;

/// A binding source with its item type erased.
pub struct ErasedSource {
    item_type: TypeId,
    shape: SourceShape,
    subscribe: ErasedSubscribe,
}

impl ErasedSource {
    /// Erase a source of plain values.
    pub fn values<T, S>(source: S) -> Self
    where
        T: PropertyValue,
        S: Observable<T> + 'static,
    {
        Self {
            item_type: TypeId::of::<T>(),
            shape: SourceShape::Values,
            subscribe: Box::new(move |downstream| {
                source.subscribe(Rc::new(ValueAdapter::<T> {
                    downstream,
                    _marker: PhantomData,
                }))
            }),
        }
    }

    /// Erase a source of [`BindingValue`] pushes.
    pub fn binding_values<T, S>(source: S) -> Self
    where
        T: PropertyValue,
        S: Observable<BindingValue<T>> + 'static,
    {
        Self {
            item_type: TypeId::of::<T>(),
            shape: SourceShape::BindingValues,
            subscribe: Box::new(move |downstream| {
                source.subscribe(Rc::new(BindingValueAdapter::<T> {
                    downstream,
                    _marker: PhantomData,
                }))
            }),
        }
    }

    /// The [`TypeId`] of the values the source produces.
    pub fn item_type(&self) -> TypeId {
        self.item_type
    }

    /// The declared push shape.
    pub fn shape(&self) -> SourceShape {
        self.shape
    }

    pub(crate) fn subscribe(&self, observer: Rc<dyn Observer<BindingPush>>) -> Subscription {
        (self.subscribe)(observer)
    }
}

impl fmt::Debug for ErasedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedSource")
            .field("item_type", &self.item_type)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

struct ValueAdapter<T> {
    downstream: Rc<dyn Observer<BindingPush>>,
    _marker: PhantomData<fn(T)>,
}

impl<T: PropertyValue> Observer<T> for ValueAdapter<T> {
    fn on_next(&self, value: T) {
        self.downstream
            .on_next(BindingPush::Value(ErasedValue::new(value)));
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }

    fn on_error(&self, error: SourceError) {
        self.downstream.on_error(error);
    }
}

struct BindingValueAdapter<T> {
    downstream: Rc<dyn Observer<BindingPush>>,
    _marker: PhantomData<fn(T)>,
}

impl<T: PropertyValue> Observer<BindingValue<T>> for BindingValueAdapter<T> {
    fn on_next(&self, value: BindingValue<T>) {
        let push = match value {
            BindingValue::Value(value) => BindingPush::Value(ErasedValue::new(value)),
            BindingValue::Unset => BindingPush::Unset,
        };
        self.downstream.on_next(push);
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }

    fn on_error(&self, error: SourceError) {
        self.downstream.on_error(error);
    }
}
