//! Value Frames
//!
//! A frame is a group of entries that share one priority and, optionally,
//! one activation condition. A local assignment is a single-entry frame; a
//! style rule applied to an object is a multi-entry frame gated by the
//! rule's [`Activator`].
//!
//! # Attachment
//!
//! A frame becomes part of a store with
//! [`ValueStore::insert_frame`](crate::ValueStore::insert_frame) and leaves it
//! with [`ValueStore::remove_frame`](crate::ValueStore::remove_frame). A
//! removed frame may be inserted again later; its bindings start over. A
//! disposed frame is finished for good.
//!
//! # Activation
//!
//! A frame without an activator is always active. A gated frame subscribes
//! to its activator the first time the store asks whether it is active and
//! stays inactive until the activator has reported `true`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::entry::{BindingLifecycle, Entry};
use super::priority::Priority;
use super::value_store::StoreInner;
use crate::error::{Result, StoreError};
use crate::property::{AnyProperty, Property, PropertyId, PropertyValue};
use crate::reactive::{Activator, BindingValue, Observable, Observer, Subscription};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    pub(crate) fn new() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum FrameKind {
    Single(Entry),
    Multi(RefCell<IndexMap<PropertyId, Entry>>),
}

enum ActivationState {
    Unsubscribed,
    Subscribing,
    Subscribed { _subscription: Subscription },
}

struct Activation {
    activator: Activator,
    state: RefCell<ActivationState>,
    /// Last state pushed by the activator.
    active: Cell<bool>,
    /// Whether this frame counts as stateful on the activator.
    stateful: Cell<bool>,
}

pub(crate) struct FrameInner {
    id: FrameId,
    priority: Priority,
    kind: FrameKind,
    activation: Option<Activation>,
    store: RefCell<Weak<StoreInner>>,
    disposed: Cell<bool>,
}

impl FrameInner {
    fn on_activation(self: &Rc<Self>, active: bool) {
        let Some(activation) = &self.activation else {
            return;
        };
        let subscribed = match &*activation.state.borrow() {
            ActivationState::Unsubscribed => return,
            ActivationState::Subscribing => false,
            ActivationState::Subscribed { .. } => true,
        };

        let previous = activation.active.replace(active);
        // The initial push arrives while subscribing, from inside the store's
        // own read; the store does not need to hear about it.
        if !subscribed || previous == active {
            return;
        }

        tracing::debug!(frame = %self.id, active, "frame activation changed");
        let frame = Frame::from_inner(self.clone());
        if let Some(store) = frame.store() {
            store.frame_activation_changed(&frame);
        }
    }
}

impl Drop for FrameInner {
    fn drop(&mut self) {
        if self.disposed.get() {
            return;
        }
        if let Some(activation) = &self.activation {
            activation.activator.release_frame(activation.stateful.get());
        }
    }
}

struct ActivationObserver {
    frame: Weak<FrameInner>,
}

impl Observer<bool> for ActivationObserver {
    fn on_next(&self, value: bool) {
        if let Some(frame) = self.frame.upgrade() {
            frame.on_activation(value);
        }
    }

    fn on_completed(&self) {}
}

/// A prioritized group of entries.
///
/// Cloning yields another handle to the same frame.
///
/// # Example
///
/// ```rust
/// use lattice_store::{Entry, Frame, Priority, Property, PropertyMetadata};
///
/// let width = Property::register("Width", PropertyMetadata::new(0.0_f64));
/// let height = Property::register("Height", PropertyMetadata::new(0.0_f64));
///
/// let style = Frame::multi(Priority::new(10));
/// style.add(Entry::value(&width, 100.0)).unwrap();
/// style.add(Entry::value(&height, 40.0)).unwrap();
///
/// assert_eq!(style.entry_count(), 2);
/// assert!(style.try_get(width.id()).is_some());
/// ```
#[derive(Clone)]
pub struct Frame {
    inner: Rc<FrameInner>,
}

impl Frame {
    /// A frame holding exactly one entry.
    pub fn single(entry: Entry, priority: Priority) -> Result<Self> {
        check_participates(&entry)?;
        let frame = Self::build(priority, FrameKind::Single(entry.clone()), None);
        frame.adopt(&entry)?;
        Ok(frame)
    }

    /// A single frame holding a static value.
    pub fn single_value<T: PropertyValue>(
        property: &Property<T>,
        value: T,
        priority: Priority,
    ) -> Result<Self> {
        Self::single(Entry::value(property, value), priority)
    }

    /// A single frame holding a binding to `source`.
    pub fn binding<T, S>(property: &Property<T>, source: S, priority: Priority) -> Result<Self>
    where
        T: PropertyValue,
        S: Observable<T> + 'static,
    {
        Self::single(Entry::bind(property, source), priority)
    }

    /// A single frame holding a binding to a [`BindingValue`] source.
    pub fn binding_values<T, S>(property: &Property<T>, source: S, priority: Priority) -> Result<Self>
    where
        T: PropertyValue,
        S: Observable<BindingValue<T>> + 'static,
    {
        Self::single(Entry::bind_values(property, source), priority)
    }

    /// An empty, always active frame that entries can be added to.
    pub fn multi(priority: Priority) -> Self {
        Self::build(priority, FrameKind::Multi(RefCell::new(IndexMap::new())), None)
    }

    /// An empty frame gated by `activator`.
    ///
    /// Fails if the activator already gates a frame holding bindings.
    pub fn activated(priority: Priority, activator: Activator) -> Result<Self> {
        activator.retain_frame()?;
        let activation = Activation {
            activator,
            state: RefCell::new(ActivationState::Unsubscribed),
            active: Cell::new(false),
            stateful: Cell::new(false),
        };
        Ok(Self::build(
            priority,
            FrameKind::Multi(RefCell::new(IndexMap::new())),
            Some(activation),
        ))
    }

    fn build(priority: Priority, kind: FrameKind, activation: Option<Activation>) -> Self {
        Self {
            inner: Rc::new(FrameInner {
                id: FrameId::new(),
                priority,
                kind,
                activation,
                store: RefCell::new(Weak::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<FrameInner>) -> Self {
        Self { inner }
    }

    /// The frame's identifier.
    pub fn id(&self) -> FrameId {
        self.inner.id
    }

    /// The frame's priority.
    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    /// Whether the frame holds exactly one fixed entry.
    pub fn is_single(&self) -> bool {
        matches!(self.inner.kind, FrameKind::Single(_))
    }

    /// Whether the frame is gated by an activator.
    pub fn has_activator(&self) -> bool {
        self.inner.activation.is_some()
    }

    /// Whether the frame is part of a store.
    pub fn is_attached(&self) -> bool {
        self.inner.store.borrow().strong_count() > 0
    }

    /// Whether the frame has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        match &self.inner.kind {
            FrameKind::Single(_) => 1,
            FrameKind::Multi(entries) => entries.borrow().len(),
        }
    }

    /// The entry at `index`, in insertion order.
    pub fn get_entry(&self, index: usize) -> Option<Entry> {
        match &self.inner.kind {
            FrameKind::Single(entry) => (index == 0).then(|| entry.clone()),
            FrameKind::Multi(entries) => entries
                .borrow()
                .get_index(index)
                .map(|(_, entry)| entry.clone()),
        }
    }

    /// The entry for `property`, if the frame has one.
    ///
    /// Does not start a binding; the store calls this before deciding
    /// whether an entry's value is needed at all.
    pub fn try_get(&self, property: PropertyId) -> Option<Entry> {
        match &self.inner.kind {
            FrameKind::Single(entry) => {
                (entry.property().id() == property).then(|| entry.clone())
            }
            FrameKind::Multi(entries) => entries.borrow().get(&property).cloned(),
        }
    }

    /// Ids of the properties the frame has entries for.
    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.properties().iter().map(AnyProperty::id).collect()
    }

    /// Whether the frame's entries take part in resolution.
    ///
    /// The first call on an attached, gated frame subscribes to the
    /// activator. A detached gated frame reports inactive.
    pub fn is_active(&self) -> bool {
        let Some(activation) = &self.inner.activation else {
            return true;
        };
        if self.inner.disposed.get() {
            return false;
        }

        let unsubscribed = matches!(*activation.state.borrow(), ActivationState::Unsubscribed);
        if unsubscribed && self.is_attached() {
            *activation.state.borrow_mut() = ActivationState::Subscribing;
            let observer = Rc::new(ActivationObserver {
                frame: Rc::downgrade(&self.inner),
            });
            let subscription = activation.activator.subscribe(observer);

            let leftover = {
                let mut state = activation.state.borrow_mut();
                if matches!(*state, ActivationState::Subscribing) {
                    *state = ActivationState::Subscribed {
                        _subscription: subscription,
                    };
                    None
                } else {
                    Some(subscription)
                }
            };
            drop(leftover);
            tracing::trace!(frame = %self.inner.id, active = activation.active.get(), "subscribed to activator");
        }

        activation.active.get()
    }

    /// Add an entry for a property the frame has no entry for yet.
    pub fn add(&self, entry: Entry) -> Result<()> {
        let entries = self.entries_mut()?;
        check_participates(&entry)?;
        if entries.borrow().contains_key(&entry.property().id()) {
            return Err(StoreError::DuplicateEntry {
                property: entry.property().name(),
            });
        }

        self.adopt(&entry)?;
        entries
            .borrow_mut()
            .insert(entry.property().id(), entry.clone());
        self.reevaluate(entry.property())
    }

    /// Add or replace the entry for a property.
    ///
    /// A replaced reactive entry is unsubscribed. Returns the replaced entry.
    pub fn set(&self, entry: Entry) -> Result<Option<Entry>> {
        let entries = self.entries_mut()?;
        check_participates(&entry)?;

        self.adopt(&entry)?;
        let previous = entries
            .borrow_mut()
            .insert(entry.property().id(), entry.clone());
        if let Some(previous) = &previous {
            if !previous.same_binding(&entry) {
                previous.retire();
            }
        }
        self.release_stateful_if_unused();
        self.reevaluate(entry.property())?;
        Ok(previous)
    }

    /// Remove the entry for a property.
    ///
    /// A removed reactive entry is unsubscribed. The frame stays attached
    /// even when this leaves it empty.
    pub fn remove(&self, property: PropertyId) -> Result<Option<Entry>> {
        let entries = self.entries_mut()?;
        let removed = entries.borrow_mut().shift_remove(&property);
        if let Some(entry) = &removed {
            entry.retire();
            self.release_stateful_if_unused();
            self.reevaluate(entry.property())?;
        }
        Ok(removed)
    }

    /// Remove the frame from its store (if any) and release everything it
    /// holds. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.get() {
            return;
        }
        match self.store() {
            Some(store) => store.dispose_frame(self),
            None => self.teardown(),
        }
    }

    fn entries_mut(&self) -> Result<&RefCell<IndexMap<PropertyId, Entry>>> {
        if self.inner.disposed.get() {
            return Err(StoreError::FrameDisposed {
                frame: self.inner.id,
            });
        }
        match &self.inner.kind {
            FrameKind::Single(_) => Err(StoreError::ImmutableFrame {
                frame: self.inner.id,
            }),
            FrameKind::Multi(entries) => Ok(entries),
        }
    }

    fn adopt(&self, entry: &Entry) -> Result<()> {
        let Some(binding) = entry.binding() else {
            return Ok(());
        };
        let newly_owned = !binding.is_owned_by(&self.inner);
        binding.adopt(&self.inner)?;
        if let Some(activation) = &self.inner.activation {
            if !activation.stateful.get() {
                if let Err(err) = activation.activator.mark_stateful() {
                    if newly_owned {
                        binding.disown();
                    }
                    return Err(err);
                }
                activation.stateful.set(true);
            }
        }
        Ok(())
    }

    /// Give up the frame's stateful mark once no reactive entry is left.
    fn release_stateful_if_unused(&self) {
        let Some(activation) = &self.inner.activation else {
            return;
        };
        if !activation.stateful.get() || self.entries().iter().any(Entry::is_reactive) {
            return;
        }
        activation.stateful.set(false);
        activation.activator.release_stateful();
    }

    fn reevaluate(&self, property: &AnyProperty) -> Result<()> {
        match self.store() {
            Some(store) => store.reevaluate(property),
            None => Ok(()),
        }
    }

    pub(crate) fn store(&self) -> Option<Rc<StoreInner>> {
        self.inner.store.borrow().upgrade()
    }

    pub(crate) fn is_attached_to(&self, store: &StoreInner) -> bool {
        std::ptr::eq(self.inner.store.borrow().as_ptr(), store)
    }

    /// Snapshot of the entries, in insertion order.
    pub(crate) fn entries(&self) -> SmallVec<[Entry; 4]> {
        match &self.inner.kind {
            FrameKind::Single(entry) => SmallVec::from_elem(entry.clone(), 1),
            FrameKind::Multi(entries) => entries.borrow().values().cloned().collect(),
        }
    }

    pub(crate) fn properties(&self) -> SmallVec<[AnyProperty; 4]> {
        self.entries()
            .iter()
            .map(|entry| entry.property().clone())
            .collect()
    }

    pub(crate) fn attach(&self, store: Weak<StoreInner>) {
        *self.inner.store.borrow_mut() = store;
    }

    /// Leave the store but stay reusable.
    pub(crate) fn detach(&self) {
        *self.inner.store.borrow_mut() = Weak::new();
        for entry in self.entries() {
            if let Some(binding) = entry.binding() {
                binding.reset();
            }
        }
        if let Some(activation) = &self.inner.activation {
            let state = activation.state.replace(ActivationState::Unsubscribed);
            drop(state);
            activation.active.set(false);
        }
    }

    /// Release everything. Terminal.
    pub(crate) fn teardown(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        *self.inner.store.borrow_mut() = Weak::new();
        for entry in self.entries() {
            entry.retire();
        }
        if let Some(activation) = &self.inner.activation {
            let state = activation.state.replace(ActivationState::Unsubscribed);
            drop(state);
            activation.active.set(false);
            activation.activator.release_frame(activation.stateful.get());
        }
        tracing::debug!(frame = %self.inner.id, "frame disposed");
    }

    /// Drop the entry for `property` if its binding has completed. Returns
    /// `true` when that leaves the frame without entries.
    pub(crate) fn remove_completed(&self, property: PropertyId) -> bool {
        let completed = |entry: &Entry| entry.lifecycle() == Some(BindingLifecycle::Completed);
        match &self.inner.kind {
            FrameKind::Single(entry) => completed(entry),
            FrameKind::Multi(entries) => {
                let now_empty = {
                    let mut entries = entries.borrow_mut();
                    if !entries.get(&property).is_some_and(completed) {
                        return false;
                    }
                    entries.shift_remove(&property);
                    entries.is_empty()
                };
                self.release_stateful_if_unused();
                now_empty
            }
        }
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.inner.id)
            .field("priority", &self.inner.priority)
            .field("entry_count", &self.entry_count())
            .field("attached", &self.is_attached())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

fn check_participates(entry: &Entry) -> Result<()> {
    if entry.property().is_direct() {
        return Err(StoreError::DirectProperty {
            property: entry.property().name(),
        });
    }
    Ok(())
}
