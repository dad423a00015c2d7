//! Value Store
//!
//! The per-object engine that turns a stack of frames into one effective
//! value per property.
//!
//! # Resolution
//!
//! Frames are kept ordered by precedence, highest first. The effective value
//! of a property is the value of the first frame that has an entry for the
//! property, is active, and whose entry currently has a value. If no frame
//! qualifies, the property's default for the owner's type applies.
//!
//! Resolution is lazy: a frame is asked whether it is active, and an entry
//! whether it has a value, only when every higher frame has been ruled out.
//! Bindings and activators below the winner are never subscribed.
//!
//! # Batching
//!
//! Resolution calls out to sources, and sources may call straight back into
//! the store (a binding pushing from inside `subscribe`, a binding completing
//! while it is being read). Every public operation therefore runs inside a
//! batch:
//!
//! 1. While a batch is open, callbacks from entries and frames are queued.
//! 2. When the outermost batch finishes its own work, the queue and the set
//!    of dirty properties are drained until both are empty.
//! 3. Only then, with every internal borrow released, are owner
//!    notifications dispatched.
//!
//! Each dirty property is resolved against a cached copy of its last
//! effective value, so every notification describes a real transition from
//! an old value to a new one.

use std::any::{type_name, TypeId};
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::config::{StoreConfig, TieBreak};
use super::entry::Entry;
use super::frame::{Frame, FrameId};
use super::owner::{PropertyChange, PropertyOwner};
use super::priority::Priority;
use crate::error::{Result, StoreError};
use crate::property::{AnyProperty, ErasedValue, Property, PropertyId, PropertyValue};
use crate::reactive::{BindingValue, Observable};

/// The last resolved state of a property.
#[derive(Debug, Clone)]
struct EffectiveValue {
    value: ErasedValue,
    frame: Option<FrameId>,
    priority: Option<Priority>,
}

impl EffectiveValue {
    fn default_for(property: &AnyProperty, owner_type: TypeId) -> Self {
        Self {
            value: property.default_for(owner_type),
            frame: None,
            priority: None,
        }
    }
}

/// Work deferred until the current batch drains.
enum Pending {
    Reevaluate(AnyProperty),
    ActivationChanged(Frame),
    BindingCompleted { frame: Frame, property: AnyProperty },
}

#[derive(Debug, Clone, Copy)]
enum Detach {
    /// The frame may be inserted again.
    Keep,
    /// The frame is finished.
    Dispose,
}

pub(crate) struct StoreInner {
    this: Weak<StoreInner>,
    owner: Weak<dyn PropertyOwner>,
    owner_type: TypeId,
    owner_name: &'static str,
    config: StoreConfig,
    /// Attached frames, highest precedence first.
    frames: RefCell<SmallVec<[Frame; 4]>>,
    /// Frames created by direct assignment, by property and priority.
    assigned: RefCell<HashMap<(PropertyId, Priority), Frame>>,
    effective: RefCell<HashMap<PropertyId, EffectiveValue>>,
    depth: Cell<u32>,
    pending: RefCell<VecDeque<Pending>>,
    dirty: RefCell<IndexMap<PropertyId, AnyProperty>>,
    changes: RefCell<Vec<PropertyChange>>,
    first_error: RefCell<Option<StoreError>>,
}

/// Marks a batch as open for as long as it lives.
struct Batch<'a> {
    store: &'a StoreInner,
}

impl<'a> Batch<'a> {
    fn enter(store: &'a StoreInner) -> Self {
        store.depth.set(store.depth.get() + 1);
        Self { store }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        self.store.depth.set(self.store.depth.get() - 1);
    }
}

impl StoreInner {
    pub(crate) fn owner_type(&self) -> TypeId {
        self.owner_type
    }

    // ------------------------------------------------------------------------
    // Hooks for entries and frames
    // ------------------------------------------------------------------------

    /// A reactive entry's value changed.
    pub(crate) fn entry_changed(&self, property: &AnyProperty) {
        self.schedule(Pending::Reevaluate(property.clone()));
    }

    /// A reactive entry's source ended.
    pub(crate) fn binding_completed(&self, frame: &Frame, property: &AnyProperty) {
        self.schedule(Pending::BindingCompleted {
            frame: frame.clone(),
            property: property.clone(),
        });
    }

    /// A frame's activator pushed a transition.
    pub(crate) fn frame_activation_changed(&self, frame: &Frame) {
        self.schedule(Pending::ActivationChanged(frame.clone()));
    }

    /// An attached frame gained, replaced or lost an entry.
    pub(crate) fn reevaluate(&self, property: &AnyProperty) -> Result<()> {
        self.run(|| {
            self.mark_dirty(property);
            Ok(())
        })
    }

    /// Remove and dispose an attached frame.
    pub(crate) fn dispose_frame(&self, frame: &Frame) {
        let result = self.run(|| {
            self.detach_frame(frame, Detach::Dispose);
            Ok(())
        });
        if let Err(err) = result {
            tracing::error!(owner = self.owner_name, error = %err, "frame disposal failed");
        }
    }

    fn schedule(&self, work: Pending) {
        self.pending.borrow_mut().push_back(work);
        if self.depth.get() > 0 {
            return;
        }
        // No caller can receive the error from a push or transition.
        if let Err(err) = self.run(|| Ok(())) {
            tracing::error!(owner = self.owner_name, error = %err, "deferred store update failed");
            panic!("{err}");
        }
    }

    // ------------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------------

    fn run<R>(&self, op: impl FnOnce() -> Result<R>) -> Result<R> {
        let outermost = self.depth.get() == 0;
        let result = {
            let _batch = Batch::enter(self);
            let result = op();
            if outermost {
                self.drain();
            }
            result
        };
        if !outermost {
            return result;
        }

        self.dispatch();
        let error = self.first_error.borrow_mut().take();
        match (result, error) {
            (Ok(_), Some(error)) => Err(error),
            (result, _) => result,
        }
    }

    fn drain(&self) {
        loop {
            let work = self.pending.borrow_mut().pop_front();
            if let Some(work) = work {
                self.apply(work);
                continue;
            }
            let next = self.dirty.borrow_mut().shift_remove_index(0);
            match next {
                Some((_, property)) => self.refresh(&property),
                None => break,
            }
        }
    }

    fn apply(&self, work: Pending) {
        match work {
            Pending::Reevaluate(property) => self.mark_dirty(&property),
            Pending::ActivationChanged(frame) => {
                if frame.is_attached_to(self) {
                    self.mark_frame_dirty(&frame);
                }
            }
            Pending::BindingCompleted { frame, property } => {
                if !frame.is_attached_to(self) {
                    return;
                }
                let now_empty = frame.remove_completed(property.id());
                self.mark_dirty(&property);
                if now_empty {
                    self.detach_frame(&frame, Detach::Dispose);
                }
            }
        }
    }

    fn dispatch(&self) {
        let changes = std::mem::take(&mut *self.changes.borrow_mut());
        if changes.is_empty() {
            return;
        }
        let Some(owner) = self.owner.upgrade() else {
            tracing::trace!(owner = self.owner_name, count = changes.len(), "owner dropped, discarding changes");
            return;
        };

        for change in &changes {
            if change.value_changed() {
                owner.property_changed(change);
            } else {
                owner.effective_source_changed(change);
            }
        }
    }

    fn record_error(&self, err: StoreError) {
        tracing::error!(owner = self.owner_name, error = %err, "store contract violated");
        let mut first = self.first_error.borrow_mut();
        if first.is_none() {
            *first = Some(err);
        }
    }

    // ------------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------------

    fn check_insertable(frame: &Frame) -> Result<()> {
        if frame.is_disposed() {
            return Err(StoreError::FrameDisposed { frame: frame.id() });
        }
        if frame.is_attached() {
            return Err(StoreError::FrameAlreadyAttached { frame: frame.id() });
        }
        Ok(())
    }

    fn attach_frame(&self, frame: &Frame) {
        let priority = frame.priority();
        {
            let mut frames = self.frames.borrow_mut();
            let index = match self.config.tie_break() {
                TieBreak::NewestFirst => frames.iter().position(|f| f.priority() >= priority),
                TieBreak::OldestFirst => frames.iter().position(|f| f.priority() > priority),
            }
            .unwrap_or(frames.len());
            frames.insert(index, frame.clone());
        }
        frame.attach(self.this.clone());
        self.mark_frame_dirty(frame);
        tracing::debug!(owner = self.owner_name, frame = %frame.id(), priority = priority.value(), "frame inserted");
    }

    fn detach_frame(&self, frame: &Frame, mode: Detach) {
        let removed = {
            let mut frames = self.frames.borrow_mut();
            match frames.iter().position(|f| f == frame) {
                Some(index) => {
                    frames.remove(index);
                    true
                }
                None => false,
            }
        };
        if !removed {
            if let Detach::Dispose = mode {
                frame.teardown();
            }
            return;
        }

        self.assigned.borrow_mut().retain(|_, f| *f != *frame);
        // Collect the touched properties before the frame lets go of them.
        self.mark_frame_dirty(frame);
        match mode {
            Detach::Keep => frame.detach(),
            Detach::Dispose => frame.teardown(),
        }
        tracing::debug!(owner = self.owner_name, frame = %frame.id(), ?mode, "frame removed");
    }

    fn assign(&self, property: &AnyProperty, priority: Priority, frame: &Frame) {
        let previous = self
            .assigned
            .borrow_mut()
            .insert((property.id(), priority), frame.clone());
        if let Some(previous) = previous {
            self.detach_frame(&previous, Detach::Dispose);
        }
        self.attach_frame(frame);
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    fn mark_dirty(&self, property: &AnyProperty) {
        self.dirty
            .borrow_mut()
            .insert(property.id(), property.clone());
    }

    fn mark_frame_dirty(&self, frame: &Frame) {
        for property in frame.properties() {
            self.mark_dirty(&property);
        }
    }

    fn lookup(&self, property: &AnyProperty) -> Result<EffectiveValue> {
        let cached = self.effective.borrow().get(&property.id()).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        if self.depth.get() > 0 {
            // Read from inside a callback. Answer without touching the cache;
            // the outer batch keeps it consistent.
            return Ok(self.resolve(property));
        }

        self.run(|| {
            self.mark_dirty(property);
            Ok(())
        })?;
        Ok(self.effective_of(property))
    }

    fn effective_of(&self, property: &AnyProperty) -> EffectiveValue {
        let cached = self.effective.borrow().get(&property.id()).cloned();
        cached.unwrap_or_else(|| EffectiveValue::default_for(property, self.owner_type))
    }

    fn resolve(&self, property: &AnyProperty) -> EffectiveValue {
        let frames: SmallVec<[Frame; 8]> = self.frames.borrow().iter().cloned().collect();

        for frame in frames {
            let Some(entry) = frame.try_get(property.id()) else {
                continue;
            };
            if !frame.is_attached_to(self) || !frame.is_active() {
                continue;
            }

            match read_entry(&entry) {
                Ok(Some(value)) => {
                    return EffectiveValue {
                        value,
                        frame: Some(frame.id()),
                        priority: Some(frame.priority()),
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    self.record_error(err);
                    self.pending.borrow_mut().push_back(Pending::BindingCompleted {
                        frame: frame.clone(),
                        property: property.clone(),
                    });
                }
            }
        }

        EffectiveValue::default_for(property, self.owner_type)
    }

    fn refresh(&self, property: &AnyProperty) {
        let resolved = self.resolve(property);
        let previous = self.effective_of(property);
        self.effective
            .borrow_mut()
            .insert(property.id(), resolved.clone());

        let value_changed = previous.value != resolved.value;
        let source_changed = previous.frame != resolved.frame;
        tracing::trace!(
            owner = self.owner_name,
            property = property.name(),
            frame = ?resolved.frame,
            value_changed,
            source_changed,
            "property resolved"
        );

        if value_changed || (source_changed && self.config.notify_source_changes()) {
            self.changes.borrow_mut().push(PropertyChange::new(
                property.clone(),
                (previous.value, previous.priority),
                (resolved.value, resolved.priority),
            ));
        }
    }
}

fn read_entry(entry: &Entry) -> Result<Option<ErasedValue>> {
    if !entry.has_value()? {
        return Ok(None);
    }
    entry.get_value().map(Some)
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        for frame in self.frames.get_mut().drain(..) {
            frame.teardown();
        }
    }
}

/// One frame's contribution to a property, as reported by
/// [`ValueStore::diagnostics`].
#[derive(Debug, Clone)]
pub struct FrameDiagnostic {
    /// The contributing frame.
    pub frame: FrameId,
    /// Its priority.
    pub priority: Priority,
    /// Whether the frame is currently active.
    pub active: bool,
    /// The entry's current value, if it has one.
    pub value: Option<ErasedValue>,
    /// Whether this frame supplies the effective value.
    pub winning: bool,
}

/// Resolves the effective values of one object's properties.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use lattice_store::{Priority, Property, PropertyChange, PropertyMetadata, PropertyOwner, ValueStore};
///
/// struct Button;
///
/// impl PropertyOwner for Button {
///     fn property_changed(&self, change: &PropertyChange) {
///         println!("{} -> {:?}", change.property().name(), change.new_value());
///     }
/// }
///
/// let width = Property::register("Width", PropertyMetadata::new(0.0_f64));
/// let button = Rc::new(Button);
/// let store = ValueStore::new(&button);
///
/// store.set_value(&width, 120.0, Priority::new(10)).unwrap();
/// store.set_value(&width, 80.0, Priority::new(0)).unwrap();
///
/// assert_eq!(store.get_value(&width).unwrap(), 80.0);
/// assert_eq!(store.winning_priority(&width).unwrap(), Some(Priority::new(0)));
/// ```
pub struct ValueStore {
    inner: Rc<StoreInner>,
}

impl ValueStore {
    /// Create a store for `owner` with the default configuration.
    pub fn new<O: PropertyOwner + 'static>(owner: &Rc<O>) -> Self {
        Self::with_config(owner, StoreConfig::default())
    }

    /// Create a store for `owner`.
    pub fn with_config<O: PropertyOwner + 'static>(owner: &Rc<O>, config: StoreConfig) -> Self {
        let owner = Rc::downgrade(owner);
        let owner: Weak<dyn PropertyOwner> = owner;
        let inner = Rc::new_cyclic(|this| StoreInner {
            this: this.clone(),
            owner,
            owner_type: TypeId::of::<O>(),
            owner_name: type_name::<O>(),
            config,
            frames: RefCell::new(SmallVec::new()),
            assigned: RefCell::new(HashMap::new()),
            effective: RefCell::new(HashMap::new()),
            depth: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            dirty: RefCell::new(IndexMap::new()),
            changes: RefCell::new(Vec::new()),
            first_error: RefCell::new(None),
        });
        Self { inner }
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The [`TypeId`] of the owning object's type.
    pub fn owner_type(&self) -> TypeId {
        self.inner.owner_type
    }

    /// Attach a frame.
    ///
    /// Every property the frame has an entry for is re-resolved and the
    /// owner is told about the properties whose value changed.
    pub fn insert_frame(&self, frame: &Frame) -> Result<()> {
        StoreInner::check_insertable(frame)?;
        self.inner.run(|| {
            self.inner.attach_frame(frame);
            Ok(())
        })
    }

    /// Detach a frame without disposing it.
    ///
    /// Its bindings and activator are unsubscribed; inserting it again
    /// starts them over.
    pub fn remove_frame(&self, frame: &Frame) -> Result<()> {
        if !frame.is_attached_to(&self.inner) {
            return Err(StoreError::FrameNotAttached { frame: frame.id() });
        }
        self.inner.run(|| {
            self.inner.detach_frame(frame, Detach::Keep);
            Ok(())
        })
    }

    /// The effective value of a property.
    pub fn get_value<T: PropertyValue>(&self, property: &Property<T>) -> Result<T> {
        self.effective(&property.erase())?
            .value
            .downcast()
            .ok_or(StoreError::ValueTypeMismatch {
                property: property.name(),
            })
    }

    /// The effective value of a property, type-erased.
    pub fn get_erased(&self, property: impl Into<AnyProperty>) -> Result<ErasedValue> {
        Ok(self.effective(&property.into())?.value)
    }

    /// Priority of the frame supplying the effective value, or `None` when
    /// the default applies.
    pub fn winning_priority(&self, property: impl Into<AnyProperty>) -> Result<Option<Priority>> {
        Ok(self.effective(&property.into())?.priority)
    }

    /// Whether some frame supplies the effective value.
    pub fn is_set(&self, property: impl Into<AnyProperty>) -> Result<bool> {
        Ok(self.effective(&property.into())?.frame.is_some())
    }

    fn effective(&self, property: &AnyProperty) -> Result<EffectiveValue> {
        if property.is_direct() {
            return Err(StoreError::DirectProperty {
                property: property.name(),
            });
        }
        self.inner.lookup(property)
    }

    /// Assign a value at `priority`.
    ///
    /// Replaces (and disposes) the frame of an earlier assignment or binding
    /// made through this store for the same property and priority. Returns
    /// the new frame.
    pub fn set_value<T: PropertyValue>(
        &self,
        property: &Property<T>,
        value: T,
        priority: Priority,
    ) -> Result<Frame> {
        let frame = Frame::single_value(property, value, priority)?;
        self.assign(&property.erase(), priority, frame)
    }

    /// Bind a property at `priority` to a source of values.
    ///
    /// Replaces an earlier assignment like [`set_value`](Self::set_value).
    pub fn bind<T, S>(&self, property: &Property<T>, source: S, priority: Priority) -> Result<Frame>
    where
        T: PropertyValue,
        S: Observable<T> + 'static,
    {
        let frame = Frame::binding(property, source, priority)?;
        self.assign(&property.erase(), priority, frame)
    }

    /// Bind a property at `priority` to a source of [`BindingValue`] pushes.
    pub fn bind_values<T, S>(
        &self,
        property: &Property<T>,
        source: S,
        priority: Priority,
    ) -> Result<Frame>
    where
        T: PropertyValue,
        S: Observable<BindingValue<T>> + 'static,
    {
        let frame = Frame::binding_values(property, source, priority)?;
        self.assign(&property.erase(), priority, frame)
    }

    fn assign(&self, property: &AnyProperty, priority: Priority, frame: Frame) -> Result<Frame> {
        self.inner.run(|| {
            self.inner.assign(property, priority, &frame);
            Ok(())
        })?;
        Ok(frame)
    }

    /// Undo an assignment made with [`set_value`](Self::set_value) or
    /// [`bind`](Self::bind). Returns whether there was one.
    pub fn clear_value<T: PropertyValue>(&self, property: &Property<T>, priority: Priority) -> Result<bool> {
        let frame = self
            .inner
            .assigned
            .borrow()
            .get(&(property.id(), priority))
            .cloned();
        let Some(frame) = frame else {
            return Ok(false);
        };
        self.inner.run(|| {
            self.inner.detach_frame(&frame, Detach::Dispose);
            Ok(())
        })?;
        Ok(true)
    }

    /// Number of attached frames.
    pub fn frame_count(&self) -> usize {
        self.inner.frames.borrow().len()
    }

    /// The attached frames, highest precedence first.
    pub fn frames(&self) -> Vec<Frame> {
        self.inner.frames.borrow().iter().cloned().collect()
    }

    /// Every attached frame holding an entry for `property`, highest
    /// precedence first, with its current contribution.
    ///
    /// Unlike resolution, this reads every frame and may start bindings that
    /// are otherwise shadowed.
    pub fn diagnostics(&self, property: impl Into<AnyProperty>) -> Result<Vec<FrameDiagnostic>> {
        let property = property.into();
        let winner = self.effective(&property)?.frame;

        self.inner.run(|| {
            let mut report = Vec::new();
            for frame in self.frames() {
                let Some(entry) = frame.try_get(property.id()) else {
                    continue;
                };
                report.push(FrameDiagnostic {
                    frame: frame.id(),
                    priority: frame.priority(),
                    active: frame.is_active(),
                    value: read_entry(&entry)?,
                    winning: winner == Some(frame.id()),
                });
            }
            Ok(report)
        })
    }

    /// Detach and dispose every frame.
    ///
    /// The owner is notified of the properties that fall back to their
    /// defaults.
    pub fn dispose(&self) {
        let result = self.inner.run(|| {
            for frame in self.frames() {
                self.inner.detach_frame(&frame, Detach::Dispose);
            }
            Ok(())
        });
        if let Err(err) = result {
            tracing::error!(owner = self.inner.owner_name, error = %err, "store disposal failed");
        }
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStore")
            .field("owner", &self.inner.owner_name)
            .field("frame_count", &self.frame_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// A value store created on first use.
///
/// Objects that never have a property set pay for nothing but this cell.
#[derive(Debug, Default)]
pub struct LazyValueStore {
    cell: OnceCell<ValueStore>,
    config: StoreConfig,
}

impl LazyValueStore {
    /// An empty cell that will create stores with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty cell that will create stores with `config`.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            cell: OnceCell::new(),
            config,
        }
    }

    /// The store, created for `owner` if it does not exist yet.
    pub fn get_or_init<O: PropertyOwner + 'static>(&self, owner: &Rc<O>) -> &ValueStore {
        self.cell
            .get_or_init(|| ValueStore::with_config(owner, self.config.clone()))
    }

    /// The store, if it was created.
    pub fn get(&self) -> Option<&ValueStore> {
        self.cell.get()
    }

    /// Whether the store was created.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Take the store out of the cell, leaving it empty.
    pub fn take(&mut self) -> Option<ValueStore> {
        self.cell.take()
    }
}
