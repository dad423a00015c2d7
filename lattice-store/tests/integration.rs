//! Integration Tests for the Value Store
//!
//! These tests verify that frames, entries, activators and the store work
//! together: precedence, change suppression, reentrancy and cleanup.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lattice_store::reactive::{
    self, BindingValue, ErasedSource, Observable, Observer, Subject, Subscription,
};
use lattice_store::{
    Activator, BindingLifecycle, Entry, Frame, LazyValueStore, Priority, Property, PropertyChange,
    PropertyMetadata, PropertyOwner, StoreConfig, StoreError, TieBreak, ValueStore,
};

/// An owner that records every notification as `(name, old, new)`.
#[derive(Default)]
struct Recorder {
    changes: RefCell<Vec<(&'static str, i32, i32)>>,
}

impl Recorder {
    fn take(&self) -> Vec<(&'static str, i32, i32)> {
        std::mem::take(&mut *self.changes.borrow_mut())
    }
}

impl PropertyOwner for Recorder {
    fn property_changed(&self, change: &PropertyChange) {
        self.changes.borrow_mut().push((
            change.property().name(),
            change.old_as::<i32>().unwrap(),
            change.new_as::<i32>().unwrap(),
        ));
    }
}

fn setup(name: &'static str) -> (Rc<Recorder>, ValueStore, Property<i32>) {
    let owner = Rc::new(Recorder::default());
    let store = ValueStore::new(&owner);
    let property = Property::register(name, PropertyMetadata::new(0));
    (owner, store, property)
}

/// The highest-precedence frame wins, and changes below it stay silent.
#[test]
fn precedence_hides_lower_frames() {
    let (owner, store, x) = setup("X");
    let high = Subject::<i32>::new();
    let low = Subject::<i32>::new();

    store.bind(&x, high.clone(), Priority::new(0)).unwrap();
    high.next(1);
    store.bind(&x, low.clone(), Priority::new(10)).unwrap();

    assert_eq!(store.get_value(&x).unwrap(), 1);
    assert_eq!(owner.take(), vec![("X", 0, 1)]);

    // The lower binding is shadowed, so it was never even subscribed.
    assert_eq!(low.subscriber_count(), 0);
    low.next(99);
    assert!(owner.take().is_empty());
    assert_eq!(store.get_value(&x).unwrap(), 1);
}

/// A lower frame that has started keeps quiet while a higher one has a value.
#[test]
fn started_lower_binding_is_silent_while_shadowed() {
    let (owner, store, x) = setup("X");
    let high = Subject::<BindingValue<i32>>::new();
    let low = Subject::<i32>::new();

    store.bind_values(&x, high.clone(), Priority::new(0)).unwrap();
    // With the higher binding empty, the lower one is read and subscribed.
    store.bind(&x, low.clone(), Priority::new(10)).unwrap();
    assert_eq!(low.subscriber_count(), 1);

    low.next(5);
    high.next(BindingValue::Value(1));
    assert_eq!(owner.take(), vec![("X", 0, 5), ("X", 5, 1)]);

    low.next(6);
    low.next(7);
    assert!(owner.take().is_empty());

    // Withdrawing the higher value falls back to the lower binding.
    high.next(BindingValue::Unset);
    assert_eq!(owner.take(), vec![("X", 1, 7)]);
    assert_eq!(store.winning_priority(&x).unwrap(), Some(Priority::new(10)));
}

/// Equal pushes never notify.
#[test]
fn equal_pushes_are_suppressed() {
    let (owner, store, x) = setup("X");
    let source = Subject::<i32>::new();
    store.bind(&x, source.clone(), Priority::new(0)).unwrap();

    source.next(4);
    source.next(4);
    source.next(4);

    assert_eq!(owner.take(), vec![("X", 0, 4)]);
}

/// A source that pushes from inside `subscribe` yields one notification.
#[test]
fn synchronous_push_during_subscribe() {
    let (owner, store, x) = setup("X");
    let subscribe_calls = Rc::new(Cell::new(0));
    let calls = subscribe_calls.clone();

    let source = reactive::create(move |observer: Rc<dyn Observer<i32>>| {
        calls.set(calls.get() + 1);
        observer.on_next(1);
        observer.on_next(2);
        Subscription::empty()
    });
    let frame = store.bind(&x, source, Priority::new(0)).unwrap();

    let entry = frame.try_get(x.id()).unwrap();
    assert!(entry.has_value().unwrap());
    assert_eq!(entry.lifecycle(), Some(BindingLifecycle::Active));
    assert_eq!(store.get_value(&x).unwrap(), 2);
    assert_eq!(subscribe_calls.get(), 1);
    assert_eq!(owner.take(), vec![("X", 0, 2)]);
}

/// Frame A (priority 10, X=1) and frame B (priority 5, X=2); toggling B.
#[test]
fn activation_toggle_round_trip() {
    let (owner, store, x) = setup("X");

    let a = Frame::multi(Priority::new(10));
    a.add(Entry::value(&x, 1)).unwrap();

    let condition = Activator::new(true);
    let b = Frame::activated(Priority::new(5), condition.clone()).unwrap();
    b.add(Entry::value(&x, 2)).unwrap();

    store.insert_frame(&a).unwrap();
    store.insert_frame(&b).unwrap();
    assert_eq!(store.get_value(&x).unwrap(), 2);
    owner.take();

    condition.set_active(false);
    assert_eq!(store.get_value(&x).unwrap(), 1);
    assert_eq!(owner.take(), vec![("X", 2, 1)]);

    condition.set_active(true);
    assert_eq!(store.get_value(&x).unwrap(), 2);
    assert_eq!(owner.take(), vec![("X", 1, 2)]);

    // Repeating a state is not a transition.
    condition.set_active(true);
    assert!(owner.take().is_empty());
}

/// Toggling a frame re-resolves only the properties it has entries for.
#[test]
fn activation_touches_only_frame_properties() {
    let owner = Rc::new(Recorder::default());
    let store = ValueStore::new(&owner);
    let x = Property::register("X", PropertyMetadata::new(0));
    let y = Property::register("Y", PropertyMetadata::new(0));
    let z = Property::register("Z", PropertyMetadata::new(0));

    store.set_value(&z, 9, Priority::new(0)).unwrap();

    let condition = Activator::new(false);
    let rule = Frame::activated(Priority::new(20), condition.clone()).unwrap();
    rule.add(Entry::value(&x, 1)).unwrap();
    rule.add(Entry::value(&y, 2)).unwrap();
    store.insert_frame(&rule).unwrap();
    owner.take();

    condition.set_active(true);
    assert_eq!(owner.take(), vec![("X", 0, 1), ("Y", 0, 2)]);

    condition.set_active(false);
    assert_eq!(owner.take(), vec![("X", 1, 0), ("Y", 2, 0)]);
}

/// A completed binding disappears and its frame detaches.
#[test]
fn completion_removes_frame() {
    let (owner, store, x) = setup("X");
    store.set_value(&x, 1, Priority::new(10)).unwrap();

    let source = Subject::<i32>::new();
    let frame = store.bind(&x, source.clone(), Priority::new(0)).unwrap();
    source.next(5);
    assert_eq!(store.frame_count(), 2);
    owner.take();

    source.complete();

    assert!(!frame.is_attached());
    assert!(frame.is_disposed());
    assert_eq!(store.frame_count(), 1);
    assert_eq!(store.get_value(&x).unwrap(), 1);
    assert_eq!(owner.take(), vec![("X", 5, 1)]);
}

/// Completion of one entry in a multi frame keeps the others.
#[test]
fn completion_in_multi_frame_keeps_siblings() {
    let owner = Rc::new(Recorder::default());
    let store = ValueStore::new(&owner);
    let x = Property::register("X", PropertyMetadata::new(0));
    let y = Property::register("Y", PropertyMetadata::new(0));

    let source = Subject::<i32>::new();
    let frame = Frame::multi(Priority::new(0));
    frame.add(Entry::bind(&x, source.clone())).unwrap();
    frame.add(Entry::value(&y, 3)).unwrap();
    store.insert_frame(&frame).unwrap();

    assert_eq!(store.get_value(&x).unwrap(), 0);
    source.next(8);
    source.error(reactive::SourceError::new("disconnected"));

    assert!(frame.is_attached());
    assert_eq!(frame.entry_count(), 1);
    assert!(frame.try_get(x.id()).is_none());
    assert_eq!(store.get_value(&y).unwrap(), 3);
    assert_eq!(owner.take(), vec![("Y", 0, 3), ("X", 0, 8), ("X", 8, 0)]);
}

/// A source that completes while being subscribed never produces a value.
#[test]
fn completion_during_subscribe() {
    let (owner, store, x) = setup("X");
    store.set_value(&x, 1, Priority::new(10)).unwrap();
    owner.take();

    let source = reactive::create(|observer: Rc<dyn Observer<i32>>| {
        observer.on_next(42);
        observer.on_completed();
        Subscription::empty()
    });
    let frame = store.bind(&x, source, Priority::new(0)).unwrap();

    assert!(frame.is_disposed());
    assert_eq!(store.frame_count(), 1);
    assert_eq!(store.get_value(&x).unwrap(), 1);
    assert!(owner.take().is_empty());
}

/// Rejected pushes are replaced by the owner type's default.
#[test]
fn validation_substitutes_default() {
    let owner = Rc::new(Recorder::default());
    let store = ValueStore::new(&owner);
    let count = Property::register(
        "Count",
        PropertyMetadata::builder(0).validate(|v: &i32| *v >= 0).build(),
    );
    count.override_default::<Recorder>(10);

    let source = Subject::<i32>::new();
    let frame = store.bind(&count, source.clone(), Priority::new(0)).unwrap();

    // Nothing pushed yet: the owner type's default applies.
    assert_eq!(store.get_value(&count).unwrap(), 10);

    source.next(-5);
    assert_eq!(frame.try_get(count.id()).unwrap().get::<i32>().unwrap(), 10);
    assert_eq!(store.get_value(&count).unwrap(), 10);
    assert!(owner.take().is_empty());

    source.next(3);
    source.next(-1);
    assert_eq!(owner.take(), vec![("Count", 10, 3), ("Count", 3, 10)]);

    // A rejected value whose substitute equals the current one is silent.
    source.next(-2);
    assert!(owner.take().is_empty());
}

/// Newer frames win ties by default.
#[test]
fn tie_break_newest_first() {
    let (_owner, store, x) = setup("X");
    store.insert_frame(&Frame::single_value(&x, 1, Priority::new(0)).unwrap()).unwrap();
    store.insert_frame(&Frame::single_value(&x, 2, Priority::new(0)).unwrap()).unwrap();

    assert_eq!(store.get_value(&x).unwrap(), 2);
}

/// Older frames win ties when configured.
#[test]
fn tie_break_oldest_first() {
    let owner = Rc::new(Recorder::default());
    let config = StoreConfig::builder().tie_break(TieBreak::OldestFirst).build();
    let store = ValueStore::with_config(&owner, config);
    let x = Property::register("X", PropertyMetadata::new(0));

    store.insert_frame(&Frame::single_value(&x, 1, Priority::new(0)).unwrap()).unwrap();
    store.insert_frame(&Frame::single_value(&x, 2, Priority::new(0)).unwrap()).unwrap();

    assert_eq!(store.get_value(&x).unwrap(), 1);
}

/// Assigning at the same priority replaces the previous assignment.
#[test]
fn set_value_replaces_previous_assignment() {
    let (owner, store, x) = setup("X");
    let first = store.set_value(&x, 1, Priority::new(0)).unwrap();
    let second = store.set_value(&x, 2, Priority::new(0)).unwrap();

    assert!(first.is_disposed());
    assert!(second.is_attached());
    assert_eq!(store.frame_count(), 1);
    assert_eq!(owner.take(), vec![("X", 0, 1), ("X", 1, 2)]);

    assert!(store.clear_value(&x, Priority::new(0)).unwrap());
    assert!(!store.clear_value(&x, Priority::new(0)).unwrap());
    assert_eq!(store.frame_count(), 0);
    assert_eq!(owner.take(), vec![("X", 2, 0)]);
}

/// Removing a frame unsubscribes it; inserting it again starts over.
#[test]
fn removed_frame_can_be_reinserted() {
    let (owner, store, x) = setup("X");
    let source = Subject::<i32>::new();
    let frame = Frame::binding(&x, source.clone(), Priority::new(0)).unwrap();

    store.insert_frame(&frame).unwrap();
    source.next(3);
    store.remove_frame(&frame).unwrap();

    assert_eq!(source.subscriber_count(), 0);
    assert!(!frame.is_attached());
    assert!(!frame.is_disposed());
    assert_eq!(
        frame.try_get(x.id()).unwrap().lifecycle(),
        Some(BindingLifecycle::Unstarted)
    );

    store.insert_frame(&frame).unwrap();
    assert_eq!(source.subscriber_count(), 1);
    source.next(4);
    assert_eq!(store.get_value(&x).unwrap(), 4);
    assert_eq!(owner.take(), vec![("X", 0, 3), ("X", 3, 0), ("X", 0, 4)]);
}

/// Entries added to an attached frame are resolved right away.
#[test]
fn mutating_attached_frame() {
    let (owner, store, x) = setup("X");
    let frame = Frame::multi(Priority::new(0));
    store.insert_frame(&frame).unwrap();

    frame.add(Entry::value(&x, 1)).unwrap();
    frame.set(Entry::value(&x, 2)).unwrap();
    frame.remove(x.id()).unwrap();

    assert!(frame.is_attached());
    assert_eq!(frame.entry_count(), 0);
    assert_eq!(owner.take(), vec![("X", 0, 1), ("X", 1, 2), ("X", 2, 0)]);
}

/// Disposing a frame from inside its own source's callback is safe.
#[test]
fn dispose_from_source_callback() {
    struct DisposeOnPush {
        frame: RefCell<Option<Frame>>,
    }

    impl Observer<i32> for DisposeOnPush {
        fn on_next(&self, value: i32) {
            if value == 6 {
                if let Some(frame) = self.frame.borrow_mut().take() {
                    frame.dispose();
                    frame.dispose();
                }
            }
        }

        fn on_completed(&self) {}
    }

    let (owner, store, x) = setup("X");
    let source = Subject::<i32>::new();
    let frame = store.bind(&x, source.clone(), Priority::new(0)).unwrap();

    // Registered after the binding, so it runs after the entry saw the push.
    let disposer = Rc::new(DisposeOnPush {
        frame: RefCell::new(Some(frame.clone())),
    });
    let _subscription = source.subscribe(disposer);

    source.next(5);
    source.next(6);

    assert!(frame.is_disposed());
    assert_eq!(store.frame_count(), 0);
    assert_eq!(source.subscriber_count(), 1);
    assert_eq!(owner.take(), vec![("X", 0, 5), ("X", 5, 6), ("X", 6, 0)]);
}

/// A source that keeps pushing after being detached is a contract violation.
#[test]
#[should_panic(expected = "not attached to a value store")]
fn push_after_detach_panics() {
    struct Rogue {
        observer: RefCell<Option<Rc<dyn Observer<i32>>>>,
    }

    let rogue = Rc::new(Rogue {
        observer: RefCell::new(None),
    });
    let capture = rogue.clone();
    // Ignores unsubscription and keeps the observer.
    let source = reactive::create(move |observer: Rc<dyn Observer<i32>>| {
        *capture.observer.borrow_mut() = Some(observer);
        Subscription::empty()
    });

    let (_owner, store, x) = setup("X");
    let frame = Frame::binding(&x, source, Priority::new(0)).unwrap();
    store.insert_frame(&frame).unwrap();
    store.remove_frame(&frame).unwrap();

    let observer = rogue.observer.borrow().clone().unwrap();
    observer.on_next(1);
}

/// An erased source of the wrong item type fails when it subscribes.
#[test]
fn mismatched_source_type_is_reported() {
    let (owner, store, x) = setup("X");
    let text_source = Subject::<String>::new();
    let entry = Entry::bind_erased(x.erase(), ErasedSource::values(text_source.clone()));
    let frame = Frame::single(entry.clone(), Priority::new(0)).unwrap();

    let err = store.insert_frame(&frame).unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedSourceShape { property: "X", .. }));

    assert_eq!(entry.lifecycle(), Some(BindingLifecycle::Completed));
    assert_eq!(text_source.subscriber_count(), 0);
    assert!(frame.is_disposed());
    assert_eq!(store.get_value(&x).unwrap(), 0);
    assert!(owner.take().is_empty());
}

/// A mismatched source uncovered by an activator transition has no caller to
/// report to, so it fails loudly.
#[test]
#[should_panic(expected = "unexpected item type")]
fn mismatched_source_found_by_transition_panics() {
    let (_owner, store, x) = setup("X");

    let condition = Activator::new(true);
    let gated = Frame::activated(Priority::new(0), condition.clone()).unwrap();
    gated.add(Entry::value(&x, 1)).unwrap();

    let text_source = Subject::<String>::new();
    let entry = Entry::bind_erased(x.erase(), ErasedSource::values(text_source));
    let shadowed = Frame::single(entry, Priority::new(10)).unwrap();

    store.insert_frame(&gated).unwrap();
    store.insert_frame(&shadowed).unwrap();
    assert_eq!(store.get_value(&x).unwrap(), 1);

    condition.set_active(false);
}

/// Reading a detached entry, or a value that was never produced, fails.
#[test]
fn entry_read_errors() {
    let (_owner, store, x) = setup("X");
    let source = Subject::<i32>::new();
    let frame = Frame::binding(&x, source.clone(), Priority::new(0)).unwrap();
    let entry = frame.try_get(x.id()).unwrap();

    assert_eq!(entry.has_value(), Err(StoreError::MissingOwner { property: "X" }));

    store.insert_frame(&frame).unwrap();
    assert!(!entry.has_value().unwrap());
    assert_eq!(entry.get_value(), Err(StoreError::EntryHasNoValue { property: "X" }));
}

/// A frame belongs to one store at a time.
#[test]
fn frame_cannot_join_two_stores() {
    let (_owner_a, store_a, x) = setup("X");
    let owner_b = Rc::new(Recorder::default());
    let store_b = ValueStore::new(&owner_b);

    let frame = Frame::single_value(&x, 1, Priority::new(0)).unwrap();
    store_a.insert_frame(&frame).unwrap();

    assert_eq!(
        store_b.insert_frame(&frame),
        Err(StoreError::FrameAlreadyAttached { frame: frame.id() })
    );
    assert_eq!(
        store_b.remove_frame(&frame),
        Err(StoreError::FrameNotAttached { frame: frame.id() })
    );
}

/// One activator can gate stateless frames in several stores.
#[test]
fn shared_activator_drives_many_stores() {
    let x = Property::register("X", PropertyMetadata::new(0));
    let condition = Activator::new(false);

    let owners: Vec<_> = (0..3).map(|_| Rc::new(Recorder::default())).collect();
    let stores: Vec<_> = owners.iter().map(ValueStore::new).collect();
    let mut frames = Vec::new();
    for store in &stores {
        let frame = Frame::activated(Priority::new(0), condition.clone()).unwrap();
        frame.add(Entry::value(&x, 7)).unwrap();
        store.insert_frame(&frame).unwrap();
        frames.push(frame);
    }
    assert_eq!(condition.frame_count(), 3);
    assert_eq!(condition.subscriber_count(), 3);

    condition.set_active(true);
    for owner in &owners {
        assert_eq!(owner.take(), vec![("X", 0, 7)]);
    }

    // Disposing one subscriber leaves the others running.
    frames[0].dispose();
    assert_eq!(owners[0].take(), vec![("X", 7, 0)]);
    condition.set_active(false);
    assert!(owners[0].take().is_empty());
    assert_eq!(owners[1].take(), vec![("X", 7, 0)]);
    assert_eq!(owners[2].take(), vec![("X", 7, 0)]);
    assert_eq!(condition.subscriber_count(), 2);
}

/// A gated frame whose activator has not reported yet is inactive.
#[test]
fn pending_activator_keeps_frame_inactive() {
    let (owner, store, x) = setup("X");
    let condition = Activator::pending();
    let frame = Frame::activated(Priority::new(0), condition.clone()).unwrap();
    frame.add(Entry::value(&x, 1)).unwrap();
    store.insert_frame(&frame).unwrap();

    assert_eq!(store.get_value(&x).unwrap(), 0);
    condition.set_active(true);
    assert_eq!(owner.take(), vec![("X", 0, 1)]);
}

/// Diagnostics list every contributing frame.
#[test]
fn diagnostics_report_contributions() {
    let (_owner, store, x) = setup("X");
    let condition = Activator::new(false);
    let gated = Frame::activated(Priority::new(0), condition).unwrap();
    gated.add(Entry::value(&x, 1)).unwrap();
    store.insert_frame(&gated).unwrap();
    let local = store.set_value(&x, 2, Priority::new(5)).unwrap();

    let report = store.diagnostics(&x).unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].frame, gated.id());
    assert!(!report[0].active);
    assert!(!report[0].winning);
    assert_eq!(report[1].frame, local.id());
    assert!(report[1].winning);
    assert_eq!(report[1].value.as_ref().and_then(|v| v.downcast::<i32>()), Some(2));
}

/// Disposing the store reverts every property to its default.
#[test]
fn dispose_store_reverts_to_defaults() {
    let (owner, store, x) = setup("X");
    let source = Subject::<i32>::new();
    store.bind(&x, source.clone(), Priority::new(0)).unwrap();
    source.next(3);
    owner.take();

    store.dispose();

    assert_eq!(store.frame_count(), 0);
    assert_eq!(source.subscriber_count(), 0);
    assert_eq!(owner.take(), vec![("X", 3, 0)]);
}

/// The lazily created store is bound to its owner.
#[test]
fn lazy_store_notifies_owner() {
    let owner = Rc::new(Recorder::default());
    let lazy = LazyValueStore::new();
    let x = Property::register("X", PropertyMetadata::new(0));

    lazy.get_or_init(&owner)
        .set_value(&x, 4, Priority::new(0))
        .unwrap();

    assert!(lazy.is_initialized());
    assert_eq!(lazy.get().unwrap().get_value(&x).unwrap(), 4);
    assert_eq!(owner.take(), vec![("X", 0, 4)]);
}
