#![forbid(unsafe_code)]

//! Broadcast cells: one authoritative value plus its subscribers.
//!
//! # Design
//!
//! [`BroadcastCell<T>`] wraps the value in shared, reference-counted storage
//! together with the subscriber list and a [`Lifeline`]. Every mutation goes
//! through a pure transition `&T -> T`. When the transition produces a value
//! different from the current one, the version is bumped and every live
//! subscriber is notified with a snapshot of the new value.
//!
//! # Invariants
//!
//! 1. Exactly one authoritative copy of the value exists per live cell.
//! 2. Version increments exactly once per dispatch that changes the value.
//! 3. Subscribers are notified in registration order, and every subscriber in
//!    one round observes the same version.
//! 4. A dispatch issued from inside a subscriber callback is applied
//!    immediately; its notification is folded into one extra round after the
//!    current round finishes.
//! 5. After [`destroy()`](BroadcastCell::destroy) no dispatch mutates the cell;
//!    each attempt is reported as [`Delivery::Suppressed`]. A destroy issued
//!    by a subscriber ends the current round; later subscribers are skipped.
//!
//! # Failure Modes
//!
//! - **Subscriber keeps re-dispatching**: rounds are capped at
//!   [`CellConfig::max_notify_rounds`]; the overflow is logged at `WARN` and
//!   the remaining rounds are dropped. The value itself is current, but
//!   subscribers may hold a stale snapshot until the next change.
//! - **Dispatch inside `with()`**: the value is borrowed, so the dispatch
//!   fails with [`ScopeError::Reentrant`] instead of panicking.

use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tether_core::lifeline::{Lifeline, LifelineOwner};
use tracing::{debug, trace, warn};

use super::dispatcher::{Dispatcher, Reducer};
use crate::error::ScopeError;

/// Default cap on notification rounds triggered by a single dispatch.
pub const DEFAULT_MAX_NOTIFY_ROUNDS: usize = 32;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Construction options for a [`BroadcastCell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConfig {
    /// Human-readable label used in log events. Defaults to the value type name.
    pub label: Option<String>,
    /// Upper bound on notification rounds per dispatch (at least 1).
    ///
    /// Once the cap is hit the remaining re-notify is dropped: `read()`
    /// returns the newest value, but subscribers keep the last snapshot they
    /// were sent until the next dispatch that changes the value.
    pub max_notify_rounds: usize,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_notify_rounds: DEFAULT_MAX_NOTIFY_ROUNDS,
        }
    }
}

impl CellConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_max_notify_rounds(mut self, rounds: usize) -> Self {
        self.max_notify_rounds = rounds.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// What happened to a dispatched transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The value changed; subscribers were notified at this version.
    Applied { version: u64 },
    /// The transition returned an equal value. No version bump, no notification.
    Unchanged,
    /// The cell is gone. Nothing was mutated.
    Suppressed,
}

impl Delivery {
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    #[must_use]
    pub fn is_suppressed(self) -> bool {
        matches!(self, Self::Suppressed)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for a subscriber callback.
///
/// The cell only keeps a weak reference to the callback; dropping the guard
/// removes it before the next notification round.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cell_id: u64,
    _callback: Box<dyn Any>,
}

impl Subscription {
    fn new<T: 'static>(cell_id: u64, callback: Rc<dyn Fn(&T)>) -> Self {
        Self {
            cell_id,
            _callback: Box::new(callback),
        }
    }

    /// Identifier of the cell this subscription listens to.
    #[must_use]
    pub fn cell_id(&self) -> u64 {
        self.cell_id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cell_id", &self.cell_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Shared interior
// ---------------------------------------------------------------------------

/// Shared interior for [`BroadcastCell<T>`], [`ValueCell<T>`] and (weakly)
/// [`Dispatcher<T>`].
pub(crate) struct Shared<T> {
    /// `None` once destroyed.
    value: RefCell<Option<T>>,
    version: Cell<u64>,
    subscribers: RefCell<Vec<Weak<dyn Fn(&T)>>>,
    notifying: Cell<bool>,
    renotify: Cell<bool>,
    label: Option<String>,
    max_notify_rounds: usize,
    lifeline: Lifeline,
    owner: LifelineOwner,
    /// Created once; every `dispatcher()` call hands out a clone of it.
    dispatcher: Dispatcher<T>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.owner.end();
    }
}

/// Resets the notification flags even if a subscriber panics.
struct NotifyGuard<'a> {
    notifying: &'a Cell<bool>,
    renotify: &'a Cell<bool>,
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.notifying.set(false);
        self.renotify.set(false);
    }
}

impl<T: Clone + PartialEq + 'static> Shared<T> {
    fn id(&self) -> u64 {
        self.owner.id()
    }

    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(type_name::<T>())
    }

    fn is_live(&self) -> bool {
        self.lifeline.is_alive()
    }

    fn destroyed_error(&self) -> ScopeError {
        ScopeError::Destroyed {
            cell_id: self.id(),
            type_name: type_name::<T>(),
        }
    }

    fn suppressed(&self) -> Delivery {
        debug!(cell_id = self.id(), label = self.label(), "cell.suppressed");
        Delivery::Suppressed
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ScopeError> {
        if !self.is_live() {
            return Err(self.destroyed_error());
        }
        let guard = self.value.borrow();
        match guard.as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(self.destroyed_error()),
        }
    }

    pub(crate) fn dispatch(&self, f: impl FnOnce(&T) -> T) -> Result<Delivery, ScopeError> {
        if !self.is_live() {
            return Ok(self.suppressed());
        }

        let next = {
            let guard = self.value.borrow();
            let Some(current) = guard.as_ref() else {
                return Ok(self.suppressed());
            };
            let next = f(current);
            if next == *current {
                trace!(cell_id = self.id(), label = self.label(), "cell.unchanged");
                return Ok(Delivery::Unchanged);
            }
            next
        };

        {
            let mut slot = self
                .value
                .try_borrow_mut()
                .map_err(|_| ScopeError::Reentrant { cell_id: self.id() })?;
            // The transition itself may have torn the scope down.
            if slot.is_none() || !self.is_live() {
                drop(slot);
                return Ok(self.suppressed());
            }
            *slot = Some(next);
        }

        let version = self.version.get() + 1;
        self.version.set(version);
        trace!(
            cell_id = self.id(),
            label = self.label(),
            version,
            "cell.dispatch"
        );
        self.notify();
        Ok(Delivery::Applied { version })
    }

    fn notify(&self) {
        if self.notifying.get() {
            self.renotify.set(true);
            return;
        }
        self.notifying.set(true);
        let _guard = NotifyGuard {
            notifying: &self.notifying,
            renotify: &self.renotify,
        };

        let mut rounds = 0usize;
        loop {
            rounds += 1;
            let snapshot = match self.value.borrow().as_ref() {
                Some(value) => value.clone(),
                None => break,
            };
            let callbacks: Vec<Rc<dyn Fn(&T)>> = {
                let mut subscribers = self.subscribers.borrow_mut();
                subscribers.retain(|weak| weak.strong_count() > 0);
                subscribers.iter().filter_map(Weak::upgrade).collect()
            };
            for callback in &callbacks {
                // A subscriber may have destroyed the cell mid-round.
                if !self.is_live() {
                    return;
                }
                callback(&snapshot);
            }

            if !self.renotify.replace(false) {
                break;
            }
            if rounds >= self.max_notify_rounds {
                warn!(
                    cell_id = self.id(),
                    label = self.label(),
                    rounds,
                    "cell notification rounds exhausted; dropping re-notify"
                );
                break;
            }
        }
    }

    fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<dyn Fn(&T)> = Rc::new(callback);
        if self.is_live() {
            self.subscribers.borrow_mut().push(Rc::downgrade(&strong));
        }
        Subscription::new(self.id(), strong)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn destroy(&self) -> bool {
        if !self.owner.end() {
            return false;
        }
        // A destroy issued from inside `with()` leaves the slot in place; the
        // ended lifeline already blocks every later read and dispatch.
        let released = self.value.try_borrow_mut().ok().and_then(|mut v| v.take());
        if let Ok(mut subscribers) = self.subscribers.try_borrow_mut() {
            subscribers.clear();
        }
        debug!(cell_id = self.id(), label = self.label(), "cell.destroyed");
        drop(released);
        true
    }
}

// ---------------------------------------------------------------------------
// BroadcastCell
// ---------------------------------------------------------------------------

/// A shared value that broadcasts every change to its subscribers.
///
/// Cloning a `BroadcastCell` creates a new handle to the **same** cell.
/// The cell is destroyed by [`destroy()`](Self::destroy) or when the last
/// strong handle (`BroadcastCell`, [`ValueCell`]) is dropped.
pub struct BroadcastCell<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for BroadcastCell<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for BroadcastCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastCell")
            .field("id", &self.shared.id())
            .field("value", &*self.shared.value.borrow())
            .field("version", &self.shared.version.get())
            .field("live", &self.shared.is_live())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> BroadcastCell<T> {
    /// Create a live cell holding `initial`, with no subscribers.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::with_config(initial, CellConfig::default())
    }

    #[must_use]
    pub fn with_config(initial: T, config: CellConfig) -> Self {
        Self::build(initial, config, Lifeline::root())
    }

    /// Create a cell whose lifetime is nested inside `parent`: ending the
    /// parent lifeline also ends this cell.
    #[must_use]
    pub fn within(parent: &Lifeline, initial: T, config: CellConfig) -> Self {
        Self::build(initial, config, parent.child())
    }

    fn build(initial: T, config: CellConfig, (lifeline, owner): (Lifeline, LifelineOwner)) -> Self {
        let shared = Rc::new_cyclic(|weak| Shared {
            value: RefCell::new(Some(initial)),
            version: Cell::new(0),
            subscribers: RefCell::new(Vec::new()),
            notifying: Cell::new(false),
            renotify: Cell::new(false),
            label: config.label,
            max_notify_rounds: config.max_notify_rounds.max(1),
            dispatcher: Dispatcher::attach(weak.clone(), lifeline.clone(), owner.id()),
            lifeline,
            owner,
        });
        debug!(cell_id = shared.id(), label = shared.label(), "cell.created");
        Self { shared }
    }

    /// A clone of the current value.
    pub fn read(&self) -> Result<T, ScopeError> {
        self.shared.with(T::clone)
    }

    /// Access the current value by reference without cloning.
    ///
    /// Dispatching to this cell from inside `f` fails with
    /// [`ScopeError::Reentrant`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ScopeError> {
        self.shared.with(f)
    }

    /// Apply a pure transition to the value.
    pub fn dispatch(&self, f: impl FnOnce(&T) -> T) -> Result<Delivery, ScopeError> {
        self.shared.dispatch(f)
    }

    /// Apply `action` through the value's [`Reducer`] impl.
    pub fn send<A>(&self, action: A) -> Result<Delivery, ScopeError>
    where
        T: Reducer<A>,
    {
        self.shared.dispatch(|value| value.reduce(action))
    }

    /// Replace the value outright.
    pub fn set(&self, value: T) -> Result<Delivery, ScopeError> {
        self.shared.dispatch(move |_| value)
    }

    /// Register a callback run after every change, in registration order.
    ///
    /// Subscribing to a destroyed cell returns an inert guard.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.shared.subscribe(callback)
    }

    /// Invalidate the cell. Returns `false` if it was already destroyed.
    ///
    /// The value and all subscribers are released. Outstanding
    /// [`Dispatcher`]s turn into no-ops.
    pub fn destroy(&self) -> bool {
        self.shared.destroy()
    }

    /// The stable dispatch-only handle of this cell.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher<T> {
        self.shared.dispatcher.clone()
    }

    /// A read/subscribe-only handle to this cell.
    #[must_use]
    pub fn value_cell(&self) -> ValueCell<T> {
        ValueCell {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Split into the value half and the dispatch half.
    #[must_use]
    pub fn split(&self) -> (ValueCell<T>, Dispatcher<T>) {
        (self.value_cell(), self.dispatcher())
    }

    /// Liveness probe for deferred work.
    #[must_use]
    pub fn lifeline(&self) -> Lifeline {
        self.shared.lifeline.clone()
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id()
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.shared.label()
    }

    /// Number of value changes applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.version.get()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }
}

// ---------------------------------------------------------------------------
// ValueCell
// ---------------------------------------------------------------------------

/// Read/subscribe half of a split [`BroadcastCell`].
///
/// Holders of a `ValueCell` recompute when the value changes; they cannot
/// dispatch.
pub struct ValueCell<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("id", &self.shared.id())
            .field("value", &*self.shared.value.borrow())
            .field("version", &self.shared.version.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> ValueCell<T> {
    pub fn read(&self) -> Result<T, ScopeError> {
        self.shared.with(T::clone)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ScopeError> {
        self.shared.with(f)
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.shared.subscribe(callback)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.version.get()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    #[must_use]
    pub fn lifeline(&self) -> Lifeline {
        self.shared.lifeline.clone()
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.shared, &b.shared)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn new_cell_reads_initial() {
        let cell = BroadcastCell::new(42);
        assert_eq!(cell.read(), Ok(42));
        assert_eq!(cell.version(), 0);
        assert_eq!(cell.subscriber_count(), 0);
        assert!(cell.is_live());
    }

    #[test]
    fn dispatch_applies_transition() {
        let cell = BroadcastCell::new(10);
        assert_eq!(cell.dispatch(|v| v + 5), Ok(Delivery::Applied { version: 1 }));
        assert_eq!(cell.read(), Ok(15));
        assert_eq!(cell.dispatch(|v| v * 2), Ok(Delivery::Applied { version: 2 }));
        assert_eq!(cell.read(), Ok(30));
    }

    #[test]
    fn equal_result_is_unchanged() {
        let cell = BroadcastCell::new(7);
        let calls = Rc::new(Cell::new(0u32));
        let calls_clone = Rc::clone(&calls);
        let _sub = cell.subscribe(move |_| calls_clone.set(calls_clone.get() + 1));

        assert_eq!(cell.set(7), Ok(Delivery::Unchanged));
        assert_eq!(cell.version(), 0);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn subscribers_notified_in_order() {
        let cell = BroadcastCell::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_a = Rc::clone(&log);
        let _a = cell.subscribe(move |v| log_a.borrow_mut().push(("a", *v)));
        let log_b = Rc::clone(&log);
        let _b = cell.subscribe(move |v| log_b.borrow_mut().push(("b", *v)));

        cell.set(1).expect("live cell");
        cell.set(2).expect("live cell");
        assert_eq!(
            *log.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn dropped_subscription_is_not_called() {
        let cell = BroadcastCell::new(0);
        let calls = Rc::new(Cell::new(0u32));
        let calls_clone = Rc::clone(&calls);
        let sub = cell.subscribe(move |_| calls_clone.set(calls_clone.get() + 1));
        assert_eq!(cell.subscriber_count(), 1);

        cell.set(1).expect("live cell");
        drop(sub);
        cell.set(2).expect("live cell");

        assert_eq!(calls.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn reentrant_dispatch_gets_one_extra_round() {
        let cell = BroadcastCell::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        // First subscriber clamps odd values up to the next even number.
        let clamp = cell.dispatcher();
        let _clamp = cell.subscribe(move |v| {
            if v % 2 == 1 {
                clamp.dispatch(|v| v + 1).expect("live cell");
            }
        });
        let seen_clone = Rc::clone(&seen);
        let _watch = cell.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        cell.set(3).expect("live cell");
        assert_eq!(cell.read(), Ok(4));
        // Round one delivers 3 to everyone, round two delivers 4.
        assert_eq!(*seen.borrow(), vec![3, 4]);
        assert_eq!(cell.version(), 2);
    }

    #[test]
    fn runaway_subscriber_is_bounded() {
        let cell = BroadcastCell::with_config(0u64, CellConfig::new().with_max_notify_rounds(4));
        let rounds = Rc::new(Cell::new(0u32));
        let rounds_clone = Rc::clone(&rounds);
        let bump = cell.dispatcher();
        let _sub = cell.subscribe(move |_| {
            rounds_clone.set(rounds_clone.get() + 1);
            bump.dispatch(|v| v + 1).expect("live cell");
        });

        cell.set(1).expect("live cell");
        assert_eq!(rounds.get(), 4);
        // Each round applied its dispatch even though delivery stopped.
        assert_eq!(cell.read(), Ok(5));
    }

    #[test]
    fn panicking_subscriber_does_not_leak_renotify() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let cell = BroadcastCell::new(0);
        let bump = cell.dispatcher();
        let _boom = cell.subscribe(move |v| {
            if *v == 1 {
                bump.dispatch(|_| 2).expect("live cell");
                panic!("subscriber failed");
            }
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _watch = cell.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        let result = catch_unwind(AssertUnwindSafe(|| cell.set(1)));
        assert!(result.is_err());
        assert_eq!(cell.read(), Ok(2));
        assert!(seen.borrow().is_empty());

        cell.set(10).expect("live cell");
        assert_eq!(*seen.borrow(), vec![10]);
    }

    #[test]
    fn destroy_from_subscriber_ends_round() {
        let cell = BroadcastCell::new(0);
        let killer = cell.clone();
        let _first = cell.subscribe(move |_| {
            killer.destroy();
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _second = cell.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        assert_eq!(cell.set(1), Ok(Delivery::Applied { version: 1 }));
        assert!(!cell.is_live());
        assert!(seen.borrow().is_empty());
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn dispatch_inside_with_is_reentrant_error() {
        let cell = BroadcastCell::new(1);
        let result = cell.with(|_| cell.dispatch(|v| v + 1)).expect("live cell");
        assert_eq!(result, Err(ScopeError::Reentrant { cell_id: cell.id() }));
        assert_eq!(cell.read(), Ok(1));
    }

    #[test]
    fn destroy_invalidates_reads_and_suppresses_dispatch() {
        let cell = BroadcastCell::new(String::from("alive"));
        let dispatcher = cell.dispatcher();
        assert!(cell.destroy());
        assert!(!cell.destroy());
        assert!(!cell.is_live());

        assert!(matches!(cell.read(), Err(ScopeError::Destroyed { .. })));
        assert_eq!(
            cell.dispatch(|_| String::from("zombie")),
            Ok(Delivery::Suppressed)
        );
        assert_eq!(
            dispatcher.dispatch(|_| String::from("zombie")),
            Ok(Delivery::Suppressed)
        );
    }

    #[test]
    fn destroy_drops_subscribers() {
        let cell = BroadcastCell::new(0);
        let _sub = cell.subscribe(|_| {});
        cell.destroy();
        assert_eq!(cell.subscriber_count(), 0);
        let late = cell.subscribe(|_| {});
        assert_eq!(late.cell_id(), cell.id());
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn dropping_last_handle_ends_lifeline() {
        let cell = BroadcastCell::new(5);
        let dispatcher = cell.dispatcher();
        let lifeline = cell.lifeline();
        drop(cell);
        assert!(!lifeline.is_alive());
        assert!(!dispatcher.is_live());
        assert_eq!(dispatcher.dispatch(|v| v + 1), Ok(Delivery::Suppressed));
    }

    #[test]
    fn nested_cell_dies_with_parent() {
        let outer = BroadcastCell::new(0u8);
        let inner = BroadcastCell::within(&outer.lifeline(), 1u8, CellConfig::default());
        outer.destroy();
        assert!(!inner.is_live());
        assert!(matches!(inner.read(), Err(ScopeError::Destroyed { .. })));
        assert_eq!(inner.dispatch(|v| v + 1), Ok(Delivery::Suppressed));
    }

    #[test]
    fn split_halves_share_state() {
        let cell = BroadcastCell::new(1);
        let (value, dispatcher) = cell.split();
        dispatcher.dispatch(|v| v + 1).expect("live cell");
        assert_eq!(value.read(), Ok(2));
        assert_eq!(value.version(), 1);
        assert!(ValueCell::ptr_eq(&value, &cell.value_cell()));
    }

    #[test]
    fn label_defaults_to_type_name() {
        let plain = BroadcastCell::new(0i32);
        assert_eq!(plain.label(), "i32");
        let named = BroadcastCell::with_config(0i32, CellConfig::new().with_label("counter"));
        assert_eq!(named.label(), "counter");
    }

    #[test]
    fn config_clamps_rounds() {
        assert_eq!(CellConfig::new().with_max_notify_rounds(0).max_notify_rounds, 1);
        assert_eq!(CellConfig::default().max_notify_rounds, DEFAULT_MAX_NOTIFY_ROUNDS);
    }

    #[test]
    fn debug_format() {
        let cell = BroadcastCell::new(42);
        let dbg = format!("{cell:?}");
        assert!(dbg.contains("BroadcastCell"));
        assert!(dbg.contains("42"));
    }
}
