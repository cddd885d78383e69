#![forbid(unsafe_code)]

//! Scoped reactive state.
//!
//! - [`BroadcastCell`]: one authoritative value plus its subscribers, with a
//!   version counter and an explicit `destroy()`.
//! - [`ValueCell`] / [`Dispatcher`]: the read half and the stable dispatch
//!   half of a split cell.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`Computed`]: a lazily-evaluated, memoized view over one or more cells.
//! - [`scope`]: thread-local providers so deep call trees can reach a cell
//!   without parameter threading.
//!
//! # Architecture
//!
//! Cells use `Rc` plus interior mutability for single-threaded shared
//! ownership. Subscribers are stored as `Weak` callbacks and pruned lazily
//! during notification. Dispatchers hold only a `Weak` reference and the
//! cell's lifeline, so deferred work can never resurrect a destroyed cell.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per dispatch that changes the value.
//! 2. Subscribers are notified in registration order; one round delivers one
//!    version to all of them.
//! 3. A transition returning an equal value is a no-op (no version bump, no
//!    notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next round.
//! 5. A cell's [`Dispatcher`] identity never changes.
//! 6. Nothing mutates a cell after `destroy()`.

pub mod cell;
pub mod computed;
pub mod dispatcher;
pub mod scope;

pub use cell::{
    BroadcastCell, CellConfig, DEFAULT_MAX_NOTIFY_ROUNDS, Delivery, Subscription, ValueCell,
};
pub use computed::Computed;
pub use dispatcher::{Dispatcher, Reducer};
