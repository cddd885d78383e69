#![forbid(unsafe_code)]

//! Scoped broadcast cells for Tether.
//!
//! - [`reactive`]: the [`BroadcastCell`], its [`Dispatcher`] handle, ambient
//!   scopes, and [`Computed`] views.
//! - [`optimistic`]: the optimistic-update reducer and the update helper.
//! - [`backend`]: the backend seam and a simulated backend.
//! - [`executor`]: a single-threaded cooperative executor.
//! - [`profile`]: the user-profile domain used by the demo.

pub mod backend;
pub mod error;
pub mod executor;
pub mod optimistic;
pub mod profile;
pub mod reactive;

pub use error::{ScopeError, UpdateError, UpdateRejected};
pub use reactive::{
    BroadcastCell, CellConfig, Computed, Delivery, Dispatcher, Reducer, Subscription, ValueCell,
    scope,
};
