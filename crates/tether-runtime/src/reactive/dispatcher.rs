#![forbid(unsafe_code)]

//! Dispatch-only handles.
//!
//! A [`Dispatcher<T>`] can issue transitions to a [`BroadcastCell<T>`] but
//! never read it. Each cell creates its dispatcher exactly once, so the handle
//! identity never changes no matter how many dispatches happen: views that
//! only hold a dispatcher have nothing to recompute when the value changes.
//!
//! The handle keeps a weak reference to the cell plus the cell's
//! [`Lifeline`]. Once the cell is destroyed (or simply dropped), every
//! dispatch is a logged no-op returning [`Delivery::Suppressed`].
//!
//! [`BroadcastCell<T>`]: super::BroadcastCell

use std::any::type_name;
use std::fmt;
use std::rc::{Rc, Weak};

use tether_core::lifeline::Lifeline;
use tracing::debug;

use super::cell::{Delivery, Shared};
use crate::error::ScopeError;

/// Action-based transitions for a cell value.
pub trait Reducer<A> {
    /// Produce the next value for `action`. Must be pure.
    fn reduce(&self, action: A) -> Self;
}

struct DispatcherInner<T> {
    target: Weak<Shared<T>>,
    lifeline: Lifeline,
    cell_id: u64,
}

/// Stable dispatch handle for one cell.
///
/// Cloning shares identity: [`Dispatcher::ptr_eq`] holds between every handle
/// obtained from the same cell.
pub struct Dispatcher<T> {
    inner: Rc<DispatcherInner<T>>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cell_id", &self.inner.cell_id)
            .field("live", &self.inner.lifeline.is_alive())
            .finish()
    }
}

impl<T> Dispatcher<T> {
    pub(crate) fn attach(target: Weak<Shared<T>>, lifeline: Lifeline, cell_id: u64) -> Self {
        Self {
            inner: Rc::new(DispatcherInner {
                target,
                lifeline,
                cell_id,
            }),
        }
    }

    /// Whether the target cell can still be mutated.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.lifeline.is_alive() && self.inner.target.strong_count() > 0
    }

    #[must_use]
    pub fn cell_id(&self) -> u64 {
        self.inner.cell_id
    }

    /// Liveness probe of the target cell.
    #[must_use]
    pub fn lifeline(&self) -> &Lifeline {
        &self.inner.lifeline
    }

    /// Whether both handles are the same dispatcher (reference equality).
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T: Clone + PartialEq + 'static> Dispatcher<T> {
    /// Apply a pure transition to the target cell.
    ///
    /// A destroyed target is not an error: the call returns
    /// [`Delivery::Suppressed`] and nothing is mutated.
    pub fn dispatch(&self, f: impl FnOnce(&T) -> T) -> Result<Delivery, ScopeError> {
        if !self.inner.lifeline.is_alive() {
            return Ok(self.suppressed());
        }
        match self.inner.target.upgrade() {
            Some(shared) => shared.dispatch(f),
            None => Ok(self.suppressed()),
        }
    }

    /// Apply `action` through the value's [`Reducer`] impl.
    pub fn send<A>(&self, action: A) -> Result<Delivery, ScopeError>
    where
        T: Reducer<A>,
    {
        self.dispatch(|value| value.reduce(action))
    }

    fn suppressed(&self) -> Delivery {
        debug!(
            cell_id = self.inner.cell_id,
            label = type_name::<T>(),
            "cell.suppressed"
        );
        Delivery::Suppressed
    }
}
