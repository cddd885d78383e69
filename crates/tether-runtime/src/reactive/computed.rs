#![forbid(unsafe_code)]

//! Lazy views derived from one or more cells.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a derive function and its cached result in shared,
//! reference-counted storage. Each source cell gets a subscriber that only
//! flips a dirty flag; the derive function runs on the next
//! [`get()`](Computed::get). This is the explicit stand-in for a framework
//! re-render: the subscriber invalidates, the reader recomputes.
//!
//! # Invariants
//!
//! 1. `get()` never returns a value older than the latest completed dispatch
//!    to any live source.
//! 2. The derive function runs at most once per change cycle (memoization).
//! 3. `version` increments by exactly 1 per recomputation.
//!
//! # Failure Modes
//!
//! - **Source destroyed**: the source drops its subscribers, so the view is
//!   never dirtied again and keeps serving its last cached value. If the view
//!   never computed before the source died, `get()` returns the source's
//!   [`ScopeError::Destroyed`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::cell::{Subscription, ValueCell};
use crate::error::ScopeError;

type Derive<T> = Box<dyn Fn() -> Result<T, ScopeError>>;

struct ComputedInner<T> {
    derive: Derive<T>,
    /// `None` only before the first successful computation.
    cached: Option<T>,
    dirty: Cell<bool>,
    version: u64,
    /// Keeps the dirty-marking callbacks registered.
    _subscriptions: Vec<Subscription>,
}

/// A lazily-evaluated, memoized view over cell values.
///
/// Cloning a `Computed` creates a new handle to the **same** cache.
pub struct Computed<T> {
    inner: Rc<RefCell<ComputedInner<T>>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Computed")
            .field("cached", &inner.cached)
            .field("dirty", &inner.dirty.get())
            .field("version", &inner.version)
            .finish()
    }
}

fn mark_dirty_on_change<S, T>(
    source: &ValueCell<S>,
    inner: &Rc<RefCell<ComputedInner<T>>>,
) -> Subscription
where
    S: Clone + PartialEq + 'static,
    T: 'static,
{
    let weak = Rc::downgrade(inner);
    source.subscribe(move |_| {
        if let Some(strong) = weak.upgrade() {
            // `try_borrow` skips the flag only while a recompute holds the
            // cache, and that recompute reads the fresh value anyway.
            if let Ok(inner) = strong.try_borrow() {
                inner.dirty.set(true);
            }
        }
    })
}

impl<T: Clone + 'static> Computed<T> {
    fn from_derive(derive: Derive<T>) -> Rc<RefCell<ComputedInner<T>>> {
        Rc::new(RefCell::new(ComputedInner {
            derive,
            cached: None,
            dirty: Cell::new(true),
            version: 0,
            _subscriptions: Vec::new(),
        }))
    }

    /// A view derived from a single cell.
    pub fn from_cell<S: Clone + PartialEq + 'static>(
        source: &ValueCell<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let reader = source.clone();
        let inner = Self::from_derive(Box::new(move || reader.with(|v| map(v))));
        let sub = mark_dirty_on_change(source, &inner);
        inner.borrow_mut()._subscriptions.push(sub);
        Self { inner }
    }

    /// A view derived from two cells.
    pub fn from_cells<S1, S2>(
        s1: &ValueCell<S1>,
        s2: &ValueCell<S2>,
        map: impl Fn(&S1, &S2) -> T + 'static,
    ) -> Self
    where
        S1: Clone + PartialEq + 'static,
        S2: Clone + PartialEq + 'static,
    {
        let r1 = s1.clone();
        let r2 = s2.clone();
        let inner = Self::from_derive(Box::new(move || {
            r1.with(|v1| r2.with(|v2| map(v1, v2)))
                .and_then(|derived| derived)
        }));
        let sub1 = mark_dirty_on_change(s1, &inner);
        let sub2 = mark_dirty_on_change(s2, &inner);
        {
            let mut inner_mut = inner.borrow_mut();
            inner_mut._subscriptions.push(sub1);
            inner_mut._subscriptions.push(sub2);
        }
        Self { inner }
    }

    /// A view over an arbitrary derive function and caller-managed
    /// subscriptions. Nothing marks it dirty automatically; use
    /// [`invalidate()`](Self::invalidate).
    pub fn from_fn(derive: impl Fn() -> T + 'static, subscriptions: Vec<Subscription>) -> Self {
        let inner = Self::from_derive(Box::new(move || Ok(derive())));
        inner.borrow_mut()._subscriptions = subscriptions;
        Self { inner }
    }

    fn refresh(&self) -> Result<(), ScopeError> {
        let mut inner = self.inner.borrow_mut();
        if inner.dirty.get() || inner.cached.is_none() {
            match (inner.derive)() {
                Ok(value) => {
                    inner.cached = Some(value);
                    inner.version += 1;
                }
                Err(err) if inner.cached.is_none() => return Err(err),
                // Source gone: freeze on the last good value.
                Err(_) => {}
            }
            inner.dirty.set(false);
        }
        Ok(())
    }

    /// The current derived value, recomputing first if a source changed.
    pub fn get(&self) -> Result<T, ScopeError> {
        self.with(T::clone)
    }

    /// Access the derived value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ScopeError> {
        self.refresh()?;
        let inner = self.inner.borrow();
        Ok(f(inner
            .cached
            .as_ref()
            .expect("cached is always Some after refresh")))
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty.get()
    }

    /// Force the next `get()` to recompute.
    pub fn invalidate(&self) {
        self.inner.borrow().dirty.set(true);
    }

    /// Number of recomputations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }
}
