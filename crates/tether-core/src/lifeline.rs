//! Lifelines: liveness flags tied to a structural scope.
//!
//! A [`Lifeline`] is a cheap, cloneable probe that deferred work checks before
//! touching state owned by a scope. The scope keeps the companion
//! [`LifelineOwner`] and ends it when the scope exits. Anything still holding
//! the probe observes `is_alive() == false` from then on.
//!
//! # Design
//!
//! Lifelines are `Arc` + atomics so a probe can be checked from anywhere,
//! including a continuation resumed long after the scope that issued it is
//! gone. Child lifelines keep a strong reference to their parent: ending a
//! parent ends every child (checked via chain walk), ending a child leaves
//! the parent untouched.
//!
//! # Tracing
//!
//! When the `tracing` feature is active, ending a lifeline emits a `DEBUG`
//! event carrying `lifeline_id`.
//!
//! # Example
//!
//! ```
//! use tether_core::lifeline::Lifeline;
//!
//! let (probe, owner) = Lifeline::root();
//! assert!(probe.is_alive());
//!
//! owner.end();
//! assert!(!probe.is_alive());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// Import tracing macros (no-op when tracing feature is disabled).
#[cfg(feature = "tracing")]
use crate::logging::debug;
#[cfg(not(feature = "tracing"))]
use crate::debug;

// ─── ID generation ───────────────────────────────────────────────────────────

static NEXT_LIFELINE_ID: AtomicU64 = AtomicU64::new(1);

fn next_lifeline_id() -> u64 {
    NEXT_LIFELINE_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Metrics counters ────────────────────────────────────────────────────────

/// Total number of lifelines ended explicitly.
static LIFELINES_ENDED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total count of ended lifelines (for diagnostics).
#[must_use]
pub fn lifelines_ended_total() -> u64 {
    LIFELINES_ENDED_TOTAL.load(Ordering::Relaxed)
}

// ─── Inner shared state ──────────────────────────────────────────────────────

#[derive(Debug)]
struct LifelineInner {
    id: u64,
    ended: AtomicBool,
    parent: Option<Arc<LifelineInner>>,
}

impl LifelineInner {
    fn is_ended(&self) -> bool {
        if self.ended.load(Ordering::Acquire) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_ended(),
            None => false,
        }
    }
}

// ─── Lifeline ────────────────────────────────────────────────────────────────

/// Liveness probe for a scope.
///
/// Cheaply cloneable. Check `is_alive()` (or `check()`) immediately before any
/// deferred mutation of scope-owned state.
#[derive(Clone, Debug)]
pub struct Lifeline {
    inner: Arc<LifelineInner>,
}

impl Lifeline {
    /// Create a root lifeline with no parent.
    #[must_use]
    pub fn root() -> (Self, LifelineOwner) {
        Self::new_inner(None)
    }

    /// Derive a child lifeline. It ends when either it or any ancestor ends.
    #[must_use]
    pub fn child(&self) -> (Self, LifelineOwner) {
        Self::new_inner(Some(Arc::clone(&self.inner)))
    }

    fn new_inner(parent: Option<Arc<LifelineInner>>) -> (Self, LifelineOwner) {
        let inner = Arc::new(LifelineInner {
            id: next_lifeline_id(),
            ended: AtomicBool::new(false),
            parent,
        });
        let probe = Self {
            inner: Arc::clone(&inner),
        };
        (probe, LifelineOwner { inner })
    }

    /// Unique identifier for this lifeline (for tracing/logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether neither this lifeline nor any ancestor has ended.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.inner.is_ended()
    }

    /// Whether two probes refer to the same lifeline.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Return `Err` once the lifeline (or an ancestor) has ended.
    ///
    /// Intended for use at resumption points:
    /// ```ignore
    /// lifeline.check()?;
    /// // ... mutate scope-owned state ...
    /// ```
    pub fn check(&self) -> Result<(), LifelineError> {
        if self.inner.is_ended() {
            return Err(LifelineError::Ended { id: self.inner.id });
        }
        Ok(())
    }
}

// ─── LifelineOwner ───────────────────────────────────────────────────────────

/// Ending handle for a [`Lifeline`].
///
/// Held by the scope that owns the state. Dropping the owner does **not** end
/// the lifeline; ending is always explicit.
#[derive(Debug)]
pub struct LifelineOwner {
    inner: Arc<LifelineInner>,
}

impl LifelineOwner {
    /// End the associated lifeline.
    ///
    /// Returns `true` if this call ended it, `false` if it had already ended.
    /// All probes (and children) observe `is_alive() == false` afterwards.
    pub fn end(&self) -> bool {
        let was_ended = self.inner.ended.swap(true, Ordering::AcqRel);
        if !was_ended {
            LIFELINES_ENDED_TOTAL.fetch_add(1, Ordering::Relaxed);
            debug!(lifeline_id = self.inner.id, "lifeline ended");
        }
        !was_ended
    }

    /// Whether this lifeline itself has been ended (ignores ancestors).
    #[inline]
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// A fresh probe for this lifeline.
    #[must_use]
    pub fn lifeline(&self) -> Lifeline {
        Lifeline {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Identifier shared with every probe of this lifeline.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

// ─── LifelineError ───────────────────────────────────────────────────────────

/// Error returned by [`Lifeline::check`] once the scope is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifelineError {
    /// The lifeline (or one of its ancestors) has ended.
    Ended {
        /// Identifier of the probed lifeline.
        id: u64,
    },
}

impl std::fmt::Display for LifelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ended { id } => write!(f, "lifeline {id} has ended"),
        }
    }
}

impl std::error::Error for LifelineError {}

// ─── Tests ───────────────────────────────────────────────────────────────────
