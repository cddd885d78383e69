#![forbid(unsafe_code)]

//! Optimistic updates over a broadcast cell.
//!
//! An update is applied speculatively the moment it is issued, confirmed when
//! the backend accepts it, and reverted when the backend rejects it. Every
//! request walks the same small state machine:
//!
//! ```text
//!   idle ──Start──▶ pending ──Finish──▶ confirmed
//!                       │
//!                       └────Fail────▶ failed (patch reverted)
//! ```
//!
//! Several requests may be in flight at once. [`Optimistic<T>`] keeps the
//! last confirmed value plus the ordered list of outstanding patches; the
//! visible value is the confirmed value with every outstanding patch folded
//! on top. Acknowledged patches drain into the confirmed value strictly in
//! issue order, so a late acknowledgement of an early request never
//! overrides a newer one. Failing a request drops its patch; later patches
//! still apply.
//!
//! # Invariants
//!
//! 1. `current()` == fold of outstanding patches over `confirmed`, in issue
//!    order.
//! 2. A failed request never stays outstanding; a confirmed one stays only
//!    until every earlier request has settled.
//! 3. `Finish`/`Fail` for an unknown ID is a no-op (duplicate or late
//!    completion).
//! 4. Completions arriving after the cell is destroyed never dispatch.
//! 5. Dropping an unsettled [`PendingUpdate`] fails its request with
//!    [`CANCELLED_REASON`], so the patch never stays speculative.

pub mod request;

use std::fmt;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::{ScopeError, UpdateError, UpdateRejected};
use crate::reactive::{Dispatcher, Reducer};

pub use request::{RequestId, RequestMetadata, RequestSource, UpdateRequest};

/// A value that can absorb a partial update.
pub trait Patchable: Clone + PartialEq + 'static {
    /// Partial update description (e.g., "set tagline to X").
    type Patch: Clone + PartialEq + fmt::Debug + 'static;

    /// Return a copy of `self` with `patch` applied. Must be pure.
    fn apply(&self, patch: &Self::Patch) -> Self;
}

/// Transition table input for [`Optimistic<T>`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction<P> {
    /// Apply `patch` speculatively and mark `id` pending.
    Start { id: RequestId, patch: P },
    /// The backend accepted `id`.
    Finish { id: RequestId },
    /// The backend rejected `id`; revert its patch.
    Fail { id: RequestId, reason: String },
    /// A local-only edit, applied straight to the confirmed value.
    Local(P),
}

/// Where a request (or the cell as a whole) sits in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UpdatePhase {
    #[default]
    Idle,
    Pending,
    Confirmed,
    Failed,
}

/// How the most recent request settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Confirmed(RequestId),
    Failed { id: RequestId, reason: String },
}

impl Settled {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Confirmed(id) | Self::Failed { id, .. } => *id,
        }
    }
}

/// A speculative patch not yet folded into the confirmed value.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPatch<P> {
    pub id: RequestId,
    pub patch: P,
    /// The backend accepted it; waiting on an earlier request.
    pub acknowledged: bool,
}

/// Confirmed value, in-flight patches, and the last settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimistic<T: Patchable> {
    confirmed: T,
    pending: Vec<PendingPatch<T::Patch>>,
    last: Option<Settled>,
}

impl<T: Patchable> Optimistic<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            confirmed: value,
            pending: Vec::new(),
            last: None,
        }
    }

    /// The last value the backend acknowledged.
    #[must_use]
    pub fn confirmed(&self) -> &T {
        &self.confirmed
    }

    /// The visible value: confirmed plus every pending patch, in issue order.
    #[must_use]
    pub fn current(&self) -> T {
        self.pending
            .iter()
            .fold(self.confirmed.clone(), |value, pending| {
                value.apply(&pending.patch)
            })
    }

    /// Outstanding patches in issue order, acknowledged or not.
    #[must_use]
    pub fn pending(&self) -> &[PendingPatch<T::Patch>] {
        &self.pending
    }

    /// Whether any request is still waiting on the backend.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.iter().any(|p| !p.acknowledged)
    }

    #[must_use]
    pub fn last_settled(&self) -> Option<&Settled> {
        self.last.as_ref()
    }

    /// Reason of the most recent settlement, if it failed.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        match &self.last {
            Some(Settled::Failed { reason, .. }) => Some(reason),
            _ => None,
        }
    }

    /// Overall phase: pending while anything is in flight, otherwise the
    /// outcome of the most recent settlement.
    #[must_use]
    pub fn phase(&self) -> UpdatePhase {
        if self.is_pending() {
            return UpdatePhase::Pending;
        }
        match &self.last {
            None => UpdatePhase::Idle,
            Some(Settled::Confirmed(_)) => UpdatePhase::Confirmed,
            Some(Settled::Failed { .. }) => UpdatePhase::Failed,
        }
    }

    /// Phase of one request. Requests that are neither in flight nor the most
    /// recent settlement report `Idle`.
    #[must_use]
    pub fn phase_of(&self, id: RequestId) -> UpdatePhase {
        if let Some(p) = self.pending.iter().find(|p| p.id == id) {
            return if p.acknowledged {
                UpdatePhase::Confirmed
            } else {
                UpdatePhase::Pending
            };
        }
        match &self.last {
            Some(Settled::Confirmed(last)) if *last == id => UpdatePhase::Confirmed,
            Some(Settled::Failed { id: last, .. }) if *last == id => UpdatePhase::Failed,
            _ => UpdatePhase::Idle,
        }
    }

    /// Apply `f` to the confirmed value, keeping pending patches on top.
    #[must_use]
    pub fn map_confirmed(&self, f: impl FnOnce(&T) -> T) -> Self {
        Self {
            confirmed: f(&self.confirmed),
            pending: self.pending.clone(),
            last: self.last.clone(),
        }
    }

    fn position_unacked(&self, id: RequestId) -> Option<usize> {
        self.pending
            .iter()
            .position(|p| p.id == id && !p.acknowledged)
    }

    /// Fold the acknowledged prefix into the confirmed value.
    fn drain_acknowledged(&mut self) {
        let settled = self
            .pending
            .iter()
            .take_while(|p| p.acknowledged)
            .count();
        for p in self.pending.drain(..settled) {
            self.confirmed = self.confirmed.apply(&p.patch);
        }
    }
}

impl<T: Patchable> Reducer<UpdateAction<T::Patch>> for Optimistic<T> {
    fn reduce(&self, action: UpdateAction<T::Patch>) -> Self {
        let mut next = self.clone();
        match action {
            UpdateAction::Start { id, patch } => {
                next.pending.push(PendingPatch {
                    id,
                    patch,
                    acknowledged: false,
                });
            }
            UpdateAction::Finish { id } => {
                if let Some(index) = next.position_unacked(id) {
                    next.pending[index].acknowledged = true;
                    next.drain_acknowledged();
                    next.last = Some(Settled::Confirmed(id));
                }
            }
            UpdateAction::Fail { id, reason } => {
                if let Some(index) = next.position_unacked(id) {
                    next.pending.remove(index);
                    next.drain_acknowledged();
                    next.last = Some(Settled::Failed { id, reason });
                }
            }
            UpdateAction::Local(patch) => {
                next.confirmed = next.confirmed.apply(&patch);
            }
        }
        next
    }
}

/// How an update finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum UpdateOutcome {
    /// The backend accepted the patch and the cell now holds it as confirmed.
    Confirmed { id: RequestId },
    /// The owning scope ended first; the cell was left untouched.
    Detached { id: RequestId },
}

impl UpdateOutcome {
    #[must_use]
    pub fn id(self) -> RequestId {
        match self {
            Self::Confirmed { id } | Self::Detached { id } => id,
        }
    }
}

/// An in-flight update. Drive it on an [`Executor`](crate::executor::Executor).
pub type PendingUpdate = LocalBoxFuture<'static, Result<UpdateOutcome, UpdateError>>;

/// Run the optimistic protocol for one request.
///
/// Dispatches `Start` synchronously, so the speculative value is visible as
/// soon as this returns. The returned future awaits the backend, checks that
/// the cell is still live, then dispatches `Finish` or `Fail`.
///
/// `current` is the value the request was issued against; the backend
/// receives it with the patch applied as the record to persist.
///
/// # Errors
///
/// The synchronous part fails with [`ScopeError`] if `Start` cannot be
/// dispatched (for instance from inside the cell's `with()`). The future
/// resolves to [`UpdateError::Rejected`] when the backend refuses the patch;
/// by then the patch has been reverted and the cell marked failed.
///
/// Dropping the future before it resolves reverts the patch as a failure
/// with reason [`CANCELLED_REASON`].
pub fn update<T, B>(
    dispatcher: &Dispatcher<Optimistic<T>>,
    current: &Optimistic<T>,
    request: UpdateRequest<T::Patch>,
    backend: &B,
) -> Result<PendingUpdate, ScopeError>
where
    T: Patchable,
    B: Backend<T> + ?Sized,
{
    let id = request.id();
    let start = dispatcher.send(UpdateAction::Start {
        id,
        patch: request.patch().clone(),
    })?;
    if start.is_suppressed() {
        return Ok(future::ready(Ok(UpdateOutcome::Detached { id })).boxed_local());
    }
    debug!(
        request = %id,
        description = %request.metadata().description,
        "update.start"
    );

    let preview = current.current().apply(request.patch());
    let submission = backend.submit(&request, &preview);
    Ok(settle(dispatcher.clone(), id, submission).boxed_local())
}

/// Reason recorded when an in-flight update is dropped before it settles.
pub const CANCELLED_REASON: &str = "cancelled";

/// Fails the request if the settle future is dropped before it settles.
struct SettleGuard<T: Patchable> {
    dispatcher: Dispatcher<Optimistic<T>>,
    id: RequestId,
    armed: bool,
}

impl<T: Patchable> SettleGuard<T> {
    fn disarm(&mut self) -> &Dispatcher<Optimistic<T>> {
        self.armed = false;
        &self.dispatcher
    }
}

impl<T: Patchable> Drop for SettleGuard<T> {
    fn drop(&mut self) {
        if !self.armed || !self.dispatcher.is_live() {
            return;
        }
        debug!(request = %self.id, "update.cancelled");
        if let Err(err) = self.dispatcher.send(UpdateAction::Fail {
            id: self.id,
            reason: CANCELLED_REASON.to_string(),
        }) {
            warn!(request = %self.id, error = %err, "cancelled update could not be reverted");
        }
    }
}

async fn settle<T: Patchable>(
    dispatcher: Dispatcher<Optimistic<T>>,
    id: RequestId,
    submission: LocalBoxFuture<'static, Result<(), UpdateRejected>>,
) -> Result<UpdateOutcome, UpdateError> {
    let mut guard = SettleGuard {
        dispatcher,
        id,
        armed: true,
    };
    let result = submission.await;
    let dispatcher = guard.disarm();
    if !dispatcher.is_live() {
        debug!(request = %id, "update.detached");
        result?;
        return Ok(UpdateOutcome::Detached { id });
    }
    match result {
        Ok(()) => {
            if dispatcher.send(UpdateAction::Finish { id })?.is_suppressed() {
                return Ok(UpdateOutcome::Detached { id });
            }
            debug!(request = %id, "update.confirmed");
            Ok(UpdateOutcome::Confirmed { id })
        }
        Err(rejected) => {
            info!(request = %id, reason = %rejected.reason, "update.rejected");
            dispatcher.send(UpdateAction::Fail {
                id,
                reason: rejected.reason.clone(),
            })?;
            Err(rejected.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        title: String,
        body: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum NotePatch {
        Title(String),
        Body(String),
    }

    impl Patchable for Note {
        type Patch = NotePatch;

        fn apply(&self, patch: &NotePatch) -> Self {
            let mut next = self.clone();
            match patch {
                NotePatch::Title(t) => next.title = t.clone(),
                NotePatch::Body(b) => next.body = b.clone(),
            }
            next
        }
    }

    fn note() -> Note {
        Note {
            title: "draft".into(),
            body: "".into(),
        }
    }

    #[test]
    fn start_is_visible_but_not_confirmed() {
        let id = RequestId::next();
        let state = Optimistic::new(note()).reduce(UpdateAction::Start {
            id,
            patch: NotePatch::Title("final".into()),
        });
        assert_eq!(state.current().title, "final");
        assert_eq!(state.confirmed().title, "draft");
        assert_eq!(state.phase(), UpdatePhase::Pending);
        assert_eq!(state.phase_of(id), UpdatePhase::Pending);
    }

    #[test]
    fn finish_confirms() {
        let id = RequestId::next();
        let state = Optimistic::new(note())
            .reduce(UpdateAction::Start {
                id,
                patch: NotePatch::Title("final".into()),
            })
            .reduce(UpdateAction::Finish { id });
        assert_eq!(state.confirmed().title, "final");
        assert!(!state.is_pending());
        assert_eq!(state.phase(), UpdatePhase::Confirmed);
        assert_eq!(state.last_settled(), Some(&Settled::Confirmed(id)));
    }

    #[test]
    fn fail_reverts_and_marks() {
        let id = RequestId::next();
        let state = Optimistic::new(note())
            .reduce(UpdateAction::Start {
                id,
                patch: NotePatch::Title("fail".into()),
            })
            .reduce(UpdateAction::Fail {
                id,
                reason: "nope".into(),
            });
        assert_eq!(state.current(), note());
        assert_eq!(state.phase(), UpdatePhase::Failed);
        assert_eq!(state.phase_of(id), UpdatePhase::Failed);
        assert_eq!(state.last_error(), Some("nope"));
    }

    #[test]
    fn failing_one_keeps_later_pending_patch() {
        let a = RequestId::next();
        let b = RequestId::next();
        let state = Optimistic::new(note())
            .reduce(UpdateAction::Start {
                id: a,
                patch: NotePatch::Title("t".into()),
            })
            .reduce(UpdateAction::Start {
                id: b,
                patch: NotePatch::Body("b".into()),
            })
            .reduce(UpdateAction::Fail {
                id: a,
                reason: "x".into(),
            });
        let current = state.current();
        assert_eq!(current.title, "draft");
        assert_eq!(current.body, "b");
        assert_eq!(state.phase(), UpdatePhase::Pending);
        assert_eq!(state.phase_of(b), UpdatePhase::Pending);
    }

    #[test]
    fn out_of_order_finish_keeps_issue_order() {
        let a = RequestId::next();
        let b = RequestId::next();
        let state = Optimistic::new(note())
            .reduce(UpdateAction::Start {
                id: a,
                patch: NotePatch::Title("first".into()),
            })
            .reduce(UpdateAction::Start {
                id: b,
                patch: NotePatch::Title("second".into()),
            })
            .reduce(UpdateAction::Finish { id: b });
        // `b` waits behind `a`; the newer patch stays visible.
        assert_eq!(state.confirmed().title, "draft");
        assert_eq!(state.current().title, "second");
        assert_eq!(state.phase_of(a), UpdatePhase::Pending);
        assert_eq!(state.phase_of(b), UpdatePhase::Confirmed);

        let settled = state.reduce(UpdateAction::Finish { id: a });
        assert_eq!(settled.confirmed().title, "second");
        assert_eq!(settled.current().title, "second");
        assert!(settled.pending().is_empty());
        assert_eq!(settled.phase(), UpdatePhase::Confirmed);
    }

    #[test]
    fn failing_head_releases_acknowledged_tail() {
        let a = RequestId::next();
        let b = RequestId::next();
        let state = Optimistic::new(note())
            .reduce(UpdateAction::Start {
                id: a,
                patch: NotePatch::Title("doomed".into()),
            })
            .reduce(UpdateAction::Start {
                id: b,
                patch: NotePatch::Body("kept".into()),
            })
            .reduce(UpdateAction::Finish { id: b })
            .reduce(UpdateAction::Fail {
                id: a,
                reason: "x".into(),
            });
        assert_eq!(state.confirmed().title, "draft");
        assert_eq!(state.confirmed().body, "kept");
        assert!(state.pending().is_empty());
        assert_eq!(state.phase(), UpdatePhase::Failed);
    }

    #[test]
    fn duplicate_finish_is_noop() {
        let id = RequestId::next();
        let once = Optimistic::new(note())
            .reduce(UpdateAction::Start {
                id,
                patch: NotePatch::Body("x".into()),
            })
            .reduce(UpdateAction::Finish { id });
        assert_eq!(once.reduce(UpdateAction::Finish { id }), once);
    }

    #[test]
    fn unknown_id_is_noop() {
        let base = Optimistic::new(note());
        let after = base
            .reduce(UpdateAction::Finish {
                id: RequestId::next(),
            })
            .reduce(UpdateAction::Fail {
                id: RequestId::next(),
                reason: "late".into(),
            });
        assert_eq!(after, base);
        assert_eq!(after.phase(), UpdatePhase::Idle);
    }

    #[test]
    fn local_edit_goes_to_confirmed() {
        let state = Optimistic::new(note()).reduce(UpdateAction::Local(NotePatch::Body("hi".into())));
        assert_eq!(state.confirmed().body, "hi");
        assert_eq!(state.phase(), UpdatePhase::Idle);
    }

    #[test]
    fn map_confirmed_preserves_pending() {
        let id = RequestId::next();
        let state = Optimistic::new(note())
            .reduce(UpdateAction::Start {
                id,
                patch: NotePatch::Title("t".into()),
            })
            .map_confirmed(|n| Note {
                body: "edited".into(),
                ..n.clone()
            });
        assert_eq!(state.current().title, "t");
        assert_eq!(state.current().body, "edited");
        assert!(state.is_pending());
    }
}
