#![forbid(unsafe_code)]

//! The backend seam for optimistic updates, plus a simulated backend.
//!
//! [`Backend`] is what [`update`](crate::optimistic::update) talks to: hand
//! it a request and the record it would produce, get back a future that
//! resolves when the backend has decided.
//!
//! [`SimulatedBackend`] stands in for a remote service. Submissions queue up
//! until the test (or the demo) calls [`settle_next`](SimulatedBackend::settle_next)
//! or [`settle_all`](SimulatedBackend::settle_all), which gives full control
//! over ordering and lets a scope end while a request is still in flight.
//! A submission is rejected when its designated field equals
//! [`REJECT_SENTINEL`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use tracing::{debug, trace};

use crate::error::UpdateRejected;
use crate::optimistic::{Patchable, RequestId, UpdateRequest};

/// Field value the simulated backend refuses.
pub const REJECT_SENTINEL: &str = "fail";

/// Reason attached to submissions whose reply channel was dropped unresolved.
pub const DROPPED_REASON: &str = "backend dropped";

/// A service that accepts or refuses update requests.
pub trait Backend<T: Patchable> {
    /// Submit `request`; `preview` is the record as it would look once the
    /// patch is applied.
    fn submit(
        &self,
        request: &UpdateRequest<T::Patch>,
        preview: &T,
    ) -> LocalBoxFuture<'static, Result<(), UpdateRejected>>;
}

/// Extracts the designated field from a patch, if the patch sets it.
pub type Probe<P> = fn(&P) -> Option<&str>;

/// When queued submissions are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Settlement {
    /// Only on [`SimulatedBackend::settle_next`] / [`SimulatedBackend::settle_all`].
    #[default]
    Manual,
    /// As soon as the request is submitted.
    Immediate,
}

struct Submission<T: Patchable> {
    id: RequestId,
    patch: T::Patch,
    preview: T,
    reply: oneshot::Sender<Result<(), UpdateRejected>>,
}

struct BackendState<T: Patchable> {
    probe: Probe<T::Patch>,
    settlement: Settlement,
    queue: VecDeque<Submission<T>>,
    submitted: usize,
    rejected: usize,
    persisted: Option<T>,
}

/// In-process backend with scripted settlement.
///
/// Clones share the same queue.
pub struct SimulatedBackend<T: Patchable> {
    state: Rc<RefCell<BackendState<T>>>,
}

impl<T: Patchable> Clone for SimulatedBackend<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Patchable> fmt::Debug for SimulatedBackend<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SimulatedBackend")
            .field("settlement", &state.settlement)
            .field("pending", &state.queue.len())
            .field("submitted", &state.submitted)
            .field("rejected", &state.rejected)
            .finish()
    }
}

impl<T: Patchable> SimulatedBackend<T> {
    /// A manually-settled backend that rejects when `probe` yields
    /// [`REJECT_SENTINEL`].
    #[must_use]
    pub fn new(probe: Probe<T::Patch>) -> Self {
        Self {
            state: Rc::new(RefCell::new(BackendState {
                probe,
                settlement: Settlement::Manual,
                queue: VecDeque::new(),
                submitted: 0,
                rejected: 0,
                persisted: None,
            })),
        }
    }

    #[must_use]
    pub fn with_settlement(self, settlement: Settlement) -> Self {
        self.state.borrow_mut().settlement = settlement;
        self
    }

    #[must_use]
    pub fn settlement(&self) -> Settlement {
        self.state.borrow().settlement
    }

    /// Decide the oldest queued submission. Returns its ID, or `None` if the
    /// queue is empty.
    pub fn settle_next(&self) -> Option<RequestId> {
        let submission = self.state.borrow_mut().queue.pop_front()?;
        Some(self.decide(submission))
    }

    /// Decide every queued submission in FIFO order.
    pub fn settle_all(&self) -> usize {
        let mut settled = 0;
        while self.settle_next().is_some() {
            settled += 1;
        }
        settled
    }

    /// Drop the oldest queued submission without answering, as a lost
    /// connection would. Its future resolves rejected with
    /// [`DROPPED_REASON`].
    pub fn drop_next(&self) -> Option<RequestId> {
        let submission = self.state.borrow_mut().queue.pop_front()?;
        debug!(request = %submission.id, "backend.dropped");
        Some(submission.id)
    }

    /// Submissions waiting for a decision.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Total submissions received.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.state.borrow().submitted
    }

    /// Total submissions refused.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.state.borrow().rejected
    }

    /// The most recently accepted record.
    #[must_use]
    pub fn persisted(&self) -> Option<T> {
        self.state.borrow().persisted.clone()
    }

    /// Whether `patch` would be refused.
    #[must_use]
    pub fn would_reject(&self, patch: &T::Patch) -> bool {
        let probe = self.state.borrow().probe;
        probe(patch) == Some(REJECT_SENTINEL)
    }

    fn decide(&self, submission: Submission<T>) -> RequestId {
        let Submission {
            id,
            patch,
            preview,
            reply,
        } = submission;
        let verdict = if self.would_reject(&patch) {
            self.state.borrow_mut().rejected += 1;
            Err(UpdateRejected {
                request_id: id,
                reason: format!("field value {REJECT_SENTINEL:?} is refused"),
            })
        } else {
            self.state.borrow_mut().persisted = Some(preview);
            Ok(())
        };
        trace!(request = %id, accepted = verdict.is_ok(), "backend.settle");
        if reply.send(verdict).is_err() {
            // Nobody is awaiting the outcome any more.
            debug!(request = %id, "backend.reply_unobserved");
        }
        id
    }
}

impl<T: Patchable> Backend<T> for SimulatedBackend<T> {
    fn submit(
        &self,
        request: &UpdateRequest<T::Patch>,
        preview: &T,
    ) -> LocalBoxFuture<'static, Result<(), UpdateRejected>> {
        let id = request.id();
        let (reply, outcome) = oneshot::channel();
        let submission = Submission {
            id,
            patch: request.patch().clone(),
            preview: preview.clone(),
            reply,
        };
        let settlement = {
            let mut state = self.state.borrow_mut();
            state.submitted += 1;
            state.settlement
        };
        trace!(request = %id, "backend.submit");
        match settlement {
            Settlement::Manual => self.state.borrow_mut().queue.push_back(submission),
            Settlement::Immediate => {
                self.decide(submission);
            }
        }

        async move {
            match outcome.await {
                Ok(verdict) => verdict,
                Err(oneshot::Canceled) => Err(UpdateRejected {
                    request_id: id,
                    reason: DROPPED_REASON.to_string(),
                }),
            }
        }
        .boxed_local()
    }
}
