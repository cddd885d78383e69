//! The profile-editing scenario.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tether_runtime::backend::SimulatedBackend;
use tether_runtime::executor::{Executor, Task};
use tether_runtime::optimistic::{Optimistic, PendingUpdate, RequestId, UpdateOutcome, UpdatePhase};
use tether_runtime::profile::{self, ProfileAction, ProfileField, ProfilePatch, UserProfile};
use tether_runtime::{CellConfig, ScopeError, UpdateError, ValueCell, scope};
use tracing::info;

use crate::cli::ScenarioArgs;
use crate::error::{DemoError, Result};

pub type ProfileState = Optimistic<UserProfile>;

type UpdateResult = std::result::Result<UpdateOutcome, UpdateError>;

/// How the submitted edit ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Confirmed,
    Rejected { reason: String },
    /// The scope ended before the backend answered.
    Detached,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub request_id: RequestId,
    pub description: String,
    pub reject_field: ProfileField,
    pub initial: UserProfile,
    /// Visible value right after submitting, before the backend answered.
    pub speculative: UserProfile,
    /// Visible value after settlement. `None` when the scope had ended.
    pub settled: Option<UserProfile>,
    pub phase: Option<UpdatePhase>,
    pub outcome: ScenarioOutcome,
    /// Header text rendered by the scoped subscriber, one per change.
    pub renders: Vec<String>,
    /// What the backend stored, if it accepted anything.
    pub persisted: Option<UserProfile>,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.outcome {
            ScenarioOutcome::Confirmed => "confirmed".to_string(),
            ScenarioOutcome::Rejected { reason } => format!("rejected ({reason})"),
            ScenarioOutcome::Detached => "detached".to_string(),
        };
        writeln!(f, "request {} ({}): {status}", self.request_id, self.description)?;
        writeln!(f, "  initial:     {}", one_line(&self.initial))?;
        writeln!(f, "  speculative: {}", one_line(&self.speculative))?;
        match &self.settled {
            Some(settled) => writeln!(f, "  settled:     {}", one_line(settled))?,
            None => writeln!(f, "  settled:     (scope ended)")?,
        }
        match &self.persisted {
            Some(persisted) => writeln!(f, "  persisted:   {}", one_line(persisted))?,
            None => writeln!(f, "  persisted:   (nothing)")?,
        }
        for render in &self.renders {
            writeln!(f, "  render:      {render}")?;
        }
        Ok(())
    }
}

fn one_line(profile: &UserProfile) -> String {
    format!("{} | {} | {}", profile.name, profile.tagline, profile.bio)
}

/// Starting profile for every run.
#[must_use]
pub fn initial_profile() -> UserProfile {
    UserProfile::new(
        "Ada Lovelace",
        "Analyst of engines",
        "Wrote the first published program.",
    )
}

/// Header text for a profile state, as a view would render it.
#[must_use]
pub fn header(state: &ProfileState) -> String {
    let profile = state.current();
    let marker = match state.phase() {
        UpdatePhase::Pending => " (saving)",
        UpdatePhase::Failed => " (not saved)",
        UpdatePhase::Idle | UpdatePhase::Confirmed => "",
    };
    let editing = if profile.editing { " [editing]" } else { "" };
    format!("{}: {}{marker}{editing}", profile.name, profile.tagline)
}

/// The edit form: reaches the profile through the ambient scope only.
fn submit_form(
    patch: ProfilePatch,
    backend: &SimulatedBackend<UserProfile>,
) -> std::result::Result<PendingUpdate, ScopeError> {
    let dispatcher = scope::use_dispatcher::<ProfileState>()?;
    let current = scope::read::<ProfileState>()?;
    profile::submit_edit(&dispatcher, &current, patch, backend)
}

struct Submitted {
    task: Task<UpdateResult>,
    speculative: UserProfile,
    value: ValueCell<ProfileState>,
}

/// Run one edit end to end.
///
/// # Errors
///
/// [`DemoError::InvalidArgument`] for an empty patch; scope and spawn
/// failures otherwise. A backend rejection is part of the report, not an
/// error.
pub fn run(args: &ScenarioArgs) -> Result<ScenarioReport> {
    let patch = args.patch();
    if patch.is_empty() {
        return Err(DemoError::invalid(
            "nothing to submit: pass --name, --tagline or --bio",
        ));
    }
    let reject_field = ProfileField::from(args.reject_field);
    let backend = SimulatedBackend::for_profiles(reject_field);
    let mut executor = Executor::new();
    let renders = Rc::new(RefCell::new(Vec::new()));
    let initial = initial_profile();

    let config = CellConfig::new().with_label("profile");
    let submitted = scope::enter_with(
        Optimistic::new(initial.clone()),
        config,
        |cell| -> Result<Submitted> {
            let sink = Rc::clone(&renders);
            let _renders = scope::subscribe::<ProfileState>(move |state| {
                sink.borrow_mut().push(header(state));
            })?;

            scope::send::<ProfileState, _>(ProfileAction::BeginEdit)?;
            let pending = submit_form(patch.clone(), &backend)?;
            let task = executor.spawn(pending)?;
            executor.run_until_stalled();
            let speculative = cell.read()?.current();

            if !args.destroy_before_settle {
                backend.settle_all();
                executor.run_until_stalled();
            }
            Ok(Submitted {
                task,
                speculative,
                value: cell.value_cell(),
            })
        },
    )?;

    if args.destroy_before_settle {
        backend.settle_all();
        executor.run_until_stalled();
    }

    let Submitted {
        task,
        speculative,
        value,
    } = submitted;
    let (request_id, outcome) = match task.take().ok_or(DemoError::Stalled)? {
        Ok(UpdateOutcome::Confirmed { id }) => (id, ScenarioOutcome::Confirmed),
        Ok(UpdateOutcome::Detached { id }) => (id, ScenarioOutcome::Detached),
        Err(UpdateError::Rejected(rejected)) => (
            rejected.request_id,
            ScenarioOutcome::Rejected {
                reason: rejected.reason,
            },
        ),
        Err(UpdateError::Scope(err)) => return Err(err.into()),
    };
    let settled_state = value.read().ok();
    info!(request = %request_id, outcome = ?outcome, "scenario finished");

    let renders = renders.borrow().clone();
    Ok(ScenarioReport {
        request_id,
        description: patch.describe(),
        reject_field,
        initial,
        speculative,
        settled: settled_state.as_ref().map(ProfileState::current),
        phase: settled_state.as_ref().map(ProfileState::phase),
        outcome,
        renders,
        persisted: backend.persisted(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RejectField;

    fn args(tagline: &str) -> ScenarioArgs {
        ScenarioArgs {
            name: None,
            tagline: Some(tagline.to_string()),
            bio: None,
            reject_field: RejectField::Tagline,
            destroy_before_settle: false,
        }
    }

    #[test]
    fn confirmed_edit() {
        let report = run(&args("Poet of numbers")).expect("scenario runs");
        assert_eq!(report.outcome, ScenarioOutcome::Confirmed);
        assert_eq!(report.speculative.tagline, "Poet of numbers");
        assert!(!report.speculative.editing);
        let settled = report.settled.expect("scope still open at settlement");
        assert_eq!(settled.tagline, "Poet of numbers");
        assert_eq!(report.phase, Some(UpdatePhase::Confirmed));
        assert_eq!(report.persisted, Some(settled));
        assert_eq!(report.description, "Update tagline");
    }

    #[test]
    fn renders_track_every_change() {
        let report = run(&args("Poet of numbers")).expect("scenario runs");
        assert_eq!(
            report.renders,
            vec![
                "Ada Lovelace: Analyst of engines [editing]".to_string(),
                "Ada Lovelace: Analyst of engines".to_string(),
                "Ada Lovelace: Poet of numbers (saving)".to_string(),
                "Ada Lovelace: Poet of numbers".to_string(),
            ]
        );
    }

    #[test]
    fn rejected_edit_is_reported_not_raised() {
        let report = run(&args("fail")).expect("scenario runs");
        assert!(matches!(report.outcome, ScenarioOutcome::Rejected { .. }));
        assert_eq!(report.speculative.tagline, "fail");
        let settled = report.settled.expect("scope still open");
        assert_eq!(settled.tagline, "Analyst of engines");
        assert_eq!(report.phase, Some(UpdatePhase::Failed));
        assert_eq!(report.persisted, None);
    }

    #[test]
    fn other_field_fail_is_accepted() {
        let mut args = args("fail");
        args.reject_field = RejectField::Bio;
        let report = run(&args).expect("scenario runs");
        assert_eq!(report.outcome, ScenarioOutcome::Confirmed);
    }

    #[test]
    fn destroy_before_settle_detaches() {
        let mut args = args("Too late");
        args.destroy_before_settle = true;
        let report = run(&args).expect("scenario runs");
        assert_eq!(report.outcome, ScenarioOutcome::Detached);
        assert_eq!(report.settled, None);
        assert_eq!(report.phase, None);
        // The backend still stored it; the cell simply never heard back.
        assert!(report.persisted.is_some());
    }

    #[test]
    fn empty_patch_is_invalid() {
        let mut args = args("x");
        args.tagline = None;
        let err = run(&args).expect_err("nothing to submit");
        assert_eq!(err.exit_code(), 64);
    }

    #[test]
    fn report_serializes_with_status_tag() {
        let report = run(&args("fail")).expect("scenario runs");
        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(json["outcome"]["status"], "rejected");
        assert_eq!(json["reject_field"], "tagline");
        assert_eq!(json["phase"], "failed");
    }
}
