use clap::{Args, Parser, ValueEnum};
use tether_runtime::profile::{ProfileField, ProfilePatch};

use crate::error::{DemoError, Result};
use crate::logging;
use crate::scenario::{self, ScenarioOutcome, ScenarioReport};

#[derive(Debug, Parser)]
#[command(
    name = "tether-demo",
    about = "Edit a user profile optimistically through a scoped broadcast cell",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Log output format (stderr). Filter with TETHER_LOG.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Exit non-zero when the backend rejects the update.
    #[arg(long)]
    pub fail_on_reject: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ScenarioArgs {
    /// New display name.
    #[arg(long)]
    pub name: Option<String>,

    /// New tagline.
    #[arg(long)]
    pub tagline: Option<String>,

    /// New bio.
    #[arg(long)]
    pub bio: Option<String>,

    /// Field the simulated backend watches for the value "fail".
    #[arg(long, value_enum, default_value_t = RejectField::Tagline)]
    pub reject_field: RejectField,

    /// End the profile scope while the update is still in flight.
    #[arg(long)]
    pub destroy_before_settle: bool,
}

impl ScenarioArgs {
    #[must_use]
    pub fn patch(&self) -> ProfilePatch {
        ProfilePatch {
            name: self.name.clone(),
            tagline: self.tagline.clone(),
            bio: self.bio.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RejectField {
    Name,
    Tagline,
    Bio,
}

impl From<RejectField> for ProfileField {
    fn from(field: RejectField) -> Self {
        match field {
            RejectField::Name => Self::Name,
            RejectField::Tagline => Self::Tagline,
            RejectField::Bio => Self::Bio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format)?;
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let report = scenario::run(&cli.scenario)?;
    print_report(&report, cli.json)?;
    match (&report.outcome, cli.fail_on_reject) {
        (ScenarioOutcome::Rejected { reason }, true) => Err(DemoError::Rejected(
            tether_runtime::UpdateRejected {
                request_id: report.request_id,
                reason: reason.clone(),
            },
        )),
        _ => Ok(()),
    }
}

fn print_report(report: &ScenarioReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
