use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::appointment::{AppointmentStatus, SortKey};
use crate::calendar::ViewMode;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "frontdesk",
    version,
    about = "Front-desk appointment calendar",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "frontdeskrc", global = true)]
    pub frontdeskrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print one calendar period.
    Show(ShowArgs),
    /// Navigate the calendar interactively from stdin.
    Browse(BrowseArgs),
    /// Book an appointment.
    Add(AddArgs),
    /// Change fields of an existing appointment.
    Edit(EditArgs),
    /// Remove an appointment.
    Delete { id: String },
    /// List appointments with optional filters.
    List(ListArgs),
    /// Register a patient.
    PatientAdd(PatientAddArgs),
    /// List registered patients.
    Patients,
    /// Write all appointments as a JSON array.
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Merge appointments from a JSON array file by id.
    Import { file: PathBuf },
    /// Dashboard counts and upcoming appointments.
    Summary,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<ViewMode>()))]
    pub view: Option<ViewMode>,

    /// YYYY-MM-DD, today, tomorrow or yesterday.
    #[arg(long)]
    pub date: Option<String>,

    /// Periods to move from the date; negative moves back.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub step: i64,
}

#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<ViewMode>()))]
    pub view: Option<ViewMode>,

    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long)]
    pub patient: String,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub start: String,

    #[arg(long)]
    pub end: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub doctor: Option<String>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<AppointmentStatus>()))]
    pub status: Option<AppointmentStatus>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub patient: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub start: Option<String>,

    #[arg(long)]
    pub end: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub doctor: Option<String>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<AppointmentStatus>()))]
    pub status: Option<AppointmentStatus>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Case-insensitive match on patient name or title.
    #[arg(long)]
    pub search: Option<String>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<AppointmentStatus>()))]
    pub status: Option<AppointmentStatus>,

    #[arg(long, default_value = "date", value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<SortKey>()))]
    pub sort: SortKey,

    #[arg(long)]
    pub patient: Option<String>,

    #[arg(long)]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PatientAddArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
