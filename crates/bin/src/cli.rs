//! CLI argument definitions for the delegation ledger binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use delegation_ledger::{constants::DEFAULT_MAX_CONCURRENT_RESOURCES, party::PartyType};

use crate::output::OutputFormat;

/// Stage and reconcile access delegations
#[derive(Parser, Debug)]
#[command(name = "delegation-ledger")]
#[command(about = "Delegation ledger: stage access delegations and reconcile them with the backend")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(
        short,
        long,
        global = true,
        default_value = "human",
        env = "DELEGATION_LEDGER_FORMAT"
    )]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a party id into a backend URN
    Urn(UrnArgs),
    /// Classify backend error codes and pick the headline
    Classify(ClassifyArgs),
    /// Show the changes a scenario would make, without calling the backend
    Plan(PlanArgs),
    /// Reconcile a scenario against a persisted in-memory backend
    Apply(ApplyArgs),
}

/// Arguments for the urn command
#[derive(clap::Args, Debug)]
pub struct UrnArgs {
    /// The party's opaque identifier
    pub id: String,

    /// Kind of party: person, organization or enterprise-user
    #[arg(short = 't', long, default_value = "person")]
    pub party_type: PartyType,
}

/// Arguments for the classify command
#[derive(clap::Args, Debug)]
pub struct ClassifyArgs {
    /// Raw error codes as reported by the backend
    #[arg(required = true)]
    pub codes: Vec<String>,
}

/// Backend state file shared by commands that talk to the backend
#[derive(clap::Args, Debug)]
pub struct StateArgs {
    /// JSON file holding the in-memory backend state.
    /// Created on first save if it does not exist.
    #[arg(
        short,
        long,
        default_value = "delegation-ledger.json",
        env = "DELEGATION_LEDGER_STATE"
    )]
    pub state: PathBuf,
}

/// Arguments for the plan command
#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    /// Scenario file describing parties, entities and staged operations
    pub scenario: PathBuf,

    /// Only read when the scenario asks for the baseline to be loaded
    #[command(flatten)]
    pub state: StateArgs,
}

/// Arguments for the apply command
#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Scenario file describing parties, entities and staged operations
    pub scenario: PathBuf,

    #[command(flatten)]
    pub state: StateArgs,

    /// Maximum number of resources reconciled at once
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CONCURRENT_RESOURCES,
        env = "DELEGATION_LEDGER_MAX_CONCURRENCY"
    )]
    pub max_concurrency: usize,
}
