//! Rowguard Operator Tool
//!
//! Administrative control surface for the namespace-isolation rollout:
//! project and grant management, phase transitions, gated promotion,
//! shadow-audit review, and the emergency bypass. Never part of the
//! request path.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rowguard Operator Tool
#[derive(Parser, Debug)]
#[command(name = "rowguard")]
#[command(version, about = "Rowguard namespace-isolation operator tool")]
pub struct Args {
    /// Path to the authorization data directory.
    #[arg(short, long, default_value = "./rowguard-data")]
    pub data_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage registered projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage cross-project read grants.
    #[command(subcommand)]
    Grant(GrantCommand),

    /// Inspect or change rollout phases.
    #[command(subcommand)]
    Phase(PhaseCommand),

    /// Promote a project from shadow to enforcing, gated by the rollout
    /// procedure.
    Promote {
        /// Project to promote.
        project: String,

        /// Only evaluate the gate; do not transition.
        #[arg(long)]
        check: bool,

        /// Override the minimum observation window, in hours.
        #[arg(long)]
        min_observation_hours: Option<u64>,

        /// Override the minimum observed unit-of-work volume.
        #[arg(long)]
        min_observed_units: Option<u64>,
    },

    /// Review or triage shadow-audit violations.
    #[command(subcommand)]
    Audit(AuditCommand),

    /// Control the emergency bypass.
    #[command(subcommand)]
    Bypass(BypassCommand),
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Register a project.
    Add {
        /// Project id.
        id: String,
        /// Human-readable name (defaults to the id).
        #[arg(long)]
        name: Option<String>,
        /// Access class: super, shared, or isolated.
        #[arg(long, default_value = "isolated")]
        class: String,
    },
    /// List registered projects with their rollout phase.
    List,
    /// Remove a project; grants referencing it cascade away.
    Remove {
        /// Project id.
        id: String,
    },
    /// Change a project's access class.
    SetClass {
        /// Project id.
        id: String,
        /// New access class.
        class: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum GrantCommand {
    /// Grant a reader access to a target project's rows.
    Add {
        /// Reading project.
        reader: String,
        /// Project whose rows become readable.
        target: String,
    },
    /// Revoke a grant.
    Remove {
        /// Reading project.
        reader: String,
        /// Granted project.
        target: String,
    },
    /// List grants, optionally for one reader.
    List {
        /// Restrict to this reader.
        #[arg(long)]
        reader: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PhaseCommand {
    /// Show a project's rollout status.
    Get {
        /// Project id.
        project: String,
    },
    /// Apply a phase transition (mechanism-level; skips the promotion
    /// gate).
    Set {
        /// Project id.
        project: String,
        /// Target phase: pending, shadow, enforcing, or complete.
        phase: String,
    },
    /// Restart a project's observation window.
    ResetObservation {
        /// Project id.
        project: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// List shadow-audit violations.
    List {
        /// Restrict to one project.
        #[arg(long)]
        project: Option<String>,
        /// Only records from the last N hours.
        #[arg(long)]
        since_hours: Option<u64>,
        /// Only untriaged records.
        #[arg(long)]
        untriaged: bool,
        /// Emit records as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Mark a violation as triaged.
    Triage {
        /// Record id (hex).
        id: String,
        /// Resolution: fixed-forward or accepted.
        #[arg(long)]
        resolution: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BypassCommand {
    /// Activate the emergency bypass.
    Activate {
        /// Operator taking responsibility.
        #[arg(long)]
        operator: String,
    },
    /// Deactivate the emergency bypass.
    Deactivate {
        /// Operator taking responsibility.
        #[arg(long)]
        operator: String,
    },
    /// Show whether the bypass is active, for whom, and since when.
    Status,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rowguard=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = commands::run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_promote() {
        let args = Args::parse_from([
            "rowguard",
            "promote",
            "beta",
            "--check",
            "--min-observed-units",
            "500",
        ]);
        match args.command {
            Command::Promote {
                project,
                check,
                min_observed_units,
                ..
            } => {
                assert_eq!(project, "beta");
                assert!(check);
                assert_eq!(min_observed_units, Some(500));
            }
            _ => panic!("expected promote command"),
        }
    }
}
