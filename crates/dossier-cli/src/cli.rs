use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use dossier_types::{Discipline, GroupId, ProjectId, VersionId};

#[derive(Parser)]
#[command(
    name = "dossier",
    about = "Dossier: versioned artifact store for regulatory submissions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge duplicate groups, renumber versions, and install constraints
    Repair(RepairArgs),
    /// Report invariant violations without changing anything
    Check,
    /// Cross-check the blob tree against version records
    AuditBlobs,
    /// Create, lock, unlock, or show projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Upload a file as the next version of a discipline
    Upload(UploadArgs),
    /// Make a version the active one in its group
    Activate(ActivateArgs),
    /// List versions of a group or project, newest first
    Versions(VersionsArgs),
    /// Show the audit trail of a version
    History(HistoryArgs),
    /// List versions stuck in validation
    Stuck(StuckArgs),
    /// Mark stuck versions as failed
    FailStuck(FailStuckArgs),
    /// Run validation on a version again
    Revalidate(RevalidateArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct RepairArgs {
    /// Plan and report without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// Create a project
    Create {
        #[arg(long)]
        owner: String,
    },
    /// Reject further uploads and activations
    Lock { project: ProjectId },
    /// Accept uploads and activations again
    Unlock { project: ProjectId },
    /// Show a project
    Show { project: ProjectId },
}

#[derive(Args)]
pub struct UploadArgs {
    pub project: ProjectId,
    pub discipline: Discipline,
    pub file: PathBuf,
    #[arg(long, default_value = "cli")]
    pub actor: String,
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Args)]
pub struct ActivateArgs {
    pub group: GroupId,
    pub version: VersionId,
    #[arg(long, default_value = "cli")]
    pub actor: String,
}

#[derive(Args)]
pub struct VersionsArgs {
    #[arg(long, conflicts_with = "project", required_unless_present = "project")]
    pub group: Option<GroupId>,
    #[arg(long)]
    pub project: Option<ProjectId>,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub version: VersionId,
}

#[derive(Args)]
pub struct StuckArgs {
    /// Age threshold; defaults to the engine's configured value
    #[arg(long)]
    pub older_than_secs: Option<u64>,
}

#[derive(Args)]
pub struct FailStuckArgs {
    #[arg(long)]
    pub older_than_secs: Option<u64>,
    #[arg(long, default_value = "validation timed out")]
    pub reason: String,
    #[arg(long, default_value = "cli")]
    pub actor: String,
}

#[derive(Args)]
pub struct RevalidateArgs {
    pub version: VersionId,
    #[arg(long, default_value = "cli")]
    pub actor: String,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Overrides the configured bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}
