use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use dossier_engine::{DigestCheckHook, UploadRequest, VersioningEngine};
use dossier_ledger::{GroupDirectory, LocalRecordStore, ValidationReport, Version};
use dossier_repair::{BlobAuditReport, BlobAuditor, BlobFinding, RepairReport, Repairer};
use dossier_server::DossierServer;
use dossier_store::FsBlobStore;

use crate::cli::*;
use crate::config::DossierConfig;

/// Stores and engine opened from one config.
struct Context {
    config: DossierConfig,
    engine: VersioningEngine,
    format: OutputFormat,
}

impl Context {
    fn open(config: DossierConfig, format: OutputFormat) -> anyhow::Result<Self> {
        let records = config.records_file();
        let store = LocalRecordStore::open(&records)
            .with_context(|| format!("opening record store {}", records.display()))?;
        let blob_dir = config.blob_dir();
        let blobs = FsBlobStore::open(&blob_dir)
            .with_context(|| format!("opening blob store {}", blob_dir.display()))?;
        let blobs = Arc::new(blobs);
        debug!(records = %records.display(), blobs = %blob_dir.display(), "opened stores");
        let engine = VersioningEngine::new(
            Arc::new(store),
            blobs.clone(),
            Arc::new(DigestCheckHook::new(blobs)),
            config.engine.clone(),
        );
        Ok(Self {
            config,
            engine,
            format,
        })
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn max_age(&self, secs: Option<u64>) -> Duration {
        secs.map(Duration::from_secs)
            .unwrap_or_else(|| self.config.engine.stuck_after())
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = DossierConfig::load(cli.config.as_deref())?;
    let ctx = Context::open(config, cli.format)?;
    match cli.command {
        Command::Repair(args) => cmd_repair(&ctx, args),
        Command::Check => cmd_check(&ctx),
        Command::AuditBlobs => cmd_audit_blobs(&ctx),
        Command::Project(cmd) => cmd_project(&ctx, cmd),
        Command::Upload(args) => cmd_upload(&ctx, args).await,
        Command::Activate(args) => cmd_activate(&ctx, args),
        Command::Versions(args) => cmd_versions(&ctx, args),
        Command::History(args) => cmd_history(&ctx, args),
        Command::Stuck(args) => cmd_stuck(&ctx, args),
        Command::FailStuck(args) => cmd_fail_stuck(&ctx, args),
        Command::Revalidate(args) => cmd_revalidate(&ctx, args).await,
        Command::Serve(args) => cmd_serve(ctx, args).await,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_repair(ctx: &Context, args: RepairArgs) -> anyhow::Result<()> {
    let report = Repairer::new(ctx.engine.store().clone()).run(args.dry_run)?;
    if ctx.json() {
        return print_json(&report);
    }
    print_repair(&report);
    Ok(())
}

fn print_repair(report: &RepairReport) {
    let heading = if report.dry_run { "Repair plan (dry run)" } else { "Repair" };
    println!("{}", heading.bold());
    println!("  Violations before: {}", report.before.violations.len());
    println!("  Buckets examined:  {}", report.buckets_examined);
    println!("  Buckets repaired:  {}", report.buckets_repaired);
    println!("  Groups merged:     {}", report.merged_groups);
    println!("  Groups resequenced: {}", report.resequenced_groups);
    println!("  Deactivated:       {}", report.deactivated);
    println!("  Activated:         {}", report.activated);
    println!("  Counters reset:    {}", report.counters_reset);
    for constraint in &report.constraints_installed {
        println!("  {} {}", "constraint:".cyan(), constraint);
    }
    match &report.after {
        Some(after) if after.is_valid() => println!("{} Store is consistent.", "✓".green().bold()),
        Some(after) => {
            println!("{} {} violations remain.", "✗".red().bold(), after.violations.len());
            print_violations(after);
        }
        None if report.changed_anything() => {
            println!("{} Re-run without --dry-run to apply.", "→".yellow())
        }
        None => println!("{} Nothing to do.", "✓".green().bold()),
    }
}

fn cmd_check(ctx: &Context) -> anyhow::Result<()> {
    let report = Repairer::new(ctx.engine.store().clone()).diagnose()?;
    if ctx.json() {
        return print_json(&report);
    }
    println!(
        "Checked {} groups, {} versions.",
        report.groups_checked, report.versions_checked
    );
    if report.is_valid() {
        println!("{} No violations.", "✓".green().bold());
    } else {
        print_violations(&report);
    }
    Ok(())
}

fn print_violations(report: &ValidationReport) {
    for v in &report.violations {
        let group = v.group_id.map(|g| g.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  {} {} / {} [{}] {}",
            v.kind.to_string().red(),
            v.project_id,
            v.discipline.as_str().yellow(),
            group.dimmed(),
            v.description
        );
    }
}

fn cmd_audit_blobs(ctx: &Context) -> anyhow::Result<()> {
    let report = BlobAuditor::new(ctx.engine.store().clone(), ctx.engine.blobs().clone()).audit()?;
    if ctx.json() {
        return print_json(&report);
    }
    print_audit(&report);
    Ok(())
}

fn print_audit(report: &BlobAuditReport) {
    println!(
        "Scanned {} blobs against {} versions.",
        report.blobs_scanned, report.versions_checked
    );
    for finding in &report.findings {
        match finding {
            BlobFinding::Unreferenced { path } => {
                println!("  {} {}", "unreferenced:".yellow(), path.display())
            }
            BlobFinding::Missing { version_id, path } => {
                println!("  {} {} {}", "missing:".red(), version_id, path.display())
            }
            BlobFinding::Corrupt {
                version_id, detail, ..
            } => println!("  {} {} {}", "corrupt:".red().bold(), version_id, detail),
        }
    }
    if report.is_clean() {
        println!("{} Blob tree matches the records.", "✓".green().bold());
    }
}

fn cmd_project(ctx: &Context, cmd: ProjectCommand) -> anyhow::Result<()> {
    let project = match cmd {
        ProjectCommand::Create { owner } => ctx.engine.create_project(&owner)?,
        ProjectCommand::Lock { project } => ctx.engine.set_project_locked(&project, true)?,
        ProjectCommand::Unlock { project } => ctx.engine.set_project_locked(&project, false)?,
        ProjectCommand::Show { project } => ctx.engine.project(&project)?,
    };
    let groups = GroupDirectory::new(ctx.engine.store().clone()).groups_for_project(&project.id)?;
    if ctx.json() {
        return print_json(&serde_json::json!({ "project": project, "groups": groups }));
    }
    let status = if project.status.is_locked() {
        project.status.to_string().red()
    } else {
        project.status.to_string().green()
    };
    println!("Project {} ({})", project.id.to_string().bold(), status);
    println!("  Owner: {}", project.owner);
    for group in groups {
        println!(
            "  {} {} v{} {:?}",
            group.discipline.as_str().yellow(),
            group.id.to_string().dimmed(),
            group.current_version,
            group.status
        );
    }
    Ok(())
}

async fn cmd_upload(ctx: &Context, args: UploadArgs) -> anyhow::Result<()> {
    let original_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", args.file.display()))?;
    let temp_path = stage_copy(&ctx.config.staging_dir(), &args.file)?;
    let receipt = ctx
        .engine
        .upload(UploadRequest {
            project_id: args.project,
            discipline: args.discipline,
            temp_path,
            original_name,
            actor: args.actor,
            reason: args.reason,
        })
        .await?;
    if ctx.json() {
        return print_json(&receipt);
    }
    println!(
        "{} Uploaded {} v{}",
        "✓".green().bold(),
        receipt.discipline.as_str().yellow(),
        receipt.version_number
    );
    println!("  Group:   {}", receipt.group_id);
    println!("  Version: {}", receipt.version_id);
    println!("  Digest:  {}", receipt.digest.short_hex().cyan());
    println!("  Status:  {}", receipt.processing_status);
    if !receipt.is_active {
        println!("  {} a newer upload is active", "note:".yellow());
    }
    Ok(())
}

/// Copy the caller's file into the staging area, which shares a
/// filesystem with the blob root. The engine owns the copy from here on.
fn stage_copy(staging_dir: &Path, source: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(staging_dir)
        .with_context(|| format!("creating staging dir {}", staging_dir.display()))?;
    let temp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".part")
        .tempfile_in(staging_dir)?
        .into_temp_path();
    std::fs::copy(source, &temp).with_context(|| format!("reading {}", source.display()))?;
    Ok(temp.keep()?)
}

fn cmd_activate(ctx: &Context, args: ActivateArgs) -> anyhow::Result<()> {
    let version = ctx.engine.activate(&args.group, &args.version, &args.actor)?;
    if ctx.json() {
        return print_json(&version);
    }
    println!(
        "{} {} v{} is active.",
        "✓".green().bold(),
        version.discipline.as_str().yellow(),
        version.number
    );
    Ok(())
}

fn cmd_versions(ctx: &Context, args: VersionsArgs) -> anyhow::Result<()> {
    let versions = match (args.group, args.project) {
        (Some(group), _) => ctx.engine.group_versions(&group)?,
        (None, Some(project)) => ctx.engine.project_versions(&project)?,
        (None, None) => anyhow::bail!("either --group or --project is required"),
    };
    if ctx.json() {
        return print_json(&versions);
    }
    print_versions(&versions);
    Ok(())
}

fn print_versions(versions: &[Version]) {
    if versions.is_empty() {
        println!("No versions.");
    }
    for v in versions {
        let marker = if v.is_active { "*".green().bold() } else { " ".normal() };
        println!(
            "{} {} v{:<3} {} {} {} ({})",
            marker,
            v.discipline.as_str().yellow(),
            v.number,
            v.id.to_string().dimmed(),
            v.file.original_name,
            v.processing_status,
            v.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(reason) = &v.failure_reason {
            println!("      {} {}", "failed:".red(), reason);
        }
    }
}

fn cmd_history(ctx: &Context, args: HistoryArgs) -> anyhow::Result<()> {
    let trail = ctx.engine.audit_trail(&args.version)?;
    if ctx.json() {
        return print_json(&trail);
    }
    for entry in trail {
        println!(
            "{} {:?} v{} by {}",
            entry.at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            entry.action,
            entry.version_number,
            entry.actor.bold()
        );
    }
    Ok(())
}

fn cmd_stuck(ctx: &Context, args: StuckArgs) -> anyhow::Result<()> {
    let versions = ctx.engine.stuck_versions(ctx.max_age(args.older_than_secs))?;
    if ctx.json() {
        return print_json(&versions);
    }
    print_versions(&versions);
    Ok(())
}

fn cmd_fail_stuck(ctx: &Context, args: FailStuckArgs) -> anyhow::Result<()> {
    let failed = ctx
        .engine
        .fail_stuck(ctx.max_age(args.older_than_secs), &args.reason, &args.actor)?;
    if ctx.json() {
        return print_json(&failed);
    }
    println!("{} Marked {} versions failed.", "✓".green().bold(), failed.len());
    print_versions(&failed);
    Ok(())
}

async fn cmd_revalidate(ctx: &Context, args: RevalidateArgs) -> anyhow::Result<()> {
    let version = ctx.engine.revalidate(&args.version, &args.actor).await?;
    if ctx.json() {
        return print_json(&version);
    }
    println!(
        "{} {} v{} is {}.",
        "✓".green().bold(),
        version.discipline.as_str().yellow(),
        version.number,
        version.processing_status
    );
    Ok(())
}

async fn cmd_serve(ctx: Context, args: ServeArgs) -> anyhow::Result<()> {
    let mut server_config = ctx.config.server.clone();
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }
    println!(
        "Dossier server on {} (data: {})",
        server_config.bind_addr.to_string().bold(),
        ctx.config.data_dir.display()
    );
    let server = DossierServer::new(server_config, ctx.engine, ctx.config.staging_dir());
    server.serve().await?;
    Ok(())
}
