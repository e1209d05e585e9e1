//! Stackplate CLI entrypoint.
//!
//! This is the main entrypoint for the stackplate command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use stackplate::backend::{Backend, MemoryBackend};
use stackplate::cli::{ApplyArgs, Cli, Commands, OutputFormatter, ResourceArg, StackCommands};
use stackplate::config::{Settings, SettingsParser};
use stackplate::error::{Result, StackplateError};
use stackplate::id::PlatformId;
use stackplate::service::{ApplyOptions, OrgExport, ResourceRef, TemplateService};
use stackplate::state::LocalStackStore;
use stackplate::template::{Encoding, Kind, Package};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. Logs go to stderr.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Everything a command needs.
struct Context {
    service: TemplateService,
    backend: Arc<MemoryBackend>,
    backend_path: PathBuf,
    formatter: OutputFormatter,
    org: PlatformId,
    cancel: CancellationToken,
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    let backend_path = settings.backend_path();
    let backend = Arc::new(MemoryBackend::load(&backend_path).await?);
    let stacks = Arc::new(LocalStackStore::with_base_dir(&settings.state_dir));
    let shared: Arc<dyn Backend> = Arc::clone(&backend) as Arc<dyn Backend>;
    let service = TemplateService::new(shared, stacks, settings)?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });

    let ctx = Context {
        service,
        backend,
        backend_path,
        formatter: OutputFormatter::new(cli.output),
        org: cli.org,
        cancel,
    };

    match cli.command {
        Commands::Validate {
            templates,
            warnings,
        } => {
            let package = load(&ctx, &templates.templates).await?;
            let report = ctx.service.validate(&package)?;
            emit(&ctx.formatter.format_validation(&package, &report, warnings))
        }
        Commands::Summary { templates } => {
            let package = load(&ctx, &templates.templates).await?;
            emit(&ctx.formatter.format_summary(&package.summary()))
        }
        Commands::Diff { args } => cmd_diff(&ctx, &args).await,
        Commands::Apply { args, dry_run, yes } => {
            if dry_run {
                cmd_diff(&ctx, &args).await
            } else {
                cmd_apply(&ctx, &args, yes).await
            }
        }
        Commands::Export {
            resources,
            all,
            kinds,
            labels,
            encoding,
            file,
        } => cmd_export(&ctx, &resources, all, kinds, labels, encoding, file.as_deref()).await,
        Commands::Stack { command } => cmd_stack(&ctx, command).await,
    }
}

/// Decodes and combines the given templates.
async fn load(ctx: &Context, templates: &[String]) -> Result<Package> {
    let sources: Vec<_> = templates
        .iter()
        .map(|t| stackplate::cli::template_source(t))
        .collect();
    ctx.service.load_package(&sources, &ctx.cancel).await
}

fn apply_options(args: &ApplyArgs) -> ApplyOptions {
    ApplyOptions {
        stack_id: args.stack,
        secrets: args.secret_map(),
        ..ApplyOptions::default()
    }
}

/// Show what applying would change.
async fn cmd_diff(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let package = load(ctx, &args.templates.templates).await?;
    let impact = ctx
        .service
        .dry_run(ctx.org, &package, apply_options(args), &ctx.cancel)
        .await?;
    emit(&ctx.formatter.format_impact(&impact))
}

/// Apply templates.
async fn cmd_apply(ctx: &Context, args: &ApplyArgs, auto_approve: bool) -> Result<()> {
    let package = load(ctx, &args.templates.templates).await?;
    let preview = ctx
        .service
        .dry_run(ctx.org, &package, apply_options(args), &ctx.cancel)
        .await?;

    if !preview.diff.has_changes() && args.stack.is_some() {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    eprintln!("{}", ctx.formatter.format_impact(&preview));

    // Confirm
    if !auto_approve && !confirm("Do you want to apply these changes? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let result = ctx
        .service
        .apply(ctx.org, ctx.org, &package, apply_options(args), &ctx.cancel)
        .await;

    // The backend may have changed even if the stack could not be saved.
    ctx.backend.save(&ctx.backend_path).await?;
    let impact = result?;

    emit(&ctx.formatter.format_impact(&impact))?;
    if impact.failures.is_empty() {
        info!(stack = ?impact.stack_id, "Apply complete");
        Ok(())
    } else {
        Err(StackplateError::internal(format!(
            "{} object(s) failed to apply",
            impact.failures.len()
        )))
    }
}

/// Export resources as a template.
async fn cmd_export(
    ctx: &Context,
    resources: &[ResourceArg],
    all: bool,
    kinds: Vec<Kind>,
    labels: Vec<String>,
    encoding: Encoding,
    file: Option<&Path>,
) -> Result<()> {
    let refs: Vec<ResourceRef> = resources
        .iter()
        .map(|(kind, id, name)| ResourceRef {
            kind: *kind,
            id: *id,
            name: name.clone(),
            meta_name: None,
        })
        .collect();
    let orgs = if all {
        vec![OrgExport {
            org_id: ctx.org,
            by_label: labels,
            by_resource_kind: kinds,
        }]
    } else {
        Vec::new()
    };

    let package = ctx.service.export(&orgs, &refs, &ctx.cancel).await?;
    let bytes = package.encode(encoding)?;

    match file {
        Some(path) => {
            tokio::fs::write(path, &bytes).await?;
            eprintln!("Exported {} object(s) to {}", package.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Stack management commands.
async fn cmd_stack(ctx: &Context, command: StackCommands) -> Result<()> {
    match command {
        StackCommands::List => {
            let stacks = ctx.service.list_stacks(ctx.org).await?;
            emit(&ctx.formatter.format_stacks(&stacks))
        }
        StackCommands::Show { id } => {
            let stack = ctx.service.get_stack(ctx.org, id).await?;
            emit(&ctx.formatter.format_stack(&stack))
        }
        StackCommands::Delete { id, yes } => {
            if !yes && !confirm(&format!("Delete stack {id}? Type 'delete' to confirm: "), "delete")? {
                eprintln!("Delete cancelled.");
                return Ok(());
            }
            ctx.service.delete_stack(ctx.org, id).await?;
            eprintln!("Stack {id} deleted.");
            Ok(())
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads settings from an explicit file or by searching upward from the
/// current directory.
fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let base = config_path
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let parser = SettingsParser::new().with_base_path(base);
    parser.load_dotenv()?;

    match config_path {
        Some(path) => {
            debug!("Loading settings from: {}", path.display());
            let mut settings = parser.load_file(path)?;
            SettingsParser::apply_env_overrides(&mut settings)?;
            settings.validate()?;
            Ok(settings)
        }
        None => parser.load("."),
    }
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
