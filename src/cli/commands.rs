//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::id::PlatformId;
use crate::service::TemplateSource;
use crate::template::{Encoding, Kind};

/// Stackplate - Declarative template diff and apply engine.
#[derive(Parser, Debug)]
#[command(name = "stackplate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the settings file.
    #[arg(short, long, global = true, env = "STACKPLATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Org to operate on.
    #[arg(long, global = true, env = "STACKPLATE_ORG_ID", default_value = "0000000000000001")]
    pub org: PlatformId,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Template files or URLs, decoded and combined in order.
#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    /// Template paths or http(s) URLs.
    #[arg(required = true)]
    pub templates: Vec<String>,
}

impl TemplateArgs {
    /// Converts the arguments into template sources.
    #[must_use]
    pub fn sources(&self) -> Vec<TemplateSource> {
        self.templates.iter().map(|t| template_source(t)).collect()
    }
}

/// Arguments shared by `diff` and `apply`.
#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Templates to apply.
    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Stack to reconcile against.
    #[arg(long)]
    pub stack: Option<PlatformId>,

    /// Secret values, as KEY=VALUE.
    #[arg(long = "secret", value_parser = parse_secret)]
    pub secrets: Vec<(String, String)>,
}

impl ApplyArgs {
    /// Collects the secrets into a map. Later values win.
    #[must_use]
    pub fn secret_map(&self) -> BTreeMap<String, String> {
        self.secrets.iter().cloned().collect()
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode, combine and validate templates.
    Validate {
        /// Templates to validate.
        #[command(flatten)]
        templates: TemplateArgs,

        /// Show warnings too.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Print the per-kind summary of templates.
    Summary {
        /// Templates to summarize.
        #[command(flatten)]
        templates: TemplateArgs,
    },

    /// Show what applying the templates would change.
    Diff {
        /// Apply arguments.
        #[command(flatten)]
        args: ApplyArgs,
    },

    /// Apply templates to the org.
    Apply {
        /// Apply arguments.
        #[command(flatten)]
        args: ApplyArgs,

        /// Only report the impact.
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Export existing resources as a template.
    Export {
        /// Resources to export, as Kind:ID or Kind:ID:name.
        #[arg(long = "resource", value_parser = parse_resource_ref)]
        resources: Vec<ResourceArg>,

        /// Export the whole org.
        #[arg(long)]
        all: bool,

        /// Only export these kinds (with --all).
        #[arg(long = "kind")]
        kinds: Vec<Kind>,

        /// Only export resources carrying one of these labels (with --all).
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Encoding of the written template (json, yaml).
        #[arg(long, default_value = "yaml")]
        encoding: Encoding,

        /// Write to a file instead of stdout.
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
    },

    /// Manage stacks.
    Stack {
        /// Stack subcommand.
        #[command(subcommand)]
        command: StackCommands,
    },
}

/// Stack management subcommands.
#[derive(Subcommand, Debug)]
pub enum StackCommands {
    /// List the org's stacks.
    List,

    /// Show one stack.
    Show {
        /// Stack ID.
        id: PlatformId,
    },

    /// Delete a stack record. Its resources are left in place.
    Delete {
        /// Stack ID.
        id: PlatformId,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Maps a template argument to a source: http(s) URLs are fetched, anything
/// else is read from disk.
#[must_use]
pub fn template_source(arg: &str) -> TemplateSource {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        TemplateSource::remote(arg)
    } else {
        TemplateSource::File(PathBuf::from(arg))
    }
}

/// Parses a `KEY=VALUE` secret argument.
///
/// # Errors
///
/// Returns a message if there is no `=` or the key is empty.
pub fn parse_secret(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got \"{arg}\"")),
    }
}

/// A resource named on the command line: kind, ID and optional new name.
pub type ResourceArg = (Kind, PlatformId, Option<String>);

/// Parses a `Kind:ID[:name]` export argument.
///
/// # Errors
///
/// Returns a message if the kind or ID does not parse.
pub fn parse_resource_ref(arg: &str) -> Result<ResourceArg, String> {
    let mut parts = arg.splitn(3, ':');
    let kind: Kind = parts.next().unwrap_or_default().parse()?;
    let id = parts
        .next()
        .ok_or_else(|| format!("expected Kind:ID, got \"{arg}\""))?
        .parse::<PlatformId>()
        .map_err(|e| format!("invalid ID in \"{arg}\": {e}"))?;
    let name = parts.next().map(ToString::to_string);
    Ok((kind, id, name))
}
