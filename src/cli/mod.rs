//! CLI module for the stackplate engine.
//!
//! This module provides the command-line interface for validating,
//! diffing, applying and exporting templates.

mod commands;
mod output;

pub use commands::{
    ApplyArgs, Cli, Commands, OutputFormat, ResourceArg, StackCommands, TemplateArgs, parse_resource_ref,
    parse_secret, template_source,
};
pub use output::OutputFormatter;
