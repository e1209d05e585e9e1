//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::{ChangeType, Diff};
use crate::service::ImpactSummary;
use crate::state::Stack;
use crate::template::{Package, Summary, ValidationReport};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Diff row for table display.
#[derive(Tabled)]
struct DiffRow {
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Meta name")]
    meta_name: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Summary row for table display.
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Meta name")]
    meta_name: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Labels")]
    labels: String,
}

/// Stack row for table display.
#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Resources")]
    resources: usize,
    #[tabled(rename = "Sources")]
    sources: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of a validation.
    #[must_use]
    pub fn format_validation(
        &self,
        package: &Package,
        report: &ValidationReport,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": true,
                    "objects": report.objects,
                    "sources": package.sources(),
                    "warnings": report.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Templates are valid!\n", "✓".green());
                let _ = writeln!(output, "\n   Sources: {}", package.sources().join(", "));
                let _ = writeln!(output, "   Objects: {}", report.objects);
                if show_warnings && !report.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &report.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a package summary.
    #[must_use]
    pub fn format_summary(&self, summary: &Summary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Text => Self::format_summary_text(summary),
        }
    }

    fn format_summary_text(summary: &Summary) -> String {
        let mut output = String::from("\n📋 Template Summary\n\n");

        let rows: Vec<SummaryRow> = [
            &summary.labels,
            &summary.buckets,
            &summary.checks,
            &summary.dashboards,
            &summary.notification_endpoints,
            &summary.notification_rules,
            &summary.tasks,
            &summary.telegraf_configs,
            &summary.variables,
        ]
        .into_iter()
        .flatten()
        .map(|r| SummaryRow {
            kind: r.kind.to_string(),
            meta_name: r.meta_name.clone(),
            name: r.name.clone(),
            labels: r
                .label_associations
                .iter()
                .map(|a| a.meta_name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

        if rows.is_empty() {
            output.push_str("   No resources declared.\n");
        } else {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = writeln!(output, "\nLabel mappings: {}", summary.label_mappings.len());
        if !summary.missing_secrets.is_empty() {
            let _ = writeln!(
                output,
                "{} Missing secrets: {}",
                "⚠".yellow(),
                summary.missing_secrets.join(", ")
            );
        }
        output
    }

    /// Formats the impact of a dry run or apply.
    #[must_use]
    pub fn format_impact(&self, impact: &ImpactSummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(impact).unwrap_or_default(),
            OutputFormat::Text => Self::format_impact_text(impact),
        }
    }

    fn format_impact_text(impact: &ImpactSummary) -> String {
        let mut output = Self::format_diff_text(&impact.diff);

        if let Some(stack_id) = impact.stack_id {
            let _ = writeln!(output, "\nStack: {stack_id}");
        }
        if !impact.summary.missing_secrets.is_empty() {
            let _ = writeln!(
                output,
                "{} Missing secrets: {}",
                "⚠".yellow(),
                impact.summary.missing_secrets.join(", ")
            );
        }
        if !impact.failures.is_empty() {
            let _ = write!(output, "\n{} Failures:\n", "✗".red());
            for failure in &impact.failures {
                let _ = writeln!(
                    output,
                    "   - {} \"{}\": {}",
                    failure.kind, failure.meta_name, failure.reason
                );
            }
        }
        output
    }

    fn format_diff_text(diff: &Diff) -> String {
        if !diff.has_changes() {
            return format!(
                "{} No changes required - org is up to date.\n",
                "✓".green()
            );
        }

        let mut output = String::from("\n📋 Diff\n\n");

        let mut rows: Vec<DiffRow> = diff
            .resource_entries()
            .map(|e| DiffRow {
                change: Self::format_change(e.change),
                kind: e.identifier.kind.to_string(),
                meta_name: e.identifier.meta_name.clone(),
                name: e
                    .new
                    .as_ref()
                    .or(e.old.as_ref())
                    .map(|v| v.name.clone())
                    .unwrap_or_default(),
                id: e.identifier.id.map(|id| id.to_string()).unwrap_or_default(),
            })
            .collect();
        rows.extend(diff.label_mappings.iter().map(|m| DiffRow {
            change: Self::format_change(m.change),
            kind: String::from("LabelMapping"),
            meta_name: format!("{}/{}", m.label_meta_name, m.resource_meta_name),
            name: format!("{} -> {}", m.label_name, m.resource_name),
            id: String::new(),
        }));

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let counts = diff.counts();
        let _ = write!(
            output,
            "\nDiff: {} to create, {} to update, {} to remove, {} unchanged\n",
            counts.creates.to_string().green(),
            counts.updates.to_string().yellow(),
            counts.removes.to_string().red(),
            counts.unchanged.to_string().dimmed()
        );
        output
    }

    /// Formats a list of stacks.
    #[must_use]
    pub fn format_stacks(&self, stacks: &[Stack]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(stacks).unwrap_or_default(),
            OutputFormat::Text => {
                if stacks.is_empty() {
                    return String::from("No stacks found.\n");
                }
                let rows: Vec<StackRow> = stacks
                    .iter()
                    .map(|s| StackRow {
                        id: s.id.to_string(),
                        name: s.name.clone(),
                        resources: s.resources.len(),
                        sources: Self::truncate(&s.sources.join(", "), 40),
                        updated: s.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats one stack.
    #[must_use]
    pub fn format_stack(&self, stack: &Stack) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(stack).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\n💾 Stack: {}\n\n", stack.id);

                let _ = writeln!(output, "   Org: {}", stack.org_id);
                if !stack.name.is_empty() {
                    let _ = writeln!(output, "   Name: {}", stack.name);
                }
                let _ = writeln!(output, "   Last updated: {}", stack.updated_at);
                let _ = writeln!(output, "   Resources: {}", stack.resources.len());
                for resource in &stack.resources {
                    let _ = writeln!(
                        output,
                        "     {} {} ({})",
                        resource.kind, resource.meta_name, resource.id
                    );
                }

                if !stack.events.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", stack.events.len());
                    for event in stack.events.iter().rev().take(5) {
                        let status = if event.succeeded() { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({} resources)",
                            event.timestamp.format("%Y-%m-%d %H:%M"),
                            event.operation,
                            event.resources
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a change type with color.
    fn format_change(change: ChangeType) -> String {
        match change {
            ChangeType::Create => "+create".green().to_string(),
            ChangeType::Update => "~update".yellow().to_string(),
            ChangeType::Remove => "-remove".red().to_string(),
            ChangeType::Unchanged => "unchanged".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::PlatformId;

    #[test]
    fn test_empty_diff_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let impact = ImpactSummary {
            sources: Vec::new(),
            stack_id: None,
            diff: Diff::default(),
            summary: Summary::default(),
            failures: Vec::new(),
        };
        assert!(formatter.format_impact(&impact).contains("No changes required"));
    }

    #[test]
    fn test_stacks_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let stack = Stack::new(PlatformId::new(9000).unwrap()).with_name("demo");
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_stacks(&[stack])).unwrap();
        assert_eq!(json[0]["name"], "demo");
        assert_eq!(json[0]["orgID"], "0000000000002328");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("abcdefghijkl", 8), "abcde...");
    }
}
