// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stackplate
//!
//! A declarative template diff and apply engine for multi-tenant platform resources.
//!
//! ## Overview
//!
//! Stackplate lets operators describe buckets, checks, dashboards, labels,
//! notification endpoints and rules, tasks, telegraf configs and variables as
//! templates, then:
//!
//! - Decode and combine any number of JSON, YAML or Jinja sources into one package
//! - Validate the package, collecting every violation at once
//! - Diff the package against an org to see what would change
//! - Apply the changes in dependency order, tracked by a stack for idempotent re-applies
//! - Export existing resources back into a template
//!
//! ## Architecture
//!
//! A request flows through a fixed pipeline:
//!
//! 1. **Decode**: template bytes, local files and remote URLs become objects
//! 2. **Combine and validate**: objects merge into one [`template::Package`]
//! 3. **Diff**: the package summary is compared with current org state
//! 4. **Apply**: a phased plan is executed and the stack is saved last
//!
//! ## Modules
//!
//! - [`template`]: Decoding, remote fetching, combination, validation and summaries
//! - [`planner`]: Diff computation, apply planning and execution
//! - [`service`]: Request-scoped orchestration of the pipeline
//! - [`api`]: Request and response payload contracts
//! - [`backend`]: Backend resource store contract and in-memory implementation
//! - [`state`]: Stack storage backends (memory, local file)
//! - [`config`]: Engine settings
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: stackplate.dev/v1alpha1
//! kind: Label
//! metadata:
//!   name: env-prod
//! spec:
//!   color: "#326BBA"
//! ---
//! apiVersion: stackplate.dev/v1alpha1
//! kind: Bucket
//! metadata:
//!   name: metrics
//! spec:
//!   retentionRules:
//!     - type: expire
//!       everySeconds: 86400
//!   associations:
//!     - kind: Label
//!       name: env-prod
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod id;
pub mod planner;
pub mod service;
pub mod state;
pub mod template;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{ApiResponse, TemplatesHandler};
pub use backend::{Backend, MemoryBackend, ResourceWriter, StateReader};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{Settings, SettingsParser};
pub use error::{Result, StackplateError};
pub use id::PlatformId;
pub use planner::{ApplyExecutor, ApplyPlan, Diff, DiffEngine, KindOrder};
pub use service::{ApplyOptions, ImpactSummary, TemplateService, TemplateSource};
pub use state::{LocalStackStore, MemoryStackStore, Stack, StackStore};
pub use template::{DecoderRegistry, Kind, Package, Summary, TemplateValidator};
