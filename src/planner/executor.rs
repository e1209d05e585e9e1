//! Plan executor for applying apply plans.
//!
//! Phases run one after another. Actions within a phase run concurrently up
//! to a bound. A failed action is recorded and does not stop its siblings;
//! actions depending on it are skipped.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{LabelLink, NewResource, ResourceWriter};
use crate::error::{BackendError, Result, StackplateError};
use crate::id::PlatformId;
use crate::state::StackResource;
use crate::template::Kind;

use super::plan::{ActionType, ApplyPlan, PlannedAction};

/// Default number of concurrent actions per phase.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// A per-object apply failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyFailure {
    /// Resource kind.
    pub kind: Kind,
    /// metaName of the failed object.
    pub meta_name: String,
    /// What went wrong.
    pub reason: String,
}

/// Result of executing a single action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Whether the action succeeded.
    pub success: bool,
    /// Whether the action was skipped because a dependency failed.
    pub skipped: bool,
    /// Backend ID of the created or updated resource.
    pub id: Option<PlatformId>,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug, Default)]
pub struct ExecutionResult {
    /// Individual action results, in plan order.
    pub results: Vec<ActionResult>,
    /// Resources the stack should record after this apply.
    pub realized: Vec<StackResource>,
    /// Per-object failures.
    pub failures: Vec<ApplyFailure>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions.
    pub skipped: usize,
}

impl ExecutionResult {
    /// Whether every action succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Executor for apply plans.
pub struct ApplyExecutor<'a> {
    writer: &'a dyn ResourceWriter,
    org_id: PlatformId,
    user_id: PlatformId,
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl<'a> ApplyExecutor<'a> {
    /// Creates a new executor writing through `writer` on behalf of `user_id`.
    #[must_use]
    pub fn new(writer: &'a dyn ResourceWriter, org_id: PlatformId, user_id: PlatformId) -> Self {
        Self {
            writer,
            org_id,
            user_id,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the number of concurrent actions per phase. Zero is treated as one.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Sets the cancellation token observed between and during phases.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Executes an apply plan.
    ///
    /// # Errors
    ///
    /// Returns `StackplateError::Cancelled` if the token fires, or the backend
    /// error if the backend is unavailable before any mutation succeeded.
    pub async fn execute(&self, plan: &ApplyPlan) -> Result<ExecutionResult> {
        info!(
            actions = plan.actions.len(),
            phases = plan.phases.len(),
            "Executing apply plan"
        );

        let mut ids: HashMap<(Kind, String), PlatformId> = plan
            .unchanged
            .iter()
            .map(|r| ((r.kind, r.meta_name.clone()), r.id))
            .collect();
        for action in &plan.actions {
            if action.action_type == ActionType::Update
                && let Some(id) = action.id
            {
                ids.insert((action.kind, action.meta_name.clone()), id);
            }
        }

        let mut outcomes: Vec<Option<ActionResult>> = vec![None; plan.actions.len()];
        let mut failed_indices: HashSet<usize> = HashSet::new();
        let mut mutated = false;

        for (phase_index, phase) in plan.phases.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(StackplateError::Cancelled);
            }

            let mut ready = Vec::new();
            for &index in phase {
                let action = &plan.actions[index];
                if let Some(dep) = action
                    .dependencies
                    .iter()
                    .find(|dep| failed_indices.contains(dep))
                {
                    let dep = &plan.actions[*dep];
                    warn!(kind = %action.kind, meta_name = %action.meta_name, "Skipping action due to failed dependency");
                    outcomes[index] = Some(ActionResult {
                        index,
                        success: false,
                        skipped: true,
                        id: None,
                        error: Some(format!(
                            "skipped: dependency {} \"{}\" failed",
                            dep.kind, dep.meta_name
                        )),
                    });
                    failed_indices.insert(index);
                } else {
                    ready.push(index);
                }
            }
            debug!(phase = phase_index, ready = ready.len(), "Running phase");

            let results = {
                let known = &ids;
                let run = stream::iter(ready)
                    .map(|index| async move {
                        (index, self.run_action(&plan.actions[index], known).await)
                    })
                    .buffer_unordered(self.max_concurrency)
                    .collect::<Vec<_>>();
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Err(StackplateError::Cancelled),
                    results = run => results,
                }
            };

            // A sibling in this phase may already have written.
            mutated |= results.iter().any(|(_, result)| result.is_ok());
            for (index, result) in results {
                let action = &plan.actions[index];
                match result {
                    Ok(id) => {
                        if let Some(id) = id {
                            ids.insert((action.kind, action.meta_name.clone()), id);
                        }
                        outcomes[index] = Some(ActionResult {
                            index,
                            success: true,
                            skipped: false,
                            id,
                            error: None,
                        });
                    }
                    Err(StackplateError::Cancelled) => return Err(StackplateError::Cancelled),
                    Err(e @ StackplateError::Backend(BackendError::Unavailable { .. }))
                        if !mutated =>
                    {
                        error!(error = %e, "Backend unavailable before any change, aborting");
                        return Err(e);
                    }
                    Err(e) => {
                        error!(kind = %action.kind, meta_name = %action.meta_name, error = %e, "Action failed");
                        failed_indices.insert(index);
                        outcomes[index] = Some(ActionResult {
                            index,
                            success: false,
                            skipped: false,
                            id: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        let results: Vec<ActionResult> = outcomes.into_iter().flatten().collect();
        let execution = Self::summarize(plan, results);
        info!(
            successful = execution.successful,
            failed = execution.failed,
            skipped = execution.skipped,
            "Apply plan executed"
        );
        Ok(execution)
    }

    async fn run_action(
        &self,
        action: &PlannedAction,
        known: &HashMap<(Kind, String), PlatformId>,
    ) -> Result<Option<PlatformId>> {
        debug!(action = %action.action_type, kind = %action.kind, meta_name = %action.meta_name, "Executing action");

        let resource = || NewResource {
            kind: action.kind,
            name: action.name.clone(),
            spec: action.spec.clone(),
        };

        match action.action_type {
            ActionType::Create => {
                let created = self.writer.create(self.org_id, self.user_id, resource()).await?;
                info!(kind = %action.kind, meta_name = %action.meta_name, id = %created.id, "Created resource");
                Ok(Some(created.id))
            }
            ActionType::Update => {
                let id = Self::require(action.id, action.kind, &action.meta_name)?;
                let updated = self.writer.update(self.org_id, id, resource()).await?;
                info!(kind = %action.kind, meta_name = %action.meta_name, id = %updated.id, "Updated resource");
                Ok(Some(updated.id))
            }
            ActionType::Remove => {
                let id = Self::require(action.id, action.kind, &action.meta_name)?;
                match self.writer.delete(self.org_id, action.kind, id).await {
                    Ok(()) | Err(StackplateError::Backend(BackendError::NotFound { .. })) => {
                        info!(kind = %action.kind, meta_name = %action.meta_name, id = %id, "Removed resource");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            ActionType::Link => {
                let Some(link) = &action.link else {
                    return Err(StackplateError::internal("link action without target"));
                };
                let resource_id = link
                    .resource_id
                    .or_else(|| known.get(&(link.resource_kind, link.resource_meta_name.clone())).copied());
                let label_id = link
                    .label_id
                    .or_else(|| known.get(&(Kind::Label, link.label_meta_name.clone())).copied());
                let (Some(resource_id), Some(label_id)) = (resource_id, label_id) else {
                    return Err(BackendError::resource(
                        link.resource_kind,
                        &link.resource_meta_name,
                        format!("label \"{}\" could not be resolved", link.label_meta_name),
                    )
                    .into());
                };
                self.writer
                    .create_label_link(
                        self.org_id,
                        LabelLink {
                            label_id,
                            resource_kind: link.resource_kind,
                            resource_id,
                        },
                    )
                    .await?;
                Ok(None)
            }
        }
    }

    fn require(id: Option<PlatformId>, kind: Kind, meta_name: &str) -> Result<PlatformId> {
        id.ok_or_else(|| {
            StackplateError::internal(format!("{kind} \"{meta_name}\" has no backend ID"))
        })
    }

    fn summarize(plan: &ApplyPlan, results: Vec<ActionResult>) -> ExecutionResult {
        let mut execution = ExecutionResult {
            realized: plan.unchanged.clone(),
            ..ExecutionResult::default()
        };

        for result in &results {
            let action = &plan.actions[result.index];
            if result.success {
                execution.successful += 1;
            } else if result.skipped {
                execution.skipped += 1;
            } else {
                execution.failed += 1;
            }

            match (action.action_type, result.success) {
                (ActionType::Create | ActionType::Update, true) => {
                    if let Some(id) = result.id {
                        execution.realized.push(action.stack_resource(id));
                    }
                }
                (ActionType::Remove, false) => {
                    if let Some(id) = action.id {
                        execution.realized.push(action.stack_resource(id));
                    }
                }
                _ => {}
            }

            if let Some(reason) = result.error.as_ref().filter(|_| !result.success) {
                execution.failures.push(ApplyFailure {
                    kind: action.kind,
                    meta_name: action.meta_name.clone(),
                    reason: reason.clone(),
                });
            }
        }

        execution
            .realized
            .sort_by(|a, b| (a.kind, &a.meta_name).cmp(&(b.kind, &b.meta_name)));
        execution.results = results;
        execution
    }
}
