//! Stack store trait definition.
//!
//! This module defines the common interface for stack storage backends.

use async_trait::async_trait;

use crate::error::Result;
use crate::id::PlatformId;

use super::types::Stack;

/// Trait for stack storage backends.
///
/// Saves of the same stack are serialized by the store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackStore: Send + Sync {
    /// Loads a stack of an org.
    ///
    /// Returns `None` if the stack does not exist or belongs to another org.
    async fn load(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<Option<Stack>>;

    /// Lists the stacks of an org.
    async fn list(&self, org_id: PlatformId) -> Result<Vec<Stack>>;

    /// Inserts or replaces a stack.
    async fn save(&self, stack: &Stack) -> Result<()>;

    /// Deletes a stack. Deleting a missing stack is not an error.
    async fn delete(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
