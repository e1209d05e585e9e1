//! In-memory stack store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::id::PlatformId;

use super::store::StackStore;
use super::types::Stack;

/// Stack store keeping stacks in process memory.
#[derive(Debug, Default)]
pub struct MemoryStackStore {
    stacks: Mutex<HashMap<PlatformId, Stack>>,
}

impl MemoryStackStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StackStore for MemoryStackStore {
    async fn load(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<Option<Stack>> {
        Ok(self
            .stacks
            .lock()
            .await
            .get(&stack_id)
            .filter(|s| s.org_id == org_id)
            .cloned())
    }

    async fn list(&self, org_id: PlatformId) -> Result<Vec<Stack>> {
        let mut stacks: Vec<Stack> = self
            .stacks
            .lock()
            .await
            .values()
            .filter(|s| s.org_id == org_id)
            .cloned()
            .collect();
        stacks.sort_by_key(|s| s.created_at);
        Ok(stacks)
    }

    async fn save(&self, stack: &Stack) -> Result<()> {
        self.stacks.lock().await.insert(stack.id, stack.clone());
        Ok(())
    }

    async fn delete(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<()> {
        let mut stacks = self.stacks.lock().await;
        if stacks.get(&stack_id).is_some_and(|s| s.org_id == org_id) {
            stacks.remove(&stack_id);
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
