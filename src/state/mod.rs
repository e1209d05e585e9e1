//! Stack state module.
//!
//! This module provides persistent storage for stacks: which backend
//! resources each apply realized, and the apply history.

mod local;
mod lock;
mod memory;
mod store;
mod types;

pub use local::{LocalStackStore, STATE_DIR};
pub use lock::{LockInfo, generate_holder_id};
pub use memory::MemoryStackStore;
#[cfg(test)]
pub use store::MockStackStore;
pub use store::StackStore;
pub use types::{MAX_STACK_EVENTS, Stack, StackEvent, StackOperation, StackResource};
