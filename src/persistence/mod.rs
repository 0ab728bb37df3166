//! Conversation, task and message persistence
//!
//! [`PersistencePort`] is the storage seam; [`InMemoryStore`] implements it with
//! per-record expiration.

pub mod memory;
pub mod models;

pub use memory::{InMemoryStore, TtlPolicy};
pub use models::{AgentType, ConversationContext, Message, MessageType, Task, TaskStatus};

use async_trait::async_trait;
use thiserror::Error;

/// Storage failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PersistenceError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Storage for routing records
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn save_conversation(&self, conversation: &ConversationContext)
        -> PersistenceResult<()>;

    async fn get_conversation(&self, id: &str) -> PersistenceResult<Option<ConversationContext>>;

    /// Returns whether a conversation was removed
    async fn delete_conversation(&self, id: &str) -> PersistenceResult<bool>;

    /// Save a message, appending it to its conversation's list when linked
    async fn save_message(&self, message: &Message) -> PersistenceResult<()>;

    /// Messages of a conversation in the order they were saved
    async fn get_messages(&self, conversation_id: &str) -> PersistenceResult<Vec<Message>>;

    async fn delete_message(&self, id: &str) -> PersistenceResult<bool>;

    async fn save_task(&self, task: &Task) -> PersistenceResult<()>;

    async fn get_task(&self, id: &str) -> PersistenceResult<Option<Task>>;

    /// Replace a stored task, moving it between status sets
    async fn update_task(&self, task: &Task) -> PersistenceResult<()>;

    async fn delete_task(&self, id: &str) -> PersistenceResult<bool>;

    /// Ids of live tasks with `status`, sorted
    async fn task_ids_with_status(&self, status: TaskStatus) -> PersistenceResult<Vec<String>>;
}
