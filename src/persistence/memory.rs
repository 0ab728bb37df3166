//! In-memory store with per-record expiration

use super::models::{ConversationContext, Message, Task, TaskStatus};
use super::{PersistenceError, PersistencePort, PersistenceResult};
use crate::config::PersistenceSection;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Lifetime of each record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub conversation: Duration,
    pub message: Duration,
    pub task: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from(&PersistenceSection::default())
    }
}

impl From<&PersistenceSection> for TtlPolicy {
    fn from(section: &PersistenceSection) -> Self {
        Self {
            conversation: Duration::from_secs(section.conversation_ttl_secs),
            message: Duration::from_secs(section.message_ttl_secs),
            task: Duration::from_secs(section.task_ttl_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct StoreState {
    conversations: HashMap<String, Expiring<ConversationContext>>,
    messages: HashMap<String, Expiring<Message>>,
    conversation_messages: HashMap<String, Expiring<Vec<String>>>,
    tasks: HashMap<String, Expiring<Task>>,
    tasks_by_status: HashMap<TaskStatus, Expiring<HashSet<String>>>,
}

fn live<'a, T>(map: &'a HashMap<String, Expiring<T>>, key: &str, now: Instant) -> Option<&'a T> {
    map.get(key)
        .filter(|entry| entry.is_live(now))
        .map(|entry| &entry.value)
}

fn purge<K: Eq + std::hash::Hash, T>(map: &mut HashMap<K, Expiring<T>>, now: Instant) -> usize {
    let before = map.len();
    map.retain(|_, entry| entry.is_live(now));
    before - map.len()
}

/// Thread-safe in-memory implementation of [`PersistencePort`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    ttl: TtlPolicy,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: TtlPolicy) -> Self {
        Self {
            state: Arc::default(),
            ttl,
        }
    }

    pub fn ttl(&self) -> TtlPolicy {
        self.ttl
    }

    /// Drop every expired record, returning how many were removed
    pub fn purge_expired(&self) -> PersistenceResult<usize> {
        let now = Instant::now();
        let mut state = self.write()?;
        let removed = purge(&mut state.conversations, now)
            + purge(&mut state.messages, now)
            + purge(&mut state.conversation_messages, now)
            + purge(&mut state.tasks, now)
            + purge(&mut state.tasks_by_status, now);
        debug!(removed, "Purged expired records");
        Ok(removed)
    }

    fn read(&self) -> PersistenceResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))
    }

    fn write(&self) -> PersistenceResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))
    }

    fn index_task(&self, state: &mut StoreState, task: &Task) {
        let mut ids = state
            .tasks_by_status
            .remove(&task.status)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value)
            .unwrap_or_default();
        ids.insert(task.id.clone());
        // Adding to a status set refreshes its expiry
        state
            .tasks_by_status
            .insert(task.status, Expiring::new(ids, self.ttl.task));
    }
}

fn unindex_task(state: &mut StoreState, status: TaskStatus, id: &str) {
    if let Some(entry) = state.tasks_by_status.get_mut(&status) {
        entry.value.remove(id);
    }
}

#[async_trait]
impl PersistencePort for InMemoryStore {
    async fn save_conversation(
        &self,
        conversation: &ConversationContext,
    ) -> PersistenceResult<()> {
        let mut state = self.write()?;
        state.conversations.insert(
            conversation.id.clone(),
            Expiring::new(conversation.clone(), self.ttl.conversation),
        );
        debug!(conversation_id = %conversation.id, "Conversation saved");
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> PersistenceResult<Option<ConversationContext>> {
        let state = self.read()?;
        Ok(live(&state.conversations, id, Instant::now()).cloned())
    }

    async fn delete_conversation(&self, id: &str) -> PersistenceResult<bool> {
        let mut state = self.write()?;
        let removed = state.conversations.remove(id).is_some();
        if let Some(list) = state.conversation_messages.remove(id) {
            for message_id in list.value {
                state.messages.remove(&message_id);
            }
        }
        Ok(removed)
    }

    async fn save_message(&self, message: &Message) -> PersistenceResult<()> {
        let mut state = self.write()?;
        state.messages.insert(
            message.id.clone(),
            Expiring::new(message.clone(), self.ttl.message),
        );

        if let Some(conversation_id) = message.conversation_id() {
            let now = Instant::now();
            let mut ids = state
                .conversation_messages
                .remove(conversation_id)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value)
                .unwrap_or_default();
            ids.push(message.id.clone());
            state.conversation_messages.insert(
                conversation_id.to_string(),
                Expiring::new(ids, self.ttl.message),
            );
        }

        debug!(message_id = %message.id, "Message saved");
        Ok(())
    }

    async fn get_messages(&self, conversation_id: &str) -> PersistenceResult<Vec<Message>> {
        let state = self.read()?;
        let now = Instant::now();

        Ok(live(&state.conversation_messages, conversation_id, now)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| live(&state.messages, id, now).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_message(&self, id: &str) -> PersistenceResult<bool> {
        let mut state = self.write()?;
        let Some(removed) = state.messages.remove(id) else {
            return Ok(false);
        };
        if let Some(conversation_id) = removed.value.conversation_id() {
            if let Some(list) = state.conversation_messages.get_mut(conversation_id) {
                list.value.retain(|message_id| message_id != id);
            }
        }
        Ok(true)
    }

    async fn save_task(&self, task: &Task) -> PersistenceResult<()> {
        let mut state = self.write()?;
        state
            .tasks
            .insert(task.id.clone(), Expiring::new(task.clone(), self.ttl.task));
        self.index_task(&mut state, task);
        debug!(task_id = %task.id, status = ?task.status, "Task saved");
        Ok(())
    }

    async fn get_task(&self, id: &str) -> PersistenceResult<Option<Task>> {
        let state = self.read()?;
        Ok(live(&state.tasks, id, Instant::now()).cloned())
    }

    async fn update_task(&self, task: &Task) -> PersistenceResult<()> {
        let mut state = self.write()?;
        let old_status = live(&state.tasks, &task.id, Instant::now())
            .map(|old| old.status)
            .ok_or_else(|| PersistenceError::not_found("Task", task.id.clone()))?;

        if old_status != task.status {
            unindex_task(&mut state, old_status, &task.id);
        }
        state
            .tasks
            .insert(task.id.clone(), Expiring::new(task.clone(), self.ttl.task));
        self.index_task(&mut state, task);
        debug!(task_id = %task.id, from = ?old_status, to = ?task.status, "Task updated");
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> PersistenceResult<bool> {
        let mut state = self.write()?;
        match state.tasks.remove(id) {
            Some(entry) => {
                unindex_task(&mut state, entry.value.status, id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn task_ids_with_status(&self, status: TaskStatus) -> PersistenceResult<Vec<String>> {
        let state = self.read()?;
        let now = Instant::now();

        let mut ids: Vec<String> = state
            .tasks_by_status
            .get(&status)
            .filter(|entry| entry.is_live(now))
            .map(|entry| {
                entry
                    .value
                    .iter()
                    .filter(|id| {
                        live(&state.tasks, id, now)
                            .map(|task| task.status == status)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}
