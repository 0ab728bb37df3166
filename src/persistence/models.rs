//! Records kept about routed conversations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata key linking a message to its conversation
pub const CONVERSATION_ID_KEY: &str = "conversation_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Information,
    Action,
    Supervisor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    ToolCall,
    ToolResponse,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One message exchanged between the user and agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub sender: String,
    pub receiver: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            message_type: MessageType::Text,
            sender: sender.into(),
            receiver: None,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    /// Link this message to a conversation
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.metadata.insert(
            CONVERSATION_ID_KEY.to_string(),
            Value::String(conversation_id.into()),
        );
        self
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.metadata.get(CONVERSATION_ID_KEY).and_then(Value::as_str)
    }
}

/// Unit of work handed to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub agent_type: AgentType,
    #[serde(default)]
    pub status: TaskStatus,
    pub result: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(content: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            agent_type,
            status: TaskStatus::Pending,
            result: None,
            metadata: Map::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn start(&mut self) {
        self.transition(TaskStatus::Running, None);
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        self.transition(TaskStatus::Completed, Some(result.into()));
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.transition(TaskStatus::Failed, Some(reason.into()));
    }

    fn transition(&mut self, status: TaskStatus, result: Option<String>) {
        self.status = status;
        if result.is_some() {
            self.result = result;
        }
        self.updated_at = Some(Utc::now());
    }
}

/// Running state of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub current_agent: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            current_agent: None,
            metadata: Map::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Record which agent is handling the conversation
    pub fn hand_to(&mut self, agent: impl Into<String>) {
        self.current_agent = Some(agent.into());
        self.updated_at = Some(Utc::now());
    }
}
