//! Failure taxonomy and the normalized result type
//!
//! Every network-facing operation in the router terminates in a
//! [`NormalizedResult`]. Component-level failures are carried as [`RouterError`]
//! inside a component and converted at its boundary with [`RouterError::to_failure`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Failure classification shared by discovery, bridge and orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The directory snapshot holds no cards
    NoAgentAvailable,
    /// Remote directory unreachable and no local fallback rule matched
    DiscoveryUnavailable,
    /// Agent card url is not a well-formed http(s) address
    InvalidAgentCard,
    /// Transport-level connection failure to the resolved agent
    AgentUnreachable,
    /// Every envelope variant was rejected by the agent
    AgentProtocolMismatch,
    /// Deadline exceeded at a network step
    Timeout,
    /// Structurally invalid payload from a remote
    MalformedResponse,
}

impl FailureKind {
    /// Stable name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoAgentAvailable => "NoAgentAvailable",
            FailureKind::DiscoveryUnavailable => "DiscoveryUnavailable",
            FailureKind::InvalidAgentCard => "InvalidAgentCard",
            FailureKind::AgentUnreachable => "AgentUnreachable",
            FailureKind::AgentProtocolMismatch => "AgentProtocolMismatch",
            FailureKind::Timeout => "Timeout",
            FailureKind::MalformedResponse => "MalformedResponse",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged union returned by every network-facing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NormalizedResult {
    Success { payload: Value },
    Failure { kind: FailureKind, message: String },
}

impl NormalizedResult {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NormalizedResult::Success { .. })
    }

    /// Failure kind, if this is a failure
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            NormalizedResult::Failure { kind, .. } => Some(*kind),
            NormalizedResult::Success { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            NormalizedResult::Success { payload } => Some(payload),
            NormalizedResult::Failure { .. } => None,
        }
    }
}

/// Main error type for routing operations
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("No agent available: {message}")]
    NoAgentAvailable { message: String },

    #[error("Discovery unavailable: {message}")]
    DiscoveryUnavailable { message: String },

    #[error("Invalid agent card: {message}")]
    InvalidAgentCard { message: String },

    #[error("Agent unreachable: {message}")]
    AgentUnreachable { message: String },

    #[error("Agent protocol mismatch: {message}")]
    AgentProtocolMismatch { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

impl RouterError {
    pub fn no_agent_available<S: Into<String>>(message: S) -> Self {
        Self::NoAgentAvailable {
            message: message.into(),
        }
    }

    pub fn discovery_unavailable<S: Into<String>>(message: S) -> Self {
        Self::DiscoveryUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_agent_card<S: Into<String>>(message: S) -> Self {
        Self::InvalidAgentCard {
            message: message.into(),
        }
    }

    pub fn agent_unreachable<S: Into<String>>(message: S) -> Self {
        Self::AgentUnreachable {
            message: message.into(),
        }
    }

    pub fn protocol_mismatch<S: Into<String>>(message: S) -> Self {
        Self::AgentProtocolMismatch {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn malformed_response<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Classify this error within the failure taxonomy
    ///
    /// Configuration problems surface as `DiscoveryUnavailable` since they only
    /// occur while wiring up the discovery side of a run.
    pub fn kind(&self) -> FailureKind {
        match self {
            RouterError::NoAgentAvailable { .. } => FailureKind::NoAgentAvailable,
            RouterError::DiscoveryUnavailable { .. } => FailureKind::DiscoveryUnavailable,
            RouterError::InvalidAgentCard { .. } => FailureKind::InvalidAgentCard,
            RouterError::AgentUnreachable { .. } => FailureKind::AgentUnreachable,
            RouterError::AgentProtocolMismatch { .. } => FailureKind::AgentProtocolMismatch,
            RouterError::Timeout { .. } => FailureKind::Timeout,
            RouterError::MalformedResponse { .. } => FailureKind::MalformedResponse,
            RouterError::ConfigError(_) => FailureKind::DiscoveryUnavailable,
        }
    }

    /// Convert into the normalized failure shape handed to callers
    pub fn to_failure(&self) -> NormalizedResult {
        let message = match self {
            RouterError::NoAgentAvailable { message }
            | RouterError::DiscoveryUnavailable { message }
            | RouterError::InvalidAgentCard { message }
            | RouterError::AgentUnreachable { message }
            | RouterError::AgentProtocolMismatch { message }
            | RouterError::Timeout { message }
            | RouterError::MalformedResponse { message } => message.clone(),
            RouterError::ConfigError(e) => format!("Configuration error: {e}"),
        };

        NormalizedResult::Failure {
            kind: self.kind(),
            message: sanitize_error_message(&message),
        }
    }
}

impl From<RouterError> for NormalizedResult {
    fn from(error: RouterError) -> Self {
        error.to_failure()
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_MESSAGE_LEN: usize = 500;

/// Strip credentials and sensitive paths from messages that leave the process
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for routing operations
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_conversion_keeps_kind() {
        let error = RouterError::agent_unreachable("connection refused");
        let result = error.to_failure();

        assert_eq!(result.failure_kind(), Some(FailureKind::AgentUnreachable));
        assert!(!result.is_success());
    }

    #[test]
    fn test_every_variant_maps_to_its_kind() {
        let cases = vec![
            (RouterError::no_agent_available("x"), FailureKind::NoAgentAvailable),
            (
                RouterError::discovery_unavailable("x"),
                FailureKind::DiscoveryUnavailable,
            ),
            (RouterError::invalid_agent_card("x"), FailureKind::InvalidAgentCard),
            (RouterError::agent_unreachable("x"), FailureKind::AgentUnreachable),
            (
                RouterError::protocol_mismatch("x"),
                FailureKind::AgentProtocolMismatch,
            ),
            (RouterError::timeout("x"), FailureKind::Timeout),
            (RouterError::malformed_response("x"), FailureKind::MalformedResponse),
        ];

        for (error, expected) in cases {
            assert_eq!(error.kind(), expected, "wrong kind for {error}");
        }
    }

    #[test]
    fn test_normalized_result_serialization_shape() {
        let success = NormalizedResult::success(json!({"jsonrpc": "2.0", "result": {}}));
        let value = serde_json::to_value(&success).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["payload"]["jsonrpc"], "2.0");

        let failure = NormalizedResult::failure(FailureKind::Timeout, "deadline exceeded");
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["kind"], "Timeout");
        assert_eq!(value["message"], "deadline exceeded");
    }

    #[test]
    fn test_failure_message_is_sanitized() {
        let error = RouterError::agent_unreachable("POST failed: token=abc456 password=hunter2");
        match error.to_failure() {
            NormalizedResult::Failure { message, .. } => {
                assert!(!message.contains("abc456"));
                assert!(!message.contains("hunter2"));
                assert!(message.contains("token=***"));
            }
            other => panic!("Expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_long_message_truncation() {
        let long_message = "x".repeat(600);
        let sanitized = sanitize_error_message(&long_message);

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long_message = "ã".repeat(400);
        let sanitized = sanitize_error_message(&long_message);

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_file_path_redaction() {
        let message = "Failed to read /home/user/.ssh/id_rsa and /etc/secrets/api.key";
        let sanitized = sanitize_error_message(message);

        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("/home/user/.ssh/id_rsa"));
    }

    #[test]
    fn test_sanitize_exactly_500_chars() {
        let message = "x".repeat(500);
        let sanitized = sanitize_error_message(&message);
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }
}
