//! Message envelope dialects
//!
//! Agents in the wild accept one of two request shapes for the same intent:
//!
//! ```json
//! {"method": "message/send",
//!  "params": {"message": {"role": "user", "messageId": "...",
//!                         "parts": [{"kind": "text", "text": "..."}]}}}
//!
//! {"method": "message",
//!  "params": {"message": {"content": {"type": "text", "text": "..."}}}}
//! ```

use super::jsonrpc::JsonRpcRequest;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// One request dialect the bridge can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeVariant {
    /// `message/send` with typed parts
    StructuredMessage,
    /// `message` with a single content object
    LegacyMessage,
}

impl EnvelopeVariant {
    /// Order in which dialects are tried
    pub const NEGOTIATION_ORDER: [EnvelopeVariant; 2] = [
        EnvelopeVariant::StructuredMessage,
        EnvelopeVariant::LegacyMessage,
    ];

    pub fn method(&self) -> &'static str {
        match self {
            EnvelopeVariant::StructuredMessage => "message/send",
            EnvelopeVariant::LegacyMessage => "message",
        }
    }

    /// Build the request for `text`
    pub fn build(&self, text: &str) -> JsonRpcRequest {
        self.build_with_metadata(text, None)
    }

    /// Build the request for `text`, attaching `metadata` to the params
    pub fn build_with_metadata(&self, text: &str, metadata: Option<Value>) -> JsonRpcRequest {
        let message = match self {
            EnvelopeVariant::StructuredMessage => json!({
                "role": "user",
                "messageId": Uuid::new_v4().to_string(),
                "parts": [{"kind": "text", "text": text}],
            }),
            EnvelopeVariant::LegacyMessage => json!({
                "content": {"type": "text", "text": text},
            }),
        };

        let mut params = Map::new();
        params.insert("message".to_string(), message);
        if let Some(metadata) = metadata {
            params.insert("metadata".to_string(), metadata);
        }

        JsonRpcRequest::new(self.method(), Value::Object(params))
    }

    /// Dialect of an inbound method name
    pub fn from_method(method: &str) -> Option<Self> {
        Self::NEGOTIATION_ORDER
            .into_iter()
            .find(|variant| variant.method() == method)
    }
}

/// Extract the user text from inbound params in either dialect
///
/// Text parts of a structured message are joined with newlines.
pub fn extract_text(params: &Value) -> Option<String> {
    let message = params.get("message")?;

    if let Some(parts) = message.get("parts").and_then(Value::as_array) {
        let texts: Vec<&str> = parts
            .iter()
            .filter(|part| {
                part.get("kind")
                    .or_else(|| part.get("type"))
                    .and_then(Value::as_str)
                    .map(|kind| kind == "text")
                    .unwrap_or(true)
            })
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return Some(texts.join("\n"));
        }
    }

    let text = match message.get("content") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(content) => content
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        None => None,
    };
    text.filter(|text| !text.is_empty())
}
