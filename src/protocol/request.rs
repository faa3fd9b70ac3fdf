use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProxyError;

pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_TOP_P: f64 = 0.95;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Conversation role accepted from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    #[must_use]
    pub const fn as_upper(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Client request body. Every field may be absent or `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

impl ChatRequest {
    /// Parse a raw request body. An empty (or whitespace-only) body is `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidRequest`] when the body is not a JSON
    /// object of the expected shape.
    pub fn from_body(body: &[u8]) -> Result<Self, ProxyError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ProxyError::InvalidRequest(format!("Malformed chat request: {e}")))
    }
}

/// A fully-populated request. Built once per inbound call by [`normalize`]
/// and only ever handed to adapters by shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub query: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub meta: Map<String, Value>,
}

/// Fill every absent field with its default. This is the only place
/// defaults for these fields are defined.
#[must_use]
pub fn normalize(request: ChatRequest) -> NormalizedChatRequest {
    NormalizedChatRequest {
        model: request.model.unwrap_or_default(),
        messages: request.messages.unwrap_or_default(),
        query: request.query.unwrap_or_default(),
        temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        top_p: request.top_p.unwrap_or(DEFAULT_TOP_P),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        meta: request.meta.unwrap_or_default(),
    }
}

impl NormalizedChatRequest {
    /// Chat turns to send upstream: the explicit messages, or a single user
    /// turn built from `query` (possibly empty).
    #[must_use]
    pub fn turns(&self) -> std::borrow::Cow<'_, [ChatMessage]> {
        if self.messages.is_empty() {
            std::borrow::Cow::Owned(vec![ChatMessage::user(self.query.clone())])
        } else {
            std::borrow::Cow::Borrowed(self.messages.as_slice())
        }
    }

    /// Single prompt string with `"{role}: {content}"` lines, or `query`.
    #[must_use]
    pub fn flattened_prompt(&self) -> String {
        self.join_turns(Role::as_str)
    }

    /// Single prompt string with `"{ROLE}: {content}"` lines, or `query`.
    #[must_use]
    pub fn uppercase_prompt(&self) -> String {
        self.join_turns(Role::as_upper)
    }

    fn join_turns(&self, role_name: fn(Role) -> &'static str) -> String {
        if self.messages.is_empty() {
            return self.query.clone();
        }
        let mut prompt = String::new();
        for (idx, message) in self.messages.iter().enumerate() {
            if idx > 0 {
                prompt.push('\n');
            }
            prompt.push_str(role_name(message.role));
            prompt.push_str(": ");
            prompt.push_str(&message.content);
        }
        prompt
    }
}
