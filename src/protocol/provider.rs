use std::fmt;
use std::str::FromStr;

/// Upstream providers the relay can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    Cohere,
    BedrockMeta,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Mistral,
        Provider::Cohere,
        Provider::BedrockMeta,
    ];

    /// Path segment and config key identifying the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
            Provider::Cohere => "cohere",
            Provider::BedrockMeta => "bedrock-meta",
        }
    }

    /// Human-facing label used in upstream error messages (`"OpenAI HTTP 401"`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Google => "Gemini",
            Provider::Mistral => "Mistral",
            Provider::Cohere => "Cohere",
            Provider::BedrockMeta => "Bedrock",
        }
    }

    /// Model used when the request leaves `model` empty.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-haiku-20240307",
            Provider::Google => "gemini-1.5-pro",
            Provider::Mistral => "mistral-small-latest",
            Provider::Cohere => "command-r-plus",
            Provider::BedrockMeta => "meta.llama3-8b-instruct-v1:0",
        }
    }

    /// Conventional environment variable holding the provider API key.
    /// Bedrock authenticates with AWS credentials instead.
    #[must_use]
    pub const fn api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Google => Some("GOOGLE_API_KEY"),
            Provider::Mistral => Some("MISTRAL_API_KEY"),
            Provider::Cohere => Some("COHERE_API_KEY"),
            Provider::BedrockMeta => None,
        }
    }

    /// Resolve the upstream model for a request, substituting the provider default for `""`.
    #[must_use]
    pub fn model_or_default(self, requested: &str) -> &str {
        if requested.is_empty() {
            self.default_model()
        } else {
            requested
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a path segment names no known provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown provider")]
pub struct UnknownProvider;

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            "mistral" => Ok(Provider::Mistral),
            "cohere" => Ok(Provider::Cohere),
            "bedrock-meta" => Ok(Provider::BedrockMeta),
            _ => Err(UnknownProvider),
        }
    }
}
