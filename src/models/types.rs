use serde::{Deserialize, Serialize};

/// One entry of the model catalog. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Short stable key, unique within the registry (e.g. "gpt")
    pub id: String,
    /// Name shown in panels and used as the key of persisted responses
    pub display_name: String,
    pub provider_label: String,
    /// Opaque identifier handed to the routing API (e.g. "openai/gpt-4o")
    pub backend_route_id: String,
    pub description: String,
    pub tier: ModelTier,
}

impl ModelDescriptor {
    pub fn new(
        id: &str,
        display_name: &str,
        provider_label: &str,
        backend_route_id: &str,
        description: &str,
        tier: ModelTier,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            provider_label: provider_label.to_string(),
            backend_route_id: backend_route_id.to_string(),
            description: description.to_string(),
            tier,
        }
    }
}

/// Pricing tier shown in the model picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Pro,
    Free,
}

/// Filter tabs of the model picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelCategory {
    #[default]
    All,
    Pro,
    Free,
    OpenAI,
    Anthropic,
    Google,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 6] = [
        ModelCategory::All,
        ModelCategory::Pro,
        ModelCategory::Free,
        ModelCategory::OpenAI,
        ModelCategory::Anthropic,
        ModelCategory::Google,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All Models",
            Self::Pro => "Pro Models",
            Self::Free => "Free Models",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Google => "Google",
        }
    }

    pub fn matches(&self, model: &ModelDescriptor) -> bool {
        match self {
            Self::All => true,
            Self::Pro => model.tier == ModelTier::Pro,
            Self::Free => model.tier == ModelTier::Free,
            Self::OpenAI => model.provider_label == "OpenAI",
            Self::Anthropic => model.provider_label == "Anthropic",
            Self::Google => model.provider_label == "Google",
        }
    }

    /// Next tab, wrapping around
    pub fn cycle(&self) -> Self {
        let idx = Self::ALL.iter().position(|c| c == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Parse from a CLI value ("pro", "openai", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(Self::All),
            "pro" => Some(Self::Pro),
            "free" => Some(Self::Free),
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            "google" => Some(Self::Google),
            _ => None,
        }
    }
}

// Wire types for the routing API (OpenAI-compatible chat completions)

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Request body for `POST /chat/completions`
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Response body. Every level is optional so that a well-formed payload
/// without a completion can be told apart from a malformed one.
#[derive(Debug, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Text of the first choice, if any non-empty one is present
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}

/// Structured error payload that non-2xx responses may carry
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: Option<String>,
}
