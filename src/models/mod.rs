// Gateway module for models - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod client;
mod traits;
mod types;

// The catalog is consumed as free functions (`models::registry::find`)
pub mod registry;

// Public re-exports - the ONLY way to access model functionality
pub use client::OpenRouterClient;
pub use traits::Completer;
pub use types::{
    ApiErrorBody, ApiErrorDetail, ChatMessage, ChatRequest, ChatResponse, MessageRole,
    ModelCategory, ModelDescriptor, ModelTier, TokenUsage,
};
