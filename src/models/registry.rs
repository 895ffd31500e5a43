//! Static catalog of the models a prompt can be sent to.

use once_cell::sync::Lazy;

use super::types::{ModelCategory, ModelDescriptor, ModelTier};
use crate::utils::{ChorusError, Result};

static CATALOG: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    vec![
        ModelDescriptor::new(
            "gpt",
            "GPT",
            "OpenAI",
            "openai/gpt-4o",
            "Latest GPT-4 model with improved performance",
            ModelTier::Pro,
        ),
        ModelDescriptor::new(
            "claude",
            "Claude",
            "Anthropic",
            "anthropic/claude-3-5-sonnet-20241022",
            "Fast and efficient Claude model",
            ModelTier::Pro,
        ),
        ModelDescriptor::new(
            "gemini",
            "Gemini",
            "Google",
            "google/gemini-2.0-flash-001",
            "Google's latest multimodal model",
            ModelTier::Pro,
        ),
        ModelDescriptor::new(
            "deepseek",
            "DeepSeek",
            "DeepSeek",
            "deepseek/deepseek-r1-0528",
            "Advanced reasoning and coding capabilities",
            ModelTier::Free,
        ),
    ]
});

/// Full catalog in its stable order
pub fn list() -> &'static [ModelDescriptor] {
    &CATALOG
}

/// Look up a model by its short id
pub fn find(id: &str) -> Option<&'static ModelDescriptor> {
    CATALOG.iter().find(|m| m.id == id)
}

/// Models in `category` whose name, provider or description contains `query`
/// (case-insensitive). An empty query matches everything.
pub fn search(query: &str, category: ModelCategory) -> Vec<&'static ModelDescriptor> {
    let query = query.trim().to_lowercase();
    CATALOG
        .iter()
        .filter(|m| category.matches(m))
        .filter(|m| {
            query.is_empty()
                || m.display_name.to_lowercase().contains(&query)
                || m.provider_label.to_lowercase().contains(&query)
                || m.description.to_lowercase().contains(&query)
        })
        .collect()
}

/// Resolve user-supplied ids into descriptors, keeping their order and
/// dropping repeats. Unknown ids are rejected.
pub fn resolve<S: AsRef<str>>(ids: &[S]) -> Result<Vec<ModelDescriptor>> {
    let mut resolved: Vec<ModelDescriptor> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.as_ref().trim();
        let model = find(id).ok_or_else(|| {
            let known: Vec<&str> = CATALOG.iter().map(|m| m.id.as_str()).collect();
            ChorusError::InvalidInput(format!(
                "Unknown model '{}'. Available: {}",
                id,
                known.join(", ")
            ))
        })?;
        if !resolved.iter().any(|m| m.id == model.id) {
            resolved.push(model.clone());
        }
    }
    Ok(resolved)
}
