use async_trait::async_trait;

use super::types::ModelDescriptor;
use crate::utils::Result;

/// Core trait that every completion backend must implement
#[async_trait]
pub trait Completer: Send + Sync {
    /// Send `prompt` to `model` and return the completion text
    async fn complete(&self, model: &ModelDescriptor, prompt: &str) -> Result<String>;

    /// Whether a routing credential is currently available
    fn has_credential(&self) -> bool {
        true
    }

    /// Supply a credential after construction (interactive key prompt)
    fn set_credential(&self, _key: &str) {}
}
