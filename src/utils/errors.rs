use thiserror::Error;

/// Main error type for chorus
#[derive(Error, Debug)]
pub enum ChorusError {
    /// The prompt (or another user-supplied value) was rejected before any I/O
    #[error("{0}")]
    InvalidInput(String),

    #[error(
        "OpenRouter API key is required. Set OPENROUTER_API_KEY, add openrouter.api_key to your config, or pass --api-key."
    )]
    MissingCredential,

    /// Non-2xx, malformed payload or transport failure from the routing API.
    /// The message is shown to the user verbatim.
    #[error("{0}")]
    Backend(String),

    #[error("History store error: {0}")]
    Persistence(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UI error: {0}")]
    Ui(String),
}

pub type Result<T> = std::result::Result<T, ChorusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = ChorusError::Backend("OpenRouter API error: rate limited".to_string());
        assert_eq!(err.to_string(), "OpenRouter API error: rate limited");
    }

    #[test]
    fn test_missing_credential_mentions_env_var() {
        assert!(ChorusError::MissingCredential
            .to_string()
            .contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_persistence_prefix() {
        let err = ChorusError::Persistence("insert failed".to_string());
        assert_eq!(err.to_string(), "History store error: insert failed");
    }
}
