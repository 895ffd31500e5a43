use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    chat::{EntryState, HistorySink, Orchestrator, PersistOutcome, PromptTurn},
    cli::OutputFormat,
    models::{Completer, ModelDescriptor},
    utils::ChorusError,
};

/// Result of a non-interactive run
#[derive(Debug, Serialize, Deserialize)]
pub struct NonInteractiveResult {
    /// The prompt that was executed
    pub prompt: String,
    /// One entry per model, in selection order
    pub responses: Vec<ModelResult>,
    /// What happened to the history record
    pub history: String,
    /// Metadata about the execution
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelResult {
    pub model_id: String,
    pub model: String,
    pub provider: String,
    pub success: bool,
    pub response: Option<String>,
    pub error: Option<String>,
    /// Time until this model's answer (or failure) arrived
    pub duration_ms: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub succeeded: usize,
    pub failed: usize,
    /// Execution time in milliseconds
    pub duration_ms: u128,
}

impl NonInteractiveResult {
    fn from_turn(turn: &PromptTurn, persisted: Option<&PersistOutcome>, duration_ms: u128) -> Self {
        let responses: Vec<ModelResult> = turn
            .entries()
            .iter()
            .map(|entry| ModelResult {
                model_id: entry.model.id.clone(),
                model: entry.model.display_name.clone(),
                provider: entry.model.provider_label.clone(),
                success: entry.state == EntryState::Complete,
                response: entry.full_text.clone(),
                error: entry.failure_reason.clone(),
                duration_ms: entry
                    .settled_at
                    .map(|at| (at - turn.created_at).num_milliseconds())
                    .unwrap_or_default(),
            })
            .collect();

        let succeeded = responses.iter().filter(|r| r.success).count();
        Self {
            prompt: turn.prompt_text.clone(),
            metadata: ExecutionMetadata {
                succeeded,
                failed: responses.len() - succeeded,
                duration_ms,
            },
            responses,
            history: persisted
                .map(PersistOutcome::describe)
                .unwrap_or("history unknown")
                .to_string(),
        }
    }

    /// Every model failed (exit code 1)
    pub fn all_failed(&self) -> bool {
        self.metadata.succeeded == 0
    }
}

/// Non-interactive runner for executing a single fan-out prompt
pub struct NonInteractiveRunner {
    orchestrator: Orchestrator,
    models: Vec<ModelDescriptor>,
}

impl NonInteractiveRunner {
    /// Create a new non-interactive runner. Responses are shown whole, so
    /// there is no reveal.
    pub fn new(
        client: Arc<dyn Completer>,
        sink: Arc<HistorySink>,
        models: Vec<ModelDescriptor>,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(client, sink, None),
            models,
        }
    }

    /// Execute a single prompt and return the result
    pub async fn execute(&mut self, prompt: &str) -> Result<NonInteractiveResult> {
        if !self.orchestrator.client().has_credential() {
            return Err(ChorusError::MissingCredential.into());
        }
        if self.models.is_empty() {
            bail!("No models selected. Pass --model (e.g. --model gpt --model claude)");
        }
        if prompt.trim().is_empty() {
            return Err(ChorusError::InvalidInput("Message cannot be empty".to_string()).into());
        }

        let start_time = std::time::Instant::now();
        if self.orchestrator.submit(prompt, &self.models).is_none() {
            bail!("Prompt was not submitted");
        }
        self.orchestrator.wait_until_settled().await;
        let duration_ms = start_time.elapsed().as_millis();

        // Let the history write finish before reporting
        self.orchestrator.flush().await;

        let Some(turn) = self.orchestrator.current_turn() else {
            bail!("Prompt was not submitted");
        };
        Ok(NonInteractiveResult::from_turn(
            turn,
            self.orchestrator.persist_outcome(),
            duration_ms,
        ))
    }

    /// Format the result according to the output format
    pub fn format_result(&self, result: &NonInteractiveResult, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_else(|e| {
                format!("{{\"error\": \"Failed to serialize result: {}\"}}", e)
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                for (i, response) in result.responses.iter().enumerate() {
                    if i > 0 {
                        output.push('\n');
                    }
                    output.push_str(&format!("=== {} ({}) ===\n", response.model, response.provider));
                    match (&response.response, &response.error) {
                        (Some(text), _) => output.push_str(text),
                        (None, Some(error)) => output.push_str(&format!("[FAIL] {}", error)),
                        (None, None) => output.push_str("[FAIL] no response"),
                    }
                    output.push('\n');
                }
                output
            }
            OutputFormat::Markdown => {
                let mut output = String::new();

                output.push_str("## Prompt\n\n");
                output.push_str(&result.prompt);
                output.push_str("\n\n");

                for response in &result.responses {
                    output.push_str(&format!("## {}\n\n", response.model));
                    match (&response.response, &response.error) {
                        (Some(text), _) => output.push_str(text),
                        (None, error) => output.push_str(&format!(
                            "> **Error:** {}",
                            error.as_deref().unwrap_or("no response")
                        )),
                    }
                    output.push_str("\n\n");
                }

                output.push_str("---\n");
                output.push_str(&format!(
                    "*Models: {} ok, {} failed | Duration: {}ms | {}*\n",
                    result.metadata.succeeded,
                    result.metadata.failed,
                    result.metadata.duration_ms,
                    result.history
                ));

                output
            }
        }
    }
}
