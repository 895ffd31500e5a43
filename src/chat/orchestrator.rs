use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::reveal::{spawn_reveal, RevealHandle, RevealSettings};
use super::sink::{HistorySink, PersistOutcome};
use super::turn::{PromptTurn, TurnId};
use crate::models::{Completer, ModelDescriptor};

/// Everything that can change a turn after submission
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A backend call resolved
    Settled {
        turn_id: TurnId,
        model_id: String,
        outcome: Result<String, String>,
    },
    /// A reveal tick grew the visible text
    Revealed {
        turn_id: TurnId,
        model_id: String,
        visible: String,
    },
    RevealFinished {
        turn_id: TurnId,
        model_id: String,
    },
    /// Every backend call of the turn resolved
    AllSettled { turn_id: TurnId },
    /// The turn went through the history sink
    Persisted {
        turn_id: TurnId,
        outcome: PersistOutcome,
    },
}

impl TurnEvent {
    pub fn turn_id(&self) -> &str {
        match self {
            Self::Settled { turn_id, .. }
            | Self::Revealed { turn_id, .. }
            | Self::RevealFinished { turn_id, .. }
            | Self::AllSettled { turn_id }
            | Self::Persisted { turn_id, .. } => turn_id,
        }
    }
}

struct ActiveTurn {
    turn: PromptTurn,
    token: CancellationToken,
    reveals: HashMap<String, RevealHandle>,
    persisted: Option<PersistOutcome>,
}

/// Fans a prompt out to several models and folds their results into the
/// active turn. The owner (UI loop or runner) is the only writer of turn
/// state; spawned tasks report back through the event channel.
pub struct Orchestrator {
    client: Arc<dyn Completer>,
    sink: Arc<HistorySink>,
    reveal: Option<RevealSettings>,
    tx: UnboundedSender<TurnEvent>,
    rx: UnboundedReceiver<TurnEvent>,
    active: Option<ActiveTurn>,
    drivers: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn Completer>,
        sink: Arc<HistorySink>,
        reveal: Option<RevealSettings>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            sink,
            reveal,
            tx,
            rx,
            active: None,
            drivers: Vec::new(),
        }
    }

    pub fn client(&self) -> &Arc<dyn Completer> {
        &self.client
    }

    /// Start a turn. Returns `None` without doing anything when there is no
    /// model selected or the prompt is blank.
    pub fn submit(&mut self, prompt: &str, models: &[ModelDescriptor]) -> Option<TurnId> {
        if models.is_empty() || prompt.trim().is_empty() {
            debug!("ignoring submit: no models or blank prompt");
            return None;
        }

        self.cancel();

        let turn = PromptTurn::new(prompt, models);
        let turn_id = turn.id.clone();
        info!(turn = %turn_id, models = turn.entries().len(), "submitting prompt");

        self.drivers.retain(|driver| !driver.is_finished());
        self.drivers.push(tokio::spawn(drive_turn(
            Arc::clone(&self.client),
            Arc::clone(&self.sink),
            turn.clone(),
            self.tx.clone(),
        )));

        self.active = Some(ActiveTurn {
            turn,
            token: CancellationToken::new(),
            reveals: HashMap::new(),
            persisted: None,
        });
        Some(turn_id)
    }

    /// Fold one event into the active turn. Returns whether anything changed;
    /// events for any other turn are dropped.
    pub fn apply(&mut self, event: TurnEvent) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if event.turn_id() != active.turn.id {
            trace!(turn = %event.turn_id(), "dropping event for superseded turn");
            return false;
        }

        match event {
            TurnEvent::Settled {
                turn_id,
                model_id,
                outcome,
            } => {
                let Some(entry) = active.turn.entry_mut(&model_id) else {
                    return false;
                };
                if !entry.settle(outcome) {
                    return false;
                }
                if let Some(text) = entry.full_text.clone() {
                    match self.reveal {
                        Some(settings) => {
                            let handle = spawn_reveal(
                                turn_id,
                                model_id.clone(),
                                text,
                                settings,
                                &active.token,
                                self.tx.clone(),
                            );
                            active.reveals.insert(model_id, handle);
                        }
                        None => entry.finish_reveal(),
                    }
                }
                true
            }
            TurnEvent::Revealed {
                model_id, visible, ..
            } => active
                .turn
                .entry_mut(&model_id)
                .is_some_and(|entry| entry.advance_reveal(&visible)),
            TurnEvent::RevealFinished { model_id, .. } => {
                active.reveals.remove(&model_id);
                if let Some(entry) = active.turn.entry_mut(&model_id) {
                    entry.finish_reveal();
                }
                true
            }
            TurnEvent::AllSettled { .. } => true,
            TurnEvent::Persisted { outcome, .. } => {
                active.persisted = Some(outcome);
                true
            }
        }
    }

    /// Apply every queued event without waiting. Returns how many changed state.
    pub fn drain(&mut self) -> usize {
        let mut changed = 0;
        while let Ok(event) = self.rx.try_recv() {
            if self.apply(event) {
                changed += 1;
            }
        }
        changed
    }

    /// Wait for the next event without applying it
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        self.rx.recv().await
    }

    /// Apply events until every entry of the active turn is Complete or Failed
    pub async fn wait_until_settled(&mut self) {
        while self.active.as_ref().is_some_and(|a| !a.turn.is_finished()) {
            match self.rx.recv().await {
                Some(event) => {
                    self.apply(event);
                }
                None => break,
            }
        }
    }

    /// Await every driver so in-flight history writes land, then apply
    /// whatever they reported.
    pub async fn flush(&mut self) {
        for driver in self.drivers.drain(..) {
            if let Err(e) = driver.await {
                warn!("turn driver ended abnormally: {}", e);
            }
        }
        self.drain();
    }

    /// Skip the remaining reveal animation of the active turn
    pub fn finish_reveals(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.reveals.clear();
            active.turn.finish_all_reveals();
        }
    }

    /// Stop the active turn's reveals. Its completions still run to the end
    /// and the driver still persists it.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.token.cancel();
            active.reveals.clear();
        }
    }

    /// Drop the active turn from view. Its driver keeps running, so the turn
    /// is still persisted, and its late events are ignored.
    pub fn clear(&mut self) {
        self.cancel();
        self.active = None;
    }

    pub fn current_turn(&self) -> Option<&PromptTurn> {
        self.active.as_ref().map(|a| &a.turn)
    }

    pub fn persist_outcome(&self) -> Option<&PersistOutcome> {
        self.active.as_ref().and_then(|a| a.persisted.as_ref())
    }

    /// Some backend call of the active turn is still in flight
    pub fn is_busy(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.turn.has_pending())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run every completion of `record` concurrently, report each as it lands,
/// then hand the fully settled turn to the sink once.
async fn drive_turn(
    client: Arc<dyn Completer>,
    sink: Arc<HistorySink>,
    mut record: PromptTurn,
    tx: UnboundedSender<TurnEvent>,
) {
    let turn_id = record.id.clone();

    let calls: Vec<_> = record
        .entries()
        .iter()
        .map(|entry| {
            let client = Arc::clone(&client);
            let model = entry.model.clone();
            let prompt = record.prompt_text.clone();
            let tx = tx.clone();
            let turn_id = turn_id.clone();
            async move {
                let outcome = client
                    .complete(&model, &prompt)
                    .await
                    .map_err(|e| e.to_string());
                match &outcome {
                    Ok(text) => debug!(model = %model.id, chars = text.len(), "model answered"),
                    Err(reason) => warn!(model = %model.id, "model failed: {}", reason),
                }
                // The receiver lives as long as the orchestrator
                let _ = tx.send(TurnEvent::Settled {
                    turn_id,
                    model_id: model.id.clone(),
                    outcome: outcome.clone(),
                });
                (model.id, outcome)
            }
        })
        .collect();

    for (model_id, outcome) in join_all(calls).await {
        if let Some(entry) = record.entry_mut(&model_id) {
            entry.settle(outcome);
        }
    }

    let _ = tx.send(TurnEvent::AllSettled {
        turn_id: turn_id.clone(),
    });

    let outcome = sink.persist(&record).await;
    debug!(turn = %turn_id, outcome = outcome.describe(), "turn finished");
    let _ = tx.send(TurnEvent::Persisted { turn_id, outcome });
}
