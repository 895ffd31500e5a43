use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::orchestrator::TurnEvent;
use super::turn::TurnId;
use crate::app::RevealConfig;

/// Pace of the progressive display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealSettings {
    pub chars_per_tick: usize,
    pub tick_interval: Duration,
}

impl RevealSettings {
    /// `None` when the reveal is switched off
    pub fn from_config(config: &RevealConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            chars_per_tick: config.chars_per_tick.max(1),
            tick_interval: config.tick_interval(),
        })
    }
}

/// Growing prefixes of a text, `chars_per_tick` characters at a time.
/// Not `Clone`: a reveal runs once.
pub struct Reveal {
    text: String,
    /// Byte offset of the end of the last emitted prefix
    end: usize,
    chars_per_tick: usize,
}

impl Reveal {
    pub fn new(text: impl Into<String>, chars_per_tick: usize) -> Self {
        Self {
            text: text.into(),
            end: 0,
            chars_per_tick: chars_per_tick.max(1),
        }
    }
}

impl Iterator for Reveal {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.end >= self.text.len() {
            return None;
        }
        self.end = self.text[self.end..]
            .char_indices()
            .nth(self.chars_per_tick)
            .map_or(self.text.len(), |(offset, _)| self.end + offset);
        Some(self.text[..self.end].to_string())
    }
}

/// Running reveal task. Dropping the handle stops it.
pub struct RevealHandle {
    token: CancellationToken,
}

impl RevealHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RevealHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Emit one `Revealed` snapshot per tick, then `RevealFinished`.
/// Stops silently once `parent` (the turn) or the handle is cancelled.
pub fn spawn_reveal(
    turn_id: TurnId,
    model_id: String,
    text: String,
    settings: RevealSettings,
    parent: &CancellationToken,
    tx: UnboundedSender<TurnEvent>,
) -> RevealHandle {
    let token = parent.child_token();
    let task_token = token.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for visible in Reveal::new(text, settings.chars_per_tick) {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let event = TurnEvent::Revealed {
                turn_id: turn_id.clone(),
                model_id: model_id.clone(),
                visible,
            };
            if tx.send(event).is_err() {
                return;
            }
        }

        if !task_token.is_cancelled() {
            let _ = tx.send(TurnEvent::RevealFinished { turn_id, model_id });
        }
    });

    RevealHandle { token }
}
