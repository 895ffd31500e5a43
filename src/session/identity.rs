use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Authenticated identity as reported by the session store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }

    /// Email when known, otherwise the raw id
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// Process-wide observable identity. Cloning shares the same state.
#[derive(Clone)]
pub struct AuthSession {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AuthSession {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current identity
    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Publish a new identity. Observers are only woken when it changes.
    pub fn set(&self, identity: Option<Identity>) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        })
    }

    pub fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// Run `listener` on every identity change until the returned
    /// subscription is dropped or unsubscribed.
    pub fn subscribe<F, Fut>(&self, listener: F) -> AuthSubscription
    where
        F: Fn(Option<Identity>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let identity = rx.borrow_and_update().clone();
                listener(identity).await;
            }
        });
        AuthSubscription { task: Some(task) }
    }
}

/// Handle to a registered identity listener
pub struct AuthSubscription {
    task: Option<JoinHandle<()>>,
}

impl AuthSubscription {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
