//! Shared test helpers: an in-process HTTP server and a scripted completer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::models::{Completer, ModelDescriptor};
use crate::utils::{ChorusError, Result};

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve test router");
    });
    format!("http://{}", addr)
}

/// Requests seen by a mock handler, newest last
#[derive(Clone, Default)]
pub struct Captured {
    inner: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

impl Captured {
    pub fn record(&self, headers: &HeaderMap, body: Value) {
        self.inner.lock().push((headers.clone(), body));
    }

    pub fn last(&self) -> Option<(HeaderMap, Value)> {
        self.inner.lock().last().cloned()
    }
}

/// Completer answering from a fixed table, without any network. A gated
/// model holds its reply until `release` is called.
pub struct CannedCompleter {
    replies: HashMap<String, std::result::Result<String, String>>,
    credential: bool,
    gated: Option<String>,
    release: Arc<Notify>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl CannedCompleter {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            credential: true,
            gated: None,
            release: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, model_id: &str, reply: std::result::Result<&str, &str>) -> Self {
        self.replies.insert(
            model_id.to_string(),
            reply.map(str::to_string).map_err(str::to_string),
        );
        self
    }

    pub fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    pub fn gate(mut self, model_id: &str) -> Self {
        self.gated = Some(model_id.to_string());
        self
    }

    /// Let the gated model answer
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// How many completions were requested
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt text of every request, in arrival order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait::async_trait]
impl Completer for CannedCompleter {
    async fn complete(&self, model: &ModelDescriptor, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if self.gated.as_deref() == Some(model.id.as_str()) {
            self.release.notified().await;
        }
        match self.replies.get(&model.id) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(ChorusError::Backend(reason.clone())),
            None => Err(ChorusError::Backend("no reply".to_string())),
        }
    }

    fn has_credential(&self) -> bool {
        self.credential
    }
}
