//! Scripted backend for tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

use super::{BackendError, BackendRequest, ModelBackend, TextStream};
use crate::models::Mode;

/// What the mock does for one mode.
#[derive(Debug, Clone)]
pub enum MockScript {
    /// Emit the fragments in order, sleeping `delay` before each.
    Chunks {
        fragments: Vec<String>,
        delay: Duration,
    },
    /// Emit the fragments, then fail mid-stream.
    FailAfter {
        fragments: Vec<String>,
        message: String,
    },
    /// Fail before any output.
    Reject(String),
    /// Never produce anything.
    Hang,
}

impl MockScript {
    /// Serialize `items` as one JSON array and cut it into `pieces` fragments.
    pub fn items(items: &[Value], pieces: usize) -> Self {
        Self::Chunks {
            fragments: split_text(&Value::Array(items.to_vec()).to_string(), pieces),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        match self {
            Self::Chunks { fragments, .. } => Self::Chunks { fragments, delay },
            other => other,
        }
    }
}

/// Split text into `pieces` roughly equal parts on char boundaries.
pub fn split_text(text: &str, pieces: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = chars.len().div_ceil(pieces.max(1)).max(1);
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

pub struct MockBackend {
    scripts: Mutex<HashMap<Mode, MockScript>>,
    calls: AtomicUsize,
    history: Mutex<Vec<Mode>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, mode: Mode, script: MockScript) -> Self {
        self.set_script(mode, script);
        self
    }

    /// Replace the script for a mode; later calls use the new one.
    pub fn set_script(&self, mode: Mode, script: MockScript) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(mode, script);
        }
    }

    /// Total `generate` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Modes requested, in call order.
    pub fn history(&self) -> Vec<Mode> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: BackendRequest) -> Result<TextStream, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut history) = self.history.lock() {
            history.push(request.mode);
        }

        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|s| s.get(&request.mode).cloned())
            .unwrap_or_else(|| {
                MockScript::Reject(format!("No mock script for mode {}", request.mode))
            });

        match script {
            MockScript::Chunks { fragments, delay } => {
                Ok(futures_util::stream::iter(fragments)
                    .then(move |fragment| async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        Ok::<_, BackendError>(fragment)
                    })
                    .boxed())
            }
            MockScript::FailAfter { fragments, message } => {
                let items = fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(BackendError::StreamInterrupted(message))));
                Ok(futures_util::stream::iter(items).boxed())
            }
            MockScript::Reject(message) => Err(BackendError::Api {
                status: 500,
                message,
            }),
            MockScript::Hang => Ok(futures_util::stream::pending().boxed()),
        }
    }
}
