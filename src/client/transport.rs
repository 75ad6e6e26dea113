//! Event sources for the session driver.
//!
//! `GenerationSource::open` turns one ticket into a stream of
//! `GenerationEvent`s that always ends with exactly one terminal event.
//! The in-process handler and the NDJSON HTTP client both implement it.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;
use thiserror::Error;

use crate::api::endpoints::health::HealthResponse;
use crate::api::error::ErrorBody;
use crate::api::types::{GenerateRequest, StreamErrorLine};
use crate::models::{DocumentPayload, Mode, StudyItem};
use crate::pipeline::schema::{self, ArrayShape};
use crate::pipeline::validation::decode_item;
use crate::pipeline::{GenerationError, GenerationEvent, GenerationHandler};

#[async_trait]
pub trait GenerationSource: Send + Sync {
    async fn open(
        &self,
        document: Arc<DocumentPayload>,
        mode: Mode,
    ) -> BoxStream<'static, GenerationEvent>;
}

#[async_trait]
impl GenerationSource for GenerationHandler {
    async fn open(
        &self,
        document: Arc<DocumentPayload>,
        mode: Mode,
    ) -> BoxStream<'static, GenerationEvent> {
        self.generate(Some(document), mode).boxed()
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot reach generation server at {0}")]
    Connection(String),

    #[error("Generation server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed stream line: {0}")]
    Protocol(String),

    #[error("Stream ended before generation completed")]
    Truncated,

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Client for a remote `POST /generate`.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerationClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn request_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_connect() {
            ClientError::Connection(self.base_url.clone())
        } else {
            ClientError::HttpClient(e.to_string())
        }
    }

    async fn start(
        &self,
        document: &DocumentPayload,
        mode: Mode,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = GenerateRequest {
            files: vec![document.clone()],
            mode: mode.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Backend(self.request_error(e).to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        Err(match message.as_str() {
            "No files provided" => GenerationError::NoDocument,
            "Invalid mode" => GenerationError::InvalidMode(mode.to_string()),
            _ => GenerationError::Backend(
                ClientError::Status {
                    status: status.as_u16(),
                    message,
                }
                .to_string(),
            ),
        })
    }
}

#[async_trait]
impl GenerationSource for HttpGenerationClient {
    async fn open(
        &self,
        document: Arc<DocumentPayload>,
        mode: Mode,
    ) -> BoxStream<'static, GenerationEvent> {
        let response = match self.start(&document, mode).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%mode, error = %e, "Generation request rejected");
                return futures_util::stream::iter([GenerationEvent::Error(e)]).boxed();
            }
        };

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        ndjson_events(bytes, schema::resolve(mode).array_shape)
    }
}

struct NdjsonState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    shape: ArrayShape,
    buffer: Vec<u8>,
    pending: VecDeque<GenerationEvent>,
    last: Vec<StudyItem>,
    finished: bool,
}

impl NdjsonState {
    fn fail(&mut self, error: GenerationError) {
        self.pending.push_back(GenerationEvent::Error(error));
        self.finished = true;
    }

    fn take_lines(&mut self) {
        while !self.finished {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.parse_line(&String::from_utf8_lossy(&line));
        }
    }

    fn parse_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(values)) => match self.decode_items(&values) {
                Ok(items) => {
                    self.last = items.clone();
                    self.pending.push_back(GenerationEvent::Partial(items));
                }
                Err(details) => self.fail(GenerationError::SchemaValidationFailed { details }),
            },
            Ok(value @ Value::Object(_)) => match serde_json::from_value::<StreamErrorLine>(value) {
                Ok(line) => self.fail(line.into_error()),
                Err(e) => self.fail(protocol_error(e.to_string())),
            },
            Ok(_) => self.fail(protocol_error(line.to_string())),
            Err(e) => self.fail(protocol_error(e.to_string())),
        }
    }

    fn decode_items(&self, values: &[Value]) -> Result<Vec<StudyItem>, Vec<String>> {
        if values.len() > self.shape.len {
            return Err(vec![format!(
                "Array must contain exactly {} element(s), got {}",
                self.shape.len,
                values.len()
            )]);
        }
        let mut items = Vec::with_capacity(values.len());
        let mut problems = Vec::new();
        for (index, value) in values.iter().enumerate() {
            match decode_item(self.shape.item, index, value) {
                Ok(item) => items.push(item),
                Err(mut p) => problems.append(&mut p),
            }
        }
        if problems.is_empty() {
            Ok(items)
        } else {
            Err(problems)
        }
    }

    /// Clean end of body: a full set is `Done`, anything else is truncation.
    fn finish(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        self.parse_line(&String::from_utf8_lossy(&rest));
        if self.finished {
            return;
        }
        if self.last.len() == self.shape.len {
            self.pending.push_back(GenerationEvent::Done(self.last.clone()));
            self.finished = true;
        } else {
            self.fail(GenerationError::Backend(ClientError::Truncated.to_string()));
        }
    }
}

fn protocol_error(detail: String) -> GenerationError {
    GenerationError::Backend(ClientError::Protocol(detail).to_string())
}

fn ndjson_events(
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    shape: ArrayShape,
) -> BoxStream<'static, GenerationEvent> {
    let state = NdjsonState {
        bytes,
        shape,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        last: Vec::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.take_lines();
                }
                Some(Err(e)) => state.fail(GenerationError::Backend(e.to_string())),
                None => state.finish(),
            }
        }
    })
    .boxed()
}
