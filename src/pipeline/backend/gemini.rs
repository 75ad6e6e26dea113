//! Google Gemini backend over `streamGenerateContent` (server-sent events).

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BackendError, BackendRequest, ModelBackend, TextStream};
use crate::config::ServerConfig;
use crate::pipeline::encoder::base64_body;

/// Finish reasons that still mean the text is usable as far as it got.
const ACCEPTED_FINISH_REASONS: &[&str] = &["STOP", "MAX_TOKENS", "FINISH_REASON_UNSPECIFIED"];

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, BackendError> {
        Self::new(&config.api_key, &config.gemini_base_url, &config.model)
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

// ── Request body ───────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

// ── Streamed response chunks ───────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Text carried by one SSE `data:` payload, or why generation stopped.
fn chunk_text(data: &str) -> Result<Option<String>, BackendError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| BackendError::ResponseParsing(e.to_string()))?;

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(BackendError::Blocked(reason));
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(None);
    };
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if !ACCEPTED_FINISH_REASONS.contains(&reason) {
            return Err(BackendError::Blocked(reason.to_string()));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

/// Splits an SSE byte stream into `data:` payloads.
///
/// Lines may be cut anywhere by the transport, including inside a
/// multi-byte character, so bytes are held until a newline arrives.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Payload of a final line that had no trailing newline.
    fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?;
    let data = data.trim();
    (!data.is_empty()).then(|| data.to_string())
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    lines: SseLineBuffer,
    pending: VecDeque<Result<String, BackendError>>,
    finished: bool,
}

impl SseState {
    fn enqueue(&mut self, data: &str) {
        match chunk_text(data) {
            Ok(Some(text)) => self.pending.push_back(Ok(text)),
            Ok(None) => {}
            Err(e) => self.pending.push_back(Err(e)),
        }
    }
}

fn text_stream(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> TextStream {
    let state = SseState {
        bytes,
        lines: SseLineBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    // Nothing after an error is delivered
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for data in state.lines.push(&chunk) {
                        state.enqueue(&data);
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(BackendError::StreamInterrupted(e.to_string())));
                }
                None => {
                    if let Some(data) = state.lines.finish() {
                        state.enqueue(&data);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: BackendRequest) -> Result<TextStream, BackendError> {
        let data = base64_body(&request.document)?;
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: request.system_prompt,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![
                    Part::Text {
                        text: request.user_prompt,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: &request.document.mime_type,
                            data,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: &request.response_schema,
            },
        };

        tracing::debug!(
            model = %self.model,
            mode = %request.mode,
            document = %request.document.name,
            "Calling Gemini streamGenerateContent"
        );

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    BackendError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    BackendError::Timeout
                } else {
                    BackendError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(text_stream(bytes))
    }
}
