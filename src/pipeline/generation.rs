//! Streaming generation request handler.
//!
//! One call to `generate` makes exactly one backend request and yields
//! `Partial*` followed by exactly one terminal event (`Done` or `Error`).
//! The handler keeps no state between calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

use super::backend::{BackendError, BackendRequest, ModelBackend};
use super::partial::PartialArrayDecoder;
use super::schema::{self, ModeConfig};
use super::validation::{decode_prefix, validate_array};
use super::GenerationError;
use crate::config::DEFAULT_GENERATION_TIMEOUT_SECS;
use crate::models::{DocumentPayload, Mode, StudyItem};

const EVENT_BUFFER: usize = 16;

/// One step of a generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// Well-formed items so far; never shrinks, never exceeds the set size.
    Partial(Vec<StudyItem>),
    /// The complete, validated set.
    Done(Vec<StudyItem>),
    Error(GenerationError),
}

impl GenerationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Partial(_))
    }

    pub fn items(&self) -> Option<&[StudyItem]> {
        match self {
            Self::Partial(items) | Self::Done(items) => Some(items),
            Self::Error(_) => None,
        }
    }
}

pub struct GenerationHandler {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
}

impl GenerationHandler {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Parse a wire mode tag.
    pub fn parse_mode(raw: &str) -> Result<Mode, GenerationError> {
        raw.parse::<Mode>()
            .map_err(|_| GenerationError::InvalidMode(raw.to_string()))
    }

    /// Generate for an untrusted mode tag; an unknown tag yields a single
    /// `Error(InvalidMode)` event.
    pub fn generate_for(
        &self,
        document: Option<Arc<DocumentPayload>>,
        mode: &str,
    ) -> ReceiverStream<GenerationEvent> {
        match Self::parse_mode(mode) {
            Ok(mode) => self.generate(document, mode),
            Err(e) => {
                tracing::warn!(mode, "Rejected generation for unknown mode");
                single_event(GenerationEvent::Error(e))
            }
        }
    }

    /// Start one generation. Must be called inside a Tokio runtime.
    pub fn generate(
        &self,
        document: Option<Arc<DocumentPayload>>,
        mode: Mode,
    ) -> ReceiverStream<GenerationEvent> {
        let Some(document) = document else {
            tracing::warn!(%mode, "Generation requested without a document");
            return single_event(GenerationEvent::Error(GenerationError::NoDocument));
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let backend = Arc::clone(&self.backend);
        let config = schema::resolve(mode);
        let timeout = self.timeout;

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("generation", %request_id, %mode);
        tokio::spawn(run(backend, config, document, timeout, tx).instrument(span));

        ReceiverStream::new(rx)
    }
}

fn single_event(event: GenerationEvent) -> ReceiverStream<GenerationEvent> {
    let (tx, rx) = mpsc::channel(1);
    // Capacity 1 and a fresh channel: cannot be full
    let _ = tx.try_send(event);
    ReceiverStream::new(rx)
}

async fn run(
    backend: Arc<dyn ModelBackend>,
    config: ModeConfig,
    document: Arc<DocumentPayload>,
    timeout: Duration,
    tx: mpsc::Sender<GenerationEvent>,
) {
    let started = Instant::now();
    tracing::info!(
        backend = backend.name(),
        document = %document.name,
        "Generation started"
    );

    let work = tokio::time::timeout(
        timeout,
        stream_items(backend.as_ref(), config, document, &tx),
    );
    let outcome = tokio::select! {
        outcome = work => outcome,
        _ = tx.closed() => {
            tracing::debug!("Receiver dropped, generation cancelled");
            return;
        }
    };
    let terminal = match outcome {
        Ok(Ok(items)) => {
            tracing::info!(
                items = items.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generation complete"
            );
            GenerationEvent::Done(items)
        }
        Ok(Err(error)) => {
            tracing::warn!(code = error.code(), %error, "Generation failed");
            GenerationEvent::Error(error)
        }
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Generation timed out");
            GenerationEvent::Error(GenerationError::Timeout {
                secs: timeout.as_secs(),
            })
        }
    };

    if tx.send(terminal).await.is_err() {
        tracing::debug!("Receiver dropped before the terminal event");
    }
}

/// Drive the backend stream, forwarding each growing prefix, and return
/// the validated set.
async fn stream_items(
    backend: &dyn ModelBackend,
    config: ModeConfig,
    document: Arc<DocumentPayload>,
    tx: &mpsc::Sender<GenerationEvent>,
) -> Result<Vec<StudyItem>, GenerationError> {
    let request = BackendRequest {
        mode: config.mode,
        system_prompt: config.system_prompt,
        user_prompt: config.user_prompt,
        document,
        response_schema: config.array_shape.response_schema(),
    };

    let mut fragments = backend.generate(request).await.map_err(backend_failure)?;
    let mut decoder = PartialArrayDecoder::new();
    let mut emitted = 0;

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment.map_err(backend_failure)?;
        if decoder.feed(&fragment) == 0 {
            continue;
        }

        let prefix = decode_prefix(config.item_shape, decoder.elements(), config.array_shape.len);
        if prefix.len() > emitted {
            emitted = prefix.len();
            tracing::debug!(items = emitted, "Partial items");
            if tx.send(GenerationEvent::Partial(prefix)).await.is_err() {
                return Err(GenerationError::Backend("Receiver dropped".into()));
            }
        }
    }

    let mut problems = Vec::new();
    if !decoder.is_opened() {
        problems.push("Expected a JSON array, received none".to_string());
    } else if !decoder.is_closed() {
        problems.push("Response ended before the array was closed".to_string());
    }

    match validate_array(config.array_shape, decoder.elements()) {
        Ok(items) if problems.is_empty() => Ok(items),
        Ok(_) => Err(GenerationError::SchemaValidationFailed { details: problems }),
        Err(mut item_problems) => {
            problems.append(&mut item_problems);
            Err(GenerationError::SchemaValidationFailed { details: problems })
        }
    }
}

fn backend_failure(e: BackendError) -> GenerationError {
    GenerationError::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::mock::{split_text, MockScript};
    use crate::pipeline::backend::MockBackend;
    use serde_json::{json, Value};

    fn document() -> Option<Arc<DocumentPayload>> {
        Some(Arc::new(DocumentPayload {
            name: "biology.pdf".into(),
            mime_type: "application/pdf".into(),
            data: "data:application/pdf;base64,JVBERi0=".into(),
        }))
    }

    fn flashcards(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| {
                json!({
                    "front": format!("front {i}"),
                    "back": format!("back {i}"),
                    "hint": "h"
                })
            })
            .collect()
    }

    fn quiz(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| {
                json!({
                    "question": format!("q{i}"),
                    "options": ["a", "b", "c", "d"],
                    "answer": "B"
                })
            })
            .collect()
    }

    fn handler(backend: MockBackend) -> (GenerationHandler, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        (GenerationHandler::new(backend.clone()), backend)
    }

    async fn collect(stream: ReceiverStream<GenerationEvent>) -> Vec<GenerationEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn flashcard_success_streams_prefixes_then_done() {
        let (handler, backend) = handler(
            MockBackend::new().with_script(Mode::FlashCard, MockScript::items(&flashcards(4), 9)),
        );

        let events = collect(handler.generate(document(), Mode::FlashCard)).await;
        let (terminal, partials) = events.split_last().unwrap();

        let GenerationEvent::Done(items) = terminal else {
            panic!("expected Done, got {terminal:?}");
        };
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|i| i.as_flashcard().is_some()));
        assert_eq!(backend.call_count(), 1);

        // Strictly growing prefixes of the final set
        let mut last = 0;
        for event in partials {
            let GenerationEvent::Partial(prefix) = event else {
                panic!("non-terminal event expected");
            };
            assert!(prefix.len() > last && prefix.len() <= 4);
            assert_eq!(prefix[..], items[..prefix.len()]);
            last = prefix.len();
        }
        assert!(last >= 1);
    }

    #[tokio::test]
    async fn three_items_then_end_fails_validation() {
        let (handler, _) = handler(
            MockBackend::new().with_script(Mode::NormalQuiz, MockScript::items(&quiz(3), 5)),
        );

        let events = collect(handler.generate(document(), Mode::NormalQuiz)).await;
        assert!(!events.iter().any(|e| matches!(e, GenerationEvent::Done(_))));
        match events.last() {
            Some(GenerationEvent::Error(GenerationError::SchemaValidationFailed { details })) => {
                assert_eq!(details[0], "Array must contain exactly 4 element(s), got 3");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn missing_field_fails_rather_than_pads() {
        let mut items = flashcards(4);
        items[2] = json!({"front": "only front"});
        let (handler, _) = handler(
            MockBackend::new().with_script(Mode::FlashCard, MockScript::items(&items, 1)),
        );

        let events = collect(handler.generate(document(), Mode::FlashCard)).await;
        // The prefix stops before the bad item
        assert!(matches!(&events[0], GenerationEvent::Partial(prefix) if prefix.len() == 2));
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Error(GenerationError::SchemaValidationFailed { details }))
                if details == &vec!["[2].back: required".to_string()]
        ));
    }

    #[tokio::test]
    async fn no_document_yields_single_error_without_backend_call() {
        let (handler, backend) = handler(MockBackend::new());
        let events = collect(handler.generate(None, Mode::Match)).await;
        assert_eq!(events, vec![GenerationEvent::Error(GenerationError::NoDocument)]);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_mode_tag_rejected() {
        let (handler, backend) = handler(MockBackend::new());
        let events = collect(handler.generate_for(document(), "essay")).await;
        assert_eq!(
            events,
            vec![GenerationEvent::Error(GenerationError::InvalidMode("essay".into()))]
        );
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn known_mode_tag_accepted() {
        let (handler, _) = handler(
            MockBackend::new().with_script(Mode::Learn, MockScript::items(&quiz(4), 2)),
        );
        let events = collect(handler.generate_for(document(), "learn")).await;
        assert!(matches!(events.last(), Some(GenerationEvent::Done(items)) if items.len() == 4));
    }

    #[tokio::test]
    async fn backend_rejection_is_terminal_error() {
        let rejecting = MockScript::Reject("quota exceeded".into());
        let (handler, _) = handler(MockBackend::new().with_script(Mode::Match, rejecting));
        let events = collect(handler.generate(document(), Mode::Match)).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            GenerationEvent::Error(GenerationError::Backend(msg)) if msg.contains("quota exceeded")
        ));
    }

    #[tokio::test]
    async fn mid_stream_failure_after_partials() {
        let text = Value::Array(quiz(4)).to_string();
        let mut fragments = split_text(&text, 4);
        fragments.truncate(3);
        let (handler, _) = handler(MockBackend::new().with_script(
            Mode::NormalQuiz,
            MockScript::FailAfter {
                fragments,
                message: "connection reset".into(),
            },
        ));

        let events = collect(handler.generate(document(), Mode::NormalQuiz)).await;
        assert!(matches!(events.first(), Some(GenerationEvent::Partial(_))));
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Error(GenerationError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn more_than_four_items_fails() {
        let (handler, _) = handler(
            MockBackend::new().with_script(Mode::Learn, MockScript::items(&quiz(5), 3)),
        );
        let events = collect(handler.generate(document(), Mode::Learn)).await;
        for event in &events {
            if let Some(items) = event.items() {
                assert!(items.len() <= 4);
            }
        }
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Error(GenerationError::SchemaValidationFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn unterminated_array_fails() {
        let text = Value::Array(quiz(4)).to_string();
        let (handler, _) = handler(MockBackend::new().with_script(
            Mode::NormalQuiz,
            MockScript::Chunks {
                fragments: vec![text.trim_end_matches(']').to_string()],
                delay: Duration::ZERO,
            },
        ));
        let events = collect(handler.generate(document(), Mode::NormalQuiz)).await;
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Error(GenerationError::SchemaValidationFailed { details }))
                if details[0] == "Response ended before the array was closed"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_backend_times_out() {
        let (handler, _) =
            handler(MockBackend::new().with_script(Mode::FlashCard, MockScript::Hang));
        let handler = handler.with_timeout(Duration::from_secs(60));

        let events = collect(handler.generate(document(), Mode::FlashCard)).await;
        assert_eq!(
            events,
            vec![GenerationEvent::Error(GenerationError::Timeout { secs: 60 })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stream_keeps_partials_before_timeout() {
        let script =
            MockScript::items(&flashcards(4), 8).with_delay(Duration::from_secs(10));
        let (handler, _) = handler(MockBackend::new().with_script(Mode::FlashCard, script));
        let handler = handler.with_timeout(Duration::from_secs(45));

        let events = collect(handler.generate(document(), Mode::FlashCard)).await;
        assert!(events.iter().any(|e| matches!(e, GenerationEvent::Partial(_))));
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Error(GenerationError::Timeout { secs: 45 }))
        ));
    }
}
