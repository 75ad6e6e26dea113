//! Generation session: the client-side state machine.
//!
//! A pure reducer. `activate_mode` decides whether a request should be
//! issued and hands back a ticket carrying a fresh activation id; events
//! come back through `apply` tagged with that id, and only events for the
//! current activation change state. Running the request is the caller's
//! business (see `driver`).

use std::fmt;
use std::sync::Arc;

use crate::config::ITEMS_PER_SET;
use crate::models::{DocumentPayload, Mode, RawFile, StudyItem};
use crate::pipeline::encoder::{self, EncodeError};
use crate::pipeline::{GenerationError, GenerationEvent};

pub type ActivationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Streaming,
    Complete,
    Failed,
}

/// User-facing message raised by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    InvalidFile,
    ExtraFilesIgnored,
    NoDocument,
    GenerationFailed,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidFile => "Only PDF files under 5MB are allowed.",
            Self::ExtraFilesIgnored => {
                "Only one PDF can be used per generation; extra files were ignored."
            }
            Self::NoDocument => "No files found. Please upload a PDF first.",
            Self::GenerationFailed => "Failed to generate quiz. Please try again.",
        }
    }

    /// Notice shown for a terminal generation error.
    pub fn for_error(error: &GenerationError) -> Self {
        match error {
            GenerationError::NoDocument => Self::NoDocument,
            _ => Self::GenerationFailed,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Everything needed to issue one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    pub activation: ActivationId,
    pub mode: Mode,
    pub document: Arc<DocumentPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Same mode already streaming or complete; nothing to do.
    Unchanged,
    /// Issue a request for this ticket.
    Started(GenerationTicket),
    /// No request; the session is `Failed`.
    Rejected(Notice),
}

/// An event from the request issued for `activation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub activation: ActivationId,
    pub event: GenerationEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Stale or late event; state untouched.
    Ignored,
    Updated,
    Completed,
    Failed(Notice),
}

#[derive(Debug, Default)]
pub struct GenerationSession {
    document: Option<Arc<DocumentPayload>>,
    active_mode: Mode,
    items: Vec<StudyItem>,
    status: SessionStatus,
    last_error: Option<GenerationError>,
    current: Option<ActivationId>,
    last_activation: ActivationId,
}

impl GenerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> Option<&DocumentPayload> {
        self.document.as_deref()
    }

    pub fn active_mode(&self) -> Mode {
        self.active_mode
    }

    pub fn items(&self) -> &[StudyItem] {
        &self.items
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&GenerationError> {
        self.last_error.as_ref()
    }

    /// Id of the activation whose events are currently accepted.
    pub fn current_activation(&self) -> Option<ActivationId> {
        self.current
    }

    /// Encode and cache a document. On failure the session is unchanged.
    pub fn upload_document(&mut self, file: &RawFile) -> Result<(), EncodeError> {
        let payload = encoder::encode(file)?;
        tracing::debug!(name = %payload.name, size = file.size(), "Document cached");
        self.document = Some(Arc::new(payload));
        Ok(())
    }

    /// Take a picker selection: invalid files are dropped, and only the
    /// first valid file is kept.
    pub fn upload_selection(&mut self, files: &[RawFile]) -> Vec<Notice> {
        let mut notices = Vec::new();
        let mut accepted = 0;
        let mut rejected = 0;

        for file in files {
            if accepted > 0 {
                // Still counted so a bad extra file is reported
                match encoder::encode(file) {
                    Ok(_) => accepted += 1,
                    Err(_) => rejected += 1,
                }
                continue;
            }
            match self.upload_document(file) {
                Ok(()) => accepted += 1,
                Err(e) => {
                    tracing::debug!(name = %file.name, error = %e, "File rejected");
                    rejected += 1;
                }
            }
        }

        if rejected > 0 {
            notices.push(Notice::InvalidFile);
        }
        if accepted > 1 {
            notices.push(Notice::ExtraFilesIgnored);
        }
        notices
    }

    /// Switch to `mode`, deciding whether a new request is needed.
    pub fn activate_mode(&mut self, mode: Mode) -> Activation {
        if mode == self.active_mode
            && matches!(self.status, SessionStatus::Streaming | SessionStatus::Complete)
        {
            return Activation::Unchanged;
        }

        self.active_mode = mode;
        self.items.clear();
        self.last_error = None;

        let Some(document) = self.document.clone() else {
            self.status = SessionStatus::Failed;
            self.last_error = Some(GenerationError::NoDocument);
            self.current = None;
            return Activation::Rejected(Notice::NoDocument);
        };

        self.last_activation += 1;
        let activation = self.last_activation;
        self.current = Some(activation);
        self.status = SessionStatus::Streaming;
        tracing::debug!(activation, %mode, "Mode activated");

        Activation::Started(GenerationTicket {
            activation,
            mode,
            document,
        })
    }

    /// Fold one event into the session.
    pub fn apply(&mut self, tagged: TaggedEvent) -> EventOutcome {
        if self.current != Some(tagged.activation) || self.status != SessionStatus::Streaming {
            return EventOutcome::Ignored;
        }

        match tagged.event {
            GenerationEvent::Partial(items) => {
                if items.len() < self.items.len() {
                    return EventOutcome::Ignored;
                }
                self.items = items;
                EventOutcome::Updated
            }
            GenerationEvent::Done(items) => {
                self.items = items;
                self.status = SessionStatus::Complete;
                EventOutcome::Completed
            }
            GenerationEvent::Error(error) => {
                let notice = Notice::for_error(&error);
                self.items.clear();
                self.status = SessionStatus::Failed;
                self.last_error = Some(error);
                EventOutcome::Failed(notice)
            }
        }
    }

    /// Back to an empty `Idle` session; outstanding events will be ignored.
    pub fn clear(&mut self) {
        let last_activation = self.last_activation;
        *self = Self {
            last_activation,
            ..Self::default()
        };
    }

    /// Fraction of the set received, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        self.items.len().min(ITEMS_PER_SET) as f64 / ITEMS_PER_SET as f64
    }

    /// Status line while streaming.
    pub fn progress_label(&self) -> Option<String> {
        if self.status != SessionStatus::Streaming {
            return None;
        }
        if self.items.is_empty() {
            return Some("Analyzing PDF content".to_string());
        }
        let next = (self.items.len() + 1).min(ITEMS_PER_SET);
        Some(format!("Generating question {next} of {ITEMS_PER_SET}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_DOCUMENT_BYTES;
    use crate::models::MatchItem;

    fn pdf() -> RawFile {
        RawFile::new("notes.pdf", "application/pdf", b"%PDF-1.4 notes".to_vec())
    }

    fn pairs(n: usize) -> Vec<StudyItem> {
        (0..n)
            .map(|i| {
                StudyItem::Match(MatchItem {
                    question: format!("q{i}"),
                    answer: format!("a{i}"),
                })
            })
            .collect()
    }

    fn started(activation: Activation) -> GenerationTicket {
        match activation {
            Activation::Started(ticket) => ticket,
            other => panic!("expected Started, got {other:?}"),
        }
    }

    fn event(ticket: &GenerationTicket, event: GenerationEvent) -> TaggedEvent {
        TaggedEvent {
            activation: ticket.activation,
            event,
        }
    }

    fn ready_session() -> GenerationSession {
        let mut session = GenerationSession::new();
        session.upload_document(&pdf()).unwrap();
        session
    }

    #[test]
    fn new_session_is_idle_and_empty() {
        let session = GenerationSession::new();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.active_mode(), Mode::NormalQuiz);
        assert!(session.items().is_empty());
        assert!(session.document().is_none());
        assert_eq!(session.progress(), 0.0);
    }

    #[test]
    fn upload_keeps_status() {
        let mut session = ready_session();
        let ticket = started(session.activate_mode(Mode::Match));
        session.apply(event(&ticket, GenerationEvent::Done(pairs(4))));

        session.upload_document(&pdf()).unwrap();
        assert_eq!(session.status(), SessionStatus::Complete);
        assert_eq!(session.items().len(), 4);
    }

    #[test]
    fn failed_upload_leaves_session_unchanged() {
        let mut session = ready_session();
        let before = session.document().cloned();

        let mut big = pdf();
        big.bytes.resize(MAX_DOCUMENT_BYTES + 1, 0);
        assert!(session.upload_document(&big).is_err());
        assert!(session.upload_document(&RawFile::new("a.txt", "text/plain", vec![1])).is_err());
        assert_eq!(session.document().cloned(), before);
    }

    #[test]
    fn selection_keeps_first_valid_file() {
        let mut session = GenerationSession::new();
        let png = RawFile::new("a.png", "image/png", vec![0x89]);
        let second = RawFile::new("second.pdf", "application/pdf", b"%PDF-2".to_vec());
        let notices = session.upload_selection(&[png, pdf(), second]);
        assert_eq!(notices, vec![Notice::InvalidFile, Notice::ExtraFilesIgnored]);
        assert_eq!(session.document().unwrap().name, "notes.pdf");
    }

    #[test]
    fn activation_starts_streaming_with_fresh_ids() {
        let mut session = ready_session();
        let first = started(session.activate_mode(Mode::Learn));
        assert_eq!(session.status(), SessionStatus::Streaming);
        let second = started(session.activate_mode(Mode::FlashCard));
        assert!(second.activation > first.activation);
        assert_eq!(session.current_activation(), Some(second.activation));
        assert_eq!(second.document.name, "notes.pdf");
    }

    #[test]
    fn match_without_document_fails_with_notice() {
        let mut session = GenerationSession::new();
        assert_eq!(
            session.activate_mode(Mode::Match),
            Activation::Rejected(Notice::NoDocument)
        );
        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(session.last_error(), Some(&GenerationError::NoDocument));
        assert!(session.items().is_empty());
        assert_eq!(
            Notice::NoDocument.message(),
            "No files found. Please upload a PDF first."
        );
    }

    #[test]
    fn reactivation_is_noop_while_streaming_or_complete() {
        let mut session = ready_session();
        let ticket = started(session.activate_mode(Mode::FlashCard));
        assert_eq!(session.activate_mode(Mode::FlashCard), Activation::Unchanged);

        session.apply(event(&ticket, GenerationEvent::Done(pairs(4))));
        assert_eq!(session.activate_mode(Mode::FlashCard), Activation::Unchanged);
        assert_eq!(session.items().len(), 4);
        assert_eq!(session.status(), SessionStatus::Complete);
    }

    #[test]
    fn reactivation_after_failure_retries() {
        let mut session = ready_session();
        let ticket = started(session.activate_mode(Mode::Match));
        let outcome = session.apply(event(
            &ticket,
            GenerationEvent::Error(GenerationError::Backend("boom".into())),
        ));
        assert_eq!(outcome, EventOutcome::Failed(Notice::GenerationFailed));
        assert_eq!(session.status(), SessionStatus::Failed);

        let retry = started(session.activate_mode(Mode::Match));
        assert!(retry.activation > ticket.activation);
        assert_eq!(session.status(), SessionStatus::Streaming);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn idle_same_mode_activates() {
        let mut session = ready_session();
        assert!(matches!(
            session.activate_mode(Mode::NormalQuiz),
            Activation::Started(_)
        ));
    }

    #[test]
    fn partials_then_done() {
        let mut session = ready_session();
        let ticket = started(session.activate_mode(Mode::Match));

        assert_eq!(
            session.progress_label().as_deref(),
            Some("Analyzing PDF content")
        );
        assert_eq!(
            session.apply(event(&ticket, GenerationEvent::Partial(pairs(1)))),
            EventOutcome::Updated
        );
        assert_eq!(session.progress(), 0.25);
        assert_eq!(
            session.progress_label().as_deref(),
            Some("Generating question 2 of 4")
        );

        assert_eq!(
            session.apply(event(&ticket, GenerationEvent::Done(pairs(4)))),
            EventOutcome::Completed
        );
        assert_eq!(session.progress(), 1.0);
        assert_eq!(session.progress_label(), None);

        // Anything after the terminal event is ignored
        assert_eq!(
            session.apply(event(&ticket, GenerationEvent::Partial(pairs(4)))),
            EventOutcome::Ignored
        );
    }

    #[test]
    fn stale_events_are_ignored_after_switch() {
        let mut session = ready_session();
        let learn = started(session.activate_mode(Mode::Learn));
        session.apply(event(&learn, GenerationEvent::Partial(pairs(1))));

        let matching = started(session.activate_mode(Mode::Match));
        assert!(session.items().is_empty());

        assert_eq!(
            session.apply(event(&learn, GenerationEvent::Partial(pairs(2)))),
            EventOutcome::Ignored
        );
        assert_eq!(
            session.apply(event(&learn, GenerationEvent::Done(pairs(4)))),
            EventOutcome::Ignored
        );
        assert_eq!(session.status(), SessionStatus::Streaming);
        assert_eq!(session.active_mode(), Mode::Match);

        session.apply(event(&matching, GenerationEvent::Done(pairs(4))));
        assert_eq!(session.status(), SessionStatus::Complete);
    }

    #[test]
    fn shrinking_partial_ignored() {
        let mut session = ready_session();
        let ticket = started(session.activate_mode(Mode::Match));
        session.apply(event(&ticket, GenerationEvent::Partial(pairs(3))));
        assert_eq!(
            session.apply(event(&ticket, GenerationEvent::Partial(pairs(2)))),
            EventOutcome::Ignored
        );
        assert_eq!(session.items().len(), 3);
    }

    #[test]
    fn error_clears_items_and_keeps_document() {
        let mut session = ready_session();
        let ticket = started(session.activate_mode(Mode::NormalQuiz));
        session.apply(event(&ticket, GenerationEvent::Partial(pairs(3))));
        session.apply(event(
            &ticket,
            GenerationEvent::Error(GenerationError::SchemaValidationFailed {
                details: vec!["Array must contain exactly 4 element(s), got 3".into()],
            }),
        ));
        assert!(session.items().is_empty());
        assert_eq!(session.status(), SessionStatus::Failed);
        assert!(session.document().is_some());
    }

    #[test]
    fn clear_resets_and_ignores_outstanding_events() {
        let mut session = ready_session();
        let ticket = started(session.activate_mode(Mode::Learn));
        session.clear();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.document().is_none());
        assert_eq!(
            session.apply(event(&ticket, GenerationEvent::Done(pairs(4)))),
            EventOutcome::Ignored
        );

        // Ids are never reused after a clear
        session.upload_document(&pdf()).unwrap();
        let next = started(session.activate_mode(Mode::Learn));
        assert!(next.activation > ticket.activation);
    }
}
