//! Session driver: owns a `GenerationSession` and runs its requests.
//!
//! Every started activation spawns one request task that forwards events,
//! tagged with the activation id, over a single ordered channel. A newer
//! activation or `clear` aborts the previous task; anything it already
//! queued is dropped by the session's id check.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::session::{
    Activation, EventOutcome, GenerationSession, GenerationTicket, Notice, SessionStatus,
    TaggedEvent,
};
use super::transport::GenerationSource;
use crate::models::{Mode, RawFile};
use crate::pipeline::encoder::EncodeError;
use crate::pipeline::{GenerationError, GenerationEvent};

pub struct SessionDriver {
    session: GenerationSession,
    source: Arc<dyn GenerationSource>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    inflight: Option<JoinHandle<()>>,
}

impl SessionDriver {
    pub fn new(source: Arc<dyn GenerationSource>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session: GenerationSession::new(),
            source,
            events_tx,
            events_rx,
            inflight: None,
        }
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn upload_document(&mut self, file: &RawFile) -> Result<(), EncodeError> {
        self.session.upload_document(file)
    }

    pub fn upload_selection(&mut self, files: &[RawFile]) -> Vec<Notice> {
        self.session.upload_selection(files)
    }

    /// Activate a mode; returns a notice when the activation was refused.
    pub fn activate_mode(&mut self, mode: Mode) -> Option<Notice> {
        match self.session.activate_mode(mode) {
            Activation::Unchanged => None,
            Activation::Rejected(notice) => {
                self.abort_inflight();
                Some(notice)
            }
            Activation::Started(ticket) => {
                self.abort_inflight();
                self.inflight = Some(self.spawn_request(ticket));
                None
            }
        }
    }

    /// Reset the session and drop the running request.
    pub fn clear(&mut self) {
        self.abort_inflight();
        self.session.clear();
    }

    /// Wait for the next event that changes the session.
    ///
    /// Returns `None` once the session is no longer streaming.
    pub async fn next_update(&mut self) -> Option<EventOutcome> {
        while self.session.status() == SessionStatus::Streaming {
            let tagged = self.events_rx.recv().await?;
            match self.session.apply(tagged) {
                EventOutcome::Ignored => continue,
                outcome => return Some(outcome),
            }
        }
        None
    }

    /// Apply events until the current activation settles; returns any
    /// notices raised on the way.
    pub async fn run_until_settled(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Some(outcome) = self.next_update().await {
            if let EventOutcome::Failed(notice) = outcome {
                notices.push(notice);
            }
        }
        notices
    }

    fn abort_inflight(&mut self) {
        if let Some(task) = self.inflight.take() {
            task.abort();
        }
    }

    fn spawn_request(&self, ticket: GenerationTicket) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let tx = self.events_tx.clone();
        let GenerationTicket {
            activation,
            mode,
            document,
        } = ticket;

        tokio::spawn(async move {
            let mut events = source.open(document, mode).await;
            while let Some(event) = events.next().await {
                let terminal = event.is_terminal();
                if tx.send(TaggedEvent { activation, event }).is_err() || terminal {
                    return;
                }
            }
            // Sources promise a terminal event; don't leave the session hanging
            let _ = tx.send(TaggedEvent {
                activation,
                event: GenerationEvent::Error(GenerationError::Backend(
                    "Event stream ended without a result".into(),
                )),
            });
        })
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.abort_inflight();
    }
}
