pub mod driver; // Owns a session, runs one request task per activation
pub mod session; // Pure state machine over generation events
pub mod transport; // In-process and HTTP event sources

pub use driver::SessionDriver;
pub use session::{Activation, EventOutcome, GenerationSession, Notice, SessionStatus};
pub use transport::{ClientError, GenerationSource, HttpGenerationClient};
