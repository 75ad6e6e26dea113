pub mod api; // HTTP boundary: POST /generate, GET /health
pub mod client; // Generation session state machine + transports
pub mod config;
pub mod models;
pub mod pipeline; // Schema registry, encoder, backends, generation handler

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config::default_log_filter()` applies.
/// Safe to call more than once (later calls are ignored).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
