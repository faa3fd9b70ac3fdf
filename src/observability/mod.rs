use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::Provider;

/// Map a configured log level name to a tracing filter directive.
///
/// `"DISABLED"` maps to `None` (no subscriber), `"WARNING"` to `WARN` and
/// `"CRITICAL"` to `ERROR`; other names pass through.
#[must_use]
pub fn tracing_level(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
pub fn init_tracing(log_level: &str) {
    let Some(level) = tracing_level(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Which proxy operation a completion log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Stream,
    Complete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Stream => "stream",
            Operation::Complete => "complete",
        }
    }
}

/// Log a finished proxy request. `deltas` counts NDJSON lines written for
/// streams; completions report the output length in chars.
pub fn log_request_complete(
    request_id: &uuid::Uuid,
    provider: Provider,
    operation: Operation,
    model: &str,
    deltas: u64,
    start_time: Instant,
) {
    info!(
        request_id = %request_id,
        provider = provider.as_str(),
        operation = operation.as_str(),
        model = model,
        deltas = deltas,
        duration_seconds = start_time.elapsed().as_secs_f64(),
        "request completed"
    );
}
