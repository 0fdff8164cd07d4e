//! Structured JSON logging
//!
//! Every `tracing` event becomes one line on stdout:
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00.000Z","level":"INFO","message":"Request completed","method":"GET",...}
//! ```
//!
//! Fields are merged into the top-level object. Spans, targets and thread
//! info are left out. Write failures are dropped by the subscriber, so a
//! broken stdout never turns into a request error.

use chrono::{SecondsFormat, Utc};
use std::any::Any;
use std::panic::Location;
use tracing::Subscriber;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime, MakeWriter};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// ISO-8601 UTC timestamp with millisecond precision (`2024-05-01T12:00:00.000Z`)
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoTimestamp;

impl FormatTime for IsoTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Parse a filter directive, falling back to `info` when it is malformed
pub fn parse_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Build the JSON-lines subscriber over any writer
pub fn json_subscriber<W>(make_writer: W, filter: EnvFilter) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_timer(IsoTimestamp)
        .with_writer(make_writer)
        .with_env_filter(filter)
        .finish()
}

/// Install the stdout JSON subscriber as the global default
pub fn init(filter: &str) -> Result<(), TryInitError> {
    json_subscriber(std::io::stdout, parse_filter(filter)).try_init()
}

/// Route panic reports through `tracing` instead of the default stderr text
///
/// Logged at WARN: a panic inside a handler is also reported as the
/// request's single ERROR record by the error-reporting middleware.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        report_panic(&panic_message(info.payload()), info.location());
    }));
}

fn report_panic(message: &str, location: Option<&Location<'_>>) {
    tracing::warn!(
        panic = %message,
        location = location.map(tracing::field::display),
        "Thread panicked"
    );
}

/// Text of a panic payload (`panic!` with a literal or a formatted message)
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}
