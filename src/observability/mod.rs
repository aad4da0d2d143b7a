//! Observability
//!
//! - Lifecycle events with stable names, logged through `tracing`
//! - Subscriber setup (compact or JSON lines)
//! - Operational counters
//!
//! Observability is read-only: nothing here feeds back into failover
//! decisions.
//!
//! ```ignore
//! use failoverd::observability::{log_event, Event};
//!
//! log_event(Event::FailoverComplete, &[("new_primary", "standby-eu-west-1")]);
//! ```

mod events;
mod logging;
mod metrics;

pub use events::{Event, Severity};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log one lifecycle event at its severity.
///
/// Fields are rendered in the order given as `key=value` pairs.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let rendered = render_fields(fields);
    let name = event.as_str();
    match event.severity() {
        Severity::Trace => tracing::trace!(event = name, "{}", rendered),
        Severity::Info => tracing::info!(event = name, "{}", rendered),
        Severity::Warn => tracing::warn!(event = name, "{}", rendered),
        Severity::Error => tracing::error!(event = name, "{}", rendered),
    }
}

fn render_fields(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}
