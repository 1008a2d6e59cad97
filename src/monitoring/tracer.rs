/*!
 * Call Tracing
 * Structured tracing for native calls using the tracing crate
 *
 * Features:
 * - Trace ID per dispatched call for log correlation
 * - JSON-formatted logs for structured parsing
 * - Duration and outcome recorded when the span closes
 */

use crate::dispatch::Isolation;
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Calls slower than this are reported at warn level
const SLOW_CALL_THRESHOLD: Duration = Duration::from_millis(250);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - RELAXNATIVE_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("RELAXNATIVE_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Generate a unique trace ID for call correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one dispatched native call
pub struct CallSpan {
    span: tracing::Span,
    start: Instant,
    function: String,
    trace_id: String,
}

impl CallSpan {
    pub fn new(function: &str, isolation: Isolation) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "native_call",
            trace_id = %trace_id,
            function = function,
            isolation = %isolation,
            args_count = tracing::field::Empty,
            trust = tracing::field::Empty,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            function: function.to_string(),
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn record_args_count(&self, count: usize) {
        self.span.record("args_count", count);
    }

    pub fn record_trust(&self, trust: &str) {
        self.span.record("trust", trust);
    }

    pub fn record_result(&self, success: bool) {
        self.span.record("result", if success { "success" } else { "error" });
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
        self.span.record("result", "error");
    }
}

impl Drop for CallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > SLOW_CALL_THRESHOLD {
            warn!(
                trace_id = %self.trace_id,
                function = %self.function,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow native call"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                function = %self.function,
                duration_us = duration.as_micros() as u64,
                "native call completed"
            );
        }
    }
}
