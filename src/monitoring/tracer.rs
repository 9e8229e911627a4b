/*!
 * Structured Tracing
 * Subscriber setup and per-wait spans using the tracing crate
 *
 * Features:
 * - Trace ID per ownership-acquisition attempt for log correlation
 * - JSON-formatted logs for structured parsing
 * - Slow-wait detection against a one-frame budget
 */

use crate::buffer::AccessMode;
use crate::core::limits::{ENV_TRACE_JSON, SLOW_WAIT_THRESHOLD};
use crate::core::types::{BufferId, ContextId};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - BUFSYNC_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
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
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Generate a unique trace ID for wait correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one ownership-acquisition attempt
///
/// Logs the outcome and duration on drop; waits longer than one frame are
/// reported at `warn`.
pub struct WaitSpan {
    span: tracing::Span,
    start: Instant,
    trace_id: String,
    context: ContextId,
    buffer: BufferId,
    outcome: &'static str,
}

impl WaitSpan {
    pub fn new(context: ContextId, buffer: BufferId, mode: AccessMode) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "buffer_wait",
            trace_id = %trace_id,
            context = %context,
            buffer = %buffer,
            mode = ?mode,
            duration_us = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            trace_id,
            context,
            buffer,
            outcome: "pending",
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Record how the wait ended (`granted`, `timeout`, `aborted`)
    pub fn record_outcome(&mut self, outcome: &'static str) {
        self.outcome = outcome;
        self.span.record("outcome", outcome);
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for WaitSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > SLOW_WAIT_THRESHOLD {
            warn!(
                trace_id = %self.trace_id,
                context = %self.context,
                buffer = %self.buffer,
                outcome = self.outcome,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow buffer wait"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                outcome = self.outcome,
                duration_us = duration.as_micros() as u64,
                "buffer wait completed"
            );
        }
    }
}
