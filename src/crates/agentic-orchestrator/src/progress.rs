//! Progress reporting: caller-facing events with rate limiting and a
//! cancellation query, grounded on this codebase's `ExecutionEvent`/
//! `EventLogger` tagged-enum + tracing pattern, generalized to the stage/step
//! shape the orchestrator needs and given an explicit rate limiter.

use crate::cancel::CancelSignal;
use crate::domain::{ProgressEvent, StageStatus};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Public contract every stage reports through.
pub trait ProgressSink: Send + Sync {
    fn begin_stage(&self, stage_id: &str, label: &str, total: u64);
    fn step(&self, stage_id: &str, completed: u64, message: &str, attrs: HashMap<String, serde_json::Value>);
    fn end_stage_ok(&self, stage_id: &str, attrs: HashMap<String, serde_json::Value>);
    fn end_stage_error(&self, stage_id: &str, error_summary: &str, attrs: HashMap<String, serde_json::Value>);
    fn is_cancelled(&self) -> bool;
    /// True when cancellation is specifically due to the request deadline
    /// elapsing, as opposed to an explicit caller `cancel()`. Callers that
    /// need to report `DeadlineExceeded` rather than `Cancelled` check this
    /// after `is_cancelled()` returns true.
    fn is_deadline_exceeded(&self) -> bool;
}

struct StageRateState {
    last_emit: Option<Instant>,
    last_completed: Option<u64>,
}

/// Tracks, per stage, whether the next `step` call should actually emit.
struct RateLimiter {
    min_interval: Duration,
    min_delta: u64,
    stages: HashMap<String, StageRateState>,
}

impl RateLimiter {
    fn new(min_interval: Duration, min_delta: u64) -> Self {
        Self { min_interval, min_delta, stages: HashMap::new() }
    }

    /// First event of a stage always passes; afterwards require
    /// `Δt >= min_interval OR Δcompleted >= min_delta`.
    fn allow(&mut self, stage_id: &str, completed: u64) -> bool {
        let now = Instant::now();
        let state = self.stages.entry(stage_id.to_string()).or_insert(StageRateState {
            last_emit: None,
            last_completed: None,
        });
        let allow = match (state.last_emit, state.last_completed) {
            (None, _) => true,
            (Some(last_emit), Some(last_completed)) => {
                now.duration_since(last_emit) >= self.min_interval
                    || completed.saturating_sub(last_completed) >= self.min_delta
            }
            (Some(last_emit), None) => now.duration_since(last_emit) >= self.min_interval,
        };
        if allow {
            state.last_emit = Some(now);
            state.last_completed = Some(completed);
        }
        allow
    }

    fn reset(&mut self, stage_id: &str) {
        self.stages.remove(stage_id);
    }
}

/// Emits events to an arbitrary sink closure and enforces the rate limiter
/// and no-op-when-disabled rule. `beginStage`/`endStage*` are
/// never rate-limited or dropped.
pub struct RateLimitedProgressSink {
    enabled: bool,
    cancel: CancelSignal,
    limiter: Mutex<RateLimiter>,
    totals: Mutex<HashMap<String, u64>>,
    emit: Box<dyn Fn(ProgressEvent) + Send + Sync>,
}

impl RateLimitedProgressSink {
    pub fn new(
        enabled: bool,
        cancel: CancelSignal,
        min_interval: Duration,
        min_delta: u64,
        emit: impl Fn(ProgressEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            enabled,
            cancel,
            limiter: Mutex::new(RateLimiter::new(min_interval, min_delta)),
            totals: Mutex::new(HashMap::new()),
            emit: Box::new(emit),
        }
    }

    fn emit_event(
        &self,
        stage_id: &str,
        label: &str,
        completed: u64,
        total: u64,
        message: &str,
        attrs: HashMap<String, serde_json::Value>,
        status: StageStatus,
    ) {
        if !self.enabled {
            return;
        }
        (self.emit)(ProgressEvent {
            stage_id: stage_id.to_string(),
            label: label.to_string(),
            completed,
            total,
            message: message.to_string(),
            attrs,
            status,
            protocol_version: 1,
        });
    }
}

impl ProgressSink for RateLimitedProgressSink {
    fn begin_stage(&self, stage_id: &str, label: &str, total: u64) {
        self.limiter.lock().expect("progress limiter poisoned").reset(stage_id);
        self.totals.lock().expect("progress totals poisoned").insert(stage_id.to_string(), total);
        self.emit_event(stage_id, label, 0, total, "", HashMap::new(), StageStatus::Begin);
    }

    fn step(&self, stage_id: &str, completed: u64, message: &str, attrs: HashMap<String, serde_json::Value>) {
        let total = *self.totals.lock().expect("progress totals poisoned").get(stage_id).unwrap_or(&0);
        let allow = self.limiter.lock().expect("progress limiter poisoned").allow(stage_id, completed);
        if !allow {
            return;
        }
        self.emit_event(stage_id, stage_id, completed, total, message, attrs, StageStatus::Running);
    }

    fn end_stage_ok(&self, stage_id: &str, attrs: HashMap<String, serde_json::Value>) {
        let total = *self.totals.lock().expect("progress totals poisoned").get(stage_id).unwrap_or(&0);
        self.emit_event(stage_id, stage_id, total, total, "", attrs, StageStatus::Ok);
    }

    fn end_stage_error(&self, stage_id: &str, error_summary: &str, attrs: HashMap<String, serde_json::Value>) {
        let total = *self.totals.lock().expect("progress totals poisoned").get(stage_id).unwrap_or(&0);
        let status = if self.cancel.is_cancelled() && !self.cancel.is_deadline_exceeded() {
            StageStatus::Cancelled
        } else {
            StageStatus::Error
        };
        self.emit_event(stage_id, stage_id, total, total, error_summary, attrs, status);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn is_deadline_exceeded(&self) -> bool {
        self.cancel.is_deadline_exceeded()
    }
}

/// A sink with `enableProgress=false` or no caller token still exposes
/// `is_cancelled`, it just drops every event.
pub fn noop_sink(cancel: CancelSignal) -> RateLimitedProgressSink {
    RateLimitedProgressSink::new(false, cancel, Duration::from_millis(300), 1, |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn collecting_sink(min_interval_ms: u64, min_delta: u64) -> (RateLimitedProgressSink, Arc<StdMutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let collected = events.clone();
        let sink = RateLimitedProgressSink::new(
            true,
            CancelSignal::new(Duration::from_secs(300)),
            Duration::from_millis(min_interval_ms),
            min_delta,
            move |event| collected.lock().unwrap().push(event),
        );
        (sink, events)
    }

    #[test]
    fn begin_and_end_are_never_rate_limited() {
        let (sink, events) = collecting_sink(10_000, 1000);
        sink.begin_stage("exec", "exec", 5);
        sink.end_stage_ok("exec", HashMap::new());
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn first_step_event_always_passes() {
        let (sink, events) = collecting_sink(10_000, 1000);
        sink.begin_stage("exec", "exec", 5);
        sink.step("exec", 1, "first", HashMap::new());
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn step_events_within_window_are_dropped() {
        let (sink, events) = collecting_sink(10_000, 1000);
        sink.begin_stage("exec", "exec", 5);
        sink.step("exec", 1, "first", HashMap::new());
        sink.step("exec", 2, "second too soon, delta too small", HashMap::new());
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn step_event_passes_on_sufficient_delta() {
        let (sink, events) = collecting_sink(10_000, 1);
        sink.begin_stage("exec", "exec", 5);
        sink.step("exec", 1, "first", HashMap::new());
        sink.step("exec", 2, "delta satisfied", HashMap::new());
        assert_eq!(events.lock().unwrap().len(), 3);
    }

    #[test]
    fn disabled_sink_drops_everything_but_reports_cancellation() {
        let cancel = CancelSignal::new(Duration::from_secs(300));
        let sink = noop_sink(cancel.clone());
        sink.begin_stage("exec", "exec", 5);
        sink.step("exec", 1, "x", HashMap::new());
        sink.end_stage_ok("exec", HashMap::new());
        assert!(!sink.is_cancelled());
        cancel.cancel();
        assert!(sink.is_cancelled());
    }

    #[test]
    fn percent_is_monotonic_non_decreasing_and_capped() {
        let (sink, events) = collecting_sink(0, 1);
        sink.begin_stage("exec", "exec", 4);
        sink.step("exec", 1, "s1", HashMap::new());
        sink.step("exec", 2, "s2", HashMap::new());
        sink.step("exec", 4, "s4", HashMap::new());
        let percents: Vec<u8> = events.lock().unwrap().iter().map(|e| e.percent()).collect();
        for window in percents.windows(2) {
            assert!(window[1] >= window[0]);
        }
        assert!(percents.iter().all(|&p| p <= 100));
    }
}
