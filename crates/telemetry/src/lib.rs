//! Latency instrumentation
//!
//! A named-stopwatch registry used by every pipeline stage. Durations are
//! recorded into bounded rolling windows (globally and per session),
//! summarized on demand, checked against per-step alert thresholds, and
//! mirrored to the `metrics` facade so an exporter can be attached by the
//! bootstrap. Exceeding a threshold only ever logs a warning; it never
//! changes control flow.

mod latency;

pub use latency::{
    LatencyMonitor, MonitorSnapshot, PipelineStep, ScopedTimer, StepStats,
};
