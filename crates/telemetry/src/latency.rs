//! Named-stopwatch registry with rolling statistics

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parlo_config::constants::latency;

/// Sample count above which percentiles switch from exact nearest-rank to
/// interpolated quantile estimation.
const EXACT_PERCENTILE_MAX: usize = 256;

/// Every timed stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    VoiceActivity,
    Transcription,
    Generation,
    Synthesis,
    WholeTurn,
    AudioPersist,
    StoreWrite,
    AnalysisSchedule,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 8] = [
        PipelineStep::VoiceActivity,
        PipelineStep::Transcription,
        PipelineStep::Generation,
        PipelineStep::Synthesis,
        PipelineStep::WholeTurn,
        PipelineStep::AudioPersist,
        PipelineStep::StoreWrite,
        PipelineStep::AnalysisSchedule,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::VoiceActivity => "voice_activity",
            PipelineStep::Transcription => "transcription",
            PipelineStep::Generation => "generation",
            PipelineStep::Synthesis => "synthesis",
            PipelineStep::WholeTurn => "whole_turn",
            PipelineStep::AudioPersist => "audio_persist",
            PipelineStep::StoreWrite => "store_write",
            PipelineStep::AnalysisSchedule => "analysis_schedule",
        }
    }

    /// Default alert threshold for this step.
    pub fn default_alert_threshold(&self) -> Duration {
        let ms = match self {
            PipelineStep::VoiceActivity => latency::VOICE_ACTIVITY_MS,
            PipelineStep::Transcription => latency::TRANSCRIPTION_MS,
            PipelineStep::Generation => latency::GENERATION_MS,
            PipelineStep::Synthesis => latency::SYNTHESIS_MS,
            PipelineStep::WholeTurn => latency::WHOLE_TURN_MS,
            PipelineStep::AudioPersist => latency::AUDIO_PERSIST_MS,
            PipelineStep::StoreWrite => latency::STORE_WRITE_MS,
            PipelineStep::AnalysisSchedule => latency::ANALYSIS_SCHEDULE_MS,
        };
        Duration::from_millis(ms)
    }
}

/// Rolling window of recent durations, bounded at `WINDOW_CAP` samples.
#[derive(Debug, Default)]
struct RollingWindow {
    samples: VecDeque<Duration>,
}

impl RollingWindow {
    fn record(&mut self, d: Duration) {
        if self.samples.len() >= latency::WINDOW_CAP {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    fn stats(&self) -> Option<StepStats> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self
            .samples
            .iter()
            .map(|d| d.as_secs_f64() * 1_000.0)
            .collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Some(StepStats {
            count,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            mean_ms: sum / count as f64,
            median_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        })
    }
}

/// Percentile over a sorted slice of millisecond values.
///
/// Exact nearest-rank for small windows; linear interpolation between
/// ranks once the window is large enough that exactness stops mattering.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    if n <= EXACT_PERCENTILE_MAX {
        // Nearest-rank: smallest value with at least p% of samples at or below it
        let rank = ((p / 100.0) * n as f64).ceil() as usize;
        sorted[rank.clamp(1, n) - 1]
    } else {
        let pos = (p / 100.0) * (n - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Summary statistics for one step's rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepStats {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Default)]
struct Inner {
    /// In-flight stopwatches keyed by (step, session)
    active: HashMap<(PipelineStep, Option<String>), Instant>,
    global: HashMap<PipelineStep, RollingWindow>,
    sessions: HashMap<String, HashMap<PipelineStep, RollingWindow>>,
}

/// Process-wide timing registry.
///
/// Owned by the bootstrap and injected into the orchestrator; not a global.
pub struct LatencyMonitor {
    thresholds: HashMap<PipelineStep, Duration>,
    inner: Mutex<Inner>,
}

impl Default for LatencyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyMonitor {
    pub fn new() -> Self {
        let thresholds = PipelineStep::ALL
            .iter()
            .map(|s| (*s, s.default_alert_threshold()))
            .collect();
        Self {
            thresholds,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Override the alert threshold for one step.
    pub fn with_threshold(mut self, step: PipelineStep, threshold: Duration) -> Self {
        self.thresholds.insert(step, threshold);
        self
    }

    /// Start a named stopwatch. Restarting an already-running stopwatch
    /// discards the earlier start.
    pub fn start(&self, step: PipelineStep, session: Option<&str>) {
        let now = Instant::now();
        self.inner
            .lock()
            .active
            .insert((step, session.map(String::from)), now);
    }

    /// Stop a stopwatch and record its duration. Returns `None` if no
    /// matching `start` was seen.
    pub fn stop(&self, step: PipelineStep, session: Option<&str>) -> Option<Duration> {
        let now = Instant::now();
        let started = self
            .inner
            .lock()
            .active
            .remove(&(step, session.map(String::from)))?;
        let elapsed = now.duration_since(started);
        self.record(step, session, elapsed);
        Some(elapsed)
    }

    /// Record a duration directly, bypassing the stopwatch map.
    pub fn record(&self, step: PipelineStep, session: Option<&str>, elapsed: Duration) {
        {
            let mut inner = self.inner.lock();
            inner.global.entry(step).or_default().record(elapsed);
            if let Some(session) = session {
                inner
                    .sessions
                    .entry(session.to_string())
                    .or_default()
                    .entry(step)
                    .or_default()
                    .record(elapsed);
            }
        }

        let ms = elapsed.as_secs_f64() * 1_000.0;
        metrics::histogram!("parlo_stage_latency_ms", "step" => step.name()).record(ms);

        if let Some(threshold) = self.thresholds.get(&step) {
            if elapsed > *threshold {
                tracing::warn!(
                    step = step.name(),
                    session = session.unwrap_or("-"),
                    elapsed_ms = ms as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "stage latency above alert threshold"
                );
            }
        }
    }

    /// Time a stage by holding the returned guard for its duration.
    pub fn scoped<'a>(&'a self, step: PipelineStep, session: Option<&str>) -> ScopedTimer<'a> {
        ScopedTimer {
            monitor: self,
            step,
            session: session.map(String::from),
            start: Instant::now(),
        }
    }

    /// Global stats for one step.
    pub fn stats(&self, step: PipelineStep) -> Option<StepStats> {
        self.inner.lock().global.get(&step).and_then(|w| w.stats())
    }

    /// Stats for one step within one session.
    pub fn session_stats(&self, session: &str, step: PipelineStep) -> Option<StepStats> {
        self.inner
            .lock()
            .sessions
            .get(session)
            .and_then(|m| m.get(&step))
            .and_then(|w| w.stats())
    }

    /// Drop a session's windows once the session ends.
    pub fn forget_session(&self, session: &str) {
        self.inner.lock().sessions.remove(session);
    }

    /// Snapshot all stats (global plus a capped number of sessions).
    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.inner.lock();

        let global = inner
            .global
            .iter()
            .filter_map(|(step, w)| w.stats().map(|s| (step.name().to_string(), s)))
            .collect();

        let sessions = inner
            .sessions
            .iter()
            .take(latency::EXPORT_SESSION_CAP)
            .map(|(id, steps)| {
                let stats = steps
                    .iter()
                    .filter_map(|(step, w)| w.stats().map(|s| (step.name().to_string(), s)))
                    .collect();
                (id.clone(), stats)
            })
            .collect();

        MonitorSnapshot { global, sessions }
    }

    /// Serialize a snapshot to a writer.
    pub fn export_to<W: std::io::Write>(&self, sink: &mut W) -> std::io::Result<()> {
        let snapshot = self.snapshot();
        serde_json::to_writer(sink, &snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Guard that records the elapsed time of a scope on drop.
pub struct ScopedTimer<'a> {
    monitor: &'a LatencyMonitor,
    step: PipelineStep,
    session: Option<String>,
    start: Instant,
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.monitor
            .record(self.step, self.session.as_deref(), self.start.elapsed());
    }
}

/// Serialized form of all stats.
#[derive(Debug, Serialize)]
pub struct MonitorSnapshot {
    pub global: HashMap<String, StepStats>,
    pub sessions: HashMap<String, HashMap<String, StepStats>>,
}
