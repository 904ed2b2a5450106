//! # Diagnostics — Logger Install and Frame Snapshots
//!
//! [`init_logger`] installs [`SkaldLogger`]. Every record goes to
//! `env_logger` for stderr output under the usual `RUST_LOG` filter. On top
//! of that, records from this crate's own targets at or above a capture
//! level are copied into a bounded in-memory buffer, independent of
//! `RUST_LOG`, so a tool can show recent renderer warnings even when stderr
//! is silenced.
//!
//! ```text
//! log::warn!(target: "skald::texture", ..)
//!      │
//!      ├── output.matches(record)?     -> env_logger (stderr)
//!      └── captures(metadata)?         -> Capture ring (oldest dropped)
//! ```
//!
//! With the `diagnostics` feature, [`snapshot_json`] turns a frame's
//! [`FrameStats`](crate::render::FrameStats) into one JSON document: the
//! counters, the frame's [`RenderEvent`](crate::render::RenderEvent)s and a
//! per-kind tally of them, registry counters, and the captured log lines.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};
use serde::Serialize;

const CAPTURE_CAPACITY: usize = 256;

/// Targets captured into the buffer.
const CAPTURE_TARGET: &str = "skald";

/// A log record copied out of the logger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedLog {
    pub level: String,
    pub target: String,
    pub message: String,
    /// Seconds since [`init_logger`].
    pub at_secs: f32,
}

/// Bounded FIFO of captured records. Counts what it had to evict.
struct Capture {
    records: VecDeque<CapturedLog>,
    capacity: usize,
    dropped: u64,
}

impl Capture {
    const fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    fn push(&mut self, record: CapturedLog) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.dropped += 1;
        }
        self.records.push_back(record);
    }

    fn drain(&mut self, max: usize) -> Vec<CapturedLog> {
        let n = self.records.len().min(max);
        self.records.drain(..n).collect()
    }

    /// Evictions since the last call.
    fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }
}

static CAPTURE: Mutex<Capture> = Mutex::new(Capture::new(CAPTURE_CAPACITY));
static STARTED: OnceLock<Instant> = OnceLock::new();
static LOGGER: OnceLock<SkaldLogger> = OnceLock::new();

fn capture() -> MutexGuard<'static, Capture> {
    CAPTURE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `env_logger` output plus capture of this crate's own records.
pub struct SkaldLogger {
    output: env_logger::Logger,
    capture_level: LevelFilter,
}

impl SkaldLogger {
    pub fn new(output: env_logger::Logger, capture_level: LevelFilter) -> Self {
        Self { output, capture_level }
    }

    /// Whether a record with this metadata is copied into the buffer.
    pub fn captures(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.capture_level && metadata.target().starts_with(CAPTURE_TARGET)
    }

    /// Most verbose level either half wants to see.
    fn max_level(&self) -> LevelFilter {
        self.output.filter().max(self.capture_level)
    }
}

impl Log for SkaldLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.output.enabled(metadata) || self.captures(metadata)
    }

    fn log(&self, record: &Record) {
        if self.output.matches(record) {
            self.output.log(record);
        }
        if !self.captures(record.metadata()) {
            return;
        }
        let at_secs = STARTED.get().map_or(0.0, |start| start.elapsed().as_secs_f32());
        capture().push(CapturedLog {
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            at_secs,
        });
    }

    fn flush(&self) {
        self.output.flush();
    }
}

/// Install the logger, capturing this crate's warnings and errors.
/// Returns `false` if another logger was already installed.
pub fn init_logger() -> bool {
    init_logger_with(LevelFilter::Warn)
}

/// Like [`init_logger`] with an explicit capture level. `Off` keeps only
/// the `env_logger` output. The level of the first call in a process wins.
pub fn init_logger_with(capture_level: LevelFilter) -> bool {
    STARTED.get_or_init(Instant::now);
    let logger = LOGGER.get_or_init(|| {
        let output = env_logger::Builder::new().parse_default_env().build();
        SkaldLogger::new(output, capture_level)
    });
    if log::set_logger(logger).is_err() {
        log::warn!("a logger is already installed; skald log capture is off");
        return false;
    }
    log::set_max_level(logger.max_level());
    true
}

/// Take up to `max` captured records, oldest first.
pub fn drain_captured_logs(max: usize) -> Vec<CapturedLog> {
    capture().drain(max)
}

/// Records evicted from the full buffer since the last call.
pub fn take_dropped_logs() -> u64 {
    capture().take_dropped()
}

#[cfg(feature = "diagnostics")]
pub use snapshot::snapshot_json;

#[cfg(feature = "diagnostics")]
mod snapshot {
    use std::collections::BTreeMap;

    use serde::Serialize;

    use crate::render::{FrameStats, RenderEvent};
    use crate::texture::TextureRegistry;

    use super::{CapturedLog, drain_captured_logs, take_dropped_logs};

    const SNAPSHOT_LOGS: usize = 50;

    #[derive(Serialize)]
    struct Snapshot<'a> {
        frame: &'a FrameStats,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        events_by_kind: BTreeMap<&'static str, u32>,
        textures: Textures,
        logs: Vec<CapturedLog>,
        dropped_logs: u64,
    }

    #[derive(Serialize)]
    struct Textures {
        /// Includes the missing-texture placeholder.
        registered: usize,
        missing_reports: usize,
    }

    pub(super) fn events_by_kind(events: &[RenderEvent]) -> BTreeMap<&'static str, u32> {
        let mut tally = BTreeMap::new();
        for event in events {
            *tally.entry(event.kind()).or_insert(0) += 1;
        }
        tally
    }

    /// The frame's stats and events, registry counters, and captured log
    /// records as one JSON object. Drains the records it includes.
    pub fn snapshot_json(stats: &FrameStats, registry: &TextureRegistry) -> String {
        let snapshot = Snapshot {
            frame: stats,
            events_by_kind: events_by_kind(&stats.events),
            textures: Textures {
                registered: registry.len(),
                missing_reports: registry.missing_reports(),
            },
            logs: drain_captured_logs(SNAPSHOT_LOGS),
            dropped_logs: take_dropped_logs(),
        };
        serde_json::to_string(&snapshot).unwrap_or_else(|e| {
            log::error!("diagnostics snapshot did not serialize: {e}");
            String::from("{}")
        })
    }
}
