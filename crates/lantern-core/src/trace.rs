//! Chrome trace event model.
//!
//! A trace is a flat sequence of [`TraceEvent`]s as emitted by the tracing
//! controller: duration pairs (`B`/`E`), complete events (`X`, carrying a
//! duration), instants/marks (`I`/`R`), and metadata records (`M`) such as
//! thread names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trace event phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TracePhase {
    /// Begin of a duration event.
    #[serde(rename = "B")]
    Begin,
    /// End of a duration event.
    #[serde(rename = "E")]
    End,
    /// Complete event with an inline duration.
    #[serde(rename = "X")]
    Complete,
    /// Instant event.
    #[serde(rename = "I")]
    Instant,
    /// Mark event (user timing and navigation marks).
    #[serde(rename = "R")]
    Mark,
    /// Metadata event (thread/process names).
    #[serde(rename = "M")]
    Metadata,
}

/// A single raw trace event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Event name, e.g. `RunTask`, `navigationStart`, `EvaluateScript`.
    pub name: String,
    /// Comma-separated trace categories.
    #[serde(default)]
    pub cat: String,
    /// Event phase.
    pub ph: TracePhase,
    /// Timestamp in microseconds since the trace epoch.
    pub ts: u64,
    /// Duration in microseconds; present only for `X` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<u64>,
    /// Process id.
    pub pid: u64,
    /// Thread id.
    pub tid: u64,
    /// Event arguments (free-form JSON).
    #[serde(default)]
    pub args: Value,
}

impl TraceEvent {
    /// End timestamp in microseconds (`ts + dur` for complete events).
    pub fn end_ts(&self) -> u64 {
        self.ts + self.dur.unwrap_or(0)
    }

    /// The `args.data.url` field, if present.
    pub fn arg_url(&self) -> Option<&str> {
        self.args.get("data")?.get("url")?.as_str()
    }

    /// URLs mentioned in `args.data.stackTrace`, outermost frame first.
    pub fn stack_trace_urls(&self) -> Vec<String> {
        let frames = self
            .args
            .get("data")
            .and_then(|d| d.get("stackTrace"))
            .and_then(|s| s.as_array());
        match frames {
            Some(frames) => frames
                .iter()
                .filter_map(|f| f.get("url").and_then(|u| u.as_str()))
                .map(|u| u.to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    /// The `args.data.timerId` field, if present.
    pub fn timer_id(&self) -> Option<u64> {
        self.args.get("data")?.get("timerId")?.as_u64()
    }

    /// The `args.data.requestId` field, if present.
    pub fn request_id(&self) -> Option<&str> {
        self.args.get("data")?.get("requestId")?.as_str()
    }
}
