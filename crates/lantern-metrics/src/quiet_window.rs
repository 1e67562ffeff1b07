//! Quiet-window search for interactivity metrics.
//!
//! A page is considered interactive at the first moment `T` after a given
//! start such that no long CPU task begins inside `[T, T + window)`. The
//! required window is 5 s, shrinking to a 3 s floor as `T` approaches the
//! end of the trace; 3 s is also the trailing safety margin a candidate must
//! leave before trace end. Adjacent long tasks separated by less than 1 s
//! are clustered and treated as a single combined task.

use itertools::Itertools;
use lantern_core::{Error, Result};

/// Tasks at least this long are interactivity-blocking.
pub const LONG_TASK_THRESHOLD_MS: f64 = 50.0;
/// Full quiet window required when the trace is long enough.
pub const REQUIRED_QUIET_WINDOW_MS: f64 = 5_000.0;
/// The window never shrinks below this, and candidates must leave at least
/// this much trace after themselves.
pub const MINIMUM_QUIET_WINDOW_MS: f64 = 3_000.0;
/// Long tasks closer together than this merge into one cluster.
pub const CLUSTER_GAP_MS: f64 = 1_000.0;

/// A long CPU task in milliseconds since navigation start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LongTask {
    pub start: f64,
    pub end: f64,
}

/// Find the earliest quiet moment at or after `start`.
///
/// With no long tasks at all the page is immediately quiet and `start` is
/// returned. Fails with `NoQuietWindow` when every candidate is either
/// disturbed by a task cluster or too close to `trace_end`.
pub fn find_quiet_window(start: f64, trace_end: f64, long_tasks: &[LongTask]) -> Result<f64> {
    let mut relevant: Vec<LongTask> = long_tasks
        .iter()
        .copied()
        .filter(|t| t.end > start)
        .collect();
    if relevant.is_empty() {
        return Ok(start);
    }
    relevant.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));

    let clusters: Vec<LongTask> = relevant
        .into_iter()
        .coalesce(|a, b| {
            if b.start - a.end <= CLUSTER_GAP_MS {
                Ok(LongTask {
                    start: a.start,
                    end: a.end.max(b.end),
                })
            } else {
                Err((a, b))
            }
        })
        .collect();

    let candidates = std::iter::once(start).chain(clusters.iter().map(|c| c.end.max(start)));
    for candidate in candidates {
        if trace_end - candidate < MINIMUM_QUIET_WINDOW_MS {
            continue;
        }
        let window = (trace_end - candidate).min(REQUIRED_QUIET_WINDOW_MS);
        let disturbed = clusters.iter().any(|cluster| {
            let begins_inside = cluster.start >= candidate && cluster.start < candidate + window;
            let spans_candidate = cluster.start < candidate && cluster.end > candidate;
            begins_inside || spans_candidate
        });
        if !disturbed {
            return Ok(candidate);
        }
    }

    Err(Error::NoQuietWindow(format!(
        "no {}ms quiet window found between {}ms and trace end at {}ms",
        MINIMUM_QUIET_WINDOW_MS, start, trace_end
    )))
}
