//! Trace normalization.
//!
//! Turns the flat trace event stream into a [`ProcessedTrace`]: the main
//! renderer thread is identified, navigation and paint marks are located,
//! and the main thread's top-level work is folded into [`CpuTask`]s with
//! their nested child events attached for later attribution.

use std::collections::HashMap;

use lantern_core::trace::{TraceEvent, TracePhase};
use lantern_core::{Error, Result};

/// Coarse classification of what a CPU task spent its time on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskGroup {
    ScriptEvaluation,
    StyleLayout,
    PaintCompositeRender,
    ParseHtml,
    Other,
}

impl TaskGroup {
    fn of_event(name: &str) -> TaskGroup {
        match name {
            "EvaluateScript" | "FunctionCall" | "TimerFire" | "RunMicrotasks"
            | "XHRReadyStateChange" | "v8.compile" | "MajorGC" | "MinorGC" => {
                TaskGroup::ScriptEvaluation
            }
            "Layout" | "UpdateLayoutTree" | "RecalculateStyles" | "ScheduleStyleRecalculation" => {
                TaskGroup::StyleLayout
            }
            "Paint" | "CompositeLayers" | "UpdateLayerTree" | "RasterTask" => {
                TaskGroup::PaintCompositeRender
            }
            "ParseHTML" | "ParseAuthorStyleSheet" => TaskGroup::ParseHtml,
            _ => TaskGroup::Other,
        }
    }
}

/// A top-level task observed on the main thread.
#[derive(Debug, Clone)]
pub struct CpuTask {
    /// Stable id of the form `{tid}.{start_ts_µs}`.
    pub id: String,
    /// Start timestamp in microseconds.
    pub start_ts: u64,
    /// End timestamp in microseconds.
    pub end_ts: u64,
    /// Wall duration minus the duration of direct children, microseconds.
    pub self_time_us: u64,
    /// Dominant work classification.
    pub group: TaskGroup,
    /// Every event nested inside this task's window, in timestamp order.
    pub child_events: Vec<TraceEvent>,
    /// URLs the task's work can be attributed to (argument URLs and stack
    /// frames of child events, deduplicated in first-seen order).
    pub attributable_urls: Vec<String>,
}

impl CpuTask {
    pub fn duration_us(&self) -> u64 {
        self.end_ts - self.start_ts
    }

    pub fn start_ms(&self) -> f64 {
        self.start_ts as f64 / 1000.0
    }

    pub fn end_ms(&self) -> f64 {
        self.end_ts as f64 / 1000.0
    }

    pub fn self_time_ms(&self) -> f64 {
        self.self_time_us as f64 / 1000.0
    }
}

/// The normalized view of a trace.
#[derive(Debug, Clone)]
pub struct ProcessedTrace {
    /// Process id of the renderer.
    pub main_pid: u64,
    /// Thread id of `CrRendererMain`.
    pub main_tid: u64,
    /// `navigationStart` timestamp, microseconds.
    pub navigation_start_ts: u64,
    /// `firstContentfulPaint` timestamp, if painted.
    pub fcp_ts: Option<u64>,
    /// `firstMeaningfulPaint` timestamp, if detected.
    pub fmp_ts: Option<u64>,
    /// Last timestamp covered by any event.
    pub trace_end_ts: u64,
    /// Top-level main-thread tasks, in start order.
    pub tasks: Vec<CpuTask>,
}

impl ProcessedTrace {
    /// Convert an absolute trace timestamp to milliseconds since navigation
    /// start.
    pub fn timing_ms(&self, ts: u64) -> f64 {
        (ts as f64 - self.navigation_start_ts as f64) / 1000.0
    }

    pub fn trace_end_timing_ms(&self) -> f64 {
        self.timing_ms(self.trace_end_ts)
    }
}

/// Computes [`ProcessedTrace`] from a raw event stream.
pub struct TraceProcessor;

impl TraceProcessor {
    /// Normalize a trace.
    ///
    /// Fails with `MalformedInput` when no renderer thread or no
    /// `navigationStart` mark can be located.
    pub fn compute(events: &[TraceEvent]) -> Result<ProcessedTrace> {
        if events.is_empty() {
            return Err(Error::MalformedInput("empty trace".to_string()));
        }

        let (main_pid, main_tid) = Self::find_main_thread(events)?;

        let mut main_thread: Vec<&TraceEvent> = events
            .iter()
            .filter(|e| e.pid == main_pid && e.tid == main_tid && e.ph != TracePhase::Metadata)
            .collect();
        // Stable sort: parents before children at equal timestamps.
        main_thread.sort_by(|a, b| {
            a.ts.cmp(&b.ts)
                .then(b.dur.unwrap_or(0).cmp(&a.dur.unwrap_or(0)))
        });

        let navigation_start_ts = main_thread
            .iter()
            .find(|e| e.name == "navigationStart")
            .map(|e| e.ts)
            .ok_or_else(|| {
                Error::MalformedInput("trace has no navigationStart on the main thread".to_string())
            })?;

        let mark_after_nav = |name: &str| {
            main_thread
                .iter()
                .find(|e| e.name == name && e.ts >= navigation_start_ts)
                .map(|e| e.ts)
        };
        let fcp_ts = mark_after_nav("firstContentfulPaint");
        let fmp_ts = mark_after_nav("firstMeaningfulPaint");

        let trace_end_ts = events.iter().map(|e| e.end_ts()).max().unwrap_or(0);

        let complete = Self::to_complete_events(&main_thread);
        let tasks = Self::build_tasks(&complete, main_tid, navigation_start_ts);

        Ok(ProcessedTrace {
            main_pid,
            main_tid,
            navigation_start_ts,
            fcp_ts,
            fmp_ts,
            trace_end_ts,
            tasks,
        })
    }

    /// Locate the renderer main thread via `thread_name` metadata, falling
    /// back to the busiest thread in the trace.
    fn find_main_thread(events: &[TraceEvent]) -> Result<(u64, u64)> {
        for event in events {
            if event.ph == TracePhase::Metadata
                && event.name == "thread_name"
                && event.args.get("name").and_then(|n| n.as_str()) == Some("CrRendererMain")
            {
                return Ok((event.pid, event.tid));
            }
        }

        let mut counts: HashMap<(u64, u64), usize> = HashMap::new();
        for event in events {
            if event.ph != TracePhase::Metadata {
                *counts.entry((event.pid, event.tid)).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .max_by_key(|&((pid, tid), count)| (count, std::cmp::Reverse((pid, tid))))
            .map(|(key, _)| key)
            .ok_or_else(|| Error::MalformedInput("trace has no renderer thread".to_string()))
    }

    /// Rewrite `B`/`E` pairs as complete events so that task nesting can be
    /// computed purely from intervals. `X` events pass through; unbalanced
    /// begins are closed at their own timestamp.
    fn to_complete_events(sorted: &[&TraceEvent]) -> Vec<TraceEvent> {
        let mut complete: Vec<TraceEvent> = Vec::with_capacity(sorted.len());
        let mut open: Vec<usize> = Vec::new();

        for event in sorted {
            match event.ph {
                TracePhase::Begin => {
                    let mut synthesized = (*event).clone();
                    synthesized.ph = TracePhase::Complete;
                    synthesized.dur = Some(0);
                    complete.push(synthesized);
                    open.push(complete.len() - 1);
                }
                TracePhase::End => {
                    if let Some(idx) = open.pop() {
                        complete[idx].dur = Some(event.ts - complete[idx].ts);
                    }
                }
                _ => complete.push((*event).clone()),
            }
        }

        complete.sort_by(|a, b| {
            a.ts.cmp(&b.ts)
                .then(b.dur.unwrap_or(0).cmp(&a.dur.unwrap_or(0)))
        });
        complete
    }

    /// Fold complete events into top-level tasks by interval containment.
    /// Events are pre-sorted by timestamp with longer durations first, so
    /// the event that opens a task always precedes its children.
    fn build_tasks(events: &[TraceEvent], tid: u64, navigation_start_ts: u64) -> Vec<CpuTask> {
        let mut tasks: Vec<CpuTask> = Vec::new();

        for event in events {
            if let Some(task) = tasks.last_mut() {
                let contained =
                    event.ts >= task.start_ts && event.ts < task.end_ts && event.end_ts() <= task.end_ts;
                if contained {
                    task.child_events.push(event.clone());
                    continue;
                }
            }

            if event.ph != TracePhase::Complete
                || event.dur.unwrap_or(0) == 0
                || event.ts < navigation_start_ts
            {
                continue;
            }
            tasks.push(CpuTask {
                id: format!("{}.{}", tid, event.ts),
                start_ts: event.ts,
                end_ts: event.end_ts(),
                self_time_us: event.dur.unwrap_or(0),
                group: TaskGroup::of_event(&event.name),
                child_events: vec![event.clone()],
                attributable_urls: Vec::new(),
            });
        }

        for task in &mut tasks {
            Self::finish_task(task);
        }
        tasks
    }

    /// Compute self-time, dominant group, and attributable URLs once all
    /// children are collected.
    fn finish_task(task: &mut CpuTask) {
        let total = task.end_ts - task.start_ts;
        // Direct children only: longest-covering events after the task's own
        // top-level event.
        let mut child_time = 0u64;
        let mut covered_until = task.start_ts;
        let mut group_time: HashMap<TaskGroup, u64> = HashMap::new();

        for (index, event) in task.child_events.iter().enumerate() {
            // index 0 is the task's own top-level event; it contributes URLs
            // but not child time.
            if index > 0 {
                let dur = event.dur.unwrap_or(0);
                if event.ts >= covered_until {
                    child_time += dur;
                    covered_until = event.end_ts();
                    *group_time.entry(TaskGroup::of_event(&event.name)).or_insert(0) += dur;
                }
            }

            if let Some(url) = event.arg_url() {
                if !task.attributable_urls.iter().any(|u| u == url) {
                    task.attributable_urls.push(url.to_string());
                }
            }
            for url in event.stack_trace_urls() {
                if !task.attributable_urls.contains(&url) {
                    task.attributable_urls.push(url);
                }
            }
        }

        task.self_time_us = total.saturating_sub(child_time);
        if let Some((&group, _)) = group_time
            .iter()
            .max_by_key(|&(_, &time)| time)
            .filter(|&(_, &time)| time > 0)
        {
            task.group = group;
        }
    }
}
