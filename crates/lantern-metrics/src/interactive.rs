//! Time to Interactive.
//!
//! Interactive is the first quiet moment after first meaningful paint: no
//! long main-thread task and no heavy request churn for a full window (see
//! [`crate::quiet_window`]). Simulated runs read the quiet moment off the
//! replayed timeline instead: the later of the last long CPU task and the
//! last critical network response.

use lantern_core::network::ResourceType;
use lantern_core::{Error, Result};
use lantern_graph::{NodeKind, PageGraph};
use lantern_sim::{SimulationOptions, SimulationResult};

use crate::metric::{Coefficients, MetricComputation, PreparedArtifacts};
use crate::quiet_window::{find_quiet_window, LongTask, LONG_TASK_THRESHOLD_MS, MINIMUM_QUIET_WINDOW_MS};

pub struct Interactive;

impl Interactive {
    /// FMP timing in ms since navigation, with the trace-length
    /// prerequisite enforced.
    fn fmp_timing_ms(artifacts: &PreparedArtifacts) -> Result<f64> {
        let fmp_ts = artifacts.processed.fmp_ts.ok_or_else(|| {
            Error::MetricPrerequisite("trace has no firstMeaningfulPaint mark".to_string())
        })?;
        let fmp = artifacts.processed.timing_ms(fmp_ts);
        let trace_end = artifacts.processed.trace_end_timing_ms();
        if trace_end - fmp < MINIMUM_QUIET_WINDOW_MS {
            return Err(Error::MetricPrerequisite(format!(
                "trace ends {:.0}ms after firstMeaningfulPaint; at least {:.0}ms is required",
                trace_end - fmp,
                MINIMUM_QUIET_WINDOW_MS
            )));
        }
        Ok(fmp)
    }

    fn long_tasks(artifacts: &PreparedArtifacts) -> Vec<LongTask> {
        artifacts
            .processed
            .tasks
            .iter()
            .filter(|t| t.duration_us() as f64 / 1000.0 >= LONG_TASK_THRESHOLD_MS)
            .map(|t| LongTask {
                start: artifacts.processed.timing_ms(t.start_ts),
                end: artifacts.processed.timing_ms(t.end_ts),
            })
            .collect()
    }

    /// Whether a simulated network node can delay interactivity.
    fn is_critical_request(graph: &PageGraph, node: lantern_graph::NodeId) -> bool {
        graph
            .record(node)
            .map(|r| r.resource_type == ResourceType::Document || r.is_render_blocking())
            .unwrap_or(false)
    }
}

impl MetricComputation for Interactive {
    fn name(&self) -> &'static str {
        "interactive"
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients {
            intercept: 0.0,
            optimistic: 0.45,
            pessimistic: 0.55,
        }
    }

    fn observed_timing_ms(&self, artifacts: &PreparedArtifacts) -> Result<f64> {
        let fmp = Self::fmp_timing_ms(artifacts)?;
        find_quiet_window(
            fmp,
            artifacts.processed.trace_end_timing_ms(),
            &Self::long_tasks(artifacts),
        )
    }

    fn optimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
        Self::fmp_timing_ms(artifacts)?;
        Ok(artifacts.graph.clone_with_relationships(|node| match &node.kind {
            NodeKind::Network(_) => artifacts
                .graph
                .record(node.id)
                .map(|r| {
                    matches!(
                        r.resource_type,
                        ResourceType::Document
                            | ResourceType::Script
                            | ResourceType::Xhr
                            | ResourceType::Fetch
                    ) || r.is_render_blocking()
                })
                .unwrap_or(false),
            NodeKind::Cpu(task) => {
                task.duration_us() as f64 / 1000.0 >= LONG_TASK_THRESHOLD_MS
            }
        }))
    }

    fn pessimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
        Self::fmp_timing_ms(artifacts)?;
        Ok(artifacts.graph.clone())
    }

    /// The simulated quiet moment: whichever comes later of the last long
    /// CPU task and the last critical request, falling back to the run's
    /// total time when neither exists.
    fn estimate_from_run(
        &self,
        run: &SimulationResult,
        graph: &PageGraph,
        options: &SimulationOptions,
    ) -> f64 {
        let cpu_quiet =
            run.last_long_cpu_task_end(graph, LONG_TASK_THRESHOLD_MS * options.cpu_slowdown_multiplier);
        let network_quiet = run
            .node_timings
            .iter()
            .filter(|(&id, _)| Self::is_critical_request(graph, id))
            .map(|(_, timing)| timing.end_time)
            .fold(None, |acc: Option<f64>, end| Some(acc.map_or(end, |a| a.max(end))));

        match (cpu_quiet, network_quiet) {
            (Some(cpu), Some(network)) => cpu.max(network),
            (Some(cpu), None) => cpu,
            (None, Some(network)) => network,
            (None, None) => run.time_in_ms,
        }
    }
}
