//! Page-load performance auditing.
//!
//! The facade over the pipeline: normalize a Chrome trace and DevTools
//! network log, build the page dependency graph, and compute the paint and
//! interactivity metrics either from the observed timeline or from lantern
//! simulation, depending on the configured throttling method.
//!
//! ```no_run
//! use lantern::{audit, SimulationSettings};
//!
//! # fn main() -> lantern::Result<()> {
//! # let (trace, log) = (vec![], vec![]);
//! let metrics = audit(&trace, &log, &SimulationSettings::default())?;
//! if let Ok(fcp) = &metrics.first_contentful_paint {
//!     println!("FCP: {:.0}ms", fcp.timing);
//! }
//! # Ok(())
//! # }
//! ```

pub use lantern_core::network::NetworkRequestRecord;
pub use lantern_core::settings::{SimulationSettings, ThrottlingMethod, ThrottlingSettings};
pub use lantern_core::trace::TraceEvent;
pub use lantern_core::{Error, Result};
pub use lantern_graph::{build_graph, DevtoolsMessage, NetworkRecorder, PageGraph, TraceProcessor};
pub use lantern_metrics::{
    prepare, ComputationCache, FirstContentfulPaint, Interactive, MetricComputation, MetricResult,
    PreparedArtifacts, SharedMetricResult, SpeedIndex,
};
pub use lantern_sim::{SimulationOptions, SimulationResult, Simulator};

/// Every metric computed for one page load.
///
/// Metrics fail independently: a trace without a `firstMeaningfulPaint`
/// mark still yields paint metrics, with `interactive` carrying its own
/// prerequisite error.
#[derive(Debug)]
pub struct MetricSet {
    pub first_contentful_paint: SharedMetricResult,
    pub speed_index: SharedMetricResult,
    pub interactive: SharedMetricResult,
}

/// Reusable audit pipeline. Holds the computation cache, so repeated audits
/// of the same artifacts (e.g. under different settings) skip work already
/// done.
pub struct Auditor {
    cache: ComputationCache,
}

impl Auditor {
    pub fn new() -> Self {
        Self {
            cache: ComputationCache::new(),
        }
    }

    /// Compute all metrics for one trace/log pair.
    ///
    /// Fails only when the shared pipeline fails (malformed artifacts, no
    /// main document); per-metric failures land in the [`MetricSet`].
    pub fn audit(
        &self,
        trace: &[TraceEvent],
        log: &[DevtoolsMessage],
        settings: &SimulationSettings,
    ) -> Result<MetricSet> {
        let artifacts = prepare(trace, log)?;
        Ok(self.audit_prepared(&artifacts, settings))
    }

    /// Compute all metrics over already-prepared artifacts.
    pub fn audit_prepared(
        &self,
        artifacts: &PreparedArtifacts,
        settings: &SimulationSettings,
    ) -> MetricSet {
        MetricSet {
            first_contentful_paint: FirstContentfulPaint.compute(artifacts, settings, &self.cache),
            speed_index: SpeedIndex.compute(artifacts, settings, &self.cache),
            interactive: Interactive.compute(artifacts, settings, &self.cache),
        }
    }
}

impl Default for Auditor {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot convenience wrapper around [`Auditor`].
pub fn audit(
    trace: &[TraceEvent],
    log: &[DevtoolsMessage],
    settings: &SimulationSettings,
) -> Result<MetricSet> {
    Auditor::new().audit(trace, log, settings)
}
