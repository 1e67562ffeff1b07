//! The metric computation contract.
//!
//! Every metric produces a [`MetricResult`] from the same prepared
//! artifacts. Under the `simulate` throttling method the timing is a linear
//! blend of an optimistic and a pessimistic lantern run over metric-specific
//! subgraphs; under `provided`/`devtools` it is read straight off the trace.

use lantern_core::network::NetworkRequestRecord;
use lantern_core::settings::{SimulationSettings, ThrottlingMethod};
use lantern_core::trace::TraceEvent;
use lantern_core::Result;
use lantern_graph::{build_graph, DevtoolsMessage, NetworkRecorder, PageGraph, ProcessedTrace, TraceProcessor};
use lantern_sim::{SimulationOptions, SimulationResult, Simulator};

use crate::cache::{fingerprint, ComputationCache, SharedMetricResult};

/// One computed metric value.
#[derive(Debug, Clone)]
pub struct MetricResult {
    /// Milliseconds since navigation start.
    pub timing: f64,
    /// Absolute trace timestamp of the metric moment, microseconds.
    pub timestamp: f64,
    /// The optimistic lantern run, when simulated.
    pub optimistic_estimate: Option<SimulationResult>,
    /// The pessimistic lantern run, when simulated.
    pub pessimistic_estimate: Option<SimulationResult>,
}

/// Linear blending weights for the two simulation runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub intercept: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

impl Coefficients {
    pub fn blend(&self, optimistic_ms: f64, pessimistic_ms: f64) -> f64 {
        self.intercept + self.optimistic * optimistic_ms + self.pessimistic * pessimistic_ms
    }
}

/// The normalized inputs every metric computation shares: processed trace,
/// network records, the canonical page graph, and a content digest of the
/// raw artifacts for cache keying.
#[derive(Debug)]
pub struct PreparedArtifacts {
    pub processed: ProcessedTrace,
    pub records: Vec<NetworkRequestRecord>,
    pub graph: PageGraph,
    pub input_digest: String,
}

/// Run the full normalization pipeline once; the result feeds every metric.
pub fn prepare(trace: &[TraceEvent], log: &[DevtoolsMessage]) -> Result<PreparedArtifacts> {
    let processed = TraceProcessor::compute(trace)?;
    let records = NetworkRecorder::records_from_log(log)?;
    let graph = build_graph(&processed, &records)?;
    let trace_bytes = serde_json::to_vec(trace)?;
    let log_bytes = serde_json::to_vec(log)?;
    let input_digest = fingerprint("artifacts", &[&trace_bytes, &log_bytes]);
    Ok(PreparedArtifacts {
        processed,
        records,
        graph,
        input_digest,
    })
}

/// A metric over the prepared artifacts.
///
/// Implementors supply the observed reading, the two subgraphs to simulate,
/// and the blending coefficients; the provided methods handle dispatch on
/// the throttling method and caching.
pub trait MetricComputation {
    fn name(&self) -> &'static str;

    fn coefficients(&self) -> Coefficients;

    /// The metric as actually observed in the trace, ms since navigation.
    fn observed_timing_ms(&self, artifacts: &PreparedArtifacts) -> Result<f64>;

    /// Subgraph replayed under best-case resource availability.
    fn optimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph>;

    /// Subgraph replayed under worst-case serialization.
    fn pessimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph>;

    /// Extract the metric moment from one simulation run. Defaults to the
    /// run's total completion time.
    fn estimate_from_run(
        &self,
        run: &SimulationResult,
        _graph: &PageGraph,
        _options: &SimulationOptions,
    ) -> f64 {
        run.time_in_ms
    }

    /// Post-blend adjustment hook (e.g. clamping against another metric).
    fn finalize_timing(&self, timing: f64, _artifacts: &PreparedArtifacts) -> f64 {
        timing
    }

    fn compute_uncached(
        &self,
        artifacts: &PreparedArtifacts,
        settings: &SimulationSettings,
    ) -> Result<MetricResult> {
        match settings.throttling_method {
            ThrottlingMethod::Provided | ThrottlingMethod::Devtools => {
                let timing = self.observed_timing_ms(artifacts)?;
                Ok(MetricResult {
                    timing,
                    timestamp: timestamp_for(artifacts, timing),
                    optimistic_estimate: None,
                    pessimistic_estimate: None,
                })
            }
            ThrottlingMethod::Simulate => {
                let optimistic_graph = self.optimistic_graph(artifacts)?;
                let pessimistic_graph = self.pessimistic_graph(artifacts)?;
                let optimistic_options = SimulationOptions::optimistic(&settings.throttling);
                let pessimistic_options = SimulationOptions::pessimistic(&settings.throttling);

                let optimistic_run =
                    Simulator::new(optimistic_options).simulate(&optimistic_graph)?;
                let pessimistic_run =
                    Simulator::new(pessimistic_options).simulate(&pessimistic_graph)?;

                let optimistic_ms =
                    self.estimate_from_run(&optimistic_run, &optimistic_graph, &optimistic_options);
                let pessimistic_ms = self.estimate_from_run(
                    &pessimistic_run,
                    &pessimistic_graph,
                    &pessimistic_options,
                );
                let timing = self.finalize_timing(
                    self.coefficients().blend(optimistic_ms, pessimistic_ms),
                    artifacts,
                );
                Ok(MetricResult {
                    timing,
                    timestamp: timestamp_for(artifacts, timing),
                    optimistic_estimate: Some(optimistic_run),
                    pessimistic_estimate: Some(pessimistic_run),
                })
            }
        }
    }

    /// Cached computation: keyed on the metric name, the artifact digest,
    /// and the serialized settings.
    fn compute(
        &self,
        artifacts: &PreparedArtifacts,
        settings: &SimulationSettings,
        cache: &ComputationCache,
    ) -> SharedMetricResult {
        let settings_bytes = match serde_json::to_vec(settings) {
            Ok(bytes) => bytes,
            Err(e) => return Err(std::sync::Arc::new(e.into())),
        };
        let key = fingerprint(
            self.name(),
            &[artifacts.input_digest.as_bytes(), &settings_bytes],
        );
        cache.get_or_compute(&key, || self.compute_uncached(artifacts, settings))
    }
}

fn timestamp_for(artifacts: &PreparedArtifacts, timing_ms: f64) -> f64 {
    artifacts.processed.navigation_start_ts as f64 + timing_ms * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::Error;

    struct Fixed {
        observed: f64,
    }

    impl MetricComputation for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn coefficients(&self) -> Coefficients {
            Coefficients {
                intercept: 0.0,
                optimistic: 0.5,
                pessimistic: 0.5,
            }
        }
        fn observed_timing_ms(&self, _artifacts: &PreparedArtifacts) -> Result<f64> {
            Ok(self.observed)
        }
        fn optimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
            Ok(artifacts.graph.clone())
        }
        fn pessimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
            Ok(artifacts.graph.clone())
        }
    }

    fn make_artifacts() -> PreparedArtifacts {
        let trace: Vec<TraceEvent> = serde_json::from_value(serde_json::json!([
            {"name": "thread_name", "ph": "M", "ts": 0, "pid": 1, "tid": 5,
             "args": {"name": "CrRendererMain"}},
            {"name": "navigationStart", "ph": "R", "ts": 1_000_000, "pid": 1, "tid": 5, "args": {}},
        ]))
        .unwrap();
        let log: Vec<DevtoolsMessage> = serde_json::from_value(serde_json::json!([
            {"method": "Network.requestWillBeSent", "params": {
                "requestId": "1", "timestamp": 1.0,
                "request": {"url": "https://example.com/"},
                "type": "Document", "documentURL": "https://example.com/"}},
            {"method": "Network.responseReceived", "params": {
                "requestId": "1", "timestamp": 1.05,
                "response": {"status": 200, "protocol": "h2"}}},
            {"method": "Network.loadingFinished", "params": {
                "requestId": "1", "timestamp": 1.1, "encodedDataLength": 5000}},
        ]))
        .unwrap();
        prepare(&trace, &log).unwrap()
    }

    #[test]
    fn test_provided_method_reads_the_trace() {
        let artifacts = make_artifacts();
        let settings = SimulationSettings {
            throttling_method: ThrottlingMethod::Provided,
            ..Default::default()
        };
        let result = Fixed { observed: 321.0 }
            .compute_uncached(&artifacts, &settings)
            .unwrap();
        assert_eq!(result.timing, 321.0);
        assert_eq!(result.timestamp, 1_000_000.0 + 321_000.0);
        assert!(result.optimistic_estimate.is_none());
        assert!(result.pessimistic_estimate.is_none());
    }

    #[test]
    fn test_simulate_method_blends_two_runs() {
        let artifacts = make_artifacts();
        let settings = SimulationSettings::default();
        let result = Fixed { observed: 0.0 }
            .compute_uncached(&artifacts, &settings)
            .unwrap();
        let optimistic = result.optimistic_estimate.as_ref().unwrap();
        let pessimistic = result.pessimistic_estimate.as_ref().unwrap();
        assert_eq!(
            result.timing,
            0.5 * optimistic.time_in_ms + 0.5 * pessimistic.time_in_ms
        );
        assert!(result.timing > 0.0);
    }

    #[test]
    fn test_compute_caches_per_settings() {
        let artifacts = make_artifacts();
        let cache = ComputationCache::new();
        let metric = Fixed { observed: 1.0 };

        let simulate = SimulationSettings::default();
        let provided = SimulationSettings {
            throttling_method: ThrottlingMethod::Provided,
            ..Default::default()
        };

        let a = metric.compute(&artifacts, &simulate, &cache).unwrap();
        let b = metric.compute(&artifacts, &simulate, &cache).unwrap();
        let c = metric.compute(&artifacts, &provided, &cache).unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert_ne!(a.timing, c.timing);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_prepare_rejects_empty_trace() {
        let err = prepare(&[], &[]).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }
}
