//! Speed Index.
//!
//! The observed reading is the midpoint between first paint and the last
//! compositor work, a stand-in for the visual-progress integral when no
//! filmstrip is available. Simulation replays the visually-relevant subset
//! of the graph: layout/paint/parse CPU work plus the resource types that
//! can change what is on screen.

use lantern_core::network::ResourceType;
use lantern_core::Result;
use lantern_graph::{NodeKind, PageGraph, TaskGroup};

use crate::fcp::FirstContentfulPaint;
use crate::metric::{Coefficients, MetricComputation, PreparedArtifacts};

pub struct SpeedIndex;

impl MetricComputation for SpeedIndex {
    fn name(&self) -> &'static str {
        "speed-index"
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients {
            intercept: -250.0,
            optimistic: 1.4,
            pessimistic: 0.65,
        }
    }

    fn observed_timing_ms(&self, artifacts: &PreparedArtifacts) -> Result<f64> {
        let fcp = FirstContentfulPaint.observed_timing_ms(artifacts)?;
        let last_paint = artifacts
            .processed
            .tasks
            .iter()
            .filter(|t| t.group == TaskGroup::PaintCompositeRender)
            .map(|t| artifacts.processed.timing_ms(t.end_ts))
            .fold(None, |acc: Option<f64>, end| Some(acc.map_or(end, |a| a.max(end))));
        Ok(match last_paint {
            Some(end) if end > fcp => (fcp + end) / 2.0,
            _ => fcp,
        })
    }

    fn optimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
        FirstContentfulPaint.optimistic_graph(artifacts)
    }

    fn pessimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
        Ok(artifacts.graph.clone_with_relationships(|node| match &node.kind {
            NodeKind::Network(_) => artifacts
                .graph
                .record(node.id)
                .map(|r| {
                    matches!(
                        r.resource_type,
                        ResourceType::Document
                            | ResourceType::Stylesheet
                            | ResourceType::Image
                            | ResourceType::Font
                    )
                })
                .unwrap_or(false),
            NodeKind::Cpu(task) => matches!(
                task.group,
                TaskGroup::StyleLayout | TaskGroup::PaintCompositeRender | TaskGroup::ParseHtml
            ),
        }))
    }

    /// Speed Index can never beat first paint.
    fn finalize_timing(&self, timing: f64, artifacts: &PreparedArtifacts) -> f64 {
        match FirstContentfulPaint.observed_timing_ms(artifacts) {
            Ok(fcp) => timing.max(fcp),
            Err(_) => timing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::prepare;
    use lantern_core::settings::SimulationSettings;
    use lantern_core::trace::TraceEvent;
    use lantern_graph::DevtoolsMessage;
    use serde_json::json;

    fn make_trace(with_paint_task: bool) -> Vec<TraceEvent> {
        let mut events = vec![
            json!({"name": "thread_name", "ph": "M", "ts": 0, "pid": 1, "tid": 5,
                   "args": {"name": "CrRendererMain"}}),
            json!({"name": "navigationStart", "ph": "R", "ts": 1_000_000, "pid": 1, "tid": 5,
                   "args": {}}),
            json!({"name": "firstContentfulPaint", "ph": "R", "ts": 1_200_000, "pid": 1,
                   "tid": 5, "args": {}}),
        ];
        if with_paint_task {
            events.push(json!({"name": "Paint", "ph": "X", "ts": 1_500_000, "dur": 100_000,
                               "pid": 1, "tid": 5, "args": {}}));
        }
        serde_json::from_value(serde_json::Value::Array(events)).unwrap()
    }

    fn document_log() -> Vec<DevtoolsMessage> {
        serde_json::from_value(json!([
            {"method": "Network.requestWillBeSent", "params": {
                "requestId": "1", "timestamp": 1.0, "type": "Document",
                "request": {"url": "https://example.com/", "initialPriority": "VeryHigh"},
                "documentURL": "https://example.com/"}},
            {"method": "Network.loadingFinished", "params": {
                "requestId": "1", "timestamp": 1.1, "encodedDataLength": 4000}},
        ]))
        .unwrap()
    }

    #[test]
    fn test_observed_is_midpoint_of_fcp_and_last_paint() {
        let artifacts = prepare(&make_trace(true), &document_log()).unwrap();
        // FCP at 200ms, paint task ends at 600ms.
        assert_eq!(SpeedIndex.observed_timing_ms(&artifacts).unwrap(), 400.0);
    }

    #[test]
    fn test_observed_falls_back_to_fcp_without_paint_work() {
        let artifacts = prepare(&make_trace(false), &document_log()).unwrap();
        assert_eq!(SpeedIndex.observed_timing_ms(&artifacts).unwrap(), 200.0);
    }

    #[test]
    fn test_simulated_never_beats_first_paint() {
        let artifacts = prepare(&make_trace(true), &document_log()).unwrap();
        let result = SpeedIndex
            .compute_uncached(&artifacts, &SimulationSettings::default())
            .unwrap();
        let fcp = FirstContentfulPaint.observed_timing_ms(&artifacts).unwrap();
        assert!(result.timing >= fcp);
    }

    #[test]
    fn test_pessimistic_graph_keeps_visual_work_only() {
        let mut log = document_log();
        let script: Vec<DevtoolsMessage> = serde_json::from_value(json!([
            {"method": "Network.requestWillBeSent", "params": {
                "requestId": "2", "timestamp": 1.1, "type": "XHR",
                "request": {"url": "https://example.com/data.json", "initialPriority": "Low"},
                "documentURL": "https://example.com/"}},
            {"method": "Network.loadingFinished", "params": {
                "requestId": "2", "timestamp": 1.4, "encodedDataLength": 2000}},
        ]))
        .unwrap();
        log.extend(script);

        let artifacts = prepare(&make_trace(true), &log).unwrap();
        let graph = SpeedIndex.pessimistic_graph(&artifacts).unwrap();
        // Document and the paint task survive; the XHR does not.
        assert_eq!(graph.len(), 2);
        graph.validate().unwrap();
    }
}
