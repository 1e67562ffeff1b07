//! First Contentful Paint.
//!
//! Only work that finished before the observed paint can have gated it, so
//! both subgraphs are cut off at the FCP timestamp. The optimistic graph
//! keeps just the document and render-blocking requests; the pessimistic
//! graph keeps everything that completed in time, CPU work included.

use lantern_core::network::ResourceType;
use lantern_core::{Error, Result};
use lantern_graph::{NodeKind, PageGraph};

use crate::metric::{Coefficients, MetricComputation, PreparedArtifacts};

pub struct FirstContentfulPaint;

impl FirstContentfulPaint {
    /// Observed paint timestamp, microseconds absolute.
    fn fcp_ts(artifacts: &PreparedArtifacts) -> Result<u64> {
        artifacts.processed.fcp_ts.ok_or_else(|| {
            Error::MetricPrerequisite("trace has no firstContentfulPaint mark".to_string())
        })
    }
}

impl MetricComputation for FirstContentfulPaint {
    fn name(&self) -> &'static str {
        "first-contentful-paint"
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients {
            intercept: 0.0,
            optimistic: 0.5,
            pessimistic: 0.5,
        }
    }

    fn observed_timing_ms(&self, artifacts: &PreparedArtifacts) -> Result<f64> {
        Ok(artifacts.processed.timing_ms(Self::fcp_ts(artifacts)?))
    }

    fn optimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
        let fcp_ts = Self::fcp_ts(artifacts)?;
        let cutoff_ms = fcp_ts as f64 / 1000.0;
        Ok(artifacts.graph.clone_with_relationships(|node| {
            let NodeKind::Network(_) = node.kind else {
                return false;
            };
            let Some(record) = artifacts.graph.record(node.id) else {
                return false;
            };
            record.end_time <= cutoff_ms
                && (record.resource_type == ResourceType::Document || record.is_render_blocking())
        }))
    }

    fn pessimistic_graph(&self, artifacts: &PreparedArtifacts) -> Result<PageGraph> {
        let fcp_ts = Self::fcp_ts(artifacts)?;
        let cutoff_ms = fcp_ts as f64 / 1000.0;
        Ok(artifacts.graph.clone_with_relationships(|node| match &node.kind {
            NodeKind::Network(_) => artifacts
                .graph
                .record(node.id)
                .map(|r| r.end_time <= cutoff_ms)
                .unwrap_or(false),
            NodeKind::Cpu(task) => task.end_ts <= fcp_ts,
        }))
    }
}
