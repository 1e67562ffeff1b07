//! Metric computations over observed traces and lantern simulations.
//!
//! Each metric implements [`MetricComputation`]: an observed reading from
//! the trace plus an optimistic/pessimistic pair of simulation runs blended
//! through fixed coefficients. Results are memoized in a
//! [`ComputationCache`] keyed by a content fingerprint of the inputs.

pub mod cache;
pub mod fcp;
pub mod interactive;
pub mod metric;
pub mod quiet_window;
pub mod speed_index;

pub use cache::{ComputationCache, SharedMetricResult};
pub use fcp::FirstContentfulPaint;
pub use interactive::Interactive;
pub use metric::{prepare, Coefficients, MetricComputation, MetricResult, PreparedArtifacts};
pub use quiet_window::{find_quiet_window, LongTask};
pub use speed_index::SpeedIndex;
