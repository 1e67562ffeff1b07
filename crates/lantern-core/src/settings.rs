//! Simulation settings and throttling profiles.

use serde::{Deserialize, Serialize};

/// Where metric timings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottlingMethod {
    /// Replay the dependency graph through the simulator.
    Simulate,
    /// Trust the observed trace timestamps as-is.
    Provided,
    /// Observed timestamps collected under DevTools throttling.
    Devtools,
}

/// Network and CPU throttling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottlingSettings {
    pub request_latency_ms: f64,
    pub download_throughput_kbps: f64,
    /// Part of the throttling profile for completeness; the simulator
    /// models request bodies as a single latency round trip, so only the
    /// download direction is rate-limited.
    pub upload_throughput_kbps: f64,
    pub cpu_slowdown_multiplier: f64,
}

impl ThrottlingSettings {
    /// Emulated regular-3G mobile profile.
    pub fn mobile_3g() -> Self {
        Self {
            request_latency_ms: 150.0,
            download_throughput_kbps: 1_638.4,
            upload_throughput_kbps: 675.0,
            cpu_slowdown_multiplier: 4.0,
        }
    }

    /// No throttling at all (fast desktop baseline).
    pub fn none() -> Self {
        Self {
            request_latency_ms: 0.0,
            download_throughput_kbps: f64::INFINITY,
            upload_throughput_kbps: f64::INFINITY,
            cpu_slowdown_multiplier: 1.0,
        }
    }
}

impl Default for ThrottlingSettings {
    fn default() -> Self {
        Self::mobile_3g()
    }
}

/// Top-level settings consumed by every metric computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub throttling_method: ThrottlingMethod,
    pub throttling: ThrottlingSettings,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            throttling_method: ThrottlingMethod::Simulate,
            throttling: ThrottlingSettings::default(),
        }
    }
}
