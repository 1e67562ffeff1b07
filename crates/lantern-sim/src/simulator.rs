//! Discrete-event load simulator.
//!
//! Replays a [`PageGraph`] under a modeled network/CPU environment. The
//! engine maintains a min-heap of "node finishes at time T" events; each
//! iteration greedily starts every ready node with free resource capacity,
//! then advances the virtual clock to the next completion. Ties are broken
//! by node id so identical inputs always produce identical timelines.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, BTreeMap, HashMap};

use lantern_core::network::NetworkRequestRecord;
use lantern_core::settings::ThrottlingSettings;
use lantern_core::Result;
use lantern_graph::{NodeId, PageGraph};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionPool;

/// Parameters of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub rtt_ms: f64,
    pub download_throughput_kbps: f64,
    pub cpu_slowdown_multiplier: f64,
    /// Global cap on parallel requests.
    pub max_connections: usize,
    /// Per-origin cap for HTTP/1.1 origins.
    pub max_connections_per_origin: usize,
    /// Optimistic runs assume every connection is already warm.
    pub assume_warm_connections: bool,
    /// Pessimistic runs stall CPU work behind render-blocking CSS/JS.
    pub serialize_render_blocking: bool,
}

impl SimulationOptions {
    pub fn from_settings(throttling: &ThrottlingSettings) -> Self {
        Self {
            rtt_ms: throttling.request_latency_ms,
            download_throughput_kbps: throttling.download_throughput_kbps,
            cpu_slowdown_multiplier: throttling.cpu_slowdown_multiplier,
            max_connections: 10,
            max_connections_per_origin: 6,
            assume_warm_connections: false,
            serialize_render_blocking: false,
        }
    }

    /// Best-case resource availability: maximum connection reuse, no
    /// render-blocking stalls.
    pub fn optimistic(throttling: &ThrottlingSettings) -> Self {
        Self {
            assume_warm_connections: true,
            ..Self::from_settings(throttling)
        }
    }

    /// Worst-case serialization: cold connections and render-blocking
    /// resources stall the CPU.
    pub fn pessimistic(throttling: &ThrottlingSettings) -> Self {
        Self {
            serialize_render_blocking: true,
            ..Self::from_settings(throttling)
        }
    }
}

/// Simulated timing of a single node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTiming {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

/// The outcome of one simulation run. Immutable.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Total completion time of the whole graph, in milliseconds.
    pub time_in_ms: f64,
    pub node_timings: BTreeMap<NodeId, NodeTiming>,
}

impl SimulationResult {
    /// End time of the last CPU node whose simulated duration is at least
    /// `threshold_ms`, if any.
    pub fn last_long_cpu_task_end(&self, graph: &PageGraph, threshold_ms: f64) -> Option<f64> {
        self.node_timings
            .iter()
            .filter(|(&id, timing)| {
                graph.node(id).map(|n| n.is_cpu()).unwrap_or(false)
                    && timing.duration >= threshold_ms
            })
            .map(|(_, timing)| timing.end_time)
            .fold(None, |acc, end| Some(acc.map_or(end, |a: f64| a.max(end))))
    }
}

/// A "node finishes at time T" event. Reversed ordering turns the std
/// max-heap into a min-heap on (time, node id).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Completion {
    time_ms: f64,
    node: NodeId,
}

impl Eq for Completion {}

impl PartialOrd for Completion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Completion {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time_ms
            .total_cmp(&self.time_ms)
            .then(other.node.cmp(&self.node))
    }
}

/// Discrete-event simulator over a page dependency graph.
pub struct Simulator {
    options: SimulationOptions,
}

impl Simulator {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    /// Replay the graph. Deterministic for identical graph + options.
    ///
    /// Fails with `GraphConstruction` only when the graph itself is
    /// malformed (cycle, missing root, unreachable nodes).
    pub fn simulate(&self, graph: &PageGraph) -> Result<SimulationResult> {
        graph.validate()?;

        let mut remaining: HashMap<NodeId, usize> = graph
            .nodes()
            .map(|n| (n.id, n.dependencies().len()))
            .collect();

        let mut pool = ConnectionPool::new(
            self.options.max_connections,
            self.options.max_connections_per_origin,
        );
        let mut network_ready: Vec<(f64, NodeId)> = Vec::new();
        let mut cpu_ready: Vec<(f64, NodeId)> = Vec::new();
        let mut heap: BinaryHeap<Completion> = BinaryHeap::new();
        let mut timings: BTreeMap<NodeId, NodeTiming> = BTreeMap::new();
        let mut cpu_busy = false;
        // Render-blocking network nodes that are ready or in flight.
        let mut blocking_active = 0usize;

        // The root is normally the main document request, but the graph
        // contract only requires a dependency-free root node.
        let root = graph.root();
        if graph.record(root).is_some() {
            network_ready.push((0.0, root));
        } else {
            cpu_ready.push((0.0, root));
        }

        let mut now = 0.0f64;
        loop {
            self.start_ready(
                graph,
                now,
                &mut pool,
                &mut network_ready,
                &mut cpu_ready,
                &mut heap,
                &mut timings,
                &mut cpu_busy,
                blocking_active,
            );

            let Some(completion) = heap.pop() else {
                break;
            };
            now = completion.time_ms;
            let node = completion.node;

            if let Some(record) = graph.record(node) {
                pool.release(record.origin());
                if self.options.serialize_render_blocking && record.is_render_blocking() {
                    blocking_active = blocking_active.saturating_sub(1);
                }
            } else {
                cpu_busy = false;
            }

            for &dependent in graph.node(node).map(|n| n.dependents()).unwrap_or(&[]) {
                let count = remaining.get_mut(&dependent).expect("known node");
                *count -= 1;
                if *count > 0 {
                    continue;
                }
                match graph.record(dependent) {
                    Some(record) => {
                        if self.options.serialize_render_blocking && record.is_render_blocking() {
                            blocking_active += 1;
                        }
                        network_ready.push((now, dependent));
                    }
                    None => cpu_ready.push((now, dependent)),
                }
            }
        }

        let time_in_ms = timings
            .values()
            .map(|t| t.end_time)
            .fold(0.0f64, f64::max);
        Ok(SimulationResult {
            time_in_ms,
            node_timings: timings,
        })
    }

    /// Greedily start every ready node with free capacity: network first,
    /// FCFS by (ready time, node id); then at most one CPU node.
    #[allow(clippy::too_many_arguments)]
    fn start_ready(
        &self,
        graph: &PageGraph,
        now: f64,
        pool: &mut ConnectionPool,
        network_ready: &mut Vec<(f64, NodeId)>,
        cpu_ready: &mut Vec<(f64, NodeId)>,
        heap: &mut BinaryHeap<Completion>,
        timings: &mut BTreeMap<NodeId, NodeTiming>,
        cpu_busy: &mut bool,
        blocking_active: usize,
    ) {
        network_ready.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut unstarted = Vec::new();
        for (ready_time, node) in network_ready.drain(..) {
            let record = graph.record(node).expect("network node has a record");
            match pool.try_acquire(record.origin(), record.is_h2()) {
                Some(grant) => {
                    let cold = grant.cold && !self.options.assume_warm_connections;
                    let duration = self.network_duration(record, cold);
                    let start = ready_time.max(now);
                    timings.insert(
                        node,
                        NodeTiming {
                            start_time: start,
                            end_time: start + duration,
                            duration,
                        },
                    );
                    heap.push(Completion {
                        time_ms: start + duration,
                        node,
                    });
                }
                None => unstarted.push((ready_time, node)),
            }
        }
        *network_ready = unstarted;

        let stalled = self.options.serialize_render_blocking && blocking_active > 0;
        if !*cpu_busy && !stalled && !cpu_ready.is_empty() {
            cpu_ready.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let (ready_time, node) = cpu_ready.remove(0);
            let task = graph.cpu_task(node).expect("cpu node has a task");
            let duration = task.self_time_ms() * self.options.cpu_slowdown_multiplier;
            let start = ready_time.max(now);
            timings.insert(
                node,
                NodeTiming {
                    start_time: start,
                    end_time: start + duration,
                    duration,
                },
            );
            heap.push(Completion {
                time_ms: start + duration,
                node,
            });
            *cpu_busy = true;
        }
    }

    /// Modeled wall time for one network request: handshake (cold
    /// connections only) + one round trip of request/response latency +
    /// transfer time at the simulated throughput.
    fn network_duration(&self, record: &NetworkRequestRecord, cold: bool) -> f64 {
        if record.from_cache {
            return 1.0;
        }
        let rtt = self.options.rtt_ms;
        let mut handshake = 0.0;
        if cold {
            // DNS + TCP, plus TLS for secure origins.
            handshake += 2.0 * rtt;
            if record.is_secure() {
                handshake += rtt;
            }
        }
        let transfer = if self.options.download_throughput_kbps.is_finite()
            && self.options.download_throughput_kbps > 0.0
        {
            record.transfer_size as f64 * 8.0 / self.options.download_throughput_kbps
        } else {
            0.0
        };
        handshake + rtt + transfer
    }
}
