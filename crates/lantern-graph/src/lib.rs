//! Trace/network normalization and the page dependency graph.
//!
//! The pipeline: [`trace_processor::TraceProcessor`] and
//! [`network_recorder::NetworkRecorder`] normalize the raw artifacts, then
//! [`builder::build_graph`] links the resulting tasks and requests into a
//! rooted [`node::PageGraph`].

pub mod builder;
pub mod network_recorder;
pub mod node;
pub mod trace_processor;

pub use builder::build_graph;
pub use network_recorder::{DevtoolsMessage, NetworkRecorder};
pub use node::{Node, NodeId, NodeKind, PageGraph};
pub use trace_processor::{CpuTask, ProcessedTrace, TaskGroup, TraceProcessor};
