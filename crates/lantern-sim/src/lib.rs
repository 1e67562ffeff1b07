//! Discrete-event page-load simulation ("lantern").
//!
//! Given a dependency graph from `lantern-graph`, the [`Simulator`] predicts
//! load timing under a modeled network/CPU environment without re-running
//! the page. Optimistic and pessimistic runs are plain parameterizations of
//! the same engine via [`SimulationOptions`].

pub mod connection;
pub mod simulator;

pub use connection::{ConnectionGrant, ConnectionPool};
pub use simulator::{NodeTiming, SimulationOptions, SimulationResult, Simulator};
