//! Core types and schemas for the Lantern page-load audit library.
//!
//! This crate defines the foundational data structures used across the
//! system. It contains no logic—only type definitions, serialization
//! formats, and error types.

pub mod error;
pub mod network;
pub mod settings;
pub mod trace;

pub use error::{Error, Result};
