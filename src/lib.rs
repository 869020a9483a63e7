//! Lintel: Completion and Rewind for Incremental Build Graphs
//!
//! The completion stage of an incremental build-graph evaluator: collects the
//! final artifact set for a top-level request, classifies failures, validates
//! that previously-reported outputs are still retrievable, and coordinates
//! minimal re-execution when they are not.

pub mod artifact;
pub mod causes;
pub mod completion;
pub mod config;
pub mod context;
pub mod desired;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod prefetch;
pub mod report;
pub mod rewind;
pub mod types;
pub mod validator;
