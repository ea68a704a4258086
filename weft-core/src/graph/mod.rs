//! The Graph Runner / Scheduler: dependency-ordered dispatch, typed
//! propagation across resolved port mappings, execution-directive
//! interpretation, and sub-graph nesting.

mod block;
mod runner;

pub use block::GraphRunnerBlock;
pub use runner::{GraphDefinition, GraphRunner, Outcome, TerminalOutputs};
