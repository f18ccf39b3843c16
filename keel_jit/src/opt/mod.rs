//! Graph optimizations.
//!
//! - **Reducer framework** (`reducer.rs`): local rewrites driven to a fixpoint
//! - **Control reducer** (`control_reducer.rs`): trimming unreachable nodes
//! - **Dead code** (`dead_code.rs`): propagating `Dead`, `DeadValue` and `Unreachable`
//! - **Common reductions** (`common_reducer.rs`): constant branches, redundant phis
//! - **Value numbering** (`value_numbering.rs`): merging equal pure nodes
//! - **Pipeline** (`pipeline.rs`): the phases from a typed graph to a schedule

pub mod common_reducer;
pub mod control_reducer;
pub mod dead_code;
pub mod pipeline;
pub mod reducer;
pub mod value_numbering;

pub use common_reducer::CommonOperatorReducer;
pub use control_reducer::{ControlReducer, TrimStats};
pub use dead_code::DeadCodeElimination;
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats};
pub use reducer::{Editor, GraphReducer, Reducer, ReducerStats, Reduction};
pub use value_numbering::ValueNumberingReducer;
