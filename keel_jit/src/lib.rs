//! Sea-of-nodes mid-tier compiler for keel.
//!
//! Takes a typed graph of simplified operators through:
//! - Control trimming and dead code elimination
//! - Representation selection down to machine operators
//! - Scheduling into basic blocks with loop-invariant hoisting
//! - OSR entry deconstruction and loop peeling
#![deny(unsafe_op_in_unsafe_fn)]
pub mod error;
pub mod ir;
pub mod loops;
pub mod lowering;
pub mod opt;
pub mod schedule;
pub mod testing;

pub use error::{CompileError, Result, VerifyError};
pub use ir::{Graph, NodeId};
pub use opt::{Pipeline, PipelineConfig};
pub use schedule::Schedule;
