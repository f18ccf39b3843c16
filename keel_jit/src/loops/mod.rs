//! Loop surgery on the sea of nodes.
//!
//! - **Loop finder** (`loop_finder.rs`): loop membership and nesting
//! - **OSR** (`osr.rs`): turning an on-stack-replacement entry into a normal entry
//! - **Peeling** (`peeling.rs`): copying the first iteration ahead of a loop

pub mod loop_finder;
pub mod osr;
pub mod peeling;

pub use loop_finder::{LoopInfo, LoopTree};
pub use osr::{OsrDeconstructor, OsrStats};
pub use peeling::{LoopPeeler, PeelStats};
