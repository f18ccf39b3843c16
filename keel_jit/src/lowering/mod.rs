//! Lowering from simplified operators to machine operators.
//!
//! - **Representation** (`representation.rs`): truncations and use requests
//! - **Changer** (`changer.rs`): conversions between representations
//! - **Diamonds** (`diamond.rs`): branchy expansions of division and modulus
//! - **Selection** (`simplified_lowering.rs`): the two-phase selector

pub mod changer;
pub mod diamond;
pub mod representation;
pub mod simplified_lowering;

pub use changer::RepresentationChanger;
pub use diamond::Diamond;
pub use representation::{Truncation, UseInfo};
pub use simplified_lowering::{LoweringStats, RepresentationSelector};
