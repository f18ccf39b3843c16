//! Scheduling the sea of nodes into basic blocks.
//!
//! - **Schedule** (`schedule.rs`): blocks, edges and node placement
//! - **Block order** (`special_rpo.rs`): reverse post-order with contiguous loops
//! - **Scheduler** (`scheduler.rs`): CFG construction, dominators and node placement
//! - **Verifier** (`verifier.rs`): schedule invariants

pub mod schedule;
pub mod scheduler;
pub mod special_rpo;
pub mod verifier;

pub use schedule::{BasicBlock, BlockControl, BlockId, Schedule};
pub use scheduler::{Scheduler, SchedulerConfig, DEFAULT_MAX_FLOATING_CONTROL_ROUNDS};
pub use special_rpo::compute_special_rpo;
pub use verifier::ScheduleVerifier;
