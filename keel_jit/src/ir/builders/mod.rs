//! Operator builders, one per IR level.
//!
//! Builders are zero-sized handles. Parameterless operators come from a
//! table built once per process; parameterised ones are constructed on
//! demand and compare equal whenever their parameters do.

mod common;
mod js;
mod machine;
mod simplified;

pub use common::CommonOperatorBuilder;
pub use js::JsOperatorBuilder;
pub use machine::MachineOperatorBuilder;
pub use simplified::SimplifiedOperatorBuilder;

use std::sync::OnceLock;

use super::operators::{Opcode, Operator};

/// Parameterless operators, indexed by opcode.
static SIMPLE_OPERATORS: OnceLock<Vec<Operator>> = OnceLock::new();

/// The shared instance of a parameterless operator.
#[inline]
pub(crate) fn cached(opcode: Opcode) -> Operator {
    SIMPLE_OPERATORS.get_or_init(|| Opcode::ALL.iter().map(|&op| Operator::simple(op)).collect())
        [opcode as usize]
}
