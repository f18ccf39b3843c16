//! Generic JavaScript-level operators.
//!
//! Every operator here takes a context input; those that may throw also take
//! a frame state so that they can deoptimize.

use super::cached;
use crate::ir::operators::{OpParam, Opcode, Operator};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsOperatorBuilder;

impl JsOperatorBuilder {
    pub fn new() -> Self {
        JsOperatorBuilder
    }

    pub fn add(&self) -> Operator {
        cached(Opcode::JsAdd)
    }

    pub fn subtract(&self) -> Operator {
        cached(Opcode::JsSubtract)
    }

    pub fn multiply(&self) -> Operator {
        cached(Opcode::JsMultiply)
    }

    pub fn less_than(&self) -> Operator {
        cached(Opcode::JsLessThan)
    }

    pub fn strict_equal(&self) -> Operator {
        cached(Opcode::JsStrictEqual)
    }

    pub fn to_number(&self) -> Operator {
        cached(Opcode::JsToNumber)
    }

    pub fn to_boolean(&self) -> Operator {
        cached(Opcode::JsToBoolean)
    }

    /// `callee, receiver, args...`
    pub fn call_function(&self, argc: u32) -> Operator {
        Operator::with_param(Opcode::JsCallFunction, argc + 2, 1, OpParam::Arity(argc))
    }

    pub fn stack_check(&self) -> Operator {
        cached(Opcode::JsStackCheck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_function_arity() {
        let js = JsOperatorBuilder::new();
        let call = js.call_function(2);
        assert_eq!(call.value_input_count(), 4);
        // values, context, frame state, effect, control
        assert_eq!(call.total_input_count(), 4 + 1 + 1 + 1 + 1);
    }
}
