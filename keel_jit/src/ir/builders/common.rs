//! Level-independent operators: control, phis, constants, frame states.

use super::cached;
use crate::ir::machine_type::MachineType;
use crate::ir::operators::{
    BranchHint, CallDescriptor, FrameStateCallInfo, OpParam, Opcode, Operator,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CommonOperatorBuilder;

impl CommonOperatorBuilder {
    pub fn new() -> Self {
        CommonOperatorBuilder
    }

    /// `Start` producing `num_formals` parameters.
    pub fn start(&self, num_formals: u32) -> Operator {
        Operator::with_param(Opcode::Start, 0, num_formals, OpParam::Arity(num_formals))
    }

    pub fn end(&self, control_inputs: u32) -> Operator {
        Operator::with_param(Opcode::End, 0, 0, OpParam::Arity(control_inputs))
    }

    pub fn dead(&self) -> Operator {
        cached(Opcode::Dead)
    }

    pub fn dead_value(&self, rep: MachineType) -> Operator {
        Operator::with_param(Opcode::DeadValue, 1, 1, OpParam::Rep(rep))
    }

    pub fn unreachable(&self) -> Operator {
        cached(Opcode::Unreachable)
    }

    pub fn loop_(&self, control_inputs: u32) -> Operator {
        Operator::with_param(Opcode::Loop, 0, 0, OpParam::Arity(control_inputs))
    }

    pub fn merge(&self, control_inputs: u32) -> Operator {
        assert!(control_inputs > 0, "merge needs at least one control input");
        Operator::with_param(Opcode::Merge, 0, 0, OpParam::Arity(control_inputs))
    }

    pub fn branch(&self, hint: BranchHint) -> Operator {
        Operator::with_param(Opcode::Branch, 1, 0, OpParam::Branch(hint))
    }

    pub fn if_true(&self) -> Operator {
        cached(Opcode::IfTrue)
    }

    pub fn if_false(&self) -> Operator {
        cached(Opcode::IfFalse)
    }

    pub fn if_success(&self) -> Operator {
        cached(Opcode::IfSuccess)
    }

    pub fn if_exception(&self) -> Operator {
        cached(Opcode::IfException)
    }

    pub fn return_(&self) -> Operator {
        cached(Opcode::Return)
    }

    pub fn throw(&self) -> Operator {
        cached(Opcode::Throw)
    }

    pub fn deoptimize(&self) -> Operator {
        cached(Opcode::Deoptimize)
    }

    pub fn terminate(&self) -> Operator {
        cached(Opcode::Terminate)
    }

    pub fn loop_exit(&self) -> Operator {
        cached(Opcode::LoopExit)
    }

    pub fn loop_exit_value(&self, rep: MachineType) -> Operator {
        Operator::with_param(Opcode::LoopExitValue, 1, 1, OpParam::Rep(rep))
    }

    pub fn loop_exit_effect(&self) -> Operator {
        cached(Opcode::LoopExitEffect)
    }

    pub fn parameter(&self, index: u32) -> Operator {
        Operator::with_param(Opcode::Parameter, 1, 1, OpParam::Index(index))
    }

    pub fn int32_constant(&self, value: i32) -> Operator {
        Operator::with_param(Opcode::Int32Constant, 0, 1, OpParam::Int32(value))
    }

    pub fn int64_constant(&self, value: i64) -> Operator {
        Operator::with_param(Opcode::Int64Constant, 0, 1, OpParam::Int64(value))
    }

    pub fn float64_constant(&self, value: f64) -> Operator {
        Operator::with_param(Opcode::Float64Constant, 0, 1, OpParam::Float64(value.to_bits()))
    }

    pub fn number_constant(&self, value: f64) -> Operator {
        Operator::with_param(Opcode::NumberConstant, 0, 1, OpParam::Float64(value.to_bits()))
    }

    pub fn heap_constant(&self, handle: u32) -> Operator {
        Operator::with_param(Opcode::HeapConstant, 0, 1, OpParam::Heap(handle))
    }

    pub fn phi(&self, rep: MachineType, arity: u32) -> Operator {
        assert!(arity > 0, "phi needs at least one value input");
        Operator::with_param(Opcode::Phi, arity, 1, OpParam::Phi { rep, arity })
    }

    pub fn effect_phi(&self, arity: u32) -> Operator {
        assert!(arity > 0, "effect phi needs at least one effect input");
        Operator::with_param(Opcode::EffectPhi, 0, 0, OpParam::Arity(arity))
    }

    pub fn select(&self, rep: MachineType) -> Operator {
        Operator::with_param(Opcode::Select, 3, 1, OpParam::Rep(rep))
    }

    pub fn projection(&self, index: u32) -> Operator {
        Operator::with_param(Opcode::Projection, 1, 1, OpParam::Index(index))
    }

    /// `FrameState(parameters, locals, stack, context)`.
    pub fn frame_state(&self, info: FrameStateCallInfo) -> Operator {
        Operator::with_param(Opcode::FrameState, 4, 1, OpParam::FrameState(info))
    }

    pub fn state_values(&self, count: u32) -> Operator {
        Operator::with_param(Opcode::StateValues, count, 1, OpParam::Arity(count))
    }

    pub fn call(&self, descriptor: CallDescriptor) -> Operator {
        Operator::with_param(
            Opcode::Call,
            descriptor.input_count,
            descriptor.return_count,
            OpParam::Call(descriptor),
        )
    }

    pub fn osr_normal_entry(&self) -> Operator {
        cached(Opcode::OsrNormalEntry)
    }

    pub fn osr_loop_entry(&self) -> Operator {
        cached(Opcode::OsrLoopEntry)
    }

    pub fn osr_value(&self, index: u32) -> Operator {
        Operator::with_param(Opcode::OsrValue, 0, 1, OpParam::Index(index))
    }

    /// The same Merge, Loop, End, Phi or EffectPhi with a new arity.
    pub fn resize_merge_or_phi(&self, op: &Operator, arity: u32) -> Operator {
        match op.opcode() {
            Opcode::Merge => self.merge(arity),
            Opcode::Loop => self.loop_(arity),
            Opcode::End => self.end(arity),
            Opcode::Phi => self.phi(op.phi_representation(), arity),
            Opcode::EffectPhi => self.effect_phi(arity),
            other => panic!("cannot resize {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterless_operators_are_shared() {
        let common = CommonOperatorBuilder::new();
        assert_eq!(common.if_true(), common.if_true());
        assert_ne!(common.if_true(), common.if_false());
    }

    #[test]
    fn test_constants_compare_by_value() {
        let common = CommonOperatorBuilder::new();
        assert_eq!(common.float64_constant(1.5), common.float64_constant(1.5));
        assert_ne!(common.float64_constant(0.0), common.float64_constant(-0.0));
        assert_ne!(common.number_constant(1.0), common.float64_constant(1.0));
    }

    #[test]
    fn test_resize_keeps_representation() {
        let common = CommonOperatorBuilder::new();
        let phi = common.phi(MachineType::MACH_INT32, 3);
        let resized = common.resize_merge_or_phi(&phi, 2);
        assert_eq!(resized.value_input_count(), 2);
        assert_eq!(resized.phi_representation(), MachineType::MACH_INT32);
        let merge = common.resize_merge_or_phi(&common.merge(3), 2);
        assert_eq!(merge.control_input_count(), 2);
    }

    #[test]
    #[should_panic(expected = "phi needs at least one value input")]
    fn test_zero_arity_phi_is_rejected() {
        CommonOperatorBuilder::new().phi(MachineType::MACH_INT32, 0);
    }

    #[test]
    #[should_panic(expected = "effect phi needs at least one effect input")]
    fn test_zero_arity_effect_phi_is_rejected() {
        CommonOperatorBuilder::new().effect_phi(0);
    }

    #[test]
    #[should_panic(expected = "merge needs at least one control input")]
    fn test_zero_arity_merge_is_rejected() {
        CommonOperatorBuilder::new().merge(0);
    }

    #[test]
    fn test_phi_arity() {
        let common = CommonOperatorBuilder::new();
        let phi = common.phi(MachineType::MACH_ANY_TAGGED, 2);
        assert_eq!(phi.total_input_count(), 3);
        let ephi = common.effect_phi(2);
        assert_eq!(ephi.total_input_count(), 3);
    }
}
