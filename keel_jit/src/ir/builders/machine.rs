//! Machine-level operators on words and doubles.

use super::cached;
use crate::ir::machine_type::MachineType;
use crate::ir::operators::{OpParam, Opcode, Operator, StoreRepresentation};

#[derive(Debug, Clone, Copy, Default)]
pub struct MachineOperatorBuilder;

macro_rules! simple_ops {
    ($( $method:ident => $opcode:ident ),* $(,)?) => {
        $(
            #[inline]
            pub fn $method(&self) -> Operator {
                cached(Opcode::$opcode)
            }
        )*
    };
}

impl MachineOperatorBuilder {
    pub fn new() -> Self {
        MachineOperatorBuilder
    }

    simple_ops! {
        word32_and => Word32And,
        word32_or => Word32Or,
        word32_xor => Word32Xor,
        word32_shl => Word32Shl,
        word32_shr => Word32Shr,
        word32_sar => Word32Sar,
        word32_equal => Word32Equal,
        word64_equal => Word64Equal,
        int32_add => Int32Add,
        int32_sub => Int32Sub,
        int32_mul => Int32Mul,
        int32_div => Int32Div,
        int32_mod => Int32Mod,
        uint32_div => Uint32Div,
        uint32_mod => Uint32Mod,
        int32_less_than => Int32LessThan,
        int32_less_than_or_equal => Int32LessThanOrEqual,
        uint32_less_than => Uint32LessThan,
        uint32_less_than_or_equal => Uint32LessThanOrEqual,
        float64_add => Float64Add,
        float64_sub => Float64Sub,
        float64_mul => Float64Mul,
        float64_div => Float64Div,
        float64_mod => Float64Mod,
        float64_equal => Float64Equal,
        float64_less_than => Float64LessThan,
        float64_less_than_or_equal => Float64LessThanOrEqual,
        change_int32_to_float64 => ChangeInt32ToFloat64,
        change_uint32_to_float64 => ChangeUint32ToFloat64,
        change_float64_to_int32 => ChangeFloat64ToInt32,
        change_float64_to_uint32 => ChangeFloat64ToUint32,
        truncate_float64_to_int32 => TruncateFloat64ToInt32,
    }

    /// `Load(base, index)`.
    pub fn load(&self, rep: MachineType) -> Operator {
        Operator::with_param(Opcode::Load, 2, 1, OpParam::Rep(rep))
    }

    /// `Store(base, index, value)`.
    pub fn store(&self, rep: StoreRepresentation) -> Operator {
        Operator::with_param(Opcode::Store, 3, 0, OpParam::Store(rep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operators::WriteBarrierKind;

    #[test]
    fn test_division_is_pinned() {
        let machine = MachineOperatorBuilder::new();
        let div = machine.int32_div();
        assert_eq!(div.control_input_count(), 1);
        assert_eq!(div.effect_input_count(), 0);
        assert_eq!(machine.int32_add().control_input_count(), 0);
    }

    #[test]
    fn test_store_parameter() {
        let machine = MachineOperatorBuilder::new();
        let a = machine.store(StoreRepresentation {
            machine_type: MachineType::MACH_FLOAT64,
            write_barrier: WriteBarrierKind::NoWriteBarrier,
        });
        let b = machine.store(StoreRepresentation {
            machine_type: MachineType::MACH_ANY_TAGGED,
            write_barrier: WriteBarrierKind::FullWriteBarrier,
        });
        assert_ne!(a, b);
    }
}
