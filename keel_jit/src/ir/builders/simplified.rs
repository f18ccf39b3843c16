//! Typed, representation-agnostic operators.

use super::cached;
use crate::ir::operators::{ElementAccess, FieldAccess, OpParam, Opcode, Operator};

#[derive(Debug, Clone, Copy, Default)]
pub struct SimplifiedOperatorBuilder;

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

impl SimplifiedOperatorBuilder {
    pub fn new() -> Self {
        SimplifiedOperatorBuilder
    }

    simple_ops! {
        boolean_not => BooleanNot,
        boolean_to_number => BooleanToNumber,
        number_equal => NumberEqual,
        number_less_than => NumberLessThan,
        number_less_than_or_equal => NumberLessThanOrEqual,
        number_add => NumberAdd,
        number_subtract => NumberSubtract,
        number_multiply => NumberMultiply,
        number_divide => NumberDivide,
        number_modulus => NumberModulus,
        number_to_int32 => NumberToInt32,
        number_to_uint32 => NumberToUint32,
        reference_equal => ReferenceEqual,
        change_tagged_to_int32 => ChangeTaggedToInt32,
        change_tagged_to_uint32 => ChangeTaggedToUint32,
        change_tagged_to_float64 => ChangeTaggedToFloat64,
        change_int32_to_tagged => ChangeInt32ToTagged,
        change_uint32_to_tagged => ChangeUint32ToTagged,
        change_float64_to_tagged => ChangeFloat64ToTagged,
        change_bool_to_bit => ChangeBoolToBit,
        change_bit_to_bool => ChangeBitToBool,
    }

    pub fn load_field(&self, access: FieldAccess) -> Operator {
        Operator::with_param(Opcode::LoadField, 1, 1, OpParam::Field(access))
    }

    pub fn store_field(&self, access: FieldAccess) -> Operator {
        Operator::with_param(Opcode::StoreField, 2, 0, OpParam::Field(access))
    }

    pub fn load_element(&self, access: ElementAccess) -> Operator {
        Operator::with_param(Opcode::LoadElement, 2, 1, OpParam::Element(access))
    }

    pub fn store_element(&self, access: ElementAccess) -> Operator {
        Operator::with_param(Opcode::StoreElement, 3, 0, OpParam::Element(access))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::machine_type::MachineType;
    use crate::ir::operators::WriteBarrierKind;
    use crate::ir::types::Type;

    #[test]
    fn test_field_access_inputs() {
        let simplified = SimplifiedOperatorBuilder::new();
        let access = FieldAccess {
            offset: 8,
            ty: Type::SIGNED32,
            machine_type: MachineType::MACH_INT32,
            write_barrier: WriteBarrierKind::NoWriteBarrier,
        };
        // object, effect
        assert_eq!(simplified.load_field(access).total_input_count(), 2);
        // object, value, effect, control
        assert_eq!(simplified.store_field(access).total_input_count(), 4);
        assert_eq!(access.untagged_offset(), 7);
    }

    #[test]
    fn test_number_ops_are_pure() {
        let simplified = SimplifiedOperatorBuilder::new();
        assert_eq!(simplified.number_add().total_input_count(), 2);
        assert_eq!(simplified.number_to_int32().total_input_count(), 1);
    }
}
