//! Conversions between machine representations.
//!
//! Given a value, the machine type it is produced in and what a use
//! requires, [`RepresentationChanger`] returns either the value itself or a
//! conversion node. Constants are re-materialised in the requested
//! representation instead of converted.

use tracing::trace;

use crate::error::{CompileError, Result};
use crate::ir::builders::{MachineOperatorBuilder, SimplifiedOperatorBuilder};
use crate::ir::machine_type::MachineType;
use crate::ir::node::NodeId;
use crate::ir::operators::{Opcode, Operator};
use crate::ir::types::Type;
use crate::ir::Graph;

use super::representation::UseInfo;

#[derive(Debug, Default)]
pub struct RepresentationChanger {
    simplified: SimplifiedOperatorBuilder,
    machine: MachineOperatorBuilder,
    /// Conversion nodes created so far.
    inserted: usize,
}

impl RepresentationChanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// `node`, produced as `output`, in the form `use_info` asks for.
    pub fn get_representation_for(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        output: MachineType,
        use_info: UseInfo,
    ) -> Result<NodeId> {
        let wanted = use_info.rep.representation();
        if wanted.is_empty() || output.is_empty() {
            return Ok(node);
        }
        let have = output.representation();
        if have == wanted {
            return Ok(node);
        }
        if graph.op(node).opcode().is_constant() {
            if let Some(constant) = self.rematerialize(graph, node, use_info) {
                return Ok(constant);
            }
        }
        if wanted == MachineType::REP_BIT {
            self.to_bit(graph, node, have)
        } else if wanted.is_word32() {
            self.to_word32(graph, node, output, use_info)
        } else if wanted == MachineType::REP_FLOAT64 {
            self.to_float64(graph, node, output)
        } else if wanted == MachineType::REP_TAGGED {
            self.to_tagged(graph, node, output)
        } else {
            Err(self.type_error(graph, node))
        }
    }

    fn rematerialize(&mut self, graph: &mut Graph, node: NodeId, use_info: UseInfo) -> Option<NodeId> {
        let op = *graph.op(node);
        let value = match op.opcode() {
            Opcode::Int32Constant => f64::from(op.int32_value()?),
            Opcode::Float64Constant | Opcode::NumberConstant => op.number_value()?,
            _ => return None,
        };
        let wanted = use_info.rep.representation();
        let constant = if wanted == MachineType::REP_BIT {
            graph.int32_constant(i32::from(value != 0.0 && !value.is_nan()))
        } else if wanted.is_word32() {
            let exact = value.fract() == 0.0
                && value >= f64::from(i32::MIN)
                && value <= f64::from(u32::MAX)
                && !(value == 0.0 && value.is_sign_negative());
            if !exact && !use_info.truncation.is_used_as_word32() {
                return None;
            }
            graph.int32_constant(double_to_int32(value))
        } else if wanted == MachineType::REP_FLOAT64 {
            graph.float64_constant(value)
        } else if wanted == MachineType::REP_TAGGED {
            graph.number_constant(value)
        } else {
            return None;
        };
        trace!(node = %node, constant = %constant, "rematerialized constant");
        Some(constant)
    }

    fn to_word32(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        output: MachineType,
        use_info: UseInfo,
    ) -> Result<NodeId> {
        let have = output.representation();
        let unsigned = output.contains(MachineType::TYPE_UINT32)
            || use_info.rep.contains(MachineType::TYPE_UINT32);
        let truncating = use_info.truncation.is_used_as_word32();
        if have == MachineType::REP_BIT || have.is_word32() {
            // Bits are already 0 or 1 in a word.
            return Ok(node);
        }
        if have == MachineType::REP_FLOAT64 {
            let op = if truncating {
                self.machine.truncate_float64_to_int32()
            } else if unsigned {
                self.machine.change_float64_to_uint32()
            } else {
                self.machine.change_float64_to_int32()
            };
            return Ok(self.insert(graph, op, node));
        }
        if have == MachineType::REP_TAGGED {
            if truncating {
                let to_number = self.simplified.change_tagged_to_float64();
                let truncate = self.machine.truncate_float64_to_int32();
                let number = self.insert(graph, to_number, node);
                return Ok(self.insert(graph, truncate, number));
            }
            let op = if unsigned {
                self.simplified.change_tagged_to_uint32()
            } else {
                self.simplified.change_tagged_to_int32()
            };
            return Ok(self.insert(graph, op, node));
        }
        Err(self.type_error(graph, node))
    }

    fn to_float64(&mut self, graph: &mut Graph, node: NodeId, output: MachineType) -> Result<NodeId> {
        let have = output.representation();
        let op = if have == MachineType::REP_BIT {
            self.machine.change_int32_to_float64()
        } else if have.is_word32() {
            if output.contains(MachineType::TYPE_UINT32) {
                self.machine.change_uint32_to_float64()
            } else {
                self.machine.change_int32_to_float64()
            }
        } else if have == MachineType::REP_TAGGED {
            self.simplified.change_tagged_to_float64()
        } else {
            return Err(self.type_error(graph, node));
        };
        Ok(self.insert(graph, op, node))
    }

    fn to_tagged(&mut self, graph: &mut Graph, node: NodeId, output: MachineType) -> Result<NodeId> {
        let have = output.representation();
        let op = if have == MachineType::REP_BIT {
            self.simplified.change_bit_to_bool()
        } else if have.is_word32() {
            if output.contains(MachineType::TYPE_UINT32) {
                self.simplified.change_uint32_to_tagged()
            } else {
                self.simplified.change_int32_to_tagged()
            }
        } else if have == MachineType::REP_FLOAT64 {
            self.simplified.change_float64_to_tagged()
        } else {
            return Err(self.type_error(graph, node));
        };
        let converted = self.insert(graph, op, node);
        let ty = graph.ty(node);
        graph.set_type(converted, ty);
        Ok(converted)
    }

    fn to_bit(&mut self, graph: &mut Graph, node: NodeId, have: MachineType) -> Result<NodeId> {
        if have == MachineType::REP_TAGGED {
            let ty = graph.ty(node);
            if !ty.is_none() && ty.is(Type::NUMBER) {
                let op = self.simplified.change_tagged_to_float64();
                let number = self.insert(graph, op, node);
                return Ok(self.float64_to_bit(graph, number));
            }
            let op = self.simplified.change_bool_to_bit();
            return Ok(self.insert(graph, op, node));
        }
        if have.is_word32() {
            // x != 0 as an unsigned comparison against zero.
            let zero = graph.int32_constant(0);
            let bit = graph.new_typed_node(self.machine.uint32_less_than(), &[zero, node], Type::BOOLEAN);
            self.inserted += 1;
            return Ok(bit);
        }
        if have == MachineType::REP_FLOAT64 {
            return Ok(self.float64_to_bit(graph, node));
        }
        Err(self.type_error(graph, node))
    }

    /// `0 < x || x < 0`: false for both zeros and for NaN.
    fn float64_to_bit(&mut self, graph: &mut Graph, node: NodeId) -> NodeId {
        let zero = graph.float64_constant(0.0);
        let positive = graph.new_node(self.machine.float64_less_than(), &[zero, node]);
        let negative = graph.new_node(self.machine.float64_less_than(), &[node, zero]);
        let bit = graph.new_typed_node(self.machine.word32_or(), &[positive, negative], Type::BOOLEAN);
        self.inserted += 3;
        trace!(input = %node, bit = %bit, "float64 truthiness");
        bit
    }

    fn insert(&mut self, graph: &mut Graph, op: Operator, input: NodeId) -> NodeId {
        let conversion = graph.new_node(op, &[input]);
        graph.mark_lowered(conversion);
        self.inserted += 1;
        trace!(input = %input, conversion = %conversion, op = %op, "inserted conversion");
        conversion
    }

    fn type_error(&self, graph: &Graph, node: NodeId) -> CompileError {
        CompileError::Unimplemented {
            pass: "representation changer",
            opcode: graph.opcode(node),
        }
    }
}

/// ECMAScript ToInt32 on a double: modulo 2^32, NaN and infinities to 0.
pub fn double_to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let truncated = value.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    modulo as u32 as i32
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn changer_fixture() -> (Graph, RepresentationChanger, NodeId) {
        let mut graph = Graph::with_parameters(1);
        let start = graph.start;
        let common = crate::ir::builders::CommonOperatorBuilder::new();
        let p = graph.new_node(common.parameter(0), &[start]);
        (graph, RepresentationChanger::new(), p)
    }

    #[test]
    fn test_same_representation_is_identity() {
        let (mut graph, mut changer, p) = changer_fixture();
        let out = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_UINT32, UseInfo::truncating_word32())
            .unwrap();
        assert_eq!(out, p);
        assert_eq!(changer.inserted(), 0);
    }

    #[test]
    fn test_word32_to_float64_respects_signedness() {
        let (mut graph, mut changer, p) = changer_fixture();
        let signed = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_INT32, UseInfo::float64())
            .unwrap();
        let unsigned = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_UINT32, UseInfo::float64())
            .unwrap();
        assert_eq!(graph.opcode(signed), Opcode::ChangeInt32ToFloat64);
        assert_eq!(graph.opcode(unsigned), Opcode::ChangeUint32ToFloat64);
    }

    #[test]
    fn test_float64_to_word32_truncates_when_allowed() {
        let (mut graph, mut changer, p) = changer_fixture();
        let truncated = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_FLOAT64, UseInfo::truncating_word32())
            .unwrap();
        let checked = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_FLOAT64, UseInfo::int32())
            .unwrap();
        assert_eq!(graph.opcode(truncated), Opcode::TruncateFloat64ToInt32);
        assert_eq!(graph.opcode(checked), Opcode::ChangeFloat64ToInt32);
    }

    #[test]
    fn test_tagged_to_word32_under_truncation_goes_through_float64() {
        let (mut graph, mut changer, p) = changer_fixture();
        let out = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_ANY_TAGGED, UseInfo::truncating_word32())
            .unwrap();
        assert_eq!(graph.opcode(out), Opcode::TruncateFloat64ToInt32);
        let inner = graph.input(out, 0);
        assert_eq!(graph.opcode(inner), Opcode::ChangeTaggedToFloat64);
        assert_eq!(changer.inserted(), 2);
    }

    #[test]
    fn test_bit_conversions() {
        let (mut graph, mut changer, p) = changer_fixture();
        let tagged = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_BOOL, UseInfo::any_tagged())
            .unwrap();
        assert_eq!(graph.opcode(tagged), Opcode::ChangeBitToBool);
        let bit = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_INT32, UseInfo::bool())
            .unwrap();
        assert_eq!(graph.opcode(bit), Opcode::Uint32LessThan);
        assert_eq!(graph.input(bit, 1), p);
    }

    #[test]
    fn test_float64_to_bit_compares_against_both_sides_of_zero() {
        let (mut graph, mut changer, p) = changer_fixture();
        let bit = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_FLOAT64, UseInfo::bool())
            .unwrap();
        assert_eq!(graph.opcode(bit), Opcode::Word32Or);
        let (positive, negative) = (graph.input(bit, 0), graph.input(bit, 1));
        assert_eq!(graph.opcode(positive), Opcode::Float64LessThan);
        assert_eq!(graph.opcode(negative), Opcode::Float64LessThan);
        assert_eq!(graph.input(positive, 1), p);
        assert_eq!(graph.input(negative, 0), p);
        let zero = graph.input(positive, 0);
        assert_eq!(graph.op(zero).number_value(), Some(0.0));
        assert_eq!(graph.input(negative, 1), zero);
        assert_eq!(changer.inserted(), 3);
    }

    #[test]
    fn test_tagged_number_to_bit_goes_through_float64() {
        let (mut graph, mut changer, p) = changer_fixture();
        graph.set_type(p, Type::NUMBER);
        let bit = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_ANY_TAGGED, UseInfo::bool())
            .unwrap();
        assert_eq!(graph.opcode(bit), Opcode::Word32Or);
        let number = graph.input(graph.input(bit, 0), 1);
        assert_eq!(graph.opcode(number), Opcode::ChangeTaggedToFloat64);
        assert_eq!(graph.input(number, 0), p);
    }

    #[test]
    fn test_tagged_boolean_to_bit() {
        let (mut graph, mut changer, p) = changer_fixture();
        graph.set_type(p, Type::BOOLEAN);
        let bit = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_ANY_TAGGED, UseInfo::bool())
            .unwrap();
        assert_eq!(graph.opcode(bit), Opcode::ChangeBoolToBit);
        assert_eq!(changer.inserted(), 1);
    }

    #[test]
    fn test_constants_are_rematerialized() {
        let (mut graph, mut changer, _) = changer_fixture();
        let c = graph.number_constant(7.0);
        let word = changer
            .get_representation_for(&mut graph, c, MachineType::MACH_ANY_TAGGED, UseInfo::truncating_word32())
            .unwrap();
        assert_eq!(graph.op(word).int32_value(), Some(7));
        let float = changer
            .get_representation_for(&mut graph, word, MachineType::MACH_INT32, UseInfo::float64())
            .unwrap();
        assert_eq!(graph.opcode(float), Opcode::Float64Constant);
        assert_eq!(changer.inserted(), 0);
    }

    #[test]
    fn test_pointer_to_tagged_is_unimplemented() {
        let (mut graph, mut changer, p) = changer_fixture();
        let err = changer
            .get_representation_for(&mut graph, p, MachineType::MACH_PTR, UseInfo::any_tagged())
            .unwrap_err();
        assert!(matches!(err, CompileError::Unimplemented { .. }));
    }

    #[test]
    fn test_double_to_int32_wraps() {
        assert_eq!(double_to_int32(4_294_967_297.0), 1);
        assert_eq!(double_to_int32(-1.5), -1);
        assert_eq!(double_to_int32(f64::NAN), 0);
        assert_eq!(double_to_int32(2_147_483_648.0), i32::MIN);
    }
}
