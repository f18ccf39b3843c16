//! Graph construction helpers shared by unit tests, integration tests and
//! benchmarks.

use crate::ir::{
    BranchHint, CommonOperatorBuilder, FieldAccess, Graph, JsOperatorBuilder, MachineOperatorBuilder,
    MachineType, NodeId, NodeProperties, SimplifiedOperatorBuilder, Type, WriteBarrierKind,
};

/// Nodes of the loop built by [`GraphFixture::closed_loop`].
#[derive(Debug, Clone, Copy)]
pub struct LoopNodes {
    pub header: NodeId,
    pub phi: NodeId,
    pub cmp: NodeId,
    pub next: NodeId,
    pub exit: NodeId,
    pub exit_value: NodeId,
    pub ret: NodeId,
}

/// A graph plus the operator builders needed to grow it.
pub struct GraphFixture {
    pub graph: Graph,
    pub common: CommonOperatorBuilder,
    pub machine: MachineOperatorBuilder,
    pub simplified: SimplifiedOperatorBuilder,
    pub js: JsOperatorBuilder,
    parameters: Vec<Option<NodeId>>,
}

impl GraphFixture {
    /// An empty function of `num_parameters` formals.
    pub fn new(num_parameters: u32) -> Self {
        Self {
            graph: Graph::with_parameters(num_parameters),
            common: CommonOperatorBuilder::new(),
            machine: MachineOperatorBuilder::new(),
            simplified: SimplifiedOperatorBuilder::new(),
            js: JsOperatorBuilder::new(),
            parameters: vec![None; num_parameters as usize],
        }
    }

    /// Parameter `index`, created on first use.
    pub fn parameter(&mut self, index: u32) -> NodeId {
        let slot = index as usize;
        if slot >= self.parameters.len() {
            self.parameters.resize(slot + 1, None);
        }
        if let Some(node) = self.parameters[slot] {
            return node;
        }
        let start = self.graph.start;
        let node = self.graph.new_node(self.common.parameter(index), &[start]);
        self.parameters[slot] = Some(node);
        node
    }

    /// Parameter `index` typed as a signed 32-bit integer.
    pub fn int32_param(&mut self, index: u32) -> NodeId {
        let node = self.parameter(index);
        self.graph.set_type(node, Type::SIGNED32);
        node
    }

    pub fn int32(&mut self, value: i32) -> NodeId {
        self.graph.int32_constant(value)
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.graph.number_constant(value)
    }

    /// Two untagged int32 fields of parameter 0, loaded one after the other.
    /// Returns both values and the effect after the second load.
    pub fn int32_fields(&mut self) -> (NodeId, NodeId, NodeId) {
        self.fields(Self::int32_field(8), Self::int32_field(12), Type::SIGNED32)
    }

    /// As [`int32_fields`](Self::int32_fields), for uint32 fields.
    pub fn uint32_fields(&mut self) -> (NodeId, NodeId, NodeId) {
        let access = |offset| FieldAccess {
            offset,
            ty: Type::UNSIGNED32,
            machine_type: MachineType::MACH_UINT32,
            write_barrier: WriteBarrierKind::NoWriteBarrier,
        };
        self.fields(access(8), access(12), Type::UNSIGNED32)
    }

    fn fields(&mut self, first: FieldAccess, second: FieldAccess, ty: Type) -> (NodeId, NodeId, NodeId) {
        let object = self.parameter(0);
        let start = self.graph.start;
        let x = self.graph.new_node(self.simplified.load_field(first), &[object, start]);
        let y = self.graph.new_node(self.simplified.load_field(second), &[object, x]);
        self.graph.set_type(x, ty);
        self.graph.set_type(y, ty);
        (x, y, y)
    }

    /// `Branch(cond, control)` and its `(IfTrue, IfFalse)` projections.
    pub fn branch(&mut self, cond: NodeId, control: NodeId) -> (NodeId, NodeId) {
        let branch = self
            .graph
            .new_node(self.common.branch(BranchHint::None), &[cond, control]);
        let if_true = self.graph.new_node(self.common.if_true(), &[branch]);
        let if_false = self.graph.new_node(self.common.if_false(), &[branch]);
        (if_true, if_false)
    }

    pub fn merge(&mut self, controls: &[NodeId]) -> NodeId {
        self.graph
            .new_node(self.common.merge(controls.len() as u32), controls)
    }

    pub fn phi(&mut self, rep: MachineType, values: &[NodeId], merge: NodeId) -> NodeId {
        let mut inputs = values.to_vec();
        inputs.push(merge);
        self.graph
            .new_node(self.common.phi(rep, values.len() as u32), &inputs)
    }

    pub fn effect_phi(&mut self, effects: &[NodeId], merge: NodeId) -> NodeId {
        let mut inputs = effects.to_vec();
        inputs.push(merge);
        self.graph
            .new_node(self.common.effect_phi(effects.len() as u32), &inputs)
    }

    /// A `Return` hooked up to `End`.
    pub fn ret(&mut self, value: NodeId, effect: NodeId, control: NodeId) -> NodeId {
        let ret = self
            .graph
            .new_node(self.common.return_(), &[value, effect, control]);
        NodeProperties::merge_control_to_end(&mut self.graph, ret);
        ret
    }

    /// A tagged field that needs a write barrier.
    pub fn tagged_field(offset: i32) -> FieldAccess {
        FieldAccess {
            offset,
            ty: Type::ANY,
            machine_type: MachineType::MACH_ANY_TAGGED,
            write_barrier: WriteBarrierKind::FullWriteBarrier,
        }
    }

    pub fn int32_field(offset: i32) -> FieldAccess {
        FieldAccess {
            offset,
            ty: Type::SIGNED32,
            machine_type: MachineType::MACH_INT32,
            write_barrier: WriteBarrierKind::NoWriteBarrier,
        }
    }

    /// `i = 0; while (i < p0) i += 1; return i`, with the exit value
    /// routed through `LoopExit` and `LoopExitValue`.
    pub fn closed_loop(&mut self) -> LoopNodes {
        let p0 = self.parameter(0);
        let start = self.graph.start;
        let (zero, one) = (self.int32(0), self.int32(1));
        let header = self.graph.new_node(self.common.loop_(2), &[start, start]);
        let phi = self.phi(MachineType::MACH_INT32, &[zero, zero], header);
        let cmp = self.graph.new_node(self.machine.int32_less_than(), &[phi, p0]);
        let (body, out) = self.branch(cmp, header);
        let next = self.graph.new_node(self.machine.int32_add(), &[phi, one]);
        self.graph.replace_input(header, 1, body);
        self.graph.replace_input(phi, 1, next);
        let exit = self.graph.new_node(self.common.loop_exit(), &[out, header]);
        let exit_value = self
            .graph
            .new_node(self.common.loop_exit_value(MachineType::MACH_INT32), &[phi, exit]);
        let ret = self.ret(exit_value, start, exit);
        LoopNodes {
            header,
            phi,
            cmp,
            next,
            exit,
            exit_value,
            ret,
        }
    }
}
