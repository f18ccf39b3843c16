//! Operator definitions.
//!
//! An [`Operator`] is an immutable value describing what a node computes:
//! an [`Opcode`], a set of [`Properties`], its declared value arity and an
//! optional static parameter ([`OpParam`]). Operators are small `Copy`
//! values; equality and hashing compare opcode and parameter, so two
//! operators built independently for the same opcode and parameter are
//! interchangeable.
//!
//! Only the value arity is stored. Context, frame-state, effect and control
//! arities are derived from the opcode, its IR level and its properties.
//!
//! Opcodes are grouped by IR level:
//! - **Common**: control structure, phis, constants, projections
//! - **JS**: generic operations with context and frame-state inputs
//! - **Simplified**: typed, representation-polymorphic operations
//! - **Machine**: operations on concrete machine words and doubles

use std::fmt;

use super::machine_type::MachineType;
use super::types::Type;

// =============================================================================
// Properties
// =============================================================================

bitflags::bitflags! {
    /// Algebraic and side-effect properties of an operator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Properties: u8 {
        const COMMUTATIVE = 1 << 0;
        const ASSOCIATIVE = 1 << 1;
        const IDEMPOTENT = 1 << 2;
        const NO_READ = 1 << 3;
        const NO_WRITE = 1 << 4;
        const NO_THROW = 1 << 5;

        const FOLDABLE = Self::NO_READ.bits() | Self::NO_WRITE.bits();
        const ELIMINATABLE = Self::NO_WRITE.bits() | Self::NO_THROW.bits();
        const PURE = Self::FOLDABLE.bits() | Self::NO_THROW.bits() | Self::IDEMPOTENT.bits();
        /// Control structure: never reads, writes or throws.
        const KONTROL = Self::FOLDABLE.bits() | Self::NO_THROW.bits();
    }
}

// =============================================================================
// IR levels
// =============================================================================

/// The level an opcode belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrLevel {
    Common,
    Js,
    Simplified,
    Machine,
}

// =============================================================================
// Opcodes
// =============================================================================

macro_rules! opcodes {
    ($( $level:ident => { $( $name:ident ),* $(,)? } )*) => {
        /// Every operation kind understood by the optimizer.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Opcode {
            $( $( $name, )* )*
        }

        impl Opcode {
            /// All opcodes, in declaration order.
            pub const ALL: &'static [Opcode] = &[ $( $( Opcode::$name, )* )* ];

            pub const fn level(self) -> IrLevel {
                match self {
                    $( $( Opcode::$name )|* => IrLevel::$level, )*
                }
            }

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( $( Opcode::$name => stringify!($name), )* )*
                }
            }
        }
    };
}

opcodes! {
    Common => {
        Start, End, Dead, DeadValue, Unreachable,
        Loop, Merge, Branch, IfTrue, IfFalse, IfSuccess, IfException,
        Return, Throw, Deoptimize, Terminate,
        LoopExit, LoopExitValue, LoopExitEffect,
        Parameter, Int32Constant, Int64Constant, Float64Constant, NumberConstant, HeapConstant,
        Phi, EffectPhi, Select, Projection, FrameState, StateValues, Call,
        OsrNormalEntry, OsrLoopEntry, OsrValue,
    }
    Js => {
        JsAdd, JsSubtract, JsMultiply, JsLessThan, JsStrictEqual,
        JsToNumber, JsToBoolean, JsCallFunction, JsStackCheck,
    }
    Simplified => {
        BooleanNot, BooleanToNumber,
        NumberEqual, NumberLessThan, NumberLessThanOrEqual,
        NumberAdd, NumberSubtract, NumberMultiply, NumberDivide, NumberModulus,
        NumberToInt32, NumberToUint32, ReferenceEqual,
        LoadField, StoreField, LoadElement, StoreElement,
        ChangeTaggedToInt32, ChangeTaggedToUint32, ChangeTaggedToFloat64,
        ChangeInt32ToTagged, ChangeUint32ToTagged, ChangeFloat64ToTagged,
        ChangeBoolToBit, ChangeBitToBool,
    }
    Machine => {
        Load, Store,
        Word32And, Word32Or, Word32Xor, Word32Shl, Word32Shr, Word32Sar,
        Word32Equal, Word64Equal,
        Int32Add, Int32Sub, Int32Mul, Int32Div, Int32Mod, Uint32Div, Uint32Mod,
        Int32LessThan, Int32LessThanOrEqual, Uint32LessThan, Uint32LessThanOrEqual,
        Float64Add, Float64Sub, Float64Mul, Float64Div, Float64Mod,
        Float64Equal, Float64LessThan, Float64LessThanOrEqual,
        ChangeInt32ToFloat64, ChangeUint32ToFloat64,
        ChangeFloat64ToInt32, ChangeFloat64ToUint32, TruncateFloat64ToInt32,
    }
}

impl Opcode {
    /// Nodes that form the control skeleton of the graph.
    pub const fn is_control(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Start
                | End
                | Dead
                | Loop
                | Merge
                | Branch
                | IfTrue
                | IfFalse
                | IfSuccess
                | IfException
                | Return
                | Throw
                | Deoptimize
                | Terminate
                | LoopExit
                | OsrNormalEntry
                | OsrLoopEntry
        )
    }

    /// Nodes that begin a basic block.
    pub const fn is_basic_block_begin(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Start | End | Dead | Loop | Merge | IfTrue | IfFalse | IfSuccess | IfException
        )
    }

    /// Nodes that end a block and flow into the end block.
    pub const fn is_block_terminator(self) -> bool {
        matches!(self, Opcode::Return | Opcode::Throw | Opcode::Deoptimize)
    }

    /// Nodes that may appear as inputs to `End`.
    pub const fn is_graph_terminator(self) -> bool {
        self.is_block_terminator() || matches!(self, Opcode::Terminate)
    }

    pub const fn is_merge(self) -> bool {
        matches!(self, Opcode::Merge | Opcode::Loop)
    }

    pub const fn is_phi(self) -> bool {
        matches!(self, Opcode::Phi | Opcode::EffectPhi)
    }

    pub const fn is_constant(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Int32Constant | Int64Constant | Float64Constant | NumberConstant | HeapConstant
        )
    }

    /// Sentinels standing for values or control that can never exist.
    pub const fn is_dead_marker(self) -> bool {
        matches!(self, Opcode::Dead | Opcode::DeadValue | Opcode::Unreachable)
    }

    /// Nodes whose block is determined by the control skeleton alone.
    pub const fn has_fixed_schedule_position(self) -> bool {
        self.is_control()
            || matches!(
                self,
                Opcode::Parameter | Opcode::Phi | Opcode::EffectPhi | Opcode::OsrValue
            )
    }

    /// Default properties; parameterised constructors may not change them.
    pub const fn properties(self) -> Properties {
        use Opcode::*;
        const PURE_COMMUTATIVE: Properties = Properties::PURE.union(Properties::COMMUTATIVE);
        const PURE_ASSOC: Properties = Properties::PURE
            .union(Properties::COMMUTATIVE)
            .union(Properties::ASSOCIATIVE);
        match self {
            Start | End | Dead | Loop | Merge | Branch | IfTrue | IfFalse | IfSuccess
            | IfException | LoopExit | LoopExitValue | LoopExitEffect | OsrNormalEntry
            | OsrLoopEntry | Unreachable => Properties::KONTROL,
            Return | Throw | Deoptimize | Terminate => Properties::NO_THROW,
            DeadValue | Parameter | Int32Constant | Int64Constant | Float64Constant
            | NumberConstant | HeapConstant | Phi | EffectPhi | Select | Projection
            | FrameState | StateValues => Properties::PURE,
            Call | OsrValue => Properties::empty(),

            JsAdd | JsSubtract | JsMultiply | JsLessThan | JsToNumber | JsCallFunction
            | JsStackCheck => Properties::empty(),
            JsStrictEqual | JsToBoolean => Properties::PURE,

            NumberEqual | NumberAdd | NumberMultiply | ReferenceEqual => PURE_COMMUTATIVE,
            BooleanNot | BooleanToNumber | NumberLessThan | NumberLessThanOrEqual
            | NumberSubtract | NumberDivide | NumberModulus | NumberToInt32 | NumberToUint32
            | ChangeTaggedToInt32 | ChangeTaggedToUint32 | ChangeTaggedToFloat64
            | ChangeInt32ToTagged | ChangeUint32ToTagged | ChangeFloat64ToTagged
            | ChangeBoolToBit | ChangeBitToBool => Properties::PURE,
            LoadField | LoadElement | Load => Properties::ELIMINATABLE,
            StoreField | StoreElement | Store => Properties::NO_READ.union(Properties::NO_THROW),

            Word32And | Word32Or | Word32Xor | Int32Add | Int32Mul => PURE_ASSOC,
            Word32Equal | Word64Equal | Float64Add | Float64Mul | Float64Equal => {
                PURE_COMMUTATIVE
            }
            // May trap on the target, so they stay pinned to a control point.
            Int32Div | Int32Mod | Uint32Div | Uint32Mod => Properties::FOLDABLE,
            Word32Shl | Word32Shr | Word32Sar | Int32Sub | Int32LessThan
            | Int32LessThanOrEqual | Uint32LessThan | Uint32LessThanOrEqual | Float64Sub
            | Float64Div | Float64Mod | Float64LessThan | Float64LessThanOrEqual
            | ChangeInt32ToFloat64 | ChangeUint32ToFloat64 | ChangeFloat64ToInt32
            | ChangeFloat64ToUint32 | TruncateFloat64ToInt32 => Properties::PURE,
        }
    }

    /// Declared (value input, value output) arity for fixed-arity opcodes.
    pub const fn fixed_value_arity(self) -> (u32, u32) {
        use Opcode::*;
        match self {
            Start | End | Dead | Loop | Merge | IfTrue | IfFalse | IfSuccess | Throw
            | Terminate | LoopExit | LoopExitEffect | OsrNormalEntry | OsrLoopEntry
            | JsStackCheck | EffectPhi | Unreachable | Deoptimize => (0, 0),
            IfException => (0, 1),
            Branch | Return => (1, 0),
            DeadValue | LoopExitValue | Parameter | Projection => (1, 1),
            Int32Constant | Int64Constant | Float64Constant | NumberConstant | HeapConstant
            | OsrValue => (0, 1),
            Select => (3, 1),
            FrameState => (4, 1),
            // Variable arity, set by the builder.
            Phi | StateValues | Call | JsCallFunction => (0, 1),
            JsAdd | JsSubtract | JsMultiply | JsLessThan | JsStrictEqual => (2, 1),
            JsToNumber | JsToBoolean => (1, 1),
            BooleanNot | BooleanToNumber | NumberToInt32 | NumberToUint32 => (1, 1),
            NumberEqual | NumberLessThan | NumberLessThanOrEqual | NumberAdd | NumberSubtract
            | NumberMultiply | NumberDivide | NumberModulus | ReferenceEqual => (2, 1),
            LoadField => (1, 1),
            StoreField => (2, 0),
            LoadElement => (2, 1),
            StoreElement => (3, 0),
            ChangeTaggedToInt32 | ChangeTaggedToUint32 | ChangeTaggedToFloat64
            | ChangeInt32ToTagged | ChangeUint32ToTagged | ChangeFloat64ToTagged
            | ChangeBoolToBit | ChangeBitToBool => (1, 1),
            Load => (2, 1),
            Store => (3, 0),
            Word32And | Word32Or | Word32Xor | Word32Shl | Word32Shr | Word32Sar
            | Word32Equal | Word64Equal | Int32Add | Int32Sub | Int32Mul | Int32Div
            | Int32Mod | Uint32Div | Uint32Mod | Int32LessThan | Int32LessThanOrEqual
            | Uint32LessThan | Uint32LessThanOrEqual | Float64Add | Float64Sub | Float64Mul
            | Float64Div | Float64Mod | Float64Equal | Float64LessThan
            | Float64LessThanOrEqual => (2, 1),
            ChangeInt32ToFloat64 | ChangeUint32ToFloat64 | ChangeFloat64ToInt32
            | ChangeFloat64ToUint32 | TruncateFloat64ToInt32 => (1, 1),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// =============================================================================
// Static parameters
// =============================================================================

/// Static prediction attached to a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BranchHint {
    #[default]
    None,
    True,
    False,
}

/// Whether a store needs a GC write barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteBarrierKind {
    NoWriteBarrier,
    FullWriteBarrier,
}

/// Describes a field of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldAccess {
    pub offset: i32,
    pub ty: Type,
    pub machine_type: MachineType,
    pub write_barrier: WriteBarrierKind,
}

impl FieldAccess {
    /// Untagged offset from the start of the object.
    pub fn untagged_offset(&self) -> i32 {
        self.offset - HEAP_OBJECT_TAG
    }
}

/// Describes an element of a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementAccess {
    pub header_size: i32,
    pub ty: Type,
    pub machine_type: MachineType,
    pub write_barrier: WriteBarrierKind,
}

/// Low-bit tag carried by heap object pointers.
pub const HEAP_OBJECT_TAG: i32 = 1;

/// Machine-level store descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreRepresentation {
    pub machine_type: MachineType,
    pub write_barrier: WriteBarrierKind,
}

/// What a call transfers control to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Code,
    JsFunction,
    Runtime(u16),
}

/// Opaque linkage information for a call. Only the arity bookkeeping is
/// interpreted here; the rest is passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallDescriptor {
    pub kind: CallKind,
    pub input_count: u32,
    pub return_count: u32,
    pub needs_frame_state: bool,
    pub can_throw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStateKind {
    Js,
    ArgumentsAdaptor,
}

/// Where to resume unoptimized execution when deoptimizing at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameStateCallInfo {
    pub bailout_id: u32,
    pub kind: FrameStateKind,
}

/// The static parameter of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpParam {
    None,
    Int32(i32),
    Int64(i64),
    /// Doubles are stored as bits so that equality is total.
    Float64(u64),
    Heap(u32),
    Index(u32),
    Arity(u32),
    Phi { rep: MachineType, arity: u32 },
    Rep(MachineType),
    Branch(BranchHint),
    Field(FieldAccess),
    Element(ElementAccess),
    Store(StoreRepresentation),
    Call(CallDescriptor),
    FrameState(FrameStateCallInfo),
}

impl fmt::Display for OpParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpParam::None => Ok(()),
            OpParam::Int32(v) => write!(f, "[{}]", v),
            OpParam::Int64(v) => write!(f, "[{}]", v),
            OpParam::Float64(bits) => write!(f, "[{}]", f64::from_bits(*bits)),
            OpParam::Heap(h) => write!(f, "[heap:{}]", h),
            OpParam::Index(i) | OpParam::Arity(i) => write!(f, "[{}]", i),
            OpParam::Phi { rep, arity } => write!(f, "[{}, {}]", rep, arity),
            OpParam::Rep(rep) => write!(f, "[{}]", rep),
            OpParam::Branch(hint) => write!(f, "[{:?}]", hint),
            OpParam::Field(a) => write!(f, "[+{}, {}]", a.offset, a.machine_type),
            OpParam::Element(a) => write!(f, "[+{}, {}]", a.header_size, a.machine_type),
            OpParam::Store(s) => write!(f, "[{}, {:?}]", s.machine_type, s.write_barrier),
            OpParam::Call(d) => write!(f, "[{:?}, {}]", d.kind, d.input_count),
            OpParam::FrameState(i) => write!(f, "[{}, {:?}]", i.bailout_id, i.kind),
        }
    }
}

// =============================================================================
// Operator
// =============================================================================

/// Immutable description of a node's computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operator {
    opcode: Opcode,
    properties: Properties,
    value_inputs: u32,
    value_outputs: u32,
    param: OpParam,
}

impl Operator {
    /// An operator with the opcode's fixed arity and no parameter.
    pub const fn simple(opcode: Opcode) -> Self {
        let (value_inputs, value_outputs) = opcode.fixed_value_arity();
        Operator {
            opcode,
            properties: opcode.properties(),
            value_inputs,
            value_outputs,
            param: OpParam::None,
        }
    }

    /// An operator with an explicit value arity and parameter.
    pub const fn with_param(
        opcode: Opcode,
        value_inputs: u32,
        value_outputs: u32,
        param: OpParam,
    ) -> Self {
        Operator {
            opcode,
            properties: opcode.properties(),
            value_inputs,
            value_outputs,
            param,
        }
    }

    #[inline]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[inline]
    pub const fn properties(&self) -> Properties {
        self.properties
    }

    #[inline]
    pub fn has_property(&self, p: Properties) -> bool {
        self.properties.contains(p)
    }

    #[inline]
    pub const fn param(&self) -> &OpParam {
        &self.param
    }

    #[inline]
    pub const fn value_input_count(&self) -> u32 {
        self.value_inputs
    }

    #[inline]
    pub const fn value_output_count(&self) -> u32 {
        self.value_outputs
    }

    /// The arity carried by Merge, Loop, End and EffectPhi.
    fn arity(&self) -> u32 {
        match self.param {
            OpParam::Arity(n) => n,
            OpParam::Phi { arity, .. } => arity,
            _ => 0,
        }
    }

    pub fn has_context_input(&self) -> bool {
        self.opcode.level() == IrLevel::Js
    }

    pub fn context_input_count(&self) -> u32 {
        u32::from(self.has_context_input())
    }

    pub fn frame_state_input_count(&self) -> u32 {
        match self.opcode {
            Opcode::Deoptimize => 1,
            Opcode::Call => match self.param {
                OpParam::Call(desc) => u32::from(desc.needs_frame_state),
                _ => 0,
            },
            _ if self.opcode.level() == IrLevel::Js => {
                u32::from(!self.properties.contains(Properties::NO_THROW))
            }
            _ => 0,
        }
    }

    pub fn effect_input_count(&self) -> u32 {
        use Opcode::*;
        match self.opcode {
            EffectPhi => self.arity(),
            Start | End | Dead | Loop | Merge | Branch | IfTrue | IfFalse | IfSuccess | LoopExit
            | LoopExitValue | OsrValue => 0,
            Unreachable | IfException | Return | Throw | Deoptimize | Terminate
            | LoopExitEffect | OsrNormalEntry | OsrLoopEntry | Call => 1,
            _ if self.properties.contains(Properties::FOLDABLE) => 0,
            _ => 1,
        }
    }

    pub fn control_input_count(&self) -> u32 {
        use Opcode::*;
        match self.opcode {
            Start | Dead => 0,
            End | Merge | Loop => self.arity(),
            LoopExit => 2,
            Phi | EffectPhi | Branch | IfTrue | IfFalse | IfSuccess | IfException | Return
            | Throw | Deoptimize | Terminate | Unreachable | LoopExitValue | LoopExitEffect
            | OsrNormalEntry | OsrLoopEntry | OsrValue | Call => 1,
            Int32Div | Int32Mod | Uint32Div | Uint32Mod => 1,
            _ if self.properties.contains(Properties::NO_WRITE) => 0,
            _ => 1,
        }
    }

    pub fn total_input_count(&self) -> u32 {
        self.value_inputs
            + self.context_input_count()
            + self.frame_state_input_count()
            + self.effect_input_count()
            + self.control_input_count()
    }

    /// True when the node produces a control token for other nodes.
    pub fn produces_control(&self) -> bool {
        self.opcode.is_control()
            && !matches!(
                self.opcode,
                Opcode::End | Opcode::Return | Opcode::Throw | Opcode::Deoptimize | Opcode::Terminate
            )
    }

    /// True when the node is part of the effect chain.
    pub fn produces_effect(&self) -> bool {
        self.effect_input_count() > 0 || matches!(self.opcode, Opcode::Start)
    }

    // -------------------------------------------------------------------------
    // Parameter accessors (callers dispatch on the opcode first)
    // -------------------------------------------------------------------------

    pub fn phi_representation(&self) -> MachineType {
        match self.param {
            OpParam::Phi { rep, .. } | OpParam::Rep(rep) => rep,
            _ => MachineType::empty(),
        }
    }

    pub fn index_param(&self) -> u32 {
        match self.param {
            OpParam::Index(i) => i,
            _ => panic!("{} has no index parameter", self.opcode),
        }
    }

    pub fn int32_value(&self) -> Option<i32> {
        match self.param {
            OpParam::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// The numeric value of any numeric constant.
    pub fn number_value(&self) -> Option<f64> {
        match (self.opcode, self.param) {
            (Opcode::Int32Constant, OpParam::Int32(v)) => Some(f64::from(v)),
            (Opcode::Int64Constant, OpParam::Int64(v)) => Some(v as f64),
            (Opcode::Float64Constant | Opcode::NumberConstant, OpParam::Float64(bits)) => {
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    pub fn field_access(&self) -> FieldAccess {
        match self.param {
            OpParam::Field(a) => a,
            _ => panic!("{} has no field access", self.opcode),
        }
    }

    pub fn element_access(&self) -> ElementAccess {
        match self.param {
            OpParam::Element(a) => a,
            _ => panic!("{} has no element access", self.opcode),
        }
    }

    pub fn branch_hint(&self) -> BranchHint {
        match self.param {
            OpParam::Branch(h) => h,
            _ => BranchHint::None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.opcode, self.param)
    }
}

// =============================================================================
// Tests
// =============================================================================
