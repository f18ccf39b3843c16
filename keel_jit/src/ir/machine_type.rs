//! Machine representations and machine types.
//!
//! A [`MachineType`] combines one *representation* bit (how the value is
//! encoded in a register: a bit, a 32-bit word, a double, a tagged pointer)
//! with zero or more *type* bits (how the bits are to be interpreted: signed,
//! unsigned, boolean, number). Representation selection picks one of each
//! for every value in the graph.

use std::fmt;

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct MachineType: u16 {
        // Representations.
        const REP_BIT = 1 << 0;
        const REP_WORD8 = 1 << 1;
        const REP_WORD16 = 1 << 2;
        const REP_WORD32 = 1 << 3;
        const REP_WORD64 = 1 << 4;
        const REP_FLOAT32 = 1 << 5;
        const REP_FLOAT64 = 1 << 6;
        const REP_TAGGED = 1 << 7;

        // Interpretations.
        const TYPE_BOOL = 1 << 8;
        const TYPE_INT32 = 1 << 9;
        const TYPE_UINT32 = 1 << 10;
        const TYPE_INT64 = 1 << 11;
        const TYPE_UINT64 = 1 << 12;
        const TYPE_NUMBER = 1 << 13;
        const TYPE_ANY = 1 << 14;

        const REP_MASK = 0x00ff;
        const TYPE_MASK = 0x7f00;

        const MACH_BOOL = Self::REP_BIT.bits() | Self::TYPE_BOOL.bits();
        const MACH_INT32 = Self::REP_WORD32.bits() | Self::TYPE_INT32.bits();
        const MACH_UINT32 = Self::REP_WORD32.bits() | Self::TYPE_UINT32.bits();
        const MACH_FLOAT64 = Self::REP_FLOAT64.bits() | Self::TYPE_NUMBER.bits();
        const MACH_ANY_TAGGED = Self::REP_TAGGED.bits() | Self::TYPE_ANY.bits();
        const MACH_PTR = Self::REP_WORD64.bits();
    }
}

impl MachineType {
    /// Only the representation bits.
    #[inline]
    pub fn representation(self) -> MachineType {
        self & MachineType::REP_MASK
    }

    /// Only the interpretation bits.
    #[inline]
    pub fn type_bits(self) -> MachineType {
        self & MachineType::TYPE_MASK
    }

    /// True when exactly one representation bit is set.
    #[inline]
    pub fn has_single_representation(self) -> bool {
        self.representation().bits().count_ones() == 1
    }

    /// True when `self` and `other` are encoded the same way.
    #[inline]
    pub fn same_representation(self, other: MachineType) -> bool {
        self.representation() == other.representation()
    }

    pub fn is_word32(self) -> bool {
        self.intersects(
            MachineType::REP_WORD8 | MachineType::REP_WORD16 | MachineType::REP_WORD32,
        )
    }

    /// log2 of the in-memory size, used by loads and stores.
    pub fn element_size_log2(self) -> u32 {
        let rep = self.representation();
        if rep.intersects(MachineType::REP_BIT | MachineType::REP_WORD8) {
            0
        } else if rep.contains(MachineType::REP_WORD16) {
            1
        } else if rep.intersects(MachineType::REP_WORD32 | MachineType::REP_FLOAT32) {
            2
        } else {
            3
        }
    }
}

impl fmt::Debug for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }
        bitflags::parser::to_writer(self, f)
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rep = match self.representation() {
            r if r == MachineType::REP_BIT => "kRepBit",
            r if r == MachineType::REP_WORD8 => "kRepWord8",
            r if r == MachineType::REP_WORD16 => "kRepWord16",
            r if r == MachineType::REP_WORD32 => "kRepWord32",
            r if r == MachineType::REP_WORD64 => "kRepWord64",
            r if r == MachineType::REP_FLOAT32 => "kRepFloat32",
            r if r == MachineType::REP_FLOAT64 => "kRepFloat64",
            r if r == MachineType::REP_TAGGED => "kRepTagged",
            _ => return write!(f, "{:?}", self),
        };
        write!(f, "{}", rep)?;
        let ty = self.type_bits();
        if !ty.is_empty() {
            write!(f, "|{:?}", ty)?;
        }
        Ok(())
    }
}
