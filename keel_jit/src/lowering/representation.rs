//! Truncations and use requests.
//!
//! A use of a value asks for a machine representation and says how much
//! of the value it actually observes. The latter is a [`Truncation`]:
//!
//! ```text
//!            Any
//!          /     \
//!      Float64   Bool
//!         |       |
//!      Word32     |
//!          \     /
//!           None
//! ```
//!
//! `Word32` uses only look at the low 32 bits of an integer value (so
//! overflow wraps harmlessly), `Float64` uses look at the numeric value but
//! not at identity (`-0` or `undefined` coerced to NaN are fine), `Bool` uses
//! only at truthiness.

use std::fmt;

use crate::ir::machine_type::MachineType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Truncation {
    /// Not used as a value at all (effect, control, frame-state bookkeeping).
    #[default]
    None,
    Bool,
    Word32,
    Float64,
    Any,
}

impl Truncation {
    /// Least upper bound.
    pub fn generalize(self, other: Truncation) -> Truncation {
        use Truncation::*;
        match (self, other) {
            (a, b) if a == b => a,
            (None, x) | (x, None) => x,
            (Any, _) | (_, Any) => Any,
            (Bool, _) | (_, Bool) => Any,
            (Word32, Float64) | (Float64, Word32) => Float64,
            _ => Any,
        }
    }

    /// `self` is at most as general as `other`.
    pub fn less_general(self, other: Truncation) -> bool {
        self.generalize(other) == other
    }

    pub fn is_used_as_word32(self) -> bool {
        self.less_general(Truncation::Word32)
    }

    pub fn is_used_as_float64(self) -> bool {
        self.less_general(Truncation::Float64)
    }

    /// NaN may be observed unless the use truncates to an integer.
    pub fn can_observe_nan(self) -> bool {
        !self.is_used_as_word32()
    }
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Truncation::None => "no-value-use",
            Truncation::Bool => "truncate-to-bool",
            Truncation::Word32 => "truncate-to-word32",
            Truncation::Float64 => "truncate-to-float64",
            Truncation::Any => "no-truncation",
        };
        f.write_str(s)
    }
}

/// What a use requires of one of its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseInfo {
    /// Preferred machine type; empty for non-value uses.
    pub rep: MachineType,
    pub truncation: Truncation,
}

impl UseInfo {
    pub const fn new(rep: MachineType, truncation: Truncation) -> Self {
        UseInfo { rep, truncation }
    }

    pub const fn none() -> Self {
        Self::new(MachineType::empty(), Truncation::None)
    }

    pub const fn truncating_word32() -> Self {
        Self::new(MachineType::MACH_INT32, Truncation::Word32)
    }

    pub const fn truncating_uint32() -> Self {
        Self::new(MachineType::MACH_UINT32, Truncation::Word32)
    }

    pub const fn truncating_float64() -> Self {
        Self::new(MachineType::MACH_FLOAT64, Truncation::Float64)
    }

    pub const fn float64() -> Self {
        Self::new(MachineType::MACH_FLOAT64, Truncation::Any)
    }

    pub const fn int32() -> Self {
        Self::new(MachineType::MACH_INT32, Truncation::Any)
    }

    pub const fn bool() -> Self {
        Self::new(MachineType::MACH_BOOL, Truncation::Bool)
    }

    pub const fn any_tagged() -> Self {
        Self::new(MachineType::MACH_ANY_TAGGED, Truncation::Any)
    }

    /// The request matching a value of machine type `rep`, used when a
    /// node forwards its own truncation to its inputs (phis, stores).
    pub fn for_machine_type(rep: MachineType, truncation: Truncation) -> Self {
        Self::new(rep, truncation)
    }
}

impl fmt::Display for UseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.rep, self.truncation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generalize_is_lub() {
        use Truncation::*;
        assert_eq!(None.generalize(Word32), Word32);
        assert_eq!(Word32.generalize(Float64), Float64);
        assert_eq!(Bool.generalize(Word32), Any);
        assert_eq!(Float64.generalize(Any), Any);
        assert_eq!(Bool.generalize(Bool), Bool);
        for &a in &[None, Bool, Word32, Float64, Any] {
            for &b in &[None, Bool, Word32, Float64, Any] {
                assert_eq!(a.generalize(b), b.generalize(a));
                assert!(a.less_general(a.generalize(b)));
            }
        }
    }

    #[test]
    fn test_word32_queries() {
        assert!(Truncation::None.is_used_as_word32());
        assert!(Truncation::Word32.is_used_as_word32());
        assert!(!Truncation::Float64.is_used_as_word32());
        assert!(Truncation::Word32.is_used_as_float64());
        assert!(!Truncation::Bool.is_used_as_float64());
        assert!(Truncation::Any.can_observe_nan());
    }
}
