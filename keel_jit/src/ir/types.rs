//! Static value types attached to graph nodes.
//!
//! Types form a bitset lattice. Each bit is a disjoint set of runtime values;
//! a type is the union of its bits. The empty type (`NONE`) is uninhabited:
//! a node of that type can never produce a value, so it is dead.
//!
//! ```text
//!                              ANY
//!            /            /          \            \
//!        NUMBER        BOOLEAN      STRING      RECEIVER ...
//!      /        \
//!  INTEGRAL32   OTHER_NUMBER | MINUS_ZERO | NAN
//!   /      \
//! SIGNED32  UNSIGNED32
//! ```

use std::fmt;

bitflags::bitflags! {
    /// A static type: a union of disjoint value classes.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Type: u32 {
        const BOOLEAN = 1 << 0;
        /// Integers in [-2^31, -1].
        const NEGATIVE32 = 1 << 1;
        /// Integers in [0, 2^31 - 1].
        const UNSIGNED31 = 1 << 2;
        /// Integers in [2^31, 2^32 - 1].
        const UNSIGNED32_HIGH = 1 << 3;
        /// Every other non-NaN number except -0.
        const OTHER_NUMBER = 1 << 4;
        const MINUS_ZERO = 1 << 5;
        const NAN = 1 << 6;
        const UNDEFINED = 1 << 7;
        const NULL = 1 << 8;
        const STRING = 1 << 9;
        const RECEIVER = 1 << 10;
        /// Untyped machine-level values (raw pointers, words).
        const INTERNAL = 1 << 11;

        const SIGNED32 = Self::NEGATIVE32.bits() | Self::UNSIGNED31.bits();
        const UNSIGNED32 = Self::UNSIGNED31.bits() | Self::UNSIGNED32_HIGH.bits();
        const INTEGRAL32 = Self::SIGNED32.bits() | Self::UNSIGNED32.bits();
        const ORDERED_NUMBER = Self::INTEGRAL32.bits()
            | Self::OTHER_NUMBER.bits()
            | Self::MINUS_ZERO.bits();
        const NUMBER = Self::ORDERED_NUMBER.bits() | Self::NAN.bits();
        const PRIMITIVE = Self::NUMBER.bits()
            | Self::BOOLEAN.bits()
            | Self::UNDEFINED.bits()
            | Self::NULL.bits()
            | Self::STRING.bits();
        const ANY = Self::PRIMITIVE.bits() | Self::RECEIVER.bits() | Self::INTERNAL.bits();
    }
}

impl Type {
    /// The uninhabited type.
    pub const NONE: Type = Type::empty();

    /// `self` is a subtype of `other`.
    #[inline]
    pub fn is(self, other: Type) -> bool {
        other.contains(self)
    }

    /// `self` and `other` share at least one value.
    #[inline]
    pub fn maybe(self, other: Type) -> bool {
        self.intersects(other)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.is_empty()
    }

    #[inline]
    pub fn union_with(self, other: Type) -> Type {
        self | other
    }

    #[inline]
    pub fn intersect(self, other: Type) -> Type {
        self & other
    }

    /// The singleton class containing `value`.
    pub fn for_int32_constant(value: i32) -> Type {
        if value < 0 {
            Type::NEGATIVE32
        } else {
            Type::UNSIGNED31
        }
    }

    pub fn for_uint32_constant(value: u32) -> Type {
        if value <= i32::MAX as u32 {
            Type::UNSIGNED31
        } else {
            Type::UNSIGNED32_HIGH
        }
    }

    /// The narrowest class containing the double `value`.
    pub fn for_float64_constant(value: f64) -> Type {
        if value.is_nan() {
            Type::NAN
        } else if value == 0.0 && value.is_sign_negative() {
            Type::MINUS_ZERO
        } else if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= u32::MAX as f64 {
            if value < 0.0 {
                Type::NEGATIVE32
            } else if value <= i32::MAX as f64 {
                Type::UNSIGNED31
            } else {
                Type::UNSIGNED32_HIGH
            }
        } else {
            Type::OTHER_NUMBER
        }
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::ANY
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMED: &[(Type, &str)] = &[
            (Type::ANY, "Any"),
            (Type::NUMBER, "Number"),
            (Type::ORDERED_NUMBER, "OrderedNumber"),
            (Type::INTEGRAL32, "Integral32"),
            (Type::SIGNED32, "Signed32"),
            (Type::UNSIGNED32, "Unsigned32"),
            (Type::UNSIGNED31, "Unsigned31"),
            (Type::NEGATIVE32, "Negative32"),
            (Type::BOOLEAN, "Boolean"),
            (Type::INTERNAL, "Internal"),
        ];
        if self.is_none() {
            return write!(f, "None");
        }
        if let Some((_, name)) = NAMED.iter().find(|(t, _)| t == self) {
            return write!(f, "{}", name);
        }
        bitflags::parser::to_writer(self, f)
    }
}

// =============================================================================
// Tests
// =============================================================================
