//! NaN-boxed script value representation
//!
//! The script engine's dynamically-typed values as seen by the proxy.
//! Doubles are stored raw; everything else lives in the NaN space.
//!
//! # Encoding
//!
//! ```text
//! f64 (float): Any value where upper 13 bits != 0x1FFF (raw IEEE 754)
//! Tagged:      0xFFF8 | 3-bit tag in bits 48..51 | 48-bit payload
//!   - Heap slot: 0xFFF8_0000_0000_0000 | slot          [tag=000]
//!   - i32 (int): 0xFFF9_0000_0000_0000 | (i32 as u32)  [tag=001]
//!   - bool:      0xFFFA_0000_0000_0000 | (b as u64)    [tag=010]
//!   - undefined: 0xFFFB_0000_0000_0000                 [tag=011]
//!   - null:      0xFFFE_0000_0000_0000                 [tag=110]
//! ```
//!
//! Heap values carry a slot id into the owning script runtime's heap, never
//! a host pointer. What a slot holds (string, array, host wrapper, ...) is
//! answered by the script runtime.

/// NaN-boxed 64-bit script value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ScriptValue(u64);

const NAN_BOX_BASE: u64 = 0xFFF8_0000_0000_0000;
const TAG_SHIFT: u64 = 48;
const TAG_MASK: u64 = 0x7 << TAG_SHIFT;
const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const PAYLOAD_MASK_32: u64 = 0x0000_0000_FFFF_FFFF;

const TAG_HEAP: u64 = 0x0 << TAG_SHIFT;
const TAG_INT: u64 = 0x1 << TAG_SHIFT;
const TAG_BOOL: u64 = 0x2 << TAG_SHIFT;
const TAG_UNDEFINED: u64 = 0x3 << TAG_SHIFT;
const TAG_NULL: u64 = 0x6 << TAG_SHIFT;

const UNDEFINED_BITS: u64 = NAN_BOX_BASE | TAG_UNDEFINED;
const NULL_BITS: u64 = NAN_BOX_BASE | TAG_NULL;
const TRUE_BITS: u64 = NAN_BOX_BASE | TAG_BOOL | 1;
const FALSE_BITS: u64 = NAN_BOX_BASE | TAG_BOOL;

/// Canonical quiet NaN. Keeps NaN payloads out of the tagged space.
const CANONICAL_NAN_BITS: u64 = 0x7FF8_0000_0000_0000;

impl ScriptValue {
    /// Create from raw u64 bits
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get raw u64 bits
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    /// The "no value" marker
    #[inline]
    pub const fn undefined() -> Self {
        Self(UNDEFINED_BITS)
    }

    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        Self(NULL_BITS)
    }

    /// Create a boolean value
    #[inline]
    pub const fn bool(b: bool) -> Self {
        Self(if b { TRUE_BITS } else { FALSE_BITS })
    }

    /// Create an int value
    #[inline]
    pub const fn int(i: i32) -> Self {
        Self(NAN_BOX_BASE | TAG_INT | (i as u32 as u64))
    }

    /// Create a float value (stored as raw IEEE 754 double)
    #[inline]
    pub fn float(f: f64) -> Self {
        if f.is_nan() {
            Self(CANONICAL_NAN_BITS)
        } else {
            Self(f.to_bits())
        }
    }

    /// Create a reference to a heap slot
    #[inline]
    pub const fn heap(slot: u32) -> Self {
        Self(NAN_BOX_BASE | TAG_HEAP | slot as u64)
    }

    // ========================================================================
    // Type checks
    // ========================================================================

    #[inline]
    const fn is_nan_boxed(&self) -> bool {
        (self.0 & NAN_BOX_BASE) == NAN_BOX_BASE
    }

    #[inline]
    const fn get_tag(&self) -> u64 {
        (self.0 & TAG_MASK) >> TAG_SHIFT
    }

    /// Check if value is the "no value" marker
    #[inline]
    pub const fn is_undefined(&self) -> bool {
        self.0 == UNDEFINED_BITS
    }

    /// Check if value is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == NULL_BITS
    }

    /// Check if value is null or undefined
    #[inline]
    pub const fn is_nullish(&self) -> bool {
        self.is_null() || self.is_undefined()
    }

    /// Check if value is a boolean
    #[inline]
    pub const fn is_bool(&self) -> bool {
        self.is_nan_boxed() && self.get_tag() == 2
    }

    /// Check if value is an int
    #[inline]
    pub const fn is_int(&self) -> bool {
        self.is_nan_boxed() && self.get_tag() == 1
    }

    /// Check if value is a float (raw IEEE 754, not NaN-boxed)
    #[inline]
    pub const fn is_float(&self) -> bool {
        !self.is_nan_boxed()
    }

    /// Check if value is an int or a float
    #[inline]
    pub const fn is_number(&self) -> bool {
        self.is_int() || self.is_float()
    }

    /// Check if value refers to a heap slot
    #[inline]
    pub const fn is_heap(&self) -> bool {
        self.is_nan_boxed() && self.get_tag() == 0
    }

    // ========================================================================
    // Extractors
    // ========================================================================

    /// Extract boolean value
    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        if self.is_bool() {
            Some((self.0 & PAYLOAD_MASK) != 0)
        } else {
            None
        }
    }

    /// Extract int value
    #[inline]
    pub const fn as_int(&self) -> Option<i32> {
        if self.is_int() {
            Some((self.0 & PAYLOAD_MASK_32) as u32 as i32)
        } else {
            None
        }
    }

    /// Extract float value
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        if self.is_float() {
            Some(f64::from_bits(self.0))
        } else {
            None
        }
    }

    /// Extract a number, widening ints to f64
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self.as_int() {
            Some(i) => Some(i as f64),
            None => self.as_float(),
        }
    }

    /// Extract heap slot id
    #[inline]
    pub const fn as_heap(&self) -> Option<u32> {
        if self.is_heap() {
            Some((self.0 & PAYLOAD_MASK_32) as u32)
        } else {
            None
        }
    }

    /// Get type name for debugging
    pub const fn type_name(&self) -> &'static str {
        if !self.is_nan_boxed() {
            "float"
        } else {
            match self.get_tag() {
                0 => "heap",
                1 => "int",
                2 => "bool",
                3 => "undefined",
                6 => "null",
                _ => "unknown",
            }
        }
    }
}

impl Default for ScriptValue {
    fn default() -> Self {
        Self::undefined()
    }
}

impl std::fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_nan_boxed() {
            write!(f, "ScriptValue::Float({})", f64::from_bits(self.0))
        } else {
            match self.get_tag() {
                0 => write!(f, "ScriptValue::Heap({})", self.0 & PAYLOAD_MASK_32),
                1 => write!(f, "ScriptValue::Int({})", (self.0 & PAYLOAD_MASK_32) as u32 as i32),
                2 => write!(f, "ScriptValue::Bool({})", (self.0 & PAYLOAD_MASK) != 0),
                3 => write!(f, "ScriptValue::Undefined"),
                6 => write!(f, "ScriptValue::Null"),
                _ => write!(f, "ScriptValue::Unknown({:#x})", self.0),
            }
        }
    }
}
