//! Value types and the target data layout.

use std::fmt::{self, Debug, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Ieee32,
    Ieee64,
}

impl FloatKind {
    pub fn instance_size(self) -> usize {
        match self {
            FloatKind::Ieee32 => 4,
            FloatKind::Ieee64 => 8,
        }
    }
}

/// Compact value type identifier. Every SSA value carries one of these; the
/// rewrite rules only ever compare them for equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValTypeID {
    Void,
    Ptr,
    Int(u8),
    Float(FloatKind),
}

impl Debug for ValTypeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for ValTypeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValTypeID::Void => write!(f, "void"),
            ValTypeID::Ptr => write!(f, "ptr"),
            ValTypeID::Int(bits) => write!(f, "i{bits}"),
            ValTypeID::Float(FloatKind::Ieee32) => write!(f, "float"),
            ValTypeID::Float(FloatKind::Ieee64) => write!(f, "double"),
        }
    }
}

impl ValTypeID {
    pub fn new_boolean() -> Self {
        Self::Int(1)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ValTypeID::Int(_))
    }
    pub fn is_float(self) -> bool {
        matches!(self, ValTypeID::Float(_))
    }
    pub fn is_ptr(self) -> bool {
        matches!(self, ValTypeID::Ptr)
    }
    pub fn makes_instance(self) -> bool {
        !matches!(self, ValTypeID::Void)
    }

    pub fn int_bits(self) -> u8 {
        match self {
            ValTypeID::Int(bits) => bits,
            _ => panic!("type mismatch: requires Int but got {self:?}"),
        }
    }

    pub fn instance_size(self, layout: &DataLayout) -> Option<usize> {
        match self {
            ValTypeID::Void => None,
            ValTypeID::Ptr => Some(layout.ptr_bytes()),
            ValTypeID::Int(bits) => Some(binary_bits_to_bytes(bits as usize)),
            ValTypeID::Float(fp) => Some(fp.instance_size()),
        }
    }

    pub fn instance_align(self, layout: &DataLayout) -> Option<usize> {
        let size = self.instance_size(layout)?;
        Some(if size.is_power_of_two() { size } else { size.next_power_of_two() })
    }
}

pub const fn binary_bits_to_bytes(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Target pointer width and alignment rules, consulted by the simplifier
/// when folding pointer-width casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayout {
    pub ptr_bits: u32,
}

impl DataLayout {
    pub fn new_host() -> Self {
        Self { ptr_bits: (std::mem::size_of::<usize>() * 8) as u32 }
    }
    pub fn with_ptr_bits(ptr_bits: u32) -> Self {
        Self { ptr_bits }
    }

    pub fn ptr_bytes(&self) -> usize {
        binary_bits_to_bytes(self.ptr_bits as usize)
    }
    /// The integer type that holds a pointer without truncation.
    pub fn intptr_type(&self) -> ValTypeID {
        ValTypeID::Int(self.ptr_bits.min(u8::MAX as u32) as u8)
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new_host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(ValTypeID::Void.to_string(), "void");
        assert_eq!(ValTypeID::Ptr.to_string(), "ptr");
        assert_eq!(ValTypeID::Int(32).to_string(), "i32");
        assert_eq!(ValTypeID::Float(FloatKind::Ieee32).to_string(), "float");
        assert_eq!(ValTypeID::Float(FloatKind::Ieee64).to_string(), "double");
        assert_eq!(ValTypeID::Int(1), ValTypeID::new_boolean());
    }

    #[test]
    fn sizes_follow_layout() {
        let layout = DataLayout::with_ptr_bits(64);
        assert_eq!(ValTypeID::Ptr.instance_size(&layout), Some(8));
        assert_eq!(ValTypeID::Int(1).instance_size(&layout), Some(1));
        assert_eq!(ValTypeID::Int(32).instance_size(&layout), Some(4));
        assert_eq!(ValTypeID::Void.instance_size(&layout), None);
        assert_eq!(layout.intptr_type(), ValTypeID::Int(64));
    }
}
