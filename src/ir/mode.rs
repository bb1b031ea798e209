//! Value modes.
//!
//! Every node carries a mode: the typed width of the value it produces.
//! Besides the data modes there are three pseudo-modes: `Memory` and
//! `Control` order effects, and `Tuple` marks multi-result operations
//! whose components are extracted with projections.

/// Typed width tag of a node's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// 64-bit signed integer.
    Int64 = 0,
    /// 32-bit signed integer.
    Int32 = 1,
    /// 64-bit floating point.
    Float64 = 2,
    /// Boolean (comparison results).
    Bool = 3,
    /// Memory ordering token.
    Memory = 250,
    /// Control token.
    Control = 251,
    /// Multi-result bundle, consumed through projections.
    Tuple = 252,
}

impl Mode {
    /// True for modes that carry an ordinary data value.
    #[inline]
    pub const fn is_data(self) -> bool {
        matches!(self, Mode::Int64 | Mode::Int32 | Mode::Float64 | Mode::Bool)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::Int64 => "i64",
            Mode::Int32 => "i32",
            Mode::Float64 => "f64",
            Mode::Bool => "b",
            Mode::Memory => "mem",
            Mode::Control => "ctl",
            Mode::Tuple => "tuple",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_modes() {
        assert!(Mode::Int64.is_data());
        assert!(Mode::Bool.is_data());
        assert!(!Mode::Memory.is_data());
        assert!(!Mode::Control.is_data());
        assert!(!Mode::Tuple.is_data());
    }
}
