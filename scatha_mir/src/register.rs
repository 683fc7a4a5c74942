//! MIR register model (spec §3 "MIR mirrors", §4.7).
//!
//! A `Register` passes through up to four life stages: `Ssa` while phis still exist, `Virtual` once SSA
//! destruction has turned phis into copies (still unallocated), `Hardware`
//! once register allocation has colored it, and `Callee` for registers
//! pinned by the calling convention (argument/return slots) before coloring
//! even starts — §4.7 "Hardware registers model the calling convention:
//! argument and return slots are pre-colored."

use crate::ids::VRegId;
use std::fmt;

/// A fixed hardware register index, post-allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HwReg(pub u8);

/// A calling-convention-pinned slot (argument or return value position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CalleeSlot(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    /// Pre-SSA-destruction register; may still be the dest of a `Phi`.
    Ssa(VRegId),
    /// Post-SSA-destruction virtual register awaiting allocation.
    Virtual(VRegId),
    /// Colored to a concrete hardware register.
    Hardware(HwReg),
    /// Pinned by the calling convention (not recolorable).
    Callee(CalleeSlot),
}

impl Register {
    pub fn is_virtual(self) -> bool {
        matches!(self, Register::Virtual(_) | Register::Ssa(_))
    }

    pub fn is_pinned(self) -> bool {
        matches!(self, Register::Hardware(_) | Register::Callee(_))
    }

    pub fn vreg_id(self) -> Option<VRegId> {
        match self {
            Register::Ssa(id) | Register::Virtual(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Ssa(id) => write!(f, "%ssa{id}"),
            Register::Virtual(id) => write!(f, "%v{id}"),
            Register::Hardware(HwReg(n)) => write!(f, "$r{n}"),
            Register::Callee(CalleeSlot(n)) => write!(f, "$callee{n}"),
        }
    }
}

/// A half-open range `[start, end)` of linearized program points (one point
/// per instruction, in block layout order) during which a register holds a
/// value some later instruction needs (spec Glossary: "live interval").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LiveInterval {
    pub start: u32,
    pub end: u32,
}

impl LiveInterval {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "live interval must not end before it starts");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}
