//! The MIR instruction set: a 1-to-1 relation to target opcodes. Rather
//! than an opcode-plus-packed-`instData` scheme (`lib/MIR/CFG.h`'s
//! `Instruction::instData`, a `memcpy`'d `uint64_t`), this generalizes
//! `scatha_ir::InstKind`'s tagged union to the machine level: each opcode
//! carries its own typed payload.

use crate::ids::{MirBlockId, MirFunctionId};
use crate::operand::{AddrBase, MemoryAddress, MirOperand};
use crate::register::Register;
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::SDiv => "sdiv",
            ArithOp::UDiv => "udiv",
            ArithOp::SRem => "srem",
            ArithOp::URem => "urem",
            ArithOp::FAdd => "fadd",
            ArithOp::FSub => "fsub",
            ArithOp::FMul => "fmul",
            ArithOp::FDiv => "fdiv",
            ArithOp::Shl => "shl",
            ArithOp::LShr => "lshr",
            ArithOp::AShr => "ashr",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    BNot,
    LNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    Zext,
    Sext,
    Trunc,
    Bitcast,
    SIntToFloat,
    UIntToFloat,
    FloatToSInt,
    FloatToUInt,
    FloatTrunc,
    FloatExt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareMode {
    Signed,
    Unsigned,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The callee of a `Call`: a direct native function, or a foreign function
/// via its `(slot, index)` tag into the FFI table (spec §4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirCallee {
    Function(MirFunctionId),
    Foreign { slot: u32, index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MirInstKind {
    /// Register-to-register or register-to-memory data movement. Phi nodes
    /// lower to these at SSA destruction (spec §4.7).
    Copy { src: MirOperand },
    Arithmetic { op: ArithOp, lhs: MirOperand, rhs: MirOperand },
    Unary { op: UnaryOp, operand: MirOperand },
    Convert { op: ConvertOp, operand: MirOperand, dest_width: u8 },
    Compare { mode: CompareMode, op: CompareOp, lhs: MirOperand, rhs: MirOperand },
    Load { addr: MemoryAddress },
    Store { addr: MemoryAddress, value: MirOperand },
    /// Pure address computation with no memory access — the result of
    /// folding a `GetElementPointer` that a non-load/store user still needs
    /// as a value (spec §4.7 "folding address computations").
    Lea { addr: MemoryAddress },
    Jump { target: MirBlockId },
    CondJump { cond: MirOperand, if_true: MirBlockId, if_false: MirBlockId },
    Call { callee: MirCallee, args: SmallVec<[MirOperand; 4]> },
    Return,
    Unreachable,
}

fn push_addr(out: &mut SmallVec<[Register; 4]>, addr: &MemoryAddress) {
    if let AddrBase::Reg(r) = addr.base {
        out.push(r);
    }
    if let Some(i) = addr.index {
        out.push(i);
    }
}

impl MirInstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, MirInstKind::Jump { .. } | MirInstKind::CondJump { .. } | MirInstKind::Return | MirInstKind::Unreachable)
    }

    pub fn has_side_effects(&self) -> bool {
        matches!(self, MirInstKind::Store { .. } | MirInstKind::Call { .. }) || self.is_terminator()
    }

    pub fn successors(&self) -> SmallVec<[MirBlockId; 2]> {
        match self {
            MirInstKind::Jump { target } => SmallVec::from_slice(&[*target]),
            MirInstKind::CondJump { if_true, if_false, .. } => SmallVec::from_slice(&[*if_true, *if_false]),
            _ => SmallVec::new(),
        }
    }

    /// Every register this instruction reads (not the dest). Mirrors
    /// `scatha_ir::InstKind::operands` at the machine level.
    pub fn used_registers(&self) -> SmallVec<[Register; 4]> {
        let mut out = SmallVec::new();
        let mut push_operand = |op: &MirOperand| match op {
            MirOperand::Reg(r) => out.push(*r),
            MirOperand::Mem(m) => push_addr(&mut out, m),
            MirOperand::Imm(_) | MirOperand::Global(_) => {}
        };
        match self {
            MirInstKind::Copy { src } => push_operand(src),
            MirInstKind::Arithmetic { lhs, rhs, .. } => {
                push_operand(lhs);
                push_operand(rhs);
            }
            MirInstKind::Unary { operand, .. } => push_operand(operand),
            MirInstKind::Convert { operand, .. } => push_operand(operand),
            MirInstKind::Compare { lhs, rhs, .. } => {
                push_operand(lhs);
                push_operand(rhs);
            }
            MirInstKind::Load { addr } => push_addr(&mut out, addr),
            MirInstKind::Store { addr, value } => {
                push_addr(&mut out, addr);
                push_operand(value);
            }
            MirInstKind::Lea { addr } => push_addr(&mut out, addr),
            MirInstKind::Jump { .. } | MirInstKind::Unreachable | MirInstKind::Return => {}
            MirInstKind::CondJump { cond, .. } => push_operand(cond),
            MirInstKind::Call { args, .. } => {
                for a in args {
                    push_operand(a);
                }
            }
        }
        out
    }

    /// Rewrites every occurrence of `from` to `to` among the registers this
    /// instruction reads. Used by copy coalescing (spec §4.7).
    pub fn replace_used_register(&mut self, from: Register, to: Register) {
        let rw_op = |op: &mut MirOperand| {
            if let MirOperand::Reg(r) = op {
                if *r == from {
                    *r = to;
                }
            }
        };
        let rw_mem = |m: &mut MemoryAddress| {
            if m.base == AddrBase::Reg(from) {
                m.base = AddrBase::Reg(to);
            }
            if m.index == Some(from) {
                m.index = Some(to);
            }
        };
        match self {
            MirInstKind::Copy { src } => rw_op(src),
            MirInstKind::Arithmetic { lhs, rhs, .. } => {
                rw_op(lhs);
                rw_op(rhs);
            }
            MirInstKind::Unary { operand, .. } => rw_op(operand),
            MirInstKind::Convert { operand, .. } => rw_op(operand),
            MirInstKind::Compare { lhs, rhs, .. } => {
                rw_op(lhs);
                rw_op(rhs);
            }
            MirInstKind::Load { addr } => rw_mem(addr),
            MirInstKind::Store { addr, value } => {
                rw_mem(addr);
                rw_op(value);
            }
            MirInstKind::Lea { addr } => rw_mem(addr),
            MirInstKind::Jump { .. } | MirInstKind::Unreachable | MirInstKind::Return => {}
            MirInstKind::CondJump { cond, .. } => rw_op(cond),
            MirInstKind::Call { args, .. } => {
                for a in args {
                    rw_op(a);
                }
            }
        }
    }
}

/// One MIR instruction: opcode-specific payload, an optional destination
/// register, and the byte-width the operation acts at (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub id: crate::ids::MirInstId,
    pub block: MirBlockId,
    pub kind: MirInstKind,
    pub dest: Option<Register>,
    pub bytewidth: u8,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    pub fn has_side_effects(&self) -> bool {
        self.kind.has_side_effects()
    }

    pub fn used_registers(&self) -> SmallVec<[Register; 4]> {
        self.kind.used_registers()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(d) = self.dest {
            write!(f, "{d} = ")?;
        }
        match &self.kind {
            MirInstKind::Copy { src } => write!(f, "copy.{} {src}", self.bytewidth),
            MirInstKind::Arithmetic { op, lhs, rhs } => write!(f, "{}.{} {lhs}, {rhs}", op.mnemonic(), self.bytewidth),
            MirInstKind::Unary { operand, .. } => write!(f, "unary.{} {operand}", self.bytewidth),
            MirInstKind::Convert { operand, .. } => write!(f, "convert.{} {operand}", self.bytewidth),
            MirInstKind::Compare { lhs, rhs, .. } => write!(f, "cmp.{} {lhs}, {rhs}", self.bytewidth),
            MirInstKind::Load { addr } => write!(f, "load.{} {addr}", self.bytewidth),
            MirInstKind::Store { addr, value } => write!(f, "store.{} {addr}, {value}", self.bytewidth),
            MirInstKind::Lea { addr } => write!(f, "lea {addr}"),
            MirInstKind::Jump { target } => write!(f, "jmp {target}"),
            MirInstKind::CondJump { cond, if_true, if_false } => write!(f, "jif {cond}, {if_true}, {if_false}"),
            MirInstKind::Call { callee, args } => {
                write!(f, "call {callee:?}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            MirInstKind::Return => write!(f, "ret"),
            MirInstKind::Unreachable => write!(f, "unreachable"),
        }
    }
}
