//! The target opcode set: one opcode per `scatha_mir::MirInstKind` shape,
//! continuing that crate's "MIR instruction set: a 1-to-1 relation to
//! target opcodes" design (`scatha_mir::instruction` module doc) down to
//! the byte level. Grounded on `examples/original_source/svm/include/svm/OpCode.h`'s
//! opcode-class scheme (`RR`/`RV64`/`RM`/`MR`/`Jump`/`Other`), simplified to
//! one operand-layout description per opcode rather than the original's
//! separate class table, since our opcode count is small enough that each
//! can just state its own layout.

use scatha_mir::{ArithOp, CompareOp, ConvertOp, UnaryOp};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Copy,
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
    Neg,
    BNot,
    LNot,
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
    Compare,
    Load,
    Store,
    Lea,
    Jump,
    CondJump,
    Call,
    CallForeign,
    Return,
    Unreachable,
}

impl Opcode {
    pub fn from_arith(op: ArithOp) -> Self {
        match op {
            ArithOp::Add => Opcode::Add,
            ArithOp::Sub => Opcode::Sub,
            ArithOp::Mul => Opcode::Mul,
            ArithOp::SDiv => Opcode::SDiv,
            ArithOp::UDiv => Opcode::UDiv,
            ArithOp::SRem => Opcode::SRem,
            ArithOp::URem => Opcode::URem,
            ArithOp::FAdd => Opcode::FAdd,
            ArithOp::FSub => Opcode::FSub,
            ArithOp::FMul => Opcode::FMul,
            ArithOp::FDiv => Opcode::FDiv,
            ArithOp::Shl => Opcode::Shl,
            ArithOp::LShr => Opcode::LShr,
            ArithOp::AShr => Opcode::AShr,
            ArithOp::And => Opcode::And,
            ArithOp::Or => Opcode::Or,
            ArithOp::Xor => Opcode::Xor,
        }
    }

    pub fn from_unary(op: UnaryOp) -> Self {
        match op {
            UnaryOp::Neg => Opcode::Neg,
            UnaryOp::BNot => Opcode::BNot,
            UnaryOp::LNot => Opcode::LNot,
        }
    }

    pub fn from_convert(op: ConvertOp) -> Self {
        match op {
            ConvertOp::Zext => Opcode::Zext,
            ConvertOp::Sext => Opcode::Sext,
            ConvertOp::Trunc => Opcode::Trunc,
            ConvertOp::Bitcast => Opcode::Bitcast,
            ConvertOp::SIntToFloat => Opcode::SIntToFloat,
            ConvertOp::UIntToFloat => Opcode::UIntToFloat,
            ConvertOp::FloatToSInt => Opcode::FloatToSInt,
            ConvertOp::FloatToUInt => Opcode::FloatToUInt,
            ConvertOp::FloatTrunc => Opcode::FloatTrunc,
            ConvertOp::FloatExt => Opcode::FloatExt,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Packs a `(CompareMode, CompareOp)` pair into the single sub-byte a
/// `Compare` instruction carries after its opcode (spec §4.2's compare
/// instructions, flattened to fit one opcode rather than eighteen).
pub fn encode_compare_mode_op(mode: scatha_mir::CompareMode, op: CompareOp) -> u8 {
    let mode_idx = match mode {
        scatha_mir::CompareMode::Signed => 0,
        scatha_mir::CompareMode::Unsigned => 1,
        scatha_mir::CompareMode::Float => 2,
    };
    let op_idx = match op {
        CompareOp::Eq => 0,
        CompareOp::Ne => 1,
        CompareOp::Lt => 2,
        CompareOp::Le => 3,
        CompareOp::Gt => 4,
        CompareOp::Ge => 5,
    };
    mode_idx * 6 + op_idx
}
