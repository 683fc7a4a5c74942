//! The IR instruction set, abridged per spec §4.2: memory, arithmetic,
//! comparison, control and call instructions. Instructions double as their
//! own SSA result value (spec §3's "Instruction" `Value` variant) except
//! terminators and void-returning calls, whose result type is `void`.

use crate::ids::{BlockId, FunctionId, InstId, Operand, TypeId};
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
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

impl ArithmeticOp {
    pub fn is_float(self) -> bool {
        matches!(self, ArithmeticOp::FAdd | ArithmeticOp::FSub | ArithmeticOp::FMul | ArithmeticOp::FDiv)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, ArithmeticOp::Shl | ArithmeticOp::LShr | ArithmeticOp::AShr)
    }

    /// Commutative operators are canonicalized with the instruction operand
    /// on the left when both operands are instructions (§4.5 tie-break).
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            ArithmeticOp::Add | ArithmeticOp::Mul | ArithmeticOp::FAdd | ArithmeticOp::FMul | ArithmeticOp::And | ArithmeticOp::Or | ArithmeticOp::Xor
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
            ArithmeticOp::SDiv => "sdiv",
            ArithmeticOp::UDiv => "udiv",
            ArithmeticOp::SRem => "srem",
            ArithmeticOp::URem => "urem",
            ArithmeticOp::FAdd => "fadd",
            ArithmeticOp::FSub => "fsub",
            ArithmeticOp::FMul => "fmul",
            ArithmeticOp::FDiv => "fdiv",
            ArithmeticOp::Shl => "shl",
            ArithmeticOp::LShr => "lshr",
            ArithmeticOp::AShr => "ashr",
            ArithmeticOp::And => "and",
            ArithmeticOp::Or => "or",
            ArithmeticOp::Xor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryArithmeticOp {
    Neg,
    BNot,
    LNot,
}

impl UnaryArithmeticOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryArithmeticOp::Neg => "neg",
            UnaryArithmeticOp::BNot => "bnot",
            UnaryArithmeticOp::LNot => "lnot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionOp {
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

impl ConversionOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ConversionOp::Zext => "zext",
            ConversionOp::Sext => "sext",
            ConversionOp::Trunc => "trunc",
            ConversionOp::Bitcast => "bitcast",
            ConversionOp::SIntToFloat => "stof",
            ConversionOp::UIntToFloat => "utof",
            ConversionOp::FloatToSInt => "ftos",
            ConversionOp::FloatToUInt => "ftou",
            ConversionOp::FloatTrunc => "ftrunc",
            ConversionOp::FloatExt => "fext",
        }
    }
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

impl CompareOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "neq",
            CompareOp::Lt => "less",
            CompareOp::Le => "lseq",
            CompareOp::Gt => "grt",
            CompareOp::Ge => "grteq",
        }
    }

    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
        }
    }
}

/// A single index in a GEP's structural index list: either a compile-time
/// constant (struct member index, static array index) or a dynamic value
/// (array index known only at runtime).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GepIndex {
    Const(i64),
    Value(Operand),
}

/// The callee of a `Call` instruction: a direct native function, or a
/// foreign function identified by its `(slot, index)` tag into the FFI
/// table (§4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    Function(FunctionId),
    Foreign { slot: u32, index: u32 },
}

/// The operation-specific payload of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstKind {
    // --- Memory ---
    Alloca { allocated_ty: TypeId },
    Load { ptr: Operand, loaded_ty: TypeId },
    Store { ptr: Operand, value: Operand },
    GetElementPointer { ptr: Operand, base_ty: TypeId, indices: Vec<GepIndex> },
    InsertValue { aggregate: Operand, value: Operand, indices: Vec<u64> },
    ExtractValue { aggregate: Operand, indices: Vec<u64> },

    // --- Arithmetic ---
    Arithmetic { op: ArithmeticOp, lhs: Operand, rhs: Operand },
    UnaryArithmetic { op: UnaryArithmeticOp, operand: Operand },
    Conversion { op: ConversionOp, operand: Operand, target_ty: TypeId },

    // --- Comparison ---
    Compare { mode: CompareMode, op: CompareOp, lhs: Operand, rhs: Operand },

    // --- Control ---
    Goto { target: BlockId },
    Branch { cond: Operand, if_true: BlockId, if_false: BlockId },
    Return { value: Option<Operand> },
    Unreachable,
    Phi { incoming: SmallVec<[(BlockId, Operand); 4]> },

    // --- Calls ---
    Call { callee: Callee, args: Vec<Operand> },
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstKind::Goto { .. } | InstKind::Branch { .. } | InstKind::Return { .. } | InstKind::Unreachable)
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    /// Instructions with observable side effects: DCE must never remove
    /// these even with zero users (spec §4.5 `dce`).
    pub fn has_side_effects(&self) -> bool {
        matches!(self, InstKind::Store { .. } | InstKind::Call { .. }) || self.is_terminator()
    }

    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            InstKind::Goto { target } => SmallVec::from_slice(&[*target]),
            InstKind::Branch { if_true, if_false, .. } => SmallVec::from_slice(&[*if_true, *if_false]),
            _ => SmallVec::new(),
        }
    }

    /// Every value operand this instruction reads, in left-to-right order.
    /// Block operands (jump targets, phi predecessor labels) are excluded —
    /// those are graph edges, not data values.
    pub fn operands(&self) -> SmallVec<[Operand; 4]> {
        let mut out = SmallVec::new();
        match self {
            InstKind::Alloca { .. } => {}
            InstKind::Load { ptr, .. } => out.push(*ptr),
            InstKind::Store { ptr, value } => {
                out.push(*ptr);
                out.push(*value);
            }
            InstKind::GetElementPointer { ptr, indices, .. } => {
                out.push(*ptr);
                for idx in indices {
                    if let GepIndex::Value(v) = idx {
                        out.push(*v);
                    }
                }
            }
            InstKind::InsertValue { aggregate, value, .. } => {
                out.push(*aggregate);
                out.push(*value);
            }
            InstKind::ExtractValue { aggregate, .. } => out.push(*aggregate),
            InstKind::Arithmetic { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            InstKind::UnaryArithmetic { operand, .. } => out.push(*operand),
            InstKind::Conversion { operand, .. } => out.push(*operand),
            InstKind::Compare { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            InstKind::Goto { .. } | InstKind::Unreachable => {}
            InstKind::Branch { cond, .. } => out.push(*cond),
            InstKind::Return { value } => {
                if let Some(v) = value {
                    out.push(*v);
                }
            }
            InstKind::Phi { incoming } => {
                for (_, v) in incoming {
                    out.push(*v);
                }
            }
            InstKind::Call { args, .. } => out.extend(args.iter().copied()),
        }
        out
    }

    /// Rewrites every occurrence of `from` to `to` among this instruction's
    /// value operands (not block operands). Returns whether anything
    /// changed.
    pub fn replace_operand(&mut self, from: Operand, to: Operand) -> bool {
        let mut changed = false;
        let mut rw = |v: &mut Operand| {
            if *v == from {
                *v = to;
                changed = true;
            }
        };
        match self {
            InstKind::Alloca { .. } | InstKind::Goto { .. } | InstKind::Unreachable => {}
            InstKind::Load { ptr, .. } => rw(ptr),
            InstKind::Store { ptr, value } => {
                rw(ptr);
                rw(value);
            }
            InstKind::GetElementPointer { ptr, indices, .. } => {
                rw(ptr);
                for idx in indices {
                    if let GepIndex::Value(v) = idx {
                        rw(v);
                    }
                }
            }
            InstKind::InsertValue { aggregate, value, .. } => {
                rw(aggregate);
                rw(value);
            }
            InstKind::ExtractValue { aggregate, .. } => rw(aggregate),
            InstKind::Arithmetic { lhs, rhs, .. } => {
                rw(lhs);
                rw(rhs);
            }
            InstKind::UnaryArithmetic { operand, .. } => rw(operand),
            InstKind::Conversion { operand, .. } => rw(operand),
            InstKind::Compare { lhs, rhs, .. } => {
                rw(lhs);
                rw(rhs);
            }
            InstKind::Branch { cond, .. } => rw(cond),
            InstKind::Return { value } => {
                if let Some(v) = value {
                    rw(v);
                }
            }
            InstKind::Phi { incoming } => {
                for (_, v) in incoming.iter_mut() {
                    rw(v);
                }
            }
            InstKind::Call { args, .. } => {
                for a in args.iter_mut() {
                    rw(a);
                }
            }
        }
        changed
    }
}

/// One instruction: its result type (`void` if it produces no value), an
/// optional user-facing name, and its operation-specific payload.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub id: InstId,
    pub block: BlockId,
    pub name: Option<String>,
    pub ty: TypeId,
    pub kind: InstKind,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    pub fn is_phi(&self) -> bool {
        self.kind.is_phi()
    }

    pub fn has_side_effects(&self) -> bool {
        self.kind.has_side_effects()
    }

    pub fn operands(&self) -> SmallVec<[Operand; 4]> {
        self.kind.operands()
    }

    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        self.kind.successors()
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(n) => format!("%{n}"),
            None => format!("%{}", self.id),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
