//! Peephole instruction combining to a fixed point (spec §4.5): identities,
//! algebraic simplifications, constant folding, and the GEP-index-zero
//! identity (offset zero is the same address regardless of the aggregate
//! being indexed, since every IR pointer is the single opaque `ptr` type).

use crate::context::{Constant, Context};
use crate::ids::{InstId, LocalValue, Operand};
use crate::instruction::{ArithmeticOp, CompareOp, ConversionOp, GepIndex, InstKind, UnaryArithmeticOp};
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};

pub struct InstCombine;

impl FunctionPass for InstCombine {
    fn name(&self) -> &'static str {
        "inst-combine"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Simplification
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let mut changed_ever = false;
        loop {
            let mut changed = false;
            let ids: Vec<InstId> = func.all_insts().map(|i| i.id).collect();
            for id in ids {
                if let Some(replacement) = simplify(ctx, func, id) {
                    func.replace_all_uses_with(LocalValue::Inst(id), replacement);
                    func.remove(id);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            changed_ever = true;
        }
        changed_ever
    }
}

fn as_int_const(ctx: &Context, op: Operand) -> Option<i128> {
    let Operand::Constant(id) = op else { return None };
    match ctx.constant(id) {
        Constant::Integral { value, .. } => Some(*value),
        _ => None,
    }
}

fn simplify(ctx: &mut Context, func: &Function, id: InstId) -> Option<Operand> {
    let inst = func.inst(id);
    let ty = inst.ty;
    match inst.kind.clone() {
        InstKind::Arithmetic { op, lhs, rhs } => simplify_arithmetic(ctx, op, lhs, rhs, ty),
        InstKind::UnaryArithmetic { op, operand } => simplify_unary(func, op, operand),
        InstKind::Compare { op, lhs, rhs, .. } if lhs == rhs => Some(identity_compare_same_operand(ctx, op, ty)),
        InstKind::Conversion { op, operand, target_ty } => simplify_conversion(func, op, operand, target_ty),
        InstKind::GetElementPointer { ptr, indices, .. } if matches!(indices.as_slice(), [GepIndex::Const(0)]) => Some(ptr),
        _ => None,
    }
}

fn identity_compare_same_operand(ctx: &mut Context, op: CompareOp, ty: crate::ids::TypeId) -> Operand {
    let _ = ty;
    let i1 = ctx.int_type(1);
    let result = matches!(op, CompareOp::Eq | CompareOp::Le | CompareOp::Ge);
    Operand::Constant(ctx.const_int(i1, result as i128))
}

fn simplify_arithmetic(ctx: &mut Context, op: ArithmeticOp, lhs: Operand, rhs: Operand, ty: crate::ids::TypeId) -> Option<Operand> {
    if let (Some(a), Some(b)) = (as_int_const(ctx, lhs), as_int_const(ctx, rhs)) {
        let width = ctx.type_of(ty).bit_width().unwrap_or(64);
        let folded = fold_int(op, a, b, width)?;
        return Some(Operand::Constant(ctx.const_int(ty, folded)));
    }
    if op.is_float() {
        return None;
    }
    let zero = || Operand::Constant(ctx.const_int(ty, 0));
    match op {
        ArithmeticOp::Add | ArithmeticOp::Or | ArithmeticOp::Xor if as_int_const(ctx, rhs) == Some(0) => Some(lhs),
        ArithmeticOp::Add | ArithmeticOp::Or if as_int_const(ctx, lhs) == Some(0) => Some(rhs),
        ArithmeticOp::Sub if as_int_const(ctx, rhs) == Some(0) => Some(lhs),
        ArithmeticOp::Sub if lhs == rhs => Some(zero()),
        ArithmeticOp::Xor if lhs == rhs => Some(zero()),
        ArithmeticOp::And if lhs == rhs => Some(lhs),
        ArithmeticOp::Or if lhs == rhs => Some(lhs),
        ArithmeticOp::Mul if as_int_const(ctx, rhs) == Some(1) => Some(lhs),
        ArithmeticOp::Mul if as_int_const(ctx, lhs) == Some(1) => Some(rhs),
        ArithmeticOp::Mul if as_int_const(ctx, rhs) == Some(0) || as_int_const(ctx, lhs) == Some(0) => Some(zero()),
        ArithmeticOp::Shl | ArithmeticOp::LShr | ArithmeticOp::AShr if as_int_const(ctx, rhs) == Some(0) => Some(lhs),
        _ => None,
    }
}

/// Wrapping (two's-complement) integer constant folding, per spec §4.5
/// "signed overflow wraps".
fn fold_int(op: ArithmeticOp, a: i128, b: i128, width: u8) -> Option<i128> {
    let mask = if width >= 64 { u64::MAX as i128 } else { (1i128 << width) - 1 };
    let wrap = |v: i128| v & mask;
    let result = match op {
        ArithmeticOp::Add => wrap(a.wrapping_add(b)),
        ArithmeticOp::Sub => wrap(a.wrapping_sub(b)),
        ArithmeticOp::Mul => wrap(a.wrapping_mul(b)),
        ArithmeticOp::SDiv | ArithmeticOp::UDiv if b == 0 => return None,
        ArithmeticOp::SDiv => wrap(a.wrapping_div(b)),
        ArithmeticOp::UDiv => wrap((a as u128 / b as u128) as i128),
        ArithmeticOp::SRem if b == 0 => return None,
        ArithmeticOp::SRem => wrap(a.wrapping_rem(b)),
        ArithmeticOp::URem if b == 0 => return None,
        ArithmeticOp::URem => wrap((a as u128 % b as u128) as i128),
        ArithmeticOp::And => wrap(a & b),
        ArithmeticOp::Or => wrap(a | b),
        ArithmeticOp::Xor => wrap(a ^ b),
        ArithmeticOp::Shl if b >= width as i128 => return None,
        ArithmeticOp::Shl => wrap(a.wrapping_shl(b as u32)),
        ArithmeticOp::LShr | ArithmeticOp::AShr if b >= width as i128 => return None,
        ArithmeticOp::LShr => wrap(((a as u128) >> b as u32) as i128),
        ArithmeticOp::AShr => wrap(a.wrapping_shr(b as u32)),
        ArithmeticOp::FAdd | ArithmeticOp::FSub | ArithmeticOp::FMul | ArithmeticOp::FDiv => return None,
    };
    Some(result)
}

fn simplify_unary(func: &Function, op: UnaryArithmeticOp, operand: Operand) -> Option<Operand> {
    let Operand::Local(LocalValue::Inst(inner_id)) = operand else { return None };
    let InstKind::UnaryArithmetic { op: inner_op, operand: inner_operand } = &func.inst(inner_id).kind else { return None };
    match (op, inner_op) {
        (UnaryArithmeticOp::Neg, UnaryArithmeticOp::Neg) | (UnaryArithmeticOp::BNot, UnaryArithmeticOp::BNot) => Some(*inner_operand),
        _ => None,
    }
}

fn simplify_conversion(func: &Function, op: ConversionOp, operand: Operand, target_ty: crate::ids::TypeId) -> Option<Operand> {
    let source_ty = match operand {
        Operand::Local(lv) => func.value_type(lv),
        _ => return None,
    };
    match op {
        ConversionOp::Bitcast if source_ty == target_ty => Some(operand),
        ConversionOp::Zext | ConversionOp::Sext | ConversionOp::Trunc | ConversionOp::FloatTrunc | ConversionOp::FloatExt if source_ty == target_ty => Some(operand),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FunctionId;

    #[test]
    fn add_zero_is_removed() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let zero = ctx.const_int(i64_ty, 0);
        let add = f.append(entry, InstKind::Arithmetic { op: ArithmeticOp::Add, lhs: Operand::Local(LocalValue::Param(0)), rhs: Operand::Constant(zero) }, i64_ty, None);
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(add))) }, None, ctx.void_type());

        InstCombine.run(&mut ctx, &mut f);
        let InstKind::Return { value } = &f.inst(f.block(entry).terminator().unwrap()).kind else { panic!() };
        assert_eq!(*value, Some(Operand::Local(LocalValue::Param(0))));
    }

    #[test]
    fn constant_arithmetic_folds() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let mut f = Function::new(FunctionId::new(0), "f", vec![], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let a = ctx.const_int(i64_ty, 3);
        let b = ctx.const_int(i64_ty, 4);
        let add = f.append(entry, InstKind::Arithmetic { op: ArithmeticOp::Add, lhs: Operand::Constant(a), rhs: Operand::Constant(b) }, i64_ty, None);
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(add))) }, None, ctx.void_type());

        InstCombine.run(&mut ctx, &mut f);
        let InstKind::Return { value: Some(Operand::Constant(c)) } = &f.inst(f.block(entry).terminator().unwrap()).kind else { panic!() };
        assert_eq!(*ctx.constant(*c), Constant::Integral { ty: i64_ty, value: 7 });
    }
}
