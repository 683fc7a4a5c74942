//! Scalar replacement of aggregates: splits an aggregate `alloca` whose
//! only users are single-level `GetElementPointer`s (in turn only
//! load/store'd) into one scalar `alloca` per field/element, so `mem2reg`
//! can then promote each to a register (spec §4.5: "the preferred SSA
//! constructor").

use crate::context::Context;
use crate::ids::{BlockId, InstId, LocalValue, Operand, TypeId};
use crate::instruction::{GepIndex, InstKind};
use crate::module::Function;
use crate::pass::{FunctionPass, PassCategory};
use crate::types::Type;
use hashbrown::HashMap;

pub struct Sroa;

impl FunctionPass for Sroa {
    fn name(&self) -> &'static str {
        "sroa"
    }

    fn category(&self) -> PassCategory {
        PassCategory::Optimization
    }

    fn run(&self, ctx: &mut Context, func: &mut Function) -> bool {
        let Some(entry) = func.entry_block() else { return false };
        let candidates: Vec<InstId> = func
            .insts_in(entry)
            .filter(|i| matches!(&i.kind, InstKind::Alloca { allocated_ty } if is_aggregate(ctx, *allocated_ty)))
            .map(|i| i.id)
            .collect();
        let mut changed = false;
        for alloca in candidates {
            if let Some(geps) = analyze(ctx, func, alloca) {
                split(ctx, func, alloca, geps);
                changed = true;
            }
        }
        changed
    }
}

fn is_aggregate(ctx: &Context, ty: TypeId) -> bool {
    matches!(ctx.type_of(ty), Type::Struct(_) | Type::Array { .. })
}

fn field_type(ctx: &Context, base_ty: TypeId, index: u64) -> TypeId {
    match ctx.type_of(base_ty) {
        Type::Struct(sid) => ctx.struct_layout(*sid).members[index as usize],
        Type::Array { element, .. } => *element,
        _ => unreachable!("is_aggregate guards this"),
    }
}

/// Returns the set of `GetElementPointer` instructions indexing the alloca
/// directly, if every use of the alloca and every use of those GEPs is
/// shallow enough to split. Any other use pattern (nested GEP, the pointer
/// escaping as a call argument or a stored value) aborts the split.
fn analyze(ctx: &Context, func: &Function, alloca: InstId) -> Option<Vec<InstId>> {
    let mut geps = Vec::new();
    for user in func.users_of(LocalValue::Inst(alloca)) {
        let InstKind::GetElementPointer { indices, .. } = &func.inst(user).kind else { return None };
        let [GepIndex::Const(_)] = indices.as_slice() else { return None };
        for gep_user in func.users_of(LocalValue::Inst(user)) {
            match &func.inst(gep_user).kind {
                InstKind::Load { ptr, .. } if *ptr == Operand::Local(LocalValue::Inst(user)) => {}
                InstKind::Store { ptr, value } if *ptr == Operand::Local(LocalValue::Inst(user)) && *value != Operand::Local(LocalValue::Inst(user)) => {}
                _ => return None,
            }
        }
        geps.push(user);
    }
    let _ = ctx;
    Some(geps)
}

fn split(ctx: &mut Context, func: &mut Function, alloca: InstId, geps: Vec<InstId>) {
    let allocated_ty = match &func.inst(alloca).kind {
        InstKind::Alloca { allocated_ty } => *allocated_ty,
        _ => unreachable!(),
    };
    let entry = func.inst(alloca).block;
    let ptr_ty = ctx.ptr_type();
    let mut field_allocas: HashMap<i64, InstId> = HashMap::new();
    let insertion_point = func.block(entry).insts.first().copied();

    for gep in geps {
        let InstKind::GetElementPointer { indices, .. } = func.inst(gep).kind.clone() else { unreachable!() };
        let [GepIndex::Const(index)] = indices.as_slice() else { unreachable!() };
        let field_ty = field_type(ctx, allocated_ty, *index as u64);
        let field_alloca = *field_allocas.entry(*index).or_insert_with(|| match insertion_point {
            Some(before) => func.insert_before(before, InstKind::Alloca { allocated_ty: field_ty }, ptr_ty, None),
            None => func.append(entry, InstKind::Alloca { allocated_ty: field_ty }, ptr_ty, None),
        });
        func.replace_all_uses_with(LocalValue::Inst(gep), Operand::Local(LocalValue::Inst(field_alloca)));
        func.remove(gep);
    }
    func.remove(alloca);
    let _: Option<BlockId> = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FunctionId;

    #[test]
    fn struct_alloca_splits_into_per_member_allocas() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_type(64);
        let ptr_ty = ctx.ptr_type();
        let struct_ty = ctx.struct_type(Some("Pair".into()), vec![i64_ty, i64_ty]);
        let mut f = Function::new(FunctionId::new(0), "f", vec![i64_ty], i64_ty);
        let entry = f.new_block(Some("entry".into()));
        let slot = f.append(entry, InstKind::Alloca { allocated_ty: struct_ty }, ptr_ty, Some("pair".into()));
        let gep0 = f.append(entry, InstKind::GetElementPointer { ptr: Operand::Local(LocalValue::Inst(slot)), base_ty: struct_ty, indices: vec![GepIndex::Const(0)] }, ptr_ty, None);
        f.append(entry, InstKind::Store { ptr: Operand::Local(LocalValue::Inst(gep0)), value: Operand::Local(LocalValue::Param(0)) }, ctx.void_type(), None);
        let gep1 = f.append(entry, InstKind::GetElementPointer { ptr: Operand::Local(LocalValue::Inst(slot)), base_ty: struct_ty, indices: vec![GepIndex::Const(1)] }, ptr_ty, None);
        let load1 = f.append(entry, InstKind::Load { ptr: Operand::Local(LocalValue::Inst(gep1)), loaded_ty: i64_ty }, i64_ty, None);
        f.set_terminator(entry, InstKind::Return { value: Some(Operand::Local(LocalValue::Inst(load1))) }, None, ctx.void_type());

        let changed = Sroa.run(&mut ctx, &mut f);
        assert!(changed);
        let alloca_count = f.insts_in(entry).filter(|i| matches!(i.kind, InstKind::Alloca { .. })).count();
        assert_eq!(alloca_count, 2);
        assert!(f.insts_in(entry).all(|i| !matches!(i.kind, InstKind::GetElementPointer { .. })));
    }
}
