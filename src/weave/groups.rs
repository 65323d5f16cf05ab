//! Instruction-group builders. Each function returns an ordered group
//! implementing one semantic step of the rewrite; none of them touch the
//! body. Placement happens in the engine, which controls the overall
//! insertion order.

use crate::il::{ArgumentIndex, InstrId, Instruction};
use crate::types::{CilType, MethodSignature};

use super::context::RewriteContext;

/// `new object[N]`, then one load/box/store round per formal parameter.
/// By-ref parameters contribute the value they point at on entry.
pub(crate) fn build_argument_array(
    signature: &MethodSignature,
    ctx: &RewriteContext,
) -> Vec<Instruction> {
    let mut group = vec![
        Instruction::LoadConstantInt32(signature.parameters.len() as i32),
        Instruction::NewArray(CilType::Object),
        Instruction::StoreLocal(ctx.args_slot),
    ];
    // slot 0 is the receiver for instance methods
    let this_offset = usize::from(signature.instance);
    for (position, parameter) in signature.parameters.iter().enumerate() {
        group.push(Instruction::LoadLocal(ctx.args_slot));
        group.push(Instruction::LoadConstantInt32(position as i32));
        group.push(Instruction::LoadArgument(ArgumentIndex(position + this_offset)));
        if parameter.by_ref {
            group.push(Instruction::LoadIndirect(parameter.ty.clone()));
        }
        group.push(Instruction::BoxValue(parameter.ty.clone()));
        group.push(Instruction::StoreElement(CilType::Object));
    }
    group
}

/// `fetched = annotation.Retrieve<T>(method, args)`
pub(crate) fn call_retrieve(ctx: &RewriteContext) -> Vec<Instruction> {
    vec![
        Instruction::LoadLocal(ctx.annotation_slot),
        Instruction::LoadLocal(ctx.method_slot),
        Instruction::LoadLocal(ctx.args_slot),
        Instruction::CallVirtual(ctx.ops.retrieve.clone()),
        Instruction::StoreLocal(ctx.retrieved_slot),
    ]
}

/// `annotation.Store<T>(result, method, args)`
pub(crate) fn call_store(ctx: &RewriteContext) -> Vec<Instruction> {
    vec![
        Instruction::LoadLocal(ctx.annotation_slot),
        Instruction::LoadLocal(ctx.retval_slot),
        Instruction::LoadLocal(ctx.method_slot),
        Instruction::LoadLocal(ctx.args_slot),
        Instruction::CallVirtual(ctx.ops.store.clone()),
    ]
}

/// The absent-sentinel constant for a retrieved value of type `ty`.
pub(crate) fn sentinel(ty: &CilType) -> Instruction {
    if ty.is_reference() {
        return Instruction::LoadNull;
    }
    match ty {
        CilType::Int64 | CilType::UInt64 => Instruction::LoadConstantInt64(0),
        CilType::Float32 => Instruction::LoadConstantFloat32(0.0),
        CilType::Float64 => Instruction::LoadConstantFloat64(0.0),
        _ => Instruction::LoadConstantInt32(0),
    }
}

/// Compare the retrieved value against the sentinel: fall into an
/// immediate return when a value was cached, branch to `resume` (the
/// first original instruction) otherwise.
pub(crate) fn early_return_if_present(
    ctx: &RewriteContext,
    return_type: &CilType,
    resume: InstrId,
) -> Vec<Instruction> {
    vec![
        Instruction::LoadLocal(ctx.retrieved_slot),
        sentinel(return_type),
        Instruction::CompareEqual,
        Instruction::BranchTruthy(resume),
        Instruction::LoadLocal(ctx.retrieved_slot),
        Instruction::Return,
    ]
}

/// Store the value the original body was about to return. The group's
/// first node is the epilogue entry every original return branches to.
pub(crate) fn capture_return_value(ctx: &RewriteContext) -> Vec<Instruction> {
    vec![Instruction::StoreLocal(ctx.retval_slot)]
}

/// The single canonical exit: reload the captured result and return.
pub(crate) fn epilogue(ctx: &RewriteContext) -> Vec<Instruction> {
    vec![
        Instruction::LoadLocal(ctx.retval_slot),
        Instruction::Return,
    ]
}
