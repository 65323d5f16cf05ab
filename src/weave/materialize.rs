//! The annotation-instance materializer: the instruction group that, at
//! run time, recovers the executing method's own handle and the one
//! annotation instance of the target kind attached to it.
//!
//! The shape mirrors what a compiler would emit for
//!
//! ```text
//! method     = MethodBase.GetMethodFromHandle(<method token>, <declaring type token>)
//! annotation = (TKind)method.GetCustomAttributes(typeof(TKind), false)[0]
//! ```
//!
//! Element 0 is safe to take because discovery guarantees exactly one
//! annotation of the kind per rewrite.

use crate::il::{Instruction, MethodSource, UserMethod};
use crate::module::MethodRefIndex;
use crate::types::{CilType, UserType};

use super::context::RewriteContext;

fn call_ref(index: MethodRefIndex) -> MethodSource {
    MethodSource::User(UserMethod::Reference(index))
}

pub(crate) fn annotation_instance(ctx: &RewriteContext) -> Vec<Instruction> {
    vec![
        // method = GetMethodFromHandle(token, declaring-type token)
        Instruction::LoadTokenMethod(ctx.method),
        Instruction::LoadTokenType(CilType::class(UserType::Definition(ctx.declaring_type))),
        Instruction::Call(call_ref(ctx.ops.get_method_from_handle)),
        Instruction::StoreLocal(ctx.method_slot),
        // annotation = (TKind)method.GetCustomAttributes(typeof(TKind), false)[0]
        Instruction::LoadLocal(ctx.method_slot),
        Instruction::LoadTokenType(ctx.annotation_type.clone()),
        Instruction::Call(call_ref(ctx.ops.get_type_from_handle)),
        Instruction::LoadConstantInt32(0), // inherit: false
        Instruction::CallVirtual(call_ref(ctx.ops.get_custom_attributes)),
        Instruction::LoadConstantInt32(0),
        Instruction::LoadElement(CilType::Object),
        Instruction::CastClass(ctx.annotation_type.clone()),
        Instruction::StoreLocal(ctx.annotation_slot),
    ]
}
