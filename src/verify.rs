//! Structural verification of a method body: every branch lands on a
//! placed node, evaluation stack depth is consistent along all paths and
//! at every join point, and control cannot fall off the end. Returns the
//! maximum stack depth so finalization can record it.

use std::collections::HashMap;

use crate::body::MethodBody;
use crate::error::VerifyError;
use crate::il::{Instruction, MethodSource, UserMethod};
use crate::module::Module;
use crate::types::MethodSignature;

fn callee_signature<'m>(module: &'m Module, source: &MethodSource) -> &'m MethodSignature {
    match source.user_method() {
        UserMethod::Definition(index) => &module[index].signature,
        UserMethod::Reference(index) => &module[index].signature,
    }
}

/// (pops, pushes) of one instruction. Compact forms behave like their
/// canonical expansion.
fn stack_effect(module: &Module, instruction: &Instruction) -> (usize, usize) {
    use Instruction::*;
    match &instruction.normalized() {
        Nop | Branch(_) => (0, 0),
        LoadConstantInt32(_) | LoadConstantInt64(_) | LoadConstantFloat32(_)
        | LoadConstantFloat64(_) | LoadConstantString(_) | LoadNull => (0, 1),
        LoadLocal(_) | LoadArgument(_) => (0, 1),
        LoadTokenMethod(_) | LoadTokenType(_) => (0, 1),
        StoreLocal(_) | Pop => (1, 0),
        Duplicate => (1, 2),
        Add | Subtract | Multiply | CompareEqual => (2, 1),
        BranchTruthy(_) | BranchFalsy(_) => (1, 0),
        Throw => (1, 0),
        NewArray(_) | LoadIndirect(_) | BoxValue(_) | CastClass(_) => (1, 1),
        LoadElement(_) => (2, 1),
        StoreElement(_) => (3, 0),
        Call(source) | CallVirtual(source) => {
            let signature = callee_signature(module, source);
            let pops = signature.parameters.len() + usize::from(signature.instance);
            (pops, usize::from(signature.return_type.is_some()))
        }
        Return => (0, 0), // handled separately, depends on the return type
        // normalized() leaves no compact form behind
        _ => unreachable!("compact form after normalization"),
    }
}

/// Simulate stack depths over all reachable paths of `body`. `signature`
/// is the owning method's, used to decide how many values a return
/// consumes.
pub fn verify(
    module: &Module,
    body: &MethodBody,
    signature: &MethodSignature,
) -> Result<usize, VerifyError> {
    let placed: Vec<_> = body.iter().collect();
    if placed.is_empty() {
        return Err(VerifyError::FallsOffEnd);
    }
    let positions: HashMap<_, _> = placed
        .iter()
        .enumerate()
        .map(|(position, (id, _))| (*id, position))
        .collect();

    let return_depth = usize::from(signature.return_type.is_some());
    let mut depths: Vec<Option<usize>> = vec![None; placed.len()];
    let mut worklist = vec![(0usize, 0usize)];
    for region in &body.protected_regions {
        // the handler entry sees the exception object
        if let Some(&handler) = positions.get(&region.handler_start) {
            worklist.push((handler, 1));
        }
    }

    let mut max_depth = 0;
    while let Some((position, depth)) = worklist.pop() {
        match depths[position] {
            Some(existing) if existing == depth => continue,
            Some(existing) => {
                return Err(VerifyError::DepthMismatch {
                    at: position,
                    found: depth,
                    expected: existing,
                });
            }
            None => depths[position] = Some(depth),
        }

        let (_, instruction) = placed[position];
        if instruction.is_return() {
            if depth != return_depth {
                if depth < return_depth {
                    return Err(VerifyError::EmptyReturn);
                }
                return Err(VerifyError::DepthMismatch {
                    at: position,
                    found: depth,
                    expected: return_depth,
                });
            }
            continue;
        }

        let (pops, pushes) = stack_effect(module, instruction);
        if depth < pops {
            return Err(VerifyError::Underflow { at: position });
        }
        let next_depth = depth - pops + pushes;
        max_depth = max_depth.max(next_depth);

        if let Some(target) = instruction.branch_target() {
            let target_position = *positions
                .get(&target)
                .ok_or(VerifyError::DanglingBranch { at: position })?;
            worklist.push((target_position, next_depth));
        }
        if !instruction.ends_flow() {
            if position + 1 == placed.len() {
                return Err(VerifyError::FallsOffEnd);
            }
            worklist.push((position + 1, next_depth));
        }
    }

    Ok(max_depth.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{InstrId, Instruction};
    use crate::types::CilType;

    fn empty_module() -> Module {
        Module::new("test.dll")
    }

    fn int_signature() -> MethodSignature {
        MethodSignature::static_member(Some(CilType::Int32), vec![])
    }

    #[test]
    fn balanced_body_reports_max_depth() {
        let body = MethodBody::new(vec![
            Instruction::LoadConstantInt32(2),
            Instruction::LoadConstantInt32(3),
            Instruction::Add,
            Instruction::Return,
        ]);
        let max = verify(&empty_module(), &body, &int_signature()).unwrap();
        assert_eq!(max, 2);
    }

    #[test]
    fn underflow_is_caught() {
        let body = MethodBody::new(vec![Instruction::Add, Instruction::Return]);
        let err = verify(&empty_module(), &body, &int_signature()).unwrap_err();
        assert_eq!(err, VerifyError::Underflow { at: 0 });
    }

    #[test]
    fn returning_without_a_value_is_caught() {
        let body = MethodBody::new(vec![Instruction::Return]);
        let err = verify(&empty_module(), &body, &int_signature()).unwrap_err();
        assert_eq!(err, VerifyError::EmptyReturn);
    }

    #[test]
    fn fallthrough_off_the_end_is_caught() {
        let body = MethodBody::new(vec![Instruction::LoadConstantInt32(1)]);
        let err = verify(&empty_module(), &body, &int_signature()).unwrap_err();
        assert_eq!(err, VerifyError::FallsOffEnd);
    }

    #[test]
    fn dangling_branch_is_caught() {
        let body = MethodBody::new(vec![
            Instruction::Branch(InstrId(99)),
            Instruction::LoadConstantInt32(1),
            Instruction::Return,
        ]);
        let err = verify(&empty_module(), &body, &int_signature()).unwrap_err();
        assert_eq!(err, VerifyError::DanglingBranch { at: 0 });
    }

    #[test]
    fn join_points_must_agree_on_depth() {
        // brfalse -> target with depth 1 on one path, 0 on the other
        let body = MethodBody::new(vec![
            Instruction::LoadConstantInt32(1),
            Instruction::BranchFalsy(InstrId(3)),
            Instruction::LoadConstantInt32(7),
            Instruction::Return,
        ]);
        // fallthrough reaches 3 with depth 1; branch reaches it with 0
        let err = verify(&empty_module(), &body, &int_signature()).unwrap_err();
        assert!(matches!(err, VerifyError::DepthMismatch { .. } | VerifyError::EmptyReturn));
    }
}
