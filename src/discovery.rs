//! Worklist discovery: find every method carrying an annotation whose
//! type derives from the marker base, yielding one weave target per
//! (method, annotation) pair. A method may carry several *different*
//! annotation kinds and is rewritten once per kind; duplicates of the
//! same kind are resolved here, at discovery time, so the rewrite can
//! rely on there being exactly one instance of the kind it materializes.

use tracing::warn;

use crate::config::DuplicatePolicy;
use crate::error::WeavingError;
use crate::module::{Annotation, MethodIndex, Module, TypeIndex};

#[derive(Debug, Clone, Copy)]
pub struct WeaveTarget {
    pub declaring_type: TypeIndex,
    pub method: MethodIndex,
    pub annotation: Annotation,
}

/// Scan `module` for methods annotated with a concrete type deriving
/// from `marker`. Targets come back in module declaration order, which
/// keeps repeated passes over the same module identical.
pub fn annotated_methods(
    module: &Module,
    marker: TypeIndex,
    policy: DuplicatePolicy,
) -> Result<Vec<WeaveTarget>, WeavingError> {
    let mut targets = vec![];
    for (index, method) in module.method_definitions() {
        if method.body.is_none() {
            continue;
        }
        let mut kinds_seen: Vec<TypeIndex> = vec![];
        for annotation in &method.annotations {
            let Ok(kind) = module.definition_of(annotation.annotation_type) else {
                continue;
            };
            if module[kind].is_abstract || !module.derives_from(kind, marker) {
                continue;
            }
            if kinds_seen.contains(&kind) {
                let count = method
                    .annotations
                    .iter()
                    .filter(|a| module.definition_of(a.annotation_type) == Ok(kind))
                    .count();
                match policy {
                    DuplicatePolicy::Reject => {
                        return Err(WeavingError::DuplicateAnnotation {
                            method: module.method_full_name(index),
                            annotation: module[kind].full_name(),
                            count,
                        });
                    }
                    DuplicatePolicy::FirstWins => {
                        warn!(
                            method = %module.method_full_name(index),
                            annotation = %module[kind].full_name(),
                            "ignoring duplicate annotation"
                        );
                        continue;
                    }
                }
            }
            kinds_seen.push(kind);
            targets.push(WeaveTarget {
                declaring_type: method.parent,
                method: index,
                annotation: *annotation,
            });
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::MethodBody;
    use crate::il::Instruction;
    use crate::module::{MethodDef, TypeDef};
    use crate::runtime;
    use crate::types::{CilType, MethodSignature, UserType};

    fn module_with_annotated_method(annotations: usize) -> (Module, TypeIndex) {
        let mut module = Module::new("test.dll");
        let rt = runtime::install(&mut module);

        let mut provider = TypeDef::new(None, "TestCache");
        provider.extends = Some(UserType::Definition(rt.marker));
        let provider = module.push_type_definition(provider);

        let holder = module.push_type_definition(TypeDef::new(None, "Holder"));
        let body = MethodBody::new(vec![
            Instruction::LoadConstantInt32(1),
            Instruction::Return,
        ]);
        let method = module.push_method(
            holder,
            MethodDef::new(
                "Compute",
                MethodSignature::static_member(Some(CilType::Int32), vec![]),
                Some(body),
            ),
        );
        for _ in 0..annotations {
            module.annotate(
                method,
                Annotation {
                    annotation_type: UserType::Definition(provider),
                },
            );
        }
        (module, rt.marker)
    }

    #[test]
    fn finds_single_annotated_method() {
        let (module, marker) = module_with_annotated_method(1);
        let targets = annotated_methods(&module, marker, DuplicatePolicy::Reject).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(module.method_full_name(targets[0].method), "Holder::Compute");
    }

    #[test]
    fn duplicate_annotations_are_rejected() {
        let (module, marker) = module_with_annotated_method(2);
        let err = annotated_methods(&module, marker, DuplicatePolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            WeavingError::DuplicateAnnotation { count: 2, .. }
        ));
    }

    #[test]
    fn first_wins_keeps_one_target() {
        let (module, marker) = module_with_annotated_method(3);
        let targets = annotated_methods(&module, marker, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn bodyless_methods_are_not_discovered() {
        let (mut module, marker) = module_with_annotated_method(1);
        let abstract_holder = module.push_type_definition(TypeDef::new(None, "Abstract"));
        let provider = module.find_type("TestCache").unwrap();
        let bodyless = module.push_method(
            abstract_holder,
            MethodDef::new(
                "NoBody",
                MethodSignature::static_member(Some(CilType::Int32), vec![]),
                None,
            ),
        );
        module.annotate(
            bodyless,
            Annotation {
                annotation_type: UserType::Definition(provider),
            },
        );
        let targets = annotated_methods(&module, marker, DuplicatePolicy::Reject).unwrap();
        assert_eq!(targets.len(), 1);
    }
}
