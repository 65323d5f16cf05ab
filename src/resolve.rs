//! Reference resolution: predicate search for operations up a type's
//! ancestor chain, with matches imported into the module's reference
//! table. Resolution only ever touches the reference table, and imports
//! are idempotent, so a failed rewrite leaves no trace in method bodies.

use crate::error::ResolutionError;
use crate::il::{GenericMethodInstantiation, MethodSource, UserMethod};
use crate::module::{MethodDef, MethodRef, MethodRefIndex, Module, TypeIndex, TypeRef};
use crate::types::{CilType, UserType};

pub struct Resolver<'m> {
    module: &'m mut Module,
}

impl<'m> Resolver<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Resolver { module }
    }

    /// Import a type descriptor (its full name) for use in the current
    /// module.
    pub fn type_ref(&mut self, full_name: &str) -> Result<UserType, ResolutionError> {
        let index = self
            .module
            .find_type(full_name)
            .ok_or_else(|| ResolutionError::TypeNotFound(full_name.to_string()))?;
        let definition = &self.module[index];
        let type_ref = TypeRef {
            namespace: definition.namespace.clone(),
            name: definition.name.clone(),
        };
        Ok(UserType::Reference(self.module.push_type_reference(type_ref)))
    }

    /// Return a callable reference to the first operation matching
    /// `predicate`, searching `ty`'s own declarations and then each
    /// ancestor in turn.
    pub fn method_ref(
        &mut self,
        ty: UserType,
        predicate: impl Fn(&MethodDef) -> bool,
    ) -> Result<MethodRefIndex, ResolutionError> {
        let start = self.module.definition_of(ty)?;
        let chain: Vec<TypeIndex> = self.module.ancestors(start).collect();
        for ancestor in chain {
            let found = self.module[ancestor]
                .methods
                .iter()
                .copied()
                .find(|m| predicate(&self.module[*m]));
            if let Some(method) = found {
                let definition = &self.module[method];
                let method_ref = MethodRef {
                    parent: ancestor,
                    name: definition.name.clone(),
                    signature: definition.signature.clone(),
                    generic_arity: definition.generic_parameters.len(),
                };
                return Ok(self.module.push_method_reference(method_ref));
            }
        }
        Err(ResolutionError::ReferenceNotFound {
            ty: self.module.type_full_name(ty),
        })
    }

    /// [`Self::method_ref`] with the declaring type named by its full
    /// name instead of an already-imported handle.
    pub fn method_on(
        &mut self,
        type_full_name: &str,
        predicate: impl Fn(&MethodDef) -> bool,
    ) -> Result<MethodRefIndex, ResolutionError> {
        let ty = self.type_ref(type_full_name)?;
        self.method_ref(ty, predicate)
    }

    /// Instantiate a generic operation reference with concrete type
    /// arguments. A reference with no generic parameters is returned
    /// as-is when given no arguments.
    pub fn make_generic(
        &self,
        base: MethodRefIndex,
        parameters: Vec<CilType>,
    ) -> Result<MethodSource, ResolutionError> {
        let reference = &self.module[base];
        if reference.generic_arity != parameters.len() {
            return Err(ResolutionError::GenericArityMismatch {
                name: reference.name.clone(),
                expected: reference.generic_arity,
                actual: parameters.len(),
            });
        }
        if parameters.is_empty() {
            Ok(MethodSource::User(UserMethod::Reference(base)))
        } else {
            Ok(MethodSource::Generic(GenericMethodInstantiation {
                base: UserMethod::Reference(base),
                parameters,
            }))
        }
    }
}
