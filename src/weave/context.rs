//! Per-rewrite state. Resolution happens first and touches only the
//! module's reference table; slot allocation happens after the body is
//! normalized. Both live for one (method, annotation) rewrite and are
//! discarded afterwards, so the engine itself carries no state between
//! methods.

use crate::body::MethodBody;
use crate::discovery::WeaveTarget;
use crate::error::WeavingError;
use crate::il::{LocalIndex, MethodSource};
use crate::module::{MethodIndex, MethodRefIndex, Module, TypeIndex};
use crate::resolve::Resolver;
use crate::runtime;
use crate::types::{CilType, UserType};

/// Operation and type references the woven prologue calls into, resolved
/// before any body mutation.
pub(crate) struct ResolvedOps {
    pub get_method_from_handle: MethodRefIndex,
    pub get_type_from_handle: MethodRefIndex,
    pub get_custom_attributes: MethodRefIndex,
    pub method_base: UserType,
    /// `Retrieve` instantiated with the method's return type.
    pub retrieve: MethodSource,
    /// `Store` instantiated with the method's return type.
    pub store: MethodSource,
}

impl ResolvedOps {
    pub fn resolve(
        module: &mut Module,
        target: &WeaveTarget,
        return_type: &CilType,
    ) -> Result<Self, WeavingError> {
        let mut resolver = Resolver::new(module);

        let get_method_from_handle = resolver.method_on(runtime::METHOD_BASE, |m| {
            m.name == runtime::GET_METHOD_FROM_HANDLE && m.signature.parameters.len() == 2
        })?;
        let get_custom_attributes = resolver.method_on(runtime::MEMBER_INFO, |m| {
            m.name == runtime::GET_CUSTOM_ATTRIBUTES && m.signature.parameters.len() == 2
        })?;
        let get_type_from_handle =
            resolver.method_on(runtime::TYPE, |m| m.name == runtime::GET_TYPE_FROM_HANDLE)?;
        let method_base = resolver.type_ref(runtime::METHOD_BASE)?;

        let retrieve_base = resolver.method_ref(target.annotation.annotation_type, |m| {
            m.name == runtime::RETRIEVE
        })?;
        let store_base = resolver.method_ref(target.annotation.annotation_type, |m| {
            m.name == runtime::STORE
        })?;
        let retrieve = resolver.make_generic(retrieve_base, vec![return_type.clone()])?;
        let store = resolver.make_generic(store_base, vec![return_type.clone()])?;

        Ok(ResolvedOps {
            get_method_from_handle,
            get_type_from_handle,
            get_custom_attributes,
            method_base,
            retrieve,
            store,
        })
    }
}

pub(crate) struct RewriteContext {
    pub method: MethodIndex,
    pub declaring_type: TypeIndex,
    /// The annotation type as an instruction operand (token, cast).
    pub annotation_type: CilType,
    pub ops: ResolvedOps,

    pub method_slot: LocalIndex,
    pub annotation_slot: LocalIndex,
    pub args_slot: LocalIndex,
    pub retrieved_slot: LocalIndex,
    pub retval_slot: LocalIndex,
}

impl RewriteContext {
    /// Allocate the five context slots on an already-normalized body.
    pub fn allocate(
        body: &mut MethodBody,
        ops: ResolvedOps,
        target: &WeaveTarget,
        return_type: &CilType,
    ) -> Self {
        let annotation_type = CilType::class(target.annotation.annotation_type);
        let method_slot = body.add_local(CilType::class(ops.method_base), Some("__cache$method"));
        let annotation_slot = body.add_local(annotation_type.clone(), Some("__cache$annotation"));
        let args_slot = body.add_local(CilType::vector(CilType::Object), Some("__cache$args"));
        let retrieved_slot = body.add_local(return_type.clone(), Some("__cache$fetched"));
        let retval_slot = body.add_local(return_type.clone(), Some("__cache$result"));

        RewriteContext {
            method: target.method,
            declaring_type: target.declaring_type,
            annotation_type,
            ops,
            method_slot,
            annotation_slot,
            args_slot,
            retrieved_slot,
            retval_slot,
        }
    }
}
