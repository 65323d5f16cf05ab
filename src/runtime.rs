//! Well-known runtime types: the reflection surface the materialized
//! prologue calls into, and the marker base every cache annotation type
//! derives from. Hosts weave real modules that already carry these
//! definitions; [`install`] seeds them into synthetic modules.

use crate::module::{MethodDef, Module, TypeDef, TypeIndex};
use crate::types::{CilType, MethodSignature, Parameter, UserType};

pub const OBJECT: &str = "System.Object";
pub const ATTRIBUTE: &str = "System.Attribute";
pub const TYPE: &str = "System.Type";
pub const MEMBER_INFO: &str = "System.Reflection.MemberInfo";
pub const METHOD_BASE: &str = "System.Reflection.MethodBase";

/// Full name of the marker base type. Concrete provider types derive
/// from it and override the capability pair.
pub const MARKER: &str = "Cacheweave.CacheResultAttribute";

/// The capability pair every provider type exposes.
pub const RETRIEVE: &str = "Retrieve";
pub const STORE: &str = "Store";

pub const GET_METHOD_FROM_HANDLE: &str = "GetMethodFromHandle";
pub const GET_TYPE_FROM_HANDLE: &str = "GetTypeFromHandle";
pub const GET_CUSTOM_ATTRIBUTES: &str = "GetCustomAttributes";

#[derive(Debug, Clone, Copy)]
pub struct RuntimeTypes {
    pub object: TypeIndex,
    pub attribute: TypeIndex,
    pub reflection_type: TypeIndex,
    pub member_info: TypeIndex,
    pub method_base: TypeIndex,
    pub marker: TypeIndex,
}

/// Seed the reflection types and the marker base into `module`.
/// Runtime handles (method and type tokens) are modeled as native ints.
pub fn install(module: &mut Module) -> RuntimeTypes {
    let object = module.push_type_definition(TypeDef::new(Some("System"), "Object"));

    let mut attribute = TypeDef::new(Some("System"), "Attribute");
    attribute.extends = Some(UserType::Definition(object));
    attribute.is_abstract = true;
    let attribute = module.push_type_definition(attribute);

    let mut reflection_type = TypeDef::new(Some("System"), "Type");
    reflection_type.extends = Some(UserType::Definition(object));
    let reflection_type = module.push_type_definition(reflection_type);
    module.push_method(
        reflection_type,
        MethodDef::new(
            GET_TYPE_FROM_HANDLE,
            MethodSignature::static_member(
                Some(CilType::class(UserType::Definition(reflection_type))),
                vec![Parameter::value(CilType::IntPtr)],
            ),
            None,
        ),
    );

    let mut member_info = TypeDef::new(Some("System.Reflection"), "MemberInfo");
    member_info.extends = Some(UserType::Definition(object));
    member_info.is_abstract = true;
    let member_info = module.push_type_definition(member_info);
    module.push_method(
        member_info,
        MethodDef::new(
            GET_CUSTOM_ATTRIBUTES,
            MethodSignature::instance_member(
                Some(CilType::vector(CilType::Object)),
                vec![
                    Parameter::value(CilType::class(UserType::Definition(reflection_type))),
                    Parameter::value(CilType::Boolean),
                ],
            ),
            None,
        ),
    );

    let mut method_base = TypeDef::new(Some("System.Reflection"), "MethodBase");
    method_base.extends = Some(UserType::Definition(member_info));
    method_base.is_abstract = true;
    let method_base = module.push_type_definition(method_base);
    module.push_method(
        method_base,
        MethodDef::new(
            GET_METHOD_FROM_HANDLE,
            MethodSignature::static_member(
                Some(CilType::class(UserType::Definition(method_base))),
                vec![
                    Parameter::value(CilType::IntPtr),
                    Parameter::value(CilType::IntPtr),
                ],
            ),
            None,
        ),
    );

    let mut marker = TypeDef::new(Some("Cacheweave"), "CacheResultAttribute");
    marker.extends = Some(UserType::Definition(attribute));
    marker.is_abstract = true;
    let marker = module.push_type_definition(marker);
    module.push_method(
        marker,
        MethodDef::new(
            RETRIEVE,
            MethodSignature::instance_member(
                Some(CilType::MethodGeneric(0)),
                vec![
                    Parameter::value(CilType::class(UserType::Definition(method_base))),
                    Parameter::value(CilType::vector(CilType::Object)),
                ],
            ),
            None,
        )
        .with_generics(&["T"]),
    );
    module.push_method(
        marker,
        MethodDef::new(
            STORE,
            MethodSignature::instance_member(
                None,
                vec![
                    Parameter::value(CilType::MethodGeneric(0)),
                    Parameter::value(CilType::class(UserType::Definition(method_base))),
                    Parameter::value(CilType::vector(CilType::Object)),
                ],
            ),
            None,
        )
        .with_generics(&["T"]),
    );

    RuntimeTypes {
        object,
        attribute,
        reflection_type,
        member_info,
        method_base,
        marker,
    }
}
