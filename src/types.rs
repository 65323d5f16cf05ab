//! The CIL-shaped type algebra: primitive base types, user types reached
//! through the module's definition and reference tables, and method
//! signatures with by-value / by-ref parameter modes.

use crate::module::{Module, TypeIndex, TypeRefIndex};

/// A user-defined type, addressed either directly (a definition in this
/// module) or through the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserType {
    Definition(TypeIndex),
    Reference(TypeRefIndex),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CilType {
    Boolean,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    IntPtr,
    Object,
    String,
    /// Single-dimensional, zero-based array.
    Vector(Box<CilType>),
    Class(UserType),
    /// A generic parameter of the enclosing operation, by position.
    MethodGeneric(usize),
}

impl CilType {
    pub fn class(user: UserType) -> Self {
        CilType::Class(user)
    }

    pub fn vector(element: CilType) -> Self {
        CilType::Vector(Box::new(element))
    }

    /// True for types whose values live behind an object reference, i.e.
    /// those whose absent-sentinel is null rather than zero.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            CilType::Object | CilType::String | CilType::Vector(_) | CilType::Class(_)
        )
    }

    /// Substitute method generic parameters with concrete arguments.
    pub fn instantiate(&self, method_args: &[CilType]) -> CilType {
        match self {
            CilType::MethodGeneric(i) => method_args
                .get(*i)
                .cloned()
                .unwrap_or(CilType::MethodGeneric(*i)),
            CilType::Vector(inner) => CilType::vector(inner.instantiate(method_args)),
            other => other.clone(),
        }
    }

    pub fn show(&self, module: &Module) -> String {
        match self {
            CilType::Boolean => "bool".into(),
            CilType::Char => "char".into(),
            CilType::Int8 => "int8".into(),
            CilType::UInt8 => "uint8".into(),
            CilType::Int16 => "int16".into(),
            CilType::UInt16 => "uint16".into(),
            CilType::Int32 => "int32".into(),
            CilType::UInt32 => "uint32".into(),
            CilType::Int64 => "int64".into(),
            CilType::UInt64 => "uint64".into(),
            CilType::Float32 => "float32".into(),
            CilType::Float64 => "float64".into(),
            CilType::IntPtr => "native int".into(),
            CilType::Object => "object".into(),
            CilType::String => "string".into(),
            CilType::Vector(inner) => format!("{}[]", inner.show(module)),
            CilType::Class(user) => module.type_full_name(*user),
            CilType::MethodGeneric(i) => format!("!!{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub ty: CilType,
    /// By-reference (or out) passing mode: the argument slot holds a
    /// managed pointer to the value rather than the value itself.
    pub by_ref: bool,
}

impl Parameter {
    pub fn value(ty: CilType) -> Self {
        Parameter { ty, by_ref: false }
    }

    pub fn by_ref(ty: CilType) -> Self {
        Parameter { ty, by_ref: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub instance: bool,
    pub parameters: Vec<Parameter>,
    /// None means void.
    pub return_type: Option<CilType>,
}

impl MethodSignature {
    pub fn static_member(return_type: Option<CilType>, parameters: Vec<Parameter>) -> Self {
        MethodSignature {
            instance: false,
            parameters,
            return_type,
        }
    }

    pub fn instance_member(return_type: Option<CilType>, parameters: Vec<Parameter>) -> Self {
        MethodSignature {
            instance: true,
            parameters,
            return_type,
        }
    }
}
