//! The in-memory module model: type and method definitions plus the
//! reference table that resolved operation and type references are
//! imported into. The module is owned exclusively by the weaving pass
//! and mutated in place.

use std::collections::HashSet;
use std::ops::{Index, IndexMut};

use crate::body::MethodBody;
use crate::error::ResolutionError;
use crate::types::{MethodSignature, UserType};

macro_rules! index_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl $name {
            pub fn as_usize(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_newtype!(
    /// Handle to a type definition in a [`Module`].
    TypeIndex
);
index_newtype!(
    /// Handle to a method definition in a [`Module`].
    MethodIndex
);
index_newtype!(
    /// Handle to an entry in a module's type reference table.
    TypeRefIndex
);
index_newtype!(
    /// Handle to an entry in a module's method reference table.
    MethodRefIndex
);

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub namespace: Option<String>,
    pub name: String,
    pub extends: Option<UserType>,
    pub is_abstract: bool,
    /// Methods declared by this type, in declaration order.
    pub methods: Vec<MethodIndex>,
}

impl TypeDef {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        TypeDef {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            extends: None,
            is_abstract: false,
            methods: vec![],
        }
    }

    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Declarative metadata attached to a method, naming the provider type
/// that owns the cache for its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    pub annotation_type: UserType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub parent: TypeIndex,
    pub name: String,
    pub signature: MethodSignature,
    /// Names of the method's generic parameters; empty for non-generic
    /// operations.
    pub generic_parameters: Vec<String>,
    pub body: Option<MethodBody>,
    pub annotations: Vec<Annotation>,
}

impl MethodDef {
    pub fn new(name: &str, signature: MethodSignature, body: Option<MethodBody>) -> Self {
        MethodDef {
            parent: TypeIndex(0), // fixed up by push_method
            name: name.to_string(),
            signature,
            generic_parameters: vec![],
            body,
            annotations: vec![],
        }
    }

    pub fn with_generics(mut self, names: &[&str]) -> Self {
        self.generic_parameters = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self.name.as_str(), ".ctor" | ".cctor")
    }
}

/// An entry in the type reference table. In this single-module universe
/// references resolve against the module's own definitions by full name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub namespace: Option<String>,
    pub name: String,
}

impl TypeRef {
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// An entry in the method reference table: a callable reference to an
/// operation declared on `parent`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub parent: TypeIndex,
    pub name: String,
    pub signature: MethodSignature,
    pub generic_arity: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    type_refs: Vec<TypeRef>,
    method_refs: Vec<MethodRef>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            types: vec![],
            methods: vec![],
            type_refs: vec![],
            method_refs: vec![],
        }
    }

    pub fn push_type_definition(&mut self, ty: TypeDef) -> TypeIndex {
        self.types.push(ty);
        TypeIndex(self.types.len() - 1)
    }

    pub fn push_method(&mut self, parent: TypeIndex, mut method: MethodDef) -> MethodIndex {
        method.parent = parent;
        self.methods.push(method);
        let index = MethodIndex(self.methods.len() - 1);
        self.types[parent.0].methods.push(index);
        index
    }

    /// Import a type reference. Repeated identical imports return the
    /// existing entry, so imports are idempotent; the linear scan keeps
    /// table order deterministic.
    pub fn push_type_reference(&mut self, type_ref: TypeRef) -> TypeRefIndex {
        if let Some(i) = self.type_refs.iter().position(|r| *r == type_ref) {
            return TypeRefIndex(i);
        }
        self.type_refs.push(type_ref);
        TypeRefIndex(self.type_refs.len() - 1)
    }

    /// Import a method reference, deduplicating like [`Self::push_type_reference`].
    pub fn push_method_reference(&mut self, method_ref: MethodRef) -> MethodRefIndex {
        if let Some(i) = self.method_refs.iter().position(|r| *r == method_ref) {
            return MethodRefIndex(i);
        }
        self.method_refs.push(method_ref);
        MethodRefIndex(self.method_refs.len() - 1)
    }

    pub fn annotate(&mut self, method: MethodIndex, annotation: Annotation) {
        self.methods[method.0].annotations.push(annotation);
    }

    pub fn type_definitions(&self) -> impl Iterator<Item = (TypeIndex, &TypeDef)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeIndex(i), t))
    }

    pub fn method_definitions(&self) -> impl Iterator<Item = (MethodIndex, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodIndex(i), m))
    }

    pub fn type_ref_count(&self) -> usize {
        self.type_refs.len()
    }

    pub fn method_ref_count(&self) -> usize {
        self.method_refs.len()
    }

    pub fn find_type(&self, full_name: &str) -> Option<TypeIndex> {
        self.types
            .iter()
            .position(|t| t.full_name() == full_name)
            .map(TypeIndex)
    }

    /// Resolve a user type down to its definition in this module.
    pub fn definition_of(&self, user: UserType) -> Result<TypeIndex, ResolutionError> {
        match user {
            UserType::Definition(index) => Ok(index),
            UserType::Reference(index) => {
                let full_name = self[index].full_name();
                self.find_type(&full_name)
                    .ok_or(ResolutionError::TypeNotFound(full_name))
            }
        }
    }

    pub fn type_full_name(&self, user: UserType) -> String {
        match user {
            UserType::Definition(index) => self[index].full_name(),
            UserType::Reference(index) => self[index].full_name(),
        }
    }

    pub fn method_full_name(&self, method: MethodIndex) -> String {
        let def = &self[method];
        format!("{}::{}", self[def.parent].full_name(), def.name)
    }

    /// Walk the ancestor chain starting at (and including) `ty`. Cyclic
    /// `extends` chains terminate instead of looping.
    pub fn ancestors(&self, ty: TypeIndex) -> impl Iterator<Item = TypeIndex> + '_ {
        let mut seen = HashSet::new();
        let mut current = Some(ty);
        std::iter::from_fn(move || {
            let next = current?;
            if !seen.insert(next) {
                return None;
            }
            current = self[next]
                .extends
                .and_then(|base| self.definition_of(base).ok());
            Some(next)
        })
    }

    pub fn derives_from(&self, ty: TypeIndex, base: TypeIndex) -> bool {
        self.ancestors(ty).any(|ancestor| ancestor == base)
    }
}

impl Index<TypeIndex> for Module {
    type Output = TypeDef;
    fn index(&self, index: TypeIndex) -> &TypeDef {
        &self.types[index.0]
    }
}

impl IndexMut<TypeIndex> for Module {
    fn index_mut(&mut self, index: TypeIndex) -> &mut TypeDef {
        &mut self.types[index.0]
    }
}

impl Index<MethodIndex> for Module {
    type Output = MethodDef;
    fn index(&self, index: MethodIndex) -> &MethodDef {
        &self.methods[index.0]
    }
}

impl IndexMut<MethodIndex> for Module {
    fn index_mut(&mut self, index: MethodIndex) -> &mut MethodDef {
        &mut self.methods[index.0]
    }
}

impl Index<TypeRefIndex> for Module {
    type Output = TypeRef;
    fn index(&self, index: TypeRefIndex) -> &TypeRef {
        &self.type_refs[index.0]
    }
}

impl Index<MethodRefIndex> for Module {
    type Output = MethodRef;
    fn index(&self, index: MethodRefIndex) -> &MethodRef {
        &self.method_refs[index.0]
    }
}
