//! Shared fixtures: a synthetic module seeded with the runtime types,
//! one concrete annotation kind, and a scripted provider that records
//! every capability call it receives.
#![allow(dead_code)] // not every suite uses every fixture

use std::cell::RefCell;
use std::rc::Rc;

use cacheweave::{
    Annotation, CacheProvider, MethodBody, MethodDef, MethodIndex, MethodSignature, Module,
    ModuleWeaver, TypeDef, TypeIndex, UserType, Value, WeaveReport, WeaverConfig, WeavingError,
};
use cacheweave::runtime::{self, RuntimeTypes};

pub struct TestModule {
    pub module: Module,
    pub runtime: RuntimeTypes,
    pub provider_type: TypeIndex,
    pub holder: TypeIndex,
}

pub fn test_module() -> TestModule {
    let mut module = Module::new("test.dll");
    let runtime = runtime::install(&mut module);
    let provider_type = add_annotation_kind(&mut module, runtime.marker, "TestCache");
    let holder = module.push_type_definition(TypeDef::new(None, "Holder"));
    TestModule {
        module,
        runtime,
        provider_type,
        holder,
    }
}

/// A concrete annotation kind deriving from the marker base.
pub fn add_annotation_kind(module: &mut Module, marker: TypeIndex, name: &str) -> TypeIndex {
    let mut kind = TypeDef::new(None, name);
    kind.extends = Some(UserType::Definition(marker));
    module.push_type_definition(kind)
}

/// Define a method on the holder type and annotate it with the default
/// annotation kind.
pub fn cached_method(
    fixture: &mut TestModule,
    name: &str,
    signature: MethodSignature,
    body: MethodBody,
) -> MethodIndex {
    let method = fixture.module.push_method(
        fixture.holder,
        MethodDef::new(name, signature, Some(body)),
    );
    fixture.module.annotate(
        method,
        Annotation {
            annotation_type: UserType::Definition(fixture.provider_type),
        },
    );
    method
}

pub fn weave_all(module: &mut Module) -> Result<WeaveReport, WeavingError> {
    let config = WeaverConfig::default();
    ModuleWeaver::new(&config).execute(module)
}

/// Records every retrieve/store; answers retrieves with a fixed value
/// (or "absent" when `fixed` is `None`).
#[derive(Default)]
pub struct ScriptedProvider {
    pub fixed: Option<Value>,
    pub retrieves: RefCell<Vec<Vec<Value>>>,
    pub stores: RefCell<Vec<(Value, Vec<Value>)>>,
}

impl ScriptedProvider {
    pub fn absent() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn always(value: Value) -> Rc<Self> {
        Rc::new(ScriptedProvider {
            fixed: Some(value),
            ..Self::default()
        })
    }
}

impl CacheProvider for ScriptedProvider {
    fn retrieve(&self, _method: MethodIndex, args: &[Value]) -> Option<Value> {
        self.retrieves.borrow_mut().push(args.to_vec());
        self.fixed.clone()
    }

    fn store(&self, value: Value, _method: MethodIndex, args: &[Value]) {
        self.stores.borrow_mut().push((value, args.to_vec()));
    }
}
