//! Build-time instrumentation that memoizes annotated methods.
//!
//! Given an in-memory module whose methods carry cache annotations, the
//! weaving pass rewrites each eligible method so that it first asks the
//! annotation's provider for a previously stored result (returning it
//! immediately when present), and otherwise runs its original body,
//! stores the computed result, and returns through a single generated
//! epilogue. Cache storage, eviction, and keying belong entirely to the
//! provider named by the annotation.
//!
//! ```
//! use cacheweave::{ModuleWeaver, WeaverConfig};
//! # let mut module = cacheweave::Module::new("app.dll");
//! # cacheweave::runtime::install(&mut module);
//!
//! let config = WeaverConfig::default();
//! let report = ModuleWeaver::new(&config).execute(&mut module)?;
//! # assert_eq!(report.woven, 0);
//! # Ok::<(), cacheweave::WeavingError>(())
//! ```

pub mod body;
pub mod config;
pub mod discovery;
pub mod error;
pub mod eval;
pub mod il;
pub mod module;
pub mod resolve;
pub mod runtime;
pub mod types;
pub mod verify;
pub mod weave;

pub use body::{Local, MethodBody, ProtectedRegion};
pub use config::{DuplicatePolicy, WeaverConfig};
pub use discovery::{annotated_methods, WeaveTarget};
pub use error::{
    EvalError, Ineligibility, ResolutionError, VerifyError, WeavingError,
};
pub use eval::{CacheProvider, Evaluator, Value};
pub use il::{
    ArgumentIndex, GenericMethodInstantiation, InstrId, Instruction, LocalIndex, MethodSource,
    UserMethod,
};
pub use module::{
    Annotation, MethodDef, MethodIndex, MethodRef, MethodRefIndex, Module, TypeDef, TypeIndex,
    TypeRef, TypeRefIndex,
};
pub use resolve::Resolver;
pub use types::{CilType, MethodSignature, Parameter, UserType};
pub use weave::{MethodWeaver, ModuleWeaver, WeaveOutcome, WeaveReport};
