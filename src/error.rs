use thiserror::Error;

/// Why a method was skipped rather than woven. Not an error: ineligible
/// methods are left untouched by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    /// The method returns void, so there is no result to cache.
    VoidReturn,
    /// Constructors are never cached.
    Constructor,
    /// The body has no return instruction (abstract, or it always throws).
    NoReturnPath,
}

impl std::fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ineligibility::VoidReturn => write!(f, "returns void"),
            Ineligibility::Constructor => write!(f, "is a constructor"),
            Ineligibility::NoReturnPath => write!(f, "has no normal return path"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("no type definition named `{0}` in this module")]
    TypeNotFound(String),

    #[error("no operation matching the predicate on `{ty}` or any of its ancestors")]
    ReferenceNotFound { ty: String },

    #[error("operation `{name}` declares {expected} generic parameter(s), got {actual} argument(s)")]
    GenericArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerifyError {
    #[error("instruction {at} branches to a node outside the instruction stream")]
    DanglingBranch { at: usize },

    #[error("evaluation stack underflow at instruction {at}")]
    Underflow { at: usize },

    #[error("evaluation stack depth mismatch at instruction {at} (found {found}, expected {expected})")]
    DepthMismatch {
        at: usize,
        found: usize,
        expected: usize,
    },

    #[error("execution can fall off the end of the body")]
    FallsOffEnd,

    #[error("a non-void path returns without a value on the stack")]
    EmptyReturn,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeavingError {
    #[error("reference resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("method `{method}` carries {count} `{annotation}` annotations; at most one is allowed")]
    DuplicateAnnotation {
        method: String,
        annotation: String,
        count: usize,
    },

    #[error("woven body failed verification: {0}")]
    Verification(#[from] VerifyError),

    #[error("malformed method body: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("evaluation stack underflow")]
    StackUnderflow,

    #[error("step limit exceeded (runaway loop?)")]
    StepLimitExceeded,

    #[error("call target `{0}` cannot be evaluated")]
    UnknownCallee(String),

    #[error("no provider bound for annotation type `{0}`")]
    UnboundProvider(String),

    #[error("unhandled exception thrown during evaluation")]
    UnhandledException,

    #[error("evaluation ran off the end of the body")]
    RanOffEnd,

    #[error("array index out of range")]
    IndexOutOfRange,

    #[error("null reference dereferenced")]
    NullReference,

    #[error("operand type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid cast to `{0}`")]
    InvalidCast(String),
}
