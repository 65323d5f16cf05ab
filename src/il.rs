//! The instruction set. Operands that target other instructions do so by
//! node identity ([`InstrId`]), never by positional offset, so inserting
//! or replacing instructions cannot invalidate a branch. Compact
//! encodings are carried as their own variants: normalization expands
//! them to the canonical long forms, and finalization re-introduces them
//! where the operand fits.

use crate::module::{MethodIndex, MethodRefIndex};
use crate::types::CilType;

/// Identity of an instruction node within a method body's arena. Stable
/// for the lifetime of the body: nodes are never moved or removed, only
/// re-ordered or rewritten in place.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub usize);

impl std::fmt::Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a local slot within a method body.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalIndex(pub usize);

impl std::fmt::Display for LocalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an argument slot. For instance methods, slot 0 is the
/// receiver and formal parameters start at slot 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgumentIndex(pub usize);

impl std::fmt::Display for ArgumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A callable method, either defined in this module or reached through
/// the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserMethod {
    Definition(MethodIndex),
    Reference(MethodRefIndex),
}

/// A generic operation reference instantiated with concrete type
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericMethodInstantiation {
    pub base: UserMethod,
    pub parameters: Vec<CilType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodSource {
    User(UserMethod),
    Generic(GenericMethodInstantiation),
}

impl MethodSource {
    pub fn user_method(&self) -> UserMethod {
        match self {
            MethodSource::User(user) => *user,
            MethodSource::Generic(generic) => generic.base,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,

    // Constants
    LoadConstantInt32(i32),
    LoadConstantInt64(i64),
    LoadConstantFloat32(f32),
    LoadConstantFloat64(f64),
    LoadConstantString(String),
    LoadNull,

    // Locals and arguments (canonical long forms)
    LoadLocal(LocalIndex),
    StoreLocal(LocalIndex),
    LoadArgument(ArgumentIndex),

    // Stack
    Duplicate,
    Pop,

    // Arithmetic and comparison
    Add,
    Subtract,
    Multiply,
    CompareEqual,

    // Control flow (canonical long forms)
    Branch(InstrId),
    BranchTruthy(InstrId),
    BranchFalsy(InstrId),
    Return,
    Throw,

    // Objects and arrays
    NewArray(CilType),
    LoadElement(CilType),
    StoreElement(CilType),
    LoadIndirect(CilType),
    BoxValue(CilType),
    CastClass(CilType),

    // Metadata tokens
    LoadTokenMethod(MethodIndex),
    LoadTokenType(CilType),

    // Calls
    Call(MethodSource),
    CallVirtual(MethodSource),

    // Compact encodings (operand fits a single byte)
    LoadLocalShort(u8),
    StoreLocalShort(u8),
    LoadArgumentShort(u8),
    LoadConstantSmall(i8),
    BranchShort(InstrId),
    BranchTruthyShort(InstrId),
    BranchFalsyShort(InstrId),
}

impl Instruction {
    /// The branch target, if this instruction is any branch form.
    pub fn branch_target(&self) -> Option<InstrId> {
        use Instruction::*;
        match self {
            Branch(t) | BranchTruthy(t) | BranchFalsy(t) | BranchShort(t)
            | BranchTruthyShort(t) | BranchFalsyShort(t) => Some(*t),
            _ => None,
        }
    }

    pub fn branch_target_mut(&mut self) -> Option<&mut InstrId> {
        use Instruction::*;
        match self {
            Branch(t) | BranchTruthy(t) | BranchFalsy(t) | BranchShort(t)
            | BranchTruthyShort(t) | BranchFalsyShort(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instruction::Return)
    }

    /// True if control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Instruction::Return
                | Instruction::Throw
                | Instruction::Branch(_)
                | Instruction::BranchShort(_)
        )
    }

    /// Expand a compact encoding to its canonical long form; long forms
    /// are returned unchanged.
    pub fn normalized(&self) -> Instruction {
        use Instruction::*;
        match self {
            LoadLocalShort(i) => LoadLocal(LocalIndex(*i as usize)),
            StoreLocalShort(i) => StoreLocal(LocalIndex(*i as usize)),
            LoadArgumentShort(i) => LoadArgument(ArgumentIndex(*i as usize)),
            LoadConstantSmall(v) => LoadConstantInt32(*v as i32),
            BranchShort(t) => Branch(*t),
            BranchTruthyShort(t) => BranchTruthy(*t),
            BranchFalsyShort(t) => BranchFalsy(*t),
            other => other.clone(),
        }
    }

    /// Choose the compact encoding where the operand fits. Branches are
    /// not handled here: shortening them depends on the final layout and
    /// is done by the body's compaction fixed point.
    pub fn compacted(&self) -> Instruction {
        use Instruction::*;
        match self {
            LoadLocal(i) if i.0 <= u8::MAX as usize => LoadLocalShort(i.0 as u8),
            StoreLocal(i) if i.0 <= u8::MAX as usize => StoreLocalShort(i.0 as u8),
            LoadArgument(i) if i.0 <= u8::MAX as usize => LoadArgumentShort(i.0 as u8),
            LoadConstantInt32(v) if i8::try_from(*v).is_ok() => LoadConstantSmall(*v as i8),
            other => other.clone(),
        }
    }

    /// Encoded size in bytes, following the CIL opcode and operand
    /// widths. Used by compaction to decide branch displacement forms.
    pub fn encoded_size(&self) -> usize {
        use Instruction::*;
        match self {
            Nop | LoadNull | Duplicate | Pop | Add | Subtract | Multiply | Return | Throw => 1,
            LoadIndirect(_) => 1,
            CompareEqual => 2,
            LoadLocalShort(_) | StoreLocalShort(_) | LoadArgumentShort(_)
            | LoadConstantSmall(_) => 2,
            BranchShort(_) | BranchTruthyShort(_) | BranchFalsyShort(_) => 2,
            LoadLocal(_) | StoreLocal(_) | LoadArgument(_) => 4,
            LoadConstantInt32(_) | LoadConstantFloat32(_) | LoadConstantString(_) => 5,
            Branch(_) | BranchTruthy(_) | BranchFalsy(_) => 5,
            NewArray(_) | LoadElement(_) | StoreElement(_) | BoxValue(_) | CastClass(_) => 5,
            LoadTokenMethod(_) | LoadTokenType(_) => 5,
            Call(_) | CallVirtual(_) => 5,
            LoadConstantInt64(_) | LoadConstantFloat64(_) => 9,
        }
    }
}
