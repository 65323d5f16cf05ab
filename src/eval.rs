//! A reference evaluator for method bodies. It exists to observe woven
//! code behaving: the test suite binds [`CacheProvider`] implementations
//! to annotation types, invokes rewritten methods, and asserts on the
//! provider calls and returned values. Values are dynamically typed, so
//! boxing is a representation no-op here.
//!
//! The reflection operations the materialized prologue calls into
//! (method-from-handle, type-from-handle, get-custom-attributes) are
//! implemented as intrinsics dispatched by declaring type and name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::body::MethodBody;
use crate::error::EvalError;
use crate::il::{InstrId, Instruction, MethodSource, UserMethod};
use crate::module::{MethodIndex, Module, TypeIndex};
use crate::runtime;
use crate::types::{CilType, MethodSignature};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    /// A managed pointer, as passed for by-ref arguments.
    ByRef(Rc<RefCell<Value>>),
    MethodToken(MethodIndex),
    TypeToken(CilType),
    /// A reflected method handle (the result of method-from-handle).
    Method(MethodIndex),
    /// A reflected type (the result of type-from-handle).
    Type(CilType),
    /// A materialized annotation instance of the given annotation kind.
    Annotation(TypeIndex),
}

impl Value {
    pub fn by_ref(value: Value) -> Value {
        Value::ByRef(Rc::new(RefCell::new(value)))
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::ByRef(_) => "byref",
            Value::MethodToken(_) => "method token",
            Value::TypeToken(_) => "type token",
            Value::Method(_) => "method",
            Value::Type(_) => "type",
            Value::Annotation(_) => "annotation",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int32(v) => *v != 0,
            Value::Int64(v) => *v != 0,
            _ => true,
        }
    }
}

/// The zero/null value a slot of type `ty` starts out holding.
pub fn default_value(ty: &CilType) -> Value {
    match ty {
        CilType::Int64 | CilType::UInt64 => Value::Int64(0),
        CilType::Float32 => Value::Float32(0.0),
        CilType::Float64 => Value::Float64(0.0),
        ty if ty.is_reference() => Value::Null,
        CilType::MethodGeneric(_) => Value::Null,
        _ => Value::Int32(0),
    }
}

/// `ceq` with numeric width coercion; otherwise structural equality.
fn values_equal(a: &Value, b: &Value) -> bool {
    use Value::*;
    match (a, b) {
        (Int32(x), Int64(y)) | (Int64(y), Int32(x)) => i64::from(*x) == *y,
        (Float32(x), Float64(y)) | (Float64(y), Float32(x)) => f64::from(*x) == *y,
        _ => a == b,
    }
}

/// The runtime half of the provider contract: `retrieve` answers `None`
/// when nothing is cached (the woven code then sees the type's default
/// sentinel), and `store` persists a computed result. Failure handling
/// is entirely the provider's business.
pub trait CacheProvider {
    fn retrieve(&self, method: MethodIndex, args: &[Value]) -> Option<Value>;
    fn store(&self, value: Value, method: MethodIndex, args: &[Value]);
}

pub struct Evaluator<'m> {
    module: &'m Module,
    providers: HashMap<TypeIndex, Rc<dyn CacheProvider>>,
    pub step_limit: usize,
}

impl<'m> Evaluator<'m> {
    pub fn new(module: &'m Module) -> Self {
        Evaluator {
            module,
            providers: HashMap::new(),
            step_limit: 1_000_000,
        }
    }

    /// Bind a provider to an annotation kind; materialized instances of
    /// that kind dispatch their capability calls to it.
    pub fn bind_provider(&mut self, annotation_type: TypeIndex, provider: Rc<dyn CacheProvider>) {
        self.providers.insert(annotation_type, provider);
    }

    /// Invoke a method definition. For instance methods the receiver is
    /// `arguments[0]`. Returns the method's result, `None` for void.
    pub fn call(
        &self,
        method: MethodIndex,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, EvalError> {
        let definition = &self.module[method];
        let Some(body) = &definition.body else {
            return Err(EvalError::UnknownCallee(
                self.module.method_full_name(method),
            ));
        };
        self.run(body, &definition.signature, arguments)
    }

    fn run(
        &self,
        body: &MethodBody,
        signature: &MethodSignature,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, EvalError> {
        let placed: Vec<(InstrId, &Instruction)> = body.iter().collect();
        let positions: HashMap<InstrId, usize> = placed
            .iter()
            .enumerate()
            .map(|(position, (id, _))| (*id, position))
            .collect();

        let mut locals: Vec<Value> = body.locals().iter().map(|l| default_value(&l.ty)).collect();
        let mut stack: Vec<Value> = vec![];
        let mut ip = 0usize;
        let mut steps = 0usize;

        macro_rules! pop {
            () => {
                stack.pop().ok_or(EvalError::StackUnderflow)?
            };
        }

        loop {
            steps += 1;
            if steps > self.step_limit {
                return Err(EvalError::StepLimitExceeded);
            }
            let Some((_, instruction)) = placed.get(ip) else {
                return Err(EvalError::RanOffEnd);
            };

            let mut jump: Option<InstrId> = None;
            use Instruction::*;
            match &instruction.normalized() {
                Nop => {}
                LoadConstantInt32(v) => stack.push(Value::Int32(*v)),
                LoadConstantInt64(v) => stack.push(Value::Int64(*v)),
                LoadConstantFloat32(v) => stack.push(Value::Float32(*v)),
                LoadConstantFloat64(v) => stack.push(Value::Float64(*v)),
                LoadConstantString(s) => stack.push(Value::String(s.clone())),
                LoadNull => stack.push(Value::Null),

                LoadLocal(i) => stack.push(locals[i.0].clone()),
                StoreLocal(i) => locals[i.0] = pop!(),
                LoadArgument(i) => {
                    let value = arguments
                        .get(i.0)
                        .cloned()
                        .ok_or(EvalError::IndexOutOfRange)?;
                    stack.push(value);
                }

                Duplicate => {
                    let top = pop!();
                    stack.push(top.clone());
                    stack.push(top);
                }
                Pop => {
                    pop!();
                }

                Add => binop(&mut stack, |a, b| a + b, |a, b| a + b)?,
                Subtract => binop(&mut stack, |a, b| a - b, |a, b| a - b)?,
                Multiply => binop(&mut stack, |a, b| a * b, |a, b| a * b)?,
                CompareEqual => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(Value::Int32(i32::from(values_equal(&a, &b))));
                }

                Branch(target) => jump = Some(*target),
                BranchTruthy(target) => {
                    if pop!().truthy() {
                        jump = Some(*target);
                    }
                }
                BranchFalsy(target) => {
                    if !pop!().truthy() {
                        jump = Some(*target);
                    }
                }
                Return => {
                    return Ok(if signature.return_type.is_some() {
                        Some(pop!())
                    } else {
                        None
                    });
                }
                Throw => {
                    pop!();
                    return Err(EvalError::UnhandledException);
                }

                NewArray(_) => {
                    let Value::Int32(length) = pop!() else {
                        return Err(EvalError::TypeMismatch {
                            expected: "int32",
                            actual: "other",
                        });
                    };
                    let elements = vec![Value::Null; length.max(0) as usize];
                    stack.push(Value::Array(Rc::new(RefCell::new(elements))));
                }
                LoadElement(_) => {
                    let index = expect_index(pop!())?;
                    let array = expect_array(pop!())?;
                    let value = array
                        .borrow()
                        .get(index)
                        .cloned()
                        .ok_or(EvalError::IndexOutOfRange)?;
                    stack.push(value);
                }
                StoreElement(_) => {
                    let value = pop!();
                    let index = expect_index(pop!())?;
                    let array = expect_array(pop!())?;
                    let mut elements = array.borrow_mut();
                    if index >= elements.len() {
                        return Err(EvalError::IndexOutOfRange);
                    }
                    elements[index] = value;
                }
                LoadIndirect(_) => match pop!() {
                    Value::ByRef(cell) => {
                        let value = cell.borrow().clone();
                        stack.push(value);
                    }
                    Value::Null => return Err(EvalError::NullReference),
                    other => {
                        return Err(EvalError::TypeMismatch {
                            expected: "byref",
                            actual: other.kind(),
                        });
                    }
                },
                // values are already uniformly represented here
                BoxValue(_) => {}
                CastClass(ty) => {
                    let value = pop!();
                    self.check_cast(&value, ty)?;
                    stack.push(value);
                }

                LoadTokenMethod(m) => stack.push(Value::MethodToken(*m)),
                LoadTokenType(t) => stack.push(Value::TypeToken(t.clone())),

                Call(source) | CallVirtual(source) => self.execute_call(source, &mut stack)?,

                _ => unreachable!("compact form after normalization"),
            }

            match jump {
                Some(target) => {
                    ip = *positions
                        .get(&target)
                        .ok_or(EvalError::RanOffEnd)?;
                }
                None => ip += 1,
            }
        }
    }

    fn check_cast(&self, value: &Value, ty: &CilType) -> Result<(), EvalError> {
        // castclass passes null through untouched
        if let (Value::Annotation(kind), CilType::Class(user)) = (value, ty) {
            let target = self
                .module
                .definition_of(*user)
                .map_err(|_| EvalError::InvalidCast(self.module.type_full_name(*user)))?;
            if !self.module.derives_from(*kind, target) {
                return Err(EvalError::InvalidCast(self.module.type_full_name(*user)));
            }
        }
        Ok(())
    }

    fn execute_call(&self, source: &MethodSource, stack: &mut Vec<Value>) -> Result<(), EvalError> {
        let user = source.user_method();
        let (name, parent, signature) = match user {
            UserMethod::Reference(index) => {
                let reference = &self.module[index];
                (reference.name.clone(), reference.parent, &reference.signature)
            }
            UserMethod::Definition(index) => {
                let definition = &self.module[index];
                (definition.name.clone(), definition.parent, &definition.signature)
            }
        };

        let mut args = Vec::with_capacity(signature.parameters.len());
        for _ in 0..signature.parameters.len() {
            args.push(stack.pop().ok_or(EvalError::StackUnderflow)?);
        }
        args.reverse();
        let receiver = if signature.instance {
            Some(stack.pop().ok_or(EvalError::StackUnderflow)?)
        } else {
            None
        };

        let parent_name = self.module[parent].full_name();

        if parent_name == runtime::METHOD_BASE && name == runtime::GET_METHOD_FROM_HANDLE {
            let Value::MethodToken(method) = &args[0] else {
                return Err(EvalError::TypeMismatch {
                    expected: "method token",
                    actual: args[0].kind(),
                });
            };
            stack.push(Value::Method(*method));
            return Ok(());
        }
        if parent_name == runtime::TYPE && name == runtime::GET_TYPE_FROM_HANDLE {
            let Value::TypeToken(ty) = args[0].clone() else {
                return Err(EvalError::TypeMismatch {
                    expected: "type token",
                    actual: args[0].kind(),
                });
            };
            stack.push(Value::Type(ty));
            return Ok(());
        }
        if name == runtime::GET_CUSTOM_ATTRIBUTES {
            let Some(Value::Method(method)) = receiver else {
                return Err(EvalError::TypeMismatch {
                    expected: "method",
                    actual: "other",
                });
            };
            let filter = match args[0].clone() {
                Value::Type(CilType::Class(user)) => self.module.definition_of(user).ok(),
                _ => None,
            };
            let instances: Vec<Value> = self.module[method]
                .annotations
                .iter()
                .filter_map(|annotation| {
                    let kind = self.module.definition_of(annotation.annotation_type).ok()?;
                    let keep = filter.map_or(true, |f| self.module.derives_from(kind, f));
                    keep.then_some(Value::Annotation(kind))
                })
                .collect();
            stack.push(Value::Array(Rc::new(RefCell::new(instances))));
            return Ok(());
        }

        // the provider capability pair, dispatched on the materialized
        // annotation instance
        if let Some(Value::Annotation(kind)) = receiver {
            if name == runtime::RETRIEVE {
                let provider = self.provider_for(kind)?;
                let (method, snapshot) = method_and_args(&args[0], &args[1])?;
                let retrieved = provider.retrieve(method, &snapshot);
                let value = retrieved.unwrap_or_else(|| match source {
                    MethodSource::Generic(generic) => generic
                        .parameters
                        .first()
                        .map(default_value)
                        .unwrap_or(Value::Null),
                    MethodSource::User(_) => Value::Null,
                });
                stack.push(value);
                return Ok(());
            }
            if name == runtime::STORE {
                let provider = self.provider_for(kind)?;
                let (method, snapshot) = method_and_args(&args[1], &args[2])?;
                provider.store(args[0].clone(), method, &snapshot);
                return Ok(());
            }
        }

        // plain calls into the module itself
        if let UserMethod::Definition(index) = user {
            if self.module[index].body.is_some() {
                let mut call_args = Vec::with_capacity(args.len() + 1);
                if let Some(receiver) = receiver {
                    call_args.push(receiver);
                }
                call_args.extend(args);
                let result = self.call(index, call_args)?;
                if signature.return_type.is_some() {
                    stack.push(result.ok_or(EvalError::StackUnderflow)?);
                }
                return Ok(());
            }
        }

        Err(EvalError::UnknownCallee(format!("{parent_name}::{name}")))
    }

    fn provider_for(&self, kind: TypeIndex) -> Result<&Rc<dyn CacheProvider>, EvalError> {
        self.providers
            .get(&kind)
            .ok_or_else(|| EvalError::UnboundProvider(self.module[kind].full_name()))
    }
}

fn expect_index(value: Value) -> Result<usize, EvalError> {
    match value {
        Value::Int32(index) if index >= 0 => Ok(index as usize),
        Value::Int32(_) => Err(EvalError::IndexOutOfRange),
        other => Err(EvalError::TypeMismatch {
            expected: "int32",
            actual: other.kind(),
        }),
    }
}

fn expect_array(value: Value) -> Result<Rc<RefCell<Vec<Value>>>, EvalError> {
    match value {
        Value::Array(array) => Ok(array),
        Value::Null => Err(EvalError::NullReference),
        other => Err(EvalError::TypeMismatch {
            expected: "array",
            actual: other.kind(),
        }),
    }
}

fn method_and_args(
    method: &Value,
    args: &Value,
) -> Result<(MethodIndex, Vec<Value>), EvalError> {
    let Value::Method(method) = method else {
        return Err(EvalError::TypeMismatch {
            expected: "method",
            actual: method.kind(),
        });
    };
    let Value::Array(array) = args else {
        return Err(EvalError::TypeMismatch {
            expected: "array",
            actual: args.kind(),
        });
    };
    Ok((*method, array.borrow().clone()))
}

fn binop(
    stack: &mut Vec<Value>,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<(), EvalError> {
    let b = stack.pop().ok_or(EvalError::StackUnderflow)?;
    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
    use Value::*;
    let result = match (&a, &b) {
        (Int32(x), Int32(y)) => Int32(int_op(i64::from(*x), i64::from(*y)) as i32),
        (Int64(x), Int64(y)) => Int64(int_op(*x, *y)),
        (Int32(x), Int64(y)) | (Int64(y), Int32(x)) => Int64(int_op(i64::from(*x), *y)),
        (Float32(x), Float32(y)) => Float32(float_op(f64::from(*x), f64::from(*y)) as f32),
        (Float64(x), Float64(y)) => Float64(float_op(*x, *y)),
        _ => {
            return Err(EvalError::TypeMismatch {
                expected: "numeric",
                actual: a.kind(),
            });
        }
    };
    stack.push(result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{MethodDef, TypeDef};
    use crate::types::Parameter;

    fn module_with(body: MethodBody, signature: MethodSignature) -> (Module, MethodIndex) {
        let mut module = Module::new("test.dll");
        let holder = module.push_type_definition(TypeDef::new(None, "Holder"));
        let method = module.push_method(holder, MethodDef::new("M", signature, Some(body)));
        (module, method)
    }

    #[test]
    fn evaluates_arithmetic() {
        let body = MethodBody::new(vec![
            Instruction::LoadArgument(crate::il::ArgumentIndex(0)),
            Instruction::LoadArgument(crate::il::ArgumentIndex(1)),
            Instruction::Add,
            Instruction::Return,
        ]);
        let signature = MethodSignature::static_member(
            Some(CilType::Int32),
            vec![
                Parameter::value(CilType::Int32),
                Parameter::value(CilType::Int32),
            ],
        );
        let (module, method) = module_with(body, signature);
        let evaluator = Evaluator::new(&module);
        let result = evaluator
            .call(method, vec![Value::Int32(2), Value::Int32(3)])
            .unwrap();
        assert_eq!(result, Some(Value::Int32(5)));
    }

    #[test]
    fn branches_follow_node_identity() {
        // arg0 ? 10 : 20
        let body = MethodBody::new(vec![
            Instruction::LoadArgument(crate::il::ArgumentIndex(0)),
            Instruction::BranchTruthy(InstrId(4)),
            Instruction::LoadConstantInt32(20),
            Instruction::Return,
            Instruction::LoadConstantInt32(10),
            Instruction::Return,
        ]);
        let signature = MethodSignature::static_member(
            Some(CilType::Int32),
            vec![Parameter::value(CilType::Boolean)],
        );
        let (module, method) = module_with(body, signature);
        let evaluator = Evaluator::new(&module);
        assert_eq!(
            evaluator.call(method, vec![Value::Int32(1)]).unwrap(),
            Some(Value::Int32(10))
        );
        assert_eq!(
            evaluator.call(method, vec![Value::Int32(0)]).unwrap(),
            Some(Value::Int32(20))
        );
    }

    #[test]
    fn indirect_loads_read_through_the_reference() {
        let body = MethodBody::new(vec![
            Instruction::LoadArgument(crate::il::ArgumentIndex(0)),
            Instruction::LoadIndirect(CilType::Int32),
            Instruction::Return,
        ]);
        let signature = MethodSignature::static_member(
            Some(CilType::Int32),
            vec![Parameter::by_ref(CilType::Int32)],
        );
        let (module, method) = module_with(body, signature);
        let evaluator = Evaluator::new(&module);
        let result = evaluator
            .call(method, vec![Value::by_ref(Value::Int32(41))])
            .unwrap();
        assert_eq!(result, Some(Value::Int32(41)));
    }

    #[test]
    fn runaway_loops_hit_the_step_limit() {
        let body = MethodBody::new(vec![Instruction::Branch(InstrId(0))]);
        let signature = MethodSignature::static_member(Some(CilType::Int32), vec![]);
        let (module, method) = module_with(body, signature);
        let mut evaluator = Evaluator::new(&module);
        evaluator.step_limit = 1_000;
        assert_eq!(
            evaluator.call(method, vec![]).unwrap_err(),
            EvalError::StepLimitExceeded
        );
    }
}
