//! Behavioral properties, observed by executing woven methods against
//! scripted providers: cache hits short-circuit the original body, every
//! exit path stores exactly once, the argument array is faithful, and
//! returns inside protected regions survive the rewrite.

mod common;

use std::rc::Rc;

use cacheweave::{
    ArgumentIndex, CilType, Evaluator, InstrId, Instruction, MethodBody, MethodSignature,
    Parameter, ProtectedRegion, Value,
};
use common::{cached_method, test_module, weave_all, ScriptedProvider, TestModule};

fn evaluator_with<'m>(
    fixture: &'m TestModule,
    provider: Rc<ScriptedProvider>,
) -> Evaluator<'m> {
    let mut evaluator = Evaluator::new(&fixture.module);
    evaluator.bind_provider(fixture.provider_type, provider);
    evaluator
}

#[test]
fn cache_hit_short_circuits_the_original_body() {
    let mut fixture = test_module();
    // The original body always throws after its (reachable) return
    // check, so reaching it at all would fail the evaluation.
    let body = MethodBody::new(vec![
        Instruction::LoadConstantInt32(1),
        Instruction::BranchTruthy(InstrId(4)),
        Instruction::LoadConstantInt32(0),
        Instruction::Return,
        Instruction::LoadNull,
        Instruction::Throw,
    ]);
    let method = cached_method(
        &mut fixture,
        "Trap",
        MethodSignature::static_member(Some(CilType::Int32), vec![]),
        body,
    );
    weave_all(&mut fixture.module).unwrap();

    let provider = ScriptedProvider::always(Value::Int32(99));
    let evaluator = evaluator_with(&fixture, provider.clone());

    let result = evaluator.call(method, vec![]).unwrap();
    assert_eq!(result, Some(Value::Int32(99)));
    assert_eq!(provider.retrieves.borrow().len(), 1);
    assert!(provider.stores.borrow().is_empty(), "a hit must not store");
}

#[test]
fn every_return_path_stores_exactly_once() {
    let mut fixture = test_module();
    let body = MethodBody::new(vec![
        Instruction::LoadArgument(ArgumentIndex(0)),
        Instruction::BranchTruthy(InstrId(4)),
        Instruction::LoadConstantInt32(20),
        Instruction::Return,
        Instruction::LoadConstantInt32(10),
        Instruction::Return,
    ]);
    let method = cached_method(
        &mut fixture,
        "Pick",
        MethodSignature::static_member(
            Some(CilType::Int32),
            vec![Parameter::value(CilType::Boolean)],
        ),
        body,
    );
    weave_all(&mut fixture.module).unwrap();

    let provider = ScriptedProvider::absent();
    let evaluator = evaluator_with(&fixture, provider.clone());

    let result = evaluator.call(method, vec![Value::Int32(1)]).unwrap();
    assert_eq!(result, Some(Value::Int32(10)));
    assert_eq!(provider.stores.borrow().len(), 1);
    assert_eq!(provider.stores.borrow()[0].0, Value::Int32(10));

    let result = evaluator.call(method, vec![Value::Int32(0)]).unwrap();
    assert_eq!(result, Some(Value::Int32(20)));
    assert_eq!(provider.stores.borrow().len(), 2);
    assert_eq!(provider.stores.borrow()[1].0, Value::Int32(20));
}

#[test]
fn argument_array_is_faithful() {
    let mut fixture = test_module();
    let body = MethodBody::new(vec![
        Instruction::LoadArgument(ArgumentIndex(0)),
        Instruction::Return,
    ]);
    let method = cached_method(
        &mut fixture,
        "First",
        MethodSignature::static_member(
            Some(CilType::Int32),
            vec![
                Parameter::value(CilType::Int32),
                Parameter::value(CilType::String),
            ],
        ),
        body,
    );
    weave_all(&mut fixture.module).unwrap();

    let provider = ScriptedProvider::absent();
    let evaluator = evaluator_with(&fixture, provider.clone());

    let result = evaluator
        .call(method, vec![Value::Int32(-5), Value::String(String::new())])
        .unwrap();
    assert_eq!(result, Some(Value::Int32(-5)));

    let expected = vec![Value::Int32(-5), Value::String(String::new())];
    assert_eq!(provider.retrieves.borrow().as_slice(), &[expected.clone()]);
    assert_eq!(provider.stores.borrow()[0].1, expected);
}

#[test]
fn absent_value_falls_back_and_stores_the_result() {
    let mut fixture = test_module();
    let body = MethodBody::new(vec![
        Instruction::LoadArgument(ArgumentIndex(0)),
        Instruction::LoadArgument(ArgumentIndex(1)),
        Instruction::Add,
        Instruction::Return,
    ]);
    let method = cached_method(
        &mut fixture,
        "Add",
        MethodSignature::static_member(
            Some(CilType::Int32),
            vec![
                Parameter::value(CilType::Int32),
                Parameter::value(CilType::Int32),
            ],
        ),
        body,
    );
    weave_all(&mut fixture.module).unwrap();

    let provider = ScriptedProvider::absent();
    let evaluator = evaluator_with(&fixture, provider.clone());

    let result = evaluator
        .call(method, vec![Value::Int32(2), Value::Int32(3)])
        .unwrap();
    assert_eq!(result, Some(Value::Int32(5)));

    assert_eq!(provider.retrieves.borrow().len(), 1);
    let stores = provider.stores.borrow();
    assert_eq!(
        stores.as_slice(),
        &[(Value::Int32(5), vec![Value::Int32(2), Value::Int32(3)])]
    );
}

#[test]
fn return_inside_a_protected_region_survives() {
    let mut fixture = test_module();
    // The only return sits inside the try; the handler has its own exit.
    let mut body = MethodBody::new(vec![
        Instruction::LoadConstantInt32(7),
        Instruction::Return,
        Instruction::Pop,
        Instruction::LoadConstantInt32(0),
        Instruction::Return,
    ]);
    body.protected_regions.push(ProtectedRegion {
        try_start: InstrId(0),
        try_end: InstrId(1),
        handler_start: InstrId(2),
        handler_end: InstrId(4),
    });
    let method = cached_method(
        &mut fixture,
        "Guarded",
        MethodSignature::static_member(Some(CilType::Int32), vec![]),
        body,
    );

    // Weaving verifies the result; redirecting the protected return to
    // the epilogue outside the region must pass.
    let report = weave_all(&mut fixture.module).unwrap();
    assert_eq!(report.woven, 1);

    let provider = ScriptedProvider::absent();
    let evaluator = evaluator_with(&fixture, provider.clone());
    let result = evaluator.call(method, vec![]).unwrap();
    assert_eq!(result, Some(Value::Int32(7)));
    assert_eq!(provider.stores.borrow().len(), 1);
}

#[test]
fn by_ref_arguments_contribute_their_entry_value() {
    let mut fixture = test_module();
    let body = MethodBody::new(vec![
        Instruction::LoadArgument(ArgumentIndex(0)),
        Instruction::LoadIndirect(CilType::Int32),
        Instruction::LoadConstantInt32(1),
        Instruction::Add,
        Instruction::Return,
    ]);
    let method = cached_method(
        &mut fixture,
        "Bump",
        MethodSignature::static_member(
            Some(CilType::Int32),
            vec![Parameter::by_ref(CilType::Int32)],
        ),
        body,
    );
    weave_all(&mut fixture.module).unwrap();

    let provider = ScriptedProvider::absent();
    let evaluator = evaluator_with(&fixture, provider.clone());

    let result = evaluator
        .call(method, vec![Value::by_ref(Value::Int32(41))])
        .unwrap();
    assert_eq!(result, Some(Value::Int32(42)));
    // the array holds the pointed-to value, not the reference
    assert_eq!(provider.retrieves.borrow()[0], vec![Value::Int32(41)]);
}

#[test]
fn sentinel_valued_results_are_recomputed() {
    // A provider that legitimately caches the default sentinel is
    // indistinguishable from "absent": the method recomputes (and
    // re-stores) every time. Deliberate, documented behavior.
    let mut fixture = test_module();
    let body = MethodBody::new(vec![
        Instruction::LoadConstantInt32(42),
        Instruction::Return,
    ]);
    let method = cached_method(
        &mut fixture,
        "FortyTwo",
        MethodSignature::static_member(Some(CilType::Int32), vec![]),
        body,
    );
    weave_all(&mut fixture.module).unwrap();

    let provider = ScriptedProvider::always(Value::Int32(0));
    let evaluator = evaluator_with(&fixture, provider.clone());

    let result = evaluator.call(method, vec![]).unwrap();
    assert_eq!(result, Some(Value::Int32(42)));
    assert_eq!(provider.stores.borrow().len(), 1);
}

#[test]
fn two_annotation_kinds_wrap_independently() {
    let mut fixture = test_module();
    let second_kind = common::add_annotation_kind(
        &mut fixture.module,
        fixture.runtime.marker,
        "OtherCache",
    );
    let body = MethodBody::new(vec![
        Instruction::LoadConstantInt32(5),
        Instruction::Return,
    ]);
    let method = cached_method(
        &mut fixture,
        "Five",
        MethodSignature::static_member(Some(CilType::Int32), vec![]),
        body,
    );
    fixture.module.annotate(
        method,
        cacheweave::Annotation {
            annotation_type: cacheweave::UserType::Definition(second_kind),
        },
    );

    let report = weave_all(&mut fixture.module).unwrap();
    assert_eq!(report.woven, 2);

    let first = ScriptedProvider::absent();
    let second = ScriptedProvider::absent();
    let mut evaluator = Evaluator::new(&fixture.module);
    evaluator.bind_provider(fixture.provider_type, first.clone());
    evaluator.bind_provider(second_kind, second.clone());

    let result = evaluator.call(method, vec![]).unwrap();
    assert_eq!(result, Some(Value::Int32(5)));
    assert_eq!(first.retrieves.borrow().len(), 1);
    assert_eq!(second.retrieves.borrow().len(), 1);
    assert_eq!(first.stores.borrow().len(), 1);
    assert_eq!(second.stores.borrow().len(), 1);
}
