//! Integration tests for accumulator builtins
//!
//! Tests group and window accumulators driven by bytecode and by direct calls.

use std::sync::Arc;

use docvm_foundation::{SortSpec, Value};
use docvm_vm::{Args, Builtin, CodeFragment, Vm};

fn call(builtin: Builtin, args: Vec<Value>) -> Value {
    builtin.call(Args::from(args)).unwrap().into_owned()
}

#[test]
fn top_n_program() {
    let spec = Value::SortSpec(Arc::new(SortSpec::new().desc("x")));
    let mut code = CodeFragment::new();
    code.append_const_val(Value::Int32(2));
    code.append_function(Builtin::AggMultiInit, 1);
    for x in [5, 1, 9, 3] {
        code.append_const_val(spec.clone());
        code.append_const_val(Value::Int32(x));
        code.append_const_val(Value::Int32(x));
        code.append_function(Builtin::AggTopN, 4);
    }
    code.append_const_val(spec);
    code.append_function(Builtin::AggTopNFinalize, 2);
    assert_eq!(code.stack_size(), 1);

    let result = Vm::new().run(&code).unwrap();
    assert_eq!(result.value(), &Value::array([Value::Int32(9), Value::Int32(5)]));
}

#[test]
fn grouped_sum_program() {
    let mut code = CodeFragment::new();
    code.append_const_val(Value::Nothing);
    for v in [Value::Int32(1), Value::from("skip"), Value::Int64(2), Value::Double(0.5)] {
        code.append_const_val(v);
        code.append_agg_sum();
    }
    assert_eq!(Vm::new().run(&code).unwrap().value(), &Value::Double(3.5));
}

#[test]
fn removing_from_a_window_matches_a_fresh_window() {
    let values = [Value::Double(1.5), Value::Int32(2), Value::Int64(3)];

    let mut sliding = call(Builtin::AggRemovableSumInit, vec![]);
    for v in &values {
        sliding = call(Builtin::AggRemovableSumAdd, vec![sliding, v.clone()]);
    }
    sliding = call(Builtin::AggRemovableSumRemove, vec![sliding, values[0].clone()]);

    let mut fresh = call(Builtin::AggRemovableSumInit, vec![]);
    for v in &values[1..] {
        fresh = call(Builtin::AggRemovableSumAdd, vec![fresh, v.clone()]);
    }

    let sliding = call(Builtin::AggRemovableSumFinalize, vec![sliding]);
    let fresh = call(Builtin::AggRemovableSumFinalize, vec![fresh]);
    assert_eq!(sliding, fresh);
    assert_eq!(sliding.as_i64(), Some(5));
}

#[test]
fn removable_push_slides() {
    let mut state = call(Builtin::AggRemovablePushInit, vec![]);
    for v in 1..=3 {
        state = call(Builtin::AggRemovablePushAdd, vec![state, Value::Int32(v)]);
    }
    state = call(Builtin::AggRemovablePushRemove, vec![state]);
    let result = call(Builtin::AggRemovablePushFinalize, vec![state]);
    assert_eq!(result, Value::array([Value::Int32(2), Value::Int32(3)]));
}

#[test]
fn accumulator_arity_is_checked() {
    let err = Builtin::AggTopN.call(Args::from(vec![Value::Null])).unwrap_err();
    assert!(!err.is_user_facing());
    assert_eq!(err.context.unwrap().builtin, Some("aggTopN"));
}
