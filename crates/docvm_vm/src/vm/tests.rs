//! Tests for the VM.

use std::sync::Arc;

use docvm_foundation::{CaseInsensitiveCollator, CellEntry, CsiCell, ErrorKind, TypeMask, TypeTag};

use super::*;
use crate::opcode::{FrameId, LabelId, Parameter};

const ARG: FrameId = 50;
const DOC: FrameId = 51;
const LAMBDA: LabelId = 100;
const END: LabelId = 101;
const ELSE: LabelId = 102;

fn constants(values: impl IntoIterator<Item = Value>) -> CodeFragment {
    let mut code = CodeFragment::new();
    for value in values {
        code.append_const_val(value);
    }
    code
}

fn run(code: &CodeFragment) -> Value {
    Vm::new().run(code).expect("run failed").into_owned()
}

fn run_err(code: &CodeFragment) -> Error {
    Vm::new().run(code).expect_err("run should fail")
}

/// Appends `op`, then a lambda whose argument is local 0 of frame `ARG`.
fn with_lambda(
    mut code: CodeFragment,
    op: impl FnOnce(&mut CodeFragment),
    body: impl FnOnce(&mut CodeFragment),
) -> CodeFragment {
    op(&mut code);
    code.append_label_jump(END);
    let mut lambda = CodeFragment::new();
    lambda.append_label(LAMBDA);
    lambda.declare_frame(ARG, -1);
    body(&mut lambda);
    lambda.append_ret();
    lambda.remove_frame(ARG);
    code.append_no_stack(lambda);
    code.append_label(END);
    code
}

fn equals(constant: Value) -> impl FnOnce(&mut CodeFragment) {
    move |body| {
        body.append_const_val(constant);
        body.append_eq(Parameter::local(ARG, 0), Parameter::POP);
    }
}

fn is_array(body: &mut CodeFragment) {
    body.append_is_array(Parameter::local(ARG, 0));
}

fn ints(values: &[i32]) -> Value {
    Value::array(values.iter().copied().map(Value::Int32))
}

// =============================================================================
// Stack and Accessors
// =============================================================================

#[test]
fn constant_is_borrowed_from_the_pool() {
    let code = constants([Value::from("hello")]);
    let result = Vm::new().run(&code).unwrap();
    assert!(!result.is_owned());
    assert_eq!(result.value(), &Value::from("hello"));
}

#[test]
fn leftover_values_are_an_internal_error() {
    let mut vm = Vm::new();
    let err = vm.run(&constants([Value::Int32(1), Value::Int32(2)])).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn swap_and_pop() {
    let mut code = constants([Value::Int32(1), Value::Int32(2)]);
    code.append_swap();
    code.append_pop();
    assert_eq!(run(&code), Value::Int32(2));
}

#[test]
fn frame_locals_are_read_in_place() {
    let mut code = constants([Value::Int32(21)]);
    code.declare_frame(DOC, -1);
    code.append_add(Parameter::local(DOC, 0), Parameter::local(DOC, 0));
    code.append_swap();
    code.append_pop();
    code.remove_frame(DOC);
    assert_eq!(run(&code), Value::Int32(42));
}

#[test]
fn local_parameter_after_a_popped_one() {
    // 10 - 4 with the 10 read from the frame after 4 is popped
    let mut code = constants([Value::Int32(10)]);
    code.declare_frame(DOC, -1);
    code.append_const_val(Value::Int32(4));
    code.append_sub(Parameter::local(DOC, 0), Parameter::POP);
    code.append_swap();
    code.append_pop();
    assert_eq!(run(&code), Value::Int32(6));
}

#[test]
fn move_local_leaves_nothing_behind() {
    let mut code = constants([Value::from("x")]);
    code.declare_frame(DOC, -1);
    code.append_local_val(DOC, 0, true);
    code.append_swap();
    code.append_exists(Parameter::POP);
    code.append_swap();
    code.append_pop();
    // Stack was [Nothing, "x"]; after swap ["x", Nothing]; exists(Nothing)
    // is false and the moved value is dropped.
    assert_eq!(run(&code), Value::Bool(false));
}

#[test]
fn slot_accessors() {
    let mut slots = SlotTable::from(vec![Value::object([("a", Value::Int32(1))])]);
    slots.push_env(Value::from("env"));

    let mut code = CodeFragment::new();
    code.append_access_val(0);
    code.append_get_field_imm(Parameter::POP, "a");
    let result = Vm::new().run_with(&code, &mut slots).unwrap();
    assert_eq!(result.value(), &Value::Int32(1));
    assert!(!result.is_owned());

    let mut code = CodeFragment::new();
    code.append_owned_accessor_val(0);
    let result = Vm::new().run_with(&code, &mut slots).unwrap();
    assert!(result.is_owned());

    let mut code = CodeFragment::new();
    code.append_env_accessor_val(0);
    let result = Vm::new().run_with(&code, &mut slots).unwrap();
    assert_eq!(result.value(), &Value::from("env"));

    let mut code = CodeFragment::new();
    code.append_env_accessor_val(7);
    let result = Vm::new().run_with(&code, &mut slots).unwrap();
    assert_eq!(result.value(), &Value::Nothing);
}

#[test]
fn move_val_empties_the_slot() {
    let mut slots = SlotTable::from(vec![Value::Int32(3)]);
    let mut code = CodeFragment::new();
    code.append_move_val(0);
    let result = Vm::new().run_with(&code, &mut slots).unwrap();
    assert!(result.is_owned());
    assert_eq!(result.value(), &Value::Int32(3));
    assert_eq!(slots.get(0), Some(&Value::Nothing));
}

#[test]
fn unknown_slot_is_internal() {
    let mut code = CodeFragment::new();
    code.append_access_val(9);
    let err = run_err(&code);
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
}

// =============================================================================
// Arithmetic and Comparison
// =============================================================================

#[test]
fn arithmetic() {
    let binary = |a: Value, b: Value, f: fn(&mut CodeFragment, Parameter, Parameter)| {
        let mut code = constants([a, b]);
        f(&mut code, Parameter::POP, Parameter::POP);
        run(&code)
    };
    assert_eq!(binary(Value::Int32(2), Value::Int32(3), CodeFragment::append_add), Value::Int32(5));
    assert_eq!(binary(Value::Int32(2), Value::Int32(3), CodeFragment::append_mul), Value::Int32(6));
    assert_eq!(binary(Value::Int32(7), Value::Int32(2), CodeFragment::append_div), Value::Double(3.5));
    assert_eq!(binary(Value::Int32(7), Value::Int32(0), CodeFragment::append_idiv), Value::Nothing);
    assert_eq!(binary(Value::from("a"), Value::Int32(1), CodeFragment::append_add), Value::Nothing);
}

#[test]
fn num_convert() {
    let mut code = constants([Value::Int32(3)]);
    code.append_num_convert(Parameter::POP, TypeTag::NumberDouble);
    assert_eq!(run(&code), Value::Double(3.0));
}

#[test]
fn logic_not_is_boolean_only() {
    let mut code = constants([Value::Bool(false)]);
    code.append_not(Parameter::POP);
    assert_eq!(run(&code), Value::Bool(true));

    let mut code = constants([Value::Int32(0)]);
    code.append_not(Parameter::POP);
    assert_eq!(run(&code), Value::Nothing);
}

#[test]
fn comparisons() {
    let mut code = constants([Value::Int32(1), Value::Double(2.5)]);
    code.append_less(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Bool(true));

    let mut code = constants([Value::Int32(1), Value::Nothing]);
    code.append_cmp3w(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Nothing);

    let mut code = constants([Value::Int32(5), Value::Int64(2)]);
    code.append_cmp3w(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Int32(1));
}

#[test]
fn collated_comparison() {
    let collator = Value::Collator(Arc::new(CaseInsensitiveCollator));
    let mut code = constants([Value::from("abc"), Value::from("ABC"), collator]);
    code.append_coll_eq(Parameter::POP, Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Bool(true));

    let mut code = constants([Value::from("abc"), Value::from("ABC"), Value::Null]);
    code.append_coll_eq(Parameter::POP, Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Nothing);
}

// =============================================================================
// Missing Values and Access
// =============================================================================

#[test]
fn fill_empty() {
    let mut code = constants([Value::Nothing, Value::Int32(3)]);
    code.append_fill_empty();
    assert_eq!(run(&code), Value::Int32(3));

    let mut code = constants([Value::Int32(1), Value::Int32(3)]);
    code.append_fill_empty();
    assert_eq!(run(&code), Value::Int32(1));

    let mut code = constants([Value::Nothing]);
    code.append_fill_empty_imm(ImmConstant::False);
    assert_eq!(run(&code), Value::Bool(false));
}

#[test]
fn nested_field_access() {
    let doc = Value::object([("a", Value::object([("b", Value::Int32(5))]))]);
    let mut code = constants([doc]);
    code.declare_frame(DOC, -1);
    code.append_get_field_imm(Parameter::local(DOC, 0), "a");
    code.append_get_field_imm(Parameter::POP, "b");
    code.append_swap();
    code.append_pop();
    assert_eq!(run(&code), Value::Int32(5));

    let mut code = constants([Value::Int32(1), Value::from("a")]);
    code.append_get_field(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Nothing);
}

#[test]
fn element_access() {
    let mut code = constants([ints(&[10, 20, 30]), Value::Int64(2)]);
    code.append_get_element(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Int32(30));

    let mut code = constants([ints(&[10, 20, 30]), Value::Int32(-1)]);
    code.append_get_element(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Nothing);

    let mut code = constants([ints(&[10, 20]), Value::from("1")]);
    code.append_get_field_or_element(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Int32(20));

    let mut code = constants([Value::object([("1", Value::from("x"))]), Value::from("1")]);
    code.append_get_field_or_element(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::from("x"));

    let mut code = constants([ints(&[10, 20]), Value::from("x1")]);
    code.append_get_field_or_element(Parameter::POP, Parameter::POP);
    assert_eq!(run(&code), Value::Nothing);
}

#[test]
fn array_size() {
    let mut code = constants([ints(&[1, 2, 3])]);
    code.append_get_array_size(Parameter::POP);
    assert_eq!(run(&code), Value::Int64(3));
}

#[test]
fn set_field_builds_replaces_and_removes() {
    let mut code = constants([Value::Nothing, Value::from("a"), Value::Int32(1)]);
    code.append_set_field();
    code.append_const_val(Value::from("b"));
    code.append_const_val(Value::Int32(2));
    code.append_set_field();
    code.append_const_val(Value::from("a"));
    code.append_const_val(Value::Nothing);
    code.append_set_field();
    assert_eq!(run(&code), Value::object([("b", Value::Int32(2))]));
}

#[test]
fn set_field_leaves_the_constant_untouched() {
    let original = Value::object([("a", Value::Int32(1))]);
    let mut code = constants([original.clone(), Value::from("a"), Value::Int32(9)]);
    code.append_set_field();
    assert_eq!(run(&code), Value::object([("a", Value::Int32(9))]));
    assert_eq!(code.constants()[0], original);
}

// =============================================================================
// Aggregates, Predicates and Builtins
// =============================================================================

#[test]
fn group_aggregates() {
    let mut code = constants([Value::Nothing, Value::Int32(5)]);
    code.append_agg_sum();
    code.append_const_val(Value::Double(0.5));
    code.append_agg_sum();
    assert_eq!(run(&code), Value::Double(5.5));

    let collator = Value::Collator(Arc::new(CaseInsensitiveCollator));
    let mut code = constants([Value::from("b"), collator, Value::from("A")]);
    code.append_agg_coll_min();
    assert_eq!(run(&code), Value::from("A"));
}

#[test]
fn type_predicates() {
    let mut code = constants([Value::Nothing]);
    code.append_is_number(Parameter::POP);
    assert_eq!(run(&code), Value::Nothing);

    let mut code = constants([Value::Double(f64::NAN)]);
    code.append_is_nan(Parameter::POP);
    assert_eq!(run(&code), Value::Bool(true));

    let mut code = constants([Value::from("x")]);
    code.append_is_nan(Parameter::POP);
    assert_eq!(run(&code), Value::Bool(false));

    let mask = TypeMask::of(&[TypeTag::String, TypeTag::Null]);
    let mut code = constants([Value::from("x")]);
    code.append_type_match(Parameter::POP, mask);
    assert_eq!(run(&code), Value::Bool(true));

    let mut code = constants([Value::Int32(1)]);
    code.append_type_match(Parameter::POP, mask);
    assert_eq!(run(&code), Value::Bool(false));
}

#[test]
fn function_call() {
    let mut code = constants([Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
    code.append_function(Builtin::NewArray, 3);
    let result = Vm::new().run(&code).unwrap();
    assert!(result.is_owned());
    assert_eq!(result.value(), &ints(&[1, 2, 3]));
}

#[test]
fn builtin_errors_carry_both_locations() {
    let mut code = constants([Value::Int32(1)]);
    code.append_function(Builtin::AggTopNFinalize, 1);
    let mut vm = Vm::new();
    let err = vm.run(&code).unwrap_err();
    let context = err.context.unwrap();
    assert_eq!(context.builtin, Some("aggTopNFinalize"));
    assert_eq!(context.instruction, Some("functionSmall"));
    assert_eq!(context.offset, Some(5));
    assert_eq!(vm.stack_depth(), 0);
}

fn date_trunc_in(db: Value, date: Value, timezone: &str) -> Value {
    let mut code = constants([db, date]);
    code.append_date_trunc(Parameter::POP, Parameter::POP, TimeUnit::Day, 1, timezone, DayOfWeek::Sunday);
    run(&code)
}

#[test]
fn date_trunc() {
    // 2024-03-15T10:30:00Z
    let date = Value::Date(1_710_498_600_000);
    assert_eq!(date_trunc_in(Value::Nothing, date.clone(), "UTC"), Value::Date(1_710_460_800_000));
    assert_eq!(date_trunc_in(Value::Nothing, date.clone(), "+01:00"), Value::Date(1_710_457_200_000));
    assert_eq!(date_trunc_in(Value::Nothing, date.clone(), "Mars/Olympus"), Value::Nothing);
    assert_eq!(date_trunc_in(Value::Nothing, Value::from("2024"), "UTC"), Value::Nothing);

    let db = Value::TimeZoneDb(Arc::new(TimeZoneDb::new().with_zone("Mars/Olympus", 3600)));
    assert_eq!(date_trunc_in(db.clone(), date.clone(), "Mars/Olympus"), Value::Date(1_710_457_200_000));
    assert_eq!(date_trunc_in(db, date, "UTC"), Value::Date(1_710_460_800_000));
}

#[test]
fn date_trunc_reads_the_database_from_a_frame() {
    let db = Value::TimeZoneDb(Arc::new(TimeZoneDb::new().with_zone("Local", -3600)));
    let mut code = constants([db, Value::Date(1_710_498_600_000)]);
    code.declare_frame(DOC, -2);
    code.append_date_trunc(Parameter::local(DOC, 0), Parameter::POP, TimeUnit::Day, 1, "Local", DayOfWeek::Sunday);
    code.append_swap();
    code.append_pop();
    code.remove_frame(DOC);
    // 2024-03-15T01:00:00Z is local midnight at -01:00
    assert_eq!(run(&code), Value::Date(1_710_464_400_000));
}

// =============================================================================
// Control Flow and Errors
// =============================================================================

fn if_else(condition: Value) -> CodeFragment {
    let mut code = constants([condition]);
    code.append_label_jump_false(ELSE);
    code.append_const_val(Value::from("then"));
    code.append_label_jump(END);
    code.append_label(ELSE);
    code.append_const_val(Value::from("else"));
    code.append_label(END);
    code
}

#[test]
fn conditional_jumps() {
    assert_eq!(run(&if_else(Value::Bool(true))), Value::from("then"));
    assert_eq!(run(&if_else(Value::Bool(false))), Value::from("else"));
    // Only a Boolean false takes the jump
    assert_eq!(run(&if_else(Value::Nothing)), Value::from("then"));
}

#[test]
fn jump_nothing_keeps_the_top() {
    let program = |value: Value| {
        let mut code = constants([value]);
        code.append_label_jump_nothing(END);
        code.append_pop();
        code.append_const_val(Value::from("present"));
        code.append_label(END);
        code
    };
    assert_eq!(run(&program(Value::Nothing)), Value::Nothing);
    assert_eq!(run(&program(Value::Int32(5))), Value::from("present"));
}

#[test]
fn fail_raises_a_user_error() {
    let mut code = constants([Value::Int32(1), Value::Int32(7), Value::from("boom")]);
    code.append_fail();
    let mut vm = Vm::new();
    let err = vm.run(&code).unwrap_err();
    assert!(matches!(&err.kind, ErrorKind::Failed { code: 7, message } if message == "boom"));
    assert!(err.is_user_facing());
    assert_eq!(err.context.unwrap().instruction, Some("fail"));
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn validation_rejects_pending_fixups() {
    let mut code = constants([Value::Int32(1)]);
    code.append_label_jump(LAMBDA);
    let mut vm = Vm::with_config(VmConfig::new().with_validate_fragments(true));
    let err = vm.run(&code).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(ref m) if m.contains("unresolved")));
}

#[test]
fn tracing_does_not_change_results() {
    let mut code = constants([Value::Int32(2), Value::Int32(3)]);
    code.append_mul(Parameter::POP, Parameter::POP);
    let mut vm = Vm::with_config(VmConfig::debug());
    assert_eq!(vm.run(&code).unwrap().value(), &Value::Int32(6));
}

#[test]
fn predicate_runs() {
    let mut code = constants([Value::Int32(2), Value::Int32(3)]);
    code.append_less(Parameter::POP, Parameter::POP);
    assert!(Vm::new().run_predicate(&code).unwrap());

    let code = constants([Value::Int32(1)]);
    assert!(!Vm::new().run_predicate(&code).unwrap());
}

#[test]
fn vm_is_reusable_after_an_error() {
    let mut vm = Vm::new();
    let mut failing = constants([Value::Int32(7), Value::from("boom")]);
    failing.append_fail();
    assert!(vm.run(&failing).is_err());
    let ok = constants([Value::Int32(4)]);
    assert_eq!(vm.run(&ok).unwrap().value(), &Value::Int32(4));
}

// =============================================================================
// Traversal
// =============================================================================

#[test]
fn traverse_p_unlimited_depth() {
    let input = Value::array([Value::array([Value::Int32(1), ints(&[2, 3])]), Value::Int32(4)]);
    let code = with_lambda(
        constants([input]),
        |c| c.append_traverse_p_imm(LAMBDA, ImmConstant::Nothing),
        is_array,
    );
    let f = Value::Bool(false);
    let expected = Value::array([
        Value::array([f.clone(), Value::array([f.clone(), f.clone()])]),
        f,
    ]);
    assert_eq!(run(&code), expected);
}

#[test]
fn traverse_p_single_level() {
    let input = Value::array([Value::array([Value::Int32(1), ints(&[2, 3])]), Value::Int32(4)]);
    let code = with_lambda(
        constants([input]),
        |c| c.append_traverse_p_imm(LAMBDA, ImmConstant::Int32One),
        is_array,
    );
    assert_eq!(run(&code), Value::array([Value::Bool(true), Value::Bool(false)]));
}

#[test]
fn traverse_p_drops_nothing_results() {
    let input = Value::array([
        Value::object([("a", Value::Int32(1))]),
        Value::object([("b", Value::Int32(2))]),
        Value::object([("a", Value::Int32(3))]),
    ]);
    let code = with_lambda(
        constants([input]),
        |c| {
            c.append_local_lambda(LAMBDA);
            c.append_const_val(Value::Nothing);
            c.append_traverse_p();
        },
        |body| body.append_get_field_imm(Parameter::local(ARG, 0), "a"),
    );
    assert_eq!(run(&code), ints(&[1, 3]));
}

#[test]
fn traverse_p_on_a_scalar_applies_the_lambda() {
    let code = with_lambda(
        constants([Value::Int32(4)]),
        |c| c.append_traverse_p_imm(LAMBDA, ImmConstant::Nothing),
        is_array,
    );
    assert_eq!(run(&code), Value::Bool(false));
}

#[test]
fn traverse_f_matches_any_element() {
    let program = |input: Value, compare_array: bool| {
        with_lambda(
            constants([input]),
            |c| c.append_traverse_f_imm(LAMBDA, compare_array),
            equals(Value::Int32(5)),
        )
    };
    assert_eq!(run(&program(ints(&[1, 5, 9]), false)), Value::Bool(true));
    assert_eq!(run(&program(ints(&[1, 2]), false)), Value::Bool(false));
    assert_eq!(run(&program(Value::Int32(5), false)), Value::Bool(true));
    assert_eq!(run(&program(Value::array([]), true)), Value::Bool(false));
}

#[test]
fn traverse_f_compares_the_whole_array() {
    let program = |compare_array: bool| {
        with_lambda(
            constants([ints(&[1, 2])]),
            |c| {
                c.append_local_lambda(LAMBDA);
                c.append_const_val(Value::Bool(compare_array));
                c.append_traverse_f();
            },
            is_array,
        )
    };
    assert_eq!(run(&program(true)), Value::Bool(true));
    assert_eq!(run(&program(false)), Value::Bool(false));
}

fn magic(input: Value, key: &str, pre: bool, post: bool) -> Value {
    let code = with_lambda(
        constants([input, Value::from(key)]),
        |c| c.append_traverse_magic(LAMBDA, pre, post),
        equals(Value::Int32(7)),
    );
    run(&code)
}

#[test]
fn magic_traversal_reads_fields_of_documents() {
    let input = Value::array([
        Value::object([("x", Value::Int32(1))]),
        Value::object([("x", Value::Int32(7))]),
    ]);
    assert_eq!(magic(input, "x", false, false), Value::Bool(true));
}

#[test]
fn magic_traversal_pre_traverses_nested_arrays() {
    let input = Value::array([ints(&[1, 7]), ints(&[2])]);
    // Without pre-traversal only input[1] = [2] is a candidate
    assert_eq!(magic(input.clone(), "1", false, false), Value::Bool(false));
    assert_eq!(magic(input, "1", true, false), Value::Bool(true));
}

#[test]
fn magic_traversal_post_traverses_results() {
    let input = Value::object([("a", ints(&[3, 7]))]);
    assert_eq!(magic(input.clone(), "a", false, false), Value::Bool(false));
    assert_eq!(magic(input, "a", false, true), Value::Bool(true));
}

#[test]
fn magic_traversal_without_candidates() {
    assert_eq!(magic(Value::Int32(7), "a", true, true), Value::Bool(false));
}

fn cell_program(cell: CsiCell, types: bool, body: impl FnOnce(&mut CodeFragment)) -> CodeFragment {
    with_lambda(
        constants([Value::CsiCell(Arc::new(cell))]),
        |c| {
            if types {
                c.append_traverse_cell_types_imm(LAMBDA);
            } else {
                c.append_traverse_cell_values_imm(LAMBDA);
            }
        },
        body,
    )
}

#[test]
fn cell_values_skip_deep_values_of_nested_cells() {
    let flat = CsiCell::from_value(&ints(&[1, 7]));
    assert_eq!(run(&cell_program(flat, false, equals(Value::Int32(7)))), Value::Bool(true));

    let nested = CsiCell::from_value(&Value::array([Value::Int32(1), ints(&[7])]));
    assert!(nested.has_double_nested_arrays());
    assert_eq!(run(&cell_program(nested, false, equals(Value::Int32(7)))), Value::Bool(false));
}

#[test]
fn cell_types_see_structural_markers() {
    let cell = CsiCell::new()
        .with_value(1, Value::Int32(1))
        .with_entry(1, CellEntry::EmptyArray);
    assert_eq!(run(&cell_program(cell, true, is_array)), Value::Bool(true));

    let cell = CsiCell::new().with_entry(0, CellEntry::Object);
    let code = cell_program(cell, true, |body| body.append_is_object(Parameter::local(ARG, 0)));
    assert_eq!(run(&code), Value::Bool(true));

    let cell = CsiCell::new().with_value(0, Value::Int32(5));
    assert_eq!(run(&cell_program(cell, true, is_array)), Value::Bool(false));
}

#[test]
fn cell_traversal_of_a_non_cell_is_nothing() {
    let code = with_lambda(
        constants([Value::Int32(1)]),
        |c| c.append_traverse_cell_values_imm(LAMBDA),
        is_array,
    );
    assert_eq!(run(&code), Value::Nothing);
}

#[test]
fn runaway_lambda_recursion_is_bounded() {
    let code = with_lambda(
        constants([Value::Int32(1)]),
        |c| c.append_traverse_f_imm(LAMBDA, false),
        |body| {
            body.append_local_val(ARG, 0, false);
            body.append_traverse_f_imm(LAMBDA, false);
        },
    );
    let mut vm = Vm::with_config(VmConfig::new().with_max_lambda_depth(8));
    let err = vm.run(&code).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(ref m) if m.contains("nesting")));
    assert_eq!(vm.stack_depth(), 0);
}
