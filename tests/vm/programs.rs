//! Integration tests for complete programs
//!
//! Tests programs assembled from several fragments and run against slots.

use docvm_foundation::{ErrorKind, Value};
use docvm_vm::{CodeFragment, FrameId, LabelId, Parameter, SlotAccess, SlotTable, Vm};

const DOC: FrameId = 1;
const ARG: FrameId = 2;
const LAMBDA: LabelId = 1;
const ELSE: LabelId = 2;
const END: LabelId = 3;

fn doc(a: i32, b: i32) -> Value {
    Value::object([("a", Value::Int32(a)), ("b", Value::Int32(b))])
}

// =============================================================================
// Splicing
// =============================================================================

/// `doc.a + doc.b` in a single fragment.
fn sum_fields_inline() -> CodeFragment {
    let mut code = CodeFragment::new();
    code.append_access_val(0);
    code.declare_frame(DOC, -1);
    code.append_get_field_imm(Parameter::local(DOC, 0), "a");
    code.append_get_field_imm(Parameter::local(DOC, 0), "b");
    code.append_add(Parameter::POP, Parameter::POP);
    code.append_swap();
    code.append_pop();
    code.remove_frame(DOC);
    code
}

/// `doc.a + doc.b` with the frame referenced before it is declared and the
/// body spliced in from its own fragment.
fn sum_fields_spliced() -> CodeFragment {
    let mut body = CodeFragment::new();
    body.append_get_field_imm(Parameter::local(DOC, 0), "a");
    body.append_get_field_imm(Parameter::local(DOC, 0), "b");
    body.append_add(Parameter::POP, Parameter::POP);

    let mut code = CodeFragment::new();
    code.append_access_val(0);
    code.declare_frame(DOC, -1);
    code.append(body);

    let mut tail = CodeFragment::new();
    tail.append_swap();
    tail.append_pop();
    code.append(tail);
    code.remove_frame(DOC);
    code
}

#[test]
fn spliced_fragments_match_inline_code() {
    let inline = sum_fields_inline();
    let spliced = sum_fields_spliced();
    assert_eq!(inline.instrs(), spliced.instrs());
    assert_eq!(inline.max_stack_size(), spliced.max_stack_size());

    let mut slots = SlotTable::from(vec![doc(2, 40)]);
    let mut vm = Vm::new();
    let a = vm.run_with(&inline, &mut slots).unwrap();
    let b = vm.run_with(&spliced, &mut slots).unwrap();
    assert_eq!(a.value(), &Value::Int32(42));
    assert_eq!(a.value(), b.value());
}

fn branch(condition: bool) -> CodeFragment {
    let mut head = CodeFragment::new();
    head.append_const_val(Value::Bool(condition));
    head.append_label_jump_false(ELSE);

    let mut then = CodeFragment::new();
    then.append_const_val(Value::from("then"));
    then.append_label_jump(END);

    let mut otherwise = CodeFragment::new();
    otherwise.append_label(ELSE);
    otherwise.append_const_val(Value::from("else"));
    otherwise.append_label(END);

    head.append_branches(then, otherwise);
    head
}

#[test]
fn jumps_resolve_across_fragments() {
    let code = branch(true);
    code.validate();
    assert_eq!(code.stack_size(), 1);

    let mut vm = Vm::new();
    assert_eq!(vm.run(&code).unwrap().value(), &Value::from("then"));
    assert_eq!(vm.run(&branch(false)).unwrap().value(), &Value::from("else"));
}

// =============================================================================
// Slot Ownership
// =============================================================================

#[test]
fn modifying_a_borrowed_slot_copies_it() {
    let mut slots = SlotTable::from(vec![doc(1, 2)]);
    let mut code = CodeFragment::new();
    code.append_access_val(0);
    code.append_const_val(Value::from("a"));
    code.append_const_val(Value::Int32(100));
    code.append_set_field();

    let result = Vm::new().run_with(&code, &mut slots).unwrap();
    assert!(result.is_owned());
    assert_eq!(result.value(), &doc(100, 2));
    assert_eq!(slots.get(0), Some(&doc(1, 2)));
}

#[test]
fn moved_slots_are_released_to_the_program() {
    let mut slots = SlotTable::from(vec![doc(1, 2)]);
    let mut code = CodeFragment::new();
    code.append_move_val(0);
    code.append_get_field_imm(Parameter::POP, "b");

    let result = Vm::new().run_with(&code, &mut slots).unwrap();
    assert!(result.is_owned());
    assert_eq!(result.value(), &Value::Int32(2));
    assert_eq!(slots.get(0), Some(&Value::Nothing));
}

// =============================================================================
// Document Filtering
// =============================================================================

/// `doc.tags` contains "b".
fn has_tag_b() -> CodeFragment {
    let mut code = CodeFragment::new();
    code.append_access_val(0);
    code.append_get_field_imm(Parameter::POP, "tags");
    code.append_traverse_f_imm(LAMBDA, false);
    code.append_label_jump(END);

    let mut lambda = CodeFragment::new();
    lambda.append_label(LAMBDA);
    lambda.declare_frame(ARG, -1);
    lambda.append_const_val(Value::from("b"));
    lambda.append_eq(Parameter::local(ARG, 0), Parameter::POP);
    lambda.append_ret();
    lambda.remove_frame(ARG);

    code.append_no_stack(lambda);
    code.append_label(END);
    code
}

#[test]
fn one_program_filters_many_documents() {
    let docs = [
        Value::object([("tags", Value::array([Value::from("a"), Value::from("b")]))]),
        Value::object([("tags", Value::from("b"))]),
        Value::object([("tags", Value::array([Value::from("c")]))]),
        Value::object([("other", Value::Null)]),
    ];
    let code = has_tag_b();
    let mut vm = Vm::new();
    let mut slots = SlotTable::new();
    let slot = slots.push(Value::Nothing);

    let matches: Vec<bool> = docs
        .iter()
        .map(|d| {
            slots.set(slot, d.clone());
            vm.run_predicate_with(&code, &mut slots).unwrap()
        })
        .collect();
    assert_eq!(matches, [true, true, false, false]);
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn programs_can_be_shared_across_threads() {
    let code = std::sync::Arc::new(sum_fields_inline());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let code = std::sync::Arc::clone(&code);
            std::thread::spawn(move || {
                let mut slots = SlotTable::from(vec![doc(i, i)]);
                Vm::new().run_with(&code, &mut slots).unwrap().into_owned()
            })
        })
        .collect();
    let results: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, (0..4).map(|i| Value::Int32(2 * i)).collect::<Vec<_>>());
}

#[test]
fn user_errors_surface_with_their_code() {
    let mut code = CodeFragment::new();
    code.append_const_val(Value::Int64(4822));
    code.append_const_val(Value::from("value too large"));
    code.append_fail();
    let err = Vm::new().run(&code).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Failed { code: 4822, .. }));
}
