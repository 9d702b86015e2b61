//! Property tests for program construction and execution
//!
//! Random arithmetic expressions are compiled two ways and run.

use docvm_foundation::Value;
use docvm_vm::{CodeFragment, Parameter, Vm};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Expr {
    Const(i32),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Less(Box<Expr>, Box<Expr>),
    Cmp(Box<Expr>, Box<Expr>),
}

fn expr() -> impl Strategy<Value = Expr> {
    let leaf = (-1000..1000i32).prop_map(Expr::Const);
    leaf.prop_recursive(6, 64, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Less(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Expr::Cmp(Box::new(a), Box::new(b))),
        ]
    })
}

fn append_op(code: &mut CodeFragment, e: &Expr) {
    let (p, q) = (Parameter::POP, Parameter::POP);
    match e {
        Expr::Const(_) => unreachable!(),
        Expr::Add(..) => code.append_add(p, q),
        Expr::Sub(..) => code.append_sub(p, q),
        Expr::Less(..) => code.append_less(p, q),
        Expr::Cmp(..) => code.append_cmp3w(p, q),
    }
}

fn operands(e: &Expr) -> Option<(&Expr, &Expr)> {
    match e {
        Expr::Const(_) => None,
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Less(a, b) | Expr::Cmp(a, b) => Some((a, b)),
    }
}

/// Emits everything into one fragment.
fn compile_inline(e: &Expr, code: &mut CodeFragment) {
    match operands(e) {
        None => {
            if let Expr::Const(n) = e {
                code.append_const_val(Value::Int32(*n));
            }
        }
        Some((a, b)) => {
            compile_inline(a, code);
            compile_inline(b, code);
            append_op(code, e);
        }
    }
}

/// Builds each operand in its own fragment and splices them.
fn compile_spliced(e: &Expr) -> CodeFragment {
    match operands(e) {
        None => {
            let mut code = CodeFragment::new();
            compile_inline(e, &mut code);
            code
        }
        Some((a, b)) => {
            let mut code = compile_spliced(a);
            code.append(compile_spliced(b));
            append_op(&mut code, e);
            code
        }
    }
}

proptest! {
    #[test]
    fn every_expression_leaves_one_value(e in expr()) {
        let mut code = CodeFragment::new();
        compile_inline(&e, &mut code);
        prop_assert_eq!(code.stack_size(), 1);

        let mut vm = Vm::new();
        let result = vm.run(&code);
        prop_assert!(result.is_ok());
        prop_assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn splicing_preserves_code_and_results(e in expr()) {
        let mut inline = CodeFragment::new();
        compile_inline(&e, &mut inline);
        let spliced = compile_spliced(&e);

        prop_assert_eq!(inline.instrs(), spliced.instrs());
        prop_assert_eq!(inline.max_stack_size(), spliced.max_stack_size());

        let mut vm = Vm::new();
        let a = vm.run(&inline).unwrap().into_owned();
        let b = vm.run(&spliced).unwrap().into_owned();
        prop_assert_eq!(a, b);
    }
}
