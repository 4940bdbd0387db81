use indoc::indoc;
use justina_core::logger::init_logger;
use justina_core::{BufferConsole, Interpreter, JustinaError, ParseErrorCode, Value};

fn interpreter() -> Interpreter {
    init_logger();
    Interpreter::new(BufferConsole::new())
}

fn last_long(interp: &Interpreter) -> i32 {
    match interp.last_result() {
        Some(Value::Long(v)) => *v,
        other => panic!("expected an integer result, got {other:?}"),
    }
}

#[test]
fn call_and_return_value() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function f(x);
            return x * x;
            end;
        "#})
        .unwrap();
    interp.process_line("f(7);").unwrap();
    assert_eq!(last_long(&interp), 49);
    // locals are torn down on return
    assert_eq!(interp.heap_counters().local_var_strings, 0);
    assert_eq!(interp.heap_counters().local_arrays, 0);
}

#[test]
fn variable_arguments_are_passed_by_reference() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function g(r);
            r = r + 1;
            end;
        "#})
        .unwrap();
    interp.process_line("var x = 10; g(x); x;").unwrap();
    assert_eq!(last_long(&interp), 11);
}

#[test]
fn value_arguments_leave_the_caller_untouched() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function g(r);
            r = r + 1;
            return r;
            end;
        "#})
        .unwrap();
    interp.process_line("var x = 10; g(x + 0); x;").unwrap();
    assert_eq!(last_long(&interp), 10);
}

#[test]
fn optional_parameters_take_default_values() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function h(a, b = 5);
            return a + b;
            end;
        "#})
        .unwrap();
    interp.process_line("h(1);").unwrap();
    assert_eq!(last_long(&interp), 6);
    interp.process_line("h(1, 2);").unwrap();
    assert_eq!(last_long(&interp), 3);
}

#[test]
fn static_variables_persist_across_calls() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function cnt();
            static n = 0;
            n += 1;
            return n;
            end;
        "#})
        .unwrap();
    interp.process_line("cnt(); cnt(); cnt();").unwrap();
    assert_eq!(last_long(&interp), 3);
}

#[test]
fn local_variables_and_arrays_are_created_per_call() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function sum3(a, b, c);
            local buf(3) = 0;
            local total = 0;
            local i = 0;
            buf(1) = a;
            buf(2) = b;
            buf(3) = c;
            for i = 1, 3;
            total += buf(i);
            end;
            return total;
            end;
        "#})
        .unwrap();
    interp.process_line("sum3(4, 5, 6);").unwrap();
    assert_eq!(last_long(&interp), 15);
    assert_eq!(interp.heap_counters().local_arrays, 0);
}

#[test]
fn recursion_unwinds_cleanly() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function fact(n);
            if n <= 1;
            return 1;
            end;
            return n * fact(n - 1);
            end;
        "#})
        .unwrap();
    interp.process_line("fact(5);").unwrap();
    assert_eq!(last_long(&interp), 120);
}

#[test]
fn whole_arrays_are_passed_by_reference() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function total(arr(), n);
            local i = 0;
            local s = 0;
            for i = 1, n;
            s += arr(i);
            end;
            return s;
            end;
            function wipe(arr(), n);
            local i = 0;
            for i = 1, n;
            arr(i) = 0;
            end;
            end;
        "#})
        .unwrap();
    interp.process_line("var data(3) = 0; data(1) = 7; data(2) = 8; data(3) = 9;").unwrap();
    interp.process_line("total(data, 3);").unwrap();
    assert_eq!(last_long(&interp), 24);
    interp.process_line("wipe(data, 3); total(data, 3);").unwrap();
    assert_eq!(last_long(&interp), 0);
}

#[test]
fn end_of_function_acts_as_return_zero() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function noop(x);
            x = x + 1;
            end;
        "#})
        .unwrap();
    interp.process_line("noop(1) + 5;").unwrap();
    assert_eq!(last_long(&interp), 5);
}

#[test]
fn forward_calls_are_reconciled_with_the_definition() {
    let mut interp = interpreter();
    let err = interp
        .load_program(indoc! {r#"
            program demo;
            function caller();
            return callee(1, 2, 3);
            end;
            function callee(a, b);
            return a + b;
            end;
        "#})
        .unwrap_err();
    match err {
        JustinaError::Parse(parse) => {
            assert_eq!(parse.code(), ParseErrorCode::PrevCallsWrongArgCount)
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn calling_an_undefined_function_fails_the_program_load() {
    let mut interp = interpreter();
    let err = interp
        .load_program(indoc! {r#"
            program demo;
            function caller();
            return nowhere(1);
            end;
        "#})
        .unwrap_err();
    match err {
        JustinaError::Parse(parse) => {
            assert_eq!(parse.code(), ParseErrorCode::FunctionsNotAllDefined)
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn function_argument_counts_are_enforced_at_call_sites() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function h(a, b = 5);
            return a + b;
            end;
        "#})
        .unwrap();
    let err = interp.process_line("h();").unwrap_err();
    match err {
        JustinaError::Parse(parse) => assert_eq!(parse.code(), ParseErrorCode::WrongArgCount),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn eval_stack_depth_is_restored_around_calls() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function sq(x);
            return x * x;
            end;
        "#})
        .unwrap();
    // the return value is consumed by the caller's pending operators
    interp.process_line("1 + sq(2) * sq(3);").unwrap();
    assert_eq!(last_long(&interp), 37);
}
