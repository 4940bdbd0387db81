use justina_core::logger::init_logger;
use justina_core::{BufferConsole, Interpreter, JustinaError, Value};

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

fn exec_error_code(result: Result<justina_core::ExecStatus, JustinaError>) -> u16 {
    match result {
        Err(JustinaError::Exec(err)) => err.code(),
        other => panic!("expected an execution error, got {other:?}"),
    }
}

#[test]
fn integer_arithmetic_with_precedence() {
    let mut interp = interpreter();
    interp.process_line("var a = 3; var b = 5; a + b * 2;").unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Long(13)));
}

#[test]
fn parentheses_override_precedence() {
    let mut interp = interpreter();
    interp.process_line("(3 + 5) * 2;").unwrap();
    assert_eq!(last_long(&interp), 16);
}

#[test]
fn power_is_right_associative() {
    let mut interp = interpreter();
    interp.process_line("2 ** 3 ** 2;").unwrap();
    match interp.last_result() {
        Some(Value::Float(v)) => assert_eq!(*v, 512.0),
        other => panic!("expected float, got {other:?}"),
    }
}

#[test]
fn mixed_types_promote_to_float() {
    let mut interp = interpreter();
    interp.process_line("1 + 2.5;").unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Float(3.5)));
}

#[test]
fn integer_only_operators_require_longs() {
    let mut interp = interpreter();
    assert_eq!(exec_error_code(interp.process_line("5 % 2.5;")), 3021);
    interp.process_line("7 % 3;").unwrap();
    assert_eq!(last_long(&interp), 1);
    interp.process_line("1 << 4 | 3;").unwrap();
    assert_eq!(last_long(&interp), 19);
}

#[test]
fn hex_and_binary_literals() {
    let mut interp = interpreter();
    interp.process_line("0xFF & 0b1010;").unwrap();
    assert_eq!(last_long(&interp), 10);
}

#[test]
fn string_concatenation_balances_heap_objects() {
    let mut interp = interpreter();
    interp.process_line(r#"var s = "he"; s += "llo"; s;"#).unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Str(Some("hello".to_string()))));
    let counters = interp.heap_counters();
    assert_eq!(counters.intermediate_strings, 0);
    assert_eq!(counters.user_var_strings, 1);
}

#[test]
fn assignment_changes_scalar_type() {
    let mut interp = interpreter();
    interp.process_line("var v = 1;").unwrap();
    interp.process_line("type(v);").unwrap();
    assert_eq!(last_long(&interp), 1); // long
    interp.process_line("v = 2.5; type(v);").unwrap();
    assert_eq!(last_long(&interp), 2); // float
    interp.process_line(r#"v = "txt"; type(v);"#).unwrap();
    assert_eq!(last_long(&interp), 3); // string
}

#[test]
fn compound_assignment_into_long_array_narrows() {
    let mut interp = interpreter();
    interp.process_line("var a(2) = 0; a(1) = 3; a(1) += 1.5; a(1);").unwrap();
    // the array's element type is fixed: the float result is cast back to long
    assert_eq!(interp.last_result(), Some(&Value::Long(4)));
}

#[test]
fn array_elements_sum() {
    let mut interp = interpreter();
    interp
        .process_line("var a(3) = 0; a(1)=10; a(2)=20; a(3)=30; a(1)+a(2)+a(3);")
        .unwrap();
    assert_eq!(last_long(&interp), 60);
    assert_eq!(interp.heap_counters().user_arrays, 1);
    interp.process_line("clearMem;").unwrap();
    assert!(interp.heap_counters().all_zero());
}

#[test]
fn array_subscripts_are_checked_at_run_time() {
    let mut interp = interpreter();
    interp.process_line("var a(3) = 0;").unwrap();
    assert_eq!(exec_error_code(interp.process_line("a(4);")), 3000);
    assert_eq!(exec_error_code(interp.process_line("a(1.5);")), 3001);
    assert_eq!(exec_error_code(interp.process_line(r#"a("x");"#)), 3002);
}

#[test]
fn two_dimensional_arrays_are_row_major() {
    let mut interp = interpreter();
    interp
        .process_line("var m(2, 3) = 0; m(1, 2) = 12; m(2, 1) = 21; m(1, 2) + m(2, 1);")
        .unwrap();
    assert_eq!(last_long(&interp), 33);
}

#[test]
fn if_elseif_else_chain() {
    let mut interp = interpreter();
    interp.process_line("var r = 0; var x = 2;").unwrap();
    interp
        .process_line("if x == 1; r = 10; elseif x == 2; r = 20; else; r = 30; end; r;")
        .unwrap();
    assert_eq!(last_long(&interp), 20);
    interp.process_line("x = 9;").unwrap();
    interp
        .process_line("if x == 1; r = 10; elseif x == 2; r = 20; else; r = 30; end; r;")
        .unwrap();
    assert_eq!(last_long(&interp), 30);
}

#[test]
fn while_loop_runs_to_completion() {
    let mut interp = interpreter();
    interp.process_line("var n = 0; var total = 0;").unwrap();
    interp.process_line("while n < 5; n += 1; total += n; end; total;").unwrap();
    assert_eq!(last_long(&interp), 15);
}

#[test]
fn for_loop_with_break() {
    let mut interp = interpreter();
    interp.process_line("var i = 0;").unwrap();
    interp.process_line("for i = 1, 3; if i == 2; break; end; end; i;").unwrap();
    assert_eq!(last_long(&interp), 2);
}

#[test]
fn for_loop_iteration_counts() {
    let mut interp = interpreter();
    // a > b with a positive step: zero iterations
    interp.process_line("var i = 0; var count = 0;").unwrap();
    interp.process_line("for i = 5, 3; count += 1; end; count;").unwrap();
    assert_eq!(last_long(&interp), 0);
    // a = b: exactly one iteration
    interp.process_line("count = 0; for i = 3, 3; count += 1; end; count;").unwrap();
    assert_eq!(last_long(&interp), 1);
}

#[test]
fn for_loop_counts_down_with_negative_step() {
    let mut interp = interpreter();
    interp.process_line("var i = 0; var total = 0;").unwrap();
    interp.process_line("for i = 5, 1, -1; total += i; end; total;").unwrap();
    assert_eq!(last_long(&interp), 15);
}

#[test]
fn continue_skips_to_next_iteration() {
    let mut interp = interpreter();
    interp.process_line("var i = 0; var total = 0;").unwrap();
    interp
        .process_line("for i = 1, 5; if i == 3; continue; end; total += i; end; total;")
        .unwrap();
    assert_eq!(last_long(&interp), 12);
}

#[test]
fn prefix_and_postfix_increment() {
    let mut interp = interpreter();
    interp.process_line("var v = 5;").unwrap();
    interp.process_line("v++;").unwrap();
    assert_eq!(last_long(&interp), 5); // postfix yields the unmodified value
    interp.process_line("v;").unwrap();
    assert_eq!(last_long(&interp), 6);
    interp.process_line("++v;").unwrap();
    assert_eq!(last_long(&interp), 7); // prefix yields the modified value
}

#[test]
fn division_errors() {
    let mut interp = interpreter();
    assert_eq!(exec_error_code(interp.process_line("1 / 0;")), 3027);
    assert_eq!(exec_error_code(interp.process_line("0 / 0;")), 3024);
    assert_eq!(exec_error_code(interp.process_line("1.5 / 0.0;")), 3027);
}

#[test]
fn errors_preserve_user_variables_and_results() {
    let mut interp = interpreter();
    interp.process_line("var keep = 42; keep;").unwrap();
    assert!(interp.process_line("1 / 0;").is_err());
    interp.process_line("keep;").unwrap();
    assert_eq!(last_long(&interp), 42);
}

#[test]
fn builtin_math_functions() {
    let mut interp = interpreter();
    interp.process_line("sqrt(16);").unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Float(4.0)));
    interp.process_line("min(3, 2.5);").unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Float(2.5)));
    interp.process_line("abs(0 - 7);").unwrap();
    assert_eq!(last_long(&interp), 7);
    assert_eq!(exec_error_code(interp.process_line("sqrt(0 - 1);")), 3005);
}

#[test]
fn builtin_string_functions() {
    let mut interp = interpreter();
    interp.process_line(r#"len("hello");"#).unwrap();
    assert_eq!(last_long(&interp), 5);
    interp.process_line(r#"toUpper(left("justina", 4));"#).unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Str(Some("JUST".to_string()))));
    interp.process_line(r#"findInStr("interpreter", "ter");"#).unwrap();
    assert_eq!(last_long(&interp), 3);
    interp.process_line(r#"mid("abcdef", 2, 3);"#).unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Str(Some("bcd".to_string()))));
    assert_eq!(interp.heap_counters().intermediate_strings, 0);
}

#[test]
fn array_introspection_builtins() {
    let mut interp = interpreter();
    interp.process_line("var grid(4, 6) = 0;").unwrap();
    interp.process_line("ubound(grid, 2);").unwrap();
    assert_eq!(last_long(&interp), 6);
    interp.process_line("dims(grid);").unwrap();
    assert_eq!(last_long(&interp), 2);
}

#[test]
fn last_result_fifo() {
    let mut interp = interpreter();
    interp.process_line("11;").unwrap();
    interp.process_line("22;").unwrap();
    interp.process_line("33;").unwrap();
    interp.process_line("r(2);").unwrap();
    // r(2) was evaluated before the FIFO shifted this line's own result in
    assert_eq!(last_long(&interp), 22);
    interp.process_line("r(1) + r(2);").unwrap();
    assert_eq!(last_long(&interp), 22 + 33);
}

#[test]
fn several_results_in_one_line_collapse() {
    let mut interp = interpreter();
    interp.process_line("1; 2; 3;").unwrap();
    assert_eq!(last_long(&interp), 3);
    // the line stored exactly one FIFO entry, so depth 2 does not exist yet
    assert_eq!(exec_error_code(interp.process_line("r(2);")), 3007);
}

#[test]
fn ifte_selects_by_condition() {
    let mut interp = interpreter();
    interp.process_line("ifte(0, 10, 1, 20, 30);").unwrap();
    assert_eq!(last_long(&interp), 20);
    interp.process_line("ifte(0, 10, 0, 20, 30);").unwrap();
    assert_eq!(last_long(&interp), 30);
}

#[test]
fn print_commands_write_to_the_console() {
    let console = BufferConsole::new();
    let output = console.output();
    let mut interp = Interpreter::new(console);
    interp.process_line(r#"print "value:", 13;"#).unwrap();
    interp.process_line("coutList 1, 2, 3;").unwrap();
    let text = output.borrow().clone();
    assert!(text.contains("value:13\n"), "unexpected output: {text:?}");
    assert!(text.contains("1, 2, 3\n"), "unexpected output: {text:?}");
}

#[test]
fn input_command_assigns_and_converts() {
    let console = BufferConsole::with_input(&["42", "hello"]);
    let mut interp = Interpreter::new(console);
    interp.process_line("var x = 0; var s = 0;").unwrap();
    interp.process_line(r#"input "x?", x; x;"#).unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Long(42)));
    interp.process_line(r#"input "s?", s; s;"#).unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Str(Some("hello".to_string()))));
}

#[test]
fn display_settings_commands() {
    let console = BufferConsole::new();
    let output = console.output();
    let mut interp = Interpreter::new(console);
    interp.process_line(r#"intFmt "X"; cout 255;"#).unwrap();
    assert!(output.borrow().contains("FF"));
    interp.process_line(r#"intFmt "Q";"#).unwrap_err();
    assert_eq!(exec_error_code(interp.process_line(r#"intFmt "Q";"#)), 3007);
}

#[test]
fn abort_request_terminates_the_statement() {
    let mut interp = interpreter();
    interp.set_housekeeping(Box::new(|flags| {
        flags.request(justina_core::global::app_flags::REQ_ABORT);
    }));
    interp.process_line("var i = 0;").unwrap();
    let status = interp.process_line("for i = 1, 100000; end; i;").unwrap();
    assert_eq!(status, justina_core::ExecStatus::Aborted);
}
