use indoc::indoc;
use justina_core::logger::init_logger;
use justina_core::{BufferConsole, ExecStatus, Interpreter, Value};

fn interpreter() -> Interpreter {
    init_logger();
    Interpreter::new(BufferConsole::new())
}

#[test]
fn clear_mem_releases_every_heap_object() {
    let mut interp = interpreter();
    interp
        .process_line(r#"var s = "text"; var a(4) = 1; var m(2, 2) = 0; a(2) = 9;"#)
        .unwrap();
    assert!(!interp.heap_counters().all_zero());
    interp.process_line("clearMem;").unwrap();
    assert!(interp.heap_counters().all_zero(), "leaks: {:?}", interp.heap_counters());
}

#[test]
fn machine_reset_balances_program_objects() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            var greeting = "hi";
            var table(5) = 0;
            function touch(v);
            static hits = 0;
            hits += 1;
            return v;
            end;
        "#})
        .unwrap();
    interp.process_line("touch(3);").unwrap();
    interp.reset_machine(true);
    assert!(interp.heap_counters().all_zero(), "leaks: {:?}", interp.heap_counters());
}

#[test]
fn string_array_elements_are_accounted() {
    let mut interp = interpreter();
    interp.process_line(r#"var words(3) = ""; words(1) = "alpha"; words(2) = "beta";"#).unwrap();
    assert_eq!(interp.heap_counters().user_var_strings, 2);
    interp.process_line(r#"words(1) = "";"#).unwrap();
    assert_eq!(interp.heap_counters().user_var_strings, 1);
    interp.process_line("clearMem;").unwrap();
    assert!(interp.heap_counters().all_zero());
}

#[test]
fn intermediates_never_survive_a_statement() {
    let mut interp = interpreter();
    interp.process_line(r#"var s = "a"; s + "b" + "c" + "d";"#).unwrap();
    assert_eq!(interp.heap_counters().intermediate_strings, 0);
    // also when the statement fails mid-expression
    assert!(interp.process_line(r#"s + "x" + (1 / 0);"#).is_err());
    assert_eq!(interp.heap_counters().intermediate_strings, 0);
}

#[test]
fn function_locals_are_released_on_error_paths() {
    let mut interp = interpreter();
    interp
        .load_program(indoc! {r#"
            program demo;
            function boom(n);
            local tmp(8) = 0;
            local txt = "scratch";
            return n / 0;
            end;
        "#})
        .unwrap();
    assert!(interp.process_line("boom(3);").is_err());
    assert_eq!(interp.heap_counters().local_arrays, 0);
    assert_eq!(interp.heap_counters().local_var_strings, 0);
}

#[test]
fn clear_prog_keeps_user_variables() {
    let mut interp = interpreter();
    interp.process_line(r#"var keep = "mine";"#).unwrap();
    interp
        .load_program(indoc! {r#"
            program demo;
            var table(5) = 0;
            function f();
            return 1;
            end;
        "#})
        .unwrap();
    interp.process_line("clearProg;").unwrap();
    assert_eq!(interp.heap_counters().global_static_arrays, 0);
    interp.process_line("keep;").unwrap();
    assert_eq!(interp.last_result(), Some(&Value::Str(Some("mine".to_string()))));
}

#[test]
fn quit_reports_back_to_the_host() {
    let mut interp = interpreter();
    let status = interp.process_line("quit;").unwrap();
    assert_eq!(status, ExecStatus::Quit);
}

#[test]
fn last_result_fifo_strings_are_released_on_reset() {
    let mut interp = interpreter();
    for i in 0..12 {
        interp.process_line(&format!(r#""text{i}";"#)).unwrap();
    }
    assert!(interp.heap_counters().last_value_strings > 0);
    interp.reset_machine(true);
    assert!(interp.heap_counters().all_zero());
}

#[test]
fn kill_request_tears_the_machine_down() {
    let mut interp = interpreter();
    interp.process_line(r#"var s = "data"; var a(3) = 0;"#).unwrap();
    interp.set_housekeeping(Box::new(|flags| {
        flags.request(justina_core::global::app_flags::REQ_KILL);
    }));
    let status = interp.process_line("1 + 1;").unwrap();
    assert_eq!(status, ExecStatus::Killed);
    assert!(interp.heap_counters().all_zero());
}
