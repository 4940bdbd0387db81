use justina_core::logger::init_logger;
use justina_core::{BufferConsole, Interpreter, JustinaError, ParseErrorCode};

fn interpreter() -> Interpreter {
    init_logger();
    Interpreter::new(BufferConsole::new())
}

fn parse_error_code(result: Result<justina_core::ExecStatus, JustinaError>) -> ParseErrorCode {
    match result {
        Err(JustinaError::Parse(err)) => err.code(),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn undeclared_variable_is_rejected() {
    let mut interp = interpreter();
    let code = parse_error_code(interp.process_line("a + 1;"));
    assert_eq!(code, ParseErrorCode::VarNotDeclared);
}

#[test]
fn redeclaring_a_user_variable_fails() {
    let mut interp = interpreter();
    interp.process_line("var a = 3;").unwrap();
    let code = parse_error_code(interp.process_line("var a = 4;"));
    assert_eq!(code, ParseErrorCode::VarRedeclared);
}

#[test]
fn redeclaring_after_clear_succeeds() {
    let mut interp = interpreter();
    interp.process_line("var a = 3;").unwrap();
    interp.process_line("clearMem;").unwrap();
    interp.process_line("var a = 4; a;").unwrap();
    assert_eq!(interp.last_result(), Some(&justina_core::Value::Long(4)));
}

#[test]
fn operator_sequence_errors() {
    let mut interp = interpreter();
    interp.process_line("var a = 1;").unwrap();
    assert_eq!(
        parse_error_code(interp.process_line("a + * 2;")),
        ParseErrorCode::PrefixOperatorNotAllowedHere
    );
    assert_eq!(
        parse_error_code(interp.process_line("a + 2 3;")),
        ParseErrorCode::NumConstNotAllowedHere
    );
    assert_eq!(
        parse_error_code(interp.process_line("a +;")),
        ParseErrorCode::ExpressionNotComplete
    );
}

#[test]
fn assignment_needs_an_assignable_target() {
    let mut interp = interpreter();
    interp.process_line("var a = 1;").unwrap();
    assert_eq!(
        parse_error_code(interp.process_line("3 = a;")),
        ParseErrorCode::AssignmentNotAllowedHere
    );
    interp.process_line("const c = 2;").unwrap();
    assert_eq!(
        parse_error_code(interp.process_line("c = 5;")),
        ParseErrorCode::ConstantVarCannotBeChanged
    );
}

#[test]
fn parentheses_must_balance() {
    let mut interp = interpreter();
    interp.process_line("var a = 1;").unwrap();
    assert_eq!(
        parse_error_code(interp.process_line("(a + 1;")),
        ParseErrorCode::MissingRightParenthesis
    );
    assert_eq!(
        parse_error_code(interp.process_line("a + 1);")),
        ParseErrorCode::MissingLeftParenthesis
    );
}

#[test]
fn string_constant_rules() {
    let mut interp = interpreter();
    interp.process_line(r#"var ok = "a\\b\"c";"#).unwrap();
    assert_eq!(
        parse_error_code(interp.process_line(r#"var bad = "a\nb";"#)),
        ParseErrorCode::AlphaConstInvalidEscSeq
    );
    let too_long = format!("var long2 = \"{}\";", "x".repeat(61));
    assert_eq!(
        parse_error_code(interp.process_line(&too_long)),
        ParseErrorCode::AlphaConstTooLong
    );
}

#[test]
fn identifier_length_is_limited() {
    let mut interp = interpreter();
    let code = parse_error_code(interp.process_line("var abcdefghijklmnop = 1;"));
    assert_eq!(code, ParseErrorCode::IdentifierTooLong);
}

#[test]
fn builtin_argument_count_is_checked() {
    let mut interp = interpreter();
    assert_eq!(
        parse_error_code(interp.process_line("sqrt(1, 2);")),
        ParseErrorCode::WrongArgCount
    );
    assert_eq!(
        parse_error_code(interp.process_line("ubound(1, 1);")),
        ParseErrorCode::ArrayArgExpected
    );
}

#[test]
fn block_sequence_is_validated() {
    let mut interp = interpreter();
    assert_eq!(parse_error_code(interp.process_line("end;")), ParseErrorCode::NoOpenBlock);
    assert_eq!(parse_error_code(interp.process_line("break;")), ParseErrorCode::NoOpenLoop);
    assert_eq!(
        parse_error_code(interp.process_line("if 1; else; elseif 1; end;")),
        ParseErrorCode::WrongBlockSequence
    );
    assert_eq!(
        parse_error_code(interp.process_line("while 1; 1;")),
        ParseErrorCode::NoBlockEnd
    );
}

#[test]
fn commands_check_argument_counts() {
    let mut interp = interpreter();
    assert_eq!(
        parse_error_code(interp.process_line("dispMode 1;")),
        ParseErrorCode::CmdParameterMissing
    );
    assert_eq!(
        parse_error_code(interp.process_line("dispMode 1, 1, 1;")),
        ParseErrorCode::CmdHasTooManyParameters
    );
    assert_eq!(
        parse_error_code(interp.process_line("input 1, 2;")),
        ParseErrorCode::VariableExpectedAsCmdPar
    );
}

#[test]
fn array_declarations_are_validated() {
    let mut interp = interpreter();
    assert_eq!(
        parse_error_code(interp.process_line("var a(1, 2, 3, 4);")),
        ParseErrorCode::ArrayDefMaxDimsExceeded
    );
    assert_eq!(
        parse_error_code(interp.process_line("var b(300);")),
        ParseErrorCode::ArrayDefMaxElementsExceeded
    );
    assert_eq!(
        parse_error_code(interp.process_line("var c(0);")),
        ParseErrorCode::ArrayDimNotValid
    );
    assert_eq!(
        parse_error_code(interp.process_line(r#"var d(3) = "x";"#)),
        ParseErrorCode::ArrayInitEmptyStringExpected
    );
}

#[test]
fn subscript_count_matches_declaration() {
    let mut interp = interpreter();
    interp.process_line("var m(2, 3) = 0;").unwrap();
    assert_eq!(
        parse_error_code(interp.process_line("m(1);")),
        ParseErrorCode::ArrayUseWrongDimCount
    );
    interp.process_line("m(2, 3);").unwrap();
}

#[test]
fn block_links_form_closed_chains() {
    let mut interp = interpreter();
    interp
        .load_program(
            "program demo;\nfunction f(n);\nfor n = 1, 3;\nif n == 2;\nbreak;\nend;\nend;\nreturn n;\nend;\n",
        )
        .unwrap();
    assert!(interp.verify_block_links());
}

#[test]
fn pretty_print_round_trips() {
    let source = r#"var a = 3; var s = "he"; a + 2 * (a - 1); s + "llo";"#;
    let mut first = interpreter();
    first.process_line(source).unwrap();
    let printed = first.decompile_area(justina_core::program::Area::Immediate);

    let mut second = interpreter();
    second.process_line(&printed).unwrap();
    let reprinted = second.decompile_area(justina_core::program::Area::Immediate);
    assert_eq!(printed, reprinted);
    assert_eq!(first.last_result(), second.last_result());
}
