use crate::global::commands::command_def;
use crate::global::functions::function_def;
use crate::global::terminals::terminal_def;
use crate::global::token_codes::{TermCode, TokenType};
use crate::interpreter::Interpreter;
use crate::program::Area;
use crate::values::attribs::{VarAttribs, VarScope};
use crate::values::value::Value;

/// Pretty-printing of parsed token streams back to source text: used for
/// error reporting (the offending statement) and program listings.
/// Reparsing the output yields an equivalent token stream.
impl Interpreter {
    /// Renders one statement, starting at the given token step, up to and
    /// including its terminating semicolon.
    pub fn decompile_statement(&self, start: u16) -> String {
        let mut out = String::new();
        let mut step = start;
        loop {
            match self.program.token_type(step) {
                TokenType::NoToken => break,
                token_type => {
                    let text = self.token_text(step, token_type);
                    push_with_spacing(&mut out, &text);
                    let is_semicolon = token_type.is_terminal()
                        && self.program.terminal_code(step) == TermCode::Semicolon;
                    step = self.program.next_step(step);
                    if is_semicolon {
                        break;
                    }
                }
            }
        }
        out
    }

    /// Renders all statements of an area, one per line.
    pub fn decompile_area(&self, area: Area) -> String {
        let mut out = String::new();
        let mut step = self.program.area_start(area);
        while self.program.token_type(step) != TokenType::NoToken {
            let statement = self.decompile_statement(step);
            // advance past this statement
            loop {
                let is_semicolon = self.program.token_type(step).is_terminal()
                    && self.program.terminal_code(step) == TermCode::Semicolon;
                step = self.program.next_step(step);
                if is_semicolon || self.program.token_type(step) == TokenType::NoToken {
                    break;
                }
            }
            out.push_str(&statement);
            out.push('\n');
        }
        out
    }

    fn token_text(&self, step: u16, token_type: TokenType) -> String {
        match token_type {
            TokenType::ReservedWord => {
                command_def(self.program.resword_index(step)).name.to_string()
            }
            TokenType::InternalFunction => {
                function_def(self.program.function_index(step)).name.to_string()
            }
            TokenType::UserFunction => {
                self.symbols.function_name(self.program.function_index(step)).to_string()
            }
            TokenType::Variable => {
                let (attrib_byte, name_index, value_index) = self.program.variable_token(step);
                let attribs = VarAttribs::from_byte(attrib_byte);
                if attribs.scope() == VarScope::User {
                    self.symbols.user_var_name(value_index as usize).to_string()
                } else {
                    self.symbols.prog_var_name(name_index).to_string()
                }
            }
            TokenType::Constant => format_constant(&self.program.constant_value(step)),
            TokenType::GenericName => self.program.generic_name(step).to_string(),
            _ => terminal_def(self.program.terminal_index(step)).name.to_string(),
        }
    }
}

/// Appends a token text with source-like spacing: no blank before separators
/// and closing parentheses, none after an opening parenthesis.
fn push_with_spacing(out: &mut String, text: &str) {
    let prev_is_name = out.ends_with(|c: char| c.is_alphanumeric() || c == '_' || c == '"');
    let no_space = out.is_empty()
        || out.ends_with('(')
        || matches!(text, "," | ";" | ")")
        || (text == "(" && prev_is_name);
    if !no_space {
        out.push(' ');
    }
    out.push_str(text);
}

/// Renders a parsed constant so that reparsing restores the same value and
/// value type.
fn format_constant(value: &Value) -> String {
    match value {
        Value::Long(v) if *v < 0 => format!("0x{:X}", *v as u32),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => {
            let mut text = format!("{v}");
            if !text.contains('.') && !text.contains('e') && !text.contains("inf") {
                text.push_str(".0");
            }
            text
        }
        Value::Str(s) => {
            let mut out = String::from('"');
            for c in s.as_deref().unwrap_or("").chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    other => out.push(other),
                }
            }
            out.push('"');
            out
        }
    }
}
