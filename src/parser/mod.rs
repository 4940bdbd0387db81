pub mod error;
pub mod lexer;
pub mod stack;
pub mod symbols;

use crate::global::commands::{
    command_def, find_command, BlockPos, BlockType, CmdDef, CMD_ONLY_IMMEDIATE,
    CMD_ONLY_IMM_OR_IN_FUNC, CMD_ONLY_IN_FUNCTION, CMD_ONLY_IN_PROGRAM, CMD_ONLY_PROGRAM_TOP,
    CMD_USAGE_MASK, PAR_IDENT, PAR_MULTIPLE, PAR_TYPE_MASK,
    PAR_VAR_OPT_ASSIGNMENT,
};
use crate::global::functions::{find_function, function_def};
use crate::global::terminals::{terminal_def, PRIO_MASK};
use crate::global::token_codes::{CmdCode, TermCode};
use crate::global::{MAX_ALPHA_LEN, MAX_IDENT_LEN, MAX_LOCAL_VARS_PER_FUNC, MAX_STATIC_VARS};
use crate::interpreter::Interpreter;
use crate::parser::error::{ParseError, ParseErrorCode};
use crate::parser::lexer::{lex, Lexeme, RawToken};
use crate::parser::stack::{
    OpenBlockFrame, OpenParenFrame, ParsingStack, FLAG_ARRAY, FLAG_ARRAY_ELEM_ASSIGNMENT_ALLOWED,
    FLAG_ARRAY_ELEM_INCR_DECR_ALLOWED, FLAG_INTERNAL_FUNC, FLAG_OPEN_PAREN_ONLY, FLAG_USER_FUNC,
    FLAG_USER_FUNC_DEFINED, StackFrame,
};
use crate::parser::symbols::FUNC_ARGS_NOT_SET_MIN;
use crate::program::Area;
use crate::values::array::{MAX_ARRAY_DIMS, MAX_ARRAY_ELEMS};
use crate::values::attribs::{VarAttribs, VarScope};
use crate::values::slots::{SlotValue, VarSlot};
use crate::values::value::{Value, ValueKind};
use crate::values::ArrayObject;
use log::debug;

// last-token group bits: each recognizer checks the group of the previous
// token against an allowed-predecessors mask

const GROUP_OP: u8 = 1 << 0;
const GROUP_COMMA: u8 = 1 << 1;
/// Line start, semicolon, reserved word, generic identifier.
const GROUP_STMT_START: u8 = 1 << 2;
/// Number, string constant, right parenthesis.
const GROUP_VALUE: u8 = 1 << 3;
const GROUP_FN_NAME: u8 = 1 << 4;
const GROUP_LEFT_PAR: u8 = 1 << 5;
const GROUP_VAR: u8 = 1 << 6;

const BEFORE_OPERAND: u8 = GROUP_OP | GROUP_COMMA | GROUP_STMT_START | GROUP_LEFT_PAR;
const BEFORE_FN_NAME: u8 = BEFORE_OPERAND;
const BEFORE_LEFT_PAR: u8 = BEFORE_OPERAND | GROUP_FN_NAME | GROUP_VAR;
const BEFORE_RIGHT_PAR: u8 = GROUP_VALUE | GROUP_VAR | GROUP_LEFT_PAR;
const BEFORE_COMMA: u8 = GROUP_VALUE | GROUP_VAR;
const BEFORE_SEMICOLON: u8 = GROUP_VALUE | GROUP_VAR | GROUP_STMT_START;
const BEFORE_INFIX: u8 = GROUP_VALUE | GROUP_VAR;
const BEFORE_PREFIX: u8 = BEFORE_OPERAND;

/// A local or parameter variable of the function currently being parsed.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub name_index: u8,
    pub local_index: u8,
    pub is_param: bool,
    pub is_array: bool,
    pub dims: [u8; MAX_ARRAY_DIMS],
    pub dim_count: u8,
}

/// Pending function-name info between the name token and its left parenthesis.
#[derive(Debug, Clone, Copy)]
enum PendingFn {
    Internal(u8),
    User(u8),
}

/// Persistent parser state: the parser processes one statement per call and
/// keeps open blocks, function definition state and declaration counters
/// across calls.
#[derive(Debug, Default)]
pub struct ParserState {
    pub(crate) stack: ParsingStack,
    pub(crate) paren_level: usize,
    pub(crate) block_level: usize,

    last_group: u8,
    pending_prefix_incr_decr: bool,
    array_elem_assignment_allowed: bool,
    array_elem_incr_decr_allowed: bool,
    pending_fn: Option<PendingFn>,
    /// The variable pushed last is a whole (unsubscripted) array.
    last_var_whole_array: bool,
    last_var_is_const: bool,
    /// Declared dimension count of the variable pushed last (0 for scalars
    /// and parameter arrays).
    last_var_dims: u8,

    is_command: bool,
    cmd_index: u8,
    cmd_arg_no: usize,
    cmd_arg_token_count: usize,

    // function definition state
    pub(crate) in_function_block: bool,
    pub(crate) current_function: u8,
    param_only_count: u8,
    local_var_count: u8,
    local_names: Vec<LocalEntry>,
    static_names: Vec<(u8, u8)>,

    /// Statements parsed into the program area (for the program-top check).
    program_statement_count: usize,
}

impl ParserState {
    pub fn reset(&mut self) {
        *self = ParserState::default();
    }

    fn begin_statement(&mut self) {
        self.last_group = GROUP_STMT_START;
        self.pending_prefix_incr_decr = false;
        self.array_elem_assignment_allowed = false;
        self.array_elem_incr_decr_allowed = false;
        self.pending_fn = None;
        self.last_var_whole_array = false;
        self.last_var_is_const = false;
        self.is_command = false;
        self.cmd_arg_no = 0;
        self.cmd_arg_token_count = 0;
    }
}

/// Cursor over the lexed source of one input (line or program stream).
struct TokenStream<'a> {
    lexemes: &'a [Lexeme],
    pos: usize,
    src_len: usize,
}

impl<'a> TokenStream<'a> {
    fn peek(&self) -> Option<&'a Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Lexeme> {
        self.lexemes.get(self.pos + offset)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        self.pos >= self.lexemes.len()
    }

    /// Source position of the current lexeme (for error reporting).
    fn here(&self) -> usize {
        self.peek().map(|(_, span)| span.start).unwrap_or(self.src_len)
    }

    fn next_is_terminal(&self, code: TermCode) -> bool {
        matches!(self.peek(), Some((Ok(RawToken::Terminal(c)), _)) if *c == code)
    }

    fn next_after_is_terminal(&self, code: TermCode) -> bool {
        matches!(self.peek_at(1), Some((Ok(RawToken::Terminal(c)), _)) if *c == code)
    }
}

impl Interpreter {
    /// Parses all statements of a source fragment into the current area
    /// (program or immediate). On error the offending statement is discarded
    /// and the error carries the position of the offending character.
    pub fn parse_source(&mut self, source: &str) -> Result<(), ParseError> {
        let lexemes = lex(source);
        let mut ts = TokenStream { lexemes: &lexemes, pos: 0, src_len: source.len() };
        while !ts.at_end() {
            self.parse_statement(&mut ts)?;
        }
        Ok(())
    }

    /// Checks that an immediate-mode line left no open parentheses or blocks.
    pub(crate) fn check_line_complete(&self) -> Result<(), ParseError> {
        if self.parser.paren_level > 0 {
            return Err(ParseError::new(ParseErrorCode::MissingRightParenthesis, 0));
        }
        if !self.program_mode && self.parser.block_level > 0 {
            return Err(ParseError::new(ParseErrorCode::NoBlockEnd, 0));
        }
        Ok(())
    }

    fn cur_area(&self) -> Area {
        if self.program_mode { Area::Program } else { Area::Immediate }
    }


    // ---- statement entry point ----

    /// Parses one statement (through its terminating semicolon), appending its
    /// tokens to the program buffer.
    fn parse_statement(&mut self, ts: &mut TokenStream) -> Result<(), ParseError> {
        self.parser.begin_statement();

        let Some((first, span)) = ts.peek() else { return Ok(()) };
        let pos = span.start;
        if let Ok(RawToken::Identifier(name)) = first {
            if let Some((cmd_index, def)) = find_command(name) {
                ts.advance();
                return self.parse_command(cmd_index, def, pos, ts);
            }
        }
        self.parse_until_semicolon(ts)?;
        if self.program_mode {
            self.parser.program_statement_count += 1;
        }
        Ok(())
    }

    // ---- command statements ----

    fn parse_command(
        &mut self,
        cmd_index: u8,
        def: &'static CmdDef,
        pos: usize,
        ts: &mut TokenStream,
    ) -> Result<(), ParseError> {
        self.check_command_usage(def, pos)?;
        debug!("parsing command '{}'", def.name);

        let is_block = def.block.block_type != BlockType::None;
        let area = self.cur_area();
        let step = self
            .program
            .append_resword(area, cmd_index, is_block)
            .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;

        self.check_block_sequence(def, step, pos)?;

        self.parser.is_command = true;
        self.parser.cmd_index = cmd_index;
        self.parser.last_group = GROUP_STMT_START;

        match def.code {
            CmdCode::Var | CmdCode::ConstVar | CmdCode::Static | CmdCode::Local => {
                self.parse_declaration_list(def.code, ts)?
            }
            CmdCode::Function => self.parse_function_definition(ts)?,
            CmdCode::Program => self.parse_generic_name_args(ts)?,
            CmdCode::DeleteVar => self.parse_generic_name_args(ts)?,
            _ => self.parse_until_semicolon(ts)?,
        }
        if self.program_mode {
            self.parser.program_statement_count += 1;
        }
        Ok(())
    }

    fn check_command_usage(&self, def: &CmdDef, pos: usize) -> Result<(), ParseError> {
        let usage = def.restrictions & CMD_USAGE_MASK;
        let in_func = self.parser.in_function_block;
        let code = match usage {
            CMD_ONLY_IMMEDIATE if self.program_mode => Some(ParseErrorCode::OnlyImmediateMode),
            CMD_ONLY_IN_PROGRAM if !self.program_mode => Some(ParseErrorCode::OnlyInsideProgram),
            CMD_ONLY_IN_FUNCTION if !in_func => Some(ParseErrorCode::OnlyInsideFunction),
            CMD_ONLY_IMM_OR_IN_FUNC if self.program_mode && !in_func => {
                Some(ParseErrorCode::OnlyImmediateOrInFunction)
            }
            CMD_ONLY_PROGRAM_TOP
                if !self.program_mode || self.parser.program_statement_count != 0 =>
            {
                Some(ParseErrorCode::OnlyProgramStart)
            }
            _ => None,
        };
        match code {
            Some(code) => Err(err(code, pos)),
            None => Ok(()),
        }
    }

    /// Open-block bookkeeping for block commands: start commands push a frame,
    /// mid and end commands are validated against the innermost open block and
    /// linked into the forward token chain, alter-flow commands are linked to
    /// the enclosing loop or function.
    fn check_block_sequence(
        &mut self,
        def: &CmdDef,
        step: u16,
        pos: usize,
    ) -> Result<(), ParseError> {
        match def.block.block_type {
            BlockType::None => Ok(()),
            BlockType::Function | BlockType::For | BlockType::While | BlockType::If
                if def.block.pos == BlockPos::Start =>
            {
                if def.block.block_type == BlockType::Function && self.parser.in_function_block {
                    return Err(err(ParseErrorCode::FunctionDefsCannotBeNested, pos));
                }
                self.parser.stack.push_block(OpenBlockFrame {
                    block_type: def.block.block_type,
                    pos: BlockPos::Start,
                    start_step: step,
                    last_step: step,
                    function_index: 0,
                });
                self.parser.block_level += 1;
                Ok(())
            }
            BlockType::Function | BlockType::For | BlockType::While => {
                unreachable!("Function/For/While blocks always have BlockPos::Start")
            }
            BlockType::If => {
                // elseif, else
                let Some(frame) = self.parser.stack.top_block_mut() else {
                    return Err(err(ParseErrorCode::NoOpenBlock, pos));
                };
                if frame.block_type != BlockType::If {
                    return Err(err(ParseErrorCode::NotAllowedInThisOpenBlock, pos));
                }
                if frame.pos < def.block.min_predecessor || frame.pos > def.block.max_predecessor {
                    return Err(err(ParseErrorCode::WrongBlockSequence, pos));
                }
                let prev = frame.last_step;
                frame.last_step = step;
                frame.pos = def.block.pos;
                self.program.set_block_step(prev, step);
                Ok(())
            }
            BlockType::GenericEnd => {
                // statements start with all parentheses closed, so the top
                // frame is the innermost open block (if any)
                match self.parser.stack.pop() {
                    Some(StackFrame::Block(frame)) => {
                        self.program.set_block_step(frame.last_step, step);
                        self.program.set_block_step(step, frame.start_step);
                        self.parser.block_level -= 1;
                        if frame.block_type == BlockType::Function {
                            self.finalize_function_block();
                        }
                        Ok(())
                    }
                    Some(frame @ StackFrame::Paren(_)) => {
                        let StackFrame::Paren(paren) = frame else { unreachable!() };
                        self.parser.stack.push_paren(paren);
                        Err(err(ParseErrorCode::MissingRightParenthesis, pos))
                    }
                    None => Err(err(ParseErrorCode::NoOpenBlock, pos)),
                }
            }
            BlockType::AlterFlow => {
                if def.block.pos == BlockPos::InOpenLoop {
                    let Some(frame) = self.parser.stack.enclosing_loop() else {
                        return Err(err(ParseErrorCode::NoOpenLoop, pos));
                    };
                    self.program.set_block_step(step, frame.start_step);
                } else {
                    let Some(frame) = self.parser.stack.enclosing_function() else {
                        return Err(err(ParseErrorCode::NoOpenFunction, pos));
                    };
                    self.program.set_block_step(step, frame.start_step);
                }
                Ok(())
            }
        }
    }

    fn finalize_function_block(&mut self) {
        let entry = self.symbols.function_mut(self.parser.current_function);
        entry.local_var_count = self.parser.local_var_count;
        self.parser.in_function_block = false;
        self.parser.local_names.clear();
        self.parser.static_names.clear();
        self.parser.param_only_count = 0;
        self.parser.local_var_count = 0;
    }

    // ---- generic expression / command argument parsing ----

    /// Parses expression tokens up to and including the statement's
    /// terminating semicolon, running the recognizer chain with sequence
    /// checks for every token.
    fn parse_until_semicolon(&mut self, ts: &mut TokenStream) -> Result<(), ParseError> {
        loop {
            let Some((lexeme, span)) = ts.peek() else {
                return Err(err(ParseErrorCode::ExpressionNotComplete, ts.here()));
            };
            let pos = span.start;
            let token = lexeme.clone().map_err(|_| err(ParseErrorCode::TokenNotRecognised, pos))?;
            match token {
                RawToken::Terminal(TermCode::Semicolon) => {
                    self.handle_semicolon(pos)?;
                    ts.advance();
                    return Ok(());
                }
                RawToken::Terminal(code) => {
                    self.handle_terminal(code, pos, ts)?;
                    ts.advance();
                }
                RawToken::IntLiteral(_)
                | RawToken::HexLiteral(_)
                | RawToken::BinLiteral(_)
                | RawToken::FloatLiteral(_)
                | RawToken::StringLiteral(_) => {
                    let value = parse_literal(&token).map_err(|code| err(code, pos))?;
                    self.handle_constant(value, pos)?;
                    ts.advance();
                }
                RawToken::Identifier(name) => {
                    self.handle_identifier(&name, pos, ts)?;
                    ts.advance();
                }
            }
        }
    }

    fn count_command_token(&mut self) {
        if self.parser.is_command {
            self.parser.cmd_arg_token_count += 1;
        }
    }

    /// Validates the first token of a command argument against the command's
    /// parameter pattern.
    fn check_cmd_arg_start(&self, group: u8, pos: usize) -> Result<(), ParseError> {
        if !self.parser.is_command || self.parser.cmd_arg_token_count != 0 {
            return Ok(());
        }
        let def = command_def(self.parser.cmd_index);
        let Some(par) = allowed_par_type(&def.param_pattern, self.parser.cmd_arg_no) else {
            return Err(err(ParseErrorCode::CmdHasTooManyParameters, pos));
        };
        match par & PAR_TYPE_MASK {
            PAR_VAR_OPT_ASSIGNMENT if group != GROUP_VAR => {
                Err(err(ParseErrorCode::VariableExpectedAsCmdPar, pos))
            }
            PAR_IDENT => Err(err(ParseErrorCode::IdentExpectedAsCmdPar, pos)),
            _ => Ok(()),
        }
    }

    fn handle_semicolon(&mut self, pos: usize) -> Result<(), ParseError> {
        if self.parser.paren_level > 0 {
            return Err(err(ParseErrorCode::MissingRightParenthesis, pos));
        }
        if self.parser.last_group & BEFORE_SEMICOLON == 0 {
            return Err(err(ParseErrorCode::ExpressionNotComplete, pos));
        }
        if self.parser.pending_prefix_incr_decr {
            return Err(err(ParseErrorCode::VariableNameExpected, pos));
        }

        if self.parser.is_command {
            let def = command_def(self.parser.cmd_index);
            let arg_count = if self.parser.cmd_arg_token_count > 0 {
                self.parser.cmd_arg_no + 1
            } else {
                self.parser.cmd_arg_no
            };
            if arg_count < def.min_args as usize {
                return Err(err(ParseErrorCode::CmdParameterMissing, pos));
            }
            if arg_count > def.max_args as usize {
                return Err(err(ParseErrorCode::CmdHasTooManyParameters, pos));
            }
        }

        self.append_terminal_checked(TermCode::Semicolon, pos)?;
        self.parser.begin_statement();
        Ok(())
    }

    fn handle_terminal(
        &mut self,
        code: TermCode,
        pos: usize,
        ts: &TokenStream,
    ) -> Result<(), ParseError> {
        match code {
            TermCode::Comma => self.handle_comma(pos),
            TermCode::LeftPar => self.handle_left_paren(pos),
            TermCode::RightPar => self.handle_right_paren(pos, ts),
            op => self.handle_operator(op, pos, ts),
        }
    }

    fn handle_comma(&mut self, pos: usize) -> Result<(), ParseError> {
        if self.parser.last_group & BEFORE_COMMA == 0 {
            return Err(err(ParseErrorCode::SeparatorNotAllowedHere, pos));
        }

        if self.parser.paren_level == 0 {
            if !self.parser.is_command {
                return Err(err(ParseErrorCode::SeparatorNotAllowedHere, pos));
            }
            // next command argument
            self.finish_paren_argument();
            self.parser.cmd_arg_no += 1;
            self.parser.cmd_arg_token_count = 0;
            let def = command_def(self.parser.cmd_index);
            if self.parser.cmd_arg_no >= def.max_args as usize {
                return Err(err(ParseErrorCode::CmdHasTooManyParameters, pos));
            }
        } else {
            self.finish_paren_argument();
            let frame = self.parser.stack.top_paren_mut().expect("open parenthesis");
            frame.arg_count += 1;
            if frame.flags & FLAG_OPEN_PAREN_ONLY != 0 {
                return Err(err(ParseErrorCode::SeparatorNotAllowedHere, pos));
            }
        }

        self.append_terminal_checked(TermCode::Comma, pos)?;
        self.parser.last_group = GROUP_COMMA;
        self.parser.last_var_whole_array = false;
        self.count_command_token();
        Ok(())
    }

    /// Records whether the argument just completed consisted of a whole
    /// (unsubscripted) array variable, for scalar/array pattern checks.
    fn finish_paren_argument(&mut self) {
        let is_array_arg =
            self.parser.last_group == GROUP_VAR && self.parser.last_var_whole_array;
        if let Some(frame) = self.parser.stack.top_paren_mut() {
            if is_array_arg && (frame.arg_count as usize) < 16 {
                frame.arg_array_mask |= 1 << frame.arg_count;
            }
        }
    }

    fn handle_left_paren(&mut self, pos: usize) -> Result<(), ParseError> {
        if self.parser.last_group & BEFORE_LEFT_PAR == 0 {
            return Err(err(ParseErrorCode::ParenthesisNotAllowedHere, pos));
        }
        self.check_cmd_arg_start(GROUP_LEFT_PAR, pos)?;

        let frame = if let Some(pending) = self.parser.pending_fn.take() {
            match pending {
                PendingFn::Internal(index) => {
                    let def = function_def(index);
                    OpenParenFrame {
                        min_args: def.min_args,
                        max_args: def.max_args,
                        array_dim_count: 0,
                        identifier_index: index,
                        variable_scope: VarScope::Unresolved,
                        arg_count: 0,
                        arg_array_mask: 0,
                        flags: FLAG_INTERNAL_FUNC,
                    }
                }
                PendingFn::User(index) => {
                    let entry = self.symbols.function(index);
                    let mut flags = FLAG_USER_FUNC;
                    let (min_args, max_args) = if entry.defined {
                        flags |= FLAG_USER_FUNC_DEFINED;
                        (entry.min_args, entry.max_args)
                    } else {
                        (0, FUNC_ARGS_NOT_SET_MIN - 1)
                    };
                    OpenParenFrame {
                        min_args,
                        max_args,
                        array_dim_count: 0,
                        identifier_index: index,
                        variable_scope: VarScope::Unresolved,
                        arg_count: 0,
                        arg_array_mask: 0,
                        flags,
                    }
                }
            }
        } else if self.parser.last_group == GROUP_VAR && self.parser.last_var_whole_array {
            // array subscripts
            let mut flags = FLAG_ARRAY;
            if !self.parser.last_var_is_const {
                flags |= FLAG_ARRAY_ELEM_ASSIGNMENT_ALLOWED | FLAG_ARRAY_ELEM_INCR_DECR_ALLOWED;
            }
            OpenParenFrame {
                min_args: 1,
                max_args: MAX_ARRAY_DIMS as u8,
                array_dim_count: self.parser.last_var_dims,
                identifier_index: 0,
                variable_scope: VarScope::Unresolved,
                arg_count: 0,
                arg_array_mask: 0,
                flags,
            }
        } else if self.parser.last_group == GROUP_VAR {
            // scalar variable followed by a parenthesis
            return Err(err(ParseErrorCode::VarDefinedAsScalar, pos));
        } else {
            OpenParenFrame {
                min_args: 1,
                max_args: 1,
                array_dim_count: 0,
                identifier_index: 0,
                variable_scope: VarScope::Unresolved,
                arg_count: 0,
                arg_array_mask: 0,
                flags: FLAG_OPEN_PAREN_ONLY,
            }
        };

        self.parser.last_var_whole_array = false;
        self.parser.stack.push_paren(frame);
        self.parser.paren_level += 1;
        self.append_terminal_checked(TermCode::LeftPar, pos)?;
        self.parser.last_group = GROUP_LEFT_PAR;
        self.count_command_token();
        Ok(())
    }

    fn handle_right_paren(&mut self, pos: usize, _ts: &TokenStream) -> Result<(), ParseError> {
        if self.parser.paren_level == 0 {
            return Err(err(ParseErrorCode::MissingLeftParenthesis, pos));
        }
        if self.parser.last_group & BEFORE_RIGHT_PAR == 0 {
            return Err(err(ParseErrorCode::ExpressionNotComplete, pos));
        }

        self.finish_paren_argument();
        let Some(StackFrame::Paren(mut frame)) = self.parser.stack.pop() else {
            return Err(err(ParseErrorCode::MissingLeftParenthesis, pos));
        };
        self.parser.paren_level -= 1;
        let had_argument = self.parser.last_group != GROUP_LEFT_PAR;
        if had_argument {
            frame.arg_count += 1;
        }

        if frame.flags & FLAG_INTERNAL_FUNC != 0 {
            self.close_internal_function_call(&frame, pos)?;
        } else if frame.flags & FLAG_USER_FUNC != 0 {
            self.close_user_function_call(&frame, pos)?;
        } else if frame.flags & FLAG_ARRAY != 0 {
            self.close_array_subscripts(&frame, pos)?;
        } else {
            // plain parenthesized expression
            if frame.arg_count != 1 {
                return Err(err(ParseErrorCode::ExpressionNotComplete, pos));
            }
        }

        self.parser.array_elem_assignment_allowed =
            frame.flags & FLAG_ARRAY_ELEM_ASSIGNMENT_ALLOWED != 0 && frame.flags & FLAG_ARRAY != 0;
        self.parser.array_elem_incr_decr_allowed =
            frame.flags & FLAG_ARRAY_ELEM_INCR_DECR_ALLOWED != 0 && frame.flags & FLAG_ARRAY != 0;

        self.append_terminal_checked(TermCode::RightPar, pos)?;
        self.parser.last_group = GROUP_VALUE;
        self.count_command_token();
        Ok(())
    }

    fn close_internal_function_call(
        &mut self,
        frame: &OpenParenFrame,
        pos: usize,
    ) -> Result<(), ParseError> {
        let def = function_def(frame.identifier_index);
        if frame.arg_count < frame.min_args || frame.arg_count > frame.max_args {
            return Err(err(ParseErrorCode::WrongArgCount, pos));
        }
        // scalar/array pattern, for the first eight arguments
        for arg in 0..(frame.arg_count.min(8)) {
            let wants_array = def.array_pattern & (1 << arg) != 0;
            let is_array = frame.arg_array_mask & (1 << arg) != 0;
            if wants_array && !is_array {
                return Err(err(ParseErrorCode::ArrayArgExpected, pos));
            }
            if !wants_array && is_array {
                return Err(err(ParseErrorCode::ScalarArgExpected, pos));
            }
        }
        Ok(())
    }

    fn close_user_function_call(
        &mut self,
        frame: &OpenParenFrame,
        pos: usize,
    ) -> Result<(), ParseError> {
        let entry = self.symbols.function_mut(frame.identifier_index);
        if entry.defined {
            if frame.arg_count < entry.min_args || frame.arg_count > entry.max_args {
                return Err(err(ParseErrorCode::WrongArgCount, pos));
            }
            for arg in 0..(frame.arg_count as usize).min(15) {
                let wants_array = entry.param_is_array_pattern & (1 << arg) != 0;
                let is_array = frame.arg_array_mask & (1 << arg) != 0;
                if wants_array && !is_array {
                    return Err(err(ParseErrorCode::ArrayArgExpected, pos));
                }
                if !wants_array && is_array {
                    return Err(err(ParseErrorCode::ScalarArgExpected, pos));
                }
            }
        } else {
            // record the observed argument count range of forward calls
            if entry.min_args > entry.max_args {
                entry.min_args = frame.arg_count;
                entry.max_args = frame.arg_count;
            } else {
                entry.min_args = entry.min_args.min(frame.arg_count);
                entry.max_args = entry.max_args.max(frame.arg_count);
            }
            entry.param_is_array_pattern |= frame.arg_array_mask & 0x7FFF;
        }
        Ok(())
    }

    fn close_array_subscripts(
        &mut self,
        frame: &OpenParenFrame,
        pos: usize,
    ) -> Result<(), ParseError> {
        if frame.arg_count == 0 {
            return Err(err(ParseErrorCode::ArrayUseNoDims, pos));
        }
        if frame.arg_count > MAX_ARRAY_DIMS as u8 {
            return Err(err(ParseErrorCode::ArrayDefMaxDimsExceeded, pos));
        }
        if frame.arg_array_mask != 0 {
            return Err(err(ParseErrorCode::ScalarArgExpected, pos));
        }
        // parameter arrays defer the dimension count check to run time
        if frame.array_dim_count != 0 && frame.arg_count != frame.array_dim_count {
            return Err(err(ParseErrorCode::ArrayUseWrongDimCount, pos));
        }
        Ok(())
    }

    fn handle_operator(
        &mut self,
        code: TermCode,
        pos: usize,
        _ts: &TokenStream,
    ) -> Result<(), ParseError> {
        if !code.is_operator() {
            return Err(err(ParseErrorCode::InvalidOperator, pos));
        }
        let def = terminal_def(code as u8);
        let after_operand = self.parser.last_group & (GROUP_VALUE | GROUP_VAR) != 0;

        if after_operand {
            let is_incr_decr = matches!(code, TermCode::Incr | TermCode::Decr);
            if is_incr_decr {
                // postfix: only on a variable or on an array element
                let on_var = self.parser.last_group == GROUP_VAR && !self.parser.last_var_whole_array;
                let on_elem = self.parser.last_group == GROUP_VALUE
                    && self.parser.array_elem_incr_decr_allowed;
                if !(on_var || on_elem) {
                    return Err(err(ParseErrorCode::OperatorNotAllowedHere, pos));
                }
                if self.parser.last_var_is_const {
                    return Err(err(ParseErrorCode::ConstantVarCannotBeChanged, pos));
                }
                self.append_terminal_checked(code, pos)?;
                self.parser.last_group = GROUP_VALUE;
                self.count_command_token();
                return Ok(());
            }

            // infix
            if def.infix_prio & PRIO_MASK == 0 {
                return Err(err(ParseErrorCode::OperatorNotAllowedHere, pos));
            }
            if self.parser.last_group & BEFORE_INFIX == 0 {
                return Err(err(ParseErrorCode::OperatorNotAllowedHere, pos));
            }
            if is_assignment(code) {
                self.check_assignment_target(pos)?;
            }
            self.append_terminal_checked(code, pos)?;
            self.parser.last_group = GROUP_OP;
            self.parser.last_var_whole_array = false;
            self.count_command_token();
            return Ok(());
        }

        // prefix
        if self.parser.last_group & BEFORE_PREFIX == 0 {
            return Err(err(ParseErrorCode::OperatorNotAllowedHere, pos));
        }
        if def.prefix_prio & PRIO_MASK == 0 {
            return Err(err(ParseErrorCode::PrefixOperatorNotAllowedHere, pos));
        }
        self.check_cmd_arg_start(GROUP_OP, pos)?;
        if matches!(code, TermCode::Incr | TermCode::Decr) {
            self.parser.pending_prefix_incr_decr = true;
        }
        self.append_terminal_checked(code, pos)?;
        self.parser.last_group = GROUP_OP;
        self.count_command_token();
        Ok(())
    }

    /// An assignment operator requires an assignable target directly before
    /// it: a scalar variable or a just-closed array element, never a constant.
    fn check_assignment_target(&self, pos: usize) -> Result<(), ParseError> {
        if self.parser.last_var_is_const {
            return Err(err(ParseErrorCode::ConstantVarCannotBeChanged, pos));
        }
        match self.parser.last_group {
            GROUP_VAR if !self.parser.last_var_whole_array => Ok(()),
            GROUP_VALUE if self.parser.array_elem_assignment_allowed => Ok(()),
            _ => Err(err(ParseErrorCode::AssignmentNotAllowedHere, pos)),
        }
    }

    fn handle_constant(&mut self, value: Value, pos: usize) -> Result<(), ParseError> {
        if self.parser.last_group & BEFORE_OPERAND == 0 {
            let code = if matches!(value, Value::Str(_)) {
                ParseErrorCode::AlphaConstNotAllowedHere
            } else {
                ParseErrorCode::NumConstNotAllowedHere
            };
            return Err(err(code, pos));
        }
        if self.parser.pending_prefix_incr_decr {
            return Err(err(ParseErrorCode::VariableNameExpected, pos));
        }
        self.check_cmd_arg_start(GROUP_VALUE, pos)?;
        let area = self.cur_area();
        self.program
            .append_constant(area, &value, &mut self.counters)
            .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;
        self.parser.last_group = GROUP_VALUE;
        self.parser.array_elem_assignment_allowed = false;
        self.parser.array_elem_incr_decr_allowed = false;
        self.count_command_token();
        Ok(())
    }

    // ---- identifiers: functions, variables ----

    fn handle_identifier(
        &mut self,
        name: &str,
        pos: usize,
        ts: &TokenStream,
    ) -> Result<(), ParseError> {
        if name.len() > MAX_IDENT_LEN {
            return Err(err(ParseErrorCode::IdentifierTooLong, pos));
        }
        if find_command(name).is_some() {
            return Err(err(ParseErrorCode::ResWordNotAllowedHere, pos));
        }

        let followed_by_lpar = ts.next_after_is_terminal(TermCode::LeftPar);

        // built-in function
        if let Some((index, _def)) = find_function(name) {
            if self.parser.last_group & BEFORE_FN_NAME == 0 {
                return Err(err(ParseErrorCode::FunctionNotAllowedHere, pos));
            }
            if self.parser.pending_prefix_incr_decr {
                return Err(err(ParseErrorCode::VariableNameExpected, pos));
            }
            self.check_cmd_arg_start(GROUP_FN_NAME, pos)?;
            let area = self.cur_area();
            self.program
                .append_internal_function(area, index)
                .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;
            self.parser.pending_fn = Some(PendingFn::Internal(index));
            self.parser.last_group = GROUP_FN_NAME;
            self.count_command_token();
            return Ok(());
        }

        // user function call (never shadows a variable in scope)
        if followed_by_lpar && !self.variable_in_scope(name) {
            if self.parser.last_group & BEFORE_FN_NAME == 0 {
                return Err(err(ParseErrorCode::FunctionNotAllowedHere, pos));
            }
            if self.parser.pending_prefix_incr_decr {
                return Err(err(ParseErrorCode::VariableNameExpected, pos));
            }
            if !self.program_mode && self.symbols.find_function(name).is_none() {
                return Err(err(ParseErrorCode::UndefinedFunctionOrArray, pos));
            }
            self.check_cmd_arg_start(GROUP_FN_NAME, pos)?;
            let index = self
                .symbols
                .find_or_create_function(name, &mut self.counters)
                .map_err(|code| err(code, pos))?;
            let area = self.cur_area();
            self.program
                .append_user_function(area, index)
                .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;
            self.parser.pending_fn = Some(PendingFn::User(index));
            self.parser.last_group = GROUP_FN_NAME;
            self.count_command_token();
            return Ok(());
        }

        // variable
        self.handle_variable_use(name, pos, ts)
    }

    fn variable_in_scope(&self, name: &str) -> bool {
        if self.parser.in_function_block {
            if let Some((name_index, _)) = self.symbols.find_prog_var_name(name) {
                if self.parser.local_names.iter().any(|l| l.name_index == name_index)
                    || self.parser.static_names.iter().any(|(n, _)| *n == name_index)
                {
                    return true;
                }
            }
        }
        self.symbols
            .find_prog_var_name(name)
            .map(|(_, entry)| entry.has_global)
            .unwrap_or(false)
            || self.symbols.find_user_var(name).is_some()
    }

    /// Resolves a variable use to the correct slot by scope and emits the
    /// variable token. In a function: local/parameter, then static, then
    /// global, then user. Outside a function: program variables take priority
    /// in program mode, user variables in immediate mode.
    fn handle_variable_use(
        &mut self,
        name: &str,
        pos: usize,
        ts: &TokenStream,
    ) -> Result<(), ParseError> {
        if self.parser.last_group & BEFORE_OPERAND == 0 {
            return Err(err(ParseErrorCode::VariableNotAllowedHere, pos));
        }
        self.check_cmd_arg_start(GROUP_VAR, pos)?;

        let resolved = self.resolve_variable(name);
        let Some((scope, name_index, value_index, is_array, is_const, dim_count)) = resolved else {
            let followed_by_lpar = ts.next_after_is_terminal(TermCode::LeftPar);
            let code = if followed_by_lpar {
                ParseErrorCode::UndefinedFunctionOrArray
            } else {
                ParseErrorCode::VarNotDeclared
            };
            return Err(err(code, pos));
        };

        if self.parser.pending_prefix_incr_decr {
            if is_const {
                return Err(err(ParseErrorCode::ConstantVarCannotBeChanged, pos));
            }
            self.parser.pending_prefix_incr_decr = false;
        }

        let followed_by_lpar = ts.next_after_is_terminal(TermCode::LeftPar);
        if is_array && !followed_by_lpar {
            // whole-array use: only valid as a function argument
            let at_argument_position =
                self.parser.last_group & (GROUP_LEFT_PAR | GROUP_COMMA) != 0;
            let next_closes_argument = ts.next_after_is_terminal(TermCode::Comma)
                || ts.next_after_is_terminal(TermCode::RightPar);
            if !(at_argument_position && next_closes_argument) {
                return Err(err(ParseErrorCode::ArrayUseNoDims, pos));
            }
        }

        let attribs = VarAttribs::of(scope, ValueKind::None)
            .with_is_array(is_array)
            .with_is_const(is_const);
        let area = self.cur_area();
        self.program
            .append_variable(area, attribs.byte(), name_index, value_index)
            .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;

        self.parser.last_group = GROUP_VAR;
        self.parser.last_var_whole_array = is_array;
        self.parser.last_var_is_const = is_const;
        self.parser.last_var_dims = dim_count;
        self.parser.array_elem_assignment_allowed = false;
        self.parser.array_elem_incr_decr_allowed = false;
        self.count_command_token();
        Ok(())
    }

    /// (scope, name index, value index, is_array, is_const, declared dim count)
    fn resolve_variable(&self, name: &str) -> Option<(VarScope, u8, u8, bool, bool, u8)> {
        let prog_name = self.symbols.find_prog_var_name(name);

        if self.parser.in_function_block {
            if let Some((name_index, _)) = prog_name {
                if let Some(local) =
                    self.parser.local_names.iter().find(|l| l.name_index == name_index)
                {
                    let scope = if local.is_param { VarScope::Param } else { VarScope::Local };
                    return Some((
                        scope,
                        name_index,
                        local.local_index,
                        local.is_array,
                        false,
                        local.dim_count,
                    ));
                }
                if let Some((_, slot_index)) =
                    self.parser.static_names.iter().find(|(n, _)| *n == name_index)
                {
                    let slot = &self.symbols.static_slots[*slot_index as usize];
                    return Some((
                        VarScope::Static,
                        name_index,
                        *slot_index,
                        slot.attribs.is_array(),
                        slot.attribs.is_const(),
                        slot_dim_count(slot),
                    ));
                }
            }
        }

        let global = prog_name.filter(|(_, entry)| entry.has_global).map(|(name_index, _)| {
            let slot = &self.symbols.global_slots[name_index as usize];
            (
                VarScope::Global,
                name_index,
                name_index,
                slot.attribs.is_array(),
                slot.attribs.is_const(),
                slot_dim_count(slot),
            )
        });
        let user = self.symbols.find_user_var(name).map(|index| {
            let slot = &self.symbols.user_vars[index];
            (
                VarScope::User,
                index as u8,
                index as u8,
                slot.attribs.is_array(),
                slot.attribs.is_const(),
                slot_dim_count(slot),
            )
        });

        if self.program_mode {
            global.or(user)
        } else {
            user.or(global)
        }
    }

    fn append_terminal_checked(&mut self, code: TermCode, pos: usize) -> Result<(), ParseError> {
        let area = self.cur_area();
        self.program
            .append_terminal(area, code)
            .map(|_| ())
            .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))
    }
}

// ---- declarations and function definitions ----

impl Interpreter {
    /// Parses the declarator list of `var`, `const`, `static` or `local`:
    /// `name [ (dims) ] [ = ±literal ] {, ...} ;`. Initializers must be
    /// literal constants; the optional unary sign is folded into the literal.
    fn parse_declaration_list(
        &mut self,
        cmd: CmdCode,
        ts: &mut TokenStream,
    ) -> Result<(), ParseError> {
        let is_const = cmd == CmdCode::ConstVar;
        loop {
            let pos = ts.here();
            let Some((Ok(RawToken::Identifier(name)), span)) = ts.peek() else {
                return Err(err(ParseErrorCode::VariableNameExpected, pos));
            };
            let name = name.clone();
            let pos = span.start;
            if name.len() > MAX_IDENT_LEN {
                return Err(err(ParseErrorCode::IdentifierTooLong, pos));
            }
            if find_command(&name).is_some() {
                return Err(err(ParseErrorCode::VariableNameExpected, pos));
            }
            if find_function(&name).is_some() || self.symbols.find_function(&name).is_some() {
                return Err(err(ParseErrorCode::VarNameInUseForFunction, pos));
            }
            ts.advance();

            // optional array dimensions
            let mut wide_dims: Vec<i64> = Vec::new();
            let is_array = ts.next_is_terminal(TermCode::LeftPar);
            if is_array {
                ts.advance();
                loop {
                    let dim_pos = ts.here();
                    let dim = match ts.peek() {
                        Some((Ok(tok @ RawToken::IntLiteral(_)), _)) => {
                            parse_literal(tok).map_err(|code| err(code, dim_pos))?
                        }
                        Some(_) => return Err(err(ParseErrorCode::ArrayDimNotValid, dim_pos)),
                        None => return Err(err(ParseErrorCode::ArrayDefNoDims, dim_pos)),
                    };
                    let Value::Long(size) = dim else { unreachable!() };
                    if size < 1 {
                        return Err(err(ParseErrorCode::ArrayDimNotValid, dim_pos));
                    }
                    if wide_dims.len() == MAX_ARRAY_DIMS {
                        return Err(err(ParseErrorCode::ArrayDefMaxDimsExceeded, dim_pos));
                    }
                    wide_dims.push(size as i64);
                    ts.advance();
                    if ts.next_is_terminal(TermCode::Comma) {
                        ts.advance();
                        continue;
                    }
                    if ts.next_is_terminal(TermCode::RightPar) {
                        ts.advance();
                        break;
                    }
                    return Err(err(ParseErrorCode::ArrayDimNotValid, ts.here()));
                }
                let elems: i64 = wide_dims.iter().product();
                if elems > MAX_ARRAY_ELEMS as i64 {
                    return Err(err(ParseErrorCode::ArrayDefMaxElementsExceeded, pos));
                }
            }
            let dims: Vec<u8> = wide_dims.iter().map(|d| *d as u8).collect();

            // optional initializer (mandatory for constants)
            let mut initializer: Option<Value> = None;
            if ts.next_is_terminal(TermCode::Assign) {
                ts.advance();
                let mut negate = false;
                if let Some((Ok(RawToken::Terminal(sign)), _)) = ts.peek() {
                    if *sign == TermCode::Minus {
                        negate = true;
                        ts.advance();
                    } else if *sign == TermCode::Plus {
                        ts.advance();
                    }
                }
                let lit_pos = ts.here();
                let value = match ts.peek() {
                    Some((
                        Ok(
                            tok @ (RawToken::IntLiteral(_)
                            | RawToken::HexLiteral(_)
                            | RawToken::BinLiteral(_)
                            | RawToken::FloatLiteral(_)
                            | RawToken::StringLiteral(_)),
                        ),
                        _,
                    )) => parse_literal(tok).map_err(|code| err(code, lit_pos))?,
                    _ => return Err(err(ParseErrorCode::ConstantValueExpected, lit_pos)),
                };
                let value = match (negate, value) {
                    (false, v) => v,
                    (true, Value::Long(v)) => Value::Long(-v),
                    (true, Value::Float(v)) => Value::Float(-v),
                    (true, Value::Str(_)) => {
                        return Err(err(ParseErrorCode::ConstantValueExpected, lit_pos))
                    }
                };
                if is_array && matches!(value, Value::Str(Some(_))) {
                    return Err(err(ParseErrorCode::ArrayInitEmptyStringExpected, lit_pos));
                }
                initializer = Some(value);
                ts.advance();
            } else if is_const {
                return Err(err(ParseErrorCode::ConstantValueExpected, ts.here()));
            }

            self.declare_variable(cmd, &name, is_const, is_array, &dims, initializer.as_ref(), pos)?;

            if ts.next_is_terminal(TermCode::Comma) {
                self.append_terminal_checked(TermCode::Comma, ts.here())?;
                ts.advance();
                continue;
            }
            if ts.next_is_terminal(TermCode::Semicolon) {
                self.append_terminal_checked(TermCode::Semicolon, ts.here())?;
                ts.advance();
                self.parser.begin_statement();
                return Ok(());
            }
            return Err(err(ParseErrorCode::ExpressionNotComplete, ts.here()));
        }
    }

    /// Creates the declared variable slot in the proper scope and emits the
    /// declaration tokens (`var (dims) = literal`), which the executor skips
    /// but the function launcher reads for local variables and defaults.
    fn declare_variable(
        &mut self,
        cmd: CmdCode,
        name: &str,
        is_const: bool,
        is_array: bool,
        dims: &[u8],
        initializer: Option<&Value>,
        pos: usize,
    ) -> Result<(), ParseError> {
        let area = self.cur_area();
        let (scope, name_index, value_index) = match cmd {
            CmdCode::Var | CmdCode::ConstVar => {
                if self.program_mode {
                    let name_index = self
                        .symbols
                        .intern_prog_var_name(name, &mut self.counters)
                        .map_err(|code| err(code, pos))?;
                    let (_, entry) = self.symbols.find_prog_var_name(name).expect("interned");
                    if entry.has_global {
                        return Err(err(ParseErrorCode::VarRedeclared, pos));
                    }
                    let slot = self.build_declared_slot(
                        VarScope::Global,
                        is_const,
                        is_array,
                        dims,
                        initializer,
                    );
                    self.symbols.global_slots[name_index as usize] = slot;
                    self.symbols.prog_var_names[name_index as usize].has_global = true;
                    (VarScope::Global, name_index, name_index)
                } else {
                    if self.symbols.find_user_var(name).is_some() {
                        return Err(err(ParseErrorCode::VarRedeclared, pos));
                    }
                    let slot = self.build_declared_slot(
                        VarScope::User,
                        is_const,
                        is_array,
                        dims,
                        initializer,
                    );
                    let index = self
                        .symbols
                        .create_user_var(name, slot, &mut self.counters)
                        .map_err(|code| err(code, pos))?;
                    (VarScope::User, index, index)
                }
            }
            CmdCode::Static => {
                let name_index = self
                    .symbols
                    .intern_prog_var_name(name, &mut self.counters)
                    .map_err(|code| err(code, pos))?;
                if self.parser.static_names.iter().any(|(n, _)| *n == name_index)
                    || self.parser.local_names.iter().any(|l| l.name_index == name_index)
                {
                    return Err(err(ParseErrorCode::VarRedeclared, pos));
                }
                if self.symbols.static_slots.len() >= MAX_STATIC_VARS {
                    return Err(err(ParseErrorCode::MaxStaticVariablesReached, pos));
                }
                let slot = self.build_declared_slot(
                    VarScope::Static,
                    is_const,
                    is_array,
                    dims,
                    initializer,
                );
                self.symbols.static_slots.push(slot);
                let slot_index = (self.symbols.static_slots.len() - 1) as u8;
                self.parser.static_names.push((name_index, slot_index));
                (VarScope::Static, name_index, slot_index)
            }
            CmdCode::Local => {
                let name_index = self
                    .symbols
                    .intern_prog_var_name(name, &mut self.counters)
                    .map_err(|code| err(code, pos))?;
                if self.parser.local_names.iter().any(|l| l.name_index == name_index)
                    || self.parser.static_names.iter().any(|(n, _)| *n == name_index)
                {
                    return Err(err(ParseErrorCode::VarRedeclared, pos));
                }
                if self.parser.local_var_count as usize >= MAX_LOCAL_VARS_PER_FUNC {
                    return Err(err(ParseErrorCode::MaxLocalVariablesReached, pos));
                }
                let local_index = self.parser.local_var_count;
                self.parser.local_var_count += 1;
                let mut dim_store = [0u8; MAX_ARRAY_DIMS];
                dim_store[..dims.len()].copy_from_slice(dims);
                self.parser.local_names.push(LocalEntry {
                    name_index,
                    local_index,
                    is_param: false,
                    is_array,
                    dims: dim_store,
                    dim_count: dims.len() as u8,
                });
                let entry = self.symbols.function_mut(self.parser.current_function);
                entry.local_var_count = self.parser.local_var_count;
                (VarScope::Local, name_index, local_index)
            }
            _ => unreachable!("not a declaration command"),
        };

        let attribs =
            VarAttribs::of(scope, ValueKind::None).with_is_array(is_array).with_is_const(is_const);
        self.program
            .append_variable(area, attribs.byte(), name_index, value_index)
            .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;

        if is_array {
            self.append_terminal_checked(TermCode::LeftPar, pos)?;
            for (i, dim) in dims.iter().enumerate() {
                if i > 0 {
                    self.append_terminal_checked(TermCode::Comma, pos)?;
                }
                self.program
                    .append_constant(area, &Value::Long(*dim as i32), &mut self.counters)
                    .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;
            }
            self.append_terminal_checked(TermCode::RightPar, pos)?;
        }
        if let Some(value) = initializer {
            self.append_terminal_checked(TermCode::Assign, pos)?;
            self.program
                .append_constant(area, value, &mut self.counters)
                .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;
        }
        Ok(())
    }

    /// Builds the value slot of a declaration with its initializer applied
    /// (local variables excepted: their storage is created on function entry).
    fn build_declared_slot(
        &mut self,
        scope: VarScope,
        is_const: bool,
        is_array: bool,
        dims: &[u8],
        initializer: Option<&Value>,
    ) -> VarSlot {
        let mut slot = if is_array {
            let elem_kind = match initializer {
                Some(Value::Long(_)) => ValueKind::Long,
                Some(Value::Str(_)) => ValueKind::Str,
                _ => ValueKind::Float,
            };
            let mut array = ArrayObject::new(elem_kind, dims);
            if let Some(value) = initializer {
                array.fill(value);
            }
            *self.counters.arrays_mut(scope) += 1;
            VarSlot::array(scope, array)
        } else {
            let value = initializer.cloned().unwrap_or_else(Value::zero_float);
            if matches!(value, Value::Str(Some(_))) {
                *self.counters.var_strings_mut(scope) += 1;
            }
            VarSlot::scalar(scope, value)
        };
        slot.attribs.set_is_const(is_const);
        slot
    }

    /// Parses `function name(par1, par2 = literal, arr(), ...);` after the
    /// `function` keyword, fixing the entry's parameter pattern and argument
    /// count range and reconciling forward-reference calls.
    fn parse_function_definition(&mut self, ts: &mut TokenStream) -> Result<(), ParseError> {
        let pos = ts.here();
        let Some((Ok(RawToken::Identifier(name)), span)) = ts.peek() else {
            return Err(err(ParseErrorCode::FunctionDefExpected, pos));
        };
        let name = name.clone();
        let pos = span.start;
        if name.len() > MAX_IDENT_LEN {
            return Err(err(ParseErrorCode::IdentifierTooLong, pos));
        }
        if find_function(&name).is_some() {
            return Err(err(ParseErrorCode::RedefiningInternalFunction, pos));
        }
        if find_command(&name).is_some() {
            return Err(err(ParseErrorCode::FunctionDefExpected, pos));
        }
        if self.symbols.find_prog_var_name(&name).is_some()
            || self.symbols.find_user_var(&name).is_some()
        {
            return Err(err(ParseErrorCode::NameInUseForVariable, pos));
        }
        ts.advance();

        let index = self
            .symbols
            .find_or_create_function(&name, &mut self.counters)
            .map_err(|code| err(code, pos))?;
        if self.symbols.function(index).defined {
            return Err(err(ParseErrorCode::FunctionAlreadyDefined, pos));
        }

        let area = self.cur_area();
        let step = self
            .program
            .append_user_function(area, index)
            .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;

        if let Some(frame) = self.parser.stack.top_block_mut() {
            frame.function_index = index;
        }
        self.parser.in_function_block = true;
        self.parser.current_function = index;
        self.parser.param_only_count = 0;
        self.parser.local_var_count = 0;
        self.parser.local_names.clear();
        self.parser.static_names.clear();

        if !ts.next_is_terminal(TermCode::LeftPar) {
            return Err(err(ParseErrorCode::MissingLeftParenthesis, ts.here()));
        }
        self.append_terminal_checked(TermCode::LeftPar, ts.here())?;
        ts.advance();

        let mut pattern: u16 = 0;
        let mut mandatory: u8 = 0;
        let mut optional_seen = false;
        let mut count: u8 = 0;

        if !ts.next_is_terminal(TermCode::RightPar) {
            loop {
                let p_pos = ts.here();
                let Some((Ok(RawToken::Identifier(pname)), pspan)) = ts.peek() else {
                    return Err(err(ParseErrorCode::VariableNameExpected, p_pos));
                };
                let pname = pname.clone();
                let p_pos = pspan.start;
                if pname.len() > MAX_IDENT_LEN {
                    return Err(err(ParseErrorCode::IdentifierTooLong, p_pos));
                }
                if find_command(&pname).is_some() {
                    return Err(err(ParseErrorCode::VariableNameExpected, p_pos));
                }
                if find_function(&pname).is_some() {
                    return Err(err(ParseErrorCode::VarNameInUseForFunction, p_pos));
                }
                ts.advance();

                let name_index = self
                    .symbols
                    .intern_prog_var_name(&pname, &mut self.counters)
                    .map_err(|code| err(code, p_pos))?;
                if self.parser.local_names.iter().any(|l| l.name_index == name_index) {
                    return Err(err(ParseErrorCode::VarRedeclared, p_pos));
                }
                if count >= 15 {
                    return Err(err(ParseErrorCode::FunctionDefMaxArgsExceeded, p_pos));
                }

                // array parameter marker: empty parentheses
                let mut is_array = false;
                if ts.next_is_terminal(TermCode::LeftPar) {
                    ts.advance();
                    if !ts.next_is_terminal(TermCode::RightPar) {
                        return Err(err(ParseErrorCode::ArrayParamExpected, ts.here()));
                    }
                    ts.advance();
                    is_array = true;
                }

                let attribs =
                    VarAttribs::of(VarScope::Param, ValueKind::None).with_is_array(is_array);
                self.program
                    .append_variable(area, attribs.byte(), name_index, count)
                    .map_err(|_| err(ParseErrorCode::ProgMemoryFull, p_pos))?;
                if is_array {
                    pattern |= 1 << count;
                    self.append_terminal_checked(TermCode::LeftPar, p_pos)?;
                    self.append_terminal_checked(TermCode::RightPar, p_pos)?;
                }

                // optional default value (scalar parameters only)
                if ts.next_is_terminal(TermCode::Assign) {
                    if is_array {
                        return Err(err(ParseErrorCode::AssignmentNotAllowedHere, ts.here()));
                    }
                    self.append_terminal_checked(TermCode::Assign, ts.here())?;
                    ts.advance();
                    let mut negate = false;
                    if let Some((Ok(RawToken::Terminal(sign)), _)) = ts.peek() {
                        if *sign == TermCode::Minus {
                            negate = true;
                            ts.advance();
                        } else if *sign == TermCode::Plus {
                            ts.advance();
                        }
                    }
                    let lit_pos = ts.here();
                    let value = match ts.peek() {
                        Some((
                            Ok(
                                tok @ (RawToken::IntLiteral(_)
                                | RawToken::HexLiteral(_)
                                | RawToken::BinLiteral(_)
                                | RawToken::FloatLiteral(_)
                                | RawToken::StringLiteral(_)),
                            ),
                            _,
                        )) => parse_literal(tok).map_err(|code| err(code, lit_pos))?,
                        _ => return Err(err(ParseErrorCode::ConstantValueExpected, lit_pos)),
                    };
                    let value = match (negate, value) {
                        (false, v) => v,
                        (true, Value::Long(v)) => Value::Long(-v),
                        (true, Value::Float(v)) => Value::Float(-v),
                        (true, Value::Str(_)) => {
                            return Err(err(ParseErrorCode::ConstantValueExpected, lit_pos))
                        }
                    };
                    self.program
                        .append_constant(area, &value, &mut self.counters)
                        .map_err(|_| err(ParseErrorCode::ProgMemoryFull, lit_pos))?;
                    ts.advance();
                    optional_seen = true;
                } else {
                    if optional_seen {
                        return Err(err(ParseErrorCode::MandatoryArgAfterOptional, p_pos));
                    }
                    mandatory += 1;
                }

                self.parser.local_names.push(LocalEntry {
                    name_index,
                    local_index: count,
                    is_param: true,
                    is_array,
                    dims: [0; MAX_ARRAY_DIMS],
                    dim_count: 0,
                });
                count += 1;

                if ts.next_is_terminal(TermCode::Comma) {
                    self.append_terminal_checked(TermCode::Comma, ts.here())?;
                    ts.advance();
                    continue;
                }
                if ts.next_is_terminal(TermCode::RightPar) {
                    break;
                }
                return Err(err(ParseErrorCode::ExpressionNotComplete, ts.here()));
            }
        }
        self.append_terminal_checked(TermCode::RightPar, ts.here())?;
        ts.advance();

        {
            let entry = self.symbols.function_mut(index);
            if entry.min_args <= entry.max_args {
                // forward calls were parsed before the definition
                if entry.min_args < mandatory || entry.max_args > count {
                    return Err(err(ParseErrorCode::PrevCallsWrongArgCount, pos));
                }
                if entry.param_is_array_pattern & !pattern & 0x7FFF != 0 {
                    return Err(err(ParseErrorCode::ScalarArgExpected, pos));
                }
            }
            entry.defined = true;
            entry.start_step = Some(step);
            entry.param_count = count;
            entry.local_var_count = count;
            entry.min_args = mandatory;
            entry.max_args = count;
            entry.param_is_array_pattern = pattern | 0x8000;
        }
        self.parser.param_only_count = count;
        self.parser.local_var_count = count;

        if !ts.next_is_terminal(TermCode::Semicolon) {
            return Err(err(ParseErrorCode::ExpressionNotComplete, ts.here()));
        }
        self.append_terminal_checked(TermCode::Semicolon, ts.here())?;
        ts.advance();
        self.parser.begin_statement();
        Ok(())
    }

    /// Parses a comma-separated list of plain identifiers (the `program` and
    /// `delete` commands), emitted as generic name tokens.
    fn parse_generic_name_args(&mut self, ts: &mut TokenStream) -> Result<(), ParseError> {
        let def = command_def(self.parser.cmd_index);
        let mut count = 0usize;
        loop {
            if ts.next_is_terminal(TermCode::Semicolon) {
                if count < def.min_args as usize {
                    return Err(err(ParseErrorCode::CmdParameterMissing, ts.here()));
                }
                self.append_terminal_checked(TermCode::Semicolon, ts.here())?;
                ts.advance();
                self.parser.begin_statement();
                return Ok(());
            }
            let pos = ts.here();
            let Some((Ok(RawToken::Identifier(name)), span)) = ts.peek() else {
                return Err(err(ParseErrorCode::IdentExpectedAsCmdPar, pos));
            };
            let name = name.clone();
            let pos = span.start;
            if name.len() > MAX_IDENT_LEN {
                return Err(err(ParseErrorCode::IdentifierTooLong, pos));
            }
            ts.advance();
            let area = self.cur_area();
            self.program
                .append_generic_name(area, &name, &mut self.counters)
                .map_err(|_| err(ParseErrorCode::ProgMemoryFull, pos))?;
            count += 1;
            if count > def.max_args as usize {
                return Err(err(ParseErrorCode::CmdHasTooManyParameters, pos));
            }
            if ts.next_is_terminal(TermCode::Comma) {
                self.append_terminal_checked(TermCode::Comma, pos)?;
                ts.advance();
            }
        }
    }

    /// End-of-program checks: no open blocks, all called functions defined.
    pub(crate) fn check_program_complete(&self) -> Result<(), ParseError> {
        if self.parser.block_level > 0 {
            return Err(ParseError::new(ParseErrorCode::NoBlockEnd, 0));
        }
        if self.symbols.first_undefined_function().is_some() {
            return Err(ParseError::new(ParseErrorCode::FunctionsNotAllDefined, 0));
        }
        Ok(())
    }
}

/// Declared dimension count of a slot holding an array object.
fn slot_dim_count(slot: &VarSlot) -> u8 {
    match &slot.value {
        SlotValue::Array(array) => array.dim_count(),
        _ => 0,
    }
}

fn err(code: ParseErrorCode, pos: usize) -> ParseError {
    ParseError::new(code, pos)
}

/// Expected parameter type for a command argument position, or `None` when the
/// pattern does not allow an argument there.
fn allowed_par_type(pattern: &[u8; 4], arg_index: usize) -> Option<u8> {
    for (position, &slot) in pattern.iter().enumerate() {
        if slot == 0 {
            return None;
        }
        if arg_index == position || (slot & PAR_MULTIPLE != 0 && arg_index >= position) {
            return Some(slot);
        }
    }
    None
}

fn is_assignment(code: TermCode) -> bool {
    terminal_def(code as u8).infix_prio & PRIO_MASK == crate::global::terminals::ASSIGN_PRIO
}

/// Converts a literal lexeme to a value, applying range checks and the string
/// escape rules (only `\\` and `\"`; no control characters; max length).
fn parse_literal(token: &RawToken) -> Result<Value, ParseErrorCode> {
    match token {
        RawToken::IntLiteral(text) => {
            let wide: i64 = text.parse().map_err(|_| ParseErrorCode::Overflow)?;
            if wide > i32::MAX as i64 {
                return Err(ParseErrorCode::Overflow);
            }
            Ok(Value::Long(wide as i32))
        }
        RawToken::HexLiteral(text) => {
            let v = u32::from_str_radix(&text[2..], 16).map_err(|_| ParseErrorCode::Overflow)?;
            Ok(Value::Long(v as i32))
        }
        RawToken::BinLiteral(text) => {
            let v = u32::from_str_radix(&text[2..], 2).map_err(|_| ParseErrorCode::Overflow)?;
            Ok(Value::Long(v as i32))
        }
        RawToken::FloatLiteral(text) => {
            let v: f32 = text.parse().map_err(|_| ParseErrorCode::NumberInvalidFormat)?;
            if !v.is_finite() {
                return Err(ParseErrorCode::Overflow);
            }
            Ok(Value::Float(v))
        }
        RawToken::StringLiteral(text) => {
            let inner = &text[1..text.len() - 1];
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some('\\') => out.push('\\'),
                        Some('"') => out.push('"'),
                        _ => return Err(ParseErrorCode::AlphaConstInvalidEscSeq),
                    }
                } else if (c as u32) < 0x20 {
                    return Err(ParseErrorCode::AlphaNoCtrlCharAllowed);
                } else {
                    out.push(c);
                }
            }
            if out.len() > MAX_ALPHA_LEN {
                return Err(ParseErrorCode::AlphaConstTooLong);
            }
            Ok(Value::from_string(out))
        }
        _ => Err(ParseErrorCode::NumberInvalidFormat),
    }
}
