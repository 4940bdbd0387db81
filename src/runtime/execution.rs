use crate::global::app_flags::Status;
use crate::global::commands::{command_def, CMD_SKIP_DURING_EXEC};
use crate::global::terminals::{terminal_def, ASSIGN_PRIO, OP_LONG, OP_RTOL, PRIO_MASK, RES_LONG};
use crate::global::token_codes::{CmdCode, TermCode, TokenType};
use crate::interpreter::{release_slot_objects, Interpreter};
use crate::program::IMM_START;
use crate::runtime::error::{EventCode, ExecError, ExecStatus};
use crate::runtime::eval_stack::{
    FunctionNameEntry, GenericNameEntry, Operand, OperandEntry, StackEntry, TerminalEntry,
    VAL_PENDING_SUBSCRIPTS,
};
use crate::runtime::flow::{ActiveFunctionData, FlowEntry, LocalFrame};
use crate::values::attribs::{VarAttribs, VarScope};
use crate::values::slots::{SlotValue, VarRef, VarSlot};
use crate::values::value::{Value, ValueKind};
use crate::values::ArrayObject;
use log::{debug, error};

impl Interpreter {
    /// Executes parsed tokens from the given step until the terminator that
    /// ends execution: end of the command line, `return` at top level, `stop`,
    /// `quit`, or an error. Events (kill/abort/stop/quit) are reported through
    /// the returned status; real errors are printed and returned as `Err`.
    pub fn execute(&mut self, start: u16) -> Result<ExecStatus, ExecError> {
        self.app_flags.set_status(Status::Executing);
        let result = self.exec_from(start);

        let status = match result {
            Ok(()) => {
                if self.last_value_stored && self.display.print_last_result {
                    if let Some(value) = self.last_results.get(1) {
                        let text = self.display.format_last_result(value);
                        self.console.write(&text);
                        self.console.write("\n");
                    }
                }
                Ok(ExecStatus::Ok)
            }
            Err(err) if err.is_event() => match err {
                ExecError::Event(EventCode::Stop) => Ok(ExecStatus::Stopped),
                ExecError::Event(EventCode::Quit) => Ok(ExecStatus::Quit),
                ExecError::Event(EventCode::Abort) => Ok(ExecStatus::Aborted),
                _ => Ok(ExecStatus::Killed),
            },
            Err(err) => {
                self.print_exec_error(err);
                self.last_value_stored = false;
                Err(err)
            }
        };

        // tear down everything the statement left behind, in order: evaluation
        // stack intermediates first, then open blocks and call frame locals
        self.clear_execution_state();
        self.app_flags.set_status(if status.is_ok() { Status::Idle } else { Status::Error });
        status
    }

    fn print_exec_error(&mut self, err: ExecError) {
        let statement = self.decompile_statement(self.active.error_statement_start);
        let location = match self.active.function_index {
            Some(index) => {
                format!(" in user function {}", self.symbols.function_name(index))
            }
            None => String::new(),
        };
        let text = format!("  {statement}\n  ^ Exec error {}{location}\n", err.code());
        self.console.write(&text);
        error!("exec error {}: {err}{location}", err.code());
    }

    fn exec_from(&mut self, start: u16) -> Result<(), ExecError> {
        self.active = ActiveFunctionData::main_level(start);
        self.last_value_stored = false;

        let mut pc = start;
        let mut preceding_is_comma = false;
        let mut next_is_new_statement = false;
        let mut is_function_return = false;

        loop {
            let token_type = self.program.token_type(pc);
            if token_type == TokenType::NoToken {
                break;
            }
            self.active.next_step = self.program.next_step(pc);
            let mut is_comma = false;

            match token_type {
                TokenType::ReservedWord => {
                    let index = self.program.resword_index(pc);
                    let def = command_def(index);
                    if def.restrictions & CMD_SKIP_DURING_EXEC != 0 {
                        // parse-time statement: skip to its semicolon
                        let semicolon = self
                            .program
                            .find_terminal(pc, TermCode::Semicolon)
                            .expect("statement without terminator");
                        self.active.next_step = semicolon;
                    } else {
                        // dispatched when the terminating semicolon is reached
                        self.active.active_cmd = def.code;
                        self.active.active_cmd_step = pc;
                    }
                }

                TokenType::InternalFunction | TokenType::UserFunction => {
                    self.eval_stack.push(StackEntry::Function(FunctionNameEntry {
                        token_type,
                        index: self.program.function_index(pc),
                        token_step: pc,
                    }));
                }

                TokenType::GenericName => {
                    self.eval_stack.push(StackEntry::GenericName(GenericNameEntry {
                        name: self.program.generic_name(pc).to_string(),
                        token_step: pc,
                    }));
                }

                TokenType::Constant => {
                    self.active.error_pc = pc;
                    let value = self.program.constant_value(pc);
                    self.eval_stack.push(StackEntry::VarOrConst(OperandEntry {
                        token_type: TokenType::Constant,
                        value_kind: value.kind(),
                        var_attribs: VarAttribs::new(),
                        value_attribs: 0,
                        operand: Operand::Const(value),
                        token_step: pc,
                    }));
                    self.exec_all_ready_operators()?;
                }

                TokenType::Variable => {
                    self.active.error_pc = pc;
                    self.push_variable(pc);
                    self.exec_all_ready_operators()?;
                }

                TokenType::TerminalGroup1 | TokenType::TerminalGroup2 | TokenType::TerminalGroup3 => {
                    let index = self.program.terminal_index(pc);
                    let code = terminal_def(index).code;
                    is_comma = code == TermCode::Comma;

                    if code.is_operator() || code == TermCode::LeftPar {
                        self.eval_stack.push(StackEntry::Terminal(TerminalEntry {
                            index,
                            after_comma: preceding_is_comma,
                            token_step: pc,
                        }));
                        if !preceding_is_comma {
                            // a postfix operator following an operand applies
                            // immediately (it always has the highest priority)
                            let len = self.eval_stack.len();
                            if len >= self.active.caller_eval_stack_levels + 2
                                && self.eval_stack[len - 2].is_operand()
                                && terminal_def(index).postfix_prio != 0
                            {
                                self.exec_unary_operation(false)?;
                                self.exec_all_ready_operators()?;
                            }
                        }
                    } else if code == TermCode::RightPar {
                        self.exec_right_parenthesis()?;
                        self.exec_all_ready_operators()?;
                    } else if code == TermCode::Semicolon {
                        next_is_new_statement = true;
                        if self.active.active_cmd == CmdCode::None {
                            let depth = self.eval_stack.len();
                            let base = self.active.caller_eval_stack_levels;
                            if depth > base + 1 {
                                error!(
                                    "evaluation stack error: {} level(s) remaining",
                                    depth - base
                                );
                                self.clear_eval_stack_levels(depth - base);
                            } else if depth == base + 1 {
                                if pc >= IMM_START {
                                    self.save_last_value();
                                } else {
                                    // inside a function: statement results are discarded
                                    self.clear_eval_stack_levels(1);
                                }
                            }
                        } else {
                            is_function_return = false;
                            self.exec_command(&mut is_function_return)?;
                        }
                    }
                    // comma: no action (the flag below covers prefix operators)
                }

                TokenType::NoToken => unreachable!(),
            }

            pc = self.active.next_step;
            preceding_is_comma = is_comma;

            if next_is_new_statement {
                if !is_function_return {
                    self.active.error_statement_start = pc;
                    self.active.error_pc = pc;
                }
                is_function_return = false;
                next_is_new_statement = false;
                self.poll_host_requests()?;
            }
        }
        Ok(())
    }

    /// Host housekeeping at statement boundaries: the hook may raise requests
    /// which propagate as events.
    pub(crate) fn poll_host_requests(&mut self) -> Result<(), ExecError> {
        if let Some(hook) = self.housekeeping.as_mut() {
            hook(&mut self.app_flags);
        }
        if self.app_flags.kill_requested() {
            self.app_flags.clear_requests();
            return Err(ExecError::Event(EventCode::Kill));
        }
        if self.app_flags.abort_requested() {
            self.app_flags.clear_requests();
            return Err(ExecError::Event(EventCode::Abort));
        }
        if self.app_flags.stop_requested() {
            self.app_flags.clear_requests();
            return Err(ExecError::Event(EventCode::Stop));
        }
        Ok(())
    }

    fn push_variable(&mut self, pc: u16) {
        let (attrib_byte, _name_index, value_index) = self.program.variable_token(pc);
        let (var_ref, kind, attribs) = self.fetch_var_address(attrib_byte, value_index);

        let mut value_attribs = 0;
        let next = self.active.next_step;
        if self.program.token_type(next).is_terminal()
            && self.program.terminal_code(next) == TermCode::LeftPar
        {
            // array variable followed by subscripts, still to be processed
            value_attribs |= VAL_PENDING_SUBSCRIPTS;
        }

        self.eval_stack.push(StackEntry::VarOrConst(OperandEntry {
            token_type: TokenType::Variable,
            value_kind: kind,
            var_attribs: attribs,
            value_attribs,
            operand: Operand::Var(var_ref),
            token_step: pc,
        }));
    }

    /// (current value kind, current value, variable address if any) of an
    /// operand entry; variables are re-read through their resolved address.
    pub(crate) fn operand_info(&self, index: usize) -> (ValueKind, Value, Option<VarRef>) {
        match &self.eval_stack[index] {
            StackEntry::VarOrConst(entry) => match &entry.operand {
                Operand::Const(value) => (value.kind(), value.clone(), None),
                Operand::Var(var_ref) => {
                    (self.var_kind_at(var_ref), self.var_value_at(var_ref), Some(*var_ref))
                }
            },
            _ => (ValueKind::None, Value::Long(0), None),
        }
    }

    /// Converts a stack entry into an intermediate constant holding its
    /// current value (used for parenthesized expressions and return values).
    pub(crate) fn make_intermediate_constant(&mut self, index: usize) {
        let already = self
            .eval_stack[index]
            .as_operand()
            .map(|e| e.is_intermediate())
            .unwrap_or(false);
        if already {
            return;
        }
        let (_, value, _) = self.operand_info(index);
        let token_step = self.eval_stack[index].token_step();
        if matches!(value, Value::Str(Some(_))) {
            self.counters.intermediate_strings += 1;
        }
        self.eval_stack[index] = StackEntry::VarOrConst(OperandEntry::intermediate(value, token_step));
    }

    /// Saves the single remaining stack value as the last result.
    fn save_last_value(&mut self) {
        let index = self.eval_stack.len() - 1;
        let (_, value, _) = self.operand_info(index);
        self.clear_eval_stack_levels(1);
        if self.last_value_stored {
            self.last_results.replace_newest(value, &mut self.counters);
        } else {
            self.last_results.push(value, &mut self.counters);
            self.last_value_stored = true;
        }
    }

    // ---- operator machinery ----

    /// Executes every stacked operator whose priority is not below the
    /// priority of the next pending token, honoring right-to-left
    /// associativity. This yields standard precedence evaluation on a single
    /// stack: after `3 + 5 * 7` reduces `5 * 7`, the `+` becomes ready too.
    pub(crate) fn exec_all_ready_operators(&mut self) -> Result<(), ExecError> {
        while self.eval_stack.len() >= self.active.caller_eval_stack_levels + 2 {
            let len = self.eval_stack.len();
            let Some(terminal) = self.eval_stack[len - 2].as_terminal() else {
                break;
            };
            let term_index = terminal.index;
            let after_comma = terminal.after_comma;
            let def = terminal_def(term_index);
            if !def.code.is_operator() {
                break; // left parenthesis: wait for the closing parenthesis
            }

            // the pending token is always a terminal after an operand; it can
            // not be a prefix operator
            let pending = self.active.next_step;
            if !self.program.token_type(pending).is_terminal() {
                break;
            }
            let pending_def = terminal_def(self.program.terminal_index(pending));

            // prefix or infix use of the stacked operator?
            let mut is_prefix = true;
            if len >= self.active.caller_eval_stack_levels + 3 {
                is_prefix = !self.eval_stack[len - 3].is_operand();
            }
            if after_comma {
                is_prefix = true;
            }

            let priority = if is_prefix {
                def.prefix_prio & PRIO_MASK
            } else {
                def.infix_prio & PRIO_MASK
            };
            let rtol = if is_prefix { true } else { def.infix_prio & OP_RTOL != 0 };

            let pending_is_postfix = pending_def.postfix_prio != 0;
            let pending_priority = if pending_is_postfix {
                pending_def.postfix_prio & PRIO_MASK
            } else {
                pending_def.infix_prio & PRIO_MASK
            };

            let mut current_has_priority = priority >= pending_priority;
            if rtol && priority == pending_priority {
                current_has_priority = false;
            }
            if !current_has_priority {
                break;
            }

            if is_prefix {
                self.exec_unary_operation(true)?;
            } else {
                self.exec_infix_operation()?;
            }
        }
        Ok(())
    }

    pub(crate) fn exec_unary_operation(&mut self, is_prefix: bool) -> Result<(), ExecError> {
        let len = self.eval_stack.len();
        let (operator_index, operand_index) = if is_prefix { (len - 2, len - 1) } else { (len - 1, len - 2) };

        let term_index = self.eval_stack[operator_index].as_terminal().expect("operator").index;
        self.active.error_pc = self.eval_stack[operator_index].token_step();
        let def = terminal_def(term_index);
        let code = def.code;
        let requires_long = def.prefix_prio & OP_LONG != 0;
        let cast_long = def.prefix_prio & RES_LONG != 0;

        let (kind, value, var_ref) = self.operand_info(operand_index);
        if kind != ValueKind::Long && kind != ValueKind::Float {
            return Err(ExecError::NumberExpected);
        }
        if requires_long && kind != ValueKind::Long {
            return Err(ExecError::IntegerExpected);
        }

        let result = match (code, &value) {
            (TermCode::Minus, Value::Long(v)) => Value::Long(-v),
            (TermCode::Minus, Value::Float(v)) => Value::Float(-v),
            (TermCode::Plus, v) => (*v).clone(),
            (TermCode::Not, v) => Value::Long(!v.is_true() as i32),
            (TermCode::Incr, Value::Long(v)) => Value::Long(v.wrapping_add(1)),
            (TermCode::Incr, Value::Float(v)) => Value::Float(v + 1.0),
            (TermCode::Decr, Value::Long(v)) => Value::Long(v.wrapping_sub(1)),
            (TermCode::Decr, Value::Float(v)) => Value::Float(v - 1.0),
            (TermCode::BitCompl, Value::Long(v)) => Value::Long(!v),
            _ => return Err(ExecError::NumberExpected),
        };
        let result = if cast_long { Value::Long(result.as_long()) } else { result };

        if let Value::Float(v) = &result {
            if v.is_nan() {
                return Err(ExecError::Undefined);
            }
            if !v.is_finite() {
                return Err(ExecError::Overflow);
            }
        }

        // increment and decrement store back into the variable, preserving its
        // value type
        let is_incr_decr = matches!(code, TermCode::Incr | TermCode::Decr);
        if is_incr_decr {
            let target = var_ref.ok_or(ExecError::NumberExpected)?;
            self.store_var_value(&target, result.clone())?;
        }

        // prefix increment/decrement keeps the variable reference on the
        // stack; a postfix one yields the unmodified value as an intermediate
        if !(is_incr_decr && is_prefix) {
            let kept = if is_incr_decr { value } else { result };
            let token_step = self.eval_stack[operand_index].token_step();
            self.eval_stack[operand_index] =
                StackEntry::VarOrConst(OperandEntry::intermediate(kept, token_step));
        }

        self.eval_stack.remove(operator_index);
        Ok(())
    }

    pub(crate) fn exec_infix_operation(&mut self) -> Result<(), ExecError> {
        let len = self.eval_stack.len();
        let operator = self.eval_stack[len - 2].as_terminal().expect("operator");
        self.active.error_pc = operator.token_step;
        let def = terminal_def(operator.index);
        let code = def.code;
        let includes_assignment = def.infix_prio & PRIO_MASK == ASSIGN_PRIO;
        let requires_long = def.infix_prio & OP_LONG != 0;
        let cast_long = def.infix_prio & RES_LONG != 0;

        let (mut kind1, mut value1, target) = self.operand_info(len - 3);
        let (mut kind2, mut value2, _) = self.operand_info(len - 1);
        let target_is_array = self
            .eval_stack[len - 3]
            .as_operand()
            .map(|e| e.var_attribs.is_array())
            .unwrap_or(false);

        // type rules
        let is_str1 = kind1 == ValueKind::Str;
        let is_str2 = kind2 == ValueKind::Str;
        if code == TermCode::Assign {
            if is_str1 != is_str2 && target_is_array {
                return Err(ExecError::ArrayValueTypeIsFixed);
            }
        } else if matches!(code, TermCode::Plus | TermCode::PlusAssign) {
            if is_str1 != is_str2 {
                return Err(ExecError::OperandsNumOrStringExpected);
            }
        } else if requires_long {
            if kind1 != ValueKind::Long || kind2 != ValueKind::Long {
                return Err(ExecError::IntegerExpected);
            }
        } else if is_str1 || is_str2 {
            return Err(ExecError::NumberExpected);
        }

        // promote an operand to float where the rules require it
        let promote = if code == TermCode::Assign {
            false
        } else if code == TermCode::Pow {
            kind1 == ValueKind::Long || kind2 == ValueKind::Long
        } else {
            (kind1 == ValueKind::Float) ^ (kind2 == ValueKind::Float)
        };
        if promote {
            if kind1 == ValueKind::Long {
                value1 = Value::Float(value1.as_f32());
                kind1 = ValueKind::Float;
            }
            if kind2 == ValueKind::Long {
                value2 = Value::Float(value2.as_f32());
                kind2 = ValueKind::Float;
            }
        }

        let result_long = kind2 == ValueKind::Long || requires_long || cast_long;
        let result_float = kind2 == ValueKind::Float && !(requires_long || cast_long);

        let result = apply_infix(code, &value1, &value2, result_long)?;

        if result_float && code != TermCode::Assign {
            if let Value::Float(v) = &result {
                if v.is_nan() {
                    return Err(ExecError::Undefined);
                }
                if !v.is_finite() {
                    return Err(ExecError::Overflow);
                }
            }
        }

        if includes_assignment {
            let target = target.expect("assignment target is a variable");
            self.store_var_value(&target, result.clone())?;
        }

        // drop operand 2 and the operator, releasing intermediate strings
        self.clear_eval_stack_levels(1); // operand 2
        let operator_entry = self.eval_stack.pop().expect("operator");
        debug_assert!(matches!(operator_entry, StackEntry::Terminal(_)));

        let top = self.eval_stack.len() - 1;
        if includes_assignment {
            // the target variable reference stays on the stack; its pushed
            // value kind follows the stored value
            if let Some(entry) = self.eval_stack[top].as_operand_mut() {
                entry.value_kind = result.kind();
            }
        } else {
            let token_step = self.eval_stack[top].token_step();
            self.release_top_operand();
            if matches!(result, Value::Str(Some(_))) {
                self.counters.intermediate_strings += 1;
            }
            self.eval_stack[top] =
                StackEntry::VarOrConst(OperandEntry::intermediate(result, token_step));
        }
        Ok(())
    }

    /// Releases the intermediate string owned by the stack top, if any,
    /// without popping the entry.
    fn release_top_operand(&mut self) {
        let top = self.eval_stack.len() - 1;
        if let Some(entry) = self.eval_stack[top].as_operand() {
            if entry.is_intermediate() {
                if let Operand::Const(Value::Str(Some(_))) = &entry.operand {
                    self.counters.intermediate_strings -= 1;
                }
            }
        }
    }

    // ---- parentheses ----

    /// Handles a closing parenthesis: pops back to the matching left
    /// parenthesis, counting arguments, then dispatches on what precedes it
    /// (built-in call, user function call, array subscripts, or a plain
    /// parenthesized expression).
    fn exec_right_parenthesis(&mut self) -> Result<(), ExecError> {
        let base = self.active.caller_eval_stack_levels;
        let mut index = self.eval_stack.len();
        let mut arg_count = 0usize;
        loop {
            index -= 1;
            if let Some(terminal) = self.eval_stack[index].as_terminal() {
                if terminal_def(terminal.index).code == TermCode::LeftPar {
                    break;
                }
            }
            arg_count += 1;
        }
        let lpar_index = index;
        self.eval_stack.remove(lpar_index);
        let first_arg = lpar_index;

        enum Dispatch {
            Internal,
            User,
            Subscripts,
            Plain,
        }
        let preceding = if lpar_index > base { Some(lpar_index - 1) } else { None };
        let dispatch = match preceding.map(|i| &self.eval_stack[i]) {
            Some(StackEntry::Function(entry))
                if entry.token_type == TokenType::InternalFunction =>
            {
                Dispatch::Internal
            }
            Some(StackEntry::Function(_)) => Dispatch::User,
            Some(StackEntry::VarOrConst(entry))
                if entry.value_attribs & VAL_PENDING_SUBSCRIPTS != 0 =>
            {
                Dispatch::Subscripts
            }
            _ => Dispatch::Plain,
        };
        match dispatch {
            Dispatch::Internal => self.exec_internal_function(lpar_index - 1, first_arg, arg_count),
            Dispatch::User => self.launch_user_function(lpar_index - 1, first_arg, arg_count),
            Dispatch::Subscripts => {
                self.resolve_pending_subscripts(lpar_index - 1, first_arg, arg_count)
            }
            Dispatch::Plain => {
                // plain parenthesized expression: one inner value
                debug_assert_eq!(arg_count, 1);
                self.make_intermediate_constant(first_arg);
                Ok(())
            }
        }
    }

    /// Replaces an array base and its subscripts with a reference to the
    /// addressed element.
    fn resolve_pending_subscripts(
        &mut self,
        array_index: usize,
        first_arg: usize,
        arg_count: usize,
    ) -> Result<(), ExecError> {
        let mut subscripts = Vec::with_capacity(arg_count);
        for i in 0..arg_count {
            let (_, value, _) = self.operand_info(first_arg + i);
            subscripts.push(value);
        }
        let base = match &self.eval_stack[array_index] {
            StackEntry::VarOrConst(OperandEntry { operand: Operand::Var(r), .. }) => *r,
            _ => return Err(ExecError::ArrayDimCountInvalid),
        };
        let elem = self.resolve_array_element(&base, &subscripts)?;
        let elem_kind = self.var_kind_at(&elem);

        self.clear_eval_stack_levels(arg_count);
        if let Some(entry) = self.eval_stack[array_index].as_operand_mut() {
            entry.operand = Operand::Var(elem);
            entry.value_kind = elem_kind;
            entry.value_attribs &= !VAL_PENDING_SUBSCRIPTS;
        }
        Ok(())
    }

    // ---- user function call and return ----

    /// Calls into a user function: pushes the caller context onto the
    /// flow-control stack, binds arguments into fresh local storage (variables
    /// by reference, values by copy), installs parameter defaults and local
    /// variables, and jumps to the first statement of the function body.
    fn launch_user_function(
        &mut self,
        fn_entry_index: usize,
        first_arg: usize,
        arg_count: usize,
    ) -> Result<(), ExecError> {
        let (fn_index, fn_step) = match &self.eval_stack[fn_entry_index] {
            StackEntry::Function(e) => (e.index, e.token_step),
            _ => unreachable!(),
        };
        let entry = self.symbols.function(fn_index).clone();
        let Some(start_step) = entry.start_step.filter(|_| entry.defined) else {
            return Err(ExecError::FunctionNotDefined);
        };
        self.active.error_pc = fn_step;

        // caller context is restored exactly on return
        self.flow_stack.push(FlowEntry::Function(self.active.clone()));

        let mut frame = LocalFrame::default();
        frame.slots =
            (0..entry.local_var_count).map(|_| VarSlot::fresh(VarScope::Local)).collect();

        // bind supplied arguments
        for i in 0..arg_count {
            let (kind, value, var_ref) = self.operand_info(first_arg + i);
            let operand = self.eval_stack[first_arg + i].as_operand().expect("argument");
            let slot = &mut frame.slots[i];
            if operand.is_variable() {
                // pass by reference: the local slot records the source address
                // and inherits the source variable's scope
                let source = var_ref.expect("variable argument");
                let source_scope = operand.var_attribs.scope();
                slot.value = SlotValue::Ref(source);
                slot.attribs = VarAttribs::of(source_scope, ValueKind::Ref);
            } else {
                if matches!(value, Value::Str(Some(_))) {
                    self.counters.local_var_strings += 1;
                }
                slot.attribs = VarAttribs::of(VarScope::Param, kind);
                slot.value = SlotValue::Val(value);
            }
        }

        // drop the arguments and the function name entry (the caller's
        // intermediate strings were copied, so release them)
        self.clear_eval_stack_levels(arg_count);
        let name_entry = self.eval_stack.pop();
        debug_assert!(matches!(name_entry, Some(StackEntry::Function(_))));

        self.locals_stack.push(frame);
        let frame_index = self.locals_stack.len() - 1;

        self.active = ActiveFunctionData {
            function_index: Some(fn_index),
            frame: Some(frame_index),
            caller_eval_stack_levels: self.eval_stack.len(),
            active_cmd: CmdCode::None,
            active_cmd_step: 0,
            next_step: 0,
            error_statement_start: 0,
            error_pc: 0,
        };

        let body_start =
            self.init_function_locals(&entry, start_step, arg_count)?;
        self.active.next_step = body_start;
        self.active.error_statement_start = body_start;
        self.active.error_pc = body_start;
        debug!("calling user function {} ({} args)", self.symbols.function_name(fn_index), arg_count);
        Ok(())
    }

    /// Installs default values for parameters without a supplied argument and
    /// creates local (non-parameter) variables, reading dimension and
    /// initializer tokens from the function definition and its `local`
    /// statements. Returns the step of the first body token.
    fn init_function_locals(
        &mut self,
        entry: &crate::parser::symbols::FunctionEntry,
        start_step: u16,
        supplied: usize,
    ) -> Result<u16, ExecError> {
        let frame_index = self.active.frame.expect("fresh call frame");
        let param_count = entry.param_count as usize;

        // parameter defaults, read from the definition statement
        let mut step = start_step;
        if supplied < param_count {
            step = self.program.jump_tokens(step, 1).expect("parameter list"); // at '('
            let mut count = supplied;
            for _ in 0..supplied {
                step = self
                    .program
                    .find_terminal(step, TermCode::Comma)
                    .expect("argument separator");
            }
            while count < param_count {
                let jump = if count == supplied { 3 } else { 4 };
                step = self.program.jump_tokens(step, jump).expect("parameter default");
                let value = self.program.constant_value(step);
                if matches!(value, Value::Str(Some(_))) {
                    self.counters.local_var_strings += 1;
                }
                let slot = &mut self.locals_stack[frame_index].slots[count];
                slot.attribs = VarAttribs::of(VarScope::Param, value.kind());
                slot.value = SlotValue::Val(value);
                count += 1;
            }
        }

        // skip the remainder of the definition statement
        let semicolon = self
            .program
            .find_terminal(step, TermCode::Semicolon)
            .expect("definition terminator");
        let body_start = self.program.next_step(semicolon);

        // local (non-parameter) variables, read from the body's local statements
        let mut count = param_count;
        let mut scan = semicolon;
        while count < entry.local_var_count as usize {
            scan = self
                .program
                .find_resword(scan, CmdCode::Local)
                .expect("local declaration");
            let mut at = scan;
            loop {
                // at the declarator's variable token
                at = self.program.jump_tokens(at, 1).expect("local declarator");
                let mut dims: Vec<u8> = Vec::new();
                let mut terminal = self.program.jump_tokens(at, 1).expect("local terminal");
                if self.program.terminal_code(terminal) == TermCode::LeftPar {
                    // array dimensions
                    let mut cursor = terminal;
                    loop {
                        cursor = self.program.jump_tokens(cursor, 1).expect("dimension");
                        dims.push(self.program.constant_value(cursor).as_long() as u8);
                        cursor = self.program.jump_tokens(cursor, 1).expect("dimension separator");
                        if self.program.terminal_code(cursor) == TermCode::RightPar {
                            break;
                        }
                    }
                    terminal = self.program.jump_tokens(cursor, 1).expect("local terminal");
                }

                let initializer = if self.program.terminal_code(terminal) == TermCode::Assign {
                    let const_step = self.program.jump_tokens(terminal, 1).expect("initializer");
                    terminal = self.program.jump_tokens(const_step, 1).expect("local separator");
                    Some(self.program.constant_value(const_step))
                } else {
                    None
                };

                let slot = &mut self.locals_stack[frame_index].slots[count];
                if dims.is_empty() {
                    let value = initializer.unwrap_or_else(Value::zero_float);
                    if matches!(value, Value::Str(Some(_))) {
                        self.counters.local_var_strings += 1;
                    }
                    slot.attribs = VarAttribs::of(VarScope::Local, value.kind());
                    slot.value = SlotValue::Val(value);
                } else {
                    let elem_kind = match &initializer {
                        Some(Value::Long(_)) => ValueKind::Long,
                        Some(Value::Str(_)) => ValueKind::Str,
                        _ => ValueKind::Float,
                    };
                    let mut array = ArrayObject::new(elem_kind, &dims);
                    if let Some(value) = &initializer {
                        array.fill(value);
                    }
                    self.counters.local_arrays += 1;
                    slot.attribs =
                        VarAttribs::of(VarScope::Local, elem_kind).with_is_array(true);
                    slot.value = SlotValue::Array(array);
                }
                count += 1;

                if self.program.terminal_code(terminal) != TermCode::Comma {
                    break;
                }
                at = terminal;
            }
            scan = self.program.find_terminal(scan, TermCode::Semicolon).expect("local terminator");
        }

        Ok(body_start)
    }

    /// Returns from the active user function: pushes the return value (zero if
    /// none), tears down the callee's locals, unwinds any open blocks and
    /// restores the caller context from the flow-control stack.
    pub(crate) fn terminate_user_function(
        &mut self,
        add_zero_return_value: bool,
    ) -> Result<(), ExecError> {
        if add_zero_return_value {
            self.eval_stack.push(StackEntry::VarOrConst(OperandEntry::intermediate(
                Value::Long(0),
                self.active.active_cmd_step,
            )));
        } else {
            let top = self.eval_stack.len() - 1;
            self.make_intermediate_constant(top);
        }

        // delete local arrays and strings of the terminating call
        let mut frame = self.locals_stack.pop().expect("call frame");
        for slot in frame.slots.iter_mut() {
            release_slot_objects(slot, &mut self.counters);
        }

        loop {
            match self.flow_stack.pop() {
                Some(FlowEntry::Function(caller)) => {
                    self.active = caller;
                    break;
                }
                Some(FlowEntry::Block(_)) => continue,
                None => unreachable!("caller context below every call frame"),
            }
        }

        // a pending operator in the caller may now consume the return value
        self.exec_all_ready_operators()
    }
}

/// Applies an infix operator to fetched (and, where required, promoted)
/// operand values. Type rules were checked by the caller; `result_long` picks
/// integer arithmetic.
fn apply_infix(
    code: TermCode,
    value1: &Value,
    value2: &Value,
    result_long: bool,
) -> Result<Value, ExecError> {
    use TermCode::*;
    let long = |v: bool| Value::Long(v as i32);
    Ok(match code {
        Assign => value2.clone(),

        Plus | PlusAssign => match (value1, value2) {
            (Value::Str(s1), Value::Str(s2)) => {
                // concatenation; two empty strings stay the empty string
                let mut out = String::new();
                if let Some(s) = s1 {
                    out.push_str(s);
                }
                if let Some(s) = s2 {
                    out.push_str(s);
                }
                Value::from_string(out)
            }
            _ if result_long => Value::Long(value1.as_long().wrapping_add(value2.as_long())),
            _ => Value::Float(value1.as_f32() + value2.as_f32()),
        },
        Minus | MinusAssign => {
            if result_long {
                Value::Long(value1.as_long().wrapping_sub(value2.as_long()))
            } else {
                Value::Float(value1.as_f32() - value2.as_f32())
            }
        }
        Mult | MultAssign => {
            if result_long {
                Value::Long(value1.as_long().wrapping_mul(value2.as_long()))
            } else {
                let (a, b) = (value1.as_f32(), value2.as_f32());
                let result = a * b;
                if a != 0.0 && b != 0.0 && result != 0.0 && !result.is_normal() && result.is_finite()
                {
                    return Err(ExecError::Underflow);
                }
                Value::Float(result)
            }
        }
        Div | DivAssign => {
            if result_long {
                let (a, b) = (value1.as_long(), value2.as_long());
                if b == 0 {
                    return Err(if a == 0 { ExecError::Undefined } else { ExecError::DivByZero });
                }
                Value::Long(a.wrapping_div(b))
            } else {
                let (a, b) = (value1.as_f32(), value2.as_f32());
                if a != 0.0 && b == 0.0 {
                    return Err(ExecError::DivByZero);
                }
                let result = a / b;
                if a != 0.0 && result != 0.0 && !result.is_normal() && result.is_finite() {
                    return Err(ExecError::Underflow);
                }
                Value::Float(result)
            }
        }
        Mod | ModAssign => {
            let (a, b) = (value1.as_long(), value2.as_long());
            if b == 0 {
                return Err(if a == 0 { ExecError::Undefined } else { ExecError::DivByZero });
            }
            Value::Long(a.wrapping_rem(b))
        }
        Pow => {
            let (a, b) = (value1.as_f32(), value2.as_f32());
            if a == 0.0 && b == 0.0 {
                return Err(ExecError::Undefined);
            }
            Value::Float(a.powf(b))
        }

        BitAnd | BitAndAssign => Value::Long(value1.as_long() & value2.as_long()),
        BitOr | BitOrAssign => Value::Long(value1.as_long() | value2.as_long()),
        BitXor | BitXorAssign => Value::Long(value1.as_long() ^ value2.as_long()),
        BitShLeft | BitShLeftAssign => {
            let shift = value2.as_long();
            if !(0..32).contains(&shift) {
                return Err(ExecError::OutsideRange);
            }
            Value::Long(value1.as_long().wrapping_shl(shift as u32))
        }
        BitShRight | BitShRightAssign => {
            let shift = value2.as_long();
            if !(0..32).contains(&shift) {
                return Err(ExecError::OutsideRange);
            }
            Value::Long(value1.as_long().wrapping_shr(shift as u32))
        }

        And => long(value1.is_true() && value2.is_true()),
        Or => long(value1.is_true() || value2.is_true()),

        Lt => long(compare(value1, value2, result_long) == std::cmp::Ordering::Less),
        Gt => long(compare(value1, value2, result_long) == std::cmp::Ordering::Greater),
        LtoE => long(compare(value1, value2, result_long) != std::cmp::Ordering::Greater),
        GtoE => long(compare(value1, value2, result_long) != std::cmp::Ordering::Less),
        Eq => long(compare(value1, value2, result_long) == std::cmp::Ordering::Equal),
        Ne => long(compare(value1, value2, result_long) != std::cmp::Ordering::Equal),

        _ => unreachable!("not an infix operator: {code:?}"),
    })
}

fn compare(value1: &Value, value2: &Value, as_long: bool) -> std::cmp::Ordering {
    // operands are numeric and promoted; comparisons on longs stay exact
    if as_long && value1.kind() == ValueKind::Long && value2.kind() == ValueKind::Long {
        value1.as_long().cmp(&value2.as_long())
    } else {
        value1.as_f32().partial_cmp(&value2.as_f32()).unwrap_or(std::cmp::Ordering::Equal)
    }
}
