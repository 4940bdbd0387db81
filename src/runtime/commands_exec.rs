use crate::global::commands::BlockType;
use crate::global::token_codes::CmdCode;
use crate::interpreter::Interpreter;
use crate::runtime::error::{EventCode, ExecError};
use crate::runtime::eval_stack::StackEntry;
use crate::runtime::flow::{
    BlockFrame, FlowEntry, BREAK_FROM_LOOP, FOR_LOOP_INIT, TEST_FAIL, WITHIN_ITERATION,
};
use crate::runtime::format::{MAX_CHARS_TO_PRINT, MAX_NUM_PRECISION, MAX_PRINT_FIELD_WIDTH};
use crate::values::value::{Value, ValueKind};
use itertools::Itertools;
use log::debug;

/// A machine reset requested by a command, applied after execution of the
/// command line completes (the token buffer being executed must survive until
/// then).
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ResetRequest {
    ClearProgram,
    ClearAll,
}

impl Interpreter {
    /// Dispatches the command whose terminating semicolon was just reached;
    /// its arguments are on the evaluation stack.
    pub(crate) fn exec_command(&mut self, is_function_return: &mut bool) -> Result<(), ExecError> {
        *is_function_return = false;
        let cmd = self.active.active_cmd;
        let first_arg = self.active.caller_eval_stack_levels;
        let arg_count = self.eval_stack.len() - first_arg;
        self.active.error_pc = self.active.active_cmd_step;
        debug!("executing command {cmd} ({arg_count} argument(s))");

        match cmd {
            CmdCode::Print | CmdCode::Cout | CmdCode::Dbout => {
                let text = self.render_args(first_arg, arg_count, "");
                self.console.write(&text);
                if cmd == CmdCode::Print {
                    self.console.write("\n");
                }
                self.end_command(arg_count);
            }
            CmdCode::CoutLine | CmdCode::DboutLine => {
                let text = self.render_args(first_arg, arg_count, "");
                self.console.write(&text);
                self.console.write("\n");
                self.end_command(arg_count);
            }
            CmdCode::CoutList => {
                let text = self.render_args(first_arg, arg_count, ", ");
                self.console.write(&text);
                self.console.write("\n");
                self.end_command(arg_count);
            }

            CmdCode::Input => self.exec_input(first_arg, arg_count)?,

            CmdCode::DispFmt => {
                let width = self.numeric_arg(first_arg, 0)?;
                if !(0..=MAX_PRINT_FIELD_WIDTH).contains(&width) {
                    return Err(ExecError::ArgOutsideRange);
                }
                self.display.width = width;
                if arg_count > 1 {
                    let chars = self.numeric_arg(first_arg, 1)?;
                    if !(0..=MAX_CHARS_TO_PRINT).contains(&chars) {
                        return Err(ExecError::ArgOutsideRange);
                    }
                    self.display.chars_to_print = chars;
                }
                self.end_command(arg_count);
            }
            CmdCode::FloatFmt => {
                let precision = self.numeric_arg(first_arg, 0)?;
                if !(0..=MAX_NUM_PRECISION).contains(&precision) {
                    return Err(ExecError::ArgOutsideRange);
                }
                self.display.num_precision = precision;
                if arg_count > 1 {
                    let (kind, value, _) = self.operand_info(first_arg + 1);
                    if kind != ValueKind::Str {
                        return Err(ExecError::ArgStringExpected);
                    }
                    match value.as_str() {
                        "F" | "E" | "G" => {
                            self.display.num_specifier = value.as_str().chars().next().unwrap()
                        }
                        _ => return Err(ExecError::ArgInvalid),
                    }
                }
                self.end_command(arg_count);
            }
            CmdCode::IntFmt => {
                // specifier: "D" (decimal) or "X" (hexadecimal)
                let (kind, value, _) = self.operand_info(first_arg);
                if kind != ValueKind::Str {
                    return Err(ExecError::ArgStringExpected);
                }
                match value.as_str() {
                    "D" => self.display.is_hex = false,
                    "X" => self.display.is_hex = true,
                    _ => return Err(ExecError::ArgInvalid),
                }
                self.end_command(arg_count);
            }
            CmdCode::DispMode => {
                let prompt_and_echo = self.numeric_arg(first_arg, 0)?;
                let print_last = self.numeric_arg(first_arg, 1)?;
                if !(0..=2).contains(&prompt_and_echo) || !(0..=1).contains(&print_last) {
                    return Err(ExecError::ArgOutsideRange);
                }
                self.last_value_stored = false;
                self.display.prompt_and_echo = prompt_and_echo;
                self.display.print_last_result = print_last != 0;
                self.end_command(arg_count);
            }

            CmdCode::If | CmdCode::While | CmdCode::For => {
                self.exec_open_block(cmd, first_arg, arg_count)?;
                self.exec_clause_test(cmd, arg_count)?;
            }
            CmdCode::ElseIf | CmdCode::Else => self.exec_clause_test(cmd, arg_count)?,
            CmdCode::Break | CmdCode::Continue => self.exec_break_continue(cmd),
            CmdCode::End => self.exec_end(is_function_return)?,
            CmdCode::Return => {
                *is_function_return = true;
                self.terminate_user_function(arg_count == 0)?;
            }

            CmdCode::DeleteVar => self.exec_delete_user_vars(first_arg, arg_count)?,
            CmdCode::ClearProg => {
                self.pending_reset = Some(ResetRequest::ClearProgram);
                self.end_command(arg_count);
            }
            CmdCode::ClearMem => {
                self.pending_reset = Some(ResetRequest::ClearAll);
                self.end_command(arg_count);
            }

            CmdCode::Quit => return Err(ExecError::Event(EventCode::Quit)),
            CmdCode::Stop => return Err(ExecError::Event(EventCode::Stop)),
            CmdCode::Abort => return Err(ExecError::Event(EventCode::Abort)),

            _ => unreachable!("command {cmd} is parse-time only"),
        }
        Ok(())
    }

    /// Clears the command's stack arguments and marks command execution ended.
    fn end_command(&mut self, arg_count: usize) {
        self.clear_eval_stack_levels(arg_count);
        self.active.active_cmd = CmdCode::None;
        self.active.active_cmd_step = 0;
    }

    fn render_args(&self, first_arg: usize, arg_count: usize, separator: &str) -> String {
        let rendered: Vec<String> = (0..arg_count)
            .map(|i| {
                let (_, value, _) = self.operand_info(first_arg + i);
                self.display.format_value(&value)
            })
            .collect();
        rendered.iter().join(separator)
    }

    fn numeric_arg(&self, first_arg: usize, offset: usize) -> Result<i32, ExecError> {
        let (kind, value, _) = self.operand_info(first_arg + offset);
        match kind {
            ValueKind::Long => Ok(value.as_long()),
            ValueKind::Float => {
                let v = value.as_f32();
                if v.fract() != 0.0 {
                    return Err(ExecError::ArgIntegerExpected);
                }
                Ok(v as i32)
            }
            _ => Err(ExecError::ArgNumValueExpected),
        }
    }

    // ---- input ----

    fn exec_input(&mut self, first_arg: usize, arg_count: usize) -> Result<(), ExecError> {
        let (prompt_kind, prompt, _) = self.operand_info(first_arg);
        if prompt_kind != ValueKind::Str {
            return Err(ExecError::ArgStringExpected);
        }
        let target = match &self.eval_stack[first_arg + 1] {
            StackEntry::VarOrConst(entry) if entry.is_variable() => {
                match &entry.operand {
                    crate::runtime::eval_stack::Operand::Var(r) => *r,
                    _ => unreachable!(),
                }
            }
            _ => return Err(ExecError::ArgInvalid),
        };
        let mut allow_cancel = true;
        if arg_count == 3 {
            let flag = self.numeric_arg(first_arg, 2)?;
            allow_cancel = flag != 0;
        }

        self.console.write(if allow_cancel {
            "***** Input (enter Escape character '1B' to cancel) *****\n"
        } else {
            "***** Input *****\n"
        });
        self.console.write(prompt.as_str());
        self.console.write(" ");

        self.poll_host_requests()?;
        let line = self.console.read_line().unwrap_or_default();
        let canceled = allow_cancel && line.starts_with('\u{1b}');
        if canceled {
            self.console.write("(Input canceled)\n");
        } else {
            let trimmed = line.trim_end_matches(['\r', '\n']);
            let value = if let Ok(v) = trimmed.parse::<i32>() {
                Value::Long(v)
            } else if let Ok(v) = trimmed.parse::<f32>() {
                Value::Float(v)
            } else {
                Value::from_string(trimmed.to_string())
            };
            self.store_var_value(&target, value)?;
        }

        self.end_command(arg_count);
        Ok(())
    }

    // ---- flow control commands ----

    /// Starts a new if/while/for block, or re-enters an existing while loop at
    /// the next iteration.
    fn exec_open_block(
        &mut self,
        cmd: CmdCode,
        first_arg: usize,
        arg_count: usize,
    ) -> Result<(), ExecError> {
        let mut init_new = true;
        if cmd == CmdCode::While {
            // jumping back from 'end' re-executes the while statement: reuse
            // the frame unless the previous iteration is already closed
            if let Some(FlowEntry::Block(top)) = self.flow_stack.last() {
                if top.block_type == BlockType::While {
                    init_new = top.loop_control & WITHIN_ITERATION != 0;
                }
            }
        }

        if init_new {
            let block_type = match cmd {
                CmdCode::If => BlockType::If,
                CmdCode::While => BlockType::While,
                _ => BlockType::For,
            };
            let mut frame = BlockFrame::new(block_type);

            if cmd == CmdCode::For {
                frame.next_step = self.active.next_step;

                // control variable, final value, optional step
                let (kind0, _, control) = self.operand_info(first_arg);
                let control = control.ok_or(ExecError::TestExprNumberExpected)?;
                if kind0 != ValueKind::Long && kind0 != ValueKind::Float {
                    return Err(ExecError::TestExprNumberExpected);
                }
                frame.control_var = Some(control);

                let (kind1, final_value, _) = self.operand_info(first_arg + 1);
                if kind1 != ValueKind::Long && kind1 != ValueKind::Float {
                    return Err(ExecError::TestExprNumberExpected);
                }
                frame.final_value = final_value;

                if arg_count >= 3 {
                    let (kind2, step_value, _) = self.operand_info(first_arg + 2);
                    if kind2 != ValueKind::Long && kind2 != ValueKind::Float {
                        return Err(ExecError::TestExprNumberExpected);
                    }
                    frame.step_value = step_value;
                } else {
                    frame.step_value = Value::Float(1.0);
                }

                // the value type for loop tests is fixed at loop entry
                let all_long = kind0 == ValueKind::Long
                    && frame.final_value.kind() == ValueKind::Long
                    && frame.step_value.kind() == ValueKind::Long;
                frame.test_kind = if all_long { ValueKind::Long } else { ValueKind::Float };
                if frame.test_kind == ValueKind::Float {
                    frame.final_value = Value::Float(frame.final_value.as_f32());
                    frame.step_value = Value::Float(frame.step_value.as_f32());
                }
                frame.loop_control |= FOR_LOOP_INIT;
            }

            frame.loop_control &= !BREAK_FROM_LOOP;
            self.flow_stack.push(FlowEntry::Block(frame));
        }

        if let Some(FlowEntry::Block(top)) = self.flow_stack.last_mut() {
            top.loop_control |= WITHIN_ITERATION;
        }
        Ok(())
    }

    /// Shared clause handling for if/while/elseif/else (and the for statement,
    /// which always jumps to its end for the loop test). A failed test jumps
    /// past the clause body via the block token chain.
    fn exec_clause_test(&mut self, cmd: CmdCode, arg_count: usize) -> Result<(), ExecError> {
        // elseif/else only run their clause if every preceding clause failed
        let preceding_fail_or_none = match cmd {
            CmdCode::ElseIf | CmdCode::Else => {
                match self.flow_stack.last() {
                    Some(FlowEntry::Block(top)) => top.loop_control & TEST_FAIL != 0,
                    _ => true,
                }
            }
            _ => true,
        };
        let test_clause =
            preceding_fail_or_none && cmd != CmdCode::For && cmd != CmdCode::Else;

        let mut fail = !preceding_fail_or_none;
        if test_clause {
            let top = self.eval_stack.len() - 1;
            let (kind, value, _) = self.operand_info(top);
            if kind != ValueKind::Long && kind != ValueKind::Float {
                return Err(ExecError::TestExprNumberExpected);
            }
            fail = !value.is_true();
            if let Some(FlowEntry::Block(frame)) = self.flow_stack.last_mut() {
                if fail {
                    frame.loop_control |= TEST_FAIL;
                } else {
                    frame.loop_control &= !TEST_FAIL;
                }
            }
        }

        if fail || cmd == CmdCode::For {
            // jump to the next block token (elseif, else or end)
            let to = self.program.block_step(self.active.active_cmd_step);
            self.active.next_step = to;
        }

        self.end_command(arg_count);
        Ok(())
    }

    /// Break and continue unwind to the nearest enclosing loop and jump to its
    /// end statement; break additionally arms the break flag so the end exits.
    fn exec_break_continue(&mut self, cmd: CmdCode) {
        loop {
            match self.flow_stack.last_mut() {
                Some(FlowEntry::Block(frame))
                    if matches!(frame.block_type, BlockType::For | BlockType::While) =>
                {
                    if cmd == CmdCode::Break {
                        frame.loop_control |= BREAK_FROM_LOOP;
                    }
                    // the command token links to the loop start; the start
                    // links to the loop end
                    let start = self.program.block_step(self.active.active_cmd_step);
                    let end = self.program.block_step(start);
                    self.active.next_step = end;
                    break;
                }
                Some(FlowEntry::Block(_)) => {
                    // inner if block: remove from the flow control stack
                    self.flow_stack.pop();
                }
                _ => unreachable!("parser guarantees an enclosing loop"),
            }
        }
        self.end_command(0);
    }

    /// The end statement: at a loop, runs the next iteration test (or exits);
    /// at a function block, behaves as a return without value.
    fn exec_end(&mut self, is_function_return: &mut bool) -> Result<(), ExecError> {
        let is_block_end = matches!(
            self.flow_stack.last(),
            Some(FlowEntry::Block(frame))
                if matches!(frame.block_type, BlockType::If | BlockType::While | BlockType::For)
        );

        if is_block_end {
            let (block_type, break_flag) = match self.flow_stack.last() {
                Some(FlowEntry::Block(frame)) => {
                    (frame.block_type, frame.loop_control & BREAK_FROM_LOOP != 0)
                }
                _ => unreachable!(),
            };

            let mut exit_loop = true;
            if matches!(block_type, BlockType::For | BlockType::While) {
                exit_loop = break_flag;
                if !exit_loop {
                    if block_type == BlockType::For {
                        exit_loop = self.test_for_loop_condition()?;
                    } else if let Some(FlowEntry::Block(frame)) = self.flow_stack.last() {
                        exit_loop = frame.loop_control & TEST_FAIL != 0;
                    }
                }
            }

            if !exit_loop {
                if block_type == BlockType::For {
                    if let Some(FlowEntry::Block(frame)) = self.flow_stack.last() {
                        self.active.next_step = frame.next_step;
                    }
                } else {
                    // jump back to the while statement for the next iteration
                    self.active.next_step = self.program.block_step(self.active.active_cmd_step);
                }
            }

            if let Some(FlowEntry::Block(frame)) = self.flow_stack.last_mut() {
                frame.loop_control &= !WITHIN_ITERATION;
            }
            self.end_command(0);
            if exit_loop {
                self.flow_stack.pop();
            }
            return Ok(());
        }

        // end of a function body: same as a return without value
        *is_function_return = true;
        self.terminate_user_function(true)
    }

    /// The for-loop iteration test. On the first pass the control variable is
    /// not incremented; afterwards the step is added, preserving the control
    /// variable's own storage type. The test value type was fixed at loop
    /// entry; a step of zero never fails the test.
    fn test_for_loop_condition(&mut self) -> Result<bool, ExecError> {
        let frame = match self.flow_stack.last() {
            Some(FlowEntry::Block(frame)) => frame.clone(),
            _ => unreachable!(),
        };
        let control = frame.control_var.expect("for frame has a control variable");

        let ctrl_kind = self.var_kind_at(&control);
        if ctrl_kind != ValueKind::Long && ctrl_kind != ValueKind::Float {
            // value type changed to string within the loop
            return Err(ExecError::TestExprNumberExpected);
        }
        let first_pass = frame.loop_control & FOR_LOOP_INIT != 0;
        let test_long = frame.test_kind == ValueKind::Long;

        let current = self.var_value_at(&control);
        let updated = if first_pass {
            current
        } else if ctrl_kind == ValueKind::Long {
            if test_long {
                Value::Long(current.as_long().wrapping_add(frame.step_value.as_long()))
            } else {
                // promoted for the test, stored back as long
                Value::Long((current.as_f32() + frame.step_value.as_f32()) as i32)
            }
        } else {
            Value::Float(current.as_f32() + frame.step_value.as_f32())
        };
        if !first_pass {
            self.store_var_value(&control, updated.clone())?;
        }

        let fails = if test_long && ctrl_kind == ValueKind::Long {
            let (value, final_value, step) =
                (updated.as_long(), frame.final_value.as_long(), frame.step_value.as_long());
            if step > 0 { value > final_value } else { step < 0 && value < final_value }
        } else {
            let (value, final_value, step) =
                (updated.as_f32(), frame.final_value.as_f32(), frame.step_value.as_f32());
            if step > 0.0 { value > final_value } else { step < 0.0 && value < final_value }
        };

        if let Some(FlowEntry::Block(frame)) = self.flow_stack.last_mut() {
            frame.loop_control &= !FOR_LOOP_INIT;
        }
        Ok(fails)
    }

    /// Deletes user variables named by the generic-name arguments. Variables
    /// in use by the parsed program cannot be deleted.
    fn exec_delete_user_vars(&mut self, first_arg: usize, arg_count: usize) -> Result<(), ExecError> {
        for i in 0..arg_count {
            let name = match &self.eval_stack[first_arg + i] {
                StackEntry::GenericName(entry) => entry.name.clone(),
                _ => return Err(ExecError::ArgInvalid),
            };
            let Some(index) = self.symbols.find_user_var(&name) else {
                return Err(ExecError::ArgInvalid);
            };
            if let Some((_, slot)) = self.symbols.user_vars.get_index_mut(index) {
                crate::interpreter::release_slot_objects(slot, &mut self.counters);
            }
            self.symbols.user_vars.shift_remove(&name);
            self.counters.user_var_name_strings -= 1;
        }
        self.end_command(arg_count);
        Ok(())
    }
}
