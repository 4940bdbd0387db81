use crate::global::commands::BlockType;
use crate::global::token_codes::CmdCode;
use crate::values::slots::{VarRef, VarSlot};
use crate::values::value::{Value, ValueKind};

// loop control flags

/// Set at the start of each iteration, cleared at its end.
pub const WITHIN_ITERATION: u8 = 0x01;
/// Last clause test failed (if/elseif chains) or loop test failed.
pub const TEST_FAIL: u8 = 0x02;
/// A break command was executed inside the loop.
pub const BREAK_FROM_LOOP: u8 = 0x04;
/// First FOR iteration: the control variable is not incremented yet.
pub const FOR_LOOP_INIT: u8 = 0x08;

/// One open if/while/for block during execution.
#[derive(Debug, Clone)]
pub struct BlockFrame {
    pub block_type: BlockType,
    pub loop_control: u8,

    // FOR loops only
    pub control_var: Option<VarRef>,
    pub final_value: Value,
    pub step_value: Value,
    /// Value type used for the loop test, fixed at loop entry.
    pub test_kind: ValueKind,
    /// Token directly following the `for` statement.
    pub next_step: u16,
}

impl BlockFrame {
    pub fn new(block_type: BlockType) -> BlockFrame {
        BlockFrame {
            block_type,
            loop_control: 0,
            control_var: None,
            final_value: Value::Long(0),
            step_value: Value::Long(1),
            test_kind: ValueKind::Long,
            next_step: 0,
        }
    }
}

/// Execution context of the active program level: the current user function
/// (or the main level), its local storage, and the statement bookkeeping.
/// Pushed onto the flow-control stack when calling into a user function.
#[derive(Debug, Clone)]
pub struct ActiveFunctionData {
    /// `None` at the main (immediate mode) level.
    pub function_index: Option<u8>,
    /// Index of this level's local frame on the locals stack.
    pub frame: Option<usize>,
    /// Evaluation stack levels in use by callers; restored exactly on return.
    pub caller_eval_stack_levels: usize,
    /// Command being executed (dispatched at its terminating semicolon).
    pub active_cmd: CmdCode,
    pub active_cmd_step: u16,
    /// Next token to execute (look-ahead).
    pub next_step: u16,
    /// First token of the statement in progress (error reporting).
    pub error_statement_start: u16,
    /// Token to point at if an execution error occurs.
    pub error_pc: u16,
}

impl ActiveFunctionData {
    pub fn main_level(start: u16) -> ActiveFunctionData {
        ActiveFunctionData {
            function_index: None,
            frame: None,
            caller_eval_stack_levels: 0,
            active_cmd: CmdCode::None,
            active_cmd_step: 0,
            next_step: start,
            error_statement_start: start,
            error_pc: start,
        }
    }
}

/// Flow-control stack entries: open blocks and suspended caller contexts.
#[derive(Debug, Clone)]
pub enum FlowEntry {
    Block(BlockFrame),
    Function(ActiveFunctionData),
}

/// Local variable storage of one user function call (parameters first, then
/// local variables, in declaration order).
#[derive(Debug, Default)]
pub struct LocalFrame {
    pub slots: Vec<VarSlot>,
}
