use crate::console::Console;
use crate::global::app_flags::AppFlags;
use crate::parser::ParserState;
use crate::program::ProgramStorage;
use crate::runtime::commands_exec::ResetRequest;
use crate::runtime::eval_stack::StackEntry;
use crate::runtime::flow::{ActiveFunctionData, FlowEntry, LocalFrame};
use crate::runtime::format::DisplaySettings;
use crate::values::counters::HeapCounters;
use crate::values::last_result::LastResultFifo;
use crate::values::slots::{SlotValue, VarAddr, VarSlot};
use crate::values::value::Value;
use crate::parser::symbols::Symbols;
use log::{debug, info};
use std::time::Instant;

/// Host housekeeping hook, called at statement boundaries and in input wait
/// loops. The hook may raise kill/abort/stop/console-reset requests.
pub type HousekeepingFn = Box<dyn FnMut(&mut AppFlags)>;

/// The interpreter: parser, execution engine and all process-wide state in one
/// value owned by the embedding host. No global statics are used, so multiple
/// interpreters can coexist.
pub struct Interpreter {
    pub(crate) program: ProgramStorage,
    pub(crate) symbols: Symbols,
    pub(crate) counters: HeapCounters,
    pub(crate) parser: ParserState,

    pub(crate) eval_stack: Vec<StackEntry>,
    pub(crate) flow_stack: Vec<FlowEntry>,
    pub(crate) locals_stack: Vec<LocalFrame>,
    pub(crate) active: ActiveFunctionData,

    pub(crate) last_results: LastResultFifo,
    pub(crate) last_value_stored: bool,
    pub(crate) display: DisplaySettings,
    pub(crate) app_flags: AppFlags,

    pub(crate) console: Box<dyn Console>,
    pub(crate) housekeeping: Option<HousekeepingFn>,

    /// Statements are being collected into the program area.
    pub(crate) program_mode: bool,
    /// Machine reset requested by an executed command, applied after the
    /// command line completes.
    pub(crate) pending_reset: Option<ResetRequest>,
    pub(crate) start_time: Instant,
}

impl Interpreter {
    pub fn new(console: impl Console + 'static) -> Interpreter {
        Interpreter {
            program: ProgramStorage::default(),
            symbols: Symbols::default(),
            counters: HeapCounters::default(),
            parser: ParserState::default(),
            eval_stack: Vec::new(),
            flow_stack: Vec::new(),
            locals_stack: Vec::new(),
            active: ActiveFunctionData::main_level(crate::program::IMM_START),
            last_results: LastResultFifo::default(),
            last_value_stored: false,
            display: DisplaySettings::default(),
            app_flags: AppFlags::default(),
            console: Box::new(console),
            housekeeping: None,
            program_mode: false,
            pending_reset: None,
            start_time: Instant::now(),
        }
    }

    /// Installs the host housekeeping hook.
    pub fn set_housekeeping(&mut self, hook: HousekeepingFn) {
        self.housekeeping = Some(hook);
    }

    pub fn app_flags(&self) -> &AppFlags {
        &self.app_flags
    }

    pub fn app_flags_mut(&mut self) -> &mut AppFlags {
        &mut self.app_flags
    }

    pub fn heap_counters(&self) -> &HeapCounters {
        &self.counters
    }

    /// The most recent top-level result, if any.
    pub fn last_result(&self) -> Option<&Value> {
        self.last_results.get(1)
    }

    /// Checks the block linkage invariant over the parsed token areas.
    pub fn verify_block_links(&self) -> bool {
        self.program.verify_block_links()
    }

    pub(crate) fn millis(&self) -> i32 {
        self.start_time.elapsed().as_millis() as i32
    }

    // ---- variable slot access ----

    pub(crate) fn slot(&self, addr: VarAddr) -> &VarSlot {
        match addr {
            VarAddr::User(i) => &self.symbols.user_vars[i],
            VarAddr::Global(i) => &self.symbols.global_slots[i],
            VarAddr::Static(i) => &self.symbols.static_slots[i],
            VarAddr::Local { frame, slot } => &self.locals_stack[frame].slots[slot],
        }
    }

    pub(crate) fn slot_mut(&mut self, addr: VarAddr) -> &mut VarSlot {
        match addr {
            VarAddr::User(i) => &mut self.symbols.user_vars[i],
            VarAddr::Global(i) => &mut self.symbols.global_slots[i],
            VarAddr::Static(i) => &mut self.symbols.static_slots[i],
            VarAddr::Local { frame, slot } => &mut self.locals_stack[frame].slots[slot],
        }
    }

    // ---- teardown ----

    /// Full machine reset: tears down all execution state and parsed data in a
    /// defined order, then verifies that every heap object counter is back at
    /// zero. User variables survive unless `with_user_variables` is set.
    pub fn reset_machine(&mut self, with_user_variables: bool) {
        debug!("machine reset (with user variables: {with_user_variables})");
        self.clear_execution_state();
        self.last_results.clear(&mut self.counters);
        self.last_value_stored = false;
        self.clear_program_data();
        self.program.clear_immediate(&mut self.counters);
        if with_user_variables {
            self.clear_user_variables();
        }
        self.parser.reset();
        self.program_mode = false;

        let audited = if with_user_variables {
            self.counters
        } else {
            // live user variables legitimately keep their objects
            HeapCounters {
                user_var_name_strings: 0,
                user_var_strings: 0,
                user_arrays: 0,
                ..self.counters
            }
        };
        if audited.report_leaks() {
            info!("heap object counters not balanced after reset");
        }
    }

    /// Clears the evaluation stack, the flow-control stack and all local
    /// frames (releasing local strings and arrays).
    pub(crate) fn clear_execution_state(&mut self) {
        self.clear_eval_stack();
        self.flow_stack.clear();
        while let Some(mut frame) = self.locals_stack.pop() {
            for slot in frame.slots.iter_mut() {
                release_slot_objects(slot, &mut self.counters);
            }
        }
        self.active = ActiveFunctionData::main_level(crate::program::IMM_START);
    }

    /// Deletes the parsed program: global and static values, program variable
    /// names, user functions, and the program token area.
    pub(crate) fn clear_program_data(&mut self) {
        for slot in self.symbols.global_slots.iter_mut() {
            release_slot_objects(slot, &mut self.counters);
        }
        for slot in self.symbols.static_slots.iter_mut() {
            release_slot_objects(slot, &mut self.counters);
        }
        self.counters.ident_name_strings -=
            (self.symbols.prog_var_names.len() + self.symbols.functions.len()) as i32;
        self.symbols.prog_var_names.clear();
        self.symbols.global_slots.clear();
        self.symbols.static_slots.clear();
        self.symbols.functions.clear();
        self.program.clear_program(&mut self.counters);
    }

    pub(crate) fn clear_user_variables(&mut self) {
        for (_, slot) in self.symbols.user_vars.iter_mut() {
            release_slot_objects(slot, &mut self.counters);
        }
        self.counters.user_var_name_strings -= self.symbols.user_vars.len() as i32;
        self.symbols.user_vars.clear();
    }

    // ---- evaluation stack accounting ----

    /// Drops the top `n` evaluation stack levels, releasing intermediate
    /// string results they own.
    pub(crate) fn clear_eval_stack_levels(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(entry) = self.eval_stack.pop() {
                self.release_stack_entry(&entry);
            }
        }
    }

    pub(crate) fn clear_eval_stack(&mut self) {
        self.clear_eval_stack_levels(self.eval_stack.len());
    }

    pub(crate) fn release_stack_entry(&mut self, entry: &StackEntry) {
        if let StackEntry::VarOrConst(operand) = entry {
            if operand.is_intermediate() {
                if let crate::runtime::eval_stack::Operand::Const(Value::Str(Some(_))) =
                    &operand.operand
                {
                    self.counters.intermediate_strings -= 1;
                }
            }
        }
    }
}

/// Releases the heap objects owned by a variable slot (value string or array,
/// including array element strings), decrementing the matching counters. The
/// slot is left holding a zero float.
pub(crate) fn release_slot_objects(slot: &mut VarSlot, counters: &mut HeapCounters) {
    let scope = slot.attribs.scope();
    match &mut slot.value {
        SlotValue::Val(Value::Str(Some(_))) => {
            *counters.var_strings_mut(scope) -= 1;
        }
        SlotValue::Array(array) => {
            *counters.var_strings_mut(scope) -= array.live_string_count() as i32;
            *counters.arrays_mut(scope) -= 1;
        }
        _ => {}
    }
    slot.value = SlotValue::Val(Value::zero_float());
}
