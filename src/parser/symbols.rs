use crate::global::{MAX_PROG_VAR_NAMES, MAX_USER_FUNCS, MAX_USER_VARS};
use crate::parser::error::ParseErrorCode;
use crate::values::counters::HeapCounters;
use crate::values::slots::VarSlot;
use indexmap::IndexMap;

/// Sentinel for a function argument count range that has not been observed yet
/// (min > max means not initialized).
pub const FUNC_ARGS_NOT_SET_MIN: u8 = 0x10;

/// Per program-variable-name bookkeeping. Program variable names are shared
/// across global, static and local variables of that name; resolution picks
/// the correct slot by scope.
#[derive(Debug, Default, Clone)]
pub struct ProgVarName {
    /// A global program variable is attached to this name.
    pub has_global: bool,
    /// Parse-time only: value index currently associated with this name while
    /// a function body is being parsed (local or static slot index).
    pub value_index: u8,
}

/// A user function entry: everything the executor needs to launch a call, plus
/// the parse-time argument count reconciliation state.
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    /// Step of the function name token in the definition statement.
    pub start_step: Option<u16>,
    /// Parameters (mandatory + optional) in the definition.
    pub param_count: u8,
    /// Parameters plus local variables (run-time local storage size).
    pub local_var_count: u8,
    /// Bits b0..b14: parameter at that position is an array. Bit b15 is set
    /// once the pattern has been fixed by the definition or a first call.
    pub param_is_array_pattern: u16,
    /// Allowed (once defined) or observed (calls only) argument count range.
    pub min_args: u8,
    pub max_args: u8,
    pub defined: bool,
}

impl Default for FunctionEntry {
    fn default() -> Self {
        FunctionEntry {
            start_step: None,
            param_count: 0,
            local_var_count: 0,
            param_is_array_pattern: 0,
            min_args: FUNC_ARGS_NOT_SET_MIN,
            max_args: 0,
            defined: false,
        }
    }
}

/// Interned names and value slot tables for all variable scopes and user
/// functions. Tokens store table indexes; the maps keep index and name in sync.
#[derive(Debug, Default)]
pub struct Symbols {
    /// One entry per distinct program variable name (global, static, local).
    pub prog_var_names: IndexMap<String, ProgVarName>,
    /// Global slots, parallel to `prog_var_names` (used when `has_global`).
    pub global_slots: Vec<VarSlot>,
    /// User variables: name and slot, 1:1.
    pub user_vars: IndexMap<String, VarSlot>,
    /// Static slots, allocated in declaration order across all functions.
    pub static_slots: Vec<VarSlot>,
    /// User functions by name.
    pub functions: IndexMap<String, FunctionEntry>,
}

impl Symbols {
    /// Interns a program variable name, creating the parallel (empty) global
    /// slot. Name strings are heap objects in the accounting.
    pub fn intern_prog_var_name(
        &mut self,
        name: &str,
        counters: &mut HeapCounters,
    ) -> Result<u8, ParseErrorCode> {
        if let Some(index) = self.prog_var_names.get_index_of(name) {
            return Ok(index as u8);
        }
        if self.prog_var_names.len() >= MAX_PROG_VAR_NAMES {
            return Err(ParseErrorCode::MaxVariableNamesReached);
        }
        counters.ident_name_strings += 1;
        self.prog_var_names.insert(name.to_string(), ProgVarName::default());
        self.global_slots.push(VarSlot::fresh(crate::values::attribs::VarScope::Global));
        Ok((self.prog_var_names.len() - 1) as u8)
    }

    pub fn find_prog_var_name(&self, name: &str) -> Option<(u8, &ProgVarName)> {
        self.prog_var_names.get_full(name).map(|(i, _, entry)| (i as u8, entry))
    }

    pub fn prog_var_name(&self, index: u8) -> &str {
        self.prog_var_names.get_index(index as usize).map(|(name, _)| name.as_str()).unwrap_or("")
    }

    pub fn find_user_var(&self, name: &str) -> Option<usize> {
        self.user_vars.get_index_of(name)
    }

    pub fn user_var_name(&self, index: usize) -> &str {
        self.user_vars.get_index(index).map(|(name, _)| name.as_str()).unwrap_or("")
    }

    /// Creates a user variable; the caller fills in the slot afterwards.
    pub fn create_user_var(
        &mut self,
        name: &str,
        slot: VarSlot,
        counters: &mut HeapCounters,
    ) -> Result<u8, ParseErrorCode> {
        if self.user_vars.contains_key(name) {
            return Err(ParseErrorCode::VarRedeclared);
        }
        if self.user_vars.len() >= MAX_USER_VARS {
            return Err(ParseErrorCode::MaxUserVariablesReached);
        }
        counters.user_var_name_strings += 1;
        self.user_vars.insert(name.to_string(), slot);
        Ok((self.user_vars.len() - 1) as u8)
    }

    pub fn find_function(&self, name: &str) -> Option<(u8, &FunctionEntry)> {
        self.functions.get_full(name).map(|(i, _, entry)| (i as u8, entry))
    }

    pub fn function_name(&self, index: u8) -> &str {
        self.functions.get_index(index as usize).map(|(name, _)| name.as_str()).unwrap_or("")
    }

    pub fn function(&self, index: u8) -> &FunctionEntry {
        self.functions.get_index(index as usize).map(|(_, entry)| entry).expect("function index")
    }

    pub fn function_mut(&mut self, index: u8) -> &mut FunctionEntry {
        self.functions
            .get_index_mut(index as usize)
            .map(|(_, entry)| entry)
            .expect("function index")
    }

    /// Finds or creates a user function entry (forward references from call
    /// sites create an undefined entry).
    pub fn find_or_create_function(
        &mut self,
        name: &str,
        counters: &mut HeapCounters,
    ) -> Result<u8, ParseErrorCode> {
        if let Some(index) = self.functions.get_index_of(name) {
            return Ok(index as u8);
        }
        if self.functions.len() >= MAX_USER_FUNCS {
            return Err(ParseErrorCode::MaxUserFunctionsReached);
        }
        counters.ident_name_strings += 1;
        self.functions.insert(name.to_string(), FunctionEntry::default());
        Ok((self.functions.len() - 1) as u8)
    }

    /// True if any function entry was created by a call but never defined;
    /// returns the first offender's name.
    pub fn first_undefined_function(&self) -> Option<&str> {
        self.functions
            .iter()
            .find(|(_, entry)| !entry.defined)
            .map(|(name, _)| name.as_str())
    }
}
