use crate::values::attribs::VarScope;
use log::error;

/// Heap object counters per kind and scope.
///
/// Every heap object (name string, value string, array, parsed constant
/// string) is owned by exactly one slot; a counter is incremented on creation
/// and decremented on delete. After a complete teardown every counter must be
/// back at zero; anything else is a leak and gets reported.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapCounters {
    // name strings for variables and functions
    pub ident_name_strings: i32,
    pub user_var_name_strings: i32,

    // constant strings
    pub parsed_string_consts: i32,
    pub intermediate_strings: i32,
    pub last_value_strings: i32,

    // strings as value of variables
    pub global_static_var_strings: i32,
    pub user_var_strings: i32,
    pub local_var_strings: i32,

    // array storage
    pub global_static_arrays: i32,
    pub user_arrays: i32,
    pub local_arrays: i32,
}

impl HeapCounters {
    /// Counter slot for variable value strings of the given scope.
    pub fn var_strings_mut(&mut self, scope: VarScope) -> &mut i32 {
        match scope {
            VarScope::User => &mut self.user_var_strings,
            VarScope::Global | VarScope::Static => &mut self.global_static_var_strings,
            _ => &mut self.local_var_strings,
        }
    }

    /// Counter slot for arrays of the given scope.
    pub fn arrays_mut(&mut self, scope: VarScope) -> &mut i32 {
        match scope {
            VarScope::User => &mut self.user_arrays,
            VarScope::Global | VarScope::Static => &mut self.global_static_arrays,
            _ => &mut self.local_arrays,
        }
    }

    pub fn all_zero(&self) -> bool {
        *self == HeapCounters::default()
    }

    /// Logs every nonzero counter; returns true if anything leaked.
    pub fn report_leaks(&self) -> bool {
        let entries = [
            ("identifier name strings", self.ident_name_strings),
            ("user variable name strings", self.user_var_name_strings),
            ("parsed string constants", self.parsed_string_consts),
            ("intermediate strings", self.intermediate_strings),
            ("last value strings", self.last_value_strings),
            ("global/static variable strings", self.global_static_var_strings),
            ("user variable strings", self.user_var_strings),
            ("local variable strings", self.local_var_strings),
            ("global/static arrays", self.global_static_arrays),
            ("user arrays", self.user_arrays),
            ("local arrays", self.local_arrays),
        ];
        let mut leaked = false;
        for (name, count) in entries {
            if count != 0 {
                error!("cleanup error: {count} {name} object(s) remaining");
                leaked = true;
            }
        }
        leaked
    }
}
