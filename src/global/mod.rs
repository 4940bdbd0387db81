pub mod app_flags;
pub mod commands;
pub mod functions;
pub mod terminals;
pub mod token_codes;

/// Maximum length of identifier names, excluding any terminator.
pub const MAX_IDENT_LEN: usize = 15;
/// Maximum length of string constants, also when stored in variables.
pub const MAX_ALPHA_LEN: usize = 60;

/// Identifier and object count limits (absolute limit for each: 255).
pub const MAX_USER_VARS: usize = 32;
pub const MAX_PROG_VAR_NAMES: usize = 64;
pub const MAX_STATIC_VARS: usize = 32;
pub const MAX_LOCAL_VARS_PER_FUNC: usize = 32;
pub const MAX_USER_FUNCS: usize = 16;
