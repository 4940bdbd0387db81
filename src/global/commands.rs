use crate::global::token_codes::CmdCode;

// command usage restrictions (bits b3210) plus the skip-during-execution flag (b7)

pub const CMD_USAGE_MASK: u8 = 0x0F;

pub const CMD_NO_RESTRICTIONS: u8 = 0x00;
pub const CMD_ONLY_IN_PROGRAM: u8 = 0x01;
pub const CMD_ONLY_IN_FUNCTION: u8 = 0x03;
pub const CMD_ONLY_IMMEDIATE: u8 = 0x04;
pub const CMD_ONLY_IMM_OR_IN_FUNC: u8 = 0x06;
pub const CMD_ONLY_PROGRAM_TOP: u8 = 0x07;

/// Command is processed entirely at parse time; the executor skips the statement.
pub const CMD_SKIP_DURING_EXEC: u8 = 0x80;

// allowed command parameter types, one per parameter slot

pub const PAR_NONE: u8 = 0;
pub const PAR_VAR_OPT_ASSIGNMENT: u8 = 3;
pub const PAR_EXPRESSION: u8 = 4;
pub const PAR_FUNCTION: u8 = 5;
pub const PAR_IDENT: u8 = 7;

pub const PAR_TYPE_MASK: u8 = 0x07;
/// Last pattern slot only: parameter may repeat 0..n times.
pub const PAR_MULTIPLE: u8 = 0x08;
/// Parameter may be omitted.
pub const PAR_OPTIONAL: u8 = 0x10;

/// Block command classification.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum BlockType {
    None,
    Function,
    For,
    While,
    If,
    /// Alters flow within a specific type of open block (break, continue, return).
    AlterFlow,
    /// Ends any type of open block.
    GenericEnd,
}

/// Position of a block command within its block, and the kind of open block an
/// alter-flow command requires.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
#[repr(u8)]
pub enum BlockPos {
    Na,
    Start,
    Mid1,
    Mid2,
    End,
    InOpenFunction,
    InOpenLoop,
}

#[derive(Debug, Copy, Clone)]
pub struct CmdBlockDef {
    pub block_type: BlockType,
    pub pos: BlockPos,
    pub min_predecessor: BlockPos,
    pub max_predecessor: BlockPos,
}

pub const BLOCK_NONE: CmdBlockDef = CmdBlockDef {
    block_type: BlockType::None,
    pos: BlockPos::Na,
    min_predecessor: BlockPos::Na,
    max_predecessor: BlockPos::Na,
};
const BLOCK_FUNCTION: CmdBlockDef = CmdBlockDef {
    block_type: BlockType::Function,
    pos: BlockPos::Start,
    min_predecessor: BlockPos::Na,
    max_predecessor: BlockPos::Na,
};
const BLOCK_FOR: CmdBlockDef =
    CmdBlockDef { block_type: BlockType::For, pos: BlockPos::Start, min_predecessor: BlockPos::Na, max_predecessor: BlockPos::Na };
const BLOCK_WHILE: CmdBlockDef =
    CmdBlockDef { block_type: BlockType::While, pos: BlockPos::Start, min_predecessor: BlockPos::Na, max_predecessor: BlockPos::Na };
const BLOCK_IF: CmdBlockDef =
    CmdBlockDef { block_type: BlockType::If, pos: BlockPos::Start, min_predecessor: BlockPos::Na, max_predecessor: BlockPos::Na };
const BLOCK_IF_ELSEIF: CmdBlockDef = CmdBlockDef {
    block_type: BlockType::If,
    pos: BlockPos::Mid1,
    min_predecessor: BlockPos::Start,
    max_predecessor: BlockPos::Mid1,
};
const BLOCK_IF_ELSE: CmdBlockDef = CmdBlockDef {
    block_type: BlockType::If,
    pos: BlockPos::Mid2,
    min_predecessor: BlockPos::Start,
    max_predecessor: BlockPos::Mid1,
};
const BLOCK_ALTER_LOOP: CmdBlockDef = CmdBlockDef {
    block_type: BlockType::AlterFlow,
    pos: BlockPos::InOpenLoop,
    min_predecessor: BlockPos::Na,
    max_predecessor: BlockPos::Na,
};
const BLOCK_ALTER_FUNCTION: CmdBlockDef = CmdBlockDef {
    block_type: BlockType::AlterFlow,
    pos: BlockPos::InOpenFunction,
    min_predecessor: BlockPos::Na,
    max_predecessor: BlockPos::Na,
};
const BLOCK_GEN_END: CmdBlockDef = CmdBlockDef {
    block_type: BlockType::GenericEnd,
    pos: BlockPos::End,
    min_predecessor: BlockPos::Na,
    max_predecessor: BlockPos::End,
};

pub struct CmdDef {
    pub name: &'static str,
    pub code: CmdCode,
    pub restrictions: u8,
    pub min_args: u8,
    pub max_args: u8,
    pub param_pattern: [u8; 4],
    pub block: CmdBlockDef,
}

const fn cmd(
    name: &'static str,
    code: CmdCode,
    restrictions: u8,
    min_args: u8,
    max_args: u8,
    param_pattern: [u8; 4],
    block: CmdBlockDef,
) -> CmdDef {
    CmdDef { name, code, restrictions, min_args, max_args, param_pattern, block }
}

// parameter patterns shared between commands
const PAT_NONE: [u8; 4] = [PAR_NONE; 4];
const PAT_DECL: [u8; 4] = [PAR_VAR_OPT_ASSIGNMENT, PAR_VAR_OPT_ASSIGNMENT | PAR_MULTIPLE, 0, 0];
const PAT_EXPR: [u8; 4] = [PAR_EXPRESSION, 0, 0, 0];
const PAT_EXPR_OPT: [u8; 4] = [PAR_EXPRESSION | PAR_OPTIONAL, 0, 0, 0];
const PAT_EXPR_LIST: [u8; 4] = [PAR_EXPRESSION, PAR_EXPRESSION | PAR_MULTIPLE, 0, 0];
const PAT_EXPR_LIST_OPT: [u8; 4] = [PAR_EXPRESSION | PAR_OPTIONAL | PAR_MULTIPLE, 0, 0, 0];
const PAT_FOR: [u8; 4] = [PAR_VAR_OPT_ASSIGNMENT, PAR_EXPRESSION, PAR_EXPRESSION | PAR_OPTIONAL, 0];
const PAT_INPUT: [u8; 4] = [PAR_EXPRESSION, PAR_VAR_OPT_ASSIGNMENT, PAR_EXPRESSION | PAR_OPTIONAL, 0];
const PAT_IDENT: [u8; 4] = [PAR_IDENT, 0, 0, 0];
const PAT_IDENT_LIST: [u8; 4] = [PAR_IDENT, PAR_IDENT | PAR_MULTIPLE, 0, 0];
const PAT_FUNCTION: [u8; 4] = [PAR_FUNCTION, 0, 0, 0];
const PAT_TWO_EXPR: [u8; 4] = [PAR_EXPRESSION, PAR_EXPRESSION, 0, 0];
const PAT_DISPFMT: [u8; 4] = [PAR_EXPRESSION, PAR_EXPRESSION | PAR_OPTIONAL, 0, 0];

/// Command definitions. The token stores the index into this table.
pub static COMMANDS: [CmdDef; 33] = [
    // declare and delete variables
    cmd("var", CmdCode::Var, CMD_NO_RESTRICTIONS | CMD_SKIP_DURING_EXEC, 1, 15, PAT_DECL, BLOCK_NONE),
    cmd("const", CmdCode::ConstVar, CMD_NO_RESTRICTIONS | CMD_SKIP_DURING_EXEC, 1, 15, PAT_DECL, BLOCK_NONE),
    cmd("static", CmdCode::Static, CMD_ONLY_IN_FUNCTION | CMD_SKIP_DURING_EXEC, 1, 15, PAT_DECL, BLOCK_NONE),
    cmd("local", CmdCode::Local, CMD_ONLY_IN_FUNCTION | CMD_SKIP_DURING_EXEC, 1, 15, PAT_DECL, BLOCK_NONE),
    cmd("delete", CmdCode::DeleteVar, CMD_ONLY_IMMEDIATE, 1, 15, PAT_IDENT_LIST, BLOCK_NONE),
    cmd("clearMem", CmdCode::ClearMem, CMD_ONLY_IMMEDIATE, 0, 0, PAT_NONE, BLOCK_NONE),
    cmd("clearProg", CmdCode::ClearProg, CMD_ONLY_IMMEDIATE, 0, 0, PAT_NONE, BLOCK_NONE),
    // program structure
    cmd("program", CmdCode::Program, CMD_ONLY_PROGRAM_TOP | CMD_SKIP_DURING_EXEC, 1, 1, PAT_IDENT, BLOCK_NONE),
    cmd("function", CmdCode::Function, CMD_ONLY_IN_PROGRAM | CMD_SKIP_DURING_EXEC, 1, 1, PAT_FUNCTION, BLOCK_FUNCTION),
    // flow control
    cmd("for", CmdCode::For, CMD_ONLY_IMM_OR_IN_FUNC, 2, 3, PAT_FOR, BLOCK_FOR),
    cmd("while", CmdCode::While, CMD_ONLY_IMM_OR_IN_FUNC, 1, 1, PAT_EXPR, BLOCK_WHILE),
    cmd("if", CmdCode::If, CMD_ONLY_IMM_OR_IN_FUNC, 1, 1, PAT_EXPR, BLOCK_IF),
    cmd("elseif", CmdCode::ElseIf, CMD_ONLY_IMM_OR_IN_FUNC, 1, 1, PAT_EXPR, BLOCK_IF_ELSEIF),
    cmd("else", CmdCode::Else, CMD_ONLY_IMM_OR_IN_FUNC, 0, 0, PAT_NONE, BLOCK_IF_ELSE),
    cmd("end", CmdCode::End, CMD_NO_RESTRICTIONS, 0, 0, PAT_NONE, BLOCK_GEN_END),
    cmd("break", CmdCode::Break, CMD_ONLY_IMM_OR_IN_FUNC, 0, 0, PAT_NONE, BLOCK_ALTER_LOOP),
    cmd("continue", CmdCode::Continue, CMD_ONLY_IMM_OR_IN_FUNC, 0, 0, PAT_NONE, BLOCK_ALTER_LOOP),
    cmd("return", CmdCode::Return, CMD_ONLY_IN_FUNCTION, 0, 1, PAT_EXPR_OPT, BLOCK_ALTER_FUNCTION),
    // input and output
    cmd("print", CmdCode::Print, CMD_ONLY_IMM_OR_IN_FUNC, 1, 15, PAT_EXPR_LIST, BLOCK_NONE),
    cmd("cout", CmdCode::Cout, CMD_ONLY_IMM_OR_IN_FUNC, 1, 15, PAT_EXPR_LIST, BLOCK_NONE),
    cmd("coutLine", CmdCode::CoutLine, CMD_ONLY_IMM_OR_IN_FUNC, 0, 15, PAT_EXPR_LIST_OPT, BLOCK_NONE),
    cmd("coutList", CmdCode::CoutList, CMD_ONLY_IMM_OR_IN_FUNC, 1, 15, PAT_EXPR_LIST, BLOCK_NONE),
    cmd("dbout", CmdCode::Dbout, CMD_ONLY_IMM_OR_IN_FUNC, 1, 15, PAT_EXPR_LIST, BLOCK_NONE),
    cmd("dboutLine", CmdCode::DboutLine, CMD_ONLY_IMM_OR_IN_FUNC, 0, 15, PAT_EXPR_LIST_OPT, BLOCK_NONE),
    cmd("input", CmdCode::Input, CMD_ONLY_IMM_OR_IN_FUNC, 2, 3, PAT_INPUT, BLOCK_NONE),
    // display settings
    cmd("dispFmt", CmdCode::DispFmt, CMD_ONLY_IMM_OR_IN_FUNC, 1, 2, PAT_DISPFMT, BLOCK_NONE),
    cmd("floatFmt", CmdCode::FloatFmt, CMD_ONLY_IMM_OR_IN_FUNC, 1, 3, PAT_EXPR_LIST, BLOCK_NONE),
    cmd("intFmt", CmdCode::IntFmt, CMD_ONLY_IMM_OR_IN_FUNC, 1, 3, PAT_EXPR_LIST, BLOCK_NONE),
    cmd("dispMode", CmdCode::DispMode, CMD_ONLY_IMM_OR_IN_FUNC, 2, 2, PAT_TWO_EXPR, BLOCK_NONE),
    // session control
    cmd("quit", CmdCode::Quit, CMD_ONLY_IMMEDIATE, 0, 0, PAT_NONE, BLOCK_NONE),
    cmd("stop", CmdCode::Stop, CMD_ONLY_IN_FUNCTION, 0, 0, PAT_NONE, BLOCK_NONE),
    cmd("abort", CmdCode::Abort, CMD_ONLY_IMMEDIATE, 0, 0, PAT_NONE, BLOCK_NONE),
    cmd("nop", CmdCode::Nop, CMD_ONLY_IN_FUNCTION | CMD_SKIP_DURING_EXEC, 0, 0, PAT_NONE, BLOCK_NONE),
];

pub fn command_def(index: u8) -> &'static CmdDef {
    &COMMANDS[index as usize]
}

pub fn find_command(name: &str) -> Option<(u8, &'static CmdDef)> {
    COMMANDS.iter().enumerate().find(|(_, def)| def.name == name).map(|(i, def)| (i as u8, def))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let (_, def) = find_command("elseif").unwrap();
        assert_eq!(def.code, CmdCode::ElseIf);
        assert_eq!(def.block.block_type, BlockType::If);
        assert_eq!(def.block.pos, BlockPos::Mid1);
    }

    #[test]
    fn declarations_are_parse_time_only() {
        for name in ["var", "const", "static", "local"] {
            let (_, def) = find_command(name).unwrap();
            assert_ne!(def.restrictions & CMD_SKIP_DURING_EXEC, 0);
        }
    }
}
