use crate::global::token_codes::TermCode;

// priority bytes: bits b43210 define the priority when the terminal is used as a
// prefix, infix or postfix operator (0x01 = lowest, 0x1F = highest); priority 0
// means the terminal is not available in that position.
// bit b7 flags right-to-left associativity for infix operators. Prefix operators
// are always right-to-left, postfix operators always left-to-right.

/// Infix operator has right-to-left associativity.
pub const OP_RTOL: u8 = 0x80;
/// Operand(s) must be long (no casting); the result is long.
pub const OP_LONG: u8 = 0x40;
/// Result is long regardless of operand types (operands can be long or float).
pub const RES_LONG: u8 = 0x20;
/// Mask for the priority bits.
pub const PRIO_MASK: u8 = 0x1F;

/// Infix priority of a (pure or compound) assignment operator.
pub const ASSIGN_PRIO: u8 = 0x01;

pub struct TerminalDef {
    pub name: &'static str,
    pub code: TermCode,
    pub prefix_prio: u8,
    pub infix_prio: u8,
    pub postfix_prio: u8,
}

const fn term(
    name: &'static str,
    code: TermCode,
    prefix_prio: u8,
    infix_prio: u8,
    postfix_prio: u8,
) -> TerminalDef {
    TerminalDef { name, code, prefix_prio, infix_prio, postfix_prio }
}

/// Terminal definitions, indexed by `TermCode` discriminant. The index is what
/// terminal tokens store (split over three token kinds, 16 indexes each).
pub static TERMINALS: [TerminalDef; 38] = [
    // assignment operators: lowest priority, right-to-left
    term("=", TermCode::Assign, 0x00, ASSIGN_PRIO | OP_RTOL, 0x00),
    term("+=", TermCode::PlusAssign, 0x00, ASSIGN_PRIO | OP_RTOL, 0x00),
    term("-=", TermCode::MinusAssign, 0x00, ASSIGN_PRIO | OP_RTOL, 0x00),
    term("*=", TermCode::MultAssign, 0x00, ASSIGN_PRIO | OP_RTOL, 0x00),
    term("/=", TermCode::DivAssign, 0x00, ASSIGN_PRIO | OP_RTOL, 0x00),
    term("%=", TermCode::ModAssign, 0x00, ASSIGN_PRIO | OP_RTOL | OP_LONG, 0x00),
    term("&=", TermCode::BitAndAssign, 0x00, ASSIGN_PRIO | OP_RTOL | OP_LONG, 0x00),
    term("|=", TermCode::BitOrAssign, 0x00, ASSIGN_PRIO | OP_RTOL | OP_LONG, 0x00),
    term("^=", TermCode::BitXorAssign, 0x00, ASSIGN_PRIO | OP_RTOL | OP_LONG, 0x00),
    term("<<=", TermCode::BitShLeftAssign, 0x00, ASSIGN_PRIO | OP_RTOL | OP_LONG, 0x00),
    term(">>=", TermCode::BitShRightAssign, 0x00, ASSIGN_PRIO | OP_RTOL | OP_LONG, 0x00),
    // comparison
    term("<", TermCode::Lt, 0x00, 0x08 | RES_LONG, 0x00),
    term(">", TermCode::Gt, 0x00, 0x08 | RES_LONG, 0x00),
    term("<=", TermCode::LtoE, 0x00, 0x08 | RES_LONG, 0x00),
    term(">=", TermCode::GtoE, 0x00, 0x08 | RES_LONG, 0x00),
    term("!=", TermCode::Ne, 0x00, 0x07 | RES_LONG, 0x00),
    term("==", TermCode::Eq, 0x00, 0x07 | RES_LONG, 0x00),
    // arithmetic (infix '+' also concatenates strings)
    term("+", TermCode::Plus, 0x0C, 0x0A, 0x00),
    term("-", TermCode::Minus, 0x0C, 0x0A, 0x00),
    term("*", TermCode::Mult, 0x00, 0x0B, 0x00),
    term("/", TermCode::Div, 0x00, 0x0B, 0x00),
    term("%", TermCode::Mod, 0x00, 0x0B | OP_LONG, 0x00),
    term("**", TermCode::Pow, 0x00, 0x0D | OP_RTOL, 0x00),
    term("++", TermCode::Incr, 0x0E, 0x00, 0x0F),
    term("--", TermCode::Decr, 0x0E, 0x00, 0x0F),
    // logical
    term("&&", TermCode::And, 0x00, 0x03 | RES_LONG, 0x00),
    term("||", TermCode::Or, 0x00, 0x02 | RES_LONG, 0x00),
    term("!", TermCode::Not, 0x0C | RES_LONG, 0x00, 0x00),
    // bitwise
    term("~", TermCode::BitCompl, 0x0C | OP_LONG, 0x00, 0x00),
    term("<<", TermCode::BitShLeft, 0x00, 0x09 | OP_LONG, 0x00),
    term(">>", TermCode::BitShRight, 0x00, 0x09 | OP_LONG, 0x00),
    term("&", TermCode::BitAnd, 0x00, 0x06 | OP_LONG, 0x00),
    term("|", TermCode::BitOr, 0x00, 0x04 | OP_LONG, 0x00),
    term("^", TermCode::BitXor, 0x00, 0x05 | OP_LONG, 0x00),
    // non-operator terminals; a pending left parenthesis outranks any stacked operator
    term(",", TermCode::Comma, 0x00, 0x00, 0x00),
    term(";", TermCode::Semicolon, 0x00, 0x00, 0x00),
    term("(", TermCode::LeftPar, 0x00, 0x10, 0x00),
    term(")", TermCode::RightPar, 0x00, 0x00, 0x00),
];

pub fn terminal_def(index: u8) -> &'static TerminalDef {
    &TERMINALS[index as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_index_matches_code() {
        for (i, def) in TERMINALS.iter().enumerate() {
            assert_eq!(def.code as usize, i, "terminal {} out of place", def.name);
        }
    }

    #[test]
    fn operator_range() {
        assert!(TermCode::BitXor.is_operator());
        assert!(!TermCode::Comma.is_operator());
        assert!(!TermCode::LeftPar.is_operator());
    }
}
