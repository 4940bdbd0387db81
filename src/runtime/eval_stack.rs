use crate::global::token_codes::TokenType;
use crate::values::attribs::VarAttribs;
use crate::values::slots::VarRef;
use crate::values::value::{Value, ValueKind};

// value attribute flags of operand entries

/// The value is an intermediate result owned by the stack entry.
pub const VAL_INTERMEDIATE: u8 = 0x01;
/// Array variable whose subscripts are still to be processed; until then the
/// entry addresses the whole array, not an element.
pub const VAL_PENDING_SUBSCRIPTS: u8 = 0x02;

/// The payload of an operand entry: an owned constant value, or the resolved
/// address of a variable (scalar slot, whole array, or array element).
#[derive(Debug, Clone)]
pub enum Operand {
    Const(Value),
    Var(VarRef),
}

/// Operand entry (parsed constant, variable, or intermediate result).
#[derive(Debug, Clone)]
pub struct OperandEntry {
    /// `Constant` or `Variable`.
    pub token_type: TokenType,
    /// Value kind at push time; variables are re-read through their address.
    pub value_kind: ValueKind,
    /// Source-resolved scope and array flag (empty for constants).
    pub var_attribs: VarAttribs,
    pub value_attribs: u8,
    pub operand: Operand,
    pub token_step: u16,
}

impl OperandEntry {
    pub fn is_variable(&self) -> bool {
        self.token_type == TokenType::Variable
    }

    pub fn is_intermediate(&self) -> bool {
        self.value_attribs & VAL_INTERMEDIATE != 0
    }

    /// An intermediate constant entry holding the given value.
    pub fn intermediate(value: Value, token_step: u16) -> OperandEntry {
        OperandEntry {
            token_type: TokenType::Constant,
            value_kind: value.kind(),
            var_attribs: VarAttribs::new(),
            value_attribs: VAL_INTERMEDIATE,
            operand: Operand::Const(value),
            token_step,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminalEntry {
    /// Combined terminal index (0..47).
    pub index: u8,
    /// The token preceding this operator was a comma separator; the operator
    /// must not be mistaken for an infix operator.
    pub after_comma: bool,
    pub token_step: u16,
}

#[derive(Debug, Clone)]
pub struct FunctionNameEntry {
    /// `InternalFunction` or `UserFunction`.
    pub token_type: TokenType,
    /// Table index (built-ins) or function name index (user functions).
    pub index: u8,
    pub token_step: u16,
}

#[derive(Debug, Clone)]
pub struct GenericNameEntry {
    pub name: String,
    pub token_step: u16,
}

/// One evaluation stack entry. All variants share the token position prefix;
/// the tag replaces the record-shape unions of a C rendition.
#[derive(Debug, Clone)]
pub enum StackEntry {
    VarOrConst(OperandEntry),
    Terminal(TerminalEntry),
    Function(FunctionNameEntry),
    GenericName(GenericNameEntry),
}

impl StackEntry {
    pub fn token_step(&self) -> u16 {
        match self {
            StackEntry::VarOrConst(e) => e.token_step,
            StackEntry::Terminal(e) => e.token_step,
            StackEntry::Function(e) => e.token_step,
            StackEntry::GenericName(e) => e.token_step,
        }
    }

    pub fn as_operand(&self) -> Option<&OperandEntry> {
        match self {
            StackEntry::VarOrConst(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_operand_mut(&mut self) -> Option<&mut OperandEntry> {
        match self {
            StackEntry::VarOrConst(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_terminal(&self) -> Option<&TerminalEntry> {
        match self {
            StackEntry::Terminal(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_operand(&self) -> bool {
        matches!(self, StackEntry::VarOrConst(_))
    }
}
