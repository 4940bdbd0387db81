use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::Display;

/// Token kind, stored in the low nibble of the first byte of every token
/// record. Terminal tokens occupy three kinds so that more than 16 terminals
/// can be enumerated while keeping the sub-index in the high nibble.
#[derive(
    Debug, Eq, PartialEq, Ord, PartialOrd, TryFromPrimitive, IntoPrimitive, Copy, Clone, Display,
)]
#[repr(u8)]
pub enum TokenType {
    NoToken = 0,
    ReservedWord,
    InternalFunction,
    UserFunction,
    Constant,
    Variable,
    GenericName,

    // all terminal tokens at the end of the list (token kind and sub-index combined in one byte)
    TerminalGroup1, // terminal index 0..15
    TerminalGroup2, // terminal index 16..31
    TerminalGroup3, // terminal index 32..47
}

impl TokenType {
    pub fn is_terminal(self) -> bool {
        self >= TokenType::TerminalGroup1
    }
}

/// Unique identification code of a terminal (operator or separator).
/// The discriminant doubles as the index into the terminal definition table.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone, Display)]
#[repr(u8)]
pub enum TermCode {
    // operators
    Assign = 0,
    PlusAssign,
    MinusAssign,
    MultAssign,
    DivAssign,
    ModAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
    BitShLeftAssign,
    BitShRightAssign,

    Lt,
    Gt,
    LtoE,
    GtoE,
    Ne,
    Eq,

    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    Pow,
    Incr,
    Decr,
    And,
    Or,
    Not,

    BitCompl,
    BitShLeft,
    BitShRight,
    BitAnd,
    BitOr,
    BitXor,

    // other terminals
    Comma,
    Semicolon,
    LeftPar,
    RightPar,
}

/// Last operator code; terminals at or below this code are operators.
pub const OP_RANGE_END: u8 = TermCode::BitXor as u8;

impl TermCode {
    pub fn is_operator(self) -> bool {
        (self as u8) <= OP_RANGE_END
    }
}

/// Unique identification code of a command (a statement-starting reserved word).
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone, Display)]
#[repr(u8)]
pub enum CmdCode {
    None = 0,

    Program,
    Function,
    Var,
    ConstVar,
    Static,
    Local,
    DeleteVar,
    ClearProg,
    ClearMem,

    For,
    While,
    If,
    ElseIf,
    Else,
    End,
    Break,
    Continue,
    Return,

    Print,
    Cout,
    CoutLine,
    CoutList,
    Dbout,
    DboutLine,
    Input,

    DispFmt,
    FloatFmt,
    IntFmt,
    DispMode,

    Quit,
    Stop,
    Abort,
    Nop,
}

/// Unique identification code of a built-in function.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone, Display)]
#[repr(u8)]
pub enum FuncCode {
    // math
    Sqrt = 0,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Ln,
    Log10,
    Exp,
    Round,
    Ceil,
    Floor,
    Trunc,
    Min,
    Max,
    Abs,
    Fmod,

    // selection
    Ifte,

    // conversion
    CInt,
    CFloat,
    CStr,

    // strings and characters
    Len,
    Asc,
    Char,
    Space,
    RepChar,
    Left,
    Right,
    Mid,
    Ltrim,
    Rtrim,
    Trim,
    ToUpper,
    ToLower,
    FindInStr,
    StrCmp,
    Quote,
    Line,

    // arrays and introspection
    Ubound,
    Dims,
    ValueType,
    Last,
    Millis,
}
