use crate::global::token_codes::FuncCode;

// the 8 array pattern bits indicate the order of arrays and scalars; bit b0 to
// bit b7 refer to argument 1 to 8. If a bit is set, an array is expected.

pub struct FuncDef {
    pub name: &'static str,
    pub code: FuncCode,
    pub min_args: u8,
    pub max_args: u8,
    pub array_pattern: u8,
}

const fn func(name: &'static str, code: FuncCode, min_args: u8, max_args: u8, array_pattern: u8) -> FuncDef {
    FuncDef { name, code, min_args, max_args, array_pattern }
}

/// Built-in function definitions. The token stores the index into this table.
pub static FUNCTIONS: [FuncDef; 44] = [
    // math functions
    func("sqrt", FuncCode::Sqrt, 1, 1, 0b0),
    func("sin", FuncCode::Sin, 1, 1, 0b0),
    func("cos", FuncCode::Cos, 1, 1, 0b0),
    func("tan", FuncCode::Tan, 1, 1, 0b0),
    func("asin", FuncCode::Asin, 1, 1, 0b0),
    func("acos", FuncCode::Acos, 1, 1, 0b0),
    func("atan", FuncCode::Atan, 1, 1, 0b0),
    func("ln", FuncCode::Ln, 1, 1, 0b0),
    func("log10", FuncCode::Log10, 1, 1, 0b0),
    func("exp", FuncCode::Exp, 1, 1, 0b0),
    func("round", FuncCode::Round, 1, 1, 0b0),
    func("ceil", FuncCode::Ceil, 1, 1, 0b0),
    func("floor", FuncCode::Floor, 1, 1, 0b0),
    func("trunc", FuncCode::Trunc, 1, 1, 0b0),
    func("min", FuncCode::Min, 2, 2, 0b0),
    func("max", FuncCode::Max, 2, 2, 0b0),
    func("abs", FuncCode::Abs, 1, 1, 0b0),
    func("fmod", FuncCode::Fmod, 2, 2, 0b0),
    // lookup functions
    func("ifte", FuncCode::Ifte, 3, 15, 0b0),
    // conversion functions
    func("cInt", FuncCode::CInt, 1, 1, 0b0),
    func("cFloat", FuncCode::CFloat, 1, 1, 0b0),
    func("cStr", FuncCode::CStr, 1, 1, 0b0),
    // string and 'character' functions
    func("len", FuncCode::Len, 1, 1, 0b0),
    func("asc", FuncCode::Asc, 1, 2, 0b0),
    func("char", FuncCode::Char, 1, 1, 0b0),
    func("space", FuncCode::Space, 1, 1, 0b0),
    func("repChar", FuncCode::RepChar, 2, 2, 0b0),
    func("left", FuncCode::Left, 2, 2, 0b0),
    func("right", FuncCode::Right, 2, 2, 0b0),
    func("mid", FuncCode::Mid, 3, 3, 0b0),
    func("ltrim", FuncCode::Ltrim, 1, 1, 0b0),
    func("rtrim", FuncCode::Rtrim, 1, 1, 0b0),
    func("trim", FuncCode::Trim, 1, 1, 0b0),
    func("toUpper", FuncCode::ToUpper, 1, 1, 0b0),
    func("toLower", FuncCode::ToLower, 1, 1, 0b0),
    func("findInStr", FuncCode::FindInStr, 2, 3, 0b0),
    func("strCmp", FuncCode::StrCmp, 2, 2, 0b0),
    func("quote", FuncCode::Quote, 1, 1, 0b0),
    func("line", FuncCode::Line, 0, 0, 0b0),
    // other functions
    func("ubound", FuncCode::Ubound, 2, 2, 0b00000001), // first argument is an array
    func("dims", FuncCode::Dims, 1, 1, 0b00000001),
    func("type", FuncCode::ValueType, 1, 1, 0b0),
    func("r", FuncCode::Last, 0, 1, 0b0), // short label for 'last result'
    func("millis", FuncCode::Millis, 0, 0, 0b0),
];

pub fn function_def(index: u8) -> &'static FuncDef {
    &FUNCTIONS[index as usize]
}

pub fn find_function(name: &str) -> Option<(u8, &'static FuncDef)> {
    FUNCTIONS.iter().enumerate().find(|(_, def)| def.name == name).map(|(i, def)| (i as u8, def))
}
