use crate::values::value::ValueKind;
use modular_bitfield::prelude::*;

/// Variable scope, as stored in the variable attribute byte and in variable
/// tokens.
#[derive(Debug, Eq, PartialEq, Specifier, Copy, Clone)]
#[bits = 3]
pub enum VarScope {
    /// Scope not yet resolved (parse-time only, never stored in a token).
    Unresolved = 0,
    Param = 1,
    Local = 2,
    Static = 3,
    Global = 4,
    User = 5,
}

impl VarScope {
    pub fn is_local_or_param(self) -> bool {
        matches!(self, VarScope::Param | VarScope::Local)
    }
}

/// The packed variable attribute byte: value kind (bits 2..0), array flag
/// (bit 3), scope (bits 6..4), constant flag (bit 7).
///
/// One of these is maintained per variable slot; variable tokens carry a copy
/// with the value kind left `None` (scalar value kinds can change at runtime,
/// so they are never baked into tokens).
#[bitfield]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct VarAttribs {
    pub value_kind: ValueKind,
    pub is_array: bool,
    pub scope: VarScope,
    pub is_const: bool,
}

impl VarAttribs {
    pub fn of(scope: VarScope, kind: ValueKind) -> VarAttribs {
        VarAttribs::new().with_scope(scope).with_value_kind(kind)
    }

    pub fn byte(self) -> u8 {
        self.into_bytes()[0]
    }

    pub fn from_byte(byte: u8) -> VarAttribs {
        VarAttribs::from_bytes([byte])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_byte() {
        let a = VarAttribs::new()
            .with_scope(VarScope::Static)
            .with_value_kind(ValueKind::Str)
            .with_is_array(true);
        let b = VarAttribs::from_byte(a.byte());
        assert_eq!(b.scope(), VarScope::Static);
        assert_eq!(b.value_kind(), ValueKind::Str);
        assert!(b.is_array());
        assert!(!b.is_const());
    }
}
