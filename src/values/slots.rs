use crate::values::array::ArrayObject;
use crate::values::attribs::{VarAttribs, VarScope};
use crate::values::value::{Value, ValueKind};

/// Address of a variable value slot. Local addresses carry the index of the
/// owning call frame; a frame is always torn down before its caller, which is
/// what keeps stored addresses valid for exactly the callee's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarAddr {
    User(usize),
    Global(usize),
    Static(usize),
    Local { frame: usize, slot: usize },
}

/// A resolved reference to a scalar slot or to a single array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef {
    pub addr: VarAddr,
    /// Linear element index for array element references.
    pub elem: Option<u16>,
}

impl VarRef {
    pub fn scalar(addr: VarAddr) -> VarRef {
        VarRef { addr, elem: None }
    }
}

/// What a variable slot holds: a plain value, an owned array object, or (for
/// parameters passed by variable) a non-owning reference to a caller slot.
#[derive(Debug, Clone)]
pub enum SlotValue {
    Val(Value),
    Array(ArrayObject),
    Ref(VarRef),
}

/// One variable: the value storage plus the packed attribute byte.
#[derive(Debug, Clone)]
pub struct VarSlot {
    pub value: SlotValue,
    pub attribs: VarAttribs,
}

impl VarSlot {
    /// A fresh scalar slot, initialized to zero (float), as for locals and
    /// declarations without an initializer.
    pub fn fresh(scope: VarScope) -> VarSlot {
        VarSlot {
            value: SlotValue::Val(Value::zero_float()),
            attribs: VarAttribs::of(scope, ValueKind::Float),
        }
    }

    pub fn scalar(scope: VarScope, value: Value) -> VarSlot {
        let kind = value.kind();
        VarSlot { value: SlotValue::Val(value), attribs: VarAttribs::of(scope, kind) }
    }

    pub fn array(scope: VarScope, array: ArrayObject) -> VarSlot {
        let kind = array.elem_kind();
        VarSlot {
            value: SlotValue::Array(array),
            attribs: VarAttribs::of(scope, kind).with_is_array(true),
        }
    }
}
