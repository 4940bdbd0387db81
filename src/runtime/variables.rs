use crate::global::MAX_ALPHA_LEN;
use crate::interpreter::Interpreter;
use crate::runtime::error::ExecError;
use crate::values::array::MAX_ARRAY_DIMS;
use crate::values::attribs::{VarAttribs, VarScope};
use crate::values::slots::{SlotValue, VarAddr, VarRef};
use crate::values::value::{Value, ValueKind};

impl Interpreter {
    /// Resolves a variable token to the value slot address, the current value
    /// kind and the source-resolved attributes.
    ///
    /// For reference parameters the stored source address is followed, so the
    /// source's type controls behavior; the reported scope is the source
    /// variable's scope. For all other scopes the slot's own attributes are
    /// returned.
    pub(crate) fn fetch_var_address(
        &self,
        attrib_byte: u8,
        value_index: u8,
    ) -> (VarRef, ValueKind, VarAttribs) {
        let token_attribs = VarAttribs::from_byte(attrib_byte);
        let addr = match token_attribs.scope() {
            VarScope::User => VarAddr::User(value_index as usize),
            VarScope::Global => VarAddr::Global(value_index as usize),
            VarScope::Static => VarAddr::Static(value_index as usize),
            _ => VarAddr::Local {
                frame: self.active.frame.expect("local variable outside a function call"),
                slot: value_index as usize,
            },
        };

        let slot = self.slot(addr);
        if let SlotValue::Ref(source) = &slot.value {
            let source = *source;
            let kind = self.var_kind_at(&source);
            let source_slot = self.slot(source.addr);
            let is_whole_array =
                matches!(source_slot.value, SlotValue::Array(_)) && source.elem.is_none();
            let attribs = VarAttribs::of(source_slot.attribs.scope(), kind)
                .with_is_array(is_whole_array)
                .with_is_const(source_slot.attribs.is_const());
            return (source, kind, attribs);
        }

        let kind = slot.attribs.value_kind();
        let attribs = token_attribs.with_value_kind(kind);
        (VarRef::scalar(addr), kind, attribs)
    }

    /// Current value kind behind a resolved reference.
    pub(crate) fn var_kind_at(&self, vref: &VarRef) -> ValueKind {
        let slot = self.slot(vref.addr);
        match (&slot.value, vref.elem) {
            (SlotValue::Array(array), _) => array.elem_kind(),
            (SlotValue::Val(value), _) => value.kind(),
            (SlotValue::Ref(inner), _) => self.var_kind_at(&inner.clone()),
        }
    }

    /// Current value behind a resolved reference (scalar slot or array element).
    pub(crate) fn var_value_at(&self, vref: &VarRef) -> Value {
        let slot = self.slot(vref.addr);
        match (&slot.value, vref.elem) {
            (SlotValue::Array(array), Some(elem)) => array.get(elem as usize),
            (SlotValue::Array(_), None) => Value::Long(0), // whole array: no scalar value
            (SlotValue::Val(value), _) => value.clone(),
            (SlotValue::Ref(inner), _) => self.var_value_at(&inner.clone()),
        }
    }

    /// Stores a value through a resolved reference.
    ///
    /// Scalars take over the stored value's kind (pure assignment is the only
    /// operator that changes a scalar's type); array elements keep the array's
    /// fixed element kind, the caller having applied the cast rules. Strings
    /// are clipped to the maximum string length; a displaced string object is
    /// released from the heap accounting, a stored one is added.
    pub(crate) fn store_var_value(&mut self, vref: &VarRef, value: Value) -> Result<(), ExecError> {
        let scope = {
            let slot = self.slot(vref.addr);
            if slot.attribs.is_const() {
                return Err(ExecError::ConstantVarCannotBeChanged);
            }
            slot.attribs.scope()
        };

        let value = clip_string(value);
        let stores_string = matches!(value, Value::Str(Some(_)));
        let new_kind = value.kind();

        let slot = self.slot_mut(vref.addr);
        let mut scalar_store = false;
        let displaced = match (&mut slot.value, vref.elem) {
            (SlotValue::Array(array), Some(elem)) => array.set(elem as usize, value),
            (SlotValue::Array(_), None) => return Err(ExecError::ArrayValueTypeIsFixed),
            (slot_value, _) => {
                scalar_store = true;
                let old = std::mem::replace(slot_value, SlotValue::Val(value));
                match old {
                    SlotValue::Val(Value::Str(s)) => s,
                    _ => None,
                }
            }
        };
        if scalar_store {
            slot.attribs.set_value_kind(new_kind);
        }

        let counter = self.counters.var_strings_mut(scope);
        if displaced.is_some() {
            *counter -= 1;
        }
        if stores_string {
            *counter += 1;
        }
        Ok(())
    }

    /// Pops subscripts against the referenced array: verifies they are numeric
    /// and integral, checks the dimension count, computes the row-major linear
    /// index and returns a reference to the element.
    pub(crate) fn resolve_array_element(
        &self,
        base: &VarRef,
        subscripts: &[Value],
    ) -> Result<VarRef, ExecError> {
        let mut subs = [0i32; MAX_ARRAY_DIMS];
        for (i, value) in subscripts.iter().enumerate() {
            subs[i] = match value {
                Value::Long(v) => *v,
                Value::Float(f) if f.fract() == 0.0 => *f as i32,
                Value::Float(_) => return Err(ExecError::ArraySubscriptNonInteger),
                Value::Str(_) => return Err(ExecError::ArraySubscriptNonNumeric),
            };
        }

        let slot = self.slot(base.addr);
        let SlotValue::Array(array) = &slot.value else {
            return Err(ExecError::ArrayDimCountInvalid);
        };
        if subscripts.len() != array.dim_count() as usize {
            return Err(ExecError::ArrayDimCountInvalid);
        }
        let elem = array
            .linear_index(&subs[..subscripts.len()])
            .ok_or(ExecError::ArraySubscriptOutsideBounds)?;
        Ok(VarRef { addr: base.addr, elem: Some(elem as u16) })
    }
}

/// Strings stored into variables are limited to the maximum string length.
fn clip_string(value: Value) -> Value {
    match value {
        Value::Str(Some(s)) if s.len() > MAX_ALPHA_LEN => {
            let clipped: String = s.chars().take(MAX_ALPHA_LEN).collect();
            Value::from_string(clipped)
        }
        other => other,
    }
}
