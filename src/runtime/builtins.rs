use crate::global::functions::function_def;
use crate::global::token_codes::FuncCode;
use crate::interpreter::Interpreter;
use crate::runtime::error::ExecError;
use crate::runtime::eval_stack::{Operand, OperandEntry, StackEntry};
use crate::values::last_result::MAX_LAST_RESULT_DEPTH;
use crate::values::slots::{SlotValue, VarRef};
use crate::values::value::{Value, ValueKind};

/// One built-in function argument, copied from the evaluation stack by the
/// common argument helper.
pub(crate) struct ArgValue {
    pub kind: ValueKind,
    pub value: Value,
    pub var_ref: Option<VarRef>,
    /// The argument is a whole (unsubscripted) array variable.
    pub is_array: bool,
}

impl ArgValue {
    fn is_numeric(&self) -> bool {
        matches!(self.kind, ValueKind::Long | ValueKind::Float)
    }

    fn as_f32(&self) -> f32 {
        self.value.as_f32()
    }

    /// Integral value; floats must have no fractional part.
    fn as_exact_long(&self) -> Result<i32, ExecError> {
        match self.kind {
            ValueKind::Long => Ok(self.value.as_long()),
            ValueKind::Float => {
                let v = self.value.as_f32();
                if v.fract() != 0.0 {
                    return Err(ExecError::ArgIntegerExpected);
                }
                Ok(v as i32)
            }
            _ => Err(ExecError::ArgIntegerExpected),
        }
    }

    fn as_str(&self) -> Result<&str, ExecError> {
        match self.kind {
            ValueKind::Str => Ok(self.value.as_str()),
            _ => Err(ExecError::ArgStringExpected),
        }
    }
}

impl Interpreter {
    /// Copies built-in function arguments from the evaluation stack.
    fn copy_value_args_from_stack(&self, first_arg: usize, arg_count: usize) -> Vec<ArgValue> {
        (0..arg_count)
            .map(|i| {
                let index = first_arg + i;
                let (kind, value, var_ref) = self.operand_info(index);
                let is_array = match &self.eval_stack[index] {
                    StackEntry::VarOrConst(OperandEntry {
                        operand: Operand::Var(r), ..
                    }) => {
                        r.elem.is_none()
                            && matches!(self.slot(r.addr).value, SlotValue::Array(_))
                    }
                    _ => false,
                };
                ArgValue { kind, value, var_ref, is_array }
            })
            .collect()
    }

    /// Dispatches a built-in function call: pops the arguments, applies the
    /// implementation and pushes the intermediate result.
    pub(crate) fn exec_internal_function(
        &mut self,
        fn_entry_index: usize,
        first_arg: usize,
        arg_count: usize,
    ) -> Result<(), ExecError> {
        let (fn_index, fn_step) = match &self.eval_stack[fn_entry_index] {
            StackEntry::Function(entry) => (entry.index, entry.token_step),
            _ => unreachable!(),
        };
        self.active.error_pc = fn_step;
        let code = function_def(fn_index).code;

        let args = self.copy_value_args_from_stack(first_arg, arg_count);
        let result = self.apply_builtin(code, &args)?;

        // drop the arguments and the function name entry, push the result
        self.clear_eval_stack_levels(arg_count);
        self.eval_stack.pop();
        if matches!(result, Value::Str(Some(_))) {
            self.counters.intermediate_strings += 1;
        }
        self.eval_stack.push(StackEntry::VarOrConst(OperandEntry::intermediate(result, fn_step)));
        Ok(())
    }

    fn apply_builtin(&mut self, code: FuncCode, args: &[ArgValue]) -> Result<Value, ExecError> {
        use FuncCode::*;
        Ok(match code {
            // math functions, computed in single precision
            Sqrt => {
                let v = numeric(&args[0])?;
                if v < 0.0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::Float(v.sqrt())
            }
            Sin => Value::Float(numeric(&args[0])?.sin()),
            Cos => Value::Float(numeric(&args[0])?.cos()),
            Tan => Value::Float(numeric(&args[0])?.tan()),
            Asin => {
                let v = numeric(&args[0])?;
                if !(-1.0..=1.0).contains(&v) {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::Float(v.asin())
            }
            Acos => {
                let v = numeric(&args[0])?;
                if !(-1.0..=1.0).contains(&v) {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::Float(v.acos())
            }
            Atan => Value::Float(numeric(&args[0])?.atan()),
            Ln => {
                let v = numeric(&args[0])?;
                if v <= 0.0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::Float(v.ln())
            }
            Log10 => {
                let v = numeric(&args[0])?;
                if v <= 0.0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::Float(v.log10())
            }
            Exp => check_float(numeric(&args[0])?.exp())?,
            Round => Value::Float(numeric(&args[0])?.round()),
            Ceil => Value::Float(numeric(&args[0])?.ceil()),
            Floor => Value::Float(numeric(&args[0])?.floor()),
            Trunc => Value::Float(numeric(&args[0])?.trunc()),
            Min => numeric_pair_pick(&args[0], &args[1], true)?,
            Max => numeric_pair_pick(&args[0], &args[1], false)?,
            Abs => match (&args[0].kind, &args[0].value) {
                (ValueKind::Long, Value::Long(v)) => Value::Long(v.wrapping_abs()),
                (ValueKind::Float, Value::Float(v)) => Value::Float(v.abs()),
                _ => return Err(ExecError::ArgNumValueExpected),
            },
            Fmod => {
                let (a, b) = (numeric(&args[0])?, numeric(&args[1])?);
                if b == 0.0 {
                    return Err(ExecError::DivByZero);
                }
                Value::Float(a % b)
            }

            // selection: test/value pairs with an optional trailing default
            Ifte => {
                let mut i = 0;
                loop {
                    if i + 1 >= args.len() {
                        break if i < args.len() { args[i].value.clone() } else { Value::Long(0) };
                    }
                    if !args[i].is_numeric() {
                        return Err(ExecError::ArgNumValueExpected);
                    }
                    if args[i].value.is_true() {
                        break args[i + 1].value.clone();
                    }
                    i += 2;
                }
            }

            // conversion functions
            CInt => Value::Long(match args[0].kind {
                ValueKind::Long | ValueKind::Float => args[0].value.as_long(),
                _ => return Err(ExecError::ArgNumValueExpected),
            }),
            CFloat => Value::Float(match args[0].kind {
                ValueKind::Long | ValueKind::Float => args[0].as_f32(),
                _ => return Err(ExecError::ArgNumValueExpected),
            }),
            CStr => Value::from_string(self.display.format_value(&args[0].value)),

            // string and 'character' functions
            Len => Value::Long(args[0].as_str()?.len() as i32),
            Asc => {
                let s = args[0].as_str()?;
                let pos = if args.len() > 1 { args[1].as_exact_long()? } else { 1 };
                if pos < 1 || pos as usize > s.len() {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::Long(s.as_bytes()[pos as usize - 1] as i32)
            }
            Char => {
                let v = args[0].as_exact_long()?;
                if !(1..=255).contains(&v) {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::from_string((v as u8 as char).to_string())
            }
            Space => {
                let n = args[0].as_exact_long()?;
                if n < 0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::from_string(" ".repeat(n as usize))
            }
            RepChar => {
                let s = args[0].as_str()?;
                let n = args[1].as_exact_long()?;
                if s.is_empty() || n < 0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                let first = &s[..s.chars().next().map(char::len_utf8).unwrap_or(1)];
                Value::from_string(first.repeat(n as usize))
            }
            Left => {
                let s = args[0].as_str()?;
                let n = args[1].as_exact_long()?;
                if n < 0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::from_string(s.chars().take(n as usize).collect())
            }
            Right => {
                let s = args[0].as_str()?;
                let n = args[1].as_exact_long()?;
                if n < 0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                let skip = s.chars().count().saturating_sub(n as usize);
                Value::from_string(s.chars().skip(skip).collect())
            }
            Mid => {
                let s = args[0].as_str()?;
                let start = args[1].as_exact_long()?;
                let len = args[2].as_exact_long()?;
                if start < 1 || len < 0 {
                    return Err(ExecError::ArgOutsideRange);
                }
                Value::from_string(
                    s.chars().skip(start as usize - 1).take(len as usize).collect(),
                )
            }
            Ltrim => Value::from_string(args[0].as_str()?.trim_start().to_string()),
            Rtrim => Value::from_string(args[0].as_str()?.trim_end().to_string()),
            Trim => Value::from_string(args[0].as_str()?.trim().to_string()),
            ToUpper => Value::from_string(args[0].as_str()?.to_uppercase()),
            ToLower => Value::from_string(args[0].as_str()?.to_lowercase()),
            FindInStr => {
                let hay = args[0].as_str()?;
                let needle = args[1].as_str()?;
                let start = if args.len() > 2 { args[2].as_exact_long()? } else { 1 };
                if start < 1 {
                    return Err(ExecError::ArgOutsideRange);
                }
                let offset = start as usize - 1;
                let found = hay
                    .get(offset..)
                    .and_then(|tail| tail.find(needle))
                    .map(|i| (offset + i + 1) as i32)
                    .unwrap_or(0);
                Value::Long(found)
            }
            StrCmp => {
                let ordering = args[0].as_str()?.cmp(args[1].as_str()?);
                Value::Long(ordering as i32)
            }
            Quote => {
                let s = args[0].as_str()?;
                Value::from_string(format!("\"{s}\""))
            }
            Line => Value::from_string("\n".to_string()),

            // arrays and introspection
            Ubound => {
                let array = self.arg_array(&args[0])?;
                let dim = args[1].as_exact_long().map_err(|_| ExecError::ArgDimNumberIntegerExpected)?;
                if dim < 1 || dim > array.dim_count() as i32 {
                    return Err(ExecError::ArgDimNumberInvalid);
                }
                Value::Long(array.dim(dim as usize - 1) as i32)
            }
            Dims => {
                let array = self.arg_array(&args[0])?;
                Value::Long(array.dim_count() as i32)
            }
            ValueType => Value::Long(args[0].kind as i32),
            Last => {
                let n = if args.is_empty() {
                    1
                } else {
                    let n = args[0].as_exact_long()?;
                    if n < 1 || n as usize > MAX_LAST_RESULT_DEPTH {
                        return Err(ExecError::ArgOutsideRange);
                    }
                    n
                };
                self.last_results.get(n as usize).cloned().ok_or(ExecError::ArgInvalid)?
            }
            Millis => Value::Long(self.millis()),
        })
    }

    fn arg_array(&self, arg: &ArgValue) -> Result<&crate::values::ArrayObject, ExecError> {
        let var_ref = arg.var_ref.as_ref().ok_or(ExecError::ArgInvalid)?;
        match &self.slot(var_ref.addr).value {
            SlotValue::Array(array) => Ok(array),
            _ => Err(ExecError::ArgInvalid),
        }
    }
}

fn numeric(arg: &ArgValue) -> Result<f32, ExecError> {
    if !arg.is_numeric() {
        return Err(ExecError::ArgNumValueExpected);
    }
    Ok(arg.as_f32())
}

fn check_float(v: f32) -> Result<Value, ExecError> {
    if v.is_nan() {
        return Err(ExecError::Undefined);
    }
    if !v.is_finite() {
        return Err(ExecError::Overflow);
    }
    Ok(Value::Float(v))
}

/// min/max over two numeric arguments, preserving the winning operand's type.
fn numeric_pair_pick(a: &ArgValue, b: &ArgValue, pick_min: bool) -> Result<Value, ExecError> {
    if !a.is_numeric() || !b.is_numeric() {
        return Err(ExecError::ArgNumValueExpected);
    }
    let a_wins = if pick_min { a.as_f32() <= b.as_f32() } else { a.as_f32() >= b.as_f32() };
    Ok(if a_wins { a.value.clone() } else { b.value.clone() })
}
