use modular_bitfield::Specifier;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::Display;

/// Value kind as maintained in variable attribute bytes, constant tokens and
/// evaluation stack entries.
#[derive(
    Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Specifier, Copy, Clone, Display,
)]
#[repr(u8)]
#[bits = 3]
pub enum ValueKind {
    None = 0,
    Long = 1,
    Float = 2,
    Str = 3,
    /// Local parameter slot holding a reference to a caller variable.
    Ref = 4,
}

/// A Justina value: 32-bit signed integer, 32-bit float, or a string.
/// The empty string is represented as `None`, never as an empty heap string.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Long(i32),
    Float(f32),
    Str(Option<String>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Float(_))
    }

    /// Numeric value as f32 (longs are promoted). Panics on strings; callers
    /// must have applied the numeric type rules first.
    pub fn as_f32(&self) -> f32 {
        match self {
            Value::Long(v) => *v as f32,
            Value::Float(v) => *v,
            Value::Str(_) => unreachable!("string operand where a number was checked for"),
        }
    }

    /// Numeric value as i32 (floats are truncated).
    pub fn as_long(&self) -> i32 {
        match self {
            Value::Long(v) => *v,
            Value::Float(v) => *v as i32,
            Value::Str(_) => unreachable!("string operand where a number was checked for"),
        }
    }

    /// String contents; the empty string yields "".
    pub fn as_str(&self) -> &str {
        match self {
            Value::Str(Some(s)) => s.as_str(),
            Value::Str(None) => "",
            _ => unreachable!("numeric operand where a string was checked for"),
        }
    }

    /// Non-zero test, for conditions.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Long(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(_) => false,
        }
    }

    /// Wraps a string, normalizing the empty string to `None`.
    pub fn from_string(s: String) -> Value {
        if s.is_empty() { Value::Str(None) } else { Value::Str(Some(s)) }
    }

    /// The default value of a fresh slot (zero float).
    pub fn zero_float() -> Value {
        Value::Float(0.0)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Long(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::from_string(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_none() {
        assert_eq!(Value::from("") , Value::Str(None));
        assert_eq!(Value::from("a"), Value::Str(Some("a".to_string())));
    }

    #[test]
    fn truthiness() {
        assert!(Value::Long(-1).is_true());
        assert!(!Value::Float(0.0).is_true());
        assert!(!Value::Str(Some("x".to_string())).is_true());
    }
}
