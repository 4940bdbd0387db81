use crate::values::value::Value;

pub const DEFAULT_PRINT_WIDTH: i32 = 30;
pub const DEFAULT_NUM_PRECISION: i32 = 3;
pub const DEFAULT_CHARS_TO_PRINT: i32 = 30;

pub const MAX_PRINT_FIELD_WIDTH: i32 = 200;
pub const MAX_NUM_PRECISION: i32 = 7;
pub const MAX_CHARS_TO_PRINT: i32 = 200;

/// Process-wide display and print formatting state, updated by the `dispFmt`,
/// `floatFmt`, `intFmt` and `dispMode` commands.
#[derive(Debug, Clone)]
pub struct DisplaySettings {
    /// Minimum field width when printing the calculation result.
    pub width: i32,
    pub num_precision: i32,
    /// Maximum number of string characters shown for the calculation result.
    pub chars_to_print: i32,
    /// Float format specifier: 'F' (fixed), 'E' (scientific), 'G' (general).
    pub num_specifier: char,
    /// Print integers in hexadecimal.
    pub is_hex: bool,

    /// 0: no prompt, no echo; 1: prompt only; 2: prompt and echo.
    pub prompt_and_echo: i32,
    pub print_last_result: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            width: DEFAULT_PRINT_WIDTH,
            num_precision: DEFAULT_NUM_PRECISION,
            chars_to_print: DEFAULT_CHARS_TO_PRINT,
            num_specifier: 'G',
            is_hex: false,
            prompt_and_echo: 2,
            print_last_result: true,
        }
    }
}

impl DisplaySettings {
    /// Default formatting of a value, as used by the print commands.
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Long(v) => {
                if self.is_hex {
                    format!("{:X}", v)
                } else {
                    v.to_string()
                }
            }
            Value::Float(v) => self.format_float(*v),
            Value::Str(s) => s.clone().unwrap_or_default(),
        }
    }

    /// Formatting of the calculation result line: numbers are right-aligned in
    /// the display width, strings are clipped to the display character count.
    pub fn format_last_result(&self, value: &Value) -> String {
        match value {
            Value::Str(s) => {
                let s = s.as_deref().unwrap_or("");
                let clip = (self.chars_to_print.max(0)) as usize;
                s.chars().take(clip).collect()
            }
            numeric => {
                let text = self.format_value(numeric);
                let width = self.width.max(0) as usize;
                format!("{text:>width$}")
            }
        }
    }

    fn format_float(&self, v: f32) -> String {
        let precision = self.num_precision.clamp(0, MAX_NUM_PRECISION) as usize;
        match self.num_specifier {
            'F' => format!("{v:.precision$}"),
            'E' => format!("{v:.precision$e}"),
            // 'G': shortest of fixed and scientific, with trailing zeros removed
            _ => {
                if v != 0.0 && (v.abs() >= 1e7 || v.abs() < 1e-4) {
                    format!("{v:.precision$e}")
                } else {
                    let fixed = format!("{v:.precision$}");
                    if fixed.contains('.') {
                        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
                        trimmed.to_string()
                    } else {
                        fixed
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_format_trims_zeros() {
        let settings = DisplaySettings::default();
        assert_eq!(settings.format_value(&Value::Float(2.5)), "2.5");
        assert_eq!(settings.format_value(&Value::Float(3.0)), "3");
        assert_eq!(settings.format_value(&Value::Long(13)), "13");
    }

    #[test]
    fn hex_mode_formats_integers() {
        let settings = DisplaySettings { is_hex: true, ..Default::default() };
        assert_eq!(settings.format_value(&Value::Long(255)), "FF");
    }

    #[test]
    fn result_line_clips_strings() {
        let settings = DisplaySettings { chars_to_print: 3, ..Default::default() };
        assert_eq!(settings.format_last_result(&Value::from("abcdef")), "abc");
    }
}
