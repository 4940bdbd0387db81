pub mod console;
pub mod decompiler;
pub mod global;
pub mod interpreter;
pub mod logger;
pub mod parser;
pub mod program;
pub mod runtime;
pub mod utils;
pub mod values;

pub use console::{BufferConsole, Console, StdConsole};
pub use interpreter::Interpreter;
pub use parser::error::{ParseError, ParseErrorCode};
pub use runtime::error::{EventCode, ExecError, ExecStatus};
pub use values::value::{Value, ValueKind};

use thiserror::Error;

/// Top-level error type handed to the embedding host. Parse and execution
/// errors keep their stable numeric codes (see the per-subsystem enums).
#[derive(Debug, Error)]
pub enum JustinaError {
    #[error("parse error {}: {}", .0.code() as u16, .0)]
    Parse(#[from] ParseError),
    #[error("execution error {}: {}", .0.code(), .0)]
    Exec(#[from] ExecError),
}

impl JustinaError {
    /// The stable numeric code of the underlying error.
    pub fn code(&self) -> u16 {
        match self {
            JustinaError::Parse(e) => e.code() as u16,
            JustinaError::Exec(e) => e.code(),
        }
    }
}
