use crate::global::app_flags::Status;
use crate::interpreter::Interpreter;
use crate::program::IMM_START;
use crate::runtime::commands_exec::ResetRequest;
use crate::runtime::error::ExecStatus;
use crate::JustinaError;
use log::info;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::rc::Rc;

pub const PROMPT_TEXT: &str = "Justina> ";

/// The character stream the interpreter talks to. The host owns the transport;
/// the core only needs line-oriented reads and raw writes.
pub trait Console {
    fn write(&mut self, text: &str);
    /// Blocks until a line is available; `None` at end of stream.
    fn read_line(&mut self) -> Option<String>;
}

/// Standard input/output console.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write(&mut self, text: &str) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

/// An in-memory console: scripted input lines, captured output. The output
/// buffer is shared so it stays readable while the interpreter owns the
/// console.
#[derive(Debug, Default)]
pub struct BufferConsole {
    output: Rc<RefCell<String>>,
    input: VecDeque<String>,
}

impl BufferConsole {
    pub fn new() -> BufferConsole {
        BufferConsole::default()
    }

    pub fn with_input(lines: &[&str]) -> BufferConsole {
        BufferConsole {
            output: Rc::new(RefCell::new(String::new())),
            input: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Handle on the captured output.
    pub fn output(&self) -> Rc<RefCell<String>> {
        Rc::clone(&self.output)
    }
}

impl Console for BufferConsole {
    fn write(&mut self, text: &str) {
        self.output.borrow_mut().push_str(text);
    }

    fn read_line(&mut self) -> Option<String> {
        self.input.pop_front()
    }
}

/// Line assembly and the read-parse-execute loop.
impl Interpreter {
    /// Processes one immediate-mode command line: assembles the statements
    /// (appending a line terminator where the input has none), parses them
    /// into the immediate area, executes, and applies any reset the executed
    /// commands requested.
    pub fn process_line(&mut self, line: &str) -> Result<ExecStatus, JustinaError> {
        self.app_flags.set_status(Status::Parsing);
        self.program.clear_immediate(&mut self.counters);
        self.parser.reset();

        let source = terminated(line);
        if let Err(err) = self.parse_source(&source).and_then(|_| self.check_line_complete()) {
            self.report_parse_error(&source, err);
            self.program.clear_immediate(&mut self.counters);
            self.parser.reset();
            self.app_flags.set_status(Status::Idle);
            return Err(err.into());
        }

        let result = self.execute(IMM_START);
        self.apply_pending_reset();
        match result {
            Ok(ExecStatus::Killed) => {
                self.reset_machine(true);
                Ok(ExecStatus::Killed)
            }
            other => other.map_err(JustinaError::from),
        }
    }

    /// Loads a multi-statement program: the previous program is discarded,
    /// statements accumulate into the program buffer until end-of-stream. On
    /// any error the whole program is reset, so no partial fragment remains.
    pub fn load_program(&mut self, source: &str) -> Result<(), JustinaError> {
        self.app_flags.set_status(Status::Parsing);
        self.clear_execution_state();
        self.clear_program_data();
        self.parser.reset();
        self.program_mode = true;

        let result = self
            .parse_source(&terminated(source))
            .and_then(|_| self.check_program_complete());
        self.program_mode = false;
        self.app_flags.set_status(Status::Idle);

        match result {
            Ok(()) => {
                info!("program loaded ({} bytes of tokens)", self.program.program_len());
                Ok(())
            }
            Err(err) => {
                self.report_parse_error(source, err);
                self.clear_program_data();
                self.parser.reset();
                Err(err.into())
            }
        }
    }

    /// The interactive loop: prompt, read, parse, execute, until the stream
    /// ends or a quit or kill request arrives.
    pub fn run(&mut self) -> Result<(), JustinaError> {
        loop {
            if self.display.prompt_and_echo > 0 {
                self.console.write(PROMPT_TEXT);
            }
            let Some(line) = self.console.read_line() else {
                break;
            };
            if self.display.prompt_and_echo > 1 {
                self.console.write(&line);
                if !line.ends_with('\n') {
                    self.console.write("\n");
                }
            }
            match self.process_line(&line) {
                Ok(ExecStatus::Quit) | Ok(ExecStatus::Killed) => break,
                Ok(_) => {}
                Err(_) => {
                    // the error was reported on the console; back to the prompt
                }
            }
        }
        self.reset_machine(true);
        Ok(())
    }

    fn report_parse_error(&mut self, source: &str, err: crate::ParseError) {
        let line_start = source[..err.pos().min(source.len())].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = source[err.pos().min(source.len())..]
            .find('\n')
            .map(|i| err.pos() + i)
            .unwrap_or(source.len());
        let line = &source[line_start..line_end];
        let caret_col = err.pos().saturating_sub(line_start);
        let text = format!(
            "  {line}\n  {caret:>width$} Parse error {code}\n",
            caret = '^',
            width = caret_col + 1,
            code = err.code() as u16,
        );
        self.console.write(&text);
    }

    fn apply_pending_reset(&mut self) {
        match self.pending_reset.take() {
            Some(ResetRequest::ClearProgram) => {
                self.clear_execution_state();
                self.clear_program_data();
                self.parser.reset();
            }
            Some(ResetRequest::ClearAll) => self.reset_machine(true),
            None => {}
        }
    }
}

/// Appends a statement terminator on its own line when the input does not end
/// with one (a trailing line comment would otherwise swallow it).
fn terminated(source: &str) -> String {
    if source.trim_end().ends_with(';') {
        source.to_string()
    } else {
        format!("{source}\n;")
    }
}
