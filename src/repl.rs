use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::{Result, VgError},
    runtime::Interpreter,
};

/// Line-at-a-time session over one interpreter, so definitions from
/// earlier lines stay visible.
pub struct Repl {
    interpreter: Interpreter,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Self::with_interpreter(Interpreter::new())
    }

    pub fn with_interpreter(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline("vg> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    self.eval_line(trimmed);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }

    /// Evaluates one line, echoing a non-null result or the rendered error.
    pub fn eval_line(&mut self, line: &str) {
        match self.interpreter.interpret(line) {
            Ok(value) if value.is_null() => {}
            Ok(value) => println!("{value}"),
            Err(VgError::Diagnostic(diag)) => eprintln!("{}", diag.render(None)),
            Err(other) => eprintln!("error: {other}"),
        }
    }

    pub fn interpreter(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }
}

fn readline_error(err: ReadlineError) -> VgError {
    VgError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
