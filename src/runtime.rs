use std::{cell::RefCell, io::Write, rc::Rc};

use tracing::debug;

use crate::{
    interpreter::{ExecutionError, Interpreter},
    parser::{self, ParseErrors},
    tokenizer::{self, TokenizeErrors},
};

/// Drives source text through tokenizing, parsing and interpreting. Every failure is reported
/// to the diagnostics sink, one line per error, before it is returned.
pub struct Runtime {
    interpreter: Interpreter,
    diagnostics: Rc<RefCell<dyn Write>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeErrors),
    #[error(transparent)]
    Parse(#[from] ParseErrors),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Failed to write diagnostics: {0}")]
    Diagnostics(#[source] std::io::Error),
}

impl RunError {
    /// Process exit code for this failure, following the sysexits convention.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Tokenize(_) | RunError::Parse(_) => 65,
            RunError::Execution(_) | RunError::Diagnostics(_) => 70,
        }
    }
}

impl Runtime {
    pub fn new(output: Rc<RefCell<dyn Write>>, diagnostics: Rc<RefCell<dyn Write>>) -> Self {
        Self {
            interpreter: Interpreter::new(output),
            diagnostics,
        }
    }

    /// Runs `source` against the state left by earlier runs.
    #[tracing::instrument(level = "debug", skip_all, fields(bytes = source.len()))]
    pub fn run(&mut self, source: &str) -> Result<(), RunError> {
        let result = self.pipeline(source);
        if let Err(err) = &result {
            self.report(err).map_err(RunError::Diagnostics)?;
        }
        result
    }

    fn pipeline(&mut self, source: &str) -> Result<(), RunError> {
        let tokens = tokenizer::tokens(source)?;
        debug!(tokens = tokens.len(), "tokenized");

        let program = parser::program(&tokens)?;
        debug!(statements = program.0.len(), "parsed");

        self.interpreter.interpret(&program)?;
        Ok(())
    }

    fn report(&self, err: &RunError) -> std::io::Result<()> {
        let mut diagnostics = self.diagnostics.borrow_mut();
        match err {
            RunError::Tokenize(errors) => {
                for error in &errors.0 {
                    writeln!(diagnostics, "{error}")?;
                }
            }
            RunError::Parse(errors) => {
                for error in &errors.0 {
                    writeln!(diagnostics, "{error}")?;
                }
            }
            RunError::Execution(error) => writeln!(diagnostics, "{error}")?,
            RunError::Diagnostics(_) => {}
        }
        diagnostics.flush()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn runtime() -> (Runtime, Rc<RefCell<Vec<u8>>>, Rc<RefCell<Vec<u8>>>) {
        let output = Rc::new(RefCell::new(Vec::new()));
        let diagnostics = Rc::new(RefCell::new(Vec::new()));
        (
            Runtime::new(output.clone(), diagnostics.clone()),
            output,
            diagnostics,
        )
    }

    fn text(sink: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8(sink.borrow().clone()).unwrap()
    }

    #[test]
    fn test_lexical_errors_stop_before_parsing() {
        let (mut runtime, output, diagnostics) = runtime();
        let err = runtime.run("print 1;\n@\nprint \"open;").unwrap_err();

        assert_eq!(err.exit_code(), 65);
        assert_eq!(text(&output), "");
        assert_eq!(
            text(&diagnostics),
            "[line 2] Error: Unexpected character: '@'\n[line 3] Error: Unterminated string.\n"
        );
    }

    #[test]
    fn test_parse_errors_suppress_evaluation() {
        let (mut runtime, output, diagnostics) = runtime();
        let err = runtime.run("print 1;\nprint 2\nprint 3;\nvar = 3;").unwrap_err();

        assert_eq!(err.exit_code(), 65);
        assert_eq!(text(&output), "");
        assert_eq!(
            text(&diagnostics),
            "[line 3] Error at 'print': Expect ';' after value.\n\
             [line 4] Error at '=': Expect variable name.\n"
        );
    }

    #[test]
    fn test_runtime_error_keeps_earlier_output() {
        let (mut runtime, output, diagnostics) = runtime();
        let err = runtime.run("print 1;\nprint -\"x\";\nprint 2;").unwrap_err();

        assert_eq!(err.exit_code(), 70);
        assert_eq!(text(&output), "1\n");
        assert_eq!(
            text(&diagnostics),
            "[line 2] Runtime error: Operand must be a number.\n"
        );
    }

    #[test]
    fn test_state_persists_between_runs() {
        let (mut runtime, output, _) = runtime();
        runtime.run("var a = 1;").unwrap();
        runtime.run("fun inc() { a = a + 1; }").unwrap();
        runtime.run("inc(); print a;").unwrap();

        assert_eq!(text(&output), "2\n");
    }

    #[test]
    fn test_state_survives_runtime_error() {
        let (mut runtime, output, _) = runtime();
        assert!(runtime.run("var a = 1; { var b = 2; b(); }").is_err());
        runtime.run("print a;").unwrap();
        assert!(runtime.run("print b;").is_err());

        assert_eq!(text(&output), "1\n");
    }
}
