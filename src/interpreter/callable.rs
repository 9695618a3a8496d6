use std::{cell::RefCell, fmt::Display, rc::Rc};

use crate::{ast::FunctionDecl, tokenizer::Token};

use super::{
    Environment, ExecutionError, Flow, Interpreter, RuntimeError, RuntimeErrorKind, Value,
};

#[derive(Debug)]
pub enum Callable {
    Function(Function),
    Native(NativeFunction),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Function(function) => function.decl.params.len(),
            Callable::Native(native) => native.arity,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Function(function) => &function.decl.name.lexeme,
            Callable::Native(native) => native.name,
        }
    }

    /// Calls with already evaluated arguments. The caller has checked the arity.
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value, ExecutionError> {
        match self {
            Callable::Function(function) => function.call(interpreter, arguments),
            Callable::Native(native) => (native.function)(&arguments).map_err(|kind| {
                RuntimeError {
                    line: paren.line,
                    kind,
                }
                .into()
            }),
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(_) => write!(f, "<fn {}>", self.name()),
            Callable::Native(_) => write!(f, "<native fn {}>", self.name()),
        }
    }
}

pub struct Function {
    decl: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
}

impl Function {
    pub fn new(decl: Rc<FunctionDecl>, closure: Rc<RefCell<Environment>>) -> Self {
        Self { decl, closure }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(function = %self.decl.name.lexeme))]
    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, ExecutionError> {
        let environment = Environment::boxed(Some(self.closure.clone()));
        for (param, argument) in self.decl.params.iter().zip(arguments) {
            environment
                .borrow_mut()
                .define(param.lexeme.clone(), argument);
        }

        match interpreter.execute_block(&self.decl.body, environment)? {
            Flow::Normal => Ok(Value::Nil),
            Flow::Return(value) => {
                tracing::trace!(%value, "returned");
                Ok(value)
            }
            Flow::Break => Err(interpreter.internal(format!(
                "break escaped the body of '{}'",
                self.decl.name.lexeme
            ))),
        }
    }
}

// The closure can reach this function again, so it is left out.
impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.decl.name.lexeme)
            .field("params", &self.decl.params.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub function: fn(&[Value]) -> Result<Value, RuntimeErrorKind>,
}
