mod callable;
mod environment;
mod native;
mod value;

use std::{cell::RefCell, fmt::Debug, io::Write, mem, rc::Rc};

use crate::ast::{
    Expression, InfixOperator, LogicalOperator, Program, Statement, UnaryOperator,
};

pub use self::{
    callable::{Callable, Function, NativeFunction},
    environment::Environment,
    value::Value,
};

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    stdout: Rc<RefCell<dyn Write>>,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("environment", &self.environment.borrow())
            .field("globals", &self.globals.borrow())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[line {line}] Runtime error: {kind}")]
pub struct RuntimeError {
    pub line: usize,
    pub kind: RuntimeErrorKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("Operands must be two numbers.")]
    OperandsMustBeNumbers,
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be two numbers, two strings, or a string and a number.")]
    InvalidAddition,
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Can only call functions.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {found}.")]
    ArityMismatch { expected: usize, found: usize },
    #[error("Native function '{name}' failed: {reason}")]
    NativeFailure { name: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
    /// A state the interpreter should never reach. `snapshot` is the interpreter's
    /// debug output at the point of failure.
    #[error("Internal error: {message}")]
    Internal { message: String, snapshot: String },
}

/// How control leaves a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Return(Value),
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        let globals = Environment::boxed(None);
        for native in native::NATIVES {
            globals
                .borrow_mut()
                .define(native.name, Value::Callable(Rc::new(Callable::Native(*native))));
        }

        Self {
            environment: globals.clone(),
            globals,
            stdout,
        }
    }

    /// Runs every statement in order, stopping at the first error. Definitions made before
    /// the error stay in the global scope.
    #[tracing::instrument(level = "debug", skip_all, fields(statements = program.0.len()))]
    pub fn interpret(&mut self, program: &Program) -> Result<(), ExecutionError> {
        for statement in program.0.iter() {
            match self.execute(statement)? {
                Flow::Normal => {}
                flow => {
                    return Err(self.internal(format!("{flow:?} escaped to the top level")));
                }
            }
        }

        Ok(())
    }

    pub fn execute(&mut self, statement: &Statement) -> Result<Flow, ExecutionError> {
        let flow = match statement {
            Statement::Expression(expression) => {
                self.evaluate(expression)?;
                Flow::Normal
            }
            Statement::Print(expression) => {
                let value = self.evaluate(expression)?;
                writeln!(self.stdout.borrow_mut(), "{}", value)?;
                Flow::Normal
            }
            Statement::VarDeclaration { name, initializer } => {
                let value = match initializer {
                    Some(initializer) => self.evaluate(initializer)?,
                    None => Value::Nil,
                };
                self.environment
                    .borrow_mut()
                    .define(name.lexeme.clone(), value);
                Flow::Normal
            }
            Statement::Block(statements) => {
                let environment = Environment::boxed(Some(self.environment.clone()));
                self.execute_block(statements, environment)?
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)?
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?
                } else {
                    Flow::Normal
                }
            }
            Statement::While { condition, body } => {
                let mut flow = Flow::Normal;
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        returned @ Flow::Return(_) => {
                            flow = returned;
                            break;
                        }
                    }
                }
                flow
            }
            Statement::Break(_) => Flow::Break,
            Statement::FunctionDeclaration(decl) => {
                let function = Function::new(decl.clone(), self.environment.clone());
                self.environment.borrow_mut().define(
                    decl.name.lexeme.clone(),
                    Value::Callable(Rc::new(Callable::Function(function))),
                );
                Flow::Normal
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Nil,
                };
                Flow::Return(value)
            }
        };

        Ok(flow)
    }

    /// Executes `statements` with `environment` as the current scope. The previous scope is
    /// restored afterwards, also when a statement fails.
    pub fn execute_block(
        &mut self,
        statements: &[Statement],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Flow, ExecutionError> {
        self.execute_in_scope(environment, |interpreter| {
            for statement in statements {
                match interpreter.execute(statement)? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn execute_in_scope<T>(
        &mut self,
        environment: Rc<RefCell<Environment>>,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionError>,
    ) -> Result<T, ExecutionError> {
        let previous = mem::replace(&mut self.environment, environment);
        let result = f(self);
        self.environment = previous;
        result
    }

    pub fn evaluate(&mut self, expression: &Expression) -> Result<Value, ExecutionError> {
        let value = match expression {
            Expression::Literal(literal) => Value::from(literal.clone()),
            Expression::Grouping(inner) => self.evaluate(inner)?,
            Expression::Variable(name) => self.environment.borrow().get(name)?,
            Expression::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.environment
                    .borrow_mut()
                    .assign(name, value.clone())?;
                value
            }
            Expression::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                match (operator.kind, right) {
                    (UnaryOperator::Negate, Value::Number(n)) => Value::Number(-n),
                    (UnaryOperator::Negate, _) => {
                        return Err(RuntimeError {
                            line: operator.line,
                            kind: RuntimeErrorKind::OperandMustBeNumber,
                        }
                        .into())
                    }
                    (UnaryOperator::Not, right) => Value::Boolean(!right.is_truthy()),
                }
            }
            Expression::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(operator.kind, left, right).map_err(|kind| RuntimeError {
                    line: operator.line,
                    kind,
                })?
            }
            Expression::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let decided = match operator.kind {
                    LogicalOperator::Or => left.is_truthy(),
                    LogicalOperator::And => !left.is_truthy(),
                };
                if decided {
                    left
                } else {
                    self.evaluate(right)?
                }
            }
            Expression::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;
                let arguments = arguments
                    .iter()
                    .map(|argument| self.evaluate(argument))
                    .collect::<Result<Vec<_>, _>>()?;

                let Value::Callable(callable) = callee else {
                    return Err(RuntimeError {
                        line: paren.line,
                        kind: RuntimeErrorKind::NotCallable,
                    }
                    .into());
                };

                if arguments.len() != callable.arity() {
                    return Err(RuntimeError {
                        line: paren.line,
                        kind: RuntimeErrorKind::ArityMismatch {
                            expected: callable.arity(),
                            found: arguments.len(),
                        },
                    }
                    .into());
                }

                callable.call(self, arguments, paren)?
            }
        };

        Ok(value)
    }

    /// Builds an internal error carrying a snapshot of the current state.
    pub(crate) fn internal(&self, message: String) -> ExecutionError {
        tracing::error!(%message, "internal interpreter error");
        ExecutionError::Internal {
            message,
            snapshot: format!("{self:#?}"),
        }
    }
}

fn binary(operator: InfixOperator, left: Value, right: Value) -> Result<Value, RuntimeErrorKind> {
    use InfixOperator::*;

    let value = match (operator, left, right) {
        (Equal, left, right) => Value::Boolean(left == right),
        (NotEqual, left, right) => Value::Boolean(left != right),
        (Plus, Value::Number(a), Value::Number(b)) => Value::Number(a + b),
        (Plus, Value::String(a), Value::String(b)) => Value::String(a + &b),
        (Plus, Value::String(a), number @ Value::Number(_)) => Value::String(format!("{a}{number}")),
        (Plus, _, _) => return Err(RuntimeErrorKind::InvalidAddition),
        (Minus, Value::Number(a), Value::Number(b)) => Value::Number(a - b),
        (Multiply, Value::Number(a), Value::Number(b)) => Value::Number(a * b),
        (Divide, Value::Number(_), Value::Number(b)) if b == 0.0 => {
            return Err(RuntimeErrorKind::DivisionByZero)
        }
        (Divide, Value::Number(a), Value::Number(b)) => Value::Number(a / b),
        (LessThan, Value::Number(a), Value::Number(b)) => Value::Boolean(a < b),
        (LessThanOrEqual, Value::Number(a), Value::Number(b)) => Value::Boolean(a <= b),
        (GreaterThan, Value::Number(a), Value::Number(b)) => Value::Boolean(a > b),
        (GreaterThanOrEqual, Value::Number(a), Value::Number(b)) => Value::Boolean(a >= b),
        (
            Minus | Multiply | Divide | LessThan | LessThanOrEqual | GreaterThan
            | GreaterThanOrEqual,
            _,
            _,
        ) => return Err(RuntimeErrorKind::OperandsMustBeNumbers),
    };

    Ok(value)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn number(n: f64) -> Value {
        Value::Number(n)
    }

    fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_addition() {
        assert_eq!(binary(InfixOperator::Plus, number(1.0), number(2.0)), Ok(number(3.0)));
        assert_eq!(binary(InfixOperator::Plus, string("a"), string("b")), Ok(string("ab")));
        assert_eq!(binary(InfixOperator::Plus, string("a"), number(1.0)), Ok(string("a1")));
        assert_eq!(
            binary(InfixOperator::Plus, number(1.0), string("a")),
            Err(RuntimeErrorKind::InvalidAddition)
        );
        assert_eq!(
            binary(InfixOperator::Plus, string("a"), Value::Nil),
            Err(RuntimeErrorKind::InvalidAddition)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            binary(InfixOperator::Divide, number(1.0), number(0.0)),
            Err(RuntimeErrorKind::DivisionByZero)
        );
        assert_eq!(
            binary(InfixOperator::Divide, number(1.0), number(-0.0)),
            Err(RuntimeErrorKind::DivisionByZero)
        );
        assert_eq!(binary(InfixOperator::Divide, number(0.0), number(4.0)), Ok(number(0.0)));
    }

    #[test]
    fn test_comparison_requires_numbers() {
        assert_eq!(
            binary(InfixOperator::LessThan, number(1.0), number(2.0)),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            binary(InfixOperator::GreaterThanOrEqual, string("a"), string("b")),
            Err(RuntimeErrorKind::OperandsMustBeNumbers)
        );
        assert_eq!(
            binary(InfixOperator::Minus, Value::Nil, number(1.0)),
            Err(RuntimeErrorKind::OperandsMustBeNumbers)
        );
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(
            binary(InfixOperator::Equal, string("a"), string("a")),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            binary(InfixOperator::NotEqual, Value::Nil, Value::Boolean(false)),
            Ok(Value::Boolean(true))
        );
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError {
            line: 4,
            kind: RuntimeErrorKind::ArityMismatch {
                expected: 2,
                found: 1,
            },
        };
        assert_eq!(
            err.to_string(),
            "[line 4] Runtime error: Expected 2 arguments but got 1."
        );
    }
}
