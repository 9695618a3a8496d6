use std::{fmt::Display, rc::Rc};

use crate::ast::Literal;

use super::callable::Callable;

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Callable(Rc<Callable>),
    Nil,
}

impl Value {
    /// `nil` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // NaN is treated as equal to itself
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Number(n) => Value::Number(n),
            Literal::String(s) => Value::String(s),
            Literal::Boolean(b) => Value::Boolean(b),
            Literal::Nil => Value::Nil,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Callable(c) => write!(f, "{}", c),
            Value::Nil => write!(f, "nil"),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::interpreter::native;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(7.0).to_string(), "7");
        assert_eq!(Value::Number(-3.0).to_string(), "-3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(0.1 + 0.2).to_string(), "0.30000000000000004");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::String("raw".to_string()).to_string(), "raw");
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Boolean(false).to_string(), "false");
    }

    #[test]
    fn test_equality_never_coerces() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Number(1.0), Value::String("1".to_string()));
        assert_ne!(Value::Nil, Value::Boolean(false));
        assert_ne!(Value::Number(0.0), Value::Boolean(false));
    }

    #[test]
    fn test_callables_compare_by_identity() {
        let clock = Rc::new(Callable::Native(native::CLOCK));
        let same = Value::Callable(clock.clone());
        let other = Value::Callable(Rc::new(Callable::Native(native::CLOCK)));
        assert_eq!(Value::Callable(clock), same);
        assert_ne!(same, other);
    }
}
