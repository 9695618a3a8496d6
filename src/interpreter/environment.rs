use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use crate::tokenizer::Token;

use super::{RuntimeError, RuntimeErrorKind, Value};

/// A lexical scope. Scopes are shared between blocks, calls and the closures
/// created inside them, so they live behind `Rc<RefCell<_>>`.
#[derive(Default)]
pub struct Environment {
    values: FxHashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn boxed(enclosing: Option<Rc<RefCell<Environment>>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(enclosing)))
    }

    pub fn new(enclosing: Option<Rc<RefCell<Environment>>>) -> Self {
        Self {
            values: FxHashMap::default(),
            enclosing,
        }
    }

    /// Binds `name` in this scope, replacing any previous binding here.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(undefined(name))
        }
    }

    /// Updates the nearest enclosing binding of `name`.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(undefined(name))
        }
    }
}

fn undefined(name: &Token) -> RuntimeError {
    RuntimeError {
        line: name.line,
        kind: RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut values = self
            .values
            .iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect::<Vec<_>>();
        values.sort();

        f.debug_struct(format!("Environment<{:?}>", self as *const Self).as_str())
            .field("values", &values)
            .field("enclosing", &self.enclosing.as_ref().map(|e| e.borrow()))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::TokenType;

    fn name(name: &str) -> Token {
        Token::new(TokenType::Identifier(name.to_string()), name, 3)
    }

    #[test]
    fn test_define_and_get() {
        let mut env = Environment::new(None);
        env.define("foo", Value::String("bar".to_string()));
        assert_eq!(env.get(&name("foo")), Ok(Value::String("bar".to_string())));
    }

    #[test]
    fn test_define_overwrites_in_same_scope() {
        let mut env = Environment::new(None);
        env.define("foo", Value::Number(1.0));
        env.define("foo", Value::Nil);
        assert_eq!(env.get(&name("foo")), Ok(Value::Nil));
    }

    #[test]
    fn test_get_undefined() {
        let env = Environment::new(None);
        assert_eq!(
            env.get(&name("bar")),
            Err(RuntimeError {
                line: 3,
                kind: RuntimeErrorKind::UndefinedVariable("bar".to_string()),
            })
        );
    }

    #[test]
    fn test_get_walks_enclosing_scopes() {
        let global = Environment::boxed(None);
        global.borrow_mut().define("foo", Value::Number(1.0));
        let middle = Environment::boxed(Some(global));
        let inner = Environment::new(Some(middle));
        assert_eq!(inner.get(&name("foo")), Ok(Value::Number(1.0)));
    }

    #[test]
    fn test_shadowing_leaves_outer_binding() {
        let global = Environment::boxed(None);
        global.borrow_mut().define("foo", Value::Number(1.0));
        let mut inner = Environment::new(Some(global.clone()));
        inner.define("foo", Value::Number(2.0));

        assert_eq!(inner.get(&name("foo")), Ok(Value::Number(2.0)));
        assert_eq!(global.borrow().get(&name("foo")), Ok(Value::Number(1.0)));
    }

    #[test]
    fn test_assign_updates_nearest_binding() {
        let global = Environment::boxed(None);
        global.borrow_mut().define("foo", Value::Number(1.0));
        let mut inner = Environment::new(Some(global.clone()));

        inner.assign(&name("foo"), Value::Number(5.0)).unwrap();

        assert_eq!(global.borrow().get(&name("foo")), Ok(Value::Number(5.0)));
        assert!(inner.values.is_empty());
    }

    #[test]
    fn test_assign_undefined() {
        let mut env = Environment::new(Some(Environment::boxed(None)));
        assert_eq!(
            env.assign(&name("missing"), Value::Nil),
            Err(RuntimeError {
                line: 3,
                kind: RuntimeErrorKind::UndefinedVariable("missing".to_string()),
            })
        );
    }
}
