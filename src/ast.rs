use std::{fmt::Display, rc::Rc};

use crate::tokenizer::Token;

#[derive(Debug)]
pub struct Program(pub Vec<Statement>);

#[derive(Debug, Clone)]
pub enum Statement {
    Expression(Expression),
    Print(Expression),
    VarDeclaration {
        name: Token,
        initializer: Option<Expression>,
    },
    Block(Vec<Statement>),
    If {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    Break(Token),
    FunctionDeclaration(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expression>,
    },
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Binary {
        left: Box<Expression>,
        operator: Operator<InfixOperator>,
        right: Box<Expression>,
    },
    Unary {
        operator: Operator<UnaryOperator>,
        right: Box<Expression>,
    },
    Grouping(Box<Expression>),
    Literal(Literal),
    Variable(Token),
    Assign {
        name: Token,
        value: Box<Expression>,
    },
    Logical {
        left: Box<Expression>,
        operator: Operator<LogicalOperator>,
        right: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        paren: Token,
        arguments: Vec<Expression>,
    },
}

/// An operator together with the line it was written on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operator<T> {
    pub kind: T,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InfixOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.0 {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Expression(expr) => write!(f, "{};", expr),
            Statement::Print(expr) => write!(f, "print {};", expr),
            Statement::VarDeclaration { name, initializer } => match initializer {
                Some(expr) => write!(f, "var {} = {};", name.lexeme, expr),
                None => write!(f, "var {};", name.lexeme),
            },
            Statement::Block(statements) => {
                writeln!(f, "{{")?;
                for statement in statements {
                    writeln!(f, "{}", statement)?;
                }
                write!(f, "}}")
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                write!(f, "if ({}) {}", condition, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " else {}", else_branch)?;
                }
                Ok(())
            }
            Statement::While { condition, body } => write!(f, "while ({}) {}", condition, body),
            Statement::Break(_) => write!(f, "break;"),
            Statement::FunctionDeclaration(decl) => write!(f, "{}", decl),
            Statement::Return { value, .. } => match value {
                Some(expr) => write!(f, "return {};", expr),
                None => write!(f, "return;"),
            },
        }
    }
}

impl Display for FunctionDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fun {}(", self.name.lexeme)?;
        for (i, param) in self.params.iter().enumerate() {
            write!(f, "{}", param.lexeme)?;
            if i != self.params.len() - 1 {
                write!(f, ", ")?;
            }
        }
        writeln!(f, ") {{")?;
        for statement in &self.body {
            writeln!(f, "{}", statement)?;
        }
        write!(f, "}}")
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Binary {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", operator.kind, left, right),
            Expression::Unary { operator, right } => write!(f, "({} {})", operator.kind, right),
            Expression::Grouping(expr) => write!(f, "(group {})", expr),
            Expression::Literal(literal) => write!(f, "{}", literal),
            Expression::Variable(name) => write!(f, "{}", name.lexeme),
            Expression::Assign { name, value } => write!(f, "(= {} {})", name.lexeme, value),
            Expression::Logical {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", operator.kind, left, right),
            Expression::Call {
                callee, arguments, ..
            } => {
                write!(f, "(call {}", callee)?;
                for arg in arguments {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Equal => write!(f, "=="),
            InfixOperator::NotEqual => write!(f, "!="),
            InfixOperator::LessThan => write!(f, "<"),
            InfixOperator::LessThanOrEqual => write!(f, "<="),
            InfixOperator::GreaterThan => write!(f, ">"),
            InfixOperator::GreaterThanOrEqual => write!(f, ">="),
            InfixOperator::Plus => write!(f, "+"),
            InfixOperator::Minus => write!(f, "-"),
            InfixOperator::Multiply => write!(f, "*"),
            InfixOperator::Divide => write!(f, "/"),
        }
    }
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "and"),
            LogicalOperator::Or => write!(f, "or"),
        }
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::TokenType;

    fn number(n: f64) -> Box<Expression> {
        Box::new(Expression::Literal(Literal::Number(n)))
    }

    #[test]
    fn test_expression_prefix_form() {
        let expr = Expression::Binary {
            left: number(1.0),
            operator: Operator {
                kind: InfixOperator::Plus,
                line: 1,
            },
            right: Box::new(Expression::Grouping(Box::new(Expression::Binary {
                left: number(2.0),
                operator: Operator {
                    kind: InfixOperator::Multiply,
                    line: 1,
                },
                right: Box::new(Expression::Unary {
                    operator: Operator {
                        kind: UnaryOperator::Negate,
                        line: 1,
                    },
                    right: number(3.5),
                }),
            }))),
        };
        assert_eq!(expr.to_string(), "(+ 1 (group (* 2 (- 3.5))))");
    }

    #[test]
    fn test_call_and_assignment() {
        let name = Token::new(TokenType::Identifier("x".to_string()), "x", 1);
        let callee = Token::new(TokenType::Identifier("f".to_string()), "f", 1);
        let expr = Expression::Assign {
            name,
            value: Box::new(Expression::Call {
                callee: Box::new(Expression::Variable(callee)),
                paren: Token::new(TokenType::RightParen, ")", 1),
                arguments: vec![
                    Expression::Literal(Literal::String("s".to_string())),
                    Expression::Literal(Literal::Nil),
                ],
            }),
        };
        assert_eq!(expr.to_string(), "(= x (call f \"s\" nil))");
    }
}
