use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use tracing::debug;

use crate::{
    ast::{
        Expression, FunctionDecl, InfixOperator, Literal, LogicalOperator, Operator, Program,
        Statement, UnaryOperator,
    },
    tokenizer::{Token, TokenType},
};

const MAX_ARGUMENTS: usize = 255;

#[derive(Debug)]
pub struct ParseErrors(pub Vec<ParseError>);

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub token: Option<Token>,
    rules: Vec<&'static str>,
    // Length of the token slice at the failure point, used to resume after recovery
    remaining: usize,
}

impl ParseError {
    /// True when the error was found at the end of the input.
    pub fn at_end(&self) -> bool {
        self.token
            .as_ref()
            .map_or(true, |token| token.token_type == TokenType::Eof)
    }

    /// The grammar rules that were being parsed when the error was found, outermost first.
    pub fn rules(&self) -> String {
        self.rules.join(" > ")
    }
}

impl std::error::Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.token {
            Some(token) if token.token_type != TokenType::Eof => write!(
                f,
                "[line {}] Error at '{}': {}",
                token.line, token.lexeme, self.kind
            ),
            Some(token) => write!(f, "[line {}] Error at end: {}", token.line, self.kind),
            None => write!(f, "Error at end: {}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("Expect {0}.")]
    Expected(&'static str),
    #[error("Expect expression.")]
    ExpectedExpression,
    #[error("Invalid assignment target.")]
    InvalidAssignmentTarget,
    #[error("Can't have more than 255 arguments.")]
    TooManyArguments,
    #[error("Can't have more than 255 parameters.")]
    TooManyParameters,
    #[error("Can't use 'break' outside of a loop.")]
    BreakOutsideLoop,
    #[error("Can't return from top-level code.")]
    ReturnOutsideFunction,
}

#[derive(Debug)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
    loop_depth: Cell<usize>,
    function_depth: Cell<usize>,
    errors: RefCell<Vec<ParseError>>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
            loop_depth: Cell::new(0),
            function_depth: Cell::new(0),
            errors: RefCell::new(Vec::new()),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard<'_> {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self, GuardKind::Rule)
    }

    fn enter_loop(&self) -> ParseContextGuard<'_> {
        self.loop_depth.set(self.loop_depth.get() + 1);
        ParseContextGuard::new(self, GuardKind::Loop)
    }

    /// Function bodies start outside of any loop.
    fn enter_function(&self) -> ParseContextGuard<'_> {
        let loop_depth = self.loop_depth.replace(0);
        self.function_depth.set(self.function_depth.get() + 1);
        ParseContextGuard::new(self, GuardKind::Function { loop_depth })
    }

    fn in_loop(&self) -> bool {
        self.loop_depth.get() > 0
    }

    fn in_function(&self) -> bool {
        self.function_depth.get() > 0
    }

    fn error(&self, kind: ParseErrorKind, tokens: &[Token]) -> ParseError {
        ParseError {
            kind,
            token: tokens.first().cloned(),
            rules: self.stack.borrow().clone(),
            remaining: tokens.len(),
        }
    }
}

enum GuardKind {
    Rule,
    Loop,
    Function { loop_depth: usize },
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
    kind: GuardKind,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext, kind: GuardKind) -> Self {
        Self { context, kind }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        match self.kind {
            GuardKind::Rule => {
                self.context.stack.borrow_mut().pop();
            }
            GuardKind::Loop => {
                self.context.loop_depth.set(self.context.loop_depth.get() - 1);
            }
            GuardKind::Function { loop_depth } => {
                self.context.loop_depth.set(loop_depth);
                self.context
                    .function_depth
                    .set(self.context.function_depth.get() - 1);
            }
        }
    }
}

type ParseResult<'a, T> = Result<(T, &'a [Token]), ParseError>;

pub fn program(tokens: &[Token]) -> Result<Program, ParseErrors> {
    let context = ParseContext::new();
    let mut tokens = tokens;
    let mut statements = Vec::new();

    let _guard = context.push("program");

    while !is_at_end(tokens) {
        match declaration(&context, tokens) {
            Ok((stmt, rest)) => {
                statements.push(stmt);
                tokens = rest;
            }
            Err(err) => tokens = synchronize(recover(&context, tokens, err)),
        }
    }

    let errors = context.errors.take();
    if !errors.is_empty() {
        return Err(ParseErrors(errors));
    }

    debug!(statements = statements.len(), "parsed program");
    Ok(Program(statements))
}

fn peek(tokens: &[Token]) -> Option<&TokenType> {
    tokens.first().map(Token::token_type)
}

fn is_at_end(tokens: &[Token]) -> bool {
    matches!(peek(tokens), None | Some(TokenType::Eof))
}

/// Records `err` and returns the tokens starting at the one it was found at.
fn recover<'a>(context: &ParseContext, tokens: &'a [Token], err: ParseError) -> &'a [Token] {
    debug!(rules = %err.rules(), "recovering from parse error: {err}");
    let from = &tokens[tokens.len().saturating_sub(err.remaining)..];
    context.errors.borrow_mut().push(err);
    from
}

/// Skips the offending token, then everything up to the next statement boundary.
fn synchronize(tokens: &[Token]) -> &[Token] {
    let Some((first, mut rest)) = tokens.split_first() else {
        return tokens;
    };
    if first.token_type == TokenType::Eof {
        return tokens;
    }

    let mut previous = first;
    while let Some((token, tail)) = rest.split_first() {
        if previous.token_type == TokenType::Semicolon {
            return rest;
        }

        match token.token_type {
            TokenType::Class
            | TokenType::Fun
            | TokenType::Var
            | TokenType::For
            | TokenType::If
            | TokenType::While
            | TokenType::Print
            | TokenType::Return
            | TokenType::RightBrace
            | TokenType::Eof => return rest,
            _ => {}
        }

        previous = token;
        rest = tail;
    }
    rest
}

fn declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("declaration");
    match peek(tokens) {
        Some(TokenType::Var) => var_declaration(context, &tokens[1..]),
        Some(TokenType::Fun) => function(context, &tokens[1..]),
        _ => statement(context, tokens),
    }
}

fn var_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("var_declaration");
    let (name, tokens) = match_identifier(context, tokens, "variable name")?;
    let (initializer, tokens) = match peek(tokens) {
        Some(TokenType::Equal) => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            (Some(expr), rest)
        }
        _ => (None, tokens),
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        "';' after variable declaration",
    )?;
    Ok((Statement::VarDeclaration { name, initializer }, tokens))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("statement");
    match peek(tokens) {
        Some(TokenType::Print) => print_statement(context, &tokens[1..]),
        Some(TokenType::LeftBrace) => {
            let (statements, rest) = block(context, &tokens[1..])?;
            Ok((Statement::Block(statements), rest))
        }
        Some(TokenType::If) => if_statement(context, &tokens[1..]),
        Some(TokenType::While) => while_statement(context, &tokens[1..]),
        Some(TokenType::For) => for_statement(context, &tokens[1..]),
        Some(TokenType::Break) => break_statement(context, tokens),
        Some(TokenType::Return) => return_statement(context, tokens),
        _ => expression_statement(context, tokens),
    }
}

fn function<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("function");
    let (name, tokens) = match_identifier(context, tokens, "function name")?;
    let mut tokens = consume(
        context,
        tokens,
        TokenType::LeftParen,
        "'(' after function name",
    )?;

    let mut params = Vec::new();
    if peek(tokens) != Some(&TokenType::RightParen) {
        loop {
            if params.len() >= MAX_ARGUMENTS {
                return Err(context.error(ParseErrorKind::TooManyParameters, tokens));
            }

            let (param, rest) = match_identifier(context, tokens, "parameter name")?;
            params.push(param);
            tokens = rest;

            match peek(tokens) {
                Some(TokenType::Comma) => tokens = &tokens[1..],
                _ => break,
            }
        }
    }

    let tokens = consume(
        context,
        tokens,
        TokenType::RightParen,
        "')' after parameters",
    )?;
    let tokens = consume(
        context,
        tokens,
        TokenType::LeftBrace,
        "'{' before function body",
    )?;

    let _function = context.enter_function();
    let (body, tokens) = block(context, tokens)?;

    Ok((
        Statement::FunctionDeclaration(Rc::new(FunctionDecl { name, params, body })),
        tokens,
    ))
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("while_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen, "'(' after 'while'")?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen, "')' after condition")?;

    let _loop = context.enter_loop();
    let (body, tokens) = statement(context, tokens)?;
    Ok((
        Statement::While {
            condition,
            body: Box::new(body),
        },
        tokens,
    ))
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("if_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen, "'(' after 'if'")?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(
        context,
        tokens,
        TokenType::RightParen,
        "')' after if condition",
    )?;
    let (then_branch, tokens) = statement(context, tokens)?;

    let (else_branch, tokens) = match peek(tokens) {
        Some(TokenType::Else) => {
            let (else_branch, rest) = statement(context, &tokens[1..])?;
            (Some(Box::new(else_branch)), rest)
        }
        _ => (None, tokens),
    };

    Ok((
        Statement::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch,
        },
        tokens,
    ))
}

/// Lowers `for (init; cond; incr) body` into
/// `{ init; while (cond) { body; incr; } }`.
fn for_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("for_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen, "'(' after 'for'")?;

    let (initializer, tokens) = match peek(tokens) {
        Some(TokenType::Semicolon) => (None, &tokens[1..]),
        Some(TokenType::Var) => {
            let (init, rest) = var_declaration(context, &tokens[1..])?;
            (Some(init), rest)
        }
        _ => {
            let (init, rest) = expression_statement(context, tokens)?;
            (Some(init), rest)
        }
    };

    let (condition, tokens) = match peek(tokens) {
        Some(TokenType::Semicolon) => (Expression::Literal(Literal::Boolean(true)), tokens),
        _ => expression(context, tokens)?,
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        "';' after loop condition",
    )?;

    let (increment, tokens) = match peek(tokens) {
        Some(TokenType::RightParen) => (None, tokens),
        _ => {
            let (incr, rest) = expression(context, tokens)?;
            (Some(incr), rest)
        }
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::RightParen,
        "')' after for clauses",
    )?;

    let _loop = context.enter_loop();
    let (body, tokens) = statement(context, tokens)?;

    let mut loop_body = vec![body];
    if let Some(increment) = increment {
        loop_body.push(Statement::Expression(increment));
    }

    let mut statements = Vec::with_capacity(2);
    statements.extend(initializer);
    statements.push(Statement::While {
        condition,
        body: Box::new(Statement::Block(loop_body)),
    });

    Ok((Statement::Block(statements), tokens))
}

fn break_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("break_statement");
    if !context.in_loop() {
        return Err(context.error(ParseErrorKind::BreakOutsideLoop, tokens));
    }

    let keyword = tokens[0].clone();
    let tokens = consume(context, &tokens[1..], TokenType::Semicolon, "';' after 'break'")?;
    Ok((Statement::Break(keyword), tokens))
}

fn return_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("return_statement");
    if !context.in_function() {
        return Err(context.error(ParseErrorKind::ReturnOutsideFunction, tokens));
    }

    let keyword = tokens[0].clone();
    let tokens = &tokens[1..];
    let (value, tokens) = match peek(tokens) {
        Some(TokenType::Semicolon) => (None, tokens),
        _ => {
            let (value, rest) = expression(context, tokens)?;
            (Some(value), rest)
        }
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        "';' after return value",
    )?;
    Ok((Statement::Return { keyword, value }, tokens))
}

/// Parses declarations up to and including the closing `}`. A bad declaration is recorded
/// and skipped so the rest of the block still parses as part of it.
fn block<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Statement>> {
    let _guard = context.push("block");
    let mut statements = Vec::new();
    let mut tokens = tokens;

    loop {
        match peek(tokens) {
            Some(TokenType::RightBrace) => return Ok((statements, &tokens[1..])),
            None | Some(TokenType::Eof) => {
                return Err(context.error(ParseErrorKind::Expected("'}' after block"), tokens))
            }
            _ => match declaration(context, tokens) {
                Ok((stmt, rest)) => {
                    statements.push(stmt);
                    tokens = rest;
                }
                Err(err) if err.at_end() => return Err(err),
                Err(err) => {
                    let from = recover(context, tokens, err);
                    tokens = match peek(from) {
                        Some(TokenType::RightBrace) => from,
                        _ => synchronize(from),
                    };
                }
            },
        }
    }
}

fn expression_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> ParseResult<'a, Statement> {
    let _guard = context.push("expression_statement");
    let (expr, tokens) = expression(context, tokens)?;
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        "';' after expression",
    )?;
    Ok((Statement::Expression(expr), tokens))
}

fn print_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("print_statement");
    let (expr, rest) = expression(context, tokens)?;
    let tokens = consume(context, rest, TokenType::Semicolon, "';' after value")?;
    Ok((Statement::Print(expr), tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("expression");
    assignment(context, tokens)
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("assignment");
    let (expr, rest) = logical_or(context, tokens)?;

    match peek(rest) {
        Some(TokenType::Equal) => {
            let (value, after) = assignment(context, &rest[1..])?;
            match expr {
                Expression::Variable(name) => Ok((
                    Expression::Assign {
                        name,
                        value: Box::new(value),
                    },
                    after,
                )),
                _ => Err(context.error(ParseErrorKind::InvalidAssignmentTarget, rest)),
            }
        }
        _ => Ok((expr, rest)),
    }
}

fn binary<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    operator: impl Fn(&TokenType) -> Option<InfixOperator>,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        let Some(kind) = operator(token.token_type()) else {
            break;
        };
        let (right, rest) = precedence(context, &tokens[1..])?;
        expr = Expression::Binary {
            left: Box::new(expr),
            operator: Operator {
                kind,
                line: token.line,
            },
            right: Box::new(right),
        };
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn logical<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    token_type: TokenType,
    kind: LogicalOperator,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        if token.token_type != token_type {
            break;
        }
        let (right, rest) = precedence(context, &tokens[1..])?;
        expr = Expression::Logical {
            left: Box::new(expr),
            operator: Operator {
                kind,
                line: token.line,
            },
            right: Box::new(right),
        };
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn logical_or<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_or");
    logical(
        context,
        logical_and,
        TokenType::Or,
        LogicalOperator::Or,
        tokens,
    )
}

fn logical_and<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_and");
    logical(context, equality, TokenType::And, LogicalOperator::And, tokens)
}

fn equality<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("equality");
    binary(
        context,
        comparison,
        |token_type| match token_type {
            TokenType::EqualEqual => Some(InfixOperator::Equal),
            TokenType::BangEqual => Some(InfixOperator::NotEqual),
            _ => None,
        },
        tokens,
    )
}

fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("comparison");
    binary(
        context,
        term,
        |token_type| match token_type {
            TokenType::Less => Some(InfixOperator::LessThan),
            TokenType::LessEqual => Some(InfixOperator::LessThanOrEqual),
            TokenType::Greater => Some(InfixOperator::GreaterThan),
            TokenType::GreaterEqual => Some(InfixOperator::GreaterThanOrEqual),
            _ => None,
        },
        tokens,
    )
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |token_type| match token_type {
            TokenType::Plus => Some(InfixOperator::Plus),
            TokenType::Minus => Some(InfixOperator::Minus),
            _ => None,
        },
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("factor");
    binary(
        context,
        unary,
        |token_type| match token_type {
            TokenType::Star => Some(InfixOperator::Multiply),
            TokenType::Slash => Some(InfixOperator::Divide),
            _ => None,
        },
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("unary");

    let kind = match peek(tokens) {
        Some(TokenType::Minus) => UnaryOperator::Negate,
        Some(TokenType::Bang) => UnaryOperator::Not,
        _ => return call(context, tokens),
    };
    let line = tokens[0].line;

    let (right, rest) = unary(context, &tokens[1..])?;
    Ok((
        Expression::Unary {
            operator: Operator { kind, line },
            right: Box::new(right),
        },
        rest,
    ))
}

fn call<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("call");
    let (mut expr, mut tokens) = primary(context, tokens)?;

    while let Some(TokenType::LeftParen) = peek(tokens) {
        let (call, rest) = finish_call(context, expr, &tokens[1..])?;
        expr = call;
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn finish_call<'a>(
    context: &ParseContext,
    callee: Expression,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let mut tokens = tokens;
    let mut arguments = Vec::new();

    if peek(tokens) != Some(&TokenType::RightParen) {
        loop {
            if arguments.len() >= MAX_ARGUMENTS {
                return Err(context.error(ParseErrorKind::TooManyArguments, tokens));
            }

            let (arg, rest) = expression(context, tokens)?;
            arguments.push(arg);
            tokens = rest;

            match peek(tokens) {
                Some(TokenType::Comma) => tokens = &tokens[1..],
                _ => break,
            }
        }
    }

    let rest = consume(
        context,
        tokens,
        TokenType::RightParen,
        "')' after arguments",
    )?;
    let paren = tokens[0].clone();

    Ok((
        Expression::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        },
        rest,
    ))
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseErrorKind::ExpectedExpression, tokens));
    };

    match token.token_type() {
        TokenType::Number(n) => Ok((Expression::Literal(Literal::Number(*n)), &tokens[1..])),
        TokenType::String(s) => Ok((
            Expression::Literal(Literal::String(s.clone())),
            &tokens[1..],
        )),
        TokenType::True => Ok((Expression::Literal(Literal::Boolean(true)), &tokens[1..])),
        TokenType::False => Ok((Expression::Literal(Literal::Boolean(false)), &tokens[1..])),
        TokenType::Nil => Ok((Expression::Literal(Literal::Nil), &tokens[1..])),
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(
                context,
                rest,
                TokenType::RightParen,
                "')' after expression",
            )?;
            Ok((Expression::Grouping(Box::new(expr)), tokens))
        }
        TokenType::Identifier(_) => Ok((Expression::Variable(token.clone()), &tokens[1..])),
        _ => Err(context.error(ParseErrorKind::ExpectedExpression, tokens)),
    }
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
    expectation: &'static str,
) -> Result<&'a [Token], ParseError> {
    match peek(tokens) {
        Some(t) if t == &token_type => Ok(&tokens[1..]),
        _ => Err(context.error(ParseErrorKind::Expected(expectation), tokens)),
    }
}

fn match_identifier<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    expectation: &'static str,
) -> ParseResult<'a, Token> {
    match tokens.first() {
        Some(token @ Token {
            token_type: TokenType::Identifier(_),
            ..
        }) => Ok((token.clone(), &tokens[1..])),
        _ => Err(context.error(ParseErrorKind::Expected(expectation), tokens)),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> Result<Program, ParseErrors> {
        program(&tokens(source).expect("source should tokenize"))
    }

    fn parse_errors(source: &str) -> Vec<ParseErrorKind> {
        parse(source)
            .expect_err("source should not parse")
            .0
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_precedence() {
        let program = parse("1 + 2 * 3 - -4 / 2;").unwrap();
        assert_eq!(program.to_string(), "(- (+ 1 (* 2 3)) (/ (- 4) 2));\n");
    }

    #[test]
    fn test_comparison_equality_and_logic() {
        let program = parse("a or b and 1 < 2 == !c;").unwrap();
        assert_eq!(program.to_string(), "(or a (and b (== (< 1 2) (! c))));\n");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse("a = b = (1);").unwrap();
        assert_eq!(program.to_string(), "(= a (= b (group 1)));\n");
    }

    #[test]
    fn test_chained_calls() {
        let program = parse("f(1, g(2))(3);").unwrap();
        assert_eq!(program.to_string(), "(call (call f 1 (call g 2)) 3);\n");
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert_eq!(
            parse_errors("1 = 2;"),
            vec![ParseErrorKind::InvalidAssignmentTarget]
        );
        assert_eq!(
            parse_errors("a + b = c;"),
            vec![ParseErrorKind::InvalidAssignmentTarget]
        );
    }

    #[test]
    fn test_var_without_initializer() {
        let program = parse("var a;").unwrap();
        assert!(matches!(
            program.0.as_slice(),
            [Statement::VarDeclaration {
                initializer: None,
                ..
            }]
        ));
    }

    #[test]
    fn test_for_desugars_into_while() {
        let program = parse("for (var i = 0; i < 3; i = i + 1) print i;").unwrap();
        let [Statement::Block(outer)] = program.0.as_slice() else {
            panic!("for loop should lower into a block, got {program}");
        };
        let [Statement::VarDeclaration { .. }, Statement::While { condition, body }] =
            outer.as_slice()
        else {
            panic!("unexpected lowering {outer:?}");
        };
        assert_eq!(condition.to_string(), "(< i 3)");
        let Statement::Block(body) = body.as_ref() else {
            panic!("loop body should be a block");
        };
        assert!(matches!(body[0], Statement::Print(_)));
        assert_eq!(body[1].to_string(), "(= i (+ i 1));");
    }

    #[test]
    fn test_for_without_clauses() {
        let program = parse("for (;;) { break; }").unwrap();
        let [Statement::Block(outer)] = program.0.as_slice() else {
            panic!("for loop should lower into a block");
        };
        let [Statement::While { condition, body }] = outer.as_slice() else {
            panic!("missing initializer should not be emitted");
        };
        assert!(matches!(
            condition,
            Expression::Literal(Literal::Boolean(true))
        ));
        let Statement::Block(body) = body.as_ref() else {
            panic!("loop body should be a block");
        };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_dangling_else_binds_to_nearest_if() {
        let program = parse("if (a) if (b) print 1; else print 2;").unwrap();
        let [Statement::If {
            then_branch,
            else_branch: None,
            ..
        }] = program.0.as_slice()
        else {
            panic!("outer if should not own the else branch");
        };
        assert!(matches!(
            then_branch.as_ref(),
            Statement::If {
                else_branch: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_break_outside_loop() {
        assert_eq!(
            parse_errors("break;"),
            vec![ParseErrorKind::BreakOutsideLoop]
        );
        assert_eq!(
            parse_errors("while (true) { fun f() { break; } }"),
            vec![ParseErrorKind::BreakOutsideLoop]
        );
        assert!(parse("while (true) { if (x) break; }").is_ok());
    }

    #[test]
    fn test_break_after_loop_is_rejected() {
        assert_eq!(
            parse_errors("while (false) print 1; break;"),
            vec![ParseErrorKind::BreakOutsideLoop]
        );
    }

    #[test]
    fn test_return_outside_function() {
        assert_eq!(
            parse_errors("return 1;"),
            vec![ParseErrorKind::ReturnOutsideFunction]
        );
        assert!(parse("fun f() { if (true) return; return 1; }").is_ok());
    }

    #[test]
    fn test_recovery_reports_every_bad_declaration() {
        let errors = parse("var = 1;\nprint 1;\nvar x = ;\nprint 2;")
            .unwrap_err()
            .0;
        let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "[line 1] Error at '=': Expect variable name.",
                "[line 3] Error at ';': Expect expression.",
            ]
        );
        assert_eq!(errors[1].rules(), "program > declaration > var_declaration > expression > assignment > logical_or > logical_and > equality > comparison > term > factor > unary > call > primary");
    }

    #[test]
    fn test_error_inside_function_body_is_reported_once() {
        let errors = parse("fun f() {\n  print 1\n  print 2;\n}\nprint 3;")
            .unwrap_err()
            .0;
        let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["[line 3] Error at 'print': Expect ';' after value."]
        );
    }

    #[test]
    fn test_recovery_stays_inside_block() {
        assert_eq!(
            parse_errors("fun f() { var = 1; return 2; }"),
            vec![ParseErrorKind::Expected("variable name")]
        );
        assert_eq!(
            parse_errors("{ print 1 }"),
            vec![ParseErrorKind::Expected("';' after value")]
        );
        assert_eq!(
            parse_errors("while (true) { { 1 = 2; } break; }"),
            vec![ParseErrorKind::InvalidAssignmentTarget]
        );
    }

    #[test]
    fn test_errors_keep_source_order() {
        let errors = parse("{ var = 1; }\nprint ;\n{ print 2 }")
            .unwrap_err()
            .0;
        let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "[line 1] Error at '=': Expect variable name.",
                "[line 2] Error at ';': Expect expression.",
                "[line 3] Error at '}': Expect ';' after value.",
            ]
        );
    }

    #[test]
    fn test_unclosed_nested_block_is_reported_once() {
        assert_eq!(
            parse_errors("{ { print 1;"),
            vec![ParseErrorKind::Expected("'}' after block")]
        );
    }

    #[test]
    fn test_error_at_end() {
        let errors = parse("print 1").unwrap_err().0;
        assert_eq!(
            errors[0].to_string(),
            "[line 1] Error at end: Expect ';' after value."
        );
    }

    #[test]
    fn test_unclosed_block() {
        assert_eq!(
            parse_errors("{ print 1;"),
            vec![ParseErrorKind::Expected("'}' after block")]
        );
    }

    #[test]
    fn test_argument_limit() {
        let args = vec!["1"; 256].join(", ");
        assert_eq!(
            parse_errors(&format!("f({args});")),
            vec![ParseErrorKind::TooManyArguments]
        );

        let args = vec!["1"; 255].join(", ");
        assert!(parse(&format!("f({args});")).is_ok());
    }

    #[test]
    fn test_parameter_limit() {
        let params = (0..256)
            .map(|i| format!("p{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        assert_eq!(
            parse_errors(&format!("fun f({params}) {{}}")),
            vec![ParseErrorKind::TooManyParameters]
        );
    }
}
