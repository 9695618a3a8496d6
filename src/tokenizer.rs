use std::fmt::Display;

use crate::ast::Literal;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier(String),
    String(String),
    Number(f64),

    // Keywords
    And,
    Class,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,
    Break,

    // End of file
    Eof,

    // Never produced by a successful scan, unknown characters are reported and dropped
    Unknown,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::LeftBrace => write!(f, "{{"),
            TokenType::RightBrace => write!(f, "}}"),
            TokenType::Comma => write!(f, ","),
            TokenType::Dot => write!(f, "."),
            TokenType::Minus => write!(f, "-"),
            TokenType::Plus => write!(f, "+"),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Slash => write!(f, "/"),
            TokenType::Star => write!(f, "*"),
            TokenType::Bang => write!(f, "!"),
            TokenType::BangEqual => write!(f, "!="),
            TokenType::Equal => write!(f, "="),
            TokenType::EqualEqual => write!(f, "=="),
            TokenType::Greater => write!(f, ">"),
            TokenType::GreaterEqual => write!(f, ">="),
            TokenType::Less => write!(f, "<"),
            TokenType::LessEqual => write!(f, "<="),
            TokenType::Identifier(name) => write!(f, "identifier {name}"),
            TokenType::String(s) => write!(f, "string \"{s}\""),
            TokenType::Number(n) => write!(f, "number {n}"),
            TokenType::And => write!(f, "and"),
            TokenType::Class => write!(f, "class"),
            TokenType::Else => write!(f, "else"),
            TokenType::False => write!(f, "false"),
            TokenType::Fun => write!(f, "fun"),
            TokenType::For => write!(f, "for"),
            TokenType::If => write!(f, "if"),
            TokenType::Nil => write!(f, "nil"),
            TokenType::Or => write!(f, "or"),
            TokenType::Print => write!(f, "print"),
            TokenType::Return => write!(f, "return"),
            TokenType::Super => write!(f, "super"),
            TokenType::This => write!(f, "this"),
            TokenType::True => write!(f, "true"),
            TokenType::Var => write!(f, "var"),
            TokenType::While => write!(f, "while"),
            TokenType::Break => write!(f, "break"),
            TokenType::Eof => write!(f, "end of file"),
            TokenType::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: impl Into<String>, line: usize) -> Self {
        Self {
            token_type,
            lexeme: lexeme.into(),
            line,
        }
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }

    /// The decoded value of a number or string literal.
    pub fn literal(&self) -> Option<Literal> {
        match &self.token_type {
            TokenType::Number(n) => Some(Literal::Number(*n)),
            TokenType::String(s) => Some(Literal::String(s.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[line {line}] Error: {kind}")]
pub struct TokenizeError {
    pub line: usize,
    pub kind: TokenizeErrorKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenizeErrorKind {
    #[error("Unexpected character: '{0}'")]
    UnexpectedCharacter(char),
    #[error("Unterminated string.")]
    UnterminatedString,
}

#[derive(Debug)]
pub struct TokenizeErrors(pub Vec<TokenizeError>);

impl std::error::Error for TokenizeErrors {}

impl std::fmt::Display for TokenizeErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

/// Scans the whole source, collecting every lexical error before failing.
pub fn tokens(source: &str) -> Result<Vec<Token>, TokenizeErrors> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for result in Tokenizer::new(source) {
        match result {
            Ok(token) => tokens.push(token),
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(TokenizeErrors(errors));
    }

    Ok(tokens)
}

pub struct Tokenizer<'a> {
    remaining: &'a str,
    line: usize,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            remaining: source,
            line: 1,
            done: false,
        }
    }

    pub fn token(&mut self) -> Result<Token, TokenizeError> {
        while let Some((_, rest)) = maximal(&[whitespace, comment], self.remaining) {
            self.advance(rest);
        }

        if self.remaining.is_empty() {
            return Ok(Token::new(TokenType::Eof, "", self.line));
        }

        let line = self.line;
        let source = self.remaining;

        let matched = maximal(
            &[
                // Single-character tokens
                left_paren,
                right_paren,
                left_brace,
                right_brace,
                comma,
                dot,
                minus,
                plus,
                semicolon,
                slash,
                star,
                // one or two character tokens
                bang,
                bang_equal,
                equal,
                equal_equal,
                greater,
                greater_equal,
                less,
                less_equal,
                // keywords and literals
                identifier,
                string,
                number,
            ],
            source,
        );

        match matched {
            Some((token_type, rest)) => {
                let lexeme = &source[..source.len() - rest.len()];
                self.advance(rest);
                Ok(Token::new(token_type, lexeme, line))
            }
            None if source.starts_with('"') => {
                self.advance(&source[source.len()..]);
                Err(TokenizeError {
                    line,
                    kind: TokenizeErrorKind::UnterminatedString,
                })
            }
            None => {
                let c = source.chars().next().unwrap_or('\0');
                self.advance(&source[c.len_utf8()..]);
                Err(TokenizeError {
                    line,
                    kind: TokenizeErrorKind::UnexpectedCharacter(c),
                })
            }
        }
    }

    fn advance(&mut self, rest: &'a str) {
        let consumed = &self.remaining[..self.remaining.len() - rest.len()];
        self.line += consumed.matches('\n').count();
        self.remaining = rest;
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.token();
        if matches!(&result, Ok(token) if token.token_type == TokenType::Eof) {
            self.done = true;
        }
        Some(result)
    }
}

fn maximal<'a, T: std::fmt::Debug>(
    parsers: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<((), &str)> {
    let len = source
        .chars()
        .take_while(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
        .count();
    if len > 0 {
        Some(((), &source[len..]))
    } else {
        None
    }
}

fn comment(source: &str) -> Option<((), &str)> {
    if source.starts_with("//") {
        let len = source
            .chars()
            .take_while(|c| *c != '\n')
            .map(char::len_utf8)
            .sum();
        Some(((), &source[len..]))
    } else {
        None
    }
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(TokenType, &str)> {
            if source.starts_with($word) {
                Some(($token, &source[$word.len()..]))
            } else {
                None
            }
        }
    };
}

match_literal! { left_paren, "(", TokenType::LeftParen }
match_literal! { right_paren, ")", TokenType::RightParen }
match_literal! { left_brace, "{", TokenType::LeftBrace }
match_literal! { right_brace, "}", TokenType::RightBrace }
match_literal! { comma, ",", TokenType::Comma }
match_literal! { dot, ".", TokenType::Dot }
match_literal! { minus, "-", TokenType::Minus }
match_literal! { plus, "+", TokenType::Plus }
match_literal! { semicolon, ";", TokenType::Semicolon }
match_literal! { slash, "/", TokenType::Slash }
match_literal! { star, "*", TokenType::Star }
match_literal! { bang, "!", TokenType::Bang }
match_literal! { equal, "=", TokenType::Equal }
match_literal! { greater, ">", TokenType::Greater }
match_literal! { less, "<", TokenType::Less }
match_literal! { bang_equal, "!=", TokenType::BangEqual }
match_literal! { equal_equal, "==", TokenType::EqualEqual }
match_literal! { greater_equal, ">=", TokenType::GreaterEqual }
match_literal! { less_equal, "<=", TokenType::LessEqual }

fn keyword(word: &str) -> Option<TokenType> {
    let token_type = match word {
        "and" => TokenType::And,
        "class" => TokenType::Class,
        "else" => TokenType::Else,
        "false" => TokenType::False,
        "for" => TokenType::For,
        "fun" => TokenType::Fun,
        "if" => TokenType::If,
        "nil" => TokenType::Nil,
        "or" => TokenType::Or,
        "print" => TokenType::Print,
        "return" => TokenType::Return,
        "super" => TokenType::Super,
        "this" => TokenType::This,
        "true" => TokenType::True,
        "var" => TokenType::Var,
        "while" => TokenType::While,
        "break" => TokenType::Break,
        _ => return None,
    };
    Some(token_type)
}

fn identifier(source: &str) -> Option<(TokenType, &str)> {
    let first = source.chars().next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }

    let len = source
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();

    let word = &source[..len];
    let token_type = keyword(word).unwrap_or_else(|| TokenType::Identifier(word.to_string()));
    Some((token_type, &source[len..]))
}

fn string(source: &str) -> Option<(TokenType, &str)> {
    let contents = source.strip_prefix('"')?;
    let end = contents.find('"')?;
    Some((
        TokenType::String(contents[..end].to_string()),
        &contents[end + 1..],
    ))
}

fn number(source: &str) -> Option<(TokenType, &str)> {
    let digits = |s: &str| s.chars().take_while(char::is_ascii_digit).count();

    let mut len = digits(source);
    if len == 0 {
        return None;
    }

    if let Some(fraction) = source[len..].strip_prefix('.') {
        let fraction_len = digits(fraction);
        if fraction_len > 0 {
            len += 1 + fraction_len;
        }
    }

    let value = source[..len].parse().ok()?;
    Some((TokenType::Number(value), &source[len..]))
}
