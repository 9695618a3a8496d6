pub mod ast;
pub mod interpreter;
pub mod parser;
pub mod runtime;
pub mod tokenizer;
