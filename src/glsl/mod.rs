//! GLSL ES front end: lexer, parser and preprocessor.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod preprocessor;

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Tokenizes and parses one shader source.
pub fn parse_source(source: &str) -> Result<Vec<ast::Stmt>, ParseError> {
    parser::parse(lexer::tokenize(source)?)
}
