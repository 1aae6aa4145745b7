//! Errors raised while compiling a single class.
use std::fmt::{self, Display, Formatter};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Line and column of a character in the source, both starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub ln: usize,
    pub col: usize,
}

impl Pos {
    pub const START: Pos = Pos { ln: 1, col: 1 };
}

impl Display for Pos {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ln, self.col)
    }
}

/// Scanner failures. None of them can be recovered from.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("{0}: illegal null byte")]
    NullByte(Pos),
    #[error("{0}: illegal UTF-8 encoding")]
    InvalidUtf8(Pos),
    #[error("{0}: unexpected char {1:?}")]
    UnexpectedChar(Pos, char),
    #[error("{0}: integer constant {1} out of range")]
    IntegerOverflow(Pos, String),
    #[error("{0}: char {1:?} in string constant out of range")]
    CharOutOfRange(Pos, char),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{pos}: unexpected token {found}, expected {expected}")]
    UnexpectedToken {
        pos: Pos,
        found: String,
        expected: &'static str,
    },
    #[error("{pos}: {name} is already defined in this scope")]
    Redefined { pos: Pos, name: String },
    #[error("{pos}: undefined variable {name}")]
    UndefinedVariable { pos: Pos, name: String },
    #[error("{pos}: {name} has type {ty} and is not an object")]
    NotAnObject { pos: Pos, name: String, ty: String },
    #[error("{pos}: too deeply nested")]
    TooDeep { pos: Pos },
}

impl CompileError {
    pub fn pos(&self) -> Pos {
        match self {
            CompileError::Lex(err) => match err {
                LexError::NullByte(pos)
                | LexError::InvalidUtf8(pos)
                | LexError::UnexpectedChar(pos, _)
                | LexError::IntegerOverflow(pos, _)
                | LexError::CharOutOfRange(pos, _) => *pos,
            },
            CompileError::UnexpectedToken { pos, .. }
            | CompileError::Redefined { pos, .. }
            | CompileError::UndefinedVariable { pos, .. }
            | CompileError::NotAnObject { pos, .. }
            | CompileError::TooDeep { pos } => *pos,
        }
    }
}
