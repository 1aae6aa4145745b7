//! Compiler from the Jack language to the stack based VM language of the
//! Hack platform.
pub mod compiler;
pub mod error;
pub mod scanner;
pub mod symbols;
pub mod vm;
pub mod xml;

pub use compiler::{compile, compile_with_tree, CompiledClass};
pub use error::{CompileError, LexError, Pos, Result};
