//! Translator from Hack VM code to Hack assembly.
//!
//! [`parser`] turns VM source into [`ast::Command`]s, [`codegen::CodeWriter`]
//! lowers them to assembly text, and [`translator::Translator`] drives the two
//! across the modules of one program.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod logger;
pub mod parser;
pub mod translator;

pub use crate::ast::{ArithmeticOp, Command, CommandKind, Segment};
pub use crate::codegen::CodeWriter;
pub use crate::error::{CommandError, Error, Result};
pub use crate::translator::{Options, Translator};
