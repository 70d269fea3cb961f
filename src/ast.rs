use std::fmt;

use crate::error::CommandError;

/// Largest value an A-instruction can load.
pub const MAX_ADDRESS: u16 = 0x7fff;

/// Largest local or argument count whose frame arithmetic still fits in an
/// A-instruction.
pub const MAX_COUNT: u16 = MAX_ADDRESS - 5;

/// Prefix of every label the translator generates. Source symbols may not
/// start with it.
pub const RESERVED_PREFIX: &str = "__";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Segment {
    Constant,
    Local,
    Static,
    Argument,
    This,
    That,
    Pointer,
    Temp,
}

impl Segment {
    pub fn name(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::Argument => "argument",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
        }
    }

    /// Number of addressable slots when the segment is a fixed register window.
    pub fn window(self) -> Option<u16> {
        match self {
            Segment::Pointer => Some(2),
            Segment::Temp => Some(8),
            _ => None,
        }
    }

    /// Checks that `index` names a slot this segment can address.
    pub fn check_index(self, index: u16) -> Result<(), CommandError> {
        let in_range = match self.window() {
            Some(len) => index < len,
            None => index <= MAX_ADDRESS,
        };
        if in_range {
            Ok(())
        } else {
            Err(CommandError::IndexOutOfRange {
                segment: self.name(),
                index,
            })
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl ArithmeticOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Neg => "neg",
            ArithmeticOp::Eq => "eq",
            ArithmeticOp::Gt => "gt",
            ArithmeticOp::Lt => "lt",
            ArithmeticOp::And => "and",
            ArithmeticOp::Or => "or",
            ArithmeticOp::Not => "not",
        }
    }

    pub fn from_mnemonic(word: &str) -> Option<ArithmeticOp> {
        use ArithmeticOp::*;
        [Add, Sub, Neg, Eq, Gt, Lt, And, Or, Not]
            .into_iter()
            .find(|op| op.mnemonic() == word)
    }

    /// Net change in stack depth after the operation runs.
    pub fn stack_effect(self) -> i8 {
        match self {
            ArithmeticOp::Neg | ArithmeticOp::Not => 0,
            _ => -1,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CommandKind {
    Arithmetic,
    Push,
    Pop,
    Label,
    Goto,
    IfGoto,
    Function,
    Call,
    Return,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    // Stack Basics
    Arithmetic(ArithmeticOp),
    Push(Segment, u16),
    Pop(Segment, u16),

    // Control
    Label(String),
    Goto(String),
    IfGoto(String),

    // Functions
    Function(String, u16),
    Call(String, u16),
    Return,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Arithmetic(_) => CommandKind::Arithmetic,
            Command::Push(..) => CommandKind::Push,
            Command::Pop(..) => CommandKind::Pop,
            Command::Label(_) => CommandKind::Label,
            Command::Goto(_) => CommandKind::Goto,
            Command::IfGoto(_) => CommandKind::IfGoto,
            Command::Function(..) => CommandKind::Function,
            Command::Call(..) => CommandKind::Call,
            Command::Return => CommandKind::Return,
        }
    }

    /// Operator mnemonic, segment name, or label/function name.
    pub fn arg1(&self) -> Option<&str> {
        match self {
            Command::Arithmetic(op) => Some(op.mnemonic()),
            Command::Push(seg, _) | Command::Pop(seg, _) => Some(seg.name()),
            Command::Label(sym)
            | Command::Goto(sym)
            | Command::IfGoto(sym)
            | Command::Function(sym, _)
            | Command::Call(sym, _) => Some(sym),
            Command::Return => None,
        }
    }

    /// Segment index, local count or argument count.
    pub fn arg2(&self) -> Option<u16> {
        match self {
            Command::Push(_, n)
            | Command::Pop(_, n)
            | Command::Function(_, n)
            | Command::Call(_, n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Arithmetic(op) => f.write_str(op.mnemonic()),
            Command::Push(seg, idx) => write!(f, "push {} {}", seg, idx),
            Command::Pop(seg, idx) => write!(f, "pop {} {}", seg, idx),
            Command::Label(sym) => write!(f, "label {}", sym),
            Command::Goto(sym) => write!(f, "goto {}", sym),
            Command::IfGoto(sym) => write!(f, "if-goto {}", sym),
            Command::Function(name, locals) => write!(f, "function {} {}", name, locals),
            Command::Call(name, args) => write!(f, "call {} {}", name, args),
            Command::Return => f.write_str("return"),
        }
    }
}
