use std::io::{self, BufRead};

use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag},
    character::{
        complete::{digit1, space1},
        is_digit,
    },
    combinator::{all_consuming, map, map_res, verify},
    multi::separated_list1,
    IResult,
};

use crate::ast::{Command::*, Segment::*, *};
use crate::error::{CommandError, Error, Result};

fn integer(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |c: &str| c.parse())(input)
}

#[test]
fn test_integer() {
    assert_eq!(integer("32767"), Ok(("", 32767)));
    assert!(integer("-1").is_err());
    assert!(integer("65536").is_err());
}

fn segment(input: &str) -> IResult<&str, Segment> {
    map(
        alt((
            tag("constant"),
            tag("local"),
            tag("static"),
            tag("argument"),
            tag("this"),
            tag("that"),
            tag("pointer"),
            tag("temp"),
        )),
        |seg| match seg {
            "constant" => Constant,
            "local" => Local,
            "static" => Static,
            "argument" => Argument,
            "this" => This,
            "that" => That,
            "pointer" => Pointer,
            _ => Temp,
        },
    )(input)
}

fn symbol(input: &str) -> IResult<&str, &str> {
    verify(
        is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_.$:0123456789"),
        |c: &str| !is_digit(c.as_bytes()[0]) && !c.starts_with(RESERVED_PREFIX),
    )(input)
}

#[test]
fn test_symbol() {
    assert_eq!(symbol("Main.fib$LOOP_1"), Ok(("", "Main.fib$LOOP_1")));
    assert!(symbol("1abc").is_err());
    assert!(symbol("_tmp").is_ok());
    assert!(symbol("__END").is_err());
}

/// Splits a comment-free, trimmed line into its whitespace-separated tokens.
fn tokens(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(space1, is_not(" \t\r")))(input)
}

#[test]
fn test_tokens() {
    assert_eq!(
        tokens("push \t pointer  1"),
        Ok(("", vec!["push", "pointer", "1"]))
    );
}

fn index_operand(token: &str) -> Result<u16, CommandError> {
    all_consuming(integer)(token)
        .map(|(_, n)| n)
        .map_err(|_| CommandError::InvalidOperand(token.to_string()))
}

fn segment_operand(token: &str) -> Result<Segment, CommandError> {
    all_consuming(segment)(token)
        .map(|(_, seg)| seg)
        .map_err(|_| CommandError::UnknownSegment(token.to_string()))
}

fn symbol_operand(token: &str) -> Result<String, CommandError> {
    all_consuming(symbol)(token)
        .map(|(_, sym)| sym.to_string())
        .map_err(|_| CommandError::InvalidSymbol(token.to_string()))
}

/// Checks that `sym` is usable as a label, function or module name.
pub fn check_symbol(sym: &str) -> Result<(), CommandError> {
    symbol_operand(sym).map(|_| ())
}

fn expect_arity(tokens: &[&str], expected: usize) -> Result<(), CommandError> {
    if tokens.len() == expected {
        Ok(())
    } else {
        Err(CommandError::Arity {
            opcode: tokens[0].to_string(),
            expected,
            found: tokens.len(),
        })
    }
}

fn command(tokens: &[&str]) -> Result<Command, CommandError> {
    let opcode = tokens[0];

    if let Some(op) = ArithmeticOp::from_mnemonic(opcode) {
        expect_arity(tokens, 1)?;
        return Ok(Arithmetic(op));
    }

    match opcode {
        "return" => {
            expect_arity(tokens, 1)?;
            Ok(Return)
        }
        "label" | "goto" | "if-goto" => {
            expect_arity(tokens, 2)?;
            let sym = symbol_operand(tokens[1])?;
            Ok(match opcode {
                "label" => Label(sym),
                "goto" => Goto(sym),
                _ => IfGoto(sym),
            })
        }
        "push" | "pop" => {
            expect_arity(tokens, 3)?;
            let seg = segment_operand(tokens[1])?;
            let idx = index_operand(tokens[2])?;
            if opcode == "pop" && seg == Constant {
                return Err(CommandError::PopConstant);
            }
            seg.check_index(idx)?;
            Ok(if opcode == "push" {
                Push(seg, idx)
            } else {
                Pop(seg, idx)
            })
        }
        "function" | "call" => {
            expect_arity(tokens, 3)?;
            let name = symbol_operand(tokens[1])?;
            let n = index_operand(tokens[2])?;
            if n > MAX_COUNT {
                return Err(CommandError::InvalidOperand(tokens[2].to_string()));
            }
            Ok(if opcode == "function" {
                Function(name, n)
            } else {
                Call(name, n)
            })
        }
        _ => Err(CommandError::UnknownCommand(opcode.to_string())),
    }
}

/// Parses one line of VM source. Blank and comment-only lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (_, tokens) =
        tokens(line).map_err(|_| CommandError::UnknownCommand(line.to_string()))?;
    command(&tokens).map(Some)
}

/// Reads VM commands from one module, one line at a time.
pub struct Parser<R> {
    module: String,
    lines: io::Lines<R>,
    line: usize,
}

impl<R: BufRead> Parser<R> {
    pub fn new(module: impl Into<String>, src: R) -> Self {
        Parser {
            module: module.into(),
            lines: src.lines(),
            line: 0,
        }
    }

    /// Line number of the most recently read line, starting at 1.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for Parser<R> {
    type Item = Result<Command>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(source) => {
                    return Some(Err(Error::Read {
                        module: self.module.clone(),
                        source,
                    }))
                }
            };
            self.line += 1;

            match parse_line(&text) {
                Ok(Some(command)) => return Some(Ok(command)),
                Ok(None) => continue,
                Err(error) => {
                    return Some(Err(Error::Parse {
                        module: self.module.clone(),
                        line: self.line,
                        error,
                    }))
                }
            }
        }
    }
}

/// Parses a whole module held in memory.
pub fn parse(module: &str, input: &str) -> Result<Vec<Command>> {
    Parser::new(module, input.as_bytes()).collect()
}
