//! Lowering of VM commands to Hack assembly.
//!
//! Every command is expanded into a complete block of lines before anything
//! reaches the output, so a rejected command never leaves a half-written
//! sequence behind.

use std::io::{BufWriter, Write};

use log::trace;

use crate::ast::{Command::*, Segment::*, *};
use crate::error::{CommandError, Error, Result};
use crate::parser::check_symbol;

macro_rules! svec {
    ($($x:expr),* $(,)?) => (vec![$($x.to_string()),*]);
}

/// Label of the terminal loop appended by [`CodeWriter::close`]. Like every
/// generated label it starts with [`RESERVED_PREFIX`].
pub const END_LABEL: &str = "__END";

/// Caller name used for the return label of the bootstrap call.
const BOOTSTRAP_CALLER: &str = "Bootstrap";

/// Scratch register holding a pop destination, and the frame base on return.
const ADDR_REGISTER: &str = "R13";

/// Scratch register holding the return address while a frame is torn down.
const RETURN_REGISTER: &str = "R14";

/// Distance below the frame base of the saved return address.
const RETURN_ADDRESS_OFFSET: u16 = 5;

/// Saved segment pointers in restore order, with their distance below the
/// frame base. `call` pushes them in the reverse order.
const SAVED_POINTERS: [(&str, u16); 4] = [("THAT", 1), ("THIS", 2), ("ARG", 3), ("LCL", 4)];

fn at_c(arg: u16) -> String {
    format!("@{}", arg)
}

fn at_s(arg: &str) -> String {
    format!("@{}", arg)
}

fn label_line(sym: &str) -> String {
    format!("({})", sym)
}

fn pointer_arg(arg: u16) -> &'static str {
    match arg {
        0 => "THIS",
        _ => "THAT",
    }
}

/// Pushes D onto the stack.
fn push_d() -> Vec<String> {
    svec![
        "@SP",
        "M=M+1",
        "A=M-1", // Don't need to refetch SP; this is safe
        "M=D"
    ]
}

/// Pops the top of the stack into D.
fn pop_d() -> Vec<String> {
    svec!["@SP", "AM=M-1", "D=M"]
}

/// Push microcode for the four pointer-based segments
fn seg_push(seg: &str, arg: u16) -> Vec<String> {
    let mut lines = svec![
        at_s(seg),
        "D=M",
        at_c(arg),
        "A=D+A", // A = SEG+arg
        "D=M"    // D = value to push
    ];
    lines.extend(push_d());
    lines
}

fn seg_push_direct(label: &str) -> Vec<String> {
    let mut lines = svec![at_s(label), "D=M"];
    lines.extend(push_d());
    lines
}

fn seg_pop(seg: &str, arg: u16) -> Vec<String> {
    let mut lines = svec![
        at_s(seg),
        "D=M",
        at_c(arg),
        "D=D+A", // D = SEG+arg
        at_s(ADDR_REGISTER),
        "M=D" // Park the target address
    ];
    lines.extend(pop_d());
    lines.extend(svec![
        at_s(ADDR_REGISTER),
        "A=M", // At the target address...
        "M=D"  // ... store the popped val
    ]);
    lines
}

fn seg_pop_direct(label: &str) -> Vec<String> {
    let mut lines = pop_d();
    lines.extend(svec![at_s(label), "M=D"]);
    lines
}

fn simple_un_op(op: char) -> Vec<String> {
    svec!["@SP", "A=M-1", format!("M={}M", op)]
}

// i.e. no conditions or jumps, just pop and run
fn simple_bin_op(comp: &str) -> Vec<String> {
    svec![
        "@SP",
        "AM=M-1", // SP--, looking at top of stack now
        "D=M",    // Right arg in D
        "A=A-1",  // Looking at second arg of stack, will overwrite
        format!("M={}", comp)
    ]
}

/// Writes Hack assembly for a stream of VM commands.
///
/// One writer lives for a whole translation run, so its label counter keeps
/// generated labels unique across every module it sees.
pub struct CodeWriter<W: Write> {
    out: BufWriter<W>,
    module: String,
    function: Option<String>,
    gen_sym: usize,
    annotate: bool,
}

impl<W: Write> CodeWriter<W> {
    pub fn new(out: W) -> Self {
        CodeWriter {
            out: BufWriter::new(out),
            module: String::new(),
            function: None,
            gen_sym: 0,
            annotate: false,
        }
    }

    /// Emit each VM command as a comment ahead of its assembly.
    pub fn annotate(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn current_function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    /// Starts a new source module. Statics are named after it from here on,
    /// so the name must itself be a valid symbol.
    pub fn set_module(&mut self, module: &str) -> Result<()> {
        check_symbol(module)?;
        self.module = module.to_string();
        self.function = None;
        if self.annotate {
            self.write_comment(module)?;
        }
        Ok(())
    }

    fn next_gen_sym(&mut self) -> usize {
        let tmp = self.gen_sym;
        self.gen_sym += 1;
        tmp
    }

    fn fresh_label(&mut self, base: &str) -> String {
        format!("{}{}_{}", RESERVED_PREFIX, base, self.next_gen_sym())
    }

    fn static_sym(&self, arg: u16) -> String {
        format!("{}.{}", self.module, arg)
    }

    /// Convert VM label to Hack ASM symbol - for consistency across instructions
    fn label_to_sym(&self, label: &str) -> String {
        match &self.function {
            Some(function) => format!("{}${}", function, label),
            None => label.to_string(),
        }
    }

    fn emit(&mut self, lines: &[String]) -> Result<()> {
        for line in lines {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }

    pub fn write_comment(&mut self, comment: &str) -> Result<()> {
        writeln!(self.out, "// {}", comment)?;
        Ok(())
    }

    /// Lowers one command and writes its block.
    pub fn write_command(&mut self, command: &Command) -> Result<()> {
        let lines = self.translate(command)?;
        trace!("{} -> {} lines", command, lines.len());
        if self.annotate {
            self.write_comment(&command.to_string())?;
        }
        self.emit(&lines)
    }

    /// Sets SP to `stack_base` and calls `entry` with no arguments.
    pub fn write_init(&mut self, stack_base: u16, entry: &str) -> Result<()> {
        let mut lines = svec![at_c(stack_base), "D=A", "@SP", "M=D"];
        lines.extend(self.call(entry, 0));
        if self.annotate {
            self.write_comment(&format!("bootstrap: call {} 0", entry))?;
        }
        self.emit(&lines)
    }

    pub fn write_arithmetic(&mut self, op: ArithmeticOp) -> Result<()> {
        self.write_command(&Arithmetic(op))
    }

    pub fn write_push(&mut self, segment: Segment, index: u16) -> Result<()> {
        self.write_command(&Push(segment, index))
    }

    pub fn write_pop(&mut self, segment: Segment, index: u16) -> Result<()> {
        self.write_command(&Pop(segment, index))
    }

    pub fn write_label(&mut self, label: &str) -> Result<()> {
        self.write_command(&Label(label.to_string()))
    }

    pub fn write_goto(&mut self, label: &str) -> Result<()> {
        self.write_command(&Goto(label.to_string()))
    }

    pub fn write_if(&mut self, label: &str) -> Result<()> {
        self.write_command(&IfGoto(label.to_string()))
    }

    pub fn write_function(&mut self, name: &str, locals: u16) -> Result<()> {
        self.write_command(&Function(name.to_string(), locals))
    }

    pub fn write_call(&mut self, name: &str, args: u16) -> Result<()> {
        self.write_command(&Call(name.to_string(), args))
    }

    pub fn write_return(&mut self) -> Result<()> {
        self.write_command(&Return)
    }

    /// Appends the terminal loop, flushes, and hands back the sink.
    pub fn close(mut self) -> Result<W> {
        let end = svec![label_line(END_LABEL), at_s(END_LABEL), "0;JMP"];
        self.emit(&end)?;
        self.out
            .into_inner()
            .map_err(|err| Error::Write(err.into_error()))
    }

    fn push(&self, segment: Segment, arg: u16) -> Result<Vec<String>, CommandError> {
        segment.check_index(arg)?;
        Ok(match segment {
            Constant => {
                let mut lines = svec![at_c(arg), "D=A"];
                lines.extend(push_d());
                lines
            }
            Local => seg_push("LCL", arg),
            Argument => seg_push("ARG", arg),
            This => seg_push("THIS", arg),
            That => seg_push("THAT", arg),
            Static => seg_push_direct(&self.static_sym(arg)),
            Temp => seg_push_direct(&format!("R{}", arg + 5)),
            Pointer => seg_push_direct(pointer_arg(arg)),
        })
    }

    fn pop(&self, segment: Segment, arg: u16) -> Result<Vec<String>, CommandError> {
        segment.check_index(arg)?;
        Ok(match segment {
            Constant => return Err(CommandError::PopConstant),
            Local => seg_pop("LCL", arg),
            Argument => seg_pop("ARG", arg),
            This => seg_pop("THIS", arg),
            That => seg_pop("THAT", arg),
            Static => seg_pop_direct(&self.static_sym(arg)),
            Temp => seg_pop_direct(&format!("R{}", arg + 5)),
            Pointer => seg_pop_direct(pointer_arg(arg)),
        })
    }

    fn compare(&mut self, jump: &str) -> Vec<String> {
        let cmp_sym = self.fresh_label("CMP_TRUE");
        let end_sym = self.fresh_label("CMP_END");
        svec![
            "@SP",
            "AM=M-1", // SP--, looking at top of stack now
            "D=M",    // Right arg in D
            "A=A-1",  // Looking at second arg of stack, will overwrite
            "D=M-D",
            at_s(&cmp_sym),
            format!("D;J{}", jump),
            "D=0",
            at_s(&end_sym),
            "0;JMP",
            label_line(&cmp_sym),
            "D=-1",
            label_line(&end_sym),
            "@SP",
            "A=M-1",
            "M=D"
        ]
    }

    fn arithmetic(&mut self, op: ArithmeticOp) -> Vec<String> {
        match op {
            ArithmeticOp::Not => simple_un_op('!'),
            ArithmeticOp::Neg => simple_un_op('-'),
            ArithmeticOp::Add => simple_bin_op("D+M"),
            ArithmeticOp::Sub => simple_bin_op("M-D"),
            ArithmeticOp::And => simple_bin_op("D&M"),
            ArithmeticOp::Or => simple_bin_op("D|M"),
            ArithmeticOp::Eq => self.compare("EQ"),
            ArithmeticOp::Gt => self.compare("GT"),
            ArithmeticOp::Lt => self.compare("LT"),
        }
    }

    fn label(&self, label: &str) -> Vec<String> {
        svec![label_line(&self.label_to_sym(label))]
    }

    fn goto(&self, label: &str) -> Vec<String> {
        svec![
            at_s(&self.label_to_sym(label)),
            "0;JMP" // Unconditional jump
        ]
    }

    fn if_goto(&self, label: &str) -> Vec<String> {
        let mut lines = pop_d();
        lines.extend(svec![
            at_s(&self.label_to_sym(label)),
            "D;JNE" // False is 0
        ]);
        lines
    }

    fn function(&mut self, name: &str, locals: u16) -> Vec<String> {
        self.function = Some(name.to_string());
        let mut lines = svec![label_line(name)];
        for _ in 0..locals {
            lines.extend(svec!["@SP", "M=M+1", "A=M-1", "M=0"]);
        }
        lines
    }

    fn call(&mut self, name: &str, args: u16) -> Vec<String> {
        let caller = match (&self.function, self.module.is_empty()) {
            (Some(function), _) => function.clone(),
            (None, false) => self.module.clone(),
            (None, true) => BOOTSTRAP_CALLER.to_string(),
        };
        let ret_sym = self.fresh_label(&format!("RET_{}", caller));

        let mut lines = svec![at_s(&ret_sym), "D=A"];
        lines.extend(push_d());
        for (reg, _) in SAVED_POINTERS.iter().rev() {
            lines.extend(svec![at_s(reg), "D=M"]);
            lines.extend(push_d());
        }
        lines.extend(svec![
            "@SP",
            "D=M",
            format!("@{}", u32::from(args) + u32::from(RETURN_ADDRESS_OFFSET)),
            "D=D-A", // ARG = SP - args - 5
            "@ARG",
            "M=D",
            "@SP",
            "D=M",
            "@LCL",
            "M=D", // LCL = SP
            at_s(name),
            "0;JMP",
            label_line(&ret_sym)
        ]);
        lines
    }

    fn ret(&self) -> Vec<String> {
        let mut lines = svec![
            "@LCL",
            "D=M",
            at_s(ADDR_REGISTER),
            "M=D", // frame = LCL
            at_c(RETURN_ADDRESS_OFFSET),
            "A=D-A",
            "D=M",
            at_s(RETURN_REGISTER),
            "M=D" // ret = *(frame-5), read before *ARG is overwritten
        ];
        lines.extend(pop_d());
        lines.extend(svec![
            "@ARG",
            "A=M",
            "M=D", // *ARG = return value
            "@ARG",
            "D=M+1",
            "@SP",
            "M=D" // SP = ARG+1
        ]);
        for (reg, offset) in SAVED_POINTERS {
            lines.extend(svec![
                at_s(ADDR_REGISTER),
                "D=M",
                at_c(offset),
                "A=D-A",
                "D=M",
                at_s(reg),
                "M=D"
            ]);
        }
        lines.extend(svec![at_s(RETURN_REGISTER), "A=M", "0;JMP"]);
        lines
    }

    /// Expands one command into its assembly lines without writing them.
    pub fn translate(&mut self, command: &Command) -> Result<Vec<String>, CommandError> {
        Ok(match command {
            Arithmetic(op) => self.arithmetic(*op),
            Push(seg, arg) => self.push(*seg, *arg)?,
            Pop(seg, arg) => self.pop(*seg, *arg)?,
            Label(sym) => self.label(sym),
            Goto(sym) => self.goto(sym),
            IfGoto(sym) => self.if_goto(sym),
            Function(name, locals) => self.function(name, *locals),
            Call(name, args) => self.call(name, *args),
            Return => self.ret(),
        })
    }
}
