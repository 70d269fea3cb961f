use std::io::{BufRead, Write};

use log::{debug, info};

use crate::ast::{Command, Command::*, MAX_ADDRESS};
use crate::codegen::CodeWriter;
use crate::error::{CommandError, Result};
use crate::parser::{self, Parser};

/// Translation settings shared by every module of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Emit the stack setup and entry call before any module.
    pub bootstrap: bool,
    /// Emit VM source as comments ahead of each block.
    pub annotate: bool,
    /// Function called by the bootstrap.
    pub entry_point: String,
    /// Initial value of SP set by the bootstrap.
    pub stack_base: u16,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            bootstrap: true,
            annotate: false,
            entry_point: "Sys.init".to_string(),
            stack_base: 256,
        }
    }
}

impl Options {
    pub fn bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn annotate(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn stack_base(mut self, stack_base: u16) -> Self {
        self.stack_base = stack_base;
        self
    }
}

/// Feeds parsed modules through a single [`CodeWriter`].
pub struct Translator<W: Write> {
    writer: CodeWriter<W>,
    commands: usize,
}

impl<W: Write> Translator<W> {
    /// Creates a translator writing to `out`, emitting the bootstrap first when enabled.
    pub fn new(out: W, options: &Options) -> Result<Self> {
        let mut writer = CodeWriter::new(out).annotate(options.annotate);
        if options.bootstrap {
            parser::check_symbol(&options.entry_point)?;
            if options.stack_base > MAX_ADDRESS {
                return Err(CommandError::InvalidOperand(options.stack_base.to_string()).into());
            }
            debug!(
                "bootstrap: SP={} entry={}",
                options.stack_base, options.entry_point
            );
            writer.write_init(options.stack_base, &options.entry_point)?;
        }

        Ok(Translator {
            writer,
            commands: 0,
        })
    }

    pub fn current_function(&self) -> Option<&str> {
        self.writer.current_function()
    }

    /// Number of commands translated so far across all modules.
    pub fn command_count(&self) -> usize {
        self.commands
    }

    /// Translates one module read line by line from `src`.
    ///
    /// Stops at the first bad line; nothing of that line reaches the output.
    pub fn translate_module<R: BufRead>(&mut self, module: &str, src: R) -> Result<usize> {
        info!("translating module {}", module);
        self.writer.set_module(module)?;

        let mut count = 0;
        for command in Parser::new(module, src) {
            self.translate_command(&command?)?;
            count += 1;
        }

        debug!("{}: {} commands", module, count);
        Ok(count)
    }

    /// Translates a module held in memory.
    pub fn translate_str(&mut self, module: &str, src: &str) -> Result<usize> {
        self.translate_module(module, src.as_bytes())
    }

    /// Translates already-parsed commands as part of `module`.
    pub fn translate(&mut self, module: &str, commands: &[Command]) -> Result<()> {
        self.writer.set_module(module)?;
        for command in commands {
            self.translate_command(command)?;
        }
        Ok(())
    }

    fn translate_command(&mut self, command: &Command) -> Result<()> {
        debug!("{}", command);
        self.commands += 1;
        match command {
            Arithmetic(op) => self.writer.write_arithmetic(*op),
            Push(seg, arg) => self.writer.write_push(*seg, *arg),
            Pop(seg, arg) => self.writer.write_pop(*seg, *arg),
            Label(sym) => self.writer.write_label(sym),
            Goto(sym) => self.writer.write_goto(sym),
            IfGoto(sym) => self.writer.write_if(sym),
            Function(name, locals) => self.writer.write_function(name, *locals),
            Call(name, args) => self.writer.write_call(name, *args),
            Return => self.writer.write_return(),
        }
    }

    /// Closes the run: appends the terminal loop and returns the sink.
    pub fn finish(self) -> Result<W> {
        info!("translated {} commands", self.commands);
        self.writer.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn run(options: &Options, modules: &[(&str, &str)]) -> Result<String> {
        let mut tr = Translator::new(Vec::new(), options)?;
        for (name, src) in modules {
            tr.translate_str(name, src)?;
        }
        Ok(String::from_utf8(tr.finish()?).unwrap())
    }

    #[test]
    fn without_bootstrap_output_starts_with_user_code() {
        let asm = run(
            &Options::default().bootstrap(false),
            &[("Main", "push constant 2\npush constant 3\nadd\n")],
        )
        .unwrap();
        assert!(asm.starts_with("@2\nD=A\n"));
        assert!(asm.ends_with("(__END)\n@__END\n0;JMP\n"));
    }

    #[test]
    fn bootstrap_comes_first() {
        let asm = run(&Options::default(), &[("Sys", "function Sys.init 0\n")]).unwrap();
        assert!(asm.starts_with("@256\nD=A\n@SP\nM=D\n"));
        assert!(asm.contains("@Sys.init\n0;JMP\n"));
    }

    #[test]
    fn custom_entry_and_stack_base() {
        let options = Options::default().entry_point("Main.main").stack_base(300);
        let asm = run(&options, &[]).unwrap();
        assert!(asm.starts_with("@300\n"));
        assert!(asm.contains("@Main.main\n"));
    }

    #[test]
    fn bad_entry_point_is_rejected() {
        let err = Translator::new(Vec::new(), &Options::default().entry_point("9lives"))
            .err()
            .unwrap();
        assert_eq!(
            err.command_error(),
            Some(&CommandError::InvalidSymbol("9lives".into()))
        );
    }

    #[test]
    fn function_context_is_tracked_and_reset_per_module() {
        let mut tr = Translator::new(Vec::new(), &Options::default().bootstrap(false)).unwrap();
        tr.translate_str("A", "function A.f 0\nlabel L\n").unwrap();
        assert_eq!(tr.current_function(), Some("A.f"));
        tr.translate_str("B", "push constant 1\n").unwrap();
        assert_eq!(tr.current_function(), None);
        assert_eq!(tr.command_count(), 3);
    }

    #[test]
    fn first_error_stops_the_module() {
        let mut tr = Translator::new(Vec::new(), &Options::default().bootstrap(false)).unwrap();
        let err = tr
            .translate_str("Main", "push constant 1\npop local -1\npush constant 2\n")
            .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
        assert_eq!(err.to_string(), "Main:2: not a non-negative integer: -1");
        assert_eq!(tr.command_count(), 1);
    }

    #[test]
    fn module_name_must_be_a_symbol() {
        let mut tr = Translator::new(Vec::new(), &Options::default().bootstrap(false)).unwrap();
        let err = tr
            .translate_str("my-prog", "push static 0\ncall F 0\n")
            .unwrap_err();
        assert_eq!(
            err.command_error(),
            Some(&CommandError::InvalidSymbol("my-prog".into()))
        );
        assert!(tr.translate("1st", &[]).is_err());
        assert_eq!(tr.command_count(), 0);
    }

    #[test]
    fn pre_parsed_commands() {
        let commands = parser::parse("Main", "push static 3\npop temp 0\n").unwrap();
        let mut tr = Translator::new(Vec::new(), &Options::default().bootstrap(false)).unwrap();
        tr.translate("Main", &commands).unwrap();
        let asm = String::from_utf8(tr.finish().unwrap()).unwrap();
        assert!(asm.starts_with("@Main.3\nD=M\n"));
        assert!(asm.contains("@R5\nM=D\n"));
    }

    #[test]
    fn annotated_output() {
        let asm = run(
            &Options::default().bootstrap(false).annotate(true),
            &[("Main", "push constant 1 // one\n")],
        )
        .unwrap();
        assert!(asm.starts_with("// Main\n// push constant 1\n@1\n"));
    }
}
