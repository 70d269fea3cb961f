use std::{
    ffi::OsStr,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    process,
};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use log::{error, info, warn};

use vmtranslator::{logger, Options, Translator};

#[derive(Parser, Debug)]
#[command(
    name = "vmtranslator",
    version,
    about = "Translates Hack VM code into Hack assembly",
    long_about = "Translates Hack VM code into Hack assembly.\n\n\
        Each INPUT is a .vm file or a directory whose .vm files are translated \
        in name order. All modules are written to one .asm file."
)]
struct Cli {
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        long_help = "Write assembly to FILE. Defaults to <name>.asm next to a single input file, or <dir>/<dir>.asm for a directory."
    )]
    output: Option<PathBuf>,
    #[arg(long = "no-bootstrap", action = ArgAction::SetTrue, help = "Do not emit the stack setup and entry call")]
    no_bootstrap: bool,
    #[arg(long = "annotate", action = ArgAction::SetTrue, help = "Emit each VM command as a comment")]
    annotate: bool,
    #[arg(long = "entry", value_name = "NAME", default_value = "Sys.init", help = "Function called by the bootstrap")]
    entry: String,
    #[arg(
        long = "stack-base",
        value_name = "ADDR",
        default_value_t = 256,
        value_parser = clap::value_parser!(u16).range(0..=0x7fff),
        help = "Initial stack pointer set by the bootstrap"
    )]
    stack_base: u16,
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, help = "Log more; repeat for debug and trace output")]
    verbose: u8,
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, help = "Only report errors")]
    quiet: bool,
}

impl Cli {
    fn options(&self) -> Options {
        Options::default()
            .bootstrap(!self.no_bootstrap)
            .annotate(self.annotate)
            .entry_point(self.entry.clone())
            .stack_base(self.stack_base)
    }
}

fn is_vm_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(OsStr::to_str) == Some("vm")
}

/// Expands directories into their own .vm files, sorted by name.
fn collect_sources(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut sources = vec![];

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("Error while reading directory: {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_vm_file(path))
                .collect();
            found.sort();
            if found.is_empty() {
                warn!("no .vm files in {}", input.display());
            }
            sources.extend(found);
        } else if input.is_file() {
            if !is_vm_file(input) {
                warn!("{} does not have a .vm extension", input.display());
            }
            sources.push(input.clone());
        } else {
            bail!("File not found: {}", input.display());
        }
    }

    if sources.is_empty() {
        bail!("no .vm files to translate");
    }
    Ok(sources)
}

/// `Foo.vm` becomes `Foo.asm`; directory `dir` becomes `dir/dir.asm`.
fn default_output(input: &Path) -> anyhow::Result<PathBuf> {
    if input.is_dir() {
        let name = input
            .canonicalize()
            .ok()
            .and_then(|path| path.file_name().map(OsStr::to_os_string))
            .context("cannot name the output after this directory; pass --output")?;
        let mut file = PathBuf::from(name);
        file.set_extension("asm");
        Ok(input.join(file))
    } else {
        Ok(input.with_extension("asm"))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn module_name(path: &Path) -> anyhow::Result<&str> {
    path.file_stem()
        .and_then(OsStr::to_str)
        .with_context(|| format!("invalid module name: {}", path.display()))
}

fn run(cli: &Cli) -> anyhow::Result<PathBuf> {
    let sources = collect_sources(&cli.inputs)?;
    let outfile = match (&cli.output, cli.inputs.as_slice()) {
        (Some(path), _) => path.clone(),
        (None, [input]) => default_output(input)?,
        (None, _) => bail!("--output is required with more than one input"),
    };

    if let Some(source) = sources.iter().find(|source| same_file(source, &outfile)) {
        bail!("output {} would overwrite input {}", outfile.display(), source.display());
    }

    // Nothing touches the output file until the whole program has translated.
    let mut translator = Translator::new(Vec::new(), &cli.options())?;

    for source in &sources {
        let module = module_name(source)?;
        let file = File::open(source)
            .with_context(|| format!("File not found: {}", source.display()))?;
        translator
            .translate_module(module, BufReader::new(file))
            .with_context(|| format!("error translating {}", source.display()))?;
    }

    let asm = translator.finish()?;
    fs::write(&outfile, asm).with_context(|| format!("cannot write {}", outfile.display()))?;
    info!("wrote {}", outfile.display());
    Ok(outfile)
}

fn main() {
    let cli = Cli::parse();
    let level = logger::env_level(logger::level_for(cli.verbose, cli.quiet));
    if let Err(err) = logger::init(level) {
        eprintln!("cannot install logger: {}", err);
    }

    match run(&cli) {
        Ok(outfile) => {
            if !cli.quiet {
                let inputs: Vec<String> =
                    cli.inputs.iter().map(|p| p.display().to_string()).collect();
                println!("Compiled {} to {}", inputs.join(", "), outfile.display());
            }
        }
        Err(err) => {
            error!("{:#}", err);
            process::exit(1);
        }
    }
}
