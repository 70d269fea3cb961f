//! A small Hack CPU that runs the assembly text produced by the translator.
#![allow(dead_code)]

use std::collections::HashMap;

use vmtranslator::{Options, Translator};

pub const SP: usize = 0;
pub const LCL: usize = 1;
pub const ARG: usize = 2;
pub const THIS: usize = 3;
pub const THAT: usize = 4;

const RAM_SIZE: usize = 0x8000;

#[derive(Debug, Clone)]
enum Instr {
    At(i16),
    C {
        dest: String,
        comp: String,
        jump: String,
    },
}

pub struct Hack {
    pub ram: Vec<i16>,
    rom: Vec<Instr>,
    labels: HashMap<String, usize>,
    symbols: HashMap<String, usize>,
    pc: usize,
    a: i16,
    d: i16,
}

fn predefined() -> HashMap<String, usize> {
    let mut symbols: HashMap<String, usize> = [
        ("SP", 0),
        ("LCL", 1),
        ("ARG", 2),
        ("THIS", 3),
        ("THAT", 4),
        ("SCREEN", 16384),
        ("KBD", 24576),
    ]
    .into_iter()
    .map(|(name, addr)| (name.to_string(), addr))
    .collect();
    for r in 0..16 {
        symbols.insert(format!("R{}", r), r);
    }
    symbols
}

fn comp(comp: &str, a: i16, d: i16, m: impl Fn() -> i16) -> i16 {
    match comp {
        "0" => 0,
        "1" => 1,
        "-1" => -1,
        "D" => d,
        "A" => a,
        "M" => m(),
        "!D" => !d,
        "!A" => !a,
        "!M" => !m(),
        "-D" => d.wrapping_neg(),
        "-A" => a.wrapping_neg(),
        "-M" => m().wrapping_neg(),
        "D+1" => d.wrapping_add(1),
        "A+1" => a.wrapping_add(1),
        "M+1" => m().wrapping_add(1),
        "D-1" => d.wrapping_sub(1),
        "A-1" => a.wrapping_sub(1),
        "M-1" => m().wrapping_sub(1),
        "D+A" => d.wrapping_add(a),
        "D+M" => d.wrapping_add(m()),
        "D-A" => d.wrapping_sub(a),
        "D-M" => d.wrapping_sub(m()),
        "A-D" => a.wrapping_sub(d),
        "M-D" => m().wrapping_sub(d),
        "D&A" => d & a,
        "D&M" => d & m(),
        "D|A" => d | a,
        "D|M" => d | m(),
        other => panic!("non-canonical comp `{}`", other),
    }
}

fn jumps(jump: &str, value: i16) -> bool {
    match jump {
        "" => false,
        "JGT" => value > 0,
        "JEQ" => value == 0,
        "JGE" => value >= 0,
        "JLT" => value < 0,
        "JNE" => value != 0,
        "JLE" => value <= 0,
        "JMP" => true,
        other => panic!("unknown jump `{}`", other),
    }
}

impl Hack {
    /// Assembles `asm`, panicking on malformed lines or duplicate labels.
    pub fn new(asm: &str) -> Self {
        let lines: Vec<&str> = asm
            .lines()
            .map(|line| line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim())
            .filter(|line| !line.is_empty())
            .collect();

        let mut labels = HashMap::new();
        let mut count = 0;
        for line in &lines {
            if let Some(label) = line.strip_prefix('(') {
                let label = label.strip_suffix(')').expect("unterminated label");
                assert!(
                    labels.insert(label.to_string(), count).is_none(),
                    "duplicate label {}",
                    label
                );
            } else {
                count += 1;
            }
        }

        let mut symbols = predefined();
        let mut next_var = 16;
        let mut rom = Vec::with_capacity(count);
        for line in &lines {
            if line.starts_with('(') {
                continue;
            }
            if let Some(sym) = line.strip_prefix('@') {
                let value = if let Ok(n) = sym.parse::<i16>() {
                    assert!(n >= 0, "negative A-instruction {}", line);
                    n
                } else if let Some(addr) = labels.get(sym) {
                    *addr as i16
                } else {
                    *symbols.entry(sym.to_string()).or_insert_with(|| {
                        next_var += 1;
                        next_var - 1
                    }) as i16
                };
                rom.push(Instr::At(value));
            } else {
                let (dest, rest) = line.split_once('=').unwrap_or(("", line));
                let (comp, jump) = rest.split_once(';').unwrap_or((rest, ""));
                assert!(
                    ["", "M", "D", "MD", "A", "AM", "AD", "AMD"].contains(&dest),
                    "bad dest in {}",
                    line
                );
                rom.push(Instr::C {
                    dest: dest.to_string(),
                    comp: comp.to_string(),
                    jump: jump.to_string(),
                });
            }
        }

        Hack {
            ram: vec![0; RAM_SIZE],
            rom,
            labels,
            symbols,
            pc: 0,
            a: 0,
            d: 0,
        }
    }

    /// RAM address given to a variable symbol such as `Main.0`.
    pub fn symbol(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).copied()
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    pub fn sp(&self) -> usize {
        self.ram[SP] as usize
    }

    pub fn top(&self) -> i16 {
        self.ram[self.sp() - 1]
    }

    fn step(&mut self) {
        let instr = self.rom[self.pc].clone();
        match instr {
            Instr::At(value) => {
                self.a = value;
                self.pc += 1;
            }
            Instr::C { dest, comp: c, jump } => {
                let addr = self.a as u16 as usize;
                let ram = &self.ram;
                let value = comp(&c, self.a, self.d, || ram[addr]);
                let target = self.a as u16 as usize;
                if dest.contains('M') {
                    self.ram[addr] = value;
                }
                if dest.contains('A') {
                    self.a = value;
                }
                if dest.contains('D') {
                    self.d = value;
                }
                self.pc = if jumps(&jump, value) { target } else { self.pc + 1 };
            }
        }
    }

    /// Runs until execution reaches `label`, panicking after `max_steps`.
    pub fn run_until(&mut self, label: &str, max_steps: usize) {
        let stop = *self
            .labels
            .get(label)
            .unwrap_or_else(|| panic!("no label {}", label));
        for _ in 0..max_steps {
            if self.pc == stop {
                return;
            }
            self.step();
        }
        panic!("did not reach {} in {} steps", label, max_steps);
    }

    pub fn run(&mut self) {
        self.run_until("__END", 1_000_000);
    }
}

/// Translates `modules` (name, source) without a bootstrap.
pub fn translate(modules: &[(&str, &str)]) -> String {
    translate_with(&Options::default().bootstrap(false), modules)
}

pub fn translate_with(options: &Options, modules: &[(&str, &str)]) -> String {
    let mut tr = Translator::new(Vec::new(), options).expect("translator");
    for (name, src) in modules {
        tr.translate_str(name, src).expect("translation");
    }
    String::from_utf8(tr.finish().expect("finish")).expect("utf-8 output")
}

/// A machine with the segment pointers set up the way a running caller would have them.
pub fn machine(asm: &str) -> Hack {
    let mut hack = Hack::new(asm);
    hack.ram[SP] = 256;
    hack.ram[LCL] = 300;
    hack.ram[ARG] = 400;
    hack.ram[THIS] = 3000;
    hack.ram[THAT] = 3010;
    hack
}
