// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-line driver for the Yun VM.
//!
//! `yun [-dht] INPUT` reads a YASN source file and, by default, assembles
//! and runs it. `-d` prints the disassembly instead, `-t` the token stream.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use yun::disasm;
use yun::value::Value;
use yun::vm::{Console, Vm};
use yun_yasn::lexer::Lexer;

const USAGE: &str = "\
usage: yun [-dht] INPUT

  -d  print the disassembly instead of running
  -t  print the token stream instead of running
  -h  show this help
";

struct Stdout;

impl Console for Stdout {
    fn print_register(&mut self, register: u16, value: &Value) {
        println!("R{register} -> {value}");
    }
}

#[derive(Default)]
struct Options {
    help: bool,
    disassemble: bool,
    tokens: bool,
    input: Option<String>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Options> {
    let mut options = Options::default();
    for arg in args {
        if let Some(flags) = arg.strip_prefix('-') {
            if flags.is_empty() {
                bail!("empty flag\n{USAGE}");
            }
            for flag in flags.chars() {
                match flag {
                    'h' => options.help = true,
                    'd' => options.disassemble = true,
                    't' => options.tokens = true,
                    other => bail!("unknown flag '-{other}'\n{USAGE}"),
                }
            }
        } else if options.input.is_none() {
            options.input = Some(arg);
        } else {
            bail!("more than one input file\n{USAGE}");
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    let options = parse_args(std::env::args().skip(1))?;

    if options.help {
        print!("{USAGE}");
        return Ok(());
    }

    let Some(input) = options.input else {
        bail!("no input file\n{USAGE}");
    };
    let source = fs::read_to_string(&input).with_context(|| format!("read {input}"))?;
    let name = Path::new(&input)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unit");

    if options.tokens {
        let tokens = Lexer::new(&source)
            .scan()
            .map_err(|e| anyhow::anyhow!("{input}: {e}"))?;
        for token in tokens {
            println!("{:>4}  {}", token.line, token.kind);
        }
        return Ok(());
    }

    let unit = yun_yasn::assemble(&source, name).map_err(|e| anyhow::anyhow!("{input}: {e}"))?;

    if options.disassemble {
        print!("{}", disasm::disassemble(&unit));
        return Ok(());
    }

    let mut vm = Vm::with_console(unit, Stdout);
    vm.run().map_err(|e| anyhow::anyhow!("{input}: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_args;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn flags_combine_and_input_is_positional() {
        let options = parse_args(args(&["-dt", "prog.yasn"])).unwrap();
        assert!(options.disassemble);
        assert!(options.tokens);
        assert!(!options.help);
        assert_eq!(options.input.as_deref(), Some("prog.yasn"));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(parse_args(args(&["-x"])).is_err());
        assert!(parse_args(args(&["a", "b"])).is_err());
    }
}
