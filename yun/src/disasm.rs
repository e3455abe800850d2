// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler for assembled units.
//!
//! This module provides:
//! - A structured view ([`Disassembly`], [`InstrView`]) for tooling and tests.
//! - A stable, human-readable text format via [`core::fmt::Display`], one
//!   instruction per line with resolved jump targets and call names.
//!
//! Disassembly is best-effort: a function whose bytes fail to decode records
//! the error and the remaining functions are still rendered.

use alloc::vec::Vec;
use core::fmt;

use crate::containers::Symbol;
use crate::emit::{Instruction, InstructionError};
use crate::opcode::Opcode;
use crate::unit::ExecutionUnit;

/// A decoded instruction with its location in the unit buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InstrView {
    /// Word index in the unit buffer.
    pub word_index: usize,
    /// The decoded instruction.
    pub instruction: Instruction,
}

impl InstrView {
    /// Returns the instruction's byte offset.
    #[must_use]
    pub fn byte_offset(&self) -> u32 {
        (self.word_index * 4) as u32
    }
}

/// One function's disassembly.
#[derive(Clone, Debug)]
pub struct FunctionDisassembly<'a> {
    /// The function's symbol.
    pub symbol: &'a Symbol,
    /// Decoded instructions, in order.
    pub instructions: Vec<InstrView>,
    /// Set if decoding stopped early.
    pub error: Option<InstructionError>,
}

/// A structured disassembly of a whole unit.
#[derive(Clone, Debug)]
pub struct Disassembly<'a> {
    unit: &'a ExecutionUnit,
    /// Per-function disassemblies in layout order.
    pub functions: Vec<FunctionDisassembly<'a>>,
}

/// Disassembles `unit` into a structured view.
#[must_use]
pub fn disassemble(unit: &ExecutionUnit) -> Disassembly<'_> {
    let mut functions = Vec::with_capacity(unit.symbols().len());
    for symbol in unit.symbols().iter() {
        functions.push(disassemble_function(unit, symbol));
    }
    Disassembly { unit, functions }
}

fn disassemble_function<'a>(unit: &'a ExecutionUnit, symbol: &'a Symbol) -> FunctionDisassembly<'a> {
    let start = (symbol.start / 4) as usize;
    let end = (symbol.end / 4) as usize;
    let mut instructions = Vec::with_capacity(end.saturating_sub(start));
    let mut error = None;

    for word_index in start..end {
        let Some(&word) = unit.words().get(word_index) else {
            break;
        };
        match Instruction::decode(word) {
            Ok(instruction) => instructions.push(InstrView {
                word_index,
                instruction,
            }),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    FunctionDisassembly {
        symbol,
        instructions,
        error,
    }
}

fn write_signature(f: &mut fmt::Formatter<'_>, symbol: &Symbol) -> fmt::Result {
    write!(
        f,
        "{} {}(",
        if symbol.does_return { "Value" } else { "void" },
        symbol.name
    )?;
    for i in 0..symbol.arguments {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "Value")?;
    }
    writeln!(f, "):")
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_signature(f, function.symbol)?;
            for view in &function.instructions {
                write_instruction(f, self.unit, view)?;
            }
            if let Some(e) = &function.error {
                writeln!(f, "  <decode error: {e}>")?;
            }
        }
        Ok(())
    }
}

fn write_instruction(
    f: &mut fmt::Formatter<'_>,
    unit: &ExecutionUnit,
    view: &InstrView,
) -> fmt::Result {
    let instr = view.instruction;
    let opcode = instr.opcode();
    write!(f, "  {:#06x}  {:<12}", view.byte_offset(), opcode.mnemonic())?;

    match opcode.operand_count() {
        0 => {}
        1 => {
            if opcode == Opcode::Call {
                let target = instr.dest() as u32;
                write!(f, "{target:#x}")?;
                if let Some(callee) = unit.symbol_at_location(target) {
                    write!(f, "          ; -> {}", callee.name)?;
                }
            } else if opcode.is_jump() {
                let delta = instr.dest();
                let target = (view.byte_offset() as i64 + i64::from(delta)) as u32;
                write!(f, "{delta:+}")?;
                write!(f, "          ; -> {target:#06x}")?;
            } else {
                write!(f, "R{}", instr.dest())?;
            }
        }
        _ => {
            if opcode == Opcode::LdConst {
                write!(f, "R{}, ${}", instr.dest(), instr.src())?;
                if let Some(value) = unit.constant(instr.src() as usize) {
                    write!(f, "          ; {value}")?;
                }
            } else {
                write!(f, "R{}, R{}", instr.dest(), instr.src())?;
            }
        }
    }
    writeln!(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Assembler;
    use crate::value::Value;
    use alloc::format;
    use alloc::string::ToString;

    fn two_function_unit() -> ExecutionUnit {
        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 2, 0, false).unwrap();
        a.load_constant(0, Value::int32(2)).unwrap();
        a.add_call("next".to_string()).unwrap();
        a.add_jump(Opcode::Jmp, "done".to_string()).unwrap();
        a.add_label("done".to_string()).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        a.begin_function("next".to_string(), 1, 1, true).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        a.patch("demo".to_string()).unwrap()
    }

    #[test]
    fn structured_view_covers_every_function() {
        let unit = two_function_unit();
        let d = disassemble(&unit);
        assert_eq!(d.functions.len(), 2);
        assert_eq!(d.functions[0].instructions.len(), 4);
        assert_eq!(d.functions[1].instructions.len(), 1);
        assert!(d.functions.iter().all(|fd| fd.error.is_none()));
        assert_eq!(d.functions[1].instructions[0].byte_offset(), 16);
    }

    #[test]
    fn text_format_resolves_calls_and_jumps() {
        let unit = two_function_unit();
        let text = format!("{}", disassemble(&unit));
        assert!(text.contains("void main():"), "{text}");
        assert!(text.contains("Value next(Value):"), "{text}");
        assert!(text.contains("; -> next"), "{text}");
        assert!(text.contains("ldconst"), "{text}");
        assert!(text.contains("; Int32(2)"), "{text}");
        // The jump lands on the ret one word ahead.
        assert!(text.contains("; -> 0x000c"), "{text}");
    }
}
