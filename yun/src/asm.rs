// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two-level assembler.
//!
//! [`FunctionBuilder`] accumulates one function: it binds labels, emits
//! instructions with placeholder destinations for jumps and calls, validates
//! opcode arity and register bounds, and on [`FunctionBuilder::finalize`]
//! resolves every local jump to a signed byte delta from its site.
//!
//! [`Assembler`] drives builders for a whole unit: it interns constants, lays
//! functions out into one contiguous byte range, patches every recorded call
//! site with its callee's absolute byte start, and produces the read-only
//! [`ExecutionUnit`].

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::containers::{ConstantPool, Symbol, SymbolTable};
use crate::emit::{Emitter, Instruction, InstructionError};
use crate::opcode::Opcode;
use crate::unit::ExecutionUnit;
use crate::value::Value;

/// Largest register index expressible in a packed operand field.
const MAX_REGISTERS: u16 = 1 << 12;

/// Largest constant-pool index expressible in a packed operand field.
const MAX_CONSTANT_INDEX: u32 = (1 << 12) - 1;

/// Inclusive bounds of the signed 24-bit byte-offset field.
const MIN_JUMP_BYTES: i64 = -(1 << 23);
const MAX_JUMP_BYTES: i64 = (1 << 23) - 1;

/// An assembly-time error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblerError {
    /// An instruction was built or patched incorrectly.
    Instruction(InstructionError),
    /// A label was defined twice within one function.
    LabelRedefinition {
        /// The redefined label.
        label: String,
    },
    /// A jump referenced a label that was never defined.
    MissingLabel {
        /// The unresolved label.
        label: String,
    },
    /// A resolved jump does not fit the signed 24-bit offset field.
    JumpOutOfRange {
        /// The jump's target label.
        label: String,
    },
    /// A call referenced a function absent from the unit.
    UnknownCallTarget {
        /// The unresolved function name.
        name: String,
    },
    /// A register operand was outside the function's register window.
    RegisterOutOfRange {
        /// The offending register index.
        register: u32,
        /// The function's register count.
        count: u16,
    },
    /// A function declared more registers than the 12-bit operand field
    /// can address.
    TooManyRegisters {
        /// The declared register count.
        count: u16,
    },
    /// A function declared more arguments than registers.
    TooManyArguments {
        /// The declared argument count.
        arguments: u16,
        /// The declared register count.
        registers: u16,
    },
    /// A function with zero registers cannot return a value.
    ReturnWithoutRegisters,
    /// `ldconst` referenced a constant-pool index that does not exist.
    UnknownConstant {
        /// The missing pool index.
        index: u32,
    },
    /// The constant pool grew past the 12-bit index space.
    TooManyConstants,
    /// The function body did not end in `ret`.
    MissingReturn {
        /// The offending function.
        function: String,
    },
    /// A jump or call mnemonic was given a register operand.
    NeedsLabelOperand {
        /// The offending opcode.
        opcode: Opcode,
    },
    /// A directive arrived outside a `begin_function`/`end_function` pair.
    NotBuilding,
    /// `begin_function` while a function was already open, or `patch` with
    /// an unterminated function.
    AlreadyBuilding,
    /// Two functions in the unit share a name.
    DuplicateFunction {
        /// The duplicated name.
        name: String,
    },
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instruction(e) => write!(f, "{e}"),
            Self::LabelRedefinition { label } => write!(f, "label '{label}' redefined"),
            Self::MissingLabel { label } => write!(f, "no label '{label}'"),
            Self::JumpOutOfRange { label } => {
                write!(f, "jump to '{label}' exceeds the 24-bit offset range")
            }
            Self::UnknownCallTarget { name } => write!(f, "call to unknown function '{name}'"),
            Self::RegisterOutOfRange { register, count } => {
                write!(f, "register R{register} out of range (function has {count})")
            }
            Self::TooManyRegisters { count } => {
                write!(f, "{count} registers exceed the 12-bit operand space")
            }
            Self::TooManyArguments {
                arguments,
                registers,
            } => write!(f, "{arguments} arguments but only {registers} registers"),
            Self::ReturnWithoutRegisters => {
                write!(f, "a function with zero registers cannot return a value")
            }
            Self::UnknownConstant { index } => write!(f, "no constant at index {index}"),
            Self::TooManyConstants => {
                write!(f, "constant pool exceeds the 12-bit index space")
            }
            Self::MissingReturn { function } => {
                write!(f, "function '{function}' does not end in ret")
            }
            Self::NeedsLabelOperand { opcode } => {
                write!(f, "{opcode} takes a label operand")
            }
            Self::NotBuilding => write!(f, "no function is being built"),
            Self::AlreadyBuilding => write!(f, "a function is already being built"),
            Self::DuplicateFunction { name } => write!(f, "duplicate function '{name}'"),
        }
    }
}

impl core::error::Error for AssemblerError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Instruction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InstructionError> for AssemblerError {
    fn from(e: InstructionError) -> Self {
        Self::Instruction(e)
    }
}

/// A finalized function: its symbol (layout fields still zero), its
/// instruction buffer with local jumps resolved, and the call sites left for
/// the unit-level patch.
#[derive(Clone, Debug)]
pub struct FunctionUnit {
    symbol: Symbol,
    emitter: Emitter,
    calls: Vec<(usize, String)>,
}

impl FunctionUnit {
    /// Returns the serialized size in bytes.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.emitter.byte_size()
    }

    /// Returns the function's symbol.
    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}

/// The per-function assembler.
#[derive(Clone, Debug)]
pub struct FunctionBuilder {
    name: String,
    register_count: u16,
    argument_count: u16,
    does_return: bool,
    emitter: Emitter,
    labels: HashMap<String, usize>,
    jumps: Vec<(usize, String)>,
    calls: Vec<(usize, String)>,
}

impl FunctionBuilder {
    /// Starts a function, validating its signature: arguments must fit in the
    /// register window, and a function without registers cannot return.
    pub fn new(
        name: String,
        registers: u16,
        arguments: u16,
        does_return: bool,
    ) -> Result<Self, AssemblerError> {
        if registers > MAX_REGISTERS {
            return Err(AssemblerError::TooManyRegisters { count: registers });
        }
        if arguments > registers {
            return Err(AssemblerError::TooManyArguments {
                arguments,
                registers,
            });
        }
        if registers == 0 && does_return {
            return Err(AssemblerError::ReturnWithoutRegisters);
        }
        Ok(Self {
            name,
            register_count: registers,
            argument_count: arguments,
            does_return,
            emitter: Emitter::new(),
            labels: HashMap::new(),
            jumps: Vec::new(),
            calls: Vec::new(),
        })
    }

    /// Returns the function's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds `label` to the next instruction index.
    pub fn add_label(&mut self, label: String) -> Result<(), AssemblerError> {
        let at = self.emitter.count();
        if self.labels.insert(label.clone(), at).is_some() {
            return Err(AssemblerError::LabelRedefinition { label });
        }
        Ok(())
    }

    /// Emits a jump to `label` with a placeholder offset.
    pub fn add_jump(&mut self, opcode: Opcode, label: String) -> Result<(), AssemblerError> {
        if !opcode.is_jump() {
            return Err(InstructionError::NotPatchable { opcode }.into());
        }
        let at = self.emitter.count();
        self.emitter.emit(Instruction::unary(opcode, 0)?);
        self.jumps.push((at, label));
        Ok(())
    }

    /// Emits a `call` to `target` with a placeholder offset.
    pub fn add_call(&mut self, target: String) -> Result<(), AssemblerError> {
        let at = self.emitter.count();
        self.emitter.emit(Instruction::unary(Opcode::Call, 0)?);
        self.calls.push((at, target));
        Ok(())
    }

    fn check_register(&self, register: u32) -> Result<(), AssemblerError> {
        if register >= u32::from(self.register_count) {
            return Err(AssemblerError::RegisterOutOfRange {
                register,
                count: self.register_count,
            });
        }
        Ok(())
    }

    /// Emits an arity-2 instruction. Both operands are register-bound checked,
    /// except the source of `ldconst` which indexes the constant pool and is
    /// validated by the [`Assembler`].
    pub fn add_binary(
        &mut self,
        opcode: Opcode,
        dest: u32,
        src: u32,
    ) -> Result<(), AssemblerError> {
        self.check_register(dest)?;
        if opcode != Opcode::LdConst {
            self.check_register(src)?;
        }
        self.emitter.emit(Instruction::binary(opcode, dest, src)?);
        Ok(())
    }

    /// Emits an arity-1 instruction with a register operand.
    pub fn add_unary(&mut self, opcode: Opcode, register: u32) -> Result<(), AssemblerError> {
        if opcode.is_jump() || opcode == Opcode::Call {
            return Err(AssemblerError::NeedsLabelOperand { opcode });
        }
        self.check_register(register)?;
        self.emitter.emit(Instruction::unary(opcode, register as i32)?);
        Ok(())
    }

    /// Emits an arity-0 instruction.
    pub fn add_void(&mut self, opcode: Opcode) -> Result<(), AssemblerError> {
        self.emitter.emit(Instruction::void(opcode)?);
        Ok(())
    }

    /// Resolves local jumps and closes the function.
    ///
    /// The final instruction must be `ret`. Each recorded jump's destination
    /// becomes `(label_index - jump_index) * 4` bytes, range-checked against
    /// the signed 24-bit field.
    pub fn finalize(mut self) -> Result<FunctionUnit, AssemblerError> {
        match self.emitter.count().checked_sub(1).and_then(|i| self.emitter.at(i)) {
            Some(last) if last.opcode() == Opcode::Ret => {}
            _ => {
                return Err(AssemblerError::MissingReturn {
                    function: self.name,
                });
            }
        }

        for (jump_index, label) in &self.jumps {
            let Some(&label_index) = self.labels.get(label) else {
                return Err(AssemblerError::MissingLabel {
                    label: label.clone(),
                });
            };
            let delta = (label_index as i64 - *jump_index as i64) * 4;
            if !(MIN_JUMP_BYTES..=MAX_JUMP_BYTES).contains(&delta) {
                return Err(AssemblerError::JumpOutOfRange {
                    label: label.clone(),
                });
            }
            let site = self
                .emitter
                .at_mut(*jump_index)
                .expect("recorded jump index is in range");
            site.patch_offset(delta as i32)?;
        }

        Ok(FunctionUnit {
            symbol: Symbol {
                name: self.name,
                registers: self.register_count,
                arguments: self.argument_count,
                start: 0,
                end: 0,
                does_return: self.does_return,
            },
            emitter: self.emitter,
            calls: self.calls,
        })
    }
}

/// The unit-level assembler: a directive sink over multiple functions.
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    constants: ConstantPool,
    builder: Option<FunctionBuilder>,
    functions: Vec<FunctionUnit>,
}

impl Assembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a function.
    pub fn begin_function(
        &mut self,
        name: String,
        registers: u16,
        arguments: u16,
        does_return: bool,
    ) -> Result<(), AssemblerError> {
        if self.builder.is_some() {
            return Err(AssemblerError::AlreadyBuilding);
        }
        self.builder = Some(FunctionBuilder::new(name, registers, arguments, does_return)?);
        Ok(())
    }

    /// Closes the open function.
    pub fn end_function(&mut self) -> Result<(), AssemblerError> {
        let builder = self.builder.take().ok_or(AssemblerError::NotBuilding)?;
        self.functions.push(builder.finalize()?);
        Ok(())
    }

    fn builder(&mut self) -> Result<&mut FunctionBuilder, AssemblerError> {
        self.builder.as_mut().ok_or(AssemblerError::NotBuilding)
    }

    /// Binds a label in the open function.
    pub fn add_label(&mut self, label: String) -> Result<(), AssemblerError> {
        self.builder()?.add_label(label)
    }

    /// Emits a jump in the open function.
    pub fn add_jump(&mut self, opcode: Opcode, label: String) -> Result<(), AssemblerError> {
        self.builder()?.add_jump(opcode, label)
    }

    /// Emits a call in the open function.
    pub fn add_call(&mut self, target: String) -> Result<(), AssemblerError> {
        self.builder()?.add_call(target)
    }

    /// Emits an arity-2 instruction in the open function. `ldconst` sources
    /// must name an existing constant.
    pub fn add_binary(
        &mut self,
        opcode: Opcode,
        dest: u32,
        src: u32,
    ) -> Result<(), AssemblerError> {
        if opcode == Opcode::LdConst && !self.constants.has(src as usize) {
            return Err(AssemblerError::UnknownConstant { index: src });
        }
        self.builder()?.add_binary(opcode, dest, src)
    }

    /// Emits an arity-1 instruction in the open function.
    pub fn add_unary(&mut self, opcode: Opcode, register: u32) -> Result<(), AssemblerError> {
        self.builder()?.add_unary(opcode, register)
    }

    /// Emits an arity-0 instruction in the open function.
    pub fn add_void(&mut self, opcode: Opcode) -> Result<(), AssemblerError> {
        self.builder()?.add_void(opcode)
    }

    /// Interns `value` and emits `ldconst dest, <index>`.
    pub fn load_constant(&mut self, dest: u32, value: Value) -> Result<(), AssemblerError> {
        let index = self.constants.find_or_add(value);
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        if index > MAX_CONSTANT_INDEX {
            return Err(AssemblerError::TooManyConstants);
        }
        self.builder()?.add_binary(Opcode::LdConst, dest, index)
    }

    /// Lays out all functions, patches call sites, and produces the unit.
    pub fn patch(mut self, name: String) -> Result<ExecutionUnit, AssemblerError> {
        if self.builder.is_some() {
            return Err(AssemblerError::AlreadyBuilding);
        }

        let mut symbols = SymbolTable::new();
        let mut offset = 0u32;
        for function in &mut self.functions {
            function.symbol.start = offset;
            offset += function.byte_size() as u32;
            function.symbol.end = offset;
            symbols
                .add(function.symbol.clone())
                .map_err(|e| AssemblerError::DuplicateFunction { name: e.name })?;
        }

        let mut buffer = Vec::with_capacity(offset as usize / 4);
        for function in &mut self.functions {
            for (call_index, target) in &function.calls {
                let Some(callee) = symbols.find_by_name(target) else {
                    return Err(AssemblerError::UnknownCallTarget {
                        name: target.clone(),
                    });
                };
                let site = function
                    .emitter
                    .at_mut(*call_index)
                    .expect("recorded call index is in range");
                site.patch_offset(callee.start as i32)?;
            }
            function.emitter.serialize_into(&mut buffer);
        }

        Ok(ExecutionUnit::new(name, symbols, self.constants, buffer))
    }
}
