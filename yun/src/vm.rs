// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interpreter.
//!
//! The VM runs a fetch-decode-execute loop over the packed word stream of an
//! [`ExecutionUnit`]. The program counter advances by whole words; jumps add
//! a signed word delta decoded from their 24-bit offset field, and calls jump
//! to the absolute word index the assembler patched in.
//!
//! Execution starts at `main` (which must take no arguments and return
//! nothing) and ends when the call stack empties, when `hlt` executes, or
//! when an instruction faults. All faults abort the run; there is no
//! catch-recover.

use core::fmt;

use crate::containers::{
    ArrayHeap, CallStack, CallStackOverflow, Frame, HeapError, RangeError, RegisterArray,
};
use crate::opcode::Opcode;
use crate::unit::ExecutionUnit;
use crate::value::{ArithmeticError, TypeError, Value, ValueError};

/// Sink for `printreg` output.
///
/// The interpreter core is `no_std`, so printing is delegated to the
/// embedder: the CLI wires this to stdout, tests collect into a buffer.
pub trait Console {
    /// Called with the register index and its current value.
    fn print_register(&mut self, register: u16, value: &Value);
}

/// A [`Console`] that discards all output.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullConsole;

impl Console for NullConsole {
    fn print_register(&mut self, _register: u16, _value: &Value) {}
}

/// VM capacities.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Initial register-file size in cells (grows on demand).
    pub registers: usize,
    /// Maximum call-stack depth in frames.
    pub call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registers: 1024,
            call_depth: 1024,
        }
    }
}

/// A runtime error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VmError {
    /// Operand tag validation failed.
    Type(TypeError),
    /// Integer division or remainder by zero.
    Arithmetic(ArithmeticError),
    /// Array index out of range.
    Range(RangeError),
    /// Heap bookkeeping failed.
    Heap(HeapError),
    /// The fetched byte is not an opcode.
    UnknownOpcode {
        /// The unrecognized opcode byte.
        opcode: u8,
    },
    /// The unit has no `main`.
    MissingEntryPoint,
    /// `main` takes arguments or returns a value.
    InvalidEntryPoint,
    /// A call's patched location names no function.
    UnknownCallTarget {
        /// The byte location that failed to resolve.
        location: u32,
    },
    /// `ldconst` indexed past the constant pool.
    ConstantOutOfRange {
        /// The missing pool index.
        index: u16,
    },
    /// A register operand exceeded the active frame's window.
    RegisterOutOfRange {
        /// The offending local register index.
        register: u16,
    },
    /// The program counter left the instruction buffer.
    PcOutOfRange {
        /// The offending byte offset.
        pc: u32,
    },
    /// Too many nested calls.
    CallStackOverflow,
    /// `ret` with no frame to return to.
    CallStackUnderflow,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(e) => write!(f, "type error: {e}"),
            Self::Arithmetic(e) => write!(f, "arithmetic error: {e}"),
            Self::Range(e) => write!(f, "range error: {e}"),
            Self::Heap(e) => write!(f, "heap error: {e}"),
            Self::UnknownOpcode { opcode } => write!(f, "unknown opcode byte {opcode:#04x}"),
            Self::MissingEntryPoint => write!(f, "no 'main' function"),
            Self::InvalidEntryPoint => {
                write!(f, "'main' must take no arguments and return nothing")
            }
            Self::UnknownCallTarget { location } => {
                write!(f, "no function starts at byte offset {location:#x}")
            }
            Self::ConstantOutOfRange { index } => write!(f, "no constant at index {index}"),
            Self::RegisterOutOfRange { register } => {
                write!(f, "register R{register} outside the active frame")
            }
            Self::PcOutOfRange { pc } => write!(f, "pc {pc:#x} outside the code segment"),
            Self::CallStackOverflow => write!(f, "call stack overflow"),
            Self::CallStackUnderflow => write!(f, "call stack underflow"),
        }
    }
}

impl core::error::Error for VmError {}

impl From<TypeError> for VmError {
    fn from(e: TypeError) -> Self {
        Self::Type(e)
    }
}

impl From<ArithmeticError> for VmError {
    fn from(e: ArithmeticError) -> Self {
        Self::Arithmetic(e)
    }
}

impl From<ValueError> for VmError {
    fn from(e: ValueError) -> Self {
        match e {
            ValueError::Type(e) => Self::Type(e),
            ValueError::Arithmetic(e) => Self::Arithmetic(e),
        }
    }
}

impl From<RangeError> for VmError {
    fn from(e: RangeError) -> Self {
        Self::Range(e)
    }
}

impl From<HeapError> for VmError {
    fn from(e: HeapError) -> Self {
        Self::Heap(e)
    }
}

impl From<CallStackOverflow> for VmError {
    fn from(_: CallStackOverflow) -> Self {
        Self::CallStackOverflow
    }
}

/// A [`VmError`] annotated with the faulting instruction's byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    /// Byte offset of the faulting instruction.
    pub pc: u32,
    /// The error.
    pub error: VmError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault at {:#06x}: {}", self.pc, self.error)
    }
}

impl core::error::Error for Fault {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// What the executed instruction does to the program counter.
enum Flow {
    /// Fall through to the next word.
    Next,
    /// Add a signed word delta (taken jumps).
    Relative(i32),
    /// Jump to an absolute word index (calls and returns).
    Absolute(usize),
    /// Stop the loop.
    Halt,
}

#[inline]
fn unary_register(word: u32) -> u16 {
    ((word >> 12) & 0xFFF) as u16
}

#[inline]
fn binary_operands(word: u32) -> (u16, u16) {
    (((word >> 12) & 0xFFF) as u16, (word & 0xFFF) as u16)
}

/// Sign-extends the 24-bit offset field and converts bytes to words.
#[inline]
fn offset_words(word: u32) -> i32 {
    ((word << 8) as i32) >> 10
}

/// In-place unary value operation on a register.
macro_rules! unary_op {
    ($self:ident, $frame:ident, $word:ident, $op:expr) => {{
        let register = unary_register($word);
        let index = $self.global(*$frame, register)?;
        let mut value = $self.registers.get(index);
        ($op)(&mut value)?;
        $self.registers.set_untracked(index, value);
        Flow::Next
    }};
}

/// In-place binary value operation: `dest op= src`.
macro_rules! binary_op {
    ($self:ident, $frame:ident, $word:ident, $op:expr) => {{
        let (dest, src) = binary_operands($word);
        let rhs = $self.read(*$frame, src)?;
        let index = $self.global(*$frame, dest)?;
        let mut value = $self.registers.get(index);
        ($op)(&mut value, rhs)?;
        $self.registers.set_untracked(index, value);
        Flow::Next
    }};
}

/// Conditional jump on the comparison flags.
macro_rules! branch {
    ($self:ident, $word:ident, $cond:expr) => {{
        if ($cond)($self.flags) {
            Flow::Relative(offset_words($word))
        } else {
            Flow::Next
        }
    }};
}

/// The virtual machine.
///
/// A VM owns its register file, call stack, heap, and comparison flags; the
/// execution unit is immutable and could be shared between instances.
pub struct Vm<C: Console> {
    unit: ExecutionUnit,
    console: C,
    registers: RegisterArray,
    call_stack: CallStack,
    heap: ArrayHeap,
    flags: i32,
}

impl<C: Console> fmt::Debug for Vm<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("unit", &self.unit.name())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl Vm<NullConsole> {
    /// Creates a VM with default capacities and no `printreg` output.
    #[must_use]
    pub fn new(unit: ExecutionUnit) -> Self {
        Self::with_console(unit, NullConsole)
    }
}

impl<C: Console> Vm<C> {
    /// Creates a VM with default capacities and the given console.
    #[must_use]
    pub fn with_console(unit: ExecutionUnit, console: C) -> Self {
        Self::with_config(unit, console, Config::default())
    }

    /// Creates a VM with explicit capacities.
    #[must_use]
    pub fn with_config(unit: ExecutionUnit, console: C, config: Config) -> Self {
        Self {
            unit,
            console,
            registers: RegisterArray::with_capacity(config.registers),
            call_stack: CallStack::new(config.call_depth),
            heap: ArrayHeap::new(),
            flags: 0,
        }
    }

    /// Returns the unit being executed.
    #[must_use]
    pub fn unit(&self) -> &ExecutionUnit {
        &self.unit
    }

    /// Reads a cell of the register file by global index.
    ///
    /// After a run finishes this observes the final state of the (by then
    /// deallocated) windows, which is the conventional way to inspect a
    /// program's result.
    #[must_use]
    pub fn register(&self, index: usize) -> Value {
        self.registers.get(index)
    }

    /// Returns the array heap.
    #[must_use]
    pub fn heap(&self) -> &ArrayHeap {
        &self.heap
    }

    /// Returns the comparison flags (-1, 0, or +1).
    #[must_use]
    pub fn flags(&self) -> i32 {
        self.flags
    }

    /// Runs the unit from `main` until the call stack empties, `hlt`, or a
    /// fault.
    pub fn run(&mut self) -> Result<(), Fault> {
        let fault_at_entry = |error: VmError| Fault { pc: 0, error };

        let main = self
            .unit
            .symbol("main")
            .ok_or_else(|| fault_at_entry(VmError::MissingEntryPoint))?;
        if main.arguments != 0 || main.does_return {
            return Err(fault_at_entry(VmError::InvalidEntryPoint));
        }

        let frame = Frame {
            // Never used to resume; kept as the function's last word for
            // debuggability.
            return_address: (main.end / 4).saturating_sub(1),
            register_count: main.registers,
            keep_return_value: false,
            end: main.end,
        };
        let mut pc = (main.start / 4) as usize;

        self.call_stack
            .push(frame)
            .map_err(|e| fault_at_entry(e.into()))?;
        self.registers.allocate(frame.register_count as usize);
        let mut current = frame;

        loop {
            let pc_bytes = (pc as u32).wrapping_mul(4);
            let Some(&word) = self.unit.words().get(pc) else {
                return Err(Fault {
                    pc: pc_bytes,
                    error: VmError::PcOutOfRange { pc: pc_bytes },
                });
            };

            let flow = self
                .execute(word, pc, &mut current)
                .map_err(|error| Fault {
                    pc: pc_bytes,
                    error,
                })?;

            match flow {
                Flow::Next => pc += 1,
                Flow::Relative(delta) => pc = pc.wrapping_add_signed(delta as isize),
                Flow::Absolute(target) => pc = target,
                Flow::Halt => break,
            }
        }
        Ok(())
    }

    /// Converts a frame-local register index to a global one.
    fn global(&self, frame: Frame, register: u16) -> Result<usize, VmError> {
        if register >= frame.register_count {
            return Err(VmError::RegisterOutOfRange { register });
        }
        Ok(self.call_stack.relative_offset() + usize::from(register))
    }

    /// Reads a frame-local register.
    fn read(&self, frame: Frame, register: u16) -> Result<Value, VmError> {
        Ok(self.registers.get(self.global(frame, register)?))
    }

    #[allow(clippy::too_many_lines, reason = "one arm per opcode")]
    fn execute(&mut self, word: u32, pc: usize, current: &mut Frame) -> Result<Flow, VmError> {
        let byte = (word >> 24) as u8;
        let opcode = Opcode::from_u8(byte).ok_or(VmError::UnknownOpcode { opcode: byte })?;

        Ok(match opcode {
            Opcode::Nop => Flow::Next,
            Opcode::Hlt => Flow::Halt,

            Opcode::I32Neg => unary_op!(self, current, word, |v: &mut Value| v.negate::<i32>()),
            Opcode::I64Neg => unary_op!(self, current, word, |v: &mut Value| v.negate::<i64>()),
            Opcode::F32Neg => unary_op!(self, current, word, |v: &mut Value| v.negate::<f32>()),
            Opcode::F64Neg => unary_op!(self, current, word, |v: &mut Value| v.negate::<f64>()),
            Opcode::BNot => unary_op!(self, current, word, |v: &mut Value| v.invert()),

            Opcode::I32Add => binary_op!(self, current, word, |v: &mut Value, r| v.add::<i32>(r)),
            Opcode::I32Sub => binary_op!(self, current, word, |v: &mut Value, r| v.subtract::<i32>(r)),
            Opcode::I32Mul => binary_op!(self, current, word, |v: &mut Value, r| v.multiply::<i32>(r)),
            Opcode::I32Div => binary_op!(self, current, word, |v: &mut Value, r| v.divide::<i32>(r)),
            Opcode::I32Rem => binary_op!(self, current, word, |v: &mut Value, r| v.remainder::<i32>(r)),
            Opcode::I32And => binary_op!(self, current, word, |v: &mut Value, r| v.bit_and::<i32>(r)),
            Opcode::I32Or => binary_op!(self, current, word, |v: &mut Value, r| v.bit_or::<i32>(r)),
            Opcode::I32Xor => binary_op!(self, current, word, |v: &mut Value, r| v.bit_xor::<i32>(r)),
            Opcode::I32Shl => binary_op!(self, current, word, |v: &mut Value, r| v.shift_left::<i32>(r)),
            Opcode::I32Shr => binary_op!(self, current, word, |v: &mut Value, r| v.shift_right::<i32>(r)),

            Opcode::I64Add => binary_op!(self, current, word, |v: &mut Value, r| v.add::<i64>(r)),
            Opcode::I64Sub => binary_op!(self, current, word, |v: &mut Value, r| v.subtract::<i64>(r)),
            Opcode::I64Mul => binary_op!(self, current, word, |v: &mut Value, r| v.multiply::<i64>(r)),
            Opcode::I64Div => binary_op!(self, current, word, |v: &mut Value, r| v.divide::<i64>(r)),
            Opcode::I64Rem => binary_op!(self, current, word, |v: &mut Value, r| v.remainder::<i64>(r)),
            Opcode::I64And => binary_op!(self, current, word, |v: &mut Value, r| v.bit_and::<i64>(r)),
            Opcode::I64Or => binary_op!(self, current, word, |v: &mut Value, r| v.bit_or::<i64>(r)),
            Opcode::I64Xor => binary_op!(self, current, word, |v: &mut Value, r| v.bit_xor::<i64>(r)),
            Opcode::I64Shl => binary_op!(self, current, word, |v: &mut Value, r| v.shift_left::<i64>(r)),
            Opcode::I64Shr => binary_op!(self, current, word, |v: &mut Value, r| v.shift_right::<i64>(r)),

            Opcode::U32Add => binary_op!(self, current, word, |v: &mut Value, r| v.add::<u32>(r)),
            Opcode::U32Sub => binary_op!(self, current, word, |v: &mut Value, r| v.subtract::<u32>(r)),
            Opcode::U32Mul => binary_op!(self, current, word, |v: &mut Value, r| v.multiply::<u32>(r)),
            Opcode::U32Div => binary_op!(self, current, word, |v: &mut Value, r| v.divide::<u32>(r)),
            Opcode::U32Rem => binary_op!(self, current, word, |v: &mut Value, r| v.remainder::<u32>(r)),
            Opcode::U32And => binary_op!(self, current, word, |v: &mut Value, r| v.bit_and::<u32>(r)),
            Opcode::U32Or => binary_op!(self, current, word, |v: &mut Value, r| v.bit_or::<u32>(r)),
            Opcode::U32Xor => binary_op!(self, current, word, |v: &mut Value, r| v.bit_xor::<u32>(r)),
            Opcode::U32Shl => binary_op!(self, current, word, |v: &mut Value, r| v.shift_left::<u32>(r)),
            Opcode::U32Shr => binary_op!(self, current, word, |v: &mut Value, r| v.shift_right::<u32>(r)),

            Opcode::U64Add => binary_op!(self, current, word, |v: &mut Value, r| v.add::<u64>(r)),
            Opcode::U64Sub => binary_op!(self, current, word, |v: &mut Value, r| v.subtract::<u64>(r)),
            Opcode::U64Mul => binary_op!(self, current, word, |v: &mut Value, r| v.multiply::<u64>(r)),
            Opcode::U64Div => binary_op!(self, current, word, |v: &mut Value, r| v.divide::<u64>(r)),
            Opcode::U64Rem => binary_op!(self, current, word, |v: &mut Value, r| v.remainder::<u64>(r)),
            Opcode::U64And => binary_op!(self, current, word, |v: &mut Value, r| v.bit_and::<u64>(r)),
            Opcode::U64Or => binary_op!(self, current, word, |v: &mut Value, r| v.bit_or::<u64>(r)),
            Opcode::U64Xor => binary_op!(self, current, word, |v: &mut Value, r| v.bit_xor::<u64>(r)),
            Opcode::U64Shl => binary_op!(self, current, word, |v: &mut Value, r| v.shift_left::<u64>(r)),
            Opcode::U64Shr => binary_op!(self, current, word, |v: &mut Value, r| v.shift_right::<u64>(r)),

            Opcode::F32Add => binary_op!(self, current, word, |v: &mut Value, r| v.add::<f32>(r)),
            Opcode::F32Sub => binary_op!(self, current, word, |v: &mut Value, r| v.subtract::<f32>(r)),
            Opcode::F32Mul => binary_op!(self, current, word, |v: &mut Value, r| v.multiply::<f32>(r)),
            Opcode::F32Div => binary_op!(self, current, word, |v: &mut Value, r| v.divide::<f32>(r)),
            Opcode::F32Rem => binary_op!(self, current, word, |v: &mut Value, r| v.remainder::<f32>(r)),

            Opcode::F64Add => binary_op!(self, current, word, |v: &mut Value, r| v.add::<f64>(r)),
            Opcode::F64Sub => binary_op!(self, current, word, |v: &mut Value, r| v.subtract::<f64>(r)),
            Opcode::F64Mul => binary_op!(self, current, word, |v: &mut Value, r| v.multiply::<f64>(r)),
            Opcode::F64Div => binary_op!(self, current, word, |v: &mut Value, r| v.divide::<f64>(r)),
            Opcode::F64Rem => binary_op!(self, current, word, |v: &mut Value, r| v.remainder::<f64>(r)),

            Opcode::ConvI32ToI8 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i32, i8>()),
            Opcode::ConvI32ToI16 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i32, i16>()),
            Opcode::ConvU32ToU8 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u32, u8>()),
            Opcode::ConvU32ToU16 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u32, u16>()),
            Opcode::ConvI32ToI64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i32, i64>()),
            Opcode::ConvI32ToU64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i32, u64>()),
            Opcode::ConvI32ToU32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i32, u32>()),
            Opcode::ConvI32ToF32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i32, f32>()),
            Opcode::ConvI32ToF64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i32, f64>()),
            Opcode::ConvI64ToI32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i64, i32>()),
            Opcode::ConvI64ToU32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i64, u32>()),
            Opcode::ConvI64ToU64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i64, u64>()),
            Opcode::ConvI64ToF32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i64, f32>()),
            Opcode::ConvI64ToF64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<i64, f64>()),
            Opcode::ConvU32ToI64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u32, i64>()),
            Opcode::ConvU32ToU64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u32, u64>()),
            Opcode::ConvU32ToI32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u32, i32>()),
            Opcode::ConvU32ToF32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u32, f32>()),
            Opcode::ConvU32ToF64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u32, f64>()),
            Opcode::ConvU64ToI64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u64, i64>()),
            Opcode::ConvU64ToU32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u64, u32>()),
            Opcode::ConvU64ToI32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u64, i32>()),
            Opcode::ConvU64ToF32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u64, f32>()),
            Opcode::ConvU64ToF64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<u64, f64>()),
            Opcode::ConvF32ToI32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f32, i32>()),
            Opcode::ConvF32ToI64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f32, i64>()),
            Opcode::ConvF32ToU32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f32, u32>()),
            Opcode::ConvF32ToF64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f32, f64>()),
            Opcode::ConvF32ToU64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f32, u64>()),
            Opcode::ConvF64ToI32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f64, i32>()),
            Opcode::ConvF64ToI64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f64, i64>()),
            Opcode::ConvF64ToU32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f64, u32>()),
            Opcode::ConvF64ToU64 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f64, u64>()),
            Opcode::ConvF64ToF32 => unary_op!(self, current, word, |v: &mut Value| v.convert::<f64, f32>()),

            Opcode::Cmp => {
                let (dest, src) = binary_operands(word);
                let a = self.read(*current, dest)?;
                let b = self.read(*current, src)?;
                self.flags = a.compare_unsigned(&b)?;
                Flow::Next
            }
            Opcode::ICmp => {
                let (dest, src) = binary_operands(word);
                let a = self.read(*current, dest)?;
                let b = self.read(*current, src)?;
                self.flags = a.compare_signed(&b)?;
                Flow::Next
            }
            Opcode::FCmp => {
                let (dest, src) = binary_operands(word);
                let a = self.read(*current, dest)?;
                let b = self.read(*current, src)?;
                self.flags = a.compare_float(&b)?;
                Flow::Next
            }

            Opcode::Jmp => Flow::Relative(offset_words(word)),
            Opcode::Je => branch!(self, word, |flags| flags == 0),
            Opcode::Jne => branch!(self, word, |flags| flags != 0),
            Opcode::Jgt => branch!(self, word, |flags| flags > 0),
            Opcode::Jge => branch!(self, word, |flags| flags >= 0),
            Opcode::Jlt => branch!(self, word, |flags| flags < 0),
            Opcode::Jle => branch!(self, word, |flags| flags <= 0),

            Opcode::Call => {
                let location = (offset_words(word) as i64 * 4) as u32;
                let (registers, arguments, start, end, does_return) = {
                    let callee = self
                        .unit
                        .symbol_at_location(location)
                        .ok_or(VmError::UnknownCallTarget { location })?;
                    (
                        callee.registers,
                        callee.arguments,
                        callee.start,
                        callee.end,
                        callee.does_return,
                    )
                };

                let mut caller = *current;
                caller.return_address = (pc + 1) as u32;
                self.call_stack.push(caller)?;

                self.registers.allocate(usize::from(registers));
                if arguments > 0 {
                    self.registers.copy_arguments(
                        usize::from(registers),
                        usize::from(arguments),
                        &mut self.heap,
                    )?;
                }

                *current = Frame {
                    return_address: 0,
                    register_count: registers,
                    keep_return_value: does_return,
                    end,
                };
                Flow::Absolute((start / 4) as usize)
            }

            Opcode::Ret => {
                let popped = self.call_stack.pop().ok_or(VmError::CallStackUnderflow)?;
                if current.keep_return_value && current.register_count > 0 {
                    self.registers
                        .save_return_value(usize::from(current.register_count), &mut self.heap)?;
                }
                self.registers
                    .deallocate(usize::from(current.register_count), &mut self.heap)?;

                if self.call_stack.is_empty() {
                    Flow::Halt
                } else {
                    *current = popped;
                    Flow::Absolute(popped.return_address as usize)
                }
            }

            Opcode::LdConst => {
                let (dest, index) = binary_operands(word);
                let value = self
                    .unit
                    .constant(usize::from(index))
                    .ok_or(VmError::ConstantOutOfRange { index })?;
                let slot = self.global(*current, dest)?;
                self.registers.set(slot, value, &mut self.heap)?;
                Flow::Next
            }

            Opcode::Mov => {
                let (dest, src) = binary_operands(word);
                let value = self.read(*current, src)?;
                let slot = self.global(*current, dest)?;
                self.registers.set(slot, value, &mut self.heap)?;
                Flow::Next
            }

            Opcode::NewArray => {
                let (dest, src) = binary_operands(word);
                let size = self.read(*current, dest)?.get::<u32>()?;
                let type_code = self.read(*current, src)?.get::<u32>()?;
                let reference = self.heap.new_array(size, type_code)?;
                // The fresh reference's count is already 1 for this slot, so
                // the write is untracked. The size operand was Uint32, so no
                // release is due.
                let slot = self.global(*current, dest)?;
                self.registers
                    .set_untracked(slot, Value::reference(reference));
                Flow::Next
            }

            Opcode::ArrayCount => {
                let (dest, src) = binary_operands(word);
                let reference = self.read(*current, src)?.as_reference()?;
                let count = self.heap.array(reference.heap_id)?.count();
                let slot = self.global(*current, dest)?;
                self.registers
                    .set(slot, Value::uint64(u64::from(count)), &mut self.heap)?;
                Flow::Next
            }

            Opcode::Load => {
                let (dest, src) = binary_operands(word);
                let slot = self.global(*current, dest)?;
                let reference = self.registers.get(slot).as_reference()?;
                let index = self.read(*current, src)?.get::<u32>()?;
                let value = self.heap.array(reference.heap_id)?.load(index)?;
                self.registers.set_untracked(slot, value);
                Flow::Next
            }

            Opcode::Store => {
                let (dest, src) = binary_operands(word);
                let reference = self.read(*current, dest)?.as_reference()?;
                let value = self.read(*current, src)?;
                let array = self.heap.array_mut(reference.heap_id)?;
                if value.tag() != array.element_type() {
                    return Err(TypeError::Expected {
                        expected: array.element_type(),
                        actual: value.tag(),
                    }
                    .into());
                }
                array.store(reference.array_index, value.raw_bits())?;
                Flow::Next
            }

            Opcode::Advance => {
                let (dest, src) = binary_operands(word);
                let slot = self.global(*current, dest)?;
                let mut reference = self.registers.get(slot).as_reference()?;
                let offset = self.read(*current, src)?.get::<u32>()?;
                let count = self.heap.array(reference.heap_id)?.count();
                if offset >= count {
                    return Err(RangeError {
                        index: offset,
                        count,
                    }
                    .into());
                }
                reference.array_index = offset;
                self.registers
                    .set_untracked(slot, Value::reference(reference));
                Flow::Next
            }

            Opcode::PrintReg => {
                let register = unary_register(word);
                let value = self.read(*current, register)?;
                self.console.print_register(register, &value);
                Flow::Next
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Assembler;
    use crate::containers::{ConstantPool, Symbol, SymbolTable};
    use crate::emit::Instruction;
    use alloc::string::{String, ToString};
    use alloc::vec;
    use alloc::vec::Vec;

    struct Collecting {
        lines: Vec<(u16, String)>,
    }

    impl Console for Collecting {
        fn print_register(&mut self, register: u16, value: &Value) {
            self.lines.push((register, alloc::format!("{value}")));
        }
    }

    fn run(unit: ExecutionUnit) -> Vm<NullConsole> {
        let mut vm = Vm::new(unit);
        vm.run().unwrap();
        vm
    }

    fn simple_main(build: impl FnOnce(&mut Assembler)) -> ExecutionUnit {
        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 4, 0, false).unwrap();
        build(&mut a);
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();
        a.patch("test".to_string()).unwrap()
    }

    #[test]
    fn arithmetic_and_fallthrough() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::int32(2)).unwrap();
            a.load_constant(1, Value::int32(3)).unwrap();
            a.add_binary(Opcode::I32Add, 0, 1).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.register(0), Value::int32(5));
    }

    #[test]
    fn type_error_faults_and_reports_location() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::int32(1)).unwrap();
            a.load_constant(1, Value::uint32(1)).unwrap();
            a.add_binary(Opcode::I32Add, 0, 1).unwrap();
        });
        let mut vm = Vm::new(unit);
        let fault = vm.run().unwrap_err();
        assert_eq!(fault.pc, 8);
        assert!(matches!(fault.error, VmError::Type(_)));
        // The faulting instruction left its destination unchanged.
        assert_eq!(vm.register(0), Value::int32(1));
    }

    #[test]
    fn division_by_zero_faults() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::uint64(1)).unwrap();
            a.load_constant(1, Value::uint64(0)).unwrap();
            a.add_binary(Opcode::U64Div, 0, 1).unwrap();
        });
        let fault = Vm::new(unit).run().unwrap_err();
        assert_eq!(
            fault.error,
            VmError::Arithmetic(ArithmeticError::DivisionByZero)
        );
    }

    #[test]
    fn taken_branch_skips_the_add() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::int32(-1)).unwrap();
            a.load_constant(1, Value::int32(1)).unwrap();
            a.add_binary(Opcode::ICmp, 0, 1).unwrap();
            a.add_jump(Opcode::Jlt, "taken".to_string()).unwrap();
            a.add_binary(Opcode::I32Add, 0, 1).unwrap();
            a.add_label("taken".to_string()).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.register(0), Value::int32(-1));
        assert_eq!(vm.flags(), -1);
    }

    #[test]
    fn backward_jump_loops() {
        // Count R0 up to 3 with a backward jne.
        let unit = simple_main(|a| {
            a.load_constant(0, Value::int32(0)).unwrap();
            a.load_constant(1, Value::int32(1)).unwrap();
            a.load_constant(2, Value::int32(3)).unwrap();
            a.add_label("loop".to_string()).unwrap();
            a.add_binary(Opcode::I32Add, 0, 1).unwrap();
            a.add_binary(Opcode::ICmp, 0, 2).unwrap();
            a.add_jump(Opcode::Jne, "loop".to_string()).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.register(0), Value::int32(3));
    }

    #[test]
    fn call_copies_arguments_and_saves_return_value() {
        let mut a = Assembler::new();
        // main: R0 <- 7, R1 is the argument slot and then the return slot.
        a.begin_function("main".to_string(), 2, 0, false).unwrap();
        a.load_constant(0, Value::int32(7)).unwrap();
        a.load_constant(1, Value::int32(5)).unwrap();
        a.add_call("double".to_string()).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        // double(x) = x + x, returned in R0.
        a.begin_function("double".to_string(), 1, 1, true).unwrap();
        a.add_binary(Opcode::I32Add, 0, 0).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        let vm = run(a.patch("test".to_string()).unwrap());
        assert_eq!(vm.register(0), Value::int32(7));
        assert_eq!(vm.register(1), Value::int32(10));
    }

    #[test]
    fn printreg_reaches_the_console() {
        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 1, 0, false).unwrap();
        a.load_constant(0, Value::uint32(9)).unwrap();
        a.add_unary(Opcode::PrintReg, 0).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        let mut vm = Vm::with_console(
            a.patch("test".to_string()).unwrap(),
            Collecting { lines: Vec::new() },
        );
        vm.run().unwrap();
        assert_eq!(vm.console.lines, vec![(0, "Uint32(9)".to_string())]);
    }

    #[test]
    fn hlt_stops_without_unwinding() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::int32(1)).unwrap();
            a.add_void(Opcode::Hlt).unwrap();
            a.load_constant(0, Value::int32(2)).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.register(0), Value::int32(1));
    }

    #[test]
    fn entry_point_is_validated() {
        let mut a = Assembler::new();
        a.begin_function("not_main".to_string(), 1, 0, false).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();
        let fault = Vm::new(a.patch("test".to_string()).unwrap()).run().unwrap_err();
        assert_eq!(fault.error, VmError::MissingEntryPoint);

        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 2, 1, false).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();
        let fault = Vm::new(a.patch("test".to_string()).unwrap()).run().unwrap_err();
        assert_eq!(fault.error, VmError::InvalidEntryPoint);
    }

    #[test]
    fn running_off_the_code_segment_faults() {
        // Hand-assembled unit whose main does not end in ret.
        let mut symbols = SymbolTable::new();
        symbols
            .add(Symbol {
                name: "main".to_string(),
                registers: 1,
                arguments: 0,
                start: 0,
                end: 4,
                does_return: false,
            })
            .unwrap();
        let buffer = vec![Instruction::void(Opcode::Nop).unwrap().encode()];
        let unit = ExecutionUnit::new("raw".to_string(), symbols, ConstantPool::new(), buffer);

        let fault = Vm::new(unit).run().unwrap_err();
        assert_eq!(fault.error, VmError::PcOutOfRange { pc: 4 });
    }

    #[test]
    fn unknown_call_target_faults() {
        // A call patched to a location with no symbol.
        let mut symbols = SymbolTable::new();
        symbols
            .add(Symbol {
                name: "main".to_string(),
                registers: 1,
                arguments: 0,
                start: 0,
                end: 8,
                does_return: false,
            })
            .unwrap();
        let mut call = Instruction::unary(Opcode::Call, 0).unwrap();
        call.patch_offset(64).unwrap();
        let buffer = vec![
            call.encode(),
            Instruction::void(Opcode::Ret).unwrap().encode(),
        ];
        let unit = ExecutionUnit::new("raw".to_string(), symbols, ConstantPool::new(), buffer);

        let fault = Vm::new(unit).run().unwrap_err();
        assert_eq!(fault.error, VmError::UnknownCallTarget { location: 64 });
    }

    #[test]
    fn deep_recursion_overflows_the_call_stack() {
        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 1, 0, false).unwrap();
        a.add_call("main".to_string()).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        let mut vm = Vm::with_config(
            a.patch("test".to_string()).unwrap(),
            NullConsole,
            Config {
                registers: 64,
                call_depth: 16,
            },
        );
        let fault = vm.run().unwrap_err();
        assert_eq!(fault.error, VmError::CallStackOverflow);
    }

    #[test]
    fn mov_between_registers() {
        let unit = simple_main(|a| {
            a.load_constant(1, Value::float64(2.5)).unwrap();
            a.add_binary(Opcode::Mov, 0, 1).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.register(0), Value::float64(2.5));
    }

    #[test]
    fn conversion_retags_in_place() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::int32(-1)).unwrap();
            a.add_unary(Opcode::ConvI32ToI64, 0).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.register(0), Value::int64(-1));
    }

    #[test]
    fn array_lifecycle_through_the_interpreter() {
        let unit = simple_main(|a| {
            // R0 = size 4, R1 = element type Uint32 (code 7).
            a.load_constant(0, Value::uint32(4)).unwrap();
            a.load_constant(1, Value::uint32(7)).unwrap();
            a.add_binary(Opcode::NewArray, 0, 1).unwrap();
            // R2 <- element count.
            a.add_binary(Opcode::ArrayCount, 2, 0).unwrap();
            // Store 42 at the reference's index (0).
            a.load_constant(1, Value::uint32(42)).unwrap();
            a.add_binary(Opcode::Store, 0, 1).unwrap();
            // Advance to index 3, then back to 0, and load.
            a.load_constant(3, Value::uint32(3)).unwrap();
            a.add_binary(Opcode::Advance, 0, 3).unwrap();
            a.load_constant(3, Value::uint32(0)).unwrap();
            a.add_binary(Opcode::Advance, 0, 3).unwrap();
            a.add_binary(Opcode::Load, 0, 3).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.register(0), Value::uint32(42));
        assert_eq!(vm.register(2), Value::uint64(4));
        assert_eq!(vm.heap().ref_count(0).unwrap(), 1);
    }

    #[test]
    fn advance_past_count_is_a_range_error() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::uint32(2)).unwrap();
            a.load_constant(1, Value::uint32(7)).unwrap();
            a.add_binary(Opcode::NewArray, 0, 1).unwrap();
            a.load_constant(2, Value::uint32(2)).unwrap();
            a.add_binary(Opcode::Advance, 0, 2).unwrap();
        });
        let fault = Vm::new(unit).run().unwrap_err();
        assert_eq!(
            fault.error,
            VmError::Range(RangeError { index: 2, count: 2 })
        );
    }

    #[test]
    fn store_checks_the_element_type() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::uint32(1)).unwrap();
            a.load_constant(1, Value::uint32(7)).unwrap();
            a.add_binary(Opcode::NewArray, 0, 1).unwrap();
            a.load_constant(1, Value::int64(1)).unwrap();
            a.add_binary(Opcode::Store, 0, 1).unwrap();
        });
        let fault = Vm::new(unit).run().unwrap_err();
        assert_eq!(
            fault.error,
            VmError::Type(TypeError::Expected {
                expected: crate::value::Type::Uint32,
                actual: crate::value::Type::Int64
            })
        );
    }

    #[test]
    fn dropping_the_last_reference_frees_the_array() {
        let unit = simple_main(|a| {
            a.load_constant(0, Value::uint32(1)).unwrap();
            a.load_constant(1, Value::uint32(7)).unwrap();
            a.add_binary(Opcode::NewArray, 0, 1).unwrap();
            // Overwrite the only reference with a mediated write.
            a.load_constant(0, Value::uint32(0)).unwrap();
        });
        let vm = run(unit);
        assert_eq!(vm.heap().ref_count(0).unwrap(), 0);
    }

    #[test]
    fn frame_teardown_releases_references() {
        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 1, 0, false).unwrap();
        a.add_call("maker".to_string()).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        // maker allocates an array and returns without propagating it.
        a.begin_function("maker".to_string(), 2, 0, false).unwrap();
        a.load_constant(0, Value::uint32(1)).unwrap();
        a.load_constant(1, Value::uint32(7)).unwrap();
        a.add_binary(Opcode::NewArray, 0, 1).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        let vm = run(a.patch("test".to_string()).unwrap());
        assert_eq!(vm.heap().ref_count(0).unwrap(), 0);
    }

    #[test]
    fn returned_reference_stays_alive() {
        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 2, 0, false).unwrap();
        a.add_call("maker".to_string()).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        a.begin_function("maker".to_string(), 2, 0, true).unwrap();
        a.load_constant(0, Value::uint32(1)).unwrap();
        a.load_constant(1, Value::uint32(7)).unwrap();
        a.add_binary(Opcode::NewArray, 0, 1).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        let mut vm = Vm::new(a.patch("test".to_string()).unwrap());
        vm.run().unwrap();
        // main's R1 (the return slot) held the reference until main's own
        // teardown released it; the balance ends at zero with no faults.
        assert_eq!(vm.heap().ref_count(0).unwrap(), 0);
        assert_eq!(vm.register(1).tag(), crate::value::Type::Reference);
    }
}
