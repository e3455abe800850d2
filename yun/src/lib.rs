// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `yun`: a register-based bytecode virtual machine for a statically-typed,
//! numerically-oriented low-level language.
//!
//! The crate covers the whole execution pipeline: the tagged value model, the
//! opcode table, the packed 32-bit instruction encoding, the two-level
//! assembler (per-function label resolution, unit-level call patching), and
//! the interpreter with its register windows, call-frame discipline, and
//! reference-counted array heap. The textual YASN frontend lives in the
//! sibling `yun_yasn` crate and drives [`asm::Assembler`] directly.
//!
//! ## Example
//!
//! ```no_run
//! extern crate alloc;
//!
//! use alloc::string::ToString;
//!
//! use yun::asm::Assembler;
//! use yun::opcode::Opcode;
//! use yun::value::Value;
//! use yun::vm::Vm;
//!
//! let mut a = Assembler::new();
//! a.begin_function("main".to_string(), 2, 0, false)?;
//! a.load_constant(0, Value::int32(2))?;
//! a.load_constant(1, Value::int32(3))?;
//! a.add_binary(Opcode::I32Add, 0, 1)?;
//! a.add_void(Opcode::Ret)?;
//! a.end_function()?;
//! let unit = a.patch("example".to_string())?;
//!
//! let mut vm = Vm::new(unit);
//! vm.run().unwrap();
//! assert_eq!(vm.register(0), Value::int32(5));
//! # Ok::<(), yun::asm::AssemblerError>(())
//! ```

#![no_std]

extern crate alloc;

pub mod asm;
pub mod containers;
pub mod disasm;
pub mod emit;
pub mod opcode;
pub mod unit;
pub mod value;
pub mod vm;
