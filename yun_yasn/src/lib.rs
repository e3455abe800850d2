// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! YASN, the textual assembly frontend for the Yun VM.
//!
//! The [`lexer`] scans a source string into a token stream; the [`parser`]
//! walks that stream line by line and drives [`yun::asm::Assembler`]
//! directly, so the output of a successful parse is a ready-to-run
//! [`yun::unit::ExecutionUnit`].
//!
//! ## Example
//!
//! ```no_run
//! extern crate alloc;
//!
//! use yun::value::Value;
//! use yun::vm::Vm;
//!
//! let source = "\
//! [registers=2, parameters=0, returns=false]
//! function main()
//! {
//!     ldconst R0, $2
//!     ldconst R1, $3
//!     i32add R0, R1
//!     ret
//! }
//! ";
//! let unit = yun_yasn::assemble(source, "example")?;
//! let mut vm = Vm::new(unit);
//! vm.run().unwrap();
//! assert_eq!(vm.register(0), Value::int32(5));
//! # Ok::<(), yun_yasn::ParseError>(())
//! ```

#![no_std]

extern crate alloc;

pub mod lexer;
pub mod parser;
pub mod token;

use alloc::string::String;
use core::fmt;

use yun::asm::AssemblerError;
use yun::unit::ExecutionUnit;

/// A frontend error, carrying the source line it was detected on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Malformed source text.
    Syntax {
        /// 1-based source line.
        line: u32,
        /// What went wrong.
        message: String,
    },
    /// The assembler rejected a directive.
    Assembler {
        /// 1-based source line of the directive.
        line: u32,
        /// The underlying assembly error.
        error: AssemblerError,
    },
}

impl ParseError {
    /// Returns the 1-based source line the error was detected on.
    #[must_use]
    pub fn line(&self) -> u32 {
        match self {
            Self::Syntax { line, .. } | Self::Assembler { line, .. } => *line,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { line, message } => write!(f, "line {line}: {message}"),
            Self::Assembler { line, error } => write!(f, "line {line}: {error}"),
        }
    }
}

impl core::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Syntax { .. } => None,
            Self::Assembler { error, .. } => Some(error),
        }
    }
}

/// Scans and parses `source` into an execution unit named `name`.
pub fn assemble(source: &str, name: &str) -> Result<ExecutionUnit, ParseError> {
    let tokens = lexer::Lexer::new(source).scan()?;
    parser::Parser::new(tokens).parse(name)
}
