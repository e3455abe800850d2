// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The assembled execution unit.
//!
//! An [`ExecutionUnit`] is the read-only bundle produced by
//! [`Assembler::patch`](crate::asm::Assembler::patch): a symbol table, a
//! constant pool, and one contiguous packed instruction buffer. It is
//! immutable after assembly and may be shared between VMs.

use alloc::string::String;
use alloc::vec::Vec;

use crate::containers::{ConstantPool, Symbol, SymbolTable};
use crate::value::Value;

/// An assembled, ready-to-run unit.
#[derive(Clone, Debug)]
pub struct ExecutionUnit {
    name: String,
    symbols: SymbolTable,
    constants: ConstantPool,
    buffer: Vec<u32>,
}

impl ExecutionUnit {
    /// Bundles the parts of an assembled unit.
    #[must_use]
    pub fn new(
        name: String,
        symbols: SymbolTable,
        constants: ConstantPool,
        buffer: Vec<u32>,
    ) -> Self {
        Self {
            name,
            symbols,
            constants,
            buffer,
        }
    }

    /// Returns the unit's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the symbol table.
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Looks a function up by name.
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.find_by_name(name)
    }

    /// Looks a function up by its starting byte offset.
    #[must_use]
    pub fn symbol_at_location(&self, location: u32) -> Option<&Symbol> {
        self.symbols.find_by_location(location)
    }

    /// Returns the constant pool.
    #[must_use]
    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    /// Reads the constant at `index`.
    #[must_use]
    pub fn constant(&self, index: usize) -> Option<Value> {
        self.constants.read(index)
    }

    /// Returns the packed instruction words.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Assembler;
    use crate::opcode::Opcode;
    use alloc::string::ToString;

    #[test]
    fn lookups_over_an_assembled_unit() {
        let mut a = Assembler::new();
        a.begin_function("main".to_string(), 1, 0, false).unwrap();
        a.load_constant(0, Value::int32(5)).unwrap();
        a.add_void(Opcode::Ret).unwrap();
        a.end_function().unwrap();

        let unit = a.patch("demo".to_string()).unwrap();
        assert_eq!(unit.name(), "demo");
        assert_eq!(unit.words().len(), 2);
        assert_eq!(unit.constant(0), Some(Value::int32(5)));
        assert_eq!(unit.constant(1), None);
        assert_eq!(unit.symbol("main").unwrap().end, 8);
        assert_eq!(unit.symbol_at_location(0).unwrap().name, "main");
        assert!(unit.symbol("absent").is_none());
    }
}
