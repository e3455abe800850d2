// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The YASN parser.
//!
//! Line-oriented recursive descent over the token stream. The parser owns a
//! [`yun::asm::Assembler`] and feeds it directives as it goes; assembly
//! errors are wrapped with the source line of the offending directive.
//!
//! ```text
//! unit     := function+
//! function := '[' attr (',' attr)* ']' NL 'function' IDENT '(' ')' NL block
//! attr     := 'registers' '=' U | 'parameters' '=' U | 'returns' '=' BOOL
//! block    := '{' NL line* '}'
//! line     := [label] [instr [operand [',' operand]]] NL
//! ```

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use yun::asm::{Assembler, AssemblerError};
use yun::opcode::Opcode;
use yun::unit::ExecutionUnit;

use crate::ParseError;
use crate::token::{Token, TokenKind};

#[derive(Default)]
struct Attributes {
    registers: Option<u16>,
    parameters: Option<u16>,
    returns: Option<bool>,
}

/// The YASN parser.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    assembler: Assembler,
}

impl Parser {
    /// Creates a parser over `tokens` (as produced by
    /// [`Lexer::scan`](crate::lexer::Lexer::scan)).
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            assembler: Assembler::new(),
        }
    }

    /// Parses every function and patches the unit under `name`.
    pub fn parse(mut self, name: &str) -> Result<ExecutionUnit, ParseError> {
        self.skip_newlines();
        while self.peek().kind != TokenKind::Eof {
            self.function()?;
            self.skip_newlines();
        }
        let line = self.line();
        asm(line, self.assembler.patch(name.to_string()))
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.current += 1;
        }
        token
    }

    fn line(&self) -> u32 {
        self.peek().line
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.current += 1;
        }
    }

    fn syntax(line: u32, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        let token = self.next();
        if token.kind == *kind {
            Ok(())
        } else {
            Err(Self::syntax(
                token.line,
                alloc::format!("expected {}, found {}", kind.describe(), token.kind),
            ))
        }
    }

    fn function(&mut self) -> Result<(), ParseError> {
        let attributes = self.attributes()?;

        let decl_line = self.line();
        self.expect(&TokenKind::Function)?;
        let token = self.next();
        let TokenKind::Identifier(name) = token.kind else {
            return Err(Self::syntax(
                token.line,
                alloc::format!("expected function name, found {}", token.kind),
            ));
        };
        self.expect(&TokenKind::LeftParen)?;
        self.expect(&TokenKind::RightParen)?;
        self.expect(&TokenKind::Newline)?;

        asm(
            decl_line,
            self.assembler.begin_function(
                name,
                attributes.registers.unwrap_or(0),
                attributes.parameters.unwrap_or(0),
                attributes.returns.unwrap_or(false),
            ),
        )?;

        self.block()?;

        let line = self.line();
        asm(line, self.assembler.end_function())
    }

    fn attributes(&mut self) -> Result<Attributes, ParseError> {
        self.skip_newlines();
        self.expect(&TokenKind::LeftBracket)?;

        let mut attributes = Attributes::default();
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::Registers => {
                    if attributes.registers.is_some() {
                        return Err(Self::syntax(token.line, "attribute 'registers' given twice"));
                    }
                    attributes.registers = Some(self.attribute_count(token.line, "registers")?);
                }
                TokenKind::Parameters => {
                    if attributes.parameters.is_some() {
                        return Err(Self::syntax(
                            token.line,
                            "attribute 'parameters' given twice",
                        ));
                    }
                    attributes.parameters = Some(self.attribute_count(token.line, "parameters")?);
                }
                TokenKind::Returns => {
                    if attributes.returns.is_some() {
                        return Err(Self::syntax(token.line, "attribute 'returns' given twice"));
                    }
                    self.expect(&TokenKind::Equals)?;
                    let value = self.next();
                    attributes.returns = Some(match value.kind {
                        TokenKind::True => true,
                        TokenKind::False => false,
                        other => {
                            return Err(Self::syntax(
                                value.line,
                                alloc::format!("expected boolean, found {other}"),
                            ));
                        }
                    });
                }
                other => {
                    return Err(Self::syntax(
                        token.line,
                        alloc::format!("expected attribute, found {other}"),
                    ));
                }
            }

            if self.peek().kind == TokenKind::Comma {
                self.current += 1;
            } else {
                break;
            }
        }

        self.expect(&TokenKind::RightBracket)?;
        self.expect(&TokenKind::Newline)?;
        Ok(attributes)
    }

    fn attribute_count(&mut self, line: u32, name: &str) -> Result<u16, ParseError> {
        self.expect(&TokenKind::Equals)?;
        let token = self.next();
        let TokenKind::Number(value) = token.kind else {
            return Err(Self::syntax(
                token.line,
                alloc::format!("expected unsigned value for '{name}', found {}", token.kind),
            ));
        };
        u16::try_from(value)
            .map_err(|_| Self::syntax(line, alloc::format!("attribute '{name}' out of range")))
    }

    fn block(&mut self) -> Result<(), ParseError> {
        self.skip_newlines();
        self.expect(&TokenKind::LeftBrace)?;
        self.expect(&TokenKind::Newline)?;

        loop {
            self.skip_newlines();
            match self.peek().kind {
                TokenKind::RightBrace => {
                    self.current += 1;
                    return Ok(());
                }
                TokenKind::Eof => {
                    return Err(Self::syntax(self.line(), "unterminated function block"));
                }
                _ => self.instruction_line()?,
            }
        }
    }

    fn instruction_line(&mut self) -> Result<(), ParseError> {
        let mut token = self.next();

        if let TokenKind::Label(label) = token.kind {
            asm(token.line, self.assembler.add_label(label))?;
            token = self.next();
            // A label may stand alone on its line.
            if token.kind == TokenKind::Newline {
                return Ok(());
            }
        }

        let TokenKind::Instruction(opcode) = token.kind else {
            return Err(Self::syntax(
                token.line,
                alloc::format!("expected instruction, found {}", token.kind),
            ));
        };
        let line = token.line;

        match opcode.operand_count() {
            0 => asm(line, self.assembler.add_void(opcode))?,
            1 => {
                let operand = self.next();
                if opcode.is_jump() || opcode == Opcode::Call {
                    let TokenKind::Identifier(target) = operand.kind else {
                        return Err(Self::syntax(
                            operand.line,
                            alloc::format!("{opcode} expects a target name"),
                        ));
                    };
                    if opcode == Opcode::Call {
                        asm(line, self.assembler.add_call(target))?;
                    } else {
                        asm(line, self.assembler.add_jump(opcode, target))?;
                    }
                } else {
                    let TokenKind::Register(register) = operand.kind else {
                        return Err(Self::syntax(
                            operand.line,
                            alloc::format!("{opcode} expects a register"),
                        ));
                    };
                    asm(line, self.assembler.add_unary(opcode, u32::from(register)))?;
                }
            }
            _ => {
                let dest = self.next();
                let TokenKind::Register(dest) = dest.kind else {
                    return Err(Self::syntax(
                        dest.line,
                        alloc::format!("{opcode} expects a destination register"),
                    ));
                };
                self.expect(&TokenKind::Comma)?;

                let source = self.next();
                if opcode == Opcode::LdConst {
                    let TokenKind::Constant(value) = source.kind else {
                        return Err(Self::syntax(
                            source.line,
                            alloc::format!("ldconst expects a '$' literal, found {}", source.kind),
                        ));
                    };
                    asm(line, self.assembler.load_constant(u32::from(dest), value))?;
                } else {
                    let TokenKind::Register(source) = source.kind else {
                        return Err(Self::syntax(
                            source.line,
                            alloc::format!("{opcode} expects a source register"),
                        ));
                    };
                    asm(
                        line,
                        self.assembler
                            .add_binary(opcode, u32::from(dest), u32::from(source)),
                    )?;
                }
            }
        }

        self.expect(&TokenKind::Newline)
    }
}

fn asm<T>(line: u32, result: Result<T, AssemblerError>) -> Result<T, ParseError> {
    result.map_err(|error| ParseError::Assembler { line, error })
}
