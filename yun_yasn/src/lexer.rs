// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The YASN scanner.
//!
//! Hand-rolled, line-tracking, and newline-significant: lines delimit
//! instructions, so `\n` is a token rather than whitespace. `#` starts a
//! comment running to the end of the line.
//!
//! `$` introduces a typed numeric literal. The tag is chosen by shape and
//! width suffix: a fraction makes `Float64` (`f` suffix: `Float32`); integers
//! default to `Int32` and take `l` (`Int64`), `u` (`Uint32`), or `ul`
//! (`Uint64`).

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use hashbrown::HashMap;

use yun::opcode::Opcode;
use yun::value::Value;

use crate::ParseError;
use crate::token::{Token, TokenKind};

/// The YASN scanner.
pub struct Lexer<'a> {
    src: &'a [u8],
    start: usize,
    current: usize,
    line: u32,
    keywords: HashMap<&'static str, Opcode>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Creates a scanner over `source`.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        let mut keywords = HashMap::with_capacity(Opcode::ALL.len());
        for &op in Opcode::ALL {
            keywords.insert(op.mnemonic(), op);
        }
        Self {
            src: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
            keywords,
            tokens: Vec::new(),
        }
    }

    /// Scans the whole source, ending with an [`TokenKind::Eof`] token.
    pub fn scan(mut self) -> Result<Vec<Token>, ParseError> {
        while self.has_next() {
            self.start = self.current;
            self.next()?;
        }
        self.add(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn has_next(&self) -> bool {
        self.current < self.src.len()
    }

    fn peek(&self) -> u8 {
        if self.has_next() { self.src[self.current] } else { 0 }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 < self.src.len() {
            self.src[self.current + 1]
        } else {
            0
        }
    }

    fn advance(&mut self) -> u8 {
        let c = self.src[self.current];
        self.current += 1;
        c
    }

    fn add(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn next(&mut self) -> Result<(), ParseError> {
        let c = self.advance();
        match c {
            b'(' => self.add(TokenKind::LeftParen),
            b')' => self.add(TokenKind::RightParen),
            b'{' => self.add(TokenKind::LeftBrace),
            b'}' => self.add(TokenKind::RightBrace),
            b'[' => self.add(TokenKind::LeftBracket),
            b']' => self.add(TokenKind::RightBracket),
            b',' => self.add(TokenKind::Comma),
            b'=' => self.add(TokenKind::Equals),
            b'\n' => {
                self.add(TokenKind::Newline);
                self.line += 1;
            }
            b' ' | b'\t' | b'\r' => {}
            b'#' => {
                while self.has_next() && self.peek() != b'\n' {
                    self.current += 1;
                }
            }
            b'$' => self.constant()?,
            _ if c.is_ascii_digit() => self.bare_number()?,
            _ if c.is_ascii_alphabetic() || c == b'_' => self.identifier()?,
            _ => return Err(self.error("unexpected character")),
        }
        Ok(())
    }

    fn text(&self, from: usize, to: usize) -> &str {
        // The scanned range is ASCII by construction.
        core::str::from_utf8(&self.src[from..to]).unwrap_or("")
    }

    /// A bare unsigned integer, as used by attribute values.
    fn bare_number(&mut self) -> Result<(), ParseError> {
        while self.peek().is_ascii_digit() {
            self.current += 1;
        }
        let text = self.text(self.start, self.current);
        let value: u64 = text
            .parse()
            .map_err(|_| self.error("integer literal out of range"))?;
        self.add(TokenKind::Number(value));
        Ok(())
    }

    /// A `$`-prefixed typed literal.
    fn constant(&mut self) -> Result<(), ParseError> {
        let digits_start = self.current;
        let negative = self.peek() == b'-';
        if negative {
            self.current += 1;
        }
        if !self.peek().is_ascii_digit() {
            return Err(self.error("expected digits after '$'"));
        }
        while self.peek().is_ascii_digit() {
            self.current += 1;
        }

        let mut is_float = false;
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.current += 1;
            while self.peek().is_ascii_digit() {
                self.current += 1;
            }
        }
        let digits_end = self.current;

        while self.peek().is_ascii_alphabetic() {
            self.current += 1;
        }
        let digits = self.text(digits_start, digits_end);
        let suffix = self.text(digits_end, self.current);

        let value = if is_float {
            match suffix {
                "" => Value::float64(
                    digits
                        .parse()
                        .map_err(|_| self.error("malformed float literal"))?,
                ),
                "f" => Value::float32(
                    digits
                        .parse()
                        .map_err(|_| self.error("malformed float literal"))?,
                ),
                _ => return Err(self.error("bad float literal suffix")),
            }
        } else {
            match suffix {
                "" => {
                    let wide: i64 = digits
                        .parse()
                        .map_err(|_| self.error("integer literal out of range"))?;
                    let narrow = i32::try_from(wide).map_err(|_| {
                        self.error("literal does not fit Int32; add a width suffix")
                    })?;
                    Value::int32(narrow)
                }
                "l" => Value::int64(
                    digits
                        .parse()
                        .map_err(|_| self.error("integer literal out of range"))?,
                ),
                "u" if !negative => Value::uint32(
                    digits
                        .parse()
                        .map_err(|_| self.error("integer literal out of range"))?,
                ),
                "ul" | "lu" if !negative => Value::uint64(
                    digits
                        .parse()
                        .map_err(|_| self.error("integer literal out of range"))?,
                ),
                "u" | "ul" | "lu" => {
                    return Err(self.error("unsigned literal cannot be negative"));
                }
                _ => return Err(self.error("bad integer literal suffix")),
            }
        };
        self.add(TokenKind::Constant(value));
        Ok(())
    }

    fn identifier(&mut self) -> Result<(), ParseError> {
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.current += 1;
        }
        let text = self.text(self.start, self.current);

        let is_register =
            text.len() > 1 && text.starts_with('R') && text[1..].bytes().all(|b| b.is_ascii_digit());

        if !is_register && self.peek() == b':' {
            let label = text.to_string();
            self.current += 1;
            self.add(TokenKind::Label(label));
            return Ok(());
        }

        if is_register {
            let index: u16 = text[1..]
                .parse()
                .map_err(|_| self.error("register index too large"))?;
            self.add(TokenKind::Register(index));
            return Ok(());
        }

        let kind = match text {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "function" => TokenKind::Function,
            "registers" => TokenKind::Registers,
            "parameters" => TokenKind::Parameters,
            "returns" => TokenKind::Returns,
            _ => match self.keywords.get(text) {
                Some(&op) => TokenKind::Instruction(op),
                None => TokenKind::Identifier(text.to_string()),
            },
        };
        self.add(kind);
        Ok(())
    }
}
