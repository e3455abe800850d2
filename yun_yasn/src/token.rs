// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tokens produced by the YASN lexer.

use alloc::string::String;
use core::fmt;

use yun::opcode::Opcode;
use yun::value::Value;

/// A token kind, carrying its payload where one exists.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// `(`.
    LeftParen,
    /// `)`.
    RightParen,
    /// `{`.
    LeftBrace,
    /// `}`.
    RightBrace,
    /// `[`.
    LeftBracket,
    /// `]`.
    RightBracket,
    /// `,`.
    Comma,
    /// `=`.
    Equals,
    /// End of a source line.
    Newline,
    /// A bare unsigned integer (attribute values).
    Number(u64),
    /// A `$`-prefixed typed literal (constant operands).
    Constant(Value),
    /// `true`.
    True,
    /// `false`.
    False,
    /// A plain identifier (function names, jump targets).
    Identifier(String),
    /// `name:` at the start of a line.
    Label(String),
    /// The `function` keyword.
    Function,
    /// The `registers` attribute keyword.
    Registers,
    /// The `parameters` attribute keyword.
    Parameters,
    /// The `returns` attribute keyword.
    Returns,
    /// An instruction mnemonic.
    Instruction(Opcode),
    /// `R<n>`.
    Register(u16),
    /// End of input.
    Eof,
}

impl TokenKind {
    /// A short human-readable description, for diagnostics.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::LeftParen => "'('",
            Self::RightParen => "')'",
            Self::LeftBrace => "'{'",
            Self::RightBrace => "'}'",
            Self::LeftBracket => "'['",
            Self::RightBracket => "']'",
            Self::Comma => "','",
            Self::Equals => "'='",
            Self::Newline => "newline",
            Self::Number(_) => "number",
            Self::Constant(_) => "constant",
            Self::True | Self::False => "boolean",
            Self::Identifier(_) => "identifier",
            Self::Label(_) => "label",
            Self::Function => "'function'",
            Self::Registers => "'registers'",
            Self::Parameters => "'parameters'",
            Self::Returns => "'returns'",
            Self::Instruction(_) => "instruction",
            Self::Register(_) => "register",
            Self::Eof => "end of input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Constant(v) => write!(f, "${v}"),
            Self::Identifier(name) => write!(f, "{name}"),
            Self::Label(name) => write!(f, "{name}:"),
            Self::Instruction(op) => write!(f, "{op}"),
            Self::Register(r) => write!(f, "R{r}"),
            other => f.write_str(other.describe()),
        }
    }
}

/// A token with its source line.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The kind and payload.
    pub kind: TokenKind,
    /// 1-based source line.
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::ToString;

    #[test]
    fn display_shows_payloads() {
        assert_eq!(format!("{}", TokenKind::Register(3)), "R3");
        assert_eq!(
            format!("{}", TokenKind::Constant(Value::int32(5))),
            "$Int32(5)"
        );
        assert_eq!(
            format!("{}", TokenKind::Label("loop".to_string())),
            "loop:"
        );
        assert_eq!(format!("{}", TokenKind::LeftBrace), "'{'");
    }
}
