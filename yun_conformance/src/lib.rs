// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end conformance tests for the Yun VM.
//!
//! This crate has no library code; the scenarios live in
//! `tests/conformance.rs` and exercise the full pipeline (lexer, parser,
//! assembler, interpreter) from YASN source text.
