// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Criterion benchmarks for the Yun VM.
//!
//! This crate has no library code; the benchmarks live in `benches/vm.rs`.
