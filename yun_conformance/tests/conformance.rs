// Copyright 2026 the Yun Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use yun::emit::Instruction;
use yun::opcode::Opcode;
use yun::value::{Type, Value};
use yun::vm::{Vm, VmError};

fn run(source: &str) -> Vm<yun::vm::NullConsole> {
    let unit = yun_yasn::assemble(source, "conformance").expect("source must assemble");
    let mut vm = Vm::new(unit);
    vm.run().expect("program must run to completion");
    vm
}

#[test]
fn integer_arithmetic() {
    let vm = run("\
[registers=2]
function main()
{
    ldconst R0, $2
    ldconst R1, $3
    i32add R0, R1
    ret
}
");
    assert_eq!(vm.register(0), Value::int32(5));
}

#[test]
fn signed_comparison_branch() {
    let vm = run("\
[registers=2]
function main()
{
    ldconst R0, $-1
    ldconst R1, $1
    icmp R0, R1
    jlt taken
    i32add R0, R1
taken:
    ret
}
");
    // The branch is taken, so the add is skipped.
    assert_eq!(vm.register(0), Value::int32(-1));
}

#[test]
fn recursive_call_with_return_value() {
    // test(x) returns x once x >= 3, else test(x + 1). Arguments travel in
    // the caller's trailing registers; the return value lands in the
    // caller's last register.
    let vm = run("\
[registers=2]
function main()
{
    ldconst R1, $1
    call test
    mov R0, R1
    ret
}

[registers=3, parameters=1, returns=true]
function test()
{
    ldconst R1, $3
    icmp R0, R1
    jge done
    ldconst R1, $1
    mov R2, R0
    i32add R2, R1
    call test
    mov R0, R2
done:
    ret
}
");
    assert_eq!(vm.register(0), Value::int32(3));
}

#[test]
fn iterative_fibonacci() {
    let vm = run("\
[registers=6]
function main()
{
    ldconst R0, $0ul
    ldconst R1, $1ul
    ldconst R2, $1u
    ldconst R3, $20u
    ldconst R4, $1u
loop:
    mov R5, R1
    u64add R1, R0
    mov R0, R5
    u32add R2, R4
    cmp R2, R3
    jle loop
    ret
}
");
    assert_eq!(vm.register(1), Value::uint64(10946));
}

#[test]
fn array_create_store_load() {
    let vm = run("\
[registers=3]
function main()
{
    ldconst R0, $4u
    ldconst R1, $7u
    newarray R0, R1
    ldconst R1, $42u
    store R0, R1
    ldconst R2, $0u
    advance R0, R2
    load R0, R2
    ret
}
");
    assert_eq!(vm.register(0), Value::uint32(42));
    assert_eq!(vm.heap().ref_count(0).unwrap(), 1);
}

#[test]
fn type_error_on_mismatched_add() {
    let unit = yun_yasn::assemble(
        "\
[registers=2]
function main()
{
    ldconst R0, $1
    ldconst R1, $1u
    i32add R0, R1
    ret
}
",
        "conformance",
    )
    .unwrap();
    let mut vm = Vm::new(unit);
    let fault = vm.run().unwrap_err();
    assert!(matches!(fault.error, VmError::Type(_)));
    // The destination is untouched by the failed add.
    assert_eq!(vm.register(0), Value::int32(1));
}

#[test]
fn jump_to_the_next_instruction_is_a_nop() {
    let vm = run("\
[registers=2]
function main()
{
    ldconst R0, $1
    jmp next
next:
    ldconst R1, $2
    i32add R0, R1
    ret
}
");
    assert_eq!(vm.register(0), Value::int32(3));
}

#[test]
fn hlt_halts_cleanly() {
    let vm = run("\
[registers=1]
function main()
{
    ldconst R0, $9
    hlt
    ldconst R0, $1
    ret
}
");
    assert_eq!(vm.register(0), Value::int32(9));
}

#[test]
fn equal_literals_share_one_constant() {
    let unit = yun_yasn::assemble(
        "\
[registers=2]
function main()
{
    ldconst R0, $7
    ldconst R1, $7
    ret
}
",
        "conformance",
    )
    .unwrap();
    assert_eq!(unit.constants().len(), 1);
}

#[test]
fn literal_suffixes_reach_the_registers_typed() {
    let vm = run("\
[registers=6]
function main()
{
    ldconst R0, $1
    ldconst R1, $1l
    ldconst R2, $1u
    ldconst R3, $1ul
    ldconst R4, $1.5
    ldconst R5, $1.5f
    ret
}
");
    assert_eq!(vm.register(0).tag(), Type::Int32);
    assert_eq!(vm.register(1).tag(), Type::Int64);
    assert_eq!(vm.register(2).tag(), Type::Uint32);
    assert_eq!(vm.register(3).tag(), Type::Uint64);
    assert_eq!(vm.register(4), Value::float64(1.5));
    assert_eq!(vm.register(5), Value::float32(1.5));
}

#[test]
fn conversions_chain_through_widths() {
    let vm = run("\
[registers=1]
function main()
{
    ldconst R0, $-1
    convi32toi64 R0
    convi64tof64 R0
    convf64tou32 R0
    ret
}
");
    // -1.0 saturates to 0 on the float-to-unsigned cast.
    assert_eq!(vm.register(0), Value::uint32(0));
}

#[test]
fn packed_words_roundtrip_for_every_opcode() {
    for &opcode in Opcode::ALL {
        let instruction = match opcode.operand_count() {
            0 => Instruction::void(opcode).unwrap(),
            1 => {
                if opcode.is_jump() || opcode == Opcode::Call {
                    let mut i = Instruction::unary(opcode, 0).unwrap();
                    i.patch_offset(-128).unwrap();
                    i
                } else {
                    Instruction::unary(opcode, 0x0ABC).unwrap()
                }
            }
            _ => Instruction::binary(opcode, 0x0123, 0x0FFF).unwrap(),
        };
        let decoded = Instruction::decode(instruction.encode()).unwrap();
        assert_eq!(decoded, instruction, "{opcode} must roundtrip");
    }
}

#[test]
fn division_by_zero_aborts() {
    let unit = yun_yasn::assemble(
        "\
[registers=2]
function main()
{
    ldconst R0, $1
    ldconst R1, $0
    i32div R0, R1
    ret
}
",
        "conformance",
    )
    .unwrap();
    let fault = Vm::new(unit).run().unwrap_err();
    assert!(matches!(fault.error, VmError::Arithmetic(_)));
}

#[test]
fn out_of_range_load_aborts() {
    let unit = yun_yasn::assemble(
        "\
[registers=2]
function main()
{
    ldconst R0, $2u
    ldconst R1, $7u
    newarray R0, R1
    ldconst R1, $2u
    load R0, R1
    ret
}
",
        "conformance",
    )
    .unwrap();
    let fault = Vm::new(unit).run().unwrap_err();
    assert!(matches!(fault.error, VmError::Range(_)));
}
