//! Extended unit tests for EVM arithmetic and concrete folding.

use evmguard::core::arithmetic::*;
use primitive_types::U256;

const MAX: U256 = U256::MAX;

fn u(v: u64) -> U256 {
    U256::from(v)
}

fn minus(v: u64) -> U256 {
    (!u(v)).overflowing_add(U256::one()).0
}

#[test]
fn test_add_overflow_wraps() {
    assert_eq!(add(MAX, u(2)), U256::one());
}

#[test]
fn test_sub_underflow_wraps() {
    assert_eq!(sub(u(3), u(5)), MAX - U256::one());
}

#[test]
fn test_mul_overflow_wraps() {
    let half = U256::one() << 255;
    assert_eq!(mul(half, u(2)), U256::zero());
}

#[test]
fn test_div_and_mod_by_zero() {
    assert_eq!(div(u(42), U256::zero()), U256::zero());
    assert_eq!(modulo(u(42), U256::zero()), U256::zero());
    assert_eq!(mulmod(u(3), u(4), U256::zero()), U256::zero());
}

#[test]
fn test_addmod_uses_full_width() {
    // (MAX + 2) mod 3 computed without wrapping first.
    assert_eq!(addmod(MAX, u(2), u(3)), u(2));
    assert_eq!(mulmod(MAX, MAX, u(7)), {
        let m = MAX % u(7);
        (m * m) % u(7)
    });
}

#[test]
fn test_sdiv_negative_dividend() {
    assert_eq!(sdiv(minus(10), u(2)), minus(5));
}

#[test]
fn test_smod() {
    assert_eq!(smod(minus(8), u(3)), minus(2));
    assert_eq!(smod(u(8), minus(3)), u(2));
}

#[test]
fn test_comparisons() {
    assert_eq!(lt(u(1), u(2)), U256::one());
    assert_eq!(gt(u(1), u(2)), U256::zero());
    assert_eq!(slt(minus(1), U256::zero()), U256::one());
    assert_eq!(sgt(U256::zero(), minus(1)), U256::one());
    assert_eq!(eq(u(9), u(9)), U256::one());
    assert_eq!(iszero(U256::zero()), U256::one());
}

#[test]
fn test_byte_op() {
    assert_eq!(byte_op(u(31), u(0xABCD)), u(0xCD));
    assert_eq!(byte_op(u(30), u(0xABCD)), u(0xAB));
    assert_eq!(byte_op(u(32), u(0xABCD)), U256::zero());
}

#[test]
fn test_shifts_over_256() {
    assert_eq!(shl(u(256), u(1)), U256::zero());
    assert_eq!(shr(u(256), MAX), U256::zero());
    assert_eq!(sar(u(256), minus(1)), MAX);
    assert_eq!(shl(U256::zero(), u(7)), u(7));
}

#[test]
fn test_selector_extraction_shift() {
    let word = U256::from_big_endian(&{
        let mut b = [0u8; 32];
        b[..4].copy_from_slice(&[0xa9, 0x05, 0x9c, 0xbb]);
        b
    });
    assert_eq!(shr(u(0xe0), word), u(0xa9059cbb));
}

#[test]
fn test_signextend() {
    assert_eq!(signextend(U256::zero(), u(0x80)), MAX - u(0x7F));
    assert_eq!(signextend(u(31), u(0x80)), u(0x80));
    assert_eq!(signextend(u(100), u(0x80)), u(0x80));
}

#[test]
fn test_exp() {
    assert_eq!(exp(u(3), u(4)), u(81));
    assert_eq!(exp(u(7), U256::zero()), U256::one());
    assert_eq!(exp(U256::zero(), u(5)), U256::zero());
}

#[test]
fn test_eval_concrete_operand_order() {
    // Operands are given top of stack first.
    assert_eq!(eval_concrete("SUB", &[u(10), u(3)]), Some(u(7)));
    assert_eq!(eval_concrete("DIV", &[u(10), u(3)]), Some(u(3)));
    assert_eq!(eval_concrete("SHL", &[u(4), u(1)]), Some(u(16)));
    assert_eq!(eval_concrete("LT", &[u(1), u(2)]), Some(U256::one()));
}

#[test]
fn test_eval_concrete_bitwise() {
    assert_eq!(eval_concrete("AND", &[u(0b1100), u(0b1010)]), Some(u(0b1000)));
    assert_eq!(eval_concrete("OR", &[u(0b1100), u(0b1010)]), Some(u(0b1110)));
    assert_eq!(eval_concrete("XOR", &[u(0b1100), u(0b1010)]), Some(u(0b0110)));
    assert_eq!(eval_concrete("NOT", &[U256::zero()]), Some(MAX));
}

#[test]
fn test_eval_concrete_rejects_non_pure() {
    assert_eq!(eval_concrete("SLOAD", &[U256::zero()]), None);
    assert_eq!(eval_concrete("ADD", &[u(1)]), None);
    assert!(!is_pure("CALL"));
    assert!(is_pure("SIGNEXTEND"));
}
