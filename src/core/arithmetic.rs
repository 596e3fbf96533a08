//! Concrete EVM arithmetic operations.
//!
//! All functions operate on `U256` and wrap modulo 2^256. Signed variants
//! interpret their operands as two's-complement. A zero divisor or modulus
//! yields zero rather than trapping.

use primitive_types::{U256, U512};

const UINT_256_MAX: U256 = U256::MAX;

// ---------------------------------------------------------------------------
// Two's-complement helpers
// ---------------------------------------------------------------------------

fn is_negative(value: U256) -> bool {
    value.bit(255)
}

fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

/// Magnitude of a two's-complement value.
fn abs(value: U256) -> U256 {
    if is_negative(value) { negate(value) } else { value }
}

/// Low 256 bits of a 512-bit intermediate.
fn u512_to_u256(v: U512) -> U256 {
    let limbs = v.0;
    U256([limbs[0], limbs[1], limbs[2], limbs[3]])
}

fn flag(b: bool) -> U256 {
    if b { U256::one() } else { U256::zero() }
}

// ---------------------------------------------------------------------------
// Arithmetic operations
// ---------------------------------------------------------------------------

/// EVM ADD: wrapping addition mod 2^256.
pub fn add(a: U256, b: U256) -> U256 {
    a.overflowing_add(b).0
}

/// EVM SUB: wrapping subtraction mod 2^256.
pub fn sub(a: U256, b: U256) -> U256 {
    a.overflowing_sub(b).0
}

/// EVM MUL: wrapping multiplication mod 2^256.
pub fn mul(a: U256, b: U256) -> U256 {
    a.overflowing_mul(b).0
}

/// EVM DIV: unsigned integer division (returns 0 on divide-by-zero).
pub fn div(a: U256, b: U256) -> U256 {
    if b.is_zero() { U256::zero() } else { a / b }
}

/// EVM SDIV: signed division truncating toward zero.
pub fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let q = abs(a) / abs(b);
    if is_negative(a) != is_negative(b) { negate(q) } else { q }
}

/// EVM MOD: unsigned modulo (returns 0 when modulus is zero).
pub fn modulo(a: U256, b: U256) -> U256 {
    if b.is_zero() { U256::zero() } else { a % b }
}

/// EVM SMOD: signed modulo, result takes the sign of the dividend.
pub fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let r = abs(a) % abs(b);
    if is_negative(a) { negate(r) } else { r }
}

/// EVM ADDMOD: `(a + b) % m` over a 512-bit intermediate.
pub fn addmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    u512_to_u256((U512::from(a) + U512::from(b)) % U512::from(m))
}

/// EVM MULMOD: `(a * b) % m` over a 512-bit intermediate.
pub fn mulmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    u512_to_u256((U512::from(a) * U512::from(b)) % U512::from(m))
}

/// EVM EXP: `base^exponent mod 2^256` by square-and-multiply.
pub fn exp(base: U256, exponent: U256) -> U256 {
    let mut result = U256::one();
    let mut b = base;
    let mut e = exponent;
    while !e.is_zero() {
        if e.bit(0) {
            result = result.overflowing_mul(b).0;
        }
        e >>= 1;
        if !e.is_zero() {
            b = b.overflowing_mul(b).0;
        }
    }
    result
}

/// EVM SIGNEXTEND: extend the sign bit of the byte at index `bits`.
pub fn signextend(bits: U256, value: U256) -> U256 {
    if bits >= U256::from(31u64) {
        return value;
    }
    let bit_index = (bits.low_u64() * 8 + 7) as usize;
    let sign_bit = U256::one() << bit_index;
    let low_mask = sign_bit - U256::one();
    if value.bit(bit_index) {
        value | (UINT_256_MAX ^ low_mask)
    } else {
        value & low_mask
    }
}

// -- Comparison operations -------------------------------------------------

pub fn lt(a: U256, b: U256) -> U256 {
    flag(a < b)
}

pub fn gt(a: U256, b: U256) -> U256 {
    flag(a > b)
}

/// EVM SLT: signed less-than comparison (two's complement).
pub fn slt(a: U256, b: U256) -> U256 {
    flag(match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        // Same sign: the unsigned order agrees with the signed one.
        _ => a < b,
    })
}

/// EVM SGT: signed greater-than comparison (two's complement).
pub fn sgt(a: U256, b: U256) -> U256 {
    slt(b, a)
}

pub fn eq(a: U256, b: U256) -> U256 {
    flag(a == b)
}

pub fn iszero(a: U256) -> U256 {
    flag(a.is_zero())
}

// -- Bitwise operations ----------------------------------------------------

/// EVM BYTE: the `position`-th most significant byte of `value`.
pub fn byte_op(position: U256, value: U256) -> U256 {
    if position >= U256::from(32u64) {
        U256::zero()
    } else {
        let shift = (31 - position.low_u64()) * 8;
        (value >> shift as usize) & U256::from(0xFFu64)
    }
}

pub fn shl(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256u64) {
        U256::zero()
    } else {
        value << shift.low_u64() as usize
    }
}

pub fn shr(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256u64) {
        U256::zero()
    } else {
        value >> shift.low_u64() as usize
    }
}

/// EVM SAR: arithmetic shift right, filling with the sign bit.
pub fn sar(shift: U256, value: U256) -> U256 {
    let negative = is_negative(value);
    if shift >= U256::from(256u64) {
        return if negative { UINT_256_MAX } else { U256::zero() };
    }
    let n = shift.low_u64() as usize;
    let shifted = value >> n;
    if negative && n > 0 {
        shifted | !(UINT_256_MAX >> n)
    } else {
        shifted
    }
}

// ---------------------------------------------------------------------------
// Dispatch table
// ---------------------------------------------------------------------------

/// Evaluate a concrete opcode over its popped operands (top of stack first).
/// Returns `None` if the opcode is not a pure arithmetic one.
pub fn eval_concrete(op: &str, args: &[U256]) -> Option<U256> {
    match (op, args) {
        ("ADD", [a, b])          => Some(add(*a, *b)),
        ("SUB", [a, b])          => Some(sub(*a, *b)),
        ("MUL", [a, b])          => Some(mul(*a, *b)),
        ("DIV", [a, b])          => Some(div(*a, *b)),
        ("SDIV", [a, b])         => Some(sdiv(*a, *b)),
        ("MOD", [a, b])          => Some(modulo(*a, *b)),
        ("SMOD", [a, b])         => Some(smod(*a, *b)),
        ("ADDMOD", [a, b, c])    => Some(addmod(*a, *b, *c)),
        ("MULMOD", [a, b, c])    => Some(mulmod(*a, *b, *c)),
        ("EXP", [a, b])          => Some(exp(*a, *b)),
        ("SIGNEXTEND", [a, b])   => Some(signextend(*a, *b)),
        ("LT", [a, b])           => Some(lt(*a, *b)),
        ("GT", [a, b])           => Some(gt(*a, *b)),
        ("SLT", [a, b])          => Some(slt(*a, *b)),
        ("SGT", [a, b])          => Some(sgt(*a, *b)),
        ("EQ", [a, b])           => Some(eq(*a, *b)),
        ("ISZERO", [a])          => Some(iszero(*a)),
        ("AND", [a, b])          => Some(*a & *b),
        ("OR", [a, b])           => Some(*a | *b),
        ("XOR", [a, b])          => Some(*a ^ *b),
        ("NOT", [a])             => Some(!*a),
        ("BYTE", [a, b])         => Some(byte_op(*a, *b)),
        ("SHL", [a, b])          => Some(shl(*a, *b)),
        ("SHR", [a, b])          => Some(shr(*a, *b)),
        ("SAR", [a, b])          => Some(sar(*a, *b)),
        _ => None,
    }
}

/// `true` for the opcodes `eval_concrete` understands.
pub fn is_pure(op: &str) -> bool {
    matches!(
        op,
        "ADD" | "SUB" | "MUL" | "DIV" | "SDIV" | "MOD" | "SMOD" | "ADDMOD" | "MULMOD"
            | "EXP" | "SIGNEXTEND" | "LT" | "GT" | "SLT" | "SGT" | "EQ" | "ISZERO"
            | "AND" | "OR" | "XOR" | "NOT" | "BYTE" | "SHL" | "SHR" | "SAR"
    )
}
