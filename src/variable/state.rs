//! Storage slots.
//!
//! Solidity lays out mappings as `keccak(key . slot)` and dynamic arrays as
//! `keccak(slot) + index`. Both shapes are turned back into the base slot's
//! variable with the key or index as a member.

use super::local::{self, Address};
use super::{Resolver, Variable};
use crate::ep::EpSlice;
use crate::errors::{ResolveError, MAX_RESOLVE_DEPTH};
use crate::expr::{Expr, MemRead};
use primitive_types::U256;

/// Canonical variable for the storage slot `slot`, a value living in `ctx`.
pub fn to_state_variable(slot: &Expr, ctx: EpSlice<'_>) -> Result<Variable, ResolveError> {
    Resolver::new(ctx).state(slot, ctx)
}

fn unsupported(slot: &Expr) -> ResolveError {
    ResolveError::Unsupported { space: "storage", expr: slot.to_string() }
}

pub(crate) fn resolve(slot: &Expr, ctx: EpSlice<'_>, keys: &Resolver, depth: usize) -> Result<Variable, ResolveError> {
    if depth > MAX_RESOLVE_DEPTH {
        return Err(ResolveError::TooDeep(MAX_RESOLVE_DEPTH));
    }
    if let Some(at) = slot.as_const() {
        return Ok(Variable::named(format!("s_{at:x}")));
    }
    if let Some(range) = slot.as_sha3() {
        return hashed(slot, range, ctx, keys, depth);
    }
    if slot.is("ADD") {
        let ops = slot.operands();
        if let &[a, b] = ops.as_slice() {
            let (base, offset) = match (a.contains_op("SHA3"), b.contains_op("SHA3")) {
                (true, false) => (a, b),
                (false, true) => (b, a),
                _ => return Err(unsupported(slot)),
            };
            return Ok(resolve(base, ctx, keys, depth + 1)?.with_member(offset.clone()));
        }
    }
    Err(unsupported(slot))
}

/// `SHA3` over a constant memory range: 64 bytes is a mapping entry
/// (`key . slot`), 32 bytes is the data area of a dynamic array.
fn hashed(
    slot: &Expr,
    range: &MemRead,
    ctx: EpSlice<'_>,
    keys: &Resolver,
    depth: usize,
) -> Result<Variable, ResolveError> {
    let seen = ctx.at_read(range.ep_size, range.trace_size);
    let at = match local::address(&range.loc, seen, keys, depth + 1)? {
        Address::Absolute(at) => at,
        Address::Relative(_) => return Err(unsupported(slot)),
    };
    let base_at = match range.size.as_usize() {
        Some(64) => at.overflowing_add(U256::from(32u64)).0,
        Some(32) => at,
        _ => return Err(unsupported(slot)),
    };
    let base = local::word_at(base_at, seen, keys)?.ok_or_else(|| unsupported(slot))?;
    let var = resolve(base.store.value(), seen.sub(base.step + 1), keys, depth + 1)?;
    if base_at == at {
        return Ok(var.with_member(Expr::op("SHA3", Vec::new())));
    }
    let key = match local::word_at(at, seen, keys)? {
        Some(write) => write.store.value().clone(),
        // Never written on this path: any key.
        None => Expr::mload(MemRead {
            loc: Expr::Const(at),
            size: Expr::val(32),
            trace_size: range.trace_size,
            ep_size: range.ep_size,
        }),
    };
    Ok(var.with_member(key))
}
