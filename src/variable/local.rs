//! Memory addresses.
//!
//! Addresses are decomposed into an absolute base plus members. Pointers
//! loaded from memory are followed to the write that set them, which turns
//! offsets from the free memory pointer back into absolute addresses.

use super::{Resolver, Variable};
use crate::ep::EpSlice;
use crate::errors::{ResolveError, MAX_RESOLVE_DEPTH};
use crate::expr::Expr;
use crate::trace::TraceEntry;
use primitive_types::U256;

/// A decomposed memory address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Address {
    Absolute(U256),
    Relative(Variable),
}

impl Address {
    pub(crate) fn into_variable(self) -> Variable {
        match self {
            Address::Absolute(at) => Variable::named(format!("m_{at:x}")),
            Address::Relative(var) => var,
        }
    }

    fn offset(self, offset: &Expr) -> Address {
        match (self, offset.as_const()) {
            (Address::Absolute(base), Some(off)) => Address::Absolute(base.overflowing_add(off).0),
            (base, _) => Address::Relative(base.into_variable().with_member(offset.clone())),
        }
    }
}

/// Canonical variable for the memory word at `loc`, where `loc` is a value
/// living in `ctx`.
pub fn to_local_variable(loc: &Expr, ctx: EpSlice<'_>) -> Result<Variable, ResolveError> {
    Resolver::new(ctx).local(loc, ctx)
}

pub(crate) fn address(loc: &Expr, ctx: EpSlice<'_>, keys: &Resolver, depth: usize) -> Result<Address, ResolveError> {
    if depth > MAX_RESOLVE_DEPTH {
        return Err(ResolveError::TooDeep(MAX_RESOLVE_DEPTH));
    }
    if let Some(at) = loc.as_const() {
        return Ok(Address::Absolute(at));
    }
    if let Some(read) = loc.as_mload() {
        let seen = ctx.at_read(read.ep_size, read.trace_size);
        let pointer = address(&read.loc, seen, keys, depth + 1)?.into_variable();
        if let Some(write) = last_write(&pointer, seen, keys)? {
            match address(write.store.value(), seen.sub(write.step + 1), keys, depth + 1) {
                Ok(target) => return Ok(target),
                // A pointer that is not itself an address expression.
                Err(ResolveError::Unsupported { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        return Ok(Address::Relative(Variable::nested(pointer)));
    }
    if loc.is("ADD") {
        let ops = loc.operands();
        if let &[a, b] = ops.as_slice() {
            if let Some((base, offset)) = split_offset(a, b) {
                return Ok(address(base, ctx, keys, depth + 1)?.offset(offset));
            }
        }
    }
    Err(ResolveError::Unsupported { space: "memory", expr: loc.to_string() })
}

/// Pick the base of an `ADD`: constants and scaled indices are offsets, a
/// loaded pointer is a base.
fn split_offset<'e>(a: &'e Expr, b: &'e Expr) -> Option<(&'e Expr, &'e Expr)> {
    let is_index = |e: &Expr| e.is("MUL") || e.is("SHL");
    if b.is_const() || is_index(b) {
        Some((a, b))
    } else if a.is_const() || is_index(a) {
        Some((b, a))
    } else if a.is("MLOAD") {
        Some((a, b))
    } else if b.is("MLOAD") {
        Some((b, a))
    } else {
        None
    }
}

/// Most recent memory write in `ctx` that may have written `target`. Keys
/// come from `keys`, so no earlier write is resolved twice.
pub(crate) fn last_write<'a>(
    target: &Variable,
    ctx: EpSlice<'a>,
    keys: &Resolver,
) -> Result<Option<&'a TraceEntry>, ResolveError> {
    for (index, entry) in ctx.trace().iter().enumerate().rev().filter(|(_, e)| e.store.is_memory()) {
        if keys.key(index, entry, ctx)?.alias_eq(target) {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Most recent write to the memory word at absolute address `at`.
pub(crate) fn word_at<'a>(at: U256, ctx: EpSlice<'a>, keys: &Resolver) -> Result<Option<&'a TraceEntry>, ResolveError> {
    last_write(&Address::Absolute(at).into_variable(), ctx, keys)
}
