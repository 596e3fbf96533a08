//! Canonical names for memory and storage locations.
//!
//! A [`Variable`] is a root (an absolute address, or the contents of another
//! variable when a pointer could not be followed) plus a list of members:
//! constant offsets, mapping keys and array indices. Two variables may alias
//! when their roots agree and their members agree position by position,
//! where a symbolic member matches anything.

pub mod local;
pub mod state;

pub use local::to_local_variable;
pub use state::to_state_variable;

use crate::ep::EpSlice;
use crate::errors::ResolveError;
use crate::expr::Expr;
use crate::trace::{Store, TraceEntry};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Root {
    /// `m_<hex>` for memory, `s_<hex>` for storage.
    Named(String),
    /// The location whose address is the value held by the inner variable.
    Nested(Box<Variable>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub root: Root,
    pub members: Vec<Expr>,
}

impl Variable {
    pub fn named(name: impl Into<String>) -> Self {
        Self { root: Root::Named(name.into()), members: Vec::new() }
    }

    pub fn nested(inner: Variable) -> Self {
        Self { root: Root::Nested(Box::new(inner)), members: Vec::new() }
    }

    pub fn with_member(mut self, member: Expr) -> Self {
        self.members.push(member);
        self
    }

    /// May these two variables denote the same location?
    pub fn alias_eq(&self, other: &Variable) -> bool {
        let roots = match (&self.root, &other.root) {
            (Root::Named(a), Root::Named(b)) => a == b,
            (Root::Nested(a), Root::Nested(b)) => a.alias_eq(b),
            _ => false,
        };
        roots
            && self.members.len() == other.members.len()
            && self.members.iter().zip(&other.members).all(|(a, b)| match (a.as_const(), b.as_const()) {
                (Some(x), Some(y)) => x == y,
                _ => true,
            })
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Root::Named(name) => write!(f, "{name}")?,
            Root::Nested(inner) => write!(f, "*({inner})")?,
        }
        for member in &self.members {
            write!(f, "[{member}]")?;
        }
        Ok(())
    }
}

/// Resolves locations along one path.
///
/// The key of every write is resolved once, in the prefix ending with that
/// write, and stored by trace index. Finding the last write to a location
/// then compares stored keys instead of resolving the whole history again.
/// Contexts handed to a resolver must be prefixes of the path it was built
/// over.
pub struct Resolver {
    keys: Vec<Result<Variable, ResolveError>>,
}

impl Resolver {
    pub fn new(ep: EpSlice<'_>) -> Self {
        let mut resolver = Self { keys: Vec::with_capacity(ep.trace().len()) };
        // Each key only looks at writes before its own, which are already
        // resolved.
        for entry in ep.trace() {
            let key = resolver.resolve_key(entry, ep);
            resolver.keys.push(key);
        }
        resolver
    }

    /// Canonical variable for the memory word at `loc`, a value living in
    /// `ctx`.
    pub fn local(&self, loc: &Expr, ctx: EpSlice<'_>) -> Result<Variable, ResolveError> {
        Ok(local::address(loc, ctx, self, 0)?.into_variable())
    }

    /// Canonical variable for the storage slot `slot`, a value living in
    /// `ctx`.
    pub fn state(&self, slot: &Expr, ctx: EpSlice<'_>) -> Result<Variable, ResolveError> {
        state::resolve(slot, ctx, self, 0)
    }

    /// Resolved key of `entry`, the write at `index` in the trace of `ctx`.
    pub fn key(&self, index: usize, entry: &TraceEntry, ctx: EpSlice<'_>) -> Result<Cow<'_, Variable>, ResolveError> {
        match self.keys.get(index) {
            Some(Ok(key)) => Ok(Cow::Borrowed(key)),
            Some(Err(e)) => Err(e.clone()),
            None => self.resolve_key(entry, ctx).map(Cow::Owned),
        }
    }

    fn resolve_key(&self, entry: &TraceEntry, ctx: EpSlice<'_>) -> Result<Variable, ResolveError> {
        let at_write = ctx.sub(entry.step + 1);
        match &entry.store {
            Store::Memory { loc, .. } => self.local(loc, at_write),
            Store::Storage { slot, .. } => self.state(slot, at_write),
        }
    }
}
