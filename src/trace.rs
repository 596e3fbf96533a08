//! Append-only log of the memory and storage writes along one path.
//!
//! Reads remember how long the log was when they happened, and `sub(n)`
//! returns the first `n` entries, so backward analysis only ever sees the
//! writes that could have produced a given read.

use crate::expr::Expr;
use std::fmt;

/// A write event. Only writes can be recorded in a [`Trace`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Store {
    /// `MSTORE`/`MSTORE8`, or a store derived from a copy opcode.
    Memory { loc: Expr, value: Expr, size: Expr },
    Storage { slot: Expr, value: Expr },
}

impl Store {
    /// The written address.
    pub fn key(&self) -> &Expr {
        match self {
            Store::Memory { loc, .. } => loc,
            Store::Storage { slot, .. } => slot,
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            Store::Memory { value, .. } | Store::Storage { value, .. } => value,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Store::Memory { .. })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Store::Storage { .. })
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Store::Memory { loc, value, size } => write!(f, "MSTORE({loc},{value},{size})"),
            Store::Storage { slot, value } => write!(f, "SSTORE({slot},{value})"),
        }
    }
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub pc: usize,
    /// Index of the step that performed the write in its path.
    pub step: usize,
    /// Stack positions the key and value were popped from.
    pub key_pos: usize,
    pub value_pos: usize,
    pub store: Store,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add(&mut self, entry: TraceEntry) {
        debug_assert!(self.entries.last().map_or(true, |last| last.step <= entry.step));
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Independent copy of the first `n` entries (clamped to the length).
    pub fn sub(&self, n: usize) -> Trace {
        Trace { entries: self.entries[..n.min(self.entries.len())].to_vec() }
    }

    /// Number of entries written by steps before `step`.
    pub fn visible_before(&self, step: usize) -> usize {
        self.entries.partition_point(|e| e.step < step)
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TraceEntry> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Expr> {
        self.entries.iter().map(|e| e.store.key())
    }

    pub fn values(&self) -> impl Iterator<Item = &Expr> {
        self.entries.iter().map(|e| e.store.value())
    }

    /// Memory writes with their trace index.
    pub fn memory(&self) -> impl DoubleEndedIterator<Item = (usize, &TraceEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.store.is_memory())
    }

    /// Storage writes with their trace index.
    pub fn storage(&self) -> impl DoubleEndedIterator<Item = (usize, &TraceEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.store.is_storage())
    }
}
