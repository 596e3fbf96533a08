//! Symbolic stack used by the interpreter.
//!
//! Index 0 is the bottom. Every operation validates its target index; a
//! violation is a [`StackError`] and aborts the run, since it means either
//! malformed bytecode or an interpreter bug.

use crate::errors::{StackError, MAX_STACK_DEPTH};
use crate::expr::Expr;
use std::rc::Rc;

/// A symbolic EVM stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack {
    items: Vec<Expr>,
}

impl Stack {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Rebuild a stack from a step snapshot.
    pub fn from_snapshot(snapshot: &[Expr]) -> Self {
        Self { items: snapshot.to_vec() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, val: Expr) -> Result<(), StackError> {
        if self.items.len() >= MAX_STACK_DEPTH {
            return Err(StackError::Overflow(self.items.len() + 1));
        }
        self.items.push(val);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Expr, StackError> {
        self.items.pop().ok_or(StackError::Underflow { needed: 1, have: 0 })
    }

    /// Pop `n` items, returned top of stack first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Expr>, StackError> {
        let have = self.items.len();
        if n > have {
            return Err(StackError::Underflow { needed: n, have });
        }
        let mut popped = self.items.split_off(have - n);
        popped.reverse();
        Ok(popped)
    }

    /// Item at absolute index (0 = bottom).
    pub fn get(&self, index: usize) -> Option<&Expr> {
        self.items.get(index)
    }

    pub fn peek(&self) -> Option<&Expr> {
        self.items.last()
    }

    /// Duplicate the n-th element from the top (`DUPn`).
    pub fn dup(&mut self, n: usize) -> Result<(), StackError> {
        if n == 0 || n > self.items.len() {
            return Err(StackError::DupOutOfRange(n, self.items.len()));
        }
        let val = self.items[self.items.len() - n].clone();
        self.push(val)
    }

    /// Swap the top element with the n-th element below it (`SWAPn`).
    pub fn swap(&mut self, n: usize) -> Result<(), StackError> {
        if n == 0 || self.items.len() <= n {
            return Err(StackError::SwapOutOfRange(n, self.items.len()));
        }
        let top = self.items.len() - 1;
        self.items.swap(top, top - n);
        Ok(())
    }

    /// Immutable copy of the current contents. Items are reference counted,
    /// so this is one allocation regardless of expression sizes.
    pub fn snapshot(&self) -> Rc<[Expr]> {
        Rc::from(self.items.as_slice())
    }

    pub fn items(&self) -> &[Expr] {
        &self.items
    }
}
