//! Execution path: the full state of one branch of the exploration.
//!
//! An [`Ep`] owns its stack, its write log and the history of every step
//! executed so far. Forking clones the whole value; symbols and stack
//! snapshots are reference counted and immutable, so a clone can never
//! observe its sibling's mutations.

use crate::expr::Expr;
use crate::stack::Stack;
use crate::trace::{Store, Trace, TraceEntry};
use crate::utils::opcodes::OpcodeInfo;
use std::rc::Rc;

/// One executed instruction. `stack` is the stack *before* the instruction
/// ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub pc: usize,
    pub opcode: &'static OpcodeInfo,
    pub stack: Rc<[Expr]>,
}

impl Step {
    pub fn name(&self) -> &'static str {
        self.opcode.name
    }
}

/// A value-moving call executed on this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Index into the exploration's checkpoint list.
    pub checkpoint: usize,
    /// Step index of the `CALL` instruction.
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct Ep {
    pub stack: Stack,
    pub trace: Trace,
    steps: Vec<Step>,
    calls: Vec<CallSite>,
    /// Maximum number of visited blocks on this path.
    bound: usize,
}

impl Ep {
    pub fn new(bound: usize) -> Self {
        Self { stack: Stack::new(), trace: Trace::new(), steps: Vec::new(), calls: Vec::new(), bound }
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Append a step for `opcode` at `pc`, snapshotting the current stack.
    pub fn record(&mut self, pc: usize, opcode: &'static OpcodeInfo) {
        self.steps.push(Step { pc, opcode, stack: self.stack.snapshot() });
    }

    /// Log a write performed by the most recent step. `key_pos` and
    /// `value_pos` are the stack positions the operands were taken from.
    pub fn add_write(&mut self, pc: usize, store: Store, key_pos: usize, value_pos: usize) {
        let step = self.steps.len().saturating_sub(1);
        self.trace.add(TraceEntry { pc, step, key_pos, value_pos, store });
    }

    pub fn add_call(&mut self, call: CallSite) {
        self.calls.push(call);
    }

    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Independent path made of the first `n` steps. Its stack is the one
    /// seen by step `n - 1`, and only writes from those steps are kept.
    pub fn sub(&self, n: usize) -> Ep {
        let n = n.min(self.steps.len());
        let steps = self.steps[..n].to_vec();
        let stack = steps.last().map(|s| Stack::from_snapshot(&s.stack)).unwrap_or_default();
        Ep {
            stack,
            trace: self.trace.sub(self.trace.visible_before(n)),
            steps,
            calls: self.calls.iter().copied().filter(|c| c.position < n).collect(),
            bound: self.bound,
        }
    }

    /// Borrowed view of the whole path.
    pub fn view(&self) -> EpSlice<'_> {
        EpSlice { steps: &self.steps, trace: self.trace.entries() }
    }

    /// Program counters of the `JUMPDEST`s visited so far.
    pub fn visited_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().filter(|s| s.name() == "JUMPDEST").map(|s| s.pc)
    }

    /// Jump targets this path may no longer enter if it jumps to `target`.
    ///
    /// Once the path has visited `bound` blocks, every block is forbidden.
    /// Otherwise, when `target` has been visited more than once and two of
    /// the block sequences between successive visits are identical, the loop
    /// body brings nothing new and `target` is forbidden.
    pub fn forbidden_jumpdests(&self, target: usize) -> Vec<usize> {
        let mut pcs: Vec<usize> = self.visited_blocks().collect();
        pcs.push(target);
        if pcs.len() >= self.bound {
            return pcs;
        }
        let hits: Vec<usize> = pcs.iter().enumerate().filter(|(_, &pc)| pc == target).map(|(i, _)| i).collect();
        if hits.len() > 2 {
            let bodies: Vec<&[usize]> = hits.windows(2).map(|w| &pcs[w[0]..w[1]]).collect();
            for (i, a) in bodies.iter().enumerate() {
                if bodies[i + 1..].iter().any(|b| a == b) {
                    return vec![target];
                }
            }
        }
        Vec::new()
    }

    pub fn is_forbidden(&self, target: usize) -> bool {
        self.forbidden_jumpdests(target).contains(&target)
    }
}

/// Borrowed prefix of a path: its first steps together with the writes
/// those steps performed. Backward analysis walks these instead of cloning
/// paths.
#[derive(Debug, Clone, Copy)]
pub struct EpSlice<'a> {
    steps: &'a [Step],
    trace: &'a [TraceEntry],
}

impl<'a> EpSlice<'a> {
    /// Narrow to the first `n` steps.
    pub fn sub(&self, n: usize) -> EpSlice<'a> {
        let n = n.min(self.steps.len());
        let visible = self.trace.partition_point(|e| e.step < n);
        EpSlice { steps: &self.steps[..n], trace: &self.trace[..visible] }
    }

    /// What a read saw: the first `ep_size` steps and only the first
    /// `trace_size` writes.
    pub fn at_read(&self, ep_size: usize, trace_size: usize) -> EpSlice<'a> {
        let mut slice = self.sub(ep_size);
        slice.trace = &slice.trace[..trace_size.min(slice.trace.len())];
        slice
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &'a [Step] {
        self.steps
    }

    pub fn last(&self) -> Option<&'a Step> {
        self.steps.last()
    }

    /// Program counter of the last step, 0 for an empty slice.
    pub fn pc(&self) -> usize {
        self.last().map_or(0, |s| s.pc)
    }

    /// The stack seen by the last step.
    pub fn stack(&self) -> &'a [Expr] {
        match self.last() {
            Some(s) => &s.stack,
            None => &[],
        }
    }

    /// Writes visible to this prefix, oldest first.
    pub fn trace(&self) -> &'a [TraceEntry] {
        self.trace
    }
}
