//! Reentrancy scanner.
//!
//! A path is suspicious when it performs a value-moving call and later
//! writes storage. For every such call the scanner reports where a lock is
//! needed, and looks for the function selectors the call's value depends
//! on: each recognised selector names a function that should be locked as a
//! whole.

use crate::dependency::{checkpoint_tree, DTree};
use crate::errors::AnalysisError;
use crate::expr::Expr;
use crate::locator::{SourceLocator, SourceRange};
use crate::vm::Exploration;
use log::{debug, info, warn};
use primitive_types::U256;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LockKind {
    /// Lock the whole statement destructuring the call's results.
    #[serde(rename = "lock:tuple")]
    Tuple,
    /// Lock the call expression.
    #[serde(rename = "lock:nontuple")]
    NonTuple,
    /// Lock a whole function.
    #[serde(rename = "lock:function")]
    Function,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Tuple => "lock:tuple",
            LockKind::NonTuple => "lock:nontuple",
            LockKind::Function => "lock:function",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A range to lock, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub range: [usize; 2],
    pub operator: LockKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
}

impl Finding {
    pub fn new(range: [usize; 2], operator: LockKind, result_type: Option<String>) -> Self {
        Self { range, operator, result_type }
    }
}

/// Scanner output: findings in discovery order, function locks last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub findings: Vec<Finding>,
    pub selectors: BTreeSet<u32>,
}

pub struct Reentrancy<'a, L: SourceLocator + ?Sized> {
    exploration: &'a Exploration,
    locator: &'a L,
}

impl<'a, L: SourceLocator + ?Sized> Reentrancy<'a, L> {
    pub fn new(exploration: &'a Exploration, locator: &'a L) -> Self {
        Self { exploration, locator }
    }

    pub fn scan(&self) -> Result<Scan, AnalysisError> {
        let mut scan = Scan::default();
        // Findings are keyed by call site and the call expression produced.
        let mut reported: HashSet<(usize, String)> = HashSet::new();
        let mut dispatched: HashMap<usize, BTreeSet<u32>> = HashMap::new();

        for endpoint in &self.exploration.endpoints {
            let steps = endpoint.ep.steps();
            for call in endpoint.ep.calls() {
                if !steps.iter().skip(call.position + 1).any(|s| s.name() == "SSTORE") {
                    continue;
                }
                let checkpoint = self
                    .exploration
                    .checkpoints
                    .get(call.checkpoint)
                    .ok_or(AnalysisError::UnknownCheckpoint(call.checkpoint))?;
                let pc = checkpoint.pc();
                if let Entry::Vacant(slot) = dispatched.entry(call.checkpoint) {
                    let tree = checkpoint_tree(checkpoint)?;
                    slot.insert(selectors(&tree));
                }

                let call_expr = steps
                    .get(call.position + 1)
                    .and_then(|s| s.stack.last())
                    .map(ToString::to_string)
                    .unwrap_or_default();
                if !reported.insert((pc, call_expr)) {
                    continue;
                }
                info!("storage written after value call at {pc:#x}");
                match self.locator.locate(pc) {
                    Some(range) => scan.findings.push(self.lock(range)),
                    None => warn!("no source range for call at {pc:#x}"),
                }
            }
        }

        scan.selectors = dispatched.into_values().flatten().collect();
        for &selector in &scan.selectors {
            match self.locator.function_range(selector) {
                Some(range) => scan.findings.push(Finding::new([range.start, range.end()], LockKind::Function, None)),
                None => debug!("selector {selector:#010x} maps to no function"),
            }
        }
        Ok(scan)
    }

    fn lock(&self, range: SourceRange) -> Finding {
        let construct = self.locator.construct(range);
        if construct.returns_tuple {
            Finding::new([construct.statement_start, range.end()], LockKind::Tuple, None)
        } else {
            Finding::new([range.start, range.end()], LockKind::NonTuple, construct.result_type)
        }
    }
}

/// Selectors compared against in the dependency tree, taken from the
/// outermost nodes that contain a comparison.
pub fn selectors(tree: &DTree) -> BTreeSet<u32> {
    let is_cmp = |e: &Expr| selector_of(e).is_some();
    tree.first_meet(|n| !n.value().find(&is_cmp).is_empty())
        .into_iter()
        .filter_map(|i| tree.get(i))
        .flat_map(|n| n.value().find(&is_cmp).into_iter().filter_map(selector_of).collect::<Vec<_>>())
        .collect()
}

/// The selector in `EQ(selector, dispatch_word)`, in either operand order.
pub fn selector_of(e: &Expr) -> Option<u32> {
    if !e.is("EQ") {
        return None;
    }
    let ops = e.operands();
    let &[a, b] = ops.as_slice() else { return None };
    let (selector, word) = match (a.as_const(), b.as_const()) {
        (Some(c), None) => (c, b),
        (None, Some(c)) => (c, a),
        _ => return None,
    };
    (selector <= U256::from(u32::MAX) && is_dispatch_word(word)).then(|| selector.low_u32())
}

fn is_calldata_head(e: &Expr) -> bool {
    e.is("CALLDATALOAD") && e.operands().first().is_some_and(|off| off.is_zero())
}

/// The first four bytes of calldata, as `SHR(0xe0, CALLDATALOAD(0))` or
/// `AND(DIV(CALLDATALOAD(0), 2^224), 0xffffffff)`.
fn is_dispatch_word(e: &Expr) -> bool {
    let ops = e.operands();
    match (e.name(), ops.as_slice()) {
        (Some("SHR"), &[shift, value]) => shift.as_const() == Some(U256::from(0xe0u64)) && is_calldata_head(value),
        (Some("AND"), &[a, b]) => {
            let mask = U256::from(u32::MAX);
            let (m, inner) = if a.as_const() == Some(mask) { (a, b) } else { (b, a) };
            if m.as_const() != Some(mask) || !inner.is("DIV") {
                return false;
            }
            let div = inner.operands();
            matches!(div.as_slice(), &[value, divisor]
                if is_calldata_head(value) && divisor.as_const() == Some(U256::one() << 224))
        }
        _ => false,
    }
}
