//! Dependency trees.
//!
//! Starting from a value, the tree records what that value was computed
//! from: the operands of an expression, and for a memory or storage read
//! every earlier write that may alias the location read. Each child lives
//! in the path prefix that produced it, so a write's value is analysed in
//! the context of the store, not of the read.
//!
//! The tree is an arena of [`DNode`]s addressed by index. A node's identity
//! is its [`NodeId`]; an identity already registered is never expanded
//! twice, which keeps the construction finite on looping paths.

use crate::ep::EpSlice;
use crate::errors::AnalysisError;
use crate::expr::{Expr, MemRead, Symbol};
use crate::trace::TraceEntry;
use crate::variable::local::{self, Address};
use crate::variable::{Resolver, Variable};
use crate::vm::Checkpoint;
use log::debug;
use primitive_types::U256;
use std::collections::{HashMap, HashSet};

/// Most words a single range read is matched against.
const MAX_RANGE_WORDS: usize = 64;

/// Identity of a node: where the value sat on the stack, the instruction it
/// is attributed to, and the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub tracking_pos: usize,
    pub pc: usize,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct DNode {
    pub id: NodeId,
    /// Resolved location for read nodes.
    pub variable: Option<Variable>,
    pub children: Vec<usize>,
    pub parents: Vec<usize>,
}

impl DNode {
    pub fn value(&self) -> &Expr {
        &self.id.value
    }

    pub fn pc(&self) -> usize {
        self.id.pc
    }
}

#[derive(Debug, Clone, Default)]
pub struct DTree {
    nodes: Vec<DNode>,
}

impl DTree {
    pub const ROOT: usize = 0;

    pub fn root(&self) -> Option<&DNode> {
        self.nodes.first()
    }

    pub fn get(&self, index: usize) -> Option<&DNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[DNode] {
        &self.nodes
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = &DNode> {
        self.nodes.get(index).into_iter().flat_map(move |n| n.children.iter().filter_map(move |&c| self.nodes.get(c)))
    }

    /// Indices of the nodes matching `cond` that have no matching ancestor
    /// on the way down from the root, in depth-first order.
    pub fn first_meet(&self, cond: impl Fn(&DNode) -> bool) -> Vec<usize> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut work = vec![Self::ROOT];
        while let Some(index) = work.pop() {
            let Some(node) = self.nodes.get(index) else { continue };
            if !seen.insert(index) {
                continue;
            }
            if cond(node) {
                found.push(index);
                continue;
            }
            work.extend(node.children.iter().rev());
        }
        found
    }

    fn link(&mut self, parent: usize, child: usize) {
        if let Some(p) = self.nodes.get_mut(parent) {
            if !p.children.contains(&child) {
                p.children.push(child);
            }
        }
        if let Some(c) = self.nodes.get_mut(child) {
            if !c.parents.contains(&parent) {
                c.parents.push(parent);
            }
        }
    }
}

/// A value waiting to become a node.
struct Pending {
    parent: Option<usize>,
    value: Expr,
    tracking_pos: usize,
    /// Length of the path prefix the value lives in.
    context: usize,
}

/// Builds dependency trees over one path. Identities registered by earlier
/// builds stay registered, so sibling trees over the same path share no
/// expansion work.
pub struct Register<'a> {
    ep: EpSlice<'a>,
    resolver: Resolver,
    visited: HashSet<NodeId>,
}

impl<'a> Register<'a> {
    pub fn new(ep: EpSlice<'a>) -> Self {
        Self::with_visited(ep, HashSet::new())
    }

    pub fn with_visited(ep: EpSlice<'a>, visited: HashSet<NodeId>) -> Self {
        Self { ep, resolver: Resolver::new(ep), visited }
    }

    pub fn into_visited(self) -> HashSet<NodeId> {
        self.visited
    }

    /// Tree rooted at `value`, which sits at `tracking_pos` on the stack of
    /// the last step of the path.
    pub fn build(&mut self, value: &Expr, tracking_pos: usize) -> Result<DTree, AnalysisError> {
        let mut tree = DTree::default();
        let mut index: HashMap<NodeId, usize> = HashMap::new();
        let mut work = vec![Pending { parent: None, value: value.clone(), tracking_pos, context: self.ep.len() }];

        while let Some(pending) = work.pop() {
            let ctx = self.ep.sub(pending.context);
            let id = NodeId { tracking_pos: pending.tracking_pos, pc: ctx.pc(), value: pending.value };
            if let Some(&existing) = index.get(&id) {
                if let Some(parent) = pending.parent {
                    tree.link(parent, existing);
                }
                continue;
            }
            if !self.visited.insert(id.clone()) && pending.parent.is_some() {
                continue;
            }

            let (variable, deps) = self.expand(&id.value, ctx, pending.tracking_pos, pending.context)?;
            let at = tree.nodes.len();
            index.insert(id.clone(), at);
            tree.nodes.push(DNode { id, variable, children: Vec::new(), parents: Vec::new() });
            if let Some(parent) = pending.parent {
                tree.link(parent, at);
            }
            work.extend(deps.into_iter().rev().map(|d| Pending { parent: Some(at), ..d }));
        }

        debug!("dependency tree of {value}: {} nodes", tree.len());
        Ok(tree)
    }

    /// Resolve a node's variable and list what it depends on.
    fn expand(
        &self,
        value: &Expr,
        ctx: EpSlice<'a>,
        tracking_pos: usize,
        context: usize,
    ) -> Result<(Option<Variable>, Vec<Pending>), AnalysisError> {
        let Some(symbol) = value.as_symbol() else {
            return Ok((None, Vec::new()));
        };
        match symbol {
            Symbol::MLoad(read) => {
                let seen = ctx.at_read(read.ep_size, read.trace_size);
                let variable = self.resolver.local(&read.loc, seen)?;
                let words = range_words(read, seen, &variable, &self.resolver)?;
                let mut deps = Vec::new();
                for (index, entry) in seen.trace().iter().enumerate().filter(|(_, e)| e.store.is_memory()) {
                    let key = self.resolver.key(index, entry, seen)?;
                    if words.iter().any(|w| w.alias_eq(&key)) {
                        deps.extend(write_deps(entry));
                    }
                }
                Ok((Some(variable), deps))
            }
            Symbol::SLoad(read) => {
                let seen = ctx.at_read(read.ep_size, read.trace_size);
                let variable = self.resolver.state(&read.slot, seen)?;
                let mut deps = Vec::new();
                for (index, entry) in seen.trace().iter().enumerate().filter(|(_, e)| e.store.is_storage()) {
                    let key = self.resolver.key(index, entry, seen)?;
                    if variable.alias_eq(&key) {
                        deps.extend(write_deps(entry));
                    }
                }
                Ok((Some(variable), deps))
            }
            _ => {
                let deps = value
                    .operands()
                    .into_iter()
                    .filter(|op| !op.is_const())
                    .map(|op| Pending { parent: None, value: op.clone(), tracking_pos, context })
                    .collect();
                Ok((None, deps))
            }
        }
    }
}

/// The written value, and the key when it is symbolic, each in the context
/// of the store.
fn write_deps(entry: &TraceEntry) -> Vec<Pending> {
    let context = entry.step + 1;
    let mut deps = vec![Pending { parent: None, value: entry.store.value().clone(), tracking_pos: entry.value_pos, context }];
    let key = entry.store.key();
    if !key.is_const() {
        deps.push(Pending { parent: None, value: key.clone(), tracking_pos: entry.key_pos, context });
    }
    deps
}

/// Variables of every word covered by a read. Reads wider than a word at an
/// absolute address (the input of a hash) cover several words.
fn range_words(
    read: &MemRead,
    seen: EpSlice<'_>,
    variable: &Variable,
    resolver: &Resolver,
) -> Result<Vec<Variable>, AnalysisError> {
    let size = read.size.as_usize().unwrap_or(32);
    if size <= 32 {
        return Ok(vec![variable.clone()]);
    }
    match local::address(&read.loc, seen, resolver, 0)? {
        Address::Absolute(at) => {
            let count = size.div_ceil(32).min(MAX_RANGE_WORDS);
            Ok((0..count)
                .map(|k| Address::Absolute(at.overflowing_add(U256::from(32 * k)).0).into_variable())
                .collect())
        }
        Address::Relative(_) => Ok(vec![variable.clone()]),
    }
}

/// Dependency tree of the value a checkpoint sends.
pub fn checkpoint_tree(checkpoint: &Checkpoint) -> Result<DTree, AnalysisError> {
    Register::new(checkpoint.ep.view()).build(&checkpoint.value, checkpoint.value_pos())
}
