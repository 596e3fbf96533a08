//! Mapping from bytecode positions back to source ranges.
//!
//! The scanner only talks to a [`SourceLocator`]. With a compiler source map
//! a locator can answer in source offsets; [`BytecodeLocator`] works from the
//! code alone and answers in byte offsets.

use crate::expr::Expr;
use crate::loader::Loader;
use primitive_types::U256;
use serde::Serialize;

/// Half-open range `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceRange {
    pub start: usize,
    pub length: usize,
}

impl SourceRange {
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// The syntactic construct around a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Construct {
    /// The call's results are destructured into a tuple.
    pub returns_tuple: bool,
    /// Declared type of the call's result, when known.
    pub result_type: Option<String>,
    /// Start of the enclosing statement.
    pub statement_start: usize,
}

pub trait SourceLocator {
    /// Range of the code that produced the instruction at `pc`.
    fn locate(&self, pc: usize) -> Option<SourceRange>;

    /// Construct enclosing `range`.
    fn construct(&self, range: SourceRange) -> Construct;

    /// Range of the function dispatched for `selector`.
    fn function_range(&self, selector: u32) -> Option<SourceRange>;
}

/// Locator over raw bytecode: ranges are instruction byte spans.
pub struct BytecodeLocator<'a> {
    loader: &'a Loader,
}

impl<'a> BytecodeLocator<'a> {
    pub fn new(loader: &'a Loader) -> Self {
        Self { loader }
    }
}

/// Instructions searched past a `PUSH4` for the `EQ`/`PUSH`/`JUMPI` tail of
/// a dispatcher entry.
const DISPATCH_WINDOW: usize = 4;

impl SourceLocator for BytecodeLocator<'_> {
    fn locate(&self, pc: usize) -> Option<SourceRange> {
        let lines = &self.loader.parsed_lines;
        let at = lines.binary_search_by_key(&pc, |inst| inst.offset).ok()?;
        let length = lines
            .get(at + 1)
            .map_or(self.loader.len(), |next| next.offset)
            .saturating_sub(pc);
        Some(SourceRange { start: pc, length })
    }

    fn construct(&self, range: SourceRange) -> Construct {
        Construct { returns_tuple: false, result_type: None, statement_start: range.start }
    }

    /// The `JUMPDEST` a `PUSH4 selector; EQ; PUSH dest; JUMPI` dispatcher
    /// entry jumps to.
    fn function_range(&self, selector: u32) -> Option<SourceRange> {
        let lines = &self.loader.parsed_lines;
        let wanted = U256::from(selector);
        lines.iter().enumerate().find_map(|(i, inst)| {
            if inst.op != "PUSH4" || inst.param != Some(wanted) {
                return None;
            }
            let tail = lines.get(i + 1..(i + 1 + DISPATCH_WINDOW).min(lines.len()))?;
            let eq = tail.iter().position(|t| t.op == "EQ")?;
            match tail.get(eq + 1..eq + 3)? {
                [push, jumpi] if push.op.starts_with("PUSH") && jumpi.op == "JUMPI" => {
                    let dest = Expr::Const(push.param?).as_usize()?;
                    self.loader.is_jump_dest(dest).then(|| self.locate(dest)).flatten()
                }
                _ => None,
            }
        })
    }
}
