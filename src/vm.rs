//! Symbolic EVM interpreter with depth-first path exploration.
//!
//! Paths are processed from an explicit work stack of `(pc, Ep)` pairs. Each
//! popped path runs until it terminates or reaches a jump; a `JUMPI` on a
//! symbolic condition forks it into two independently owned paths. Loops are
//! kept finite by the per-path guard in [`Ep::forbidden_jumpdests`].
//!
//! Value-moving calls produce [`Checkpoint`]s and terminal opcodes produce
//! [`EndPoint`]s. If the code contains a call but no checkpoint was reached,
//! [`Evm::start`] retries with a larger loop bound until the configured
//! ceiling.

use crate::config::AnalyzerConfig;
use crate::core::arithmetic as arith;
use crate::ep::{CallSite, Ep};
use crate::errors::{StackError, VmError};
use crate::expr::{CallKind, Expr, MemRead, StorageRead};
use crate::loader::Loader;
use crate::stack::Stack;
use crate::trace::Store;
use crate::utils::opcodes::{self, OpcodeInfo};
use log::{debug, info, warn};
use primitive_types::U256;
use std::collections::BTreeSet;

const FREE_MEMORY_POINTER: u64 = 0x40;
const FREE_MEMORY_START: u64 = 0x80;

/// Path state at a `CALL`/`CALLCODE`, with the call's value operand. The
/// last step of `ep` is the call itself.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub ep: Ep,
    pub kind: CallKind,
    pub value: Expr,
}

impl Checkpoint {
    pub fn pc(&self) -> usize {
        self.ep.last().map_or(0, |s| s.pc)
    }

    /// Stack position of the value operand in the stack seen by the call.
    pub fn value_pos(&self) -> usize {
        let depth = self.kind.value_depth().unwrap_or(0);
        self.ep.view().stack().len().saturating_sub(depth)
    }
}

/// Path state at a terminal opcode, with the branch coverage counters as
/// they stood when the path ended.
#[derive(Debug, Clone)]
pub struct EndPoint {
    pub ep: Ep,
    pub taken: usize,
    pub total: usize,
}

/// Results of one exploration attempt. A fresh session is built for every
/// retry.
#[derive(Debug, Default)]
pub struct Session {
    pub checkpoints: Vec<Checkpoint>,
    pub endpoints: Vec<EndPoint>,
    /// `JUMPI` sites with a symbolic condition.
    branches: BTreeSet<usize>,
    /// Those of them whose jump side was explored.
    taken: BTreeSet<usize>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taken(&self) -> usize {
        self.taken.len()
    }

    pub fn total(&self) -> usize {
        self.branches.len()
    }

    fn end(&mut self, ep: Ep) {
        let (taken, total) = (self.taken(), self.total());
        self.endpoints.push(EndPoint { ep, taken, total });
    }

    fn finish(self, bound: usize, exhausted: bool) -> Exploration {
        Exploration {
            taken: self.taken(),
            total: self.total(),
            endpoints: self.endpoints,
            checkpoints: self.checkpoints,
            bound,
            exhausted,
        }
    }
}

/// Outcome of [`Evm::start`].
#[derive(Debug)]
pub struct Exploration {
    pub endpoints: Vec<EndPoint>,
    pub checkpoints: Vec<Checkpoint>,
    /// Conditional branches whose jump side was explored.
    pub taken: usize,
    /// Conditional branches on a symbolic condition.
    pub total: usize,
    /// Loop bound of the run that produced these results.
    pub bound: usize,
    /// The bound reached its ceiling while calls were still unreached.
    pub exhausted: bool,
}

impl Exploration {
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }
}

/// Attach the current pc to a stack fault.
trait AtPc<T> {
    fn at(self, pc: usize) -> Result<T, VmError>;
}

impl<T> AtPc<T> for Result<T, StackError> {
    fn at(self, pc: usize) -> Result<T, VmError> {
        self.map_err(|source| VmError::Stack { pc, source })
    }
}

/// Pop `N` operands (top first) and return them with the stack height left
/// below them, so operand `i` came from position `base + N - 1 - i`.
fn pop_args<const N: usize>(stack: &mut Stack, pc: usize) -> Result<([Expr; N], usize), VmError> {
    let popped = stack.pop_n(N).at(pc)?;
    let base = stack.len();
    let have = popped.len();
    let args = <[Expr; N]>::try_from(popped)
        .map_err(|_| VmError::Stack { pc, source: StackError::Underflow { needed: N, have } })?;
    Ok((args, base))
}

/// Fold an arithmetic opcode over its operands when they are all constant.
fn fold(name: &'static str, args: Vec<Expr>) -> Expr {
    let consts: Option<Vec<U256>> = args.iter().map(Expr::as_const).collect();
    if let Some(result) = consts.and_then(|vals| arith::eval_concrete(name, &vals)) {
        return Expr::Const(result);
    }
    if name == "EXP" {
        if let [base, exponent] = args.as_slice() {
            if exponent.is_zero() {
                return Expr::val(1);
            }
            if base.is_zero() {
                return Expr::zero();
            }
        }
    }
    Expr::op(name, args)
}

pub struct Evm {
    pub loader: Loader,
    config: AnalyzerConfig,
}

impl Evm {
    pub fn new(loader: Loader, config: AnalyzerConfig) -> Self {
        Self { loader, config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Explore every reachable path, raising the loop bound while the code
    /// contains a value-moving call that no path has reached.
    pub fn start(&self) -> Result<Exploration, VmError> {
        self.config.validate()?;
        let needs_checkpoint = self.loader.has_value_call();
        let ceiling = self.config.max_visited_block_bound;
        let mut bound = self.config.max_visited_block;
        loop {
            let session = self.explore(bound)?;
            if !needs_checkpoint || !session.checkpoints.is_empty() {
                return Ok(session.finish(bound, false));
            }
            if bound >= ceiling {
                warn!("loop bound reached its ceiling ({ceiling}) without reaching a call; results are partial");
                return Ok(session.finish(bound, true));
            }
            let next = (bound + self.config.max_visited_block_step).min(ceiling);
            info!("no checkpoint reached with loop bound {bound}, retrying with {next}");
            bound = next;
        }
    }

    /// One full exploration with a fixed loop bound.
    pub fn explore(&self, bound: usize) -> Result<Session, VmError> {
        let mut session = Session::new();
        let mut work = vec![(0usize, Ep::new(bound))];
        while let Some((pc, ep)) = work.pop() {
            let children = self.execute(pc, ep, &mut session)?;
            // The fall-through side is explored first.
            work.extend(children.into_iter().rev());
        }
        debug!(
            "explored with bound {bound}: {} endpoints, {} checkpoints, {}/{} branches",
            session.endpoints.len(),
            session.checkpoints.len(),
            session.taken(),
            session.total()
        );
        Ok(session)
    }

    /// Run `ep` from `pc` until it ends or jumps. Returns the paths to
    /// continue with: none when the path terminated or was abandoned, one
    /// for a jump, two for a fork.
    pub fn execute(&self, mut pc: usize, mut ep: Ep, session: &mut Session) -> Result<Vec<(usize, Ep)>, VmError> {
        loop {
            let byte = self.loader.byte_at(pc).ok_or(VmError::CodeOverrun(pc))?;
            let info = match opcodes::opcode(byte) {
                Some(info) => info,
                None => {
                    debug!("undefined opcode {byte:#04x} at {pc:#x}, treated as INVALID");
                    &opcodes::INVALID
                }
            };
            ep.record(pc, info);

            match info.name {
                "STOP" | "RETURN" | "REVERT" | "SELFDESTRUCT" | "INVALID" => {
                    session.end(ep);
                    return Ok(Vec::new());
                }
                "JUMP" => {
                    let target = ep.stack.pop().at(pc)?;
                    return Ok(self.jump(pc, target, ep).into_iter().collect());
                }
                "JUMPI" => {
                    let ([target, cond], _) = pop_args::<2>(&mut ep.stack, pc)?;
                    match cond.as_const() {
                        Some(c) if c.is_zero() => {}
                        // A decided branch is followed without consulting the loop guard.
                        Some(_) => return Ok(self.jump_dest(pc, &target).map(|dest| (dest, ep)).into_iter().collect()),
                        None => {
                            session.branches.insert(pc);
                            let mut children = vec![(pc + 1, ep.clone())];
                            if let Some(taken) = self.jump(pc, target, ep) {
                                session.taken.insert(pc);
                                children.push(taken);
                            }
                            return Ok(children);
                        }
                    }
                }
                name => match CallKind::from_name(name) {
                    Some(kind) => self.call(pc, kind, &mut ep, session)?,
                    None => self.apply(pc, info, &mut ep)?,
                },
            }
            pc += 1 + info.immediate_bytes as usize;
        }
    }

    /// Validate a jump and apply the loop guard. Symbolic, invalid and
    /// forbidden targets abandon the path.
    fn jump(&self, pc: usize, target: Expr, ep: Ep) -> Option<(usize, Ep)> {
        let dest = self.jump_dest(pc, &target)?;
        if ep.is_forbidden(dest) {
            debug!("jump {pc:#x} -> {dest:#x} cut by the loop bound");
            return None;
        }
        Some((dest, ep))
    }

    /// The constant `JUMPDEST` a jump lands on, if any.
    fn jump_dest(&self, pc: usize, target: &Expr) -> Option<usize> {
        let Some(dest) = target.as_usize() else {
            warn!("symbolic jump target at {pc:#x}: {target}");
            return None;
        };
        if !self.loader.is_jump_dest(dest) {
            warn!("invalid jump destination {dest:#x} at {pc:#x}");
            return None;
        }
        Some(dest)
    }

    fn call(&self, pc: usize, kind: CallKind, ep: &mut Ep, session: &mut Session) -> Result<(), VmError> {
        let needed = kind.arity();
        let have = ep.stack.len();
        if have < needed {
            return Err(VmError::Stack { pc, source: StackError::Underflow { needed, have } });
        }
        if let Some(depth) = kind.value_depth() {
            let value = ep.stack.items()[have - depth].clone();
            let checkpoint = session.checkpoints.len();
            ep.add_call(CallSite { checkpoint, position: ep.len() - 1 });
            debug!("checkpoint {checkpoint} at {pc:#x}, value {value}");
            session.checkpoints.push(Checkpoint { ep: ep.clone(), kind, value });
        }
        let args = ep.stack.pop_n(needed).at(pc)?;
        ep.stack.push(Expr::call(kind, args)).at(pc)
    }

    /// Last value written to the free memory pointer on this path.
    fn free_pointer(ep: &Ep) -> U256 {
        ep.trace
            .memory()
            .rev()
            .find_map(|(_, e)| match &e.store {
                Store::Memory { loc, value: Expr::Const(v), .. } if loc.as_usize() == Some(FREE_MEMORY_POINTER as usize) => {
                    Some(*v)
                }
                _ => None,
            })
            .unwrap_or(U256::from(FREE_MEMORY_START))
    }

    fn mem_read(ep: &Ep, loc: Expr, size: Expr) -> MemRead {
        MemRead { loc, size, trace_size: ep.trace.len(), ep_size: ep.len() }
    }

    /// Every opcode except control flow and calls.
    fn apply(&self, pc: usize, info: &'static OpcodeInfo, ep: &mut Ep) -> Result<(), VmError> {
        if info.is_push() {
            let value = self.loader.immediate(pc, info.immediate_bytes as usize);
            return ep.stack.push(Expr::Const(value)).at(pc);
        }
        if let Some(n) = info.dup_depth() {
            return ep.stack.dup(n).at(pc);
        }
        if let Some(n) = info.swap_depth() {
            return ep.stack.swap(n).at(pc);
        }

        let name = info.name;
        let pushed = match name {
            "JUMPDEST" => None,
            "POP" => {
                ep.stack.pop().at(pc)?;
                None
            }
            n if n.starts_with("LOG") => {
                ep.stack.pop_n(info.pops as usize).at(pc)?;
                None
            }
            n if arith::is_pure(n) => {
                let args = ep.stack.pop_n(info.pops as usize).at(pc)?;
                Some(fold(name, args))
            }
            "ADDRESS" | "ORIGIN" | "CALLER" | "CALLVALUE" | "CALLDATASIZE" | "GASPRICE" | "RETURNDATASIZE"
            | "COINBASE" | "TIMESTAMP" | "NUMBER" | "DIFFICULTY" | "GASLIMIT" | "CHAINID" | "SELFBALANCE"
            | "BASEFEE" | "BLOBBASEFEE" | "MSIZE" | "GAS" => Some(Expr::env(name, Vec::new())),
            "BALANCE" | "EXTCODESIZE" | "EXTCODEHASH" | "BLOCKHASH" | "BLOBHASH" => {
                let arg = ep.stack.pop().at(pc)?;
                Some(Expr::env(name, vec![arg]))
            }
            "CALLDATALOAD" => {
                let offset = ep.stack.pop().at(pc)?;
                Some(self.calldata(offset))
            }
            "CODESIZE" => Some(Expr::val(self.loader.len() as u64)),
            "PC" => Some(Expr::val(pc as u64)),
            "MLOAD" => {
                let loc = ep.stack.pop().at(pc)?;
                Some(Expr::mload(Self::mem_read(ep, loc, Expr::val(32))))
            }
            "SHA3" => {
                let ([loc, size], _) = pop_args::<2>(&mut ep.stack, pc)?;
                Some(Expr::sha3(Self::mem_read(ep, loc, size)))
            }
            "SLOAD" => {
                let slot = ep.stack.pop().at(pc)?;
                Some(Expr::sload(StorageRead { slot, trace_size: ep.trace.len(), ep_size: ep.len() }))
            }
            "MSTORE" | "MSTORE8" => {
                let ([loc, value], base) = pop_args::<2>(&mut ep.stack, pc)?;
                let size = Expr::val(if name == "MSTORE" { 32 } else { 1 });
                let value = if loc.as_usize() == Some(FREE_MEMORY_POINTER as usize) && !value.is_const() {
                    let next = arith::add(Self::free_pointer(ep), U256::from(self.config.allocated_range));
                    debug!("symbolic free memory pointer at {pc:#x}, advanced to {next:#x}");
                    Expr::Const(next)
                } else {
                    value
                };
                ep.add_write(pc, Store::Memory { loc, value, size }, base + 1, base);
                None
            }
            "SSTORE" => {
                let ([slot, value], base) = pop_args::<2>(&mut ep.stack, pc)?;
                ep.add_write(pc, Store::Storage { slot, value }, base + 1, base);
                None
            }
            "CALLDATACOPY" | "RETURNDATACOPY" | "CODECOPY" => {
                let ([loc, offset, size], base) = pop_args::<3>(&mut ep.stack, pc)?;
                let value = match name {
                    "CALLDATACOPY" => Expr::env("CALLDATALOAD", vec![offset]),
                    "RETURNDATACOPY" => Expr::env("RETURNDATA", vec![offset]),
                    _ => match (offset.as_usize(), size.as_usize()) {
                        (Some(o), Some(len)) if len <= 32 => Expr::Const(self.loader.code_word(o, len)),
                        _ => Expr::env("CODECOPY", vec![offset, size.clone()]),
                    },
                };
                ep.add_write(pc, Store::Memory { loc, value, size }, base + 2, base + 1);
                None
            }
            "EXTCODECOPY" => {
                let ([address, loc, offset, size], base) = pop_args::<4>(&mut ep.stack, pc)?;
                let value = Expr::env("EXTCODECOPY", vec![address, offset]);
                ep.add_write(pc, Store::Memory { loc, value, size }, base + 2, base + 3);
                None
            }
            "MCOPY" => {
                let ([dest, src, size], base) = pop_args::<3>(&mut ep.stack, pc)?;
                let value = Expr::mload(Self::mem_read(ep, src, size.clone()));
                ep.add_write(pc, Store::Memory { loc: dest, value, size }, base + 2, base + 1);
                None
            }
            _ => {
                if info.pushes > 1 {
                    return Err(VmError::TooManyOutputs { name, pc, outs: info.pushes });
                }
                debug!("no dedicated rule for {name} at {pc:#x}");
                let args = ep.stack.pop_n(info.pops as usize).at(pc)?;
                (info.pushes == 1).then(|| Expr::opaque(name, args))
            }
        };

        match pushed {
            Some(value) => ep.stack.push(value).at(pc),
            None => Ok(()),
        }
    }

    /// Aligned constant offsets (the selector word and the 32-byte argument
    /// slots after it) stay symbolic; anything else reads as the configured
    /// constant.
    fn calldata(&self, offset: Expr) -> Expr {
        let aligned = match offset.as_const() {
            Some(o) => o < U256::from(4u64) || (o - U256::from(4u64)) % U256::from(32u64) == U256::zero(),
            None => false,
        };
        if aligned {
            Expr::env("CALLDATALOAD", vec![offset])
        } else {
            Expr::Const(U256::from(self.config.dataload))
        }
    }
}
