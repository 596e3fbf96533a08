//! Symbolic values propagated by the interpreter.
//!
//! A value is either a concrete 256-bit constant or a shared, immutable
//! symbol. Symbols are reference counted so that duplicating a stack slot or
//! snapshotting a whole stack never copies the expression tree, and a forked
//! path can never observe a mutation made by its sibling (there are none:
//! symbols are never mutated after construction).

use primitive_types::U256;
use std::fmt;
use std::rc::Rc;

/// A symbolic value. Equality and hashing are structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Concrete 256-bit value.
    Const(U256),
    Symbol(Rc<Symbol>),
}

/// The call-family opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

impl CallKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CALL" => Some(CallKind::Call),
            "CALLCODE" => Some(CallKind::CallCode),
            "DELEGATECALL" => Some(CallKind::DelegateCall),
            "STATICCALL" => Some(CallKind::StaticCall),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CallKind::Call => "CALL",
            CallKind::CallCode => "CALLCODE",
            CallKind::DelegateCall => "DELEGATECALL",
            CallKind::StaticCall => "STATICCALL",
        }
    }

    /// Stack arguments consumed by this variant.
    pub fn arity(&self) -> usize {
        match self {
            CallKind::Call | CallKind::CallCode => 7,
            CallKind::DelegateCall | CallKind::StaticCall => 6,
        }
    }

    /// `CALL` and `CALLCODE` carry a value operand.
    pub fn moves_value(&self) -> bool {
        self.value_depth().is_some()
    }

    /// Depth of the value operand counted from the top of the stack (1 is
    /// the top): gas, address, then value.
    pub fn value_depth(&self) -> Option<usize> {
        match self {
            CallKind::Call | CallKind::CallCode => Some(3),
            CallKind::DelegateCall | CallKind::StaticCall => None,
        }
    }
}

/// A memory read. `trace_size` and `ep_size` record how long the write log
/// and the step history were when the read happened, so later analysis can
/// replay only the writes that were visible to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemRead {
    pub loc: Expr,
    pub size: Expr,
    pub trace_size: usize,
    pub ep_size: usize,
}

/// A storage read, with the same visibility markers as [`MemRead`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageRead {
    pub slot: Expr,
    pub trace_size: usize,
    pub ep_size: usize,
}

/// The symbolic node kinds.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Arithmetic, bitwise or comparison opcode whose operands were not all
    /// constant.
    Op { name: &'static str, args: Vec<Expr> },
    /// Value supplied by the execution environment (`CALLER`,
    /// `CALLDATALOAD(x)`, returned data, ...).
    Env { name: &'static str, args: Vec<Expr> },
    MLoad(MemRead),
    SLoad(StorageRead),
    /// Keccak over a memory range. The operand is always an `MLoad`.
    Sha3(Expr),
    /// Result placeholder of an external call; the call itself is opaque.
    Call { kind: CallKind, args: Vec<Expr> },
    /// Opcode the interpreter has no dedicated rule for.
    Opaque { name: &'static str, args: Vec<Expr> },
}

impl Expr {
    // -- Constructors ------------------------------------------------------

    pub fn val(v: u64) -> Self {
        Expr::Const(U256::from(v))
    }

    pub fn zero() -> Self {
        Expr::Const(U256::zero())
    }

    fn symbol(s: Symbol) -> Self {
        Expr::Symbol(Rc::new(s))
    }

    pub fn op(name: &'static str, args: Vec<Expr>) -> Self {
        Self::symbol(Symbol::Op { name, args })
    }

    pub fn env(name: &'static str, args: Vec<Expr>) -> Self {
        Self::symbol(Symbol::Env { name, args })
    }

    pub fn opaque(name: &'static str, args: Vec<Expr>) -> Self {
        Self::symbol(Symbol::Opaque { name, args })
    }

    pub fn mload(read: MemRead) -> Self {
        Self::symbol(Symbol::MLoad(read))
    }

    pub fn sload(read: StorageRead) -> Self {
        Self::symbol(Symbol::SLoad(read))
    }

    /// `SHA3` over the memory range described by `read`.
    pub fn sha3(read: MemRead) -> Self {
        Self::symbol(Symbol::Sha3(Expr::mload(read)))
    }

    pub fn call(kind: CallKind, args: Vec<Expr>) -> Self {
        Self::symbol(Symbol::Call { kind, args })
    }

    // -- Inspection --------------------------------------------------------

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    pub fn as_const(&self) -> Option<U256> {
        match self {
            Expr::Const(v) => Some(*v),
            Expr::Symbol(_) => None,
        }
    }

    /// Constant that fits in a `usize` (jump targets, offsets, sizes).
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Expr::Const(v) if v.bits() <= 64 => usize::try_from(v.low_u64()).ok(),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(v) if v.is_zero())
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Expr::Symbol(s) => Some(s),
            Expr::Const(_) => None,
        }
    }

    /// The opcode name heading this symbol, if any.
    pub fn name(&self) -> Option<&'static str> {
        self.as_symbol().map(Symbol::name)
    }

    /// `true` if this is a symbol headed by `name`.
    pub fn is(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    pub fn as_mload(&self) -> Option<&MemRead> {
        match self.as_symbol()? {
            Symbol::MLoad(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sload(&self) -> Option<&StorageRead> {
        match self.as_symbol()? {
            Symbol::SLoad(r) => Some(r),
            _ => None,
        }
    }

    /// The hashed range of a `SHA3` symbol.
    pub fn as_sha3(&self) -> Option<&MemRead> {
        match self.as_symbol()? {
            Symbol::Sha3(inner) => inner.as_mload(),
            _ => None,
        }
    }

    /// Operands of a symbol in stack order. Reads expose their address (and
    /// size for memory); the visibility markers are not operands.
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_) => Vec::new(),
            Expr::Symbol(s) => match s.as_ref() {
                Symbol::Op { args, .. }
                | Symbol::Env { args, .. }
                | Symbol::Opaque { args, .. }
                | Symbol::Call { args, .. } => args.iter().collect(),
                Symbol::MLoad(r) => vec![&r.loc, &r.size],
                Symbol::SLoad(r) => vec![&r.slot],
                Symbol::Sha3(inner) => vec![inner],
            },
        }
    }

    /// Collect the outermost sub-expressions satisfying `cond`; matching
    /// nodes are not searched further.
    pub fn find<'a>(&'a self, cond: &dyn Fn(&Expr) -> bool) -> Vec<&'a Expr> {
        let mut found = Vec::new();
        let mut work = vec![self];
        while let Some(e) = work.pop() {
            if cond(e) {
                found.push(e);
                continue;
            }
            // Reverse so results come out in left-to-right order.
            work.extend(e.operands().into_iter().rev());
        }
        found
    }

    /// Check if this expression tree contains a symbol headed by `name`.
    pub fn contains_op(&self, name: &str) -> bool {
        !self.find(&|e| e.is(name)).is_empty()
    }
}

impl Symbol {
    pub fn name(&self) -> &'static str {
        match self {
            Symbol::Op { name, .. } | Symbol::Env { name, .. } | Symbol::Opaque { name, .. } => *name,
            Symbol::MLoad(_) => "MLOAD",
            Symbol::SLoad(_) => "SLOAD",
            Symbol::Sha3(_) => "SHA3",
            Symbol::Call { kind, .. } => kind.name(),
        }
    }
}

impl From<U256> for Expr {
    fn from(v: U256) -> Self {
        Expr::Const(v)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => {
                if *v <= U256::from(9999u64) {
                    write!(f, "{v}")
                } else {
                    write!(f, "0x{v:x}")
                }
            }
            Expr::Symbol(s) => {
                write!(f, "{}(", s.name())?;
                for (i, operand) in self.operands().into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
        }
    }
}
