//! Bytecode loading and disassembly.
//!
//! Decodes hex into raw bytes, walks the instruction stream once to build a
//! listing, and records the facts the interpreter needs up front: which
//! offsets are real `JUMPDEST`s (not push data) and whether a value-moving
//! call appears anywhere in the code.

use crate::errors::{LoaderError, MAX_BYTECODE_SIZE};
use crate::utils::opcodes;
use primitive_types::U256;
use std::collections::BTreeSet;

/// A parsed instruction: byte offset, mnemonic, optional immediate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: &'static str,
    pub param: Option<U256>,
}

#[derive(Debug, Clone, Default)]
pub struct Loader {
    /// Raw bytecode.
    pub binary: Vec<u8>,
    /// Instructions in code order.
    pub parsed_lines: Vec<Instruction>,
    /// Offsets of `JUMPDEST` opcodes outside push data.
    pub jump_dests: BTreeSet<usize>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load bytecode from a hex string (with or without `0x` prefix).
    pub fn load_binary(&mut self, source: &str) -> Result<(), LoaderError> {
        let trimmed = source.trim();
        let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if hex_str.is_empty() {
            return Err(LoaderError::EmptyBytecode);
        }
        let binary = hex::decode(hex_str).map_err(|_| {
            LoaderError::InvalidHex(if hex_str.chars().count() > 40 {
                format!("{}...", hex_str.chars().take(40).collect::<String>())
            } else {
                hex_str.to_string()
            })
        })?;
        self.load_bytes(binary)
    }

    pub fn load_bytes(&mut self, binary: Vec<u8>) -> Result<(), LoaderError> {
        if binary.is_empty() {
            return Err(LoaderError::EmptyBytecode);
        }
        if binary.len() > MAX_BYTECODE_SIZE {
            return Err(LoaderError::BytecodeTooLarge(binary.len(), MAX_BYTECODE_SIZE));
        }
        self.binary = binary;
        self.disassemble();
        Ok(())
    }

    fn disassemble(&mut self) {
        let bytes = &self.binary;
        let mut offset = 0usize;
        let mut parsed = Vec::new();
        let mut jump_dests = BTreeSet::new();

        while offset < bytes.len() {
            let byte = bytes[offset];
            match opcodes::opcode(byte) {
                Some(info) => {
                    if info.name == "JUMPDEST" {
                        jump_dests.insert(offset);
                    }
                    let param = info.is_push().then(|| self.immediate(offset, info.immediate_bytes as usize));
                    parsed.push(Instruction { offset, op: info.name, param });
                    offset += 1 + info.immediate_bytes as usize;
                }
                None => {
                    parsed.push(Instruction { offset, op: "UNKNOWN", param: Some(U256::from(byte)) });
                    offset += 1;
                }
            }
        }

        self.parsed_lines = parsed;
        self.jump_dests = jump_dests;
    }

    pub fn len(&self) -> usize {
        self.binary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binary.is_empty()
    }

    pub fn byte_at(&self, pc: usize) -> Option<u8> {
        self.binary.get(pc).copied()
    }

    pub fn is_jump_dest(&self, pc: usize) -> bool {
        self.jump_dests.contains(&pc)
    }

    /// The `n` immediate bytes following the opcode at `pc`, big-endian.
    /// Bytes past the end of the code read as zero.
    pub fn immediate(&self, pc: usize, n: usize) -> U256 {
        self.code_word(pc + 1, n)
    }

    /// `len` bytes of code starting at `offset` (at most 32), big-endian,
    /// zero-padded past the end.
    pub fn code_word(&self, offset: usize, len: usize) -> U256 {
        let mut val = U256::zero();
        for i in 0..len.min(32) {
            let byte = offset.checked_add(i).and_then(|at| self.byte_at(at)).unwrap_or(0);
            val = (val << 8) | U256::from(byte);
        }
        val
    }

    /// `true` if a `CALL` or `CALLCODE` occurs in the instruction stream.
    pub fn has_value_call(&self) -> bool {
        self.parsed_lines.iter().any(|inst| matches!(inst.op, "CALL" | "CALLCODE"))
    }

    /// Generate disassembly lines.
    pub fn disasm(&self) -> Vec<String> {
        self.parsed_lines
            .iter()
            .map(|inst| match &inst.param {
                Some(v) if inst.op == "UNKNOWN" => format!("0x{:04x} UNKNOWN 0x{:02x}", inst.offset, v.low_u64()),
                Some(v) => format!("0x{:04x} {} 0x{v:x}", inst.offset, inst.op),
                None => format!("0x{:04x} {}", inst.offset, inst.op),
            })
            .collect()
    }
}
