//! Shared utilities.

pub mod helpers;
pub mod opcodes;
