//! evmguard: reentrancy detection for EVM bytecode.
//!
//! Explores every feasible path of a contract with a symbolic interpreter,
//! tracks what the value sent by each external call depends on, and reports
//! the calls that are followed by a storage write, together with the
//! function selectors guarding them.

pub mod core;
pub mod utils;

pub mod analyzer;
pub mod config;
pub mod dependency;
pub mod ep;
pub mod errors;
pub mod expr;
pub mod loader;
pub mod locator;
pub mod reentrancy;
pub mod stack;
pub mod trace;
pub mod variable;
pub mod vm;
