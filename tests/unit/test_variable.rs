//! Variable resolution tests: aliasing rules, memory and storage addresses.

use evmguard::config::AnalyzerConfig;
use evmguard::errors::ResolveError;
use evmguard::expr::Expr;
use evmguard::loader::Loader;
use evmguard::variable::{to_local_variable, to_state_variable, Root, Variable};
use evmguard::vm::{Evm, Exploration};
use std::time::{Duration, Instant};

fn run(hex: &str) -> Exploration {
    let mut loader = Loader::new();
    loader.load_binary(hex).unwrap();
    Evm::new(loader, AnalyzerConfig::default()).start().unwrap()
}

fn top_of(exp: &Exploration) -> Expr {
    exp.endpoints[0].ep.last().unwrap().stack.last().cloned().unwrap()
}

fn memory_var(hex: &str) -> Result<Variable, ResolveError> {
    let exp = run(hex);
    let top = top_of(&exp);
    to_local_variable(&top.as_mload().unwrap().loc, exp.endpoints[0].ep.view())
}

fn storage_var(hex: &str) -> Result<Variable, ResolveError> {
    let exp = run(hex);
    let top = top_of(&exp);
    to_state_variable(&top.as_sload().unwrap().slot, exp.endpoints[0].ep.view())
}

#[test]
fn test_alias_is_reflexive_and_symmetric() {
    let vars = [
        Variable::named("s_0"),
        Variable::named("s_0").with_member(Expr::env("CALLER", vec![])),
        Variable::named("s_0").with_member(Expr::val(3)),
        Variable::nested(Variable::named("m_40")).with_member(Expr::val(32)),
    ];
    for a in &vars {
        assert!(a.alias_eq(a));
        for b in &vars {
            assert_eq!(a.alias_eq(b), b.alias_eq(a), "{a} vs {b}");
        }
    }
}

#[test]
fn test_alias_needs_same_member_count() {
    let short = Variable::named("s_1").with_member(Expr::val(1));
    let long = short.clone().with_member(Expr::val(2));
    assert!(!short.alias_eq(&long));
}

#[test]
fn test_distinct_constant_keys_do_not_alias() {
    let a = Variable::named("s_1").with_member(Expr::val(5));
    let b = Variable::named("s_1").with_member(Expr::val(6));
    assert!(!a.alias_eq(&b));
}

#[test]
fn test_root_kinds() {
    let nested = Variable::nested(Variable::named("m_0"));
    assert!(matches!(nested.root, Root::Nested(_)));
    assert!(matches!(Variable::named("m_0").root, Root::Named(ref n) if n == "m_0"));
}

#[test]
fn test_memory_pointer_plus_offset() {
    // mstore(0x40, 0x80); mload(add(mload(0x40), 0x40))
    assert_eq!(memory_var("60806040526040516040015100").unwrap().to_string(), "m_c0");
}

#[test]
fn test_memory_symbolic_free_pointer_uses_stride() {
    // mstore(0x40, caller()); mload(mload(0x40))
    assert_eq!(memory_var("336040526040515100").unwrap().to_string(), "m_180");
}

#[test]
fn test_memory_nested_pointer_with_offset() {
    // mstore(0, calldataload(4)); mload(add(mload(0), 0x20))
    assert_eq!(memory_var("6004356000526000516020015100").unwrap().to_string(), "*(m_0)[32]");
}

#[test]
fn test_memory_unwritten_pointer_nests() {
    // mload(mload(0x60))
    let var = memory_var("6060515100").unwrap();
    assert_eq!(var, Variable::nested(Variable::named("m_60")));
}

#[test]
fn test_storage_nested_mapping() {
    // h = keccak256(caller() . 1); sload(keccak256(calldataload(4) . h))
    let hex = concat!(
        "33600052",
        "6001602052",
        "6040600020",
        "602052",
        "600435600052",
        "6040600020",
        "54",
        "00"
    );
    assert_eq!(storage_var(hex).unwrap().to_string(), "s_1[CALLER()][CALLDATALOAD(4)]");
}

#[test]
fn test_storage_mapping_with_unwritten_key() {
    // mstore(0x20, 2); sload(keccak256(0, 0x40)): the key word was never written.
    let var = storage_var("600260205260406000205400").unwrap();
    assert_eq!(var.root, Variable::named("s_2").root);
    assert_eq!(var.members.len(), 1);
    assert!(var.members[0].is("MLOAD"));
    assert!(var.alias_eq(&Variable::named("s_2").with_member(Expr::val(9))));
}

#[test]
fn test_storage_sha3_without_base_write_is_unsupported() {
    // sload(keccak256(0, 0x40)) with nothing stored
    let err = storage_var("60406000205400").unwrap_err();
    assert!(matches!(err, ResolveError::Unsupported { space: "storage", .. }));
}

#[test]
fn test_storage_sum_without_hash_is_unsupported() {
    // sload(add(caller(), 1))
    let err = storage_var("600133015400").unwrap_err();
    assert!(matches!(err, ResolveError::Unsupported { .. }));
}

/// `mstore(0x40, 0x80)` followed by `n` stores of `caller()` at
/// `add(mload(0x40), 32 * k)`, the shape of abi-encoding into fresh memory.
fn pointer_relative_writes(n: usize) -> String {
    let mut hex = String::from("6080604052");
    for k in 0..n {
        hex.push_str(&format!("3360405161{:04x}0152", 32 * k));
    }
    hex
}

#[test]
fn test_memory_long_run_of_pointer_relative_writes() {
    // mload(add(mload(0x40), 0x5e0)) after 48 writes
    let hex = format!("{}6040516105e0015100", pointer_relative_writes(48));
    let started = Instant::now();
    assert_eq!(memory_var(&hex).unwrap(), Variable::named("m_660"));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_memory_pointer_to_unaddressable_value_after_many_writes() {
    // mload(mload(mload(0x40))): the word at 0x80 holds caller(), not an address.
    let hex = format!("{}604051515100", pointer_relative_writes(40));
    let var = memory_var(&hex).unwrap();
    assert_eq!(var.to_string(), "*(m_80)");
}
