//! Symbolic value tests: construction, equality, display and search.

use evmguard::expr::{CallKind, Expr, MemRead, StorageRead};
use primitive_types::U256;
use std::collections::HashSet;

fn sload(slot: u64, ep_size: usize) -> Expr {
    Expr::sload(StorageRead { slot: Expr::val(slot), trace_size: 0, ep_size })
}

#[test]
fn test_const_inspection() {
    let e = Expr::val(0x40);
    assert!(e.is_const());
    assert_eq!(e.as_const(), Some(U256::from(0x40u64)));
    assert_eq!(e.as_usize(), Some(0x40));
    assert!(!e.is_zero());
    assert!(Expr::zero().is_zero());
    assert_eq!(e.name(), None);
}

#[test]
fn test_symbol_names() {
    assert!(Expr::op("ADD", vec![Expr::val(1), sload(0, 2)]).is("ADD"));
    assert!(Expr::env("CALLER", vec![]).is("CALLER"));
    assert!(sload(0, 2).is("SLOAD"));
    let range = MemRead { loc: Expr::zero(), size: Expr::val(64), trace_size: 0, ep_size: 1 };
    assert!(Expr::sha3(range.clone()).is("SHA3"));
    assert!(Expr::mload(range).is("MLOAD"));
    assert!(Expr::call(CallKind::DelegateCall, vec![]).is("DELEGATECALL"));
    assert!(Expr::opaque("CREATE", vec![]).is("CREATE"));
}

#[test]
fn test_display() {
    let e = Expr::op("EQ", vec![Expr::val(0xa9059cbb), Expr::op("SHR", vec![Expr::val(0xe0), Expr::env("CALLDATALOAD", vec![Expr::zero()])])]);
    assert_eq!(e.to_string(), "EQ(0xa9059cbb,SHR(224,CALLDATALOAD(0)))");
    assert_eq!(Expr::env("CALLER", vec![]).to_string(), "CALLER()");
}

#[test]
fn test_reads_at_different_times_differ() {
    assert_ne!(sload(0, 2), sload(0, 9));
    let set: HashSet<Expr> = [sload(0, 2), sload(0, 2), sload(0, 9)].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn test_clone_shares_symbol() {
    let a = Expr::op("ADD", vec![Expr::val(1), sload(0, 2)]);
    let b = a.clone();
    match (&a, &b) {
        (Expr::Symbol(x), Expr::Symbol(y)) => assert!(std::rc::Rc::ptr_eq(x, y)),
        _ => panic!("expected symbols"),
    }
}

#[test]
fn test_operands() {
    let read = MemRead { loc: Expr::val(0x80), size: Expr::val(32), trace_size: 1, ep_size: 4 };
    let m = Expr::mload(read);
    assert_eq!(m.operands(), vec![&Expr::val(0x80), &Expr::val(32)]);
    assert!(Expr::val(1).operands().is_empty());
}

#[test]
fn test_find_outermost() {
    let inner = Expr::op("EQ", vec![Expr::val(1), Expr::env("CALLER", vec![])]);
    let outer = Expr::op("AND", vec![inner.clone(), Expr::op("EQ", vec![Expr::val(2), Expr::val(3)])]);
    let found = outer.find(&|e| e.is("EQ"));
    assert_eq!(found.len(), 2);
    assert_eq!(found[0], &inner);
    assert!(outer.contains_op("CALLER"));
}

#[test]
fn test_call_kinds() {
    assert_eq!(CallKind::from_name("CALL"), Some(CallKind::Call));
    assert_eq!(CallKind::from_name("CREATE"), None);
    assert_eq!(CallKind::Call.arity(), 7);
    assert_eq!(CallKind::StaticCall.arity(), 6);
    assert!(CallKind::CallCode.moves_value());
    assert!(!CallKind::DelegateCall.moves_value());
    assert_eq!(CallKind::Call.value_depth(), Some(3));
    assert_eq!(CallKind::StaticCall.value_depth(), None);
}
