//! Reentrancy scanner over explored bytecode, with a source-level locator.

use evmguard::config::AnalyzerConfig;
use evmguard::loader::Loader;
use evmguard::locator::{Construct, SourceLocator, SourceRange};
use evmguard::reentrancy::{Finding, LockKind, Reentrancy};
use evmguard::vm::{Evm, Exploration};
use std::collections::BTreeSet;

/// Locator standing in for a compiler source map: every instruction maps to
/// ten source bytes per code byte.
struct SourceMap {
    tuple: bool,
    known: bool,
}

impl SourceLocator for SourceMap {
    fn locate(&self, pc: usize) -> Option<SourceRange> {
        self.known.then_some(SourceRange { start: pc * 10, length: 5 })
    }

    fn construct(&self, range: SourceRange) -> Construct {
        Construct {
            returns_tuple: self.tuple,
            result_type: (!self.tuple).then(|| "bool".to_string()),
            statement_start: range.start - 3,
        }
    }

    fn function_range(&self, selector: u32) -> Option<SourceRange> {
        match selector {
            0xa9059cbb => Some(SourceRange { start: 1000, length: 50 }),
            0x70a08231 => Some(SourceRange { start: 2000, length: 80 }),
            _ => None,
        }
    }
}

const PLAIN: SourceMap = SourceMap { tuple: false, known: true };

fn run(hex: &str) -> Exploration {
    let mut loader = Loader::new();
    loader.load_binary(hex).unwrap();
    Evm::new(loader, AnalyzerConfig::default()).start().unwrap()
}

// call(gas, 0, eq(0xa9059cbb, shr(0xe0, calldataload(0))), 0, 0, 0, 0); sstore(0, 1)
const GUARDED_CALL: &str = "600060006000600060003560e01c63a9059cbb1460005af1600160005500";

#[test]
fn test_guarded_call_reports_call_and_function() {
    let exp = run(GUARDED_CALL);
    let scan = Reentrancy::new(&exp, &PLAIN).scan().unwrap();
    assert_eq!(
        scan.findings,
        vec![
            Finding::new([230, 235], LockKind::NonTuple, Some("bool".into())),
            Finding::new([1000, 1050], LockKind::Function, None),
        ]
    );
}

#[test]
fn test_tuple_results_lock_whole_statement() {
    let exp = run(GUARDED_CALL);
    let scan = Reentrancy::new(&exp, &SourceMap { tuple: true, known: true }).scan().unwrap();
    assert_eq!(scan.findings[0].operator, LockKind::Tuple);
    assert_eq!(scan.findings[0].range, [227, 235]);
    assert_eq!(scan.findings[0].result_type, None);
}

#[test]
fn test_unlocatable_call_is_skipped() {
    let exp = run(GUARDED_CALL);
    let scan = Reentrancy::new(&exp, &SourceMap { tuple: false, known: false }).scan().unwrap();
    // The function lock does not need the call's own range.
    assert_eq!(scan.findings, vec![Finding::new([1000, 1050], LockKind::Function, None)]);
}

#[test]
fn test_scanner_accepts_trait_objects() {
    let exp = run(GUARDED_CALL);
    let locator: &dyn SourceLocator = &PLAIN;
    let scan = Reentrancy::new(&exp, locator).scan().unwrap();
    assert_eq!(scan.findings.len(), 2);
}

#[test]
fn test_legacy_div_selector() {
    // value = eq(0x70a08231, and(div(calldataload(0), 2^224), 0xffffffff))
    let hex = format!("60006000600060007c01{}60003504{}", "00".repeat(28), "63ffffffff166370a082311460005af1600160005500");
    let exp = run(&hex);
    assert_eq!(exp.checkpoint_count(), 1);
    let scan = Reentrancy::new(&exp, &PLAIN).scan().unwrap();
    assert_eq!(scan.selectors, BTreeSet::from([0x70a08231]));
    assert!(scan.findings.contains(&Finding::new([2000, 2080], LockKind::Function, None)));
}

#[test]
fn test_sequential_calls_each_reported() {
    // Two value calls, results popped, then sstore(0, 1).
    let hex = concat!(
        "60006000600060003460005af150",
        "60006000600060003460005af150",
        "600160005500",
    );
    let exp = run(hex);
    assert_eq!(exp.checkpoint_count(), 2);
    let scan = Reentrancy::new(&exp, &PLAIN).scan().unwrap();
    let ranges: Vec<[usize; 2]> = scan.findings.iter().map(|f| f.range).collect();
    assert_eq!(ranges, vec![[120, 125], [260, 265]]);
    assert!(scan.selectors.is_empty());
}

#[test]
fn test_write_before_call_only_is_clean() {
    // sstore(0, 1); call(gas, 0, callvalue(), 0, 0, 0, 0); stop
    let exp = run("600160005560006000600060003460005af100");
    assert_eq!(exp.checkpoint_count(), 1);
    let scan = Reentrancy::new(&exp, &PLAIN).scan().unwrap();
    assert!(scan.findings.is_empty());
}

#[test]
fn test_only_writing_branch_matters() {
    // call; if (calldatasize()) sstore(0, 1); stop
    //  0: call(gas, 0, callvalue(), 0, 0, 0, 0); POP
    // 14: CALLDATASIZE; PUSH1 0x13; JUMPI; STOP
    // 19: JUMPDEST; sstore(0, 1); stop
    let hex = concat!(
        "60006000600060003460005af150",
        "3660135700",
        "5b600160005500",
    );
    let exp = run(hex);
    assert_eq!(exp.endpoints.len(), 2);
    let scan = Reentrancy::new(&exp, &PLAIN).scan().unwrap();
    assert_eq!(scan.findings.len(), 1);
    assert_eq!(scan.findings[0].range, [120, 125]);
}
