//! Analysis orchestrator.
//!
//! Ties together loading, symbolic exploration and the reentrancy scan, and
//! renders the resulting report.

use crate::config::AnalyzerConfig;
use crate::errors::AnalysisError;
use crate::loader::Loader;
use crate::locator::{BytecodeLocator, SourceLocator};
use crate::reentrancy::{Finding, LockKind, Reentrancy};
use crate::utils::helpers::{colors, selector_hex};
use crate::vm::{Evm, Exploration};
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Asm,
    Json,
}

/// Configuration for a run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub analyzer: AnalyzerConfig,
    pub format: OutputFormat,
    pub color: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self { analyzer: AnalyzerConfig::default(), format: OutputFormat::Text, color: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub taken: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub findings: Vec<Finding>,
    /// Dispatcher selectors the reported calls depend on.
    pub selectors: Vec<String>,
    pub coverage: Coverage,
    pub endpoints: usize,
    pub checkpoints: usize,
    /// Loop bound of the exploration the report comes from.
    pub bound: usize,
    pub exhausted: bool,
}

/// Result of an analysis run. Disassembly runs carry no report.
pub struct Analysis {
    pub text: String,
    pub report: Option<Report>,
}

/// Scan an exploration with the given locator.
pub fn analyze<L: SourceLocator + ?Sized>(exploration: &Exploration, locator: &L) -> Result<Report, AnalysisError> {
    let scan = Reentrancy::new(exploration, locator).scan()?;
    Ok(Report {
        findings: scan.findings,
        selectors: scan.selectors.into_iter().map(selector_hex).collect(),
        coverage: Coverage { taken: exploration.taken, total: exploration.total },
        endpoints: exploration.endpoints.len(),
        checkpoints: exploration.checkpoint_count(),
        bound: exploration.bound,
        exhausted: exploration.exhausted,
    })
}

/// Analyse raw bytecode (hex string).
pub fn analyze_bytecode(hex_code: &str, options: &AnalyzeOptions) -> Result<Analysis> {
    let mut loader = Loader::new();
    loader.load_binary(hex_code).context("failed to load bytecode")?;

    if options.format == OutputFormat::Asm {
        return Ok(Analysis { text: loader.disasm().join("\n"), report: None });
    }

    let evm = Evm::new(loader, options.analyzer.clone());
    let exploration = evm.start().context("symbolic execution failed")?;
    let locator = BytecodeLocator::new(&evm.loader);
    let report = analyze(&exploration, &locator).context("reentrancy scan failed")?;
    info!(
        "{} findings over {} endpoints ({}/{} branches)",
        report.findings.len(),
        report.endpoints,
        report.coverage.taken,
        report.coverage.total
    );

    let text = match options.format {
        OutputFormat::Json => serde_json::to_string_pretty(&report).context("serialise to JSON")?,
        OutputFormat::Text | OutputFormat::Asm => render_text(&report, options.color),
    };
    Ok(Analysis { text, report: Some(report) })
}

fn render_text(report: &Report, color: bool) -> String {
    let mut lines = Vec::new();

    lines.push(colors::colorize(
        &format!(
            "# coverage: {}/{} branches, {} endpoints, {} checkpoints, loop bound {}",
            report.coverage.taken, report.coverage.total, report.endpoints, report.checkpoints, report.bound
        ),
        colors::GRAY,
        color,
    ));
    if report.exhausted {
        lines.push(colors::colorize(
            "# warning: loop bound exhausted before a value call was reached, results are partial",
            colors::WARNING,
            color,
        ));
    }
    lines.push(String::new());

    if report.findings.is_empty() {
        lines.push(colors::colorize("no reentrancy found", colors::OKGREEN, color));
    } else {
        for finding in &report.findings {
            let op_color = match finding.operator {
                LockKind::Function => colors::HEADER,
                LockKind::Tuple | LockKind::NonTuple => colors::FAIL,
            };
            let mut line = format!(
                "{} [{:#x}, {:#x})",
                colors::colorize(finding.operator.as_str(), op_color, color),
                finding.range[0],
                finding.range[1]
            );
            if let Some(ty) = &finding.result_type {
                line.push_str(&format!(" : {ty}"));
            }
            lines.push(line);
        }
    }

    if !report.selectors.is_empty() {
        lines.push(String::new());
        lines.push(format!("selectors: {}", report.selectors.join(", ")));
    }

    lines.join("\n")
}
