//! evmguard command line interface.

use anyhow::{Context, Result};
use clap::Parser;
use evmguard::analyzer::{analyze_bytecode, AnalyzeOptions, OutputFormat};
use evmguard::config::AnalyzerConfig;
use std::io::{IsTerminal, Read};

#[derive(Parser, Debug)]
#[command(
    name = "evmguard",
    version,
    about = "Symbolic EVM bytecode analyzer that finds reentrancy and where to lock"
)]
struct Cli {
    /// Bytecode as a hex string (with or without 0x prefix).
    #[arg(value_name = "BYTECODE")]
    bytecode: Option<String>,

    /// Read bytecode from a file instead.
    #[arg(short = 'f', long)]
    file: Option<String>,

    /// Output format: text (default), asm, json.
    #[arg(short = 'o', long, default_value = "text")]
    format: String,

    /// Analyzer configuration as a JSON file (camelCase keys).
    #[arg(long, value_name = "JSON")]
    config: Option<String>,

    /// Initial number of blocks a path may visit.
    #[arg(long)]
    max_visited_block: Option<usize>,

    /// Ceiling for the loop bound when exploration is retried.
    #[arg(long)]
    max_visited_block_bound: Option<usize>,

    /// Loop bound increment per retry.
    #[arg(long)]
    max_visited_block_step: Option<usize>,

    /// Free memory pointer stride for symbolic allocations.
    #[arg(long)]
    allocated_range: Option<u64>,

    /// Constant read from calldata at unaligned or symbolic offsets.
    #[arg(long)]
    dataload: Option<u64>,

    /// Disable coloured output.
    #[arg(long)]
    no_color: bool,
}

impl Cli {
    /// File configuration first, then individual flags on top.
    fn analyzer_config(&self) -> Result<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
                AnalyzerConfig::from_json(&text).with_context(|| format!("invalid config {path}"))?
            }
            None => AnalyzerConfig::default(),
        };
        if let Some(v) = self.max_visited_block {
            config.max_visited_block = v;
        }
        if let Some(v) = self.max_visited_block_bound {
            config.max_visited_block_bound = v;
        }
        if let Some(v) = self.max_visited_block_step {
            config.max_visited_block_step = v;
        }
        if let Some(v) = self.allocated_range {
            config.allocated_range = v;
        }
        if let Some(v) = self.dataload {
            config.dataload = v;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let hex_code = if let Some(ref path) = cli.file {
        let mut buf = String::new();
        std::fs::File::open(path)
            .with_context(|| format!("failed to open {path}"))?
            .read_to_string(&mut buf)?;
        buf.trim().to_string()
    } else if let Some(ref code) = cli.bytecode {
        code.trim().to_string()
    } else if std::io::stdin().is_terminal() {
        anyhow::bail!("no bytecode provided, pass it as an argument, via -f, or pipe to stdin");
    } else {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf.trim().to_string()
    };

    if hex_code.is_empty() {
        anyhow::bail!("empty bytecode");
    }

    let format = match cli.format.as_str() {
        "asm" => OutputFormat::Asm,
        "json" => OutputFormat::Json,
        "text" => OutputFormat::Text,
        other => anyhow::bail!("unknown output format '{other}' (expected text, json or asm)"),
    };

    let options = AnalyzeOptions { analyzer: cli.analyzer_config()?, format, color: !cli.no_color };

    let result = analyze_bytecode(&hex_code, &options)?;
    println!("{}", result.text);

    Ok(())
}
