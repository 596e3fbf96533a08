//! Analyzer configuration.
//!
//! Read from JSON with camelCase keys; every key is optional and falls back
//! to its default.

use crate::errors::VmError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzerConfig {
    /// Initial number of `JUMPDEST`s a single path may visit.
    pub max_visited_block: usize,
    /// Ceiling for the loop bound when exploration is retried.
    pub max_visited_block_bound: usize,
    /// Increment applied to the loop bound on each retry.
    pub max_visited_block_step: usize,
    /// Distance the free memory pointer advances when a symbolic value is
    /// stored into it.
    pub allocated_range: u64,
    /// Constant substituted for calldata reads at unaligned or symbolic
    /// offsets.
    pub dataload: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_visited_block: 30,
            max_visited_block_bound: 90,
            max_visited_block_step: 15,
            allocated_range: 0x100,
            dataload: 2,
        }
    }
}

impl AnalyzerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, VmError> {
        let config: AnalyzerConfig =
            serde_json::from_str(text).map_err(|e| VmError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VmError> {
        if self.max_visited_block == 0 {
            return Err(VmError::InvalidConfig("maxVisitedBlock must be positive".into()));
        }
        if self.max_visited_block_step == 0 {
            return Err(VmError::InvalidConfig("maxVisitedBlockStep must be positive".into()));
        }
        if self.max_visited_block_bound < self.max_visited_block {
            return Err(VmError::InvalidConfig(format!(
                "maxVisitedBlockBound ({}) is below maxVisitedBlock ({})",
                self.max_visited_block_bound, self.max_visited_block
            )));
        }
        Ok(())
    }
}
