//! Decision engine
//!
//! One invocation is one pass: simulate the rebase to pick a branch, run
//! that branch's planner, and emit either an executable call batch or a
//! no-op with a reason. The two branches are mutually exclusive; the gate
//! is a pure function of the simulated rebase amount so it can be tested
//! apart from the planners that consume it.

mod convert;
mod harvest;

pub use convert::{decide_conversion, ConversionDecision, ConvertibleFeeState};
pub use harvest::assemble_harvest;

use crate::chain::ChainReader;
use crate::config::Config;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use eyre::{eyre, Result};
use serde::Serialize;
use tracing::info;

// ============================================
// OUTPUT TYPES
// ============================================

/// One item of the emitted batch. Order is significant: claims depend on
/// the rebase having been applied first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCall {
    pub target: Address,
    pub payload: Bytes,
    pub label: String,
}

/// Terminal output of an invocation; handed to the external executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Plan {
    Execute { calls: Vec<ActionCall> },
    Skip { reason: String },
}

impl Plan {
    pub fn is_executable(&self) -> bool {
        matches!(self, Plan::Execute { .. })
    }

    /// Operation labels, in call order
    pub fn ops(&self) -> Vec<String> {
        match self {
            Plan::Execute { calls } => calls.iter().map(|c| c.label.clone()).collect(),
            Plan::Skip { .. } => Vec::new(),
        }
    }
}

// ============================================
// BRANCH SELECTION
// ============================================

/// Which of the two branches runs this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The simulated rebase would distribute a non-zero amount
    HarvestDue,
    /// Nothing to rebase; look at accumulated fees instead
    ConversionDue,
}

/// Pure branch selection from the read snapshot.
pub fn decide(pending_rebase: U256) -> Decision {
    if pending_rebase.is_zero() {
        Decision::ConversionDue
    } else {
        Decision::HarvestDue
    }
}

/// Run one full decision pass against current chain state.
pub async fn run_once(reader: &ChainReader, cfg: &Config) -> Result<Plan> {
    let pending = read_pending_rebase(reader, cfg).await?;

    match decide(pending) {
        Decision::HarvestDue => {
            info!("harvest due: simulated rebase distributes {pending}");
            harvest::plan(reader, cfg).await
        }
        Decision::ConversionDue => convert::plan(reader, cfg).await,
    }
}

/// Simulate the rebase as a read. The entry point is access controlled, so
/// the call runs impersonating the configured executor.
async fn read_pending_rebase(reader: &ChainReader, cfg: &Config) -> Result<U256> {
    let output = reader
        .call_as(
            cfg.executor_address,
            cfg.rebase_manager_address,
            harvest::IRebaseManager::rebaseCall {}.abi_encode(),
        )
        .await?;

    harvest::IRebaseManager::rebaseCall::abi_decode_returns(&output)
        .map_err(|e| eyre!("Failed to decode simulated rebase amount: {e}"))
}

// ============================================
// TESTS
// ============================================
