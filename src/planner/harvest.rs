//! Branch A: harvest cycle
//!
//! Queues the rebase and the LP-reward claim, then one claim call per
//! non-empty reward classification.

use super::{ActionCall, Plan};
use crate::chain::ChainReader;
use crate::config::Config;
use crate::rewards::{self, IVoterStrategy, RewardGroups};
use alloy_sol_types::{sol, SolCall};
use eyre::Result;

sol! {
    interface IRebaseManager {
        function rebase() external returns (uint256);
        function claimLPRewards() external;
    }
}

pub async fn plan(reader: &ChainReader, cfg: &Config) -> Result<Plan> {
    let groups = rewards::fetch_reward_groups(reader, cfg).await?;
    Ok(Plan::Execute { calls: assemble_harvest(cfg, &groups) })
}

/// Assemble the harvest batch. Order is fixed: rebase, LP-reward claim,
/// bribe claim, fee claim - the claims assume the rebase has applied.
pub fn assemble_harvest(cfg: &Config, groups: &RewardGroups) -> Vec<ActionCall> {
    let mut calls = vec![
        ActionCall {
            target: cfg.rebase_manager_address,
            payload: IRebaseManager::rebaseCall {}.abi_encode().into(),
            label: "rebasing".to_string(),
        },
        ActionCall {
            target: cfg.rebase_manager_address,
            payload: IRebaseManager::claimLPRewardsCall {}.abi_encode().into(),
            label: "claiming LP rewards".to_string(),
        },
    ];

    if !groups.bribes.is_empty() {
        let num = groups.bribes.num_claims();
        calls.push(ActionCall {
            target: cfg.strategy_address,
            payload: IVoterStrategy::claimBribeCall {
                bribes: groups.bribes.destinations.clone(),
                tokens: groups.bribes.tokens.clone(),
            }
            .abi_encode()
            .into(),
            label: format!("claiming {num} bribe reward{}", plural(num)),
        });
    }

    if !groups.fees.is_empty() {
        let num = groups.fees.num_claims();
        calls.push(ActionCall {
            target: cfg.strategy_address,
            payload: IVoterStrategy::claimFeeCall {
                fees: groups.fees.destinations.clone(),
                tokens: groups.fees.tokens.clone(),
            }
            .abi_encode()
            .into(),
            label: format!("claiming {num} trading fee{}", plural(num)),
        });
    }

    calls
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::{group_rewards, IVeRewardApi};
    use alloy_primitives::{Address, U256};

    fn cfg() -> Config {
        Config {
            rebase_manager_address: Address::repeat_byte(0x0b),
            strategy_address: Address::repeat_byte(0x0c),
            ..Config::default()
        }
    }

    fn record(token: u8, fee: u8, bribe: u8) -> IVeRewardApi::PairReward {
        let addr = |b: u8| if b == 0 { Address::ZERO } else { Address::repeat_byte(b) };
        IVeRewardApi::PairReward {
            tokenId: U256::from(1u64),
            amount: U256::from(100u64),
            decimals: 18,
            pair: Address::repeat_byte(0x77),
            token: addr(token),
            fee: addr(fee),
            bribe: addr(bribe),
            symbol: "TKN".to_string(),
        }
    }

    #[test]
    fn test_batch_always_starts_with_rebase_then_lp_claim() {
        let calls = assemble_harvest(&cfg(), &RewardGroups::default());
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].label, "rebasing");
        assert_eq!(calls[0].target, Address::repeat_byte(0x0b));
        assert_eq!(calls[1].label, "claiming LP rewards");
    }

    #[test]
    fn test_claims_follow_in_fixed_order() {
        let groups = group_rewards(vec![
            record(0x11, 0, 0x33),
            record(0x12, 0x22, 0),
            record(0x13, 0x22, 0),
        ]);
        let calls = assemble_harvest(&cfg(), &groups);

        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2].label, "claiming 1 bribe reward");
        assert_eq!(calls[3].label, "claiming 2 trading fees");
        assert_eq!(calls[2].target, Address::repeat_byte(0x0c));
        assert_eq!(calls[3].target, Address::repeat_byte(0x0c));
    }

    #[test]
    fn test_bribe_claim_payload_encodes_grouped_lists() {
        let groups = group_rewards(vec![record(0x11, 0, 0x33), record(0x12, 0, 0x33)]);
        let calls = assemble_harvest(&cfg(), &groups);

        let decoded = IVoterStrategy::claimBribeCall::abi_decode(&calls[2].payload).unwrap();
        assert_eq!(decoded.bribes, vec![Address::repeat_byte(0x33)]);
        assert_eq!(
            decoded.tokens,
            vec![vec![Address::repeat_byte(0x11), Address::repeat_byte(0x12)]]
        );
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let groups = group_rewards(vec![record(0x11, 0x22, 0), record(0x12, 0, 0x33)]);
        assert_eq!(assemble_harvest(&cfg(), &groups), assemble_harvest(&cfg(), &groups));
    }
}
