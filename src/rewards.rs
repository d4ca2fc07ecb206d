//! Voting-escrow reward aggregation
//!
//! Expands the exchange's trading-pair universe, reads the reward records
//! accrued by the strategy's voting-escrow position on every pair, and
//! classifies them by claim destination. All reads go through Multicall3
//! so each stage decodes against a single block.

use crate::chain::ChainReader;
use crate::config::Config;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use tracing::debug;

// ============================================
// EXCHANGE INTERFACES
// ============================================

sol! {
    interface IPairFactory {
        function allPairsLength() external view returns (uint256);
        function allPairs(uint256 index) external view returns (address);
    }

    interface IVoterStrategy {
        function tokenId() external view returns (uint256);
        function claimBribe(address[] memory bribes, address[][] memory tokens) external;
        function claimFee(address[] memory fees, address[][] memory tokens) external;
    }

    /// Read API over the exchange's voting-escrow reward accounting
    interface IVeRewardApi {
        struct PairReward {
            uint256 tokenId;
            uint256 amount;
            uint8 decimals;
            address pair;
            address token;
            address fee;
            address bribe;
            string symbol;
        }

        function singlePairReward(uint256 tokenId, address pair)
            external view returns (PairReward[] memory rewards);
    }
}

// ============================================
// CLAIM GROUPS
// ============================================

/// Destination address → claimable tokens. Insertion-ordered so the encoded
/// claim calls are deterministic for a given chain state; tokens are
/// deduplicated per destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimGroups {
    pub destinations: Vec<Address>,
    pub tokens: Vec<Vec<Address>>,
}

impl ClaimGroups {
    fn push(&mut self, destination: Address, token: Address) {
        match self.destinations.iter().position(|d| *d == destination) {
            Some(i) => {
                if !self.tokens[i].contains(&token) {
                    self.tokens[i].push(token);
                }
            }
            None => {
                self.destinations.push(destination);
                self.tokens.push(vec![token]);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Total number of (destination, token) claims
    pub fn num_claims(&self) -> usize {
        self.tokens.iter().map(Vec::len).sum()
    }
}

/// Classified rewards: bribe destinations and trading-fee destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardGroups {
    pub bribes: ClaimGroups,
    pub fees: ClaimGroups,
}

/// Classify reward records by destination. Zero-amount records are dropped.
/// A record with a non-zero bribe destination is grouped as a bribe claim
/// even when its fee destination is also set - the bribe field wins.
pub fn group_rewards(
    records: impl IntoIterator<Item = IVeRewardApi::PairReward>,
) -> RewardGroups {
    let mut groups = RewardGroups::default();

    for record in records {
        if record.amount.is_zero() {
            continue;
        }
        if record.bribe != Address::ZERO {
            groups.bribes.push(record.bribe, record.token);
        } else {
            groups.fees.push(record.fee, record.token);
        }
    }

    groups
}

/// Decode a batch of `allPairs` results, re-validating the batch length
/// against the count the factory reported. A mismatch means the snapshot
/// is inconsistent and the invocation must not proceed.
pub fn decode_pair_addresses(expected: usize, encoded: &[Bytes]) -> Result<Vec<Address>> {
    if encoded.len() != expected {
        return Err(eyre!(
            "Pair factory reported {expected} pairs but the address batch returned {}",
            encoded.len()
        ));
    }

    encoded
        .iter()
        .map(|data| {
            IPairFactory::allPairsCall::abi_decode_returns(data)
                .map_err(|e| eyre!("Failed to decode pair address: {e}"))
        })
        .collect()
}

// ============================================
// FETCH
// ============================================

/// Fetch and classify every reward accrued by the strategy's voting-escrow
/// position across the full pair universe.
pub async fn fetch_reward_groups(reader: &ChainReader, cfg: &Config) -> Result<RewardGroups> {
    // Pair count and position id from one snapshot
    let head = reader
        .aggregate(vec![
            (
                cfg.pair_factory_address,
                IPairFactory::allPairsLengthCall {}.abi_encode(),
            ),
            (
                cfg.strategy_address,
                IVoterStrategy::tokenIdCall {}.abi_encode(),
            ),
        ])
        .await?;

    let num_pairs = IPairFactory::allPairsLengthCall::abi_decode_returns(&head[0])
        .map_err(|e| eyre!("Failed to decode pair count: {e}"))?;
    let token_id = IVoterStrategy::tokenIdCall::abi_decode_returns(&head[1])
        .map_err(|e| eyre!("Failed to decode voting position id: {e}"))?;

    let num_pairs =
        usize::try_from(num_pairs).map_err(|_| eyre!("Pair count {num_pairs} out of range"))?;
    debug!("{} pairs, voting position {}", num_pairs, token_id);

    // Expand the pair universe
    let pair_calls = (0..num_pairs)
        .map(|i| {
            (
                cfg.pair_factory_address,
                IPairFactory::allPairsCall { index: U256::from(i) }.abi_encode(),
            )
        })
        .collect();
    let encoded = reader.aggregate(pair_calls).await?;
    let pairs = decode_pair_addresses(num_pairs, &encoded)?;

    // One reward listing per pair, all against one block
    let reward_calls = pairs
        .iter()
        .map(|pair| {
            (
                cfg.ve_reward_api_address,
                IVeRewardApi::singlePairRewardCall { tokenId: token_id, pair: *pair }
                    .abi_encode(),
            )
        })
        .collect();
    let encoded = reader.aggregate(reward_calls).await?;

    let mut records = Vec::new();
    for data in &encoded {
        let rewards = IVeRewardApi::singlePairRewardCall::abi_decode_returns(data)
            .map_err(|e| eyre!("Failed to decode pair rewards: {e}"))?;
        records.extend(rewards);
    }

    Ok(group_rewards(records))
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(amount: u64, token: u8, fee: u8, bribe: u8) -> IVeRewardApi::PairReward {
        let addr = |b: u8| if b == 0 { Address::ZERO } else { Address::repeat_byte(b) };
        IVeRewardApi::PairReward {
            tokenId: U256::from(1u64),
            amount: U256::from(amount),
            decimals: 18,
            pair: Address::repeat_byte(0x77),
            token: addr(token),
            fee: addr(fee),
            bribe: addr(bribe),
            symbol: "TKN".to_string(),
        }
    }

    fn encoded_address(b: u8) -> Bytes {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(Address::repeat_byte(b).as_slice());
        word.to_vec().into()
    }

    #[test]
    fn test_zero_amounts_are_dropped() {
        let groups = group_rewards(vec![record(0, 0x11, 0x22, 0x33), record(0, 0x11, 0x22, 0)]);
        assert!(groups.bribes.is_empty());
        assert!(groups.fees.is_empty());
    }

    #[test]
    fn test_bribe_wins_over_fee() {
        // Both destination fields set: the record belongs to the bribe group
        let groups = group_rewards(vec![record(5, 0x11, 0x22, 0x33)]);
        assert_eq!(groups.bribes.destinations, vec![Address::repeat_byte(0x33)]);
        assert!(groups.fees.is_empty());
    }

    #[test]
    fn test_fee_grouping_when_bribe_unset() {
        let groups = group_rewards(vec![record(5, 0x11, 0x22, 0)]);
        assert!(groups.bribes.is_empty());
        assert_eq!(groups.fees.destinations, vec![Address::repeat_byte(0x22)]);
        assert_eq!(groups.fees.tokens, vec![vec![Address::repeat_byte(0x11)]]);
    }

    #[test]
    fn test_tokens_deduplicated_per_destination() {
        let groups = group_rewards(vec![
            record(5, 0x11, 0, 0x33),
            record(7, 0x11, 0, 0x33),
            record(9, 0x11, 0, 0x44),
        ]);
        assert_eq!(groups.bribes.destinations.len(), 2);
        assert_eq!(groups.bribes.tokens[0], vec![Address::repeat_byte(0x11)]);
        assert_eq!(groups.bribes.tokens[1], vec![Address::repeat_byte(0x11)]);
        assert_eq!(groups.bribes.num_claims(), 2);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let groups = group_rewards(vec![
            record(1, 0x11, 0x22, 0),
            record(1, 0x12, 0x22, 0),
            record(1, 0x13, 0x23, 0),
        ]);
        assert_eq!(
            groups.fees.destinations,
            vec![Address::repeat_byte(0x22), Address::repeat_byte(0x23)]
        );
        assert_eq!(
            groups.fees.tokens[0],
            vec![Address::repeat_byte(0x11), Address::repeat_byte(0x12)]
        );
    }

    #[test]
    fn test_pair_batch_length_mismatch_is_an_error() {
        let encoded: Vec<Bytes> = (1..=4).map(encoded_address).collect();
        let err = decode_pair_addresses(5, &encoded).unwrap_err();
        assert!(err.to_string().contains("reported 5 pairs"));
    }

    #[test]
    fn test_pair_batch_decodes_in_order() {
        let encoded: Vec<Bytes> = [0xaa, 0xbb].iter().map(|b| encoded_address(*b)).collect();
        let pairs = decode_pair_addresses(2, &encoded).unwrap();
        assert_eq!(pairs, vec![Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)]);
    }
}
