//! Branch B: fee conversion
//!
//! Runs when no rebase is due. Distributing the pending treasury fee takes
//! priority; only when nothing is pending does the reward-token conversion
//! fire. At most one call is emitted per invocation - a partial success
//! changes the state the next tick reads, which suppresses duplicates.

use super::{ActionCall, Plan};
use crate::chain::ChainReader;
use crate::config::Config;
use crate::swap::{QuoteParams, SwapQuote, SwapRouter};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use tracing::debug;

/// Skip reason when neither conversion path fires
pub const NO_CLAIMABLE_FEES: &str = "no claimable fees";

sol! {
    interface IFeeManager {
        function pendingTreasuryFee() external view returns (uint256);
        function checkConvertibleRewards()
            external view returns (bool canConvert, address token, uint256 amount);
        function convertRewardToken(address token, uint256 amount, address target, bytes calldata data) external;
        function distributeTreasuryFees(uint256 amount, address target, bytes calldata data) external;
    }

    interface IWrappedSettlement {
        function previewRedeem(uint256 shares) external view returns (uint256);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256);
    }
}

// ============================================
// SNAPSHOT + DECISION
// ============================================

/// Convertible-fee snapshot, read once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertibleFeeState {
    pub pending_treasury_fee: U256,
    pub can_convert: bool,
    pub token: Address,
    pub amount: U256,
}

/// What branch B should do, decided purely from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionDecision {
    /// Swap the pending treasury fee toward the payout token and forward it.
    /// Takes priority over reward-token conversion.
    DistributeFees { pending_fee: U256, swap_amount: U256 },
    /// Reward token is the settlement token itself - nothing to swap
    ConvertSettlement { token: Address, amount: U256 },
    /// Reward token is the wrapped settlement asset - redeem directly
    RedeemWrapped { token: Address, amount: U256 },
    /// Any other reward token goes through the swap providers
    ConvertViaSwap { token: Address, amount: U256 },
    Nothing,
}

pub fn decide_conversion(
    state: &ConvertibleFeeState,
    fee_in_settlement: U256,
    cfg: &Config,
) -> ConversionDecision {
    if fee_in_settlement > U256::ZERO {
        return ConversionDecision::DistributeFees {
            pending_fee: state.pending_treasury_fee,
            swap_amount: fee_in_settlement,
        };
    }

    if !state.can_convert {
        return ConversionDecision::Nothing;
    }

    if state.token == cfg.settlement_token_address {
        ConversionDecision::ConvertSettlement { token: state.token, amount: state.amount }
    } else if state.token == cfg.wrapped_settlement_address {
        ConversionDecision::RedeemWrapped { token: state.token, amount: state.amount }
    } else {
        ConversionDecision::ConvertViaSwap { token: state.token, amount: state.amount }
    }
}

// ============================================
// PLANNING
// ============================================

pub async fn plan(reader: &ChainReader, cfg: &Config) -> Result<Plan> {
    let state = read_convertible_state(reader, cfg).await?;

    // Settlement-currency value of the pending fee at the current redemption rate
    let output = reader
        .call(
            cfg.wrapped_settlement_address,
            IWrappedSettlement::previewRedeemCall { shares: state.pending_treasury_fee }
                .abi_encode(),
        )
        .await?;
    let fee_in_settlement = IWrappedSettlement::previewRedeemCall::abi_decode_returns(&output)
        .map_err(|e| eyre!("Failed to decode previewRedeem output: {e}"))?;

    debug!(
        "pending treasury fee {} ({} in settlement), convertible: {}",
        state.pending_treasury_fee, fee_in_settlement, state.can_convert
    );

    match decide_conversion(&state, fee_in_settlement, cfg) {
        ConversionDecision::DistributeFees { pending_fee, swap_amount } => {
            let router = SwapRouter::from_config(cfg)?;
            let quote = router
                .quote(&QuoteParams {
                    sender: cfg.fee_manager_address,
                    token_in: cfg.settlement_token_address,
                    token_in_decimals: cfg.settlement_token_decimals,
                    token_out: cfg.payout_token_address,
                    token_out_decimals: cfg.payout_token_decimals,
                    amount_in: swap_amount,
                })
                .await?;
            Ok(Plan::Execute { calls: vec![distribute_call(cfg, pending_fee, &quote)] })
        }
        ConversionDecision::ConvertSettlement { token, amount } => Ok(Plan::Execute {
            calls: vec![convert_call(cfg, token, amount, Address::ZERO, Bytes::new())],
        }),
        ConversionDecision::RedeemWrapped { token, amount } => {
            let payload = IWrappedSettlement::redeemCall {
                shares: amount,
                receiver: cfg.fee_manager_address,
                owner: cfg.fee_manager_address,
            }
            .abi_encode();
            Ok(Plan::Execute {
                calls: vec![convert_call(
                    cfg,
                    token,
                    amount,
                    cfg.wrapped_settlement_address,
                    payload.into(),
                )],
            })
        }
        ConversionDecision::ConvertViaSwap { token, amount } => {
            let decimals = reader.token_decimals(token).await?;
            let router = SwapRouter::from_config(cfg)?;
            let quote = router
                .quote(&QuoteParams {
                    sender: cfg.fee_manager_address,
                    token_in: token,
                    token_in_decimals: decimals,
                    token_out: cfg.settlement_token_address,
                    token_out_decimals: cfg.settlement_token_decimals,
                    amount_in: amount,
                })
                .await?;
            Ok(Plan::Execute {
                calls: vec![convert_call(cfg, token, amount, quote.target, quote.calldata)],
            })
        }
        ConversionDecision::Nothing => {
            Ok(Plan::Skip { reason: NO_CLAIMABLE_FEES.to_string() })
        }
    }
}

async fn read_convertible_state(reader: &ChainReader, cfg: &Config) -> Result<ConvertibleFeeState> {
    let results = reader
        .aggregate(vec![
            (cfg.fee_manager_address, IFeeManager::pendingTreasuryFeeCall {}.abi_encode()),
            (cfg.fee_manager_address, IFeeManager::checkConvertibleRewardsCall {}.abi_encode()),
        ])
        .await?;

    let pending_treasury_fee = IFeeManager::pendingTreasuryFeeCall::abi_decode_returns(&results[0])
        .map_err(|e| eyre!("Failed to decode pending treasury fee: {e}"))?;
    let convertible = IFeeManager::checkConvertibleRewardsCall::abi_decode_returns(&results[1])
        .map_err(|e| eyre!("Failed to decode convertible rewards: {e}"))?;

    Ok(ConvertibleFeeState {
        pending_treasury_fee,
        can_convert: convertible.canConvert,
        token: convertible.token,
        amount: convertible.amount,
    })
}

// ============================================
// CALL ASSEMBLY
// ============================================

fn distribute_call(cfg: &Config, pending_fee: U256, quote: &SwapQuote) -> ActionCall {
    ActionCall {
        target: cfg.fee_manager_address,
        payload: IFeeManager::distributeTreasuryFeesCall {
            amount: pending_fee,
            target: quote.target,
            data: quote.calldata.clone(),
        }
        .abi_encode()
        .into(),
        label: "distributing fees to treasury".to_string(),
    }
}

fn convert_call(
    cfg: &Config,
    token: Address,
    amount: U256,
    target: Address,
    data: Bytes,
) -> ActionCall {
    ActionCall {
        target: cfg.fee_manager_address,
        payload: IFeeManager::convertRewardTokenCall { token, amount, target, data }
            .abi_encode()
            .into(),
        label: format!("converting reward token {token}"),
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            fee_manager_address: Address::repeat_byte(0x0f),
            settlement_token_address: Address::repeat_byte(0x08),
            wrapped_settlement_address: Address::repeat_byte(0x09),
            payout_token_address: Address::repeat_byte(0x0a),
            ..Config::default()
        }
    }

    fn state(pending: u64, can_convert: bool, token: Address, amount: u64) -> ConvertibleFeeState {
        ConvertibleFeeState {
            pending_treasury_fee: U256::from(pending),
            can_convert,
            token,
            amount: U256::from(amount),
        }
    }

    #[test]
    fn test_fee_distribution_takes_priority_over_conversion() {
        // Convertible rewards exist, but a pending fee wins the invocation
        let s = state(500, true, Address::repeat_byte(0x42), 900);
        let decision = decide_conversion(&s, U256::from(480u64), &cfg());
        assert_eq!(
            decision,
            ConversionDecision::DistributeFees {
                pending_fee: U256::from(500u64),
                swap_amount: U256::from(480u64),
            }
        );
    }

    #[test]
    fn test_nothing_to_do() {
        let s = state(0, false, Address::ZERO, 0);
        assert_eq!(decide_conversion(&s, U256::ZERO, &cfg()), ConversionDecision::Nothing);
        assert_eq!(
            Plan::Skip { reason: NO_CLAIMABLE_FEES.to_string() },
            Plan::Skip { reason: "no claimable fees".to_string() }
        );
    }

    #[test]
    fn test_settlement_token_needs_no_swap() {
        let c = cfg();
        let s = state(0, true, c.settlement_token_address, 777);
        let decision = decide_conversion(&s, U256::ZERO, &c);
        assert_eq!(
            decision,
            ConversionDecision::ConvertSettlement {
                token: c.settlement_token_address,
                amount: U256::from(777u64),
            }
        );

        let call = convert_call(&c, c.settlement_token_address, U256::from(777u64), Address::ZERO, Bytes::new());
        let decoded = IFeeManager::convertRewardTokenCall::abi_decode(&call.payload).unwrap();
        assert_eq!(decoded.target, Address::ZERO);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn test_wrapped_asset_redeems_directly() {
        let c = cfg();
        let s = state(0, true, c.wrapped_settlement_address, 321);
        assert_eq!(
            decide_conversion(&s, U256::ZERO, &c),
            ConversionDecision::RedeemWrapped {
                token: c.wrapped_settlement_address,
                amount: U256::from(321u64),
            }
        );

        // The conversion payload embeds redeem(shares, feeManager, feeManager)
        let redeem = IWrappedSettlement::redeemCall {
            shares: U256::from(321u64),
            receiver: c.fee_manager_address,
            owner: c.fee_manager_address,
        }
        .abi_encode();
        let call = convert_call(
            &c,
            c.wrapped_settlement_address,
            U256::from(321u64),
            c.wrapped_settlement_address,
            redeem.into(),
        );

        let outer = IFeeManager::convertRewardTokenCall::abi_decode(&call.payload).unwrap();
        assert_eq!(outer.target, c.wrapped_settlement_address);
        let inner = IWrappedSettlement::redeemCall::abi_decode(&outer.data).unwrap();
        assert_eq!(inner.shares, U256::from(321u64));
        assert_eq!(inner.receiver, c.fee_manager_address);
        assert_eq!(inner.owner, c.fee_manager_address);
    }

    #[test]
    fn test_other_tokens_go_through_the_swap_providers() {
        let c = cfg();
        let token = Address::repeat_byte(0x42);
        let s = state(0, true, token, 50);
        assert_eq!(
            decide_conversion(&s, U256::ZERO, &c),
            ConversionDecision::ConvertViaSwap { token, amount: U256::from(50u64) }
        );
    }

    #[test]
    fn test_distribute_call_embeds_quote() {
        let c = cfg();
        let quote = SwapQuote {
            out_amount: U256::from(480u64),
            target: Address::repeat_byte(0xee),
            calldata: vec![0xab, 0xcd].into(),
        };

        let call = distribute_call(&c, U256::from(500u64), &quote);
        assert_eq!(call.target, c.fee_manager_address);
        assert_eq!(call.label, "distributing fees to treasury");

        let decoded = IFeeManager::distributeTreasuryFeesCall::abi_decode(&call.payload).unwrap();
        assert_eq!(decoded.amount, U256::from(500u64));
        assert_eq!(decoded.target, Address::repeat_byte(0xee));
        assert_eq!(decoded.data, Bytes::from(vec![0xab, 0xcd]));
    }

    #[test]
    fn test_decision_is_pure() {
        let c = cfg();
        let s = state(500, true, Address::repeat_byte(0x42), 900);
        assert_eq!(
            decide_conversion(&s, U256::from(1u64), &c),
            decide_conversion(&s, U256::from(1u64), &c)
        );
    }
}
