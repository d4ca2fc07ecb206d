//! Direct swap through the protocol's own exchange router
//!
//! Quotes via `getAmountOut` (which also reports whether the stable or the
//! volatile pool wins) and encodes a single-hop swap with a 0.2% slippage
//! allowance on the minimum-out bound and no deadline.

use super::{QuoteParams, SwapQuote};
use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use tracing::debug;

sol! {
    /// Solidly-style exchange router
    interface IExchangeRouter {
        function getAmountOut(uint256 amountIn, address tokenIn, address tokenOut)
            external view returns (uint256 amount, bool stable);

        function swapExactTokensForTokensSimple(
            uint256 amountIn,
            uint256 amountOutMin,
            address tokenFrom,
            address tokenTo,
            bool stable,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }
}

/// Minimum-out bound with the fixed 0.2% slippage allowance
pub fn min_amount_out(amount: U256) -> U256 {
    amount * U256::from(998) / U256::from(1000)
}

pub struct DirectExchange {
    rpc_url: String,
    router: Address,
}

impl DirectExchange {
    pub fn new(rpc_url: String, router: Address) -> Self {
        Self { rpc_url, router }
    }

    pub async fn quote(&self, params: &QuoteParams) -> Result<SwapQuote> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let calldata = IExchangeRouter::getAmountOutCall {
            amountIn: params.amount_in,
            tokenIn: params.token_in,
            tokenOut: params.token_out,
        }
        .abi_encode();

        let tx = TransactionRequest::default().to(self.router).input(calldata.into());
        let output = provider
            .call(tx)
            .await
            .map_err(|e| eyre!("getAmountOut failed: {e}"))?;

        let quoted = IExchangeRouter::getAmountOutCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode getAmountOut output: {e}"))?;

        debug!(
            "direct exchange: {} in -> {} out (stable: {})",
            params.amount_in, quoted.amount, quoted.stable
        );

        let calldata = IExchangeRouter::swapExactTokensForTokensSimpleCall {
            amountIn: params.amount_in,
            amountOutMin: min_amount_out(quoted.amount),
            tokenFrom: params.token_in,
            tokenTo: params.token_out,
            stable: quoted.stable,
            to: params.sender,
            deadline: U256::MAX,
        }
        .abi_encode();

        Ok(SwapQuote {
            out_amount: quoted.amount,
            target: self.router,
            calldata: calldata.into(),
        })
    }
}

// ============================================
// TESTS
// ============================================
