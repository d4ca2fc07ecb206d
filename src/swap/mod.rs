//! Swap provider abstraction
//!
//! A quote is the minimal thing a containing contract call needs to embed a
//! swap: the expected output amount, a target contract, and calldata. The
//! engine never executes a quote itself.
//!
//! Providers expose one uniform capability, `attempt_quote`, and the router
//! walks an ordered chain, returning the first success. Every failure -
//! whether it surfaces before or after the provider's await point - advances
//! the chain to the next provider.

mod direct;
mod kyber;
mod openocean;

pub use direct::DirectExchange;
pub use kyber::Kyber;
pub use openocean::OpenOcean;

use crate::config::Config;
use alloy_primitives::{Address, Bytes, U256};
use eyre::{eyre, Result};
use tracing::{debug, warn};

// ============================================
// TYPES
// ============================================

/// Inputs to a quote request. `sender` is the contract that will execute the
/// returned calldata (the fee manager), not this keeper.
#[derive(Debug, Clone)]
pub struct QuoteParams {
    pub sender: Address,
    pub token_in: Address,
    pub token_in_decimals: u8,
    pub token_out: Address,
    pub token_out_decimals: u8,
    pub amount_in: U256,
}

/// An executable quote. `out_amount` is advisory; only `target` and
/// `calldata` are embedded in the emitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub out_amount: U256,
    pub target: Address,
    pub calldata: Bytes,
}

// ============================================
// PROVIDERS
// ============================================

/// One swap-liquidity source. Enum dispatch keeps the capability uniform
/// without boxing futures behind a trait object.
pub enum QuoteProvider {
    /// The protocol's own exchange router
    Direct(DirectExchange),
    /// KyberSwap aggregator (route quote + route build, two round trips)
    Kyber(Kyber),
    /// OpenOcean aggregator (single quote+build round trip)
    OpenOcean(OpenOcean),
    /// Canned quote for router tests; `None` fails after an await point
    #[cfg(test)]
    Fixed(Option<SwapQuote>),
}

impl QuoteProvider {
    pub fn name(&self) -> &'static str {
        match self {
            QuoteProvider::Direct(_) => "direct exchange",
            QuoteProvider::Kyber(_) => "kyberswap",
            QuoteProvider::OpenOcean(_) => "openocean",
            #[cfg(test)]
            QuoteProvider::Fixed(_) => "fixed",
        }
    }

    pub async fn attempt_quote(&self, params: &QuoteParams) -> Result<SwapQuote> {
        match self {
            QuoteProvider::Direct(p) => p.quote(params).await,
            QuoteProvider::Kyber(p) => p.quote(params).await,
            QuoteProvider::OpenOcean(p) => p.quote(params).await,
            #[cfg(test)]
            QuoteProvider::Fixed(quote) => {
                // Fail from the far side of an await, like a real provider
                tokio::task::yield_now().await;
                quote.clone().ok_or_else(|| eyre!("provider unavailable"))
            }
        }
    }
}

// ============================================
// ROUTER
// ============================================

/// Ordered fallback chain over the configured providers.
pub struct SwapRouter {
    providers: Vec<QuoteProvider>,
}

impl SwapRouter {
    pub fn new(providers: Vec<QuoteProvider>) -> Self {
        Self { providers }
    }

    /// Build the provider chain for this configuration. With aggregators
    /// disabled only the protocol's own exchange is consulted.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let direct = QuoteProvider::Direct(DirectExchange::new(
            cfg.rpc_url.clone(),
            cfg.exchange_router_address,
        ));

        let providers = if cfg.use_aggregator {
            vec![
                QuoteProvider::Kyber(Kyber::from_config(cfg)?),
                QuoteProvider::OpenOcean(OpenOcean::from_config(cfg)?),
                direct,
            ]
        } else {
            vec![direct]
        };

        Ok(Self::new(providers))
    }

    /// Return the first successful quote in provider order.
    pub async fn quote(&self, params: &QuoteParams) -> Result<SwapQuote> {
        for provider in &self.providers {
            match provider.attempt_quote(params).await {
                Ok(quote) => {
                    debug!(
                        "{} quoted {} -> {} out",
                        provider.name(),
                        params.amount_in,
                        quote.out_amount
                    );
                    return Ok(quote);
                }
                Err(e) => warn!("{} quote failed: {e:#}", provider.name()),
            }
        }

        Err(eyre!("Unable to swap through any of the configured swap providers"))
    }
}

// ============================================
// TESTS
// ============================================
