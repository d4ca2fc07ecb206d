//! OpenOcean aggregator provider
//!
//! Single quote+build round trip. The API takes amounts in human units and
//! a slippage percentage; the gas-price hint comes from configuration.

use super::{QuoteParams, SwapQuote};
use crate::config::Config;
use alloy_primitives::{utils::{format_units, parse_units}, Address, Bytes};
use eyre::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Slippage percentage passed to the swap-quote endpoint (0.2%)
const SLIPPAGE_PCT: &str = "0.2";

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct SwapQuoteResponse {
    data: SwapQuoteData,
}

#[derive(Debug, Deserialize)]
struct SwapQuoteData {
    #[serde(rename = "outAmount")]
    out_amount: String,
    to: Address,
    data: Bytes,
}

// ============================================
// PROVIDER
// ============================================

pub struct OpenOcean {
    http_client: Client,
    base_url: String,
    chain: String,
    gas_price_gwei: u64,
}

impl OpenOcean {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: cfg.openocean_api_url.clone(),
            chain: cfg.chain_slug.clone(),
            gas_price_gwei: cfg.aggregator_gas_price_gwei,
        })
    }

    pub async fn quote(&self, params: &QuoteParams) -> Result<SwapQuote> {
        let amount = format_units(params.amount_in, params.token_in_decimals)?;

        let query = [
            ("account", params.sender.to_string()),
            ("inTokenAddress", params.token_in.to_string()),
            ("outTokenAddress", params.token_out.to_string()),
            ("amount", amount),
            ("slippage", SLIPPAGE_PCT.to_string()),
            ("gasPrice", self.gas_price_gwei.to_string()),
        ];

        let response: SwapQuoteResponse = self
            .http_client
            .get(format!("{}/v3/{}/swap_quote", self.base_url, self.chain))
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("openocean quoted {} -> {}", params.token_in, params.token_out);

        let out_amount =
            parse_units(&response.data.out_amount, params.token_out_decimals)?.get_absolute();

        Ok(SwapQuote {
            out_amount,
            target: response.data.to,
            calldata: response.data.data,
        })
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_swap_quote_response_parsing() {
        let raw = r#"{
            "code": 200,
            "data": {
                "inAmount": "1500000000",
                "outAmount": "1.498",
                "from": "0x0000000000000000000000000000000000000001",
                "to": "0x6352a56caadC4F1E25CD6c75970Fa768A3304e64",
                "value": 0,
                "data": "0x90411a32"
            }
        }"#;

        let parsed: SwapQuoteResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.out_amount, "1.498");
        assert_eq!(parsed.data.data, Bytes::from(vec![0x90, 0x41, 0x1a, 0x32]));
    }

    #[test]
    fn test_amounts_are_exchanged_in_human_units() {
        // 1.5 units of a 9-decimal token on the way out...
        let amount = format_units(U256::from(1_500_000_000u64), 9u8).unwrap();
        assert_eq!(amount, "1.500000000");

        // ...and a human-unit string scaled back up on the way in
        let out = parse_units("1.498", 6u8).unwrap().get_absolute();
        assert_eq!(out, U256::from(1_498_000u64));
    }
}
