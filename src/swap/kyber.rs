//! KyberSwap aggregator provider
//!
//! Two round trips: fetch a route summary, then build calldata for it.
//! Slippage tolerance is a fixed 50 bps and no deadline is set; the route
//! summary is passed through opaquely. Optional extra query parameters
//! (API credentials, fee options) are merged into the route request.

use super::{QuoteParams, SwapQuote};
use crate::config::Config;
use alloy_primitives::{utils::parse_units, Address, Bytes};
use eyre::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Slippage tolerance in bps passed to the route build endpoint
const SLIPPAGE_TOLERANCE_BPS: u64 = 50;

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct RouteResponse {
    data: RouteData,
}

#[derive(Debug, Deserialize)]
struct RouteData {
    #[serde(rename = "routeSummary")]
    route_summary: Value,
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    data: BuildData,
}

#[derive(Debug, Deserialize)]
struct BuildData {
    #[serde(rename = "amountOut")]
    amount_out: String,
    #[serde(rename = "routerAddress")]
    router_address: Address,
    data: Bytes,
}

// ============================================
// PROVIDER
// ============================================

pub struct Kyber {
    http_client: Client,
    base_url: String,
    chain: String,
    client_id: String,
    extra_params: Option<Map<String, Value>>,
}

impl Kyber {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: cfg.kyber_api_url.clone(),
            chain: cfg.chain_slug.clone(),
            client_id: cfg.aggregator_client_id.clone(),
            extra_params: cfg.extra_params(),
        })
    }

    pub async fn quote(&self, params: &QuoteParams) -> Result<SwapQuote> {
        let mut query: Vec<(String, String)> = vec![
            ("tokenIn".into(), params.token_in.to_string()),
            ("tokenOut".into(), params.token_out.to_string()),
            ("amountIn".into(), params.amount_in.to_string()),
            ("to".into(), params.sender.to_string()),
            ("saveGas".into(), "0".into()),
            ("gasInclude".into(), "1".into()),
            ("source".into(), self.client_id.clone()),
        ];
        if let Some(extra) = &self.extra_params {
            for (key, value) in extra {
                query.push((key.clone(), param_value(value)));
            }
        }

        let routes: RouteResponse = self
            .http_client
            .get(format!("{}/{}/api/v1/routes", self.base_url, self.chain))
            .header("x-client-id", &self.client_id)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("kyberswap route found for {} -> {}", params.token_in, params.token_out);

        let body = json!({
            "routeSummary": routes.data.route_summary,
            "deadline": 0,
            "slippageTolerance": SLIPPAGE_TOLERANCE_BPS,
            "recipient": params.sender,
        });

        let built: BuildResponse = self
            .http_client
            .post(format!("{}/{}/api/v1/route/build", self.base_url, self.chain))
            .header("x-client-id", &self.client_id)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let out_amount =
            parse_units(&built.data.amount_out, params.token_out_decimals)?.get_absolute();

        Ok(SwapQuote {
            out_amount,
            target: built.data.router_address,
            calldata: built.data.data,
        })
    }
}

/// Render a JSON value as a flat query parameter
fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_response_parsing() {
        let raw = r#"{
            "code": 0,
            "data": {
                "routeSummary": {"tokenIn": "0x01", "route": [[{"pool": "0x02"}]]},
                "routerAddress": "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5"
            }
        }"#;

        let parsed: RouteResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.data.route_summary.get("route").is_some());
    }

    #[test]
    fn test_build_response_parsing() {
        let raw = r#"{
            "code": 0,
            "data": {
                "amountOut": "1234567",
                "routerAddress": "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5",
                "data": "0xdeadbeef"
            }
        }"#;

        let parsed: BuildResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.amount_out, "1234567");
        assert_eq!(parsed.data.data, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_param_value_rendering() {
        assert_eq!(param_value(&json!("currency_in")), "currency_in");
        assert_eq!(param_value(&json!(25)), "25");
        assert_eq!(param_value(&json!(true)), "true");
    }
}
