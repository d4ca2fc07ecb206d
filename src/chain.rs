//! Batched chain reads - Multicall3 Edition
//!
//! Every decision input is read through the strict `aggregate` entry point:
//! one round trip, one block height, all-or-nothing. A partial snapshot is
//! useless here because later reads are sized by earlier values (the pair
//! count gates how many pair-address reads to issue).

use alloy_primitives::{address, Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, trace};

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at the same address on all EVM chains
    interface IMulticall3 {
        struct Call {
            address target;
            bytes callData;
        }

        function aggregate(Call[] calldata calls)
            external payable returns (uint256 blockNumber, bytes[] memory returnData);
    }

    interface IErc20 {
        function decimals() external view returns (uint8);
    }
}

/// Multicall3 address (same on all EVM chains)
const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

lazy_static! {
    /// Global cache for token decimals (immutable per token)
    static ref DECIMALS_CACHE: RwLock<HashMap<Address, u8>> = RwLock::new(HashMap::new());
}

// ============================================
// READER
// ============================================

/// Read-only access to the chain. Holds no state besides the endpoint;
/// a fresh provider is built per call, as with every read path in this crate.
pub struct ChainReader {
    rpc_url: String,
}

impl ChainReader {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self { rpc_url: rpc_url.into() }
    }

    /// Plain `eth_call`
    pub async fn call(&self, to: Address, calldata: Vec<u8>) -> Result<Bytes> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let tx = TransactionRequest::default().to(to).input(calldata.into());

        let result = provider
            .call(tx)
            .await
            .map_err(|e| eyre!("eth_call to {to} failed: {e}"))?;

        Ok(result)
    }

    /// `eth_call` impersonating `from`. Used to simulate access-controlled
    /// entry points (the rebase gate) without sending a transaction.
    pub async fn call_as(&self, from: Address, to: Address, calldata: Vec<u8>) -> Result<Bytes> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let mut tx = TransactionRequest::default().to(to).input(calldata.into());
        tx.from = Some(from);

        let result = provider
            .call(tx)
            .await
            .map_err(|e| eyre!("eth_call to {to} as {from} failed: {e}"))?;

        Ok(result)
    }

    /// Execute a batch of read-only calls through Multicall3's strict
    /// `aggregate`. Results come back in input order from a single block;
    /// a result-count mismatch fails the whole read.
    pub async fn aggregate(&self, calls: Vec<(Address, Vec<u8>)>) -> Result<Vec<Bytes>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let requested = calls.len();
        let calls: Vec<IMulticall3::Call> = calls
            .into_iter()
            .map(|(target, data)| IMulticall3::Call { target, callData: data.into() })
            .collect();

        let calldata = IMulticall3::aggregateCall { calls }.abi_encode();
        let output = self.call(MULTICALL3, calldata).await?;

        let decoded = IMulticall3::aggregateCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode aggregate output: {e}"))?;

        if decoded.returnData.len() != requested {
            return Err(eyre!(
                "Aggregate returned {} results for {} calls",
                decoded.returnData.len(),
                requested
            ));
        }

        trace!(
            "aggregate: {} calls at block {}",
            requested,
            decoded.blockNumber
        );

        Ok(decoded.returnData)
    }

    /// Get a token's decimals (CACHED - immutable per token)
    pub async fn token_decimals(&self, token: Address) -> Result<u8> {
        if let Some(decimals) = DECIMALS_CACHE.read().unwrap().get(&token) {
            return Ok(*decimals);
        }

        let calldata = IErc20::decimalsCall {}.abi_encode();
        let output = self.call(token, calldata).await?;

        let decimals = IErc20::decimalsCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode decimals for {token}: {e}"))?;

        DECIMALS_CACHE.write().unwrap().insert(token, decimals);
        debug!("Cached decimals {} for token {}", decimals, token);

        Ok(decimals)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_payload_preserves_call_order() {
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0xbb);
        let calls = vec![
            IMulticall3::Call { target: a, callData: vec![1, 2, 3].into() },
            IMulticall3::Call { target: b, callData: vec![4, 5].into() },
        ];

        let encoded = IMulticall3::aggregateCall { calls }.abi_encode();
        let decoded = IMulticall3::aggregateCall::abi_decode(&encoded).unwrap();

        assert_eq!(decoded.calls.len(), 2);
        assert_eq!(decoded.calls[0].target, a);
        assert_eq!(decoded.calls[0].callData, Bytes::from(vec![1, 2, 3]));
        assert_eq!(decoded.calls[1].target, b);
    }
}
