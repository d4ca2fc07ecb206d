//! Keeper configuration
//!
//! One `Config` is resolved per invocation and threaded through every
//! component - no ambient lookups inside the planners or the swap router.
//! Addresses come from the environment (or a TOML file) and are validated
//! up front so a misconfigured keeper fails before it reads the chain.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Per-invocation configuration for the keeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// Primary RPC URL
    pub rpc_url: String,

    /// Chain ID (137 = Polygon)
    pub chain_id: u64,

    /// Chain name used in aggregator API paths (e.g. "polygon")
    pub chain_slug: String,

    // ========== Contract Addresses ==========
    /// Address the rebase simulation runs as (the authorized executor)
    pub executor_address: Address,

    /// Fee manager (holds accumulated protocol fees, executes conversions)
    pub fee_manager_address: Address,

    /// Rebase manager (rebase + LP reward claims)
    pub rebase_manager_address: Address,

    /// Strategy holding the protocol's voting-escrow position
    pub strategy_address: Address,

    /// Trading-pair factory of the protocol's exchange
    pub pair_factory_address: Address,

    /// Voting-escrow reward API (per-pair reward listing)
    pub ve_reward_api_address: Address,

    /// Router of the protocol's own exchange (direct swap path)
    pub exchange_router_address: Address,

    // ========== Token Addresses ==========
    /// Settlement stable the protocol accounts fees in
    pub settlement_token_address: Address,
    pub settlement_token_decimals: u8,

    /// ERC-4626 wrapper around the settlement token
    pub wrapped_settlement_address: Address,

    /// Stable the treasury cut is paid out in
    pub payout_token_address: Address,
    pub payout_token_decimals: u8,

    // ========== Swap Providers ==========
    /// Allow external aggregators (otherwise only the protocol's exchange)
    pub use_aggregator: bool,

    /// KyberSwap aggregator API base URL
    pub kyber_api_url: String,

    /// OpenOcean aggregator API base URL
    pub openocean_api_url: String,

    /// Client id sent to the aggregator APIs
    pub aggregator_client_id: String,

    /// Extra query parameters for the route request, as a JSON object
    pub aggregator_extra_params: Option<String>,

    /// Gas price hint (gwei) passed to OpenOcean
    pub aggregator_gas_price_gwei: u64,

    /// Timeout for aggregator HTTP calls
    pub http_timeout_secs: u64,

    // ========== Plan Log ==========
    /// Append every decision to the plan log
    pub plan_log: bool,

    /// Path of the JSONL plan log
    pub plan_log_path: String,

    // ========== Watch Mode ==========
    /// Seconds between ticks when running with --watch
    pub scan_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let chain_id: u64 = env::var("CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .unwrap_or(137);

        Ok(Self {
            rpc_url: env::var("RPC_URL")
                .unwrap_or_else(|_| "https://polygon-rpc.com".to_string()),
            chain_id,
            chain_slug: env::var("CHAIN_SLUG")
                .unwrap_or_else(|_| default_chain_slug(chain_id).to_string()),

            executor_address: address_var("EXECUTOR_ADDRESS"),
            fee_manager_address: address_var("FEE_MANAGER_ADDRESS"),
            rebase_manager_address: address_var("REBASE_MANAGER_ADDRESS"),
            strategy_address: address_var("STRATEGY_ADDRESS"),
            pair_factory_address: address_var("PAIR_FACTORY_ADDRESS"),
            ve_reward_api_address: address_var("VE_REWARD_API_ADDRESS"),
            exchange_router_address: address_var("EXCHANGE_ROUTER_ADDRESS"),

            settlement_token_address: address_var("SETTLEMENT_TOKEN_ADDRESS"),
            settlement_token_decimals: env::var("SETTLEMENT_TOKEN_DECIMALS")
                .unwrap_or_else(|_| "9".to_string())
                .parse()
                .unwrap_or(9),
            wrapped_settlement_address: address_var("WRAPPED_SETTLEMENT_ADDRESS"),
            payout_token_address: address_var("PAYOUT_TOKEN_ADDRESS"),
            payout_token_decimals: env::var("PAYOUT_TOKEN_DECIMALS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .unwrap_or(6),

            use_aggregator: env::var("USE_AGGREGATOR")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            kyber_api_url: env::var("KYBER_API_URL")
                .unwrap_or_else(|_| "https://aggregator-api.kyberswap.com".to_string()),
            openocean_api_url: env::var("OPENOCEAN_API_URL")
                .unwrap_or_else(|_| "https://open-api.openocean.finance".to_string()),
            aggregator_client_id: env::var("AGGREGATOR_CLIENT_ID")
                .unwrap_or_else(|_| "keeper".to_string()),
            aggregator_extra_params: env::var("AGGREGATOR_EXTRA_PARAMS").ok(),
            aggregator_gas_price_gwei: env::var("AGGREGATOR_GAS_PRICE_GWEI")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            plan_log: env::var("PLAN_LOG")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            plan_log_path: env::var("PLAN_LOG_PATH")
                .unwrap_or_else(|_| "./logs/plans.log".to_string()),

            scan_interval_secs: env::var("SCAN_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration before the first chain read
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a valid RPC endpoint"));
        }

        for (name, addr) in [
            ("EXECUTOR_ADDRESS", self.executor_address),
            ("FEE_MANAGER_ADDRESS", self.fee_manager_address),
            ("REBASE_MANAGER_ADDRESS", self.rebase_manager_address),
            ("STRATEGY_ADDRESS", self.strategy_address),
            ("PAIR_FACTORY_ADDRESS", self.pair_factory_address),
            ("VE_REWARD_API_ADDRESS", self.ve_reward_api_address),
            ("EXCHANGE_ROUTER_ADDRESS", self.exchange_router_address),
            ("SETTLEMENT_TOKEN_ADDRESS", self.settlement_token_address),
            ("WRAPPED_SETTLEMENT_ADDRESS", self.wrapped_settlement_address),
            ("PAYOUT_TOKEN_ADDRESS", self.payout_token_address),
        ] {
            if addr == Address::ZERO {
                return Err(eyre::eyre!("{name} is not configured"));
            }
        }

        if let Some(extra) = &self.aggregator_extra_params {
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(extra)
                .map_err(|e| eyre::eyre!("AGGREGATOR_EXTRA_PARAMS is not a JSON object: {e}"))?;
        }

        if self.settlement_token_decimals > 36 || self.payout_token_decimals > 36 {
            return Err(eyre::eyre!("Token decimals out of range"));
        }

        Ok(())
    }

    /// Extra aggregator query parameters, parsed
    pub fn extra_params(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.aggregator_extra_params
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                KEEPER - CONFIGURATION                      ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Chain Slug:        {:^40} ║", self.chain_slug);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SWAP PROVIDERS                                             ║");
        println!(
            "║ • Aggregators:     {:^40} ║",
            if self.use_aggregator { "✓ Enabled" } else { "✗ Direct exchange only" }
        );
        println!("║ • Client ID:       {:^40} ║", self.aggregator_client_id);
        println!("║ • Gas Hint:        {:>35} gwei ║", self.aggregator_gas_price_gwei);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ PLAN LOG                                                   ║");
        println!(
            "║ • Enabled:         {:^40} ║",
            if self.plan_log { "✓" } else { "✗" }
        );
        println!("║ • Path:            {:^40} ║", self.plan_log_path);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ WATCH MODE                                                 ║");
        println!("║ • Interval:        {:>36} secs ║", self.scan_interval_secs);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://polygon-rpc.com".to_string(),
            chain_id: 137,
            chain_slug: "polygon".to_string(),
            executor_address: Address::ZERO,
            fee_manager_address: Address::ZERO,
            rebase_manager_address: Address::ZERO,
            strategy_address: Address::ZERO,
            pair_factory_address: Address::ZERO,
            ve_reward_api_address: Address::ZERO,
            exchange_router_address: Address::ZERO,
            settlement_token_address: Address::ZERO,
            settlement_token_decimals: 9,
            wrapped_settlement_address: Address::ZERO,
            payout_token_address: Address::ZERO,
            payout_token_decimals: 6,
            use_aggregator: true,
            kyber_api_url: "https://aggregator-api.kyberswap.com".to_string(),
            openocean_api_url: "https://open-api.openocean.finance".to_string(),
            aggregator_client_id: "keeper".to_string(),
            aggregator_extra_params: None,
            aggregator_gas_price_gwei: 30,
            http_timeout_secs: 10,
            plan_log: true,
            plan_log_path: "./logs/plans.log".to_string(),
            scan_interval_secs: 300,
        }
    }
}

/// Parse an address from the environment, zero when unset or malformed.
/// `validate()` rejects zero addresses, so a typo fails loudly before any read.
fn address_var(name: &str) -> Address {
    env::var(name)
        .ok()
        .and_then(|s| Address::from_str(s.trim()).ok())
        .unwrap_or(Address::ZERO)
}

/// Chain name used in aggregator API paths
fn default_chain_slug(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "ethereum",
        10 => "optimism",
        56 => "bsc",
        137 => "polygon",
        8453 => "base",
        42161 => "arbitrum",
        _ => "polygon",
    }
}

// ============================================
// PLAN LOGGER
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

/// One decision, appended to the plan log as a JSON line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanLog {
    pub timestamp: DateTime<Utc>,
    pub chain_id: u64,
    pub executable: bool,
    pub ops: Vec<String>,
    pub reason: Option<String>,
}

impl PlanLog {
    /// Append this log to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let addr = |b: u8| Address::repeat_byte(b);
        Config {
            executor_address: addr(1),
            fee_manager_address: addr(2),
            rebase_manager_address: addr(3),
            strategy_address: addr(4),
            pair_factory_address: addr(5),
            ve_reward_api_address: addr(6),
            exchange_router_address: addr(7),
            settlement_token_address: addr(8),
            wrapped_settlement_address: addr(9),
            payout_token_address: addr(10),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_fails_validation() {
        // All addresses default to zero, so an unconfigured keeper must not run
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configured_validates() {
        let config = configured();
        config.validate().unwrap();
        assert!(config.use_aggregator);
        assert_eq!(config.settlement_token_decimals, 9);
        assert_eq!(config.payout_token_decimals, 6);
    }

    #[test]
    fn test_chain_slug_mapping() {
        assert_eq!(default_chain_slug(137), "polygon");
        assert_eq!(default_chain_slug(1), "ethereum");
        assert_eq!(default_chain_slug(999_999), "polygon");
    }

    #[test]
    fn test_extra_params_must_be_object() {
        let mut config = configured();
        config.aggregator_extra_params = Some(r#"{"chargeFeeBy":"currency_in"}"#.to_string());
        config.validate().unwrap();
        assert_eq!(config.extra_params().unwrap().len(), 1);

        config.aggregator_extra_params = Some("[1,2,3]".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = configured();
        let encoded = toml::to_string_pretty(&config).unwrap();
        let decoded: Config = toml::from_str(&encoded).unwrap();
        assert_eq!(config, decoded);
    }
}
