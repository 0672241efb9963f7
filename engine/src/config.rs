use serde::{Deserialize, Serialize};

fn default_commitment() -> String {
    "confirmed".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    /// Endpoint used for `sendTransaction`; falls back to `url`.
    #[serde(default)]
    pub send_url: Option<String>,
    pub timeout_ms: u64,
    pub max_connections: usize,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default)]
    pub health_interval_ms: u64,
}

impl RpcConfig {
    pub fn send_url(&self) -> &str {
        self.send_url.as_deref().unwrap_or(&self.url)
    }
}

fn default_cross_ticks() -> u32 {
    100
}

fn default_taker_fee_bps() -> u64 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Ticks past the best opposite price used for the IOC limit.
    #[serde(default = "default_cross_ticks")]
    pub cross_ticks: u32,
    /// Fee headroom added to the quote budget of buy orders.
    #[serde(default = "default_taker_fee_bps")]
    pub taker_fee_bps: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            cross_ticks: default_cross_ticks(),
            taker_fee_bps: default_taker_fee_bps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                url: "https://api.mainnet-beta.solana.com".to_string(),
                send_url: None,
                timeout_ms: 30_000,
                max_connections: 8,
                commitment: default_commitment(),
                health_interval_ms: 0,
            },
            convert: ConvertConfig::default(),
        }
    }
}
