use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use engine::config::{ConvertConfig, EngineConfig, RpcConfig};
use engine_core::{CustomMarketInfo, MarketInfo};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

pub const ENV_RPC_URL: &str = "CONVERT_RPC_URL";
pub const ENV_KEYPAIR: &str = "CONVERT_KEYPAIR";

fn default_rpc() -> RpcConfig {
    EngineConfig::default().rpc
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    /// Solana CLI keypair file used for signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair_path: Option<PathBuf>,
    /// Public key for read-only use when no keypair is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_rpc")]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default, rename = "customMarkets")]
    pub custom_markets: Vec<CustomMarketInfo>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc: default_rpc(),
            wallet: WalletConfig::default(),
            convert: ConvertConfig::default(),
            custom_markets: Vec::new(),
        }
    }
}

impl AppConfig {
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL).filter(|v| !v.is_empty()) {
            self.rpc.url = url;
        }
        if let Some(path) = lookup(ENV_KEYPAIR).filter(|v| !v.is_empty()) {
            self.wallet.keypair_path = Some(PathBuf::from(path));
        }
    }
}

async fn read_config(config_path: &Path) -> Result<AppConfig> {
    if !fs::try_exists(config_path).await.unwrap_or(false) {
        info!(target: "config", path = %config_path.display(), "config file not found; using defaults");
        return Ok(AppConfig::default());
    }
    let raw = fs::read(config_path)
        .await
        .with_context(|| format!("read config file: {}", config_path.display()))?;
    serde_json::from_slice(&raw).context("parse config json")
}

/// Reads the config file (defaults when it does not exist) and applies
/// `CONVERT_RPC_URL` / `CONVERT_KEYPAIR`.
pub async fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut cfg = read_config(config_path).await?;
    cfg.apply_overrides(|key| std::env::var(key).ok());
    Ok(cfg)
}

/// Persists `market` in the config's custom market list, replacing any entry with the
/// same address.
pub async fn add_custom_market(config_path: &Path, market: CustomMarketInfo) -> Result<()> {
    MarketInfo::try_from(&market).context("validate custom market")?;
    let mut cfg = read_config(config_path).await?;
    cfg.custom_markets.retain(|m| m.address != market.address);
    info!(target: "config", name = %market.name, address = %market.address, "adding custom market");
    cfg.custom_markets.push(market);
    write_config(config_path, &cfg).await
}

async fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(cfg).context("serialize config")?;
    json.push(b'\n');
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, &json)
        .await
        .with_context(|| format!("write temp config: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("replace config: {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    os_string.into()
}
