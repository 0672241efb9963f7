use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn label(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Wire value used by the dex program (bid = 0, ask = 1).
    pub fn wire(&self) -> u32 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    #[serde(rename = "ioc")]
    ImmediateOrCancel,
    #[serde(rename = "postOnly")]
    PostOnly,
}

impl OrderType {
    pub fn wire(&self) -> u32 {
        match self {
            OrderType::Limit => 0,
            OrderType::ImmediateOrCancel => 1,
            OrderType::PostOnly => 2,
        }
    }
}

/// Order identifiers are 128-bit book keys; keep them as integers end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u128);

impl OrderId {
    /// Price component of the key (upper 64 bits), in price lots.
    pub fn price_lots(&self) -> u64 {
        (self.0 >> 64) as u64
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let v = s
            .trim()
            .parse::<u128>()
            .with_context(|| format!("parse order id '{}'", s))?;
        Ok(OrderId(v))
    }
}

impl From<u128> for OrderId {
    fn from(v: u128) -> Self {
        OrderId(v)
    }
}

/// Market entry as stored in user configuration (string addresses).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomMarketInfo {
    pub address: String,
    pub name: String,
    pub program_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketInfo {
    pub address: Pubkey,
    pub program_id: Pubkey,
    pub name: String,
    pub deprecated: bool,
    pub base_label: Option<String>,
    pub quote_label: Option<String>,
}

/// Splits `BASE/QUOTE` into its halves; both must be non-empty.
pub fn split_market_name(name: &str) -> Option<(&str, &str)> {
    let (base, quote) = name.split_once('/')?;
    if base.is_empty() || quote.is_empty() || quote.contains('/') {
        return None;
    }
    Some((base, quote))
}

impl MarketInfo {
    pub fn new(address: Pubkey, program_id: Pubkey, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if split_market_name(&name).is_none() {
            bail!("market name '{}' is not of the form BASE/QUOTE", name);
        }
        Ok(Self {
            address,
            program_id,
            name,
            deprecated: false,
            base_label: None,
            quote_label: None,
        })
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn base(&self) -> &str {
        split_market_name(&self.name).map(|(b, _)| b).unwrap_or("")
    }

    pub fn quote(&self) -> &str {
        split_market_name(&self.name).map(|(_, q)| q).unwrap_or("")
    }

    pub fn base_display(&self) -> &str {
        self.base_label.as_deref().unwrap_or_else(|| self.base())
    }

    pub fn quote_display(&self) -> &str {
        self.quote_label.as_deref().unwrap_or_else(|| self.quote())
    }
}

impl TryFrom<&CustomMarketInfo> for MarketInfo {
    type Error = anyhow::Error;

    fn try_from(custom: &CustomMarketInfo) -> Result<Self> {
        let address = Pubkey::from_str(&custom.address)
            .map_err(|e| anyhow!("invalid market address '{}': {}", custom.address, e))?;
        let program_id = Pubkey::from_str(&custom.program_id)
            .map_err(|e| anyhow!("invalid program id '{}': {}", custom.program_id, e))?;
        let mut info = MarketInfo::new(address, program_id, custom.name.clone())?;
        info.base_label = custom.base_label.clone();
        info.quote_label = custom.quote_label.clone();
        Ok(info)
    }
}

/// Decoded live market state. Replaced wholesale whenever the selected pair changes.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketHandle {
    pub info: MarketInfo,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
    pub fee_rate_bps: u64,
}

impl MarketHandle {
    pub fn validate(self) -> Result<Self> {
        if self.base_lot_size == 0 {
            bail!("market {} has zero base lot size", self.info.address);
        }
        if self.quote_lot_size == 0 {
            bail!("market {} has zero quote lot size", self.info.address);
        }
        Ok(self)
    }

    pub fn address(&self) -> &Pubkey {
        &self.info.address
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.info.program_id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// True when `token` is the base asset according to the market name.
    pub fn is_base_token(&self, token: &str) -> bool {
        self.info.base() == token
    }

    fn base_factor(&self) -> f64 {
        10f64.powi(self.base_decimals as i32)
    }

    fn quote_factor(&self) -> f64 {
        10f64.powi(self.quote_decimals as i32)
    }

    pub fn price_lots_to_number(&self, lots: u64) -> f64 {
        (lots as f64 * self.quote_lot_size as f64 * self.base_factor())
            / (self.base_lot_size as f64 * self.quote_factor())
    }

    pub fn price_number_to_lots(&self, price: f64) -> u64 {
        let lots = (price * self.quote_factor() * self.base_lot_size as f64)
            / (self.base_factor() * self.quote_lot_size as f64);
        lots.round().max(0.0) as u64
    }

    pub fn base_size_lots_to_number(&self, lots: u64) -> f64 {
        lots as f64 * self.base_lot_size as f64 / self.base_factor()
    }

    pub fn base_size_number_to_lots(&self, size: f64) -> u64 {
        (size * self.base_factor() / self.base_lot_size as f64)
            .round()
            .max(0.0) as u64
    }

    pub fn base_native_to_number(&self, native: u64) -> f64 {
        native as f64 / self.base_factor()
    }

    pub fn quote_native_to_number(&self, native: u64) -> f64 {
        native as f64 / self.quote_factor()
    }

    pub fn tick_size(&self) -> f64 {
        self.price_lots_to_number(1)
    }

    pub fn min_order_size(&self) -> f64 {
        self.base_size_lots_to_number(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
    pub price_lots: u64,
    pub size_lots: u64,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: OrderId,
    pub client_id: u64,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub open_orders: Pubkey,
    pub market: Arc<MarketHandle>,
    pub market_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub pubkey: Pubkey,
    pub effective_mint: Pubkey,
    pub amount: u64,
    pub decimals: u8,
}

impl TokenAccount {
    pub fn ui_amount(&self) -> f64 {
        self.amount as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// Largest account holding `mint` that can fund an order. The wallet's native lamport
/// entry is keyed by `owner` itself and is skipped.
pub fn funding_account_for_mint<'a>(
    accounts: &'a [TokenAccount],
    mint: &Pubkey,
    owner: &Pubkey,
) -> Option<&'a TokenAccount> {
    accounts
        .iter()
        .filter(|a| &a.effective_mint == mint && &a.pubkey != owner)
        .max_by_key(|a| a.amount)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrderRequest {
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub order_type: OrderType,
    pub base_account: Option<Pubkey>,
    pub quote_account: Option<Pubkey>,
    pub client_order_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub signature: String,
    pub open_orders: Pubkey,
    pub client_order_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
    pub description: Option<String>,
}

impl Notification {
    pub fn error(message: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NotifyLevel::Error,
            message: message.into(),
            description,
        }
    }

    pub fn success(message: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NotifyLevel::Success,
            message: message.into(),
            description,
        }
    }
}

pub fn new_client_order_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
