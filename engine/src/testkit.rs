//! In-memory ports for exercising the convert and cancel flows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use engine_core::*;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Semaphore;

/// 9-decimal base, 6-decimal quote, tick 0.01 and min size 0.01.
pub fn handle(name: &str) -> MarketHandle {
    MarketHandle {
        info: MarketInfo::new(Pubkey::new_unique(), Pubkey::new_unique(), name).unwrap(),
        base_mint: Pubkey::new_unique(),
        quote_mint: Pubkey::new_unique(),
        base_decimals: 9,
        quote_decimals: 6,
        base_vault: Pubkey::new_unique(),
        quote_vault: Pubkey::new_unique(),
        request_queue: Pubkey::new_unique(),
        event_queue: Pubkey::new_unique(),
        bids: Pubkey::new_unique(),
        asks: Pubkey::new_unique(),
        vault_signer_nonce: 0,
        base_lot_size: 10_000_000,
        quote_lot_size: 100,
        fee_rate_bps: 0,
    }
}

pub fn level(price: f64, size: f64) -> Level {
    Level {
        price,
        size,
        price_lots: 0,
        size_lots: 0,
    }
}

/// Book account bytes understood by [`MockExchange::decode_book`].
pub fn book_bytes(levels: &[Level]) -> Vec<u8> {
    serde_json::to_vec(levels).unwrap()
}

pub fn order(market: &Arc<MarketHandle>, id: u128, side: Side, price: f64, size: f64) -> Order {
    Order {
        order_id: OrderId(id),
        client_id: 0,
        side,
        price,
        size,
        open_orders: Pubkey::new_unique(),
        market: market.clone(),
        market_name: market.name().to_string(),
    }
}

pub fn token_account(mint: Pubkey, amount: u64, decimals: u8) -> TokenAccount {
    TokenAccount {
        pubkey: Pubkey::new_unique(),
        effective_mint: mint,
        amount,
        decimals,
    }
}

#[derive(Default)]
pub struct MockExchange {
    pub markets: Mutex<HashMap<Pubkey, MarketHandle>>,
    pub load_delay: Mutex<HashMap<Pubkey, Duration>>,
    pub placed: Mutex<Vec<PlaceOrderRequest>>,
    pub place_error: Mutex<Option<String>>,
    pub cancelled: Mutex<Vec<OrderId>>,
    pub cancel_error: Mutex<Option<String>>,
    /// When set, each cancel waits for one permit.
    pub cancel_gate: Option<Arc<Semaphore>>,
    pub oo_balance: Mutex<f64>,
    pub orders: Mutex<HashMap<Pubkey, Vec<Order>>>,
}

impl MockExchange {
    pub fn with_market(self, market: MarketHandle) -> Self {
        self.markets.lock().insert(market.info.address, market);
        self
    }

    pub fn delay(&self, address: Pubkey, by: Duration) {
        self.load_delay.lock().insert(address, by);
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn load_market(&self, info: &MarketInfo) -> Result<MarketHandle> {
        let delay = self.load_delay.lock().get(&info.address).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.markets
            .lock()
            .get(&info.address)
            .cloned()
            .ok_or_else(|| anyhow!("account {} not found", info.address))
    }

    fn decode_book(&self, _market: &MarketHandle, data: &[u8]) -> Result<Vec<Level>> {
        Ok(serde_json::from_slice(data)?)
    }

    async fn place_order(
        &self,
        _market: &MarketHandle,
        request: PlaceOrderRequest,
    ) -> Result<OrderAck> {
        if let Some(e) = self.place_error.lock().clone() {
            bail!(e);
        }
        let client_order_id = request.client_order_id;
        self.placed.lock().push(request);
        Ok(OrderAck {
            signature: "sig-place".to_string(),
            open_orders: Pubkey::new_unique(),
            client_order_id,
        })
    }

    async fn cancel_order(&self, order: &Order) -> Result<String> {
        if let Some(gate) = &self.cancel_gate {
            gate.acquire().await?.forget();
        }
        if let Some(e) = self.cancel_error.lock().clone() {
            bail!(e);
        }
        self.cancelled.lock().push(order.order_id);
        Ok("sig-cancel".to_string())
    }

    async fn open_orders_balance(
        &self,
        _market: &MarketHandle,
        _owner: &Pubkey,
        _base: bool,
    ) -> Result<f64> {
        Ok(*self.oo_balance.lock())
    }

    async fn open_orders(&self, market: &MarketHandle, _owner: &Pubkey) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .lock()
            .get(market.address())
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockAccounts {
    pub data: Mutex<HashMap<Pubkey, Vec<u8>>>,
    pub fail: Mutex<bool>,
}

impl MockAccounts {
    pub fn set(&self, address: Pubkey, data: Vec<u8>) {
        self.data.lock().insert(address, data);
    }
}

#[async_trait]
impl AccountSource for MockAccounts {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        if *self.fail.lock() {
            bail!("connection refused");
        }
        Ok(self.data.lock().get(address).cloned())
    }
}

#[derive(Default)]
pub struct MockTokens {
    pub accounts: Mutex<Vec<TokenAccount>>,
}

#[async_trait]
impl TokenAccountSource for MockTokens {
    async fn token_accounts(&self, _owner: &Pubkey) -> Result<Vec<TokenAccount>> {
        Ok(self.accounts.lock().clone())
    }
}
