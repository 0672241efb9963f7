use crate::model::*;
use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

/// Raw on-chain account state.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// `Ok(None)` when the account does not exist.
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
pub trait TokenAccountSource: Send + Sync {
    async fn token_accounts(&self, owner: &Pubkey) -> Result<Vec<TokenAccount>>;
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn load_market(&self, info: &MarketInfo) -> Result<MarketHandle>;

    /// Decodes one side of the book, best level first.
    fn decode_book(&self, market: &MarketHandle, data: &[u8]) -> Result<Vec<Level>>;

    async fn place_order(&self, market: &MarketHandle, request: PlaceOrderRequest)
        -> Result<OrderAck>;

    async fn cancel_order(&self, order: &Order) -> Result<String>;

    /// Unsettled funds of `owner` on `market` for the base (`true`) or quote side.
    async fn open_orders_balance(
        &self,
        market: &MarketHandle,
        owner: &Pubkey,
        base: bool,
    ) -> Result<f64>;

    async fn open_orders(&self, market: &MarketHandle, owner: &Pubkey) -> Result<Vec<Order>>;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
