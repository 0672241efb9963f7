use std::sync::Arc;

use engine_core::{
    aggressive_price, floor_to_step, funding_account_for_mint, new_client_order_id,
    AccountSource, ConvertError, ExchangeClient, MarketHandle, Metrics, OrderAck, OrderType,
    PlaceOrderRequest, Side, TokenAccount,
};
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposedOrder {
    pub side: Side,
    pub best_price: f64,
    pub price: f64,
    pub size: f64,
}

/// Turns a convert request into an immediate-or-cancel order that crosses the book.
pub struct OrderComposer<E: ExchangeClient + 'static> {
    exchange: Arc<E>,
    accounts: Arc<dyn AccountSource>,
    metrics: Arc<Metrics>,
    cross_ticks: u32,
}

struct Inflight<'a>(&'a Metrics);

impl<'a> Inflight<'a> {
    fn start(metrics: &'a Metrics) -> Self {
        metrics.inflight_orders.inc();
        Self(metrics)
    }
}

impl Drop for Inflight<'_> {
    fn drop(&mut self) {
        self.0.inflight_orders.dec();
    }
}

impl<E: ExchangeClient + 'static> OrderComposer<E> {
    pub fn new(
        exchange: Arc<E>,
        accounts: Arc<dyn AccountSource>,
        metrics: Arc<Metrics>,
        cross_ticks: u32,
    ) -> Self {
        Self {
            exchange,
            accounts,
            metrics,
            cross_ticks,
        }
    }

    /// Side, limit price and lot-aligned size for converting `size` of `from_token`.
    /// Reads the opposite side of the book; nothing is sent.
    pub async fn compose(
        &self,
        market: Option<&MarketHandle>,
        from_token: &str,
        size: f64,
    ) -> Result<ComposedOrder, ConvertError> {
        let market = market.ok_or(ConvertError::InvalidMarket)?;
        if !(size.is_finite() && size > 0.0) {
            return Err(ConvertError::InvalidSize);
        }
        let side = if market.is_base_token(from_token) {
            Side::Sell
        } else {
            Side::Buy
        };
        let book = match side {
            Side::Buy => &market.asks,
            Side::Sell => &market.bids,
        };
        let data = self
            .accounts
            .account_data(book)
            .await
            .map_err(|e| ConvertError::fetch_orderbook(&e))?
            .filter(|d| !d.is_empty())
            .ok_or(ConvertError::InvalidOrderbookData)?;
        let levels = self.exchange.decode_book(market, &data).map_err(|e| {
            warn!(target: "convert", market = %market.name(), error = %format!("{:#}", e), "undecodable order book");
            ConvertError::InvalidOrderbookData
        })?;
        let best_price = levels.first().map(|l| l.price).ok_or(ConvertError::NoBestPrice)?;

        let price = aggressive_price(best_price, market.tick_size(), side, self.cross_ticks);
        let size = floor_to_step(size, market.min_order_size());
        if size <= 0.0 {
            return Err(ConvertError::InvalidSize);
        }
        Ok(ComposedOrder {
            side,
            best_price,
            price,
            size,
        })
    }

    /// Sends `order` as IOC, funded from the owner's largest base and quote token accounts.
    pub async fn submit(
        &self,
        market: &MarketHandle,
        order: &ComposedOrder,
        token_accounts: &[TokenAccount],
        owner: &Pubkey,
    ) -> Result<OrderAck, ConvertError> {
        let request = PlaceOrderRequest {
            side: order.side,
            price: order.price,
            size: order.size,
            order_type: OrderType::ImmediateOrCancel,
            base_account: funding_account_for_mint(token_accounts, &market.base_mint, owner)
                .map(|a| a.pubkey),
            quote_account: funding_account_for_mint(token_accounts, &market.quote_mint, owner)
                .map(|a| a.pubkey),
            client_order_id: new_client_order_id(),
        };

        self.metrics.orders_sent.inc();
        let _inflight = Inflight::start(&self.metrics);
        match self.exchange.place_order(market, request).await {
            Ok(ack) => {
                self.metrics.orders_succeeded.inc();
                info!(
                    target: "convert",
                    market = %market.name(),
                    side = %order.side,
                    price = order.price,
                    size = order.size,
                    signature = %ack.signature,
                    "order placed"
                );
                Ok(ack)
            }
            Err(e) => {
                self.metrics.orders_failed.inc();
                warn!(target: "convert", market = %market.name(), error = %format!("{:#}", e), "order rejected");
                Err(ConvertError::place_order(&e))
            }
        }
    }
}
