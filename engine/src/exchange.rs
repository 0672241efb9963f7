use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use engine_core::{
    ExchangeClient, Level, MarketHandle, MarketInfo, Order, OrderAck, OrderId, PlaceOrderRequest,
    Side,
};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
};
use tracing::{debug, info};

use crate::config::ConvertConfig;
use crate::rpc_pool::{data_size, memcmp, RpcPool};
use crate::serum::{
    decode_mint_decimals, BookSide, CancelOrderV2, MarketState, NewOrderV3, OpenOrdersAccount,
    OPEN_ORDERS_LEN, OPEN_ORDERS_MARKET_OFFSET, OPEN_ORDERS_OWNER_OFFSET,
};
use crate::wallet::Wallet;

const FEE_BPS_DENOMINATOR: u128 = 10_000;

/// Serum v3 client over JSON-RPC.
#[derive(Clone)]
pub struct SerumExchange {
    rpc: RpcPool,
    wallet: Arc<dyn Wallet>,
    cfg: ConvertConfig,
}

impl SerumExchange {
    pub fn new(rpc: RpcPool, wallet: Arc<dyn Wallet>, cfg: ConvertConfig) -> Self {
        Self { rpc, wallet, cfg }
    }

    pub fn wallet(&self) -> &Arc<dyn Wallet> {
        &self.wallet
    }

    async fn required_account(&self, address: &Pubkey, what: &str) -> Result<Vec<u8>> {
        self.rpc
            .get_account_data(address)
            .await?
            .ok_or_else(|| anyhow!("{} account {} not found", what, address))
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8> {
        let data = self.required_account(mint, "mint").await?;
        decode_mint_decimals(&data).with_context(|| format!("mint {}", mint))
    }

    /// Open-orders accounts of `owner` on `market`.
    pub async fn find_open_orders_accounts(
        &self,
        market: &MarketHandle,
        owner: &Pubkey,
    ) -> Result<Vec<OpenOrdersAccount>> {
        let raw = self
            .rpc
            .get_program_accounts(
                market.program_id(),
                vec![
                    memcmp(OPEN_ORDERS_MARKET_OFFSET, market.address()),
                    memcmp(OPEN_ORDERS_OWNER_OFFSET, owner),
                    data_size(OPEN_ORDERS_LEN),
                ],
            )
            .await?;
        let accounts = raw
            .into_iter()
            .map(|(address, data)| {
                OpenOrdersAccount::decode(address, &data)
                    .with_context(|| format!("open orders account {}", address))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            target: "exchange",
            market = %market.name(),
            %owner,
            count = accounts.len(),
            "open orders accounts"
        );
        Ok(accounts)
    }

    async fn book_side(&self, address: &Pubkey) -> Result<BookSide> {
        let data = self.required_account(address, "order book").await?;
        BookSide::decode(&data).with_context(|| format!("order book {}", address))
    }
}

/// Builds the live market view; the decoded account must describe `info`.
pub fn market_handle(
    info: MarketInfo,
    state: &MarketState,
    base_decimals: u8,
    quote_decimals: u8,
) -> Result<MarketHandle> {
    if state.own_address != info.address {
        bail!(
            "market account {} reports own address {}",
            info.address,
            state.own_address
        );
    }
    MarketHandle {
        info,
        base_mint: state.base_mint,
        quote_mint: state.quote_mint,
        base_decimals,
        quote_decimals,
        base_vault: state.base_vault,
        quote_vault: state.quote_vault,
        request_queue: state.request_queue,
        event_queue: state.event_queue,
        bids: state.bids,
        asks: state.asks,
        vault_signer_nonce: state.vault_signer_nonce,
        base_lot_size: state.base_lot_size,
        quote_lot_size: state.quote_lot_size,
        fee_rate_bps: state.fee_rate_bps,
    }
    .validate()
}

/// Lot-denominated order parameters. The limit price never drops below one lot and
/// buys reserve `taker_fee_bps` of extra quote for fees.
pub fn new_order_params(
    market: &MarketHandle,
    request: &PlaceOrderRequest,
    taker_fee_bps: u64,
) -> Result<NewOrderV3> {
    if !(request.size.is_finite() && request.price.is_finite()) {
        bail!("order price and size must be finite");
    }
    let limit_price_lots = market.price_number_to_lots(request.price).max(1);
    let max_base_lots = market.base_size_number_to_lots(request.size);
    if max_base_lots == 0 {
        bail!(
            "order size {} is below the minimum of {}",
            request.size,
            market.min_order_size()
        );
    }
    let mut quote =
        market.quote_lot_size as u128 * limit_price_lots as u128 * max_base_lots as u128;
    if request.side == Side::Buy {
        quote = quote * (FEE_BPS_DENOMINATOR + taker_fee_bps as u128) / FEE_BPS_DENOMINATOR;
    }
    let max_native_quote_including_fees =
        u64::try_from(quote).map_err(|_| anyhow!("quote amount {} overflows u64", quote))?;
    Ok(NewOrderV3 {
        side: request.side,
        limit_price_lots,
        max_base_lots,
        max_native_quote_including_fees,
        order_type: request.order_type,
        client_order_id: request.client_order_id,
    })
}

/// Orders in `bids` and `asks` placed through one of `accounts`.
pub fn orders_for_owner(
    market: &Arc<MarketHandle>,
    bids: &BookSide,
    asks: &BookSide,
    accounts: &[OpenOrdersAccount],
) -> Vec<Order> {
    let mut out = Vec::new();
    for (book, side) in [(bids, Side::Buy), (asks, Side::Sell)] {
        for leaf in &book.leaves {
            if !accounts.iter().any(|a| a.address == leaf.owner) {
                continue;
            }
            out.push(Order {
                order_id: OrderId(leaf.key),
                client_id: leaf.client_order_id,
                side,
                price: market.price_lots_to_number(leaf.price_lots()),
                size: market.base_size_lots_to_number(leaf.quantity),
                open_orders: leaf.owner,
                market: market.clone(),
                market_name: market.name().to_string(),
            });
        }
    }
    out
}

/// Free (unsettled) funds summed over `accounts`, in token units.
pub fn free_balance(market: &MarketHandle, accounts: &[OpenOrdersAccount], base: bool) -> f64 {
    if base {
        let native: u64 = accounts.iter().map(|a| a.base_token_free).sum();
        market.base_native_to_number(native)
    } else {
        let native: u64 = accounts.iter().map(|a| a.quote_token_free).sum();
        market.quote_native_to_number(native)
    }
}

#[async_trait]
impl ExchangeClient for SerumExchange {
    async fn load_market(&self, info: &MarketInfo) -> Result<MarketHandle> {
        let data = self.required_account(&info.address, "market").await?;
        let state = MarketState::decode(&data).with_context(|| format!("market {}", info.name))?;
        let (base_decimals, quote_decimals) = futures::try_join!(
            self.mint_decimals(&state.base_mint),
            self.mint_decimals(&state.quote_mint)
        )?;
        let handle = market_handle(info.clone(), &state, base_decimals, quote_decimals)?;
        info!(
            target: "exchange",
            market = %handle.name(),
            address = %handle.address(),
            tick = handle.tick_size(),
            min_size = handle.min_order_size(),
            "market loaded"
        );
        Ok(handle)
    }

    fn decode_book(&self, market: &MarketHandle, data: &[u8]) -> Result<Vec<Level>> {
        Ok(BookSide::decode(data)?.l2(market, usize::MAX))
    }

    async fn place_order(
        &self,
        market: &MarketHandle,
        request: PlaceOrderRequest,
    ) -> Result<OrderAck> {
        let owner = self.wallet.public_key();
        let params = new_order_params(market, &request, self.cfg.taker_fee_bps)?;
        let payer = match request.side {
            Side::Buy => request.quote_account,
            Side::Sell => request.base_account,
        }
        .ok_or_else(|| {
            let token = match request.side {
                Side::Buy => market.info.quote(),
                Side::Sell => market.info.base(),
            };
            anyhow!("no {} token account to fund the order", token)
        })?;

        let mut instructions = Vec::with_capacity(2);
        let mut signers = Vec::new();
        let existing = self.find_open_orders_accounts(market, &owner).await?;
        let open_orders = match existing.first() {
            Some(account) => account.address,
            None => {
                let account = Keypair::new();
                let lamports = self
                    .rpc
                    .get_minimum_balance_for_rent_exemption(OPEN_ORDERS_LEN)
                    .await?;
                instructions.push(system_instruction::create_account(
                    &owner,
                    &account.pubkey(),
                    lamports,
                    OPEN_ORDERS_LEN as u64,
                    market.program_id(),
                ));
                info!(target: "exchange", market = %market.name(), open_orders = %account.pubkey(), "creating open orders account");
                let address = account.pubkey();
                signers.push(account);
                address
            }
        };
        instructions.push(params.instruction(market, &open_orders, &payer, &owner));

        info!(
            target: "exchange",
            market = %market.name(),
            side = %request.side,
            price_lots = params.limit_price_lots,
            base_lots = params.max_base_lots,
            max_quote = params.max_native_quote_including_fees,
            client_id = params.client_order_id,
            "sending order"
        );
        let signature = self
            .wallet
            .sign_and_send(instructions, signers)
            .await
            .context("send order transaction")?;
        Ok(OrderAck {
            signature,
            open_orders,
            client_order_id: request.client_order_id,
        })
    }

    async fn cancel_order(&self, order: &Order) -> Result<String> {
        let owner = self.wallet.public_key();
        let ix = CancelOrderV2 {
            side: order.side,
            order_id: order.order_id.0,
        }
        .instruction(&order.market, &order.open_orders, &owner);
        info!(target: "exchange", market = %order.market_name, order_id = %order.order_id, "sending cancel");
        self.wallet
            .sign_and_send(vec![ix], Vec::new())
            .await
            .context("send cancel transaction")
    }

    async fn open_orders_balance(
        &self,
        market: &MarketHandle,
        owner: &Pubkey,
        base: bool,
    ) -> Result<f64> {
        let accounts = self.find_open_orders_accounts(market, owner).await?;
        Ok(free_balance(market, &accounts, base))
    }

    async fn open_orders(&self, market: &MarketHandle, owner: &Pubkey) -> Result<Vec<Order>> {
        let accounts = self.find_open_orders_accounts(market, owner).await?;
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let (bids, asks) =
            futures::try_join!(self.book_side(&market.bids), self.book_side(&market.asks))?;
        let market = Arc::new(market.clone());
        Ok(orders_for_owner(&market, &bids, &asks, &accounts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serum::layout::tests::{encode_open_orders, sample_market};
    use crate::serum::slab::tests::{encode_side, three_level_tree};
    use crate::testkit::handle;
    use engine_core::OrderType;

    fn request(side: Side, price: f64, size: f64) -> PlaceOrderRequest {
        PlaceOrderRequest {
            side,
            price,
            size,
            order_type: OrderType::ImmediateOrCancel,
            base_account: Some(Pubkey::new_unique()),
            quote_account: Some(Pubkey::new_unique()),
            client_order_id: 9,
        }
    }

    #[test]
    fn market_handle_requires_matching_own_address() {
        let info = handle("SOL/USDC").info;
        let state = sample_market(info.address);
        let m = market_handle(info.clone(), &state, 9, 6).unwrap();
        assert_eq!(m.bids, state.bids);
        assert_eq!(m.base_lot_size, 100_000_000);

        let other = sample_market(Pubkey::new_unique());
        assert!(market_handle(info.clone(), &other, 9, 6).is_err());

        let mut zero = sample_market(info.address);
        zero.quote_lot_size = 0;
        assert!(market_handle(info, &zero, 9, 6).is_err());
    }

    #[test]
    fn buy_reserves_fee_headroom() {
        let m = handle("SOL/USDC");
        let p = new_order_params(&m, &request(Side::Buy, 11.0, 1.23), 22).unwrap();
        assert_eq!(p.limit_price_lots, 1100);
        assert_eq!(p.max_base_lots, 123);
        // 100 * 1100 * 123 = 13_530_000, plus 0.22%
        assert_eq!(p.max_native_quote_including_fees, 13_559_766);
        assert_eq!(p.order_type, OrderType::ImmediateOrCancel);
        assert_eq!(p.client_order_id, 9);
    }

    #[test]
    fn sell_price_is_clamped_to_one_lot() {
        let m = handle("SOL/USDC");
        let p = new_order_params(&m, &request(Side::Sell, -0.5, 1.23), 22).unwrap();
        assert_eq!(p.limit_price_lots, 1);
        assert_eq!(p.max_native_quote_including_fees, 100 * 123);
    }

    #[test]
    fn dust_sizes_are_rejected() {
        let m = handle("SOL/USDC");
        assert!(new_order_params(&m, &request(Side::Buy, 11.0, 0.001), 22).is_err());
        assert!(new_order_params(&m, &request(Side::Buy, f64::NAN, 1.0), 22).is_err());
    }

    #[test]
    fn owned_orders_are_picked_from_both_sides() {
        let m = Arc::new(handle("SOL/USDC"));
        let oo_address = Pubkey::new_unique();
        let stranger = Pubkey::new_unique();
        let bids = BookSide::decode(&encode_side(true, 0, &three_level_tree(oo_address, stranger)))
            .unwrap();
        let asks = BookSide::decode(&encode_side(false, 0, &three_level_tree(stranger, stranger)))
            .unwrap();
        let data = encode_open_orders(m.address(), &Pubkey::new_unique(), 0, 0, &[]);
        let account = OpenOrdersAccount::decode(oo_address, &data).unwrap();

        let orders = orders_for_owner(&m, &bids, &asks, &[account]);
        assert_eq!(orders.len(), 1);
        let o = &orders[0];
        assert_eq!(o.side, Side::Buy);
        assert_eq!(o.order_id, OrderId((1000u128 << 64) | 1));
        assert_eq!(o.client_id, 1);
        assert!((o.price - 10.0).abs() < 1e-9);
        assert!((o.size - 0.02).abs() < 1e-9);
        assert_eq!(o.open_orders, oo_address);
        assert_eq!(o.market_name, "SOL/USDC");
    }

    #[test]
    fn free_balance_sums_accounts() {
        let m = handle("SOL/USDC");
        let owner = Pubkey::new_unique();
        let accounts: Vec<_> = [(1_500_000_000u64, 2_000_000u64), (500_000_000, 250_000)]
            .iter()
            .map(|(base, quote)| {
                let data = encode_open_orders(m.address(), &owner, *base, *quote, &[]);
                OpenOrdersAccount::decode(Pubkey::new_unique(), &data).unwrap()
            })
            .collect();
        assert!((free_balance(&m, &accounts, true) - 2.0).abs() < 1e-9);
        assert!((free_balance(&m, &accounts, false) - 2.25).abs() < 1e-9);
        assert_eq!(free_balance(&m, &[], true), 0.0);
    }
}
