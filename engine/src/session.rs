use std::sync::Arc;

use anyhow::Result;
use engine_core::{
    AccountSource, ConvertAction, ConvertError, ConvertState, ExchangeClient, MarketHandle,
    MarketInfo, Metrics, Notification, Notifier, OrderAck, Store, TokenAccount,
    TokenAccountSource, TokenPairIndex,
};
use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::balance::BalanceAggregator;
use crate::composer::{ComposedOrder, OrderComposer};
use crate::config::ConvertConfig;
use crate::resolver::MarketResolver;

/// Clears the in-progress flag on every exit path of a conversion.
struct Converting<'a>(&'a Store<ConvertState>);

impl Drop for Converting<'_> {
    fn drop(&mut self) {
        self.0.dispatch(ConvertAction::ConvertFinished);
    }
}

/// The convert form: token selection, balance, size and submission.
pub struct ConvertSession<E: ExchangeClient + 'static> {
    store: Arc<Store<ConvertState>>,
    markets: RwLock<Arc<Vec<MarketInfo>>>,
    pairs: RwLock<TokenPairIndex>,
    resolver: MarketResolver<E>,
    balance: BalanceAggregator<E>,
    composer: OrderComposer<E>,
    tokens: Arc<dyn TokenAccountSource>,
    token_accounts: RwLock<Vec<TokenAccount>>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    owner: Pubkey,
}

impl<E: ExchangeClient + 'static> ConvertSession<E> {
    pub fn new(
        exchange: Arc<E>,
        accounts: Arc<dyn AccountSource>,
        tokens: Arc<dyn TokenAccountSource>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        owner: Pubkey,
        cfg: &ConvertConfig,
    ) -> Self {
        let store = Arc::new(Store::<ConvertState>::default());
        Self {
            resolver: MarketResolver::new(
                exchange.clone(),
                store.clone(),
                notifier.clone(),
                metrics.clone(),
            ),
            balance: BalanceAggregator::new(exchange.clone()),
            composer: OrderComposer::new(exchange, accounts, metrics.clone(), cfg.cross_ticks),
            store,
            markets: RwLock::new(Arc::new(Vec::new())),
            pairs: RwLock::new(TokenPairIndex::default()),
            tokens,
            token_accounts: RwLock::new(Vec::new()),
            notifier,
            metrics,
            owner,
        }
    }

    pub fn store(&self) -> &Arc<Store<ConvertState>> {
        &self.store
    }

    pub fn state(&self) -> ConvertState {
        self.store.snapshot()
    }

    pub fn owner(&self) -> &Pubkey {
        &self.owner
    }

    /// Replaces the market list and rebuilds the token-pair index.
    pub fn set_markets(&self, markets: Vec<MarketInfo>) {
        let index = TokenPairIndex::build(&markets);
        debug!(target: "convert", markets = markets.len(), tokens = index.len(), "market list updated");
        *self.pairs.write() = index;
        *self.markets.write() = Arc::new(markets);
    }

    pub fn markets(&self) -> Arc<Vec<MarketInfo>> {
        self.markets.read().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.pairs.read().tokens().map(str::to_string).collect()
    }

    pub fn neighbors(&self, token: &str) -> Vec<String> {
        self.pairs
            .read()
            .neighbors(token)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn token_accounts(&self) -> Vec<TokenAccount> {
        self.token_accounts.read().clone()
    }

    /// Selects the token to convert from. Load failures are notified and returned.
    pub async fn select_from(
        &self,
        token: Option<String>,
    ) -> Result<Option<Arc<MarketHandle>>, ConvertError> {
        self.store.dispatch(ConvertAction::SelectFrom(token));
        self.reload_market().await
    }

    pub async fn select_to(
        &self,
        token: Option<String>,
    ) -> Result<Option<Arc<MarketHandle>>, ConvertError> {
        self.store.dispatch(ConvertAction::SelectTo(token));
        self.reload_market().await
    }

    pub fn set_size(&self, size: Option<f64>) {
        self.store.dispatch(ConvertAction::SetSize(size));
    }

    /// Copies the current balance into the size field; false when it is unknown.
    pub fn use_max(&self) -> bool {
        self.store.dispatch(ConvertAction::UseMax)
    }

    async fn reload_market(&self) -> Result<Option<Arc<MarketHandle>>, ConvertError> {
        let (from, to) = self
            .store
            .read(|s| (s.from_token.clone(), s.to_token.clone()));
        let markets = self.markets();
        let market = self
            .resolver
            .resolve(&markets, from.as_deref(), to.as_deref())
            .await?;
        if market.is_some() {
            self.refresh_balance().await;
        }
        Ok(market)
    }

    /// Fetches the owner's token accounts, then recomputes the balance.
    pub async fn refresh_token_accounts(&self) -> Result<usize> {
        let accounts = self.tokens.token_accounts(&self.owner).await?;
        let n = accounts.len();
        *self.token_accounts.write() = accounts;
        self.refresh_balance().await;
        Ok(n)
    }

    /// Recomputes the balance of the from-token for the current market.
    pub async fn refresh_balance(&self) -> Option<f64> {
        let (seq, market, from) = self
            .store
            .read(|s| (s.market_seq, s.market.clone(), s.from_token.clone()));
        let (Some(market), Some(from)) = (market, from) else {
            return None;
        };
        let accounts = self.token_accounts();
        let balance = match self
            .balance
            .compute(&market, &from, &self.owner, &accounts)
            .await
        {
            Ok(b) => b,
            Err(e) => {
                warn!(target: "convert", market = %market.name(), error = %format!("{:#}", e), "balance unavailable");
                self.notifier.notify(Notification::error(
                    "Error loading balance",
                    Some(format!("{:#}", e)),
                ));
                None
            }
        };
        if !self
            .store
            .dispatch(ConvertAction::BalanceLoaded { seq, balance })
        {
            self.metrics.stale_results_discarded.inc();
            return None;
        }
        balance
    }

    /// Order that `convert` would send right now.
    pub async fn preview(&self) -> Result<ComposedOrder, ConvertError> {
        let state = self.store.snapshot();
        let from = state.from_token.as_deref().unwrap_or_default();
        let size = state.size.ok_or(ConvertError::InvalidSize)?;
        self.composer
            .compose(state.market.as_deref(), from, size)
            .await
    }

    /// Runs one conversion. Success clears the form; failure leaves it as it was.
    /// Either way the user is notified.
    pub async fn convert(&self) -> Result<OrderAck, ConvertError> {
        if !self.store.dispatch(ConvertAction::ConvertStarted) {
            let err = ConvertError::InProgress;
            self.notifier.notify(err.notification());
            return Err(err);
        }
        let _converting = Converting(&self.store);

        match self.place().await {
            Ok(ack) => {
                self.notifier
                    .notify(Notification::success("Order placed", Some(ack.signature.clone())));
                self.store.dispatch(ConvertAction::Reset);
                if let Err(err) = self.reload_market().await {
                    debug!(target: "convert", error = %err, "market reload after convert failed");
                }
                info!(target: "convert", signature = %ack.signature, "conversion sent");
                Ok(ack)
            }
            Err(err) => {
                self.notifier.notify(err.notification());
                Err(err)
            }
        }
    }

    async fn place(&self) -> Result<OrderAck, ConvertError> {
        let state = self.store.snapshot();
        let market = state.market.clone().ok_or(ConvertError::InvalidMarket)?;
        let from = state.from_token.as_deref().unwrap_or_default();
        let size = state.size.ok_or(ConvertError::InvalidSize)?;
        let order = self.composer.compose(Some(&market), from, size).await?;
        let accounts = self.token_accounts();
        self.composer
            .submit(&market, &order, &accounts, &self.owner)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::testkit::*;
    use engine_core::Side;

    struct Fixture {
        session: ConvertSession<MockExchange>,
        exchange: Arc<MockExchange>,
        accounts: Arc<MockAccounts>,
        notes: Arc<RecordingNotifier>,
        market: MarketHandle,
    }

    async fn fixture() -> Fixture {
        let market = handle("SOL/USDC");
        let exchange = Arc::new(MockExchange::default().with_market(market.clone()));
        *exchange.oo_balance.lock() = 0.25;
        let accounts = Arc::new(MockAccounts::default());
        accounts.set(market.asks, book_bytes(&[level(10.0, 4.0)]));
        accounts.set(market.bids, book_bytes(&[level(9.9, 4.0)]));
        let tokens = Arc::new(MockTokens::default());
        tokens.accounts.lock().extend([
            token_account(market.base_mint, 1_750_000_000, 9),
            token_account(market.quote_mint, 100_000_000, 6),
        ]);
        let notes = Arc::new(RecordingNotifier::new());
        let session = ConvertSession::new(
            exchange.clone(),
            accounts.clone(),
            tokens,
            notes.clone(),
            Metrics::unregistered(),
            Pubkey::new_unique(),
            &ConvertConfig::default(),
        );
        session.set_markets(vec![market.info.clone(), handle("SRM/USDC").info]);
        session.refresh_token_accounts().await.unwrap();
        Fixture {
            session,
            exchange,
            accounts,
            notes,
            market,
        }
    }

    #[tokio::test]
    async fn selection_loads_market_and_balance() {
        let f = fixture().await;
        assert_eq!(f.session.neighbors("USDC"), ["SOL", "SRM"]);
        f.session.select_from(Some("SOL".into())).await.unwrap();
        assert!(f.session.state().market.is_none());
        let m = f.session.select_to(Some("USDC".into())).await.unwrap().unwrap();
        assert_eq!(m.address(), f.market.address());
        let state = f.session.state();
        assert_eq!(state.balance, Some(2.0));
        assert!(f.session.use_max());
        assert_eq!(f.session.state().size, Some(2.0));
    }

    #[tokio::test]
    async fn native_sol_alone_offers_no_max() {
        let market = handle("SOL/USDC");
        let owner = Pubkey::new_unique();
        let exchange = Arc::new(MockExchange::default().with_market(market.clone()));
        let accounts = Arc::new(MockAccounts::default());
        accounts.set(market.bids, book_bytes(&[level(9.9, 4.0)]));
        let tokens = Arc::new(MockTokens::default());
        tokens.accounts.lock().push(TokenAccount {
            pubkey: owner,
            effective_mint: market.base_mint,
            amount: 5_000_000_000,
            decimals: 9,
        });
        let session = ConvertSession::new(
            exchange,
            accounts,
            tokens,
            Arc::new(RecordingNotifier::new()),
            Metrics::unregistered(),
            owner,
            &ConvertConfig::default(),
        );
        session.set_markets(vec![market.info.clone()]);
        session.refresh_token_accounts().await.unwrap();
        session.select_from(Some("SOL".into())).await.unwrap();
        assert!(session.select_to(Some("USDC".into())).await.unwrap().is_some());
        assert_eq!(session.state().balance, None);
        assert!(!session.use_max());
        assert_eq!(session.state().size, None);
    }

    #[tokio::test]
    async fn successful_convert_resets_the_form() {
        let f = fixture().await;
        f.session.select_from(Some("SOL".into())).await.unwrap();
        f.session.select_to(Some("USDC".into())).await.unwrap();
        f.session.set_size(Some(1.2345));
        let preview = f.session.preview().await.unwrap();
        assert_eq!(preview.side, Side::Sell);

        let ack = f.session.convert().await.unwrap();
        assert_eq!(ack.signature, "sig-place");
        let placed = f.exchange.placed.lock().clone();
        assert!((placed[0].size - 1.23).abs() < 1e-9);

        let state = f.session.state();
        assert!(state.from_token.is_none() && state.to_token.is_none());
        assert!(state.size.is_none() && state.balance.is_none());
        assert!(state.market.is_none());
        assert!(!state.converting);
        assert_eq!(f.notes.messages(), ["Order placed"]);
    }

    #[tokio::test]
    async fn missing_book_aborts_and_keeps_the_form() {
        let f = fixture().await;
        f.session.select_from(Some("USDC".into())).await.unwrap();
        f.session.select_to(Some("SOL".into())).await.unwrap();
        f.session.set_size(Some(5.0));
        f.accounts.data.lock().remove(&f.market.asks);
        let before = f.session.state();

        let err = f.session.convert().await.unwrap_err();
        assert_eq!(err, ConvertError::InvalidOrderbookData);
        let after = f.session.state();
        assert_eq!(after.from_token, before.from_token);
        assert_eq!(after.size, before.size);
        assert_eq!(after.balance, before.balance);
        assert!(!after.converting);
        assert_eq!(f.notes.messages(), ["Invalid orderbook data"]);
        assert!(f.exchange.placed.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_market_load_is_returned_to_the_caller() {
        let f = fixture().await;
        f.session.select_from(Some("SRM".into())).await.unwrap();
        let err = f.session.select_to(Some("USDC".into())).await.unwrap_err();
        assert!(matches!(err, ConvertError::LoadMarket(_)));
        assert_eq!(err.message(), "Error loading market");
        assert!(f.session.state().market.is_none());
        assert_eq!(f.notes.messages(), ["Error loading market"]);
    }

    #[tokio::test]
    async fn convert_without_market_is_invalid() {
        let f = fixture().await;
        f.session.set_size(Some(1.0));
        assert_eq!(f.session.convert().await, Err(ConvertError::InvalidMarket));
        assert!(!f.session.state().converting);
    }

    #[tokio::test]
    async fn second_convert_while_busy_is_refused() {
        let f = fixture().await;
        f.session.store().dispatch(ConvertAction::ConvertStarted);
        assert_eq!(f.session.convert().await, Err(ConvertError::InProgress));
        // the refused call must not clear the flag owned by the running one
        assert!(f.session.state().converting);
    }
}
