use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use engine_core::{
    find_market, ConvertAction, ConvertError, ConvertState, ExchangeClient, MarketHandle,
    MarketInfo, Metrics, Notifier, Store,
};
use tracing::{debug, info, warn};

/// Loads the market for the selected token pair into the convert store.
///
/// Every call takes a fresh sequence number; the store keeps only the result of the
/// newest request, so a slow load that resolves after a newer selection is dropped.
pub struct MarketResolver<E: ExchangeClient + 'static> {
    exchange: Arc<E>,
    store: Arc<Store<ConvertState>>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    seq: AtomicU64,
}

impl<E: ExchangeClient + 'static> MarketResolver<E> {
    pub fn new(
        exchange: Arc<E>,
        store: Arc<Store<ConvertState>>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            exchange,
            store,
            notifier,
            metrics,
            seq: AtomicU64::new(0),
        }
    }

    /// Returns the market committed by this call, `None` when there is no pair or
    /// matching market, or when a newer request superseded this one.
    pub async fn resolve(
        &self,
        markets: &[MarketInfo],
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Option<Arc<MarketHandle>>, ConvertError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.dispatch(ConvertAction::MarketRequested { seq });

        let info = match (from, to) {
            (Some(from), Some(to)) => find_market(markets, from, to),
            _ => None,
        };
        let Some(info) = info else {
            debug!(target: "resolver", seq, ?from, ?to, "no market for selection");
            self.store
                .dispatch(ConvertAction::MarketLoaded { seq, market: None });
            return Ok(None);
        };

        self.metrics.market_loads.inc();
        match self.exchange.load_market(info).await {
            Ok(handle) => {
                let market = Arc::new(handle);
                if self.store.dispatch(ConvertAction::MarketLoaded {
                    seq,
                    market: Some(market.clone()),
                }) {
                    info!(target: "resolver", seq, market = %info.name, "market selected");
                    Ok(Some(market))
                } else {
                    self.metrics.stale_results_discarded.inc();
                    debug!(target: "resolver", seq, market = %info.name, "discarding superseded market load");
                    Ok(None)
                }
            }
            Err(e) => {
                self.metrics.market_load_failures.inc();
                let err = ConvertError::load_market(&e);
                if self.is_current(seq) {
                    warn!(target: "resolver", seq, market = %info.name, error = %format!("{:#}", e), "market load failed");
                    self.store
                        .dispatch(ConvertAction::MarketLoaded { seq, market: None });
                    self.notifier.notify(err.notification());
                } else {
                    self.metrics.stale_results_discarded.inc();
                }
                Err(err)
            }
        }
    }

    fn is_current(&self, seq: u64) -> bool {
        self.store.read(|s| s.market_seq == seq)
    }
}
