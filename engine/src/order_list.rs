use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashSet;
use engine_core::{
    ConvertError, ExchangeClient, MarketHandle, Metrics, Notification, Notifier, OpenOrderTable,
    Order, OrderId, OrderRow, TableQuery,
};
use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

/// Marks one order as cancelling until dropped.
struct Busy<'a> {
    set: &'a DashSet<OrderId>,
    id: OrderId,
}

impl<'a> Busy<'a> {
    fn mark(set: &'a DashSet<OrderId>, id: OrderId) -> Option<Self> {
        set.insert(id).then(|| Self { set, id })
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// The user's resting orders with per-row cancel.
pub struct OpenOrderList<E: ExchangeClient + 'static> {
    exchange: Arc<E>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    table: RwLock<OpenOrderTable>,
    busy: DashSet<OrderId>,
}

impl<E: ExchangeClient + 'static> OpenOrderList<E> {
    pub fn new(exchange: Arc<E>, notifier: Arc<dyn Notifier>, metrics: Arc<Metrics>) -> Self {
        Self {
            exchange,
            notifier,
            metrics,
            table: RwLock::new(OpenOrderTable::default()),
            busy: DashSet::new(),
        }
    }

    /// Reloads orders of `owner` across `markets`; returns how many rest in the book.
    pub async fn refresh(&self, markets: &[Arc<MarketHandle>], owner: &Pubkey) -> Result<usize> {
        let loads = markets
            .iter()
            .map(|m| self.exchange.open_orders(m, owner));
        let mut orders = Vec::new();
        for batch in futures::future::try_join_all(loads).await? {
            orders.extend(batch);
        }
        let n = orders.len();
        self.table.write().set_orders(orders);
        info!(target: "orders", markets = markets.len(), orders = n, "open orders refreshed");
        Ok(n)
    }

    pub fn set_orders(&self, orders: Vec<Order>) {
        self.table.write().set_orders(orders);
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn is_busy(&self, id: OrderId) -> bool {
        self.busy.contains(&id)
    }

    pub fn rows(&self, query: &TableQuery) -> Vec<OrderRow> {
        let busy: HashSet<OrderId> = self.busy.iter().map(|id| *id).collect();
        self.table.read().rows(query, &busy)
    }

    pub fn page_count(&self, query: &TableQuery) -> usize {
        self.table.read().page_count(query)
    }

    pub fn market_filters(&self) -> Vec<String> {
        self.table.read().market_filters()
    }

    /// Cancels one order. `on_success` runs once the cancel lands, after the row's busy
    /// marker is cleared; a failure only notifies.
    pub async fn cancel<F: FnOnce()>(
        &self,
        order_id: OrderId,
        on_success: F,
    ) -> Result<String, ConvertError> {
        let result = self.try_cancel(order_id).await;
        match result {
            Ok(signature) => {
                info!(target: "orders", %order_id, %signature, "order cancelled");
                self.notifier
                    .notify(Notification::success("Order cancelled", Some(signature.clone())));
                on_success();
                Ok(signature)
            }
            Err(err) => {
                self.metrics.cancels_failed.inc();
                warn!(target: "orders", %order_id, error = %err, "cancel failed");
                self.notifier.notify(err.notification());
                Err(err)
            }
        }
    }

    async fn try_cancel(&self, order_id: OrderId) -> Result<String, ConvertError> {
        let order = self
            .table
            .read()
            .find(order_id)
            .cloned()
            .ok_or_else(|| ConvertError::CancelOrder(format!("unknown order {}", order_id)))?;
        let _busy = Busy::mark(&self.busy, order_id).ok_or_else(|| {
            ConvertError::CancelOrder(format!("order {} is already being cancelled", order_id))
        })?;
        self.metrics.cancels_sent.inc();
        self.exchange
            .cancel_order(&order)
            .await
            .map_err(|e| ConvertError::cancel_order(&e))
    }
}
