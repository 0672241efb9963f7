use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub orders_sent: IntCounter,
    pub orders_succeeded: IntCounter,
    pub orders_failed: IntCounter,
    pub cancels_sent: IntCounter,
    pub cancels_failed: IntCounter,
    pub market_loads: IntCounter,
    pub market_load_failures: IntCounter,
    pub stale_results_discarded: IntCounter,
    pub inflight_orders: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl Metrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Arc<Self>> {
        let inflight_orders =
            IntGauge::with_opts(Opts::new("inflight_orders", "Orders awaiting confirmation"))?;
        registry.register(Box::new(inflight_orders.clone()))?;
        Ok(Arc::new(Self {
            orders_sent: counter(registry, "orders_sent", "Total orders sent")?,
            orders_succeeded: counter(registry, "orders_succeeded", "Orders succeeded")?,
            orders_failed: counter(registry, "orders_failed", "Orders failed")?,
            cancels_sent: counter(registry, "cancels_sent", "Cancel requests sent")?,
            cancels_failed: counter(registry, "cancels_failed", "Cancel requests failed")?,
            market_loads: counter(registry, "market_loads", "Market state loads")?,
            market_load_failures: counter(
                registry,
                "market_load_failures",
                "Market state loads that failed",
            )?,
            stale_results_discarded: counter(
                registry,
                "stale_results_discarded",
                "Async results dropped because a newer request superseded them",
            )?,
            inflight_orders,
        }))
    }

    /// Metrics on a private registry, for tests and tools that never export them.
    pub fn unregistered() -> Arc<Self> {
        Self::new(&Registry::new()).expect("fresh registry accepts every metric")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_once_per_registry() {
        let registry = Registry::new();
        let m = Metrics::new(&registry).unwrap();
        m.orders_sent.inc();
        assert_eq!(m.orders_sent.get(), 1);
        assert!(Metrics::new(&registry).is_err());
        let names: Vec<_> = registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"stale_results_discarded".to_string()));
    }
}
