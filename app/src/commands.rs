use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use engine::{
    ConvertSession, KeypairWallet, OpenOrderList, ReadOnlyWallet, RpcMetrics, RpcPool,
    SerumExchange, TracingNotifier, Wallet,
};
use engine_core::{
    merge_market_infos, CustomMarketInfo, ExchangeClient, MarketInfo, Metrics, OrderRow,
    TokenPairIndex, EMPTY_LABEL,
};
use prometheus::{Encoder, Registry, TextEncoder};
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use crate::cli::{Cli, Command, OrdersArgs, SwapArgs};
use crate::config::{add_custom_market, load_config, AppConfig};
use crate::markets::static_markets;

/// Everything a command needs once the config is loaded.
struct Runtime {
    cfg: AppConfig,
    markets: Vec<MarketInfo>,
    rpc: RpcPool,
    exchange: Arc<SerumExchange>,
    metrics: Arc<Metrics>,
    notifier: Arc<TracingNotifier>,
}

impl Runtime {
    fn new(cfg: AppConfig, registry: &Registry) -> Result<Self> {
        let markets = merge_market_infos(&static_markets(), &cfg.custom_markets)?;
        let rpc_metrics = RpcMetrics::new(registry).context("register rpc metrics")?;
        let rpc = RpcPool::new(&cfg.rpc, &cfg.rpc.url, rpc_metrics.clone())?;
        let send = RpcPool::new(&cfg.rpc, cfg.rpc.send_url(), rpc_metrics)?;
        let wallet = open_wallet(&cfg, rpc.clone(), send)?;
        info!(target: "convert", rpc = %rpc.url(), wallet = %wallet.public_key(), signer = wallet.connected(), "runtime ready");
        let exchange = Arc::new(SerumExchange::new(rpc.clone(), wallet, cfg.convert.clone()));
        Ok(Self {
            markets,
            rpc,
            exchange,
            metrics: Metrics::new(registry).context("register convert metrics")?,
            notifier: Arc::new(TracingNotifier),
            cfg,
        })
    }

    fn owner(&self) -> Pubkey {
        self.exchange.wallet().public_key()
    }

    async fn session(&self) -> Result<ConvertSession<SerumExchange>> {
        let session = ConvertSession::new(
            self.exchange.clone(),
            Arc::new(self.rpc.clone()),
            Arc::new(self.rpc.clone()),
            self.notifier.clone(),
            self.metrics.clone(),
            self.owner(),
            &self.cfg.convert,
        );
        session.set_markets(self.markets.clone());
        session
            .refresh_token_accounts()
            .await
            .context("load token accounts")?;
        Ok(session)
    }

    async fn select(
        &self,
        session: &ConvertSession<SerumExchange>,
        from: &str,
        to: &str,
    ) -> Result<()> {
        session.select_from(Some(from.to_string())).await?;
        if session.select_to(Some(to.to_string())).await?.is_none() {
            bail!("no market trades {} against {}", from, to);
        }
        Ok(())
    }
}

fn open_wallet(cfg: &AppConfig, rpc: RpcPool, send: RpcPool) -> Result<Arc<dyn Wallet>> {
    if let Some(path) = &cfg.wallet.keypair_path {
        return Ok(Arc::new(KeypairWallet::from_file(path, rpc, send)?));
    }
    if let Some(key) = &cfg.wallet.pubkey {
        let pubkey =
            Pubkey::from_str(key).map_err(|e| anyhow!("wallet.pubkey '{}': {}", key, e))?;
        return Ok(Arc::new(ReadOnlyWallet::new(pubkey)));
    }
    bail!("no wallet configured; set wallet.keypair_path or CONVERT_KEYPAIR")
}

pub fn pairs_lines(index: &TokenPairIndex, token: Option<&str>) -> Vec<String> {
    match token {
        Some(t) if !index.contains(t) => vec![format!("{}: no markets", t)],
        Some(t) => index.neighbors(t).iter().map(|n| format!("{}/{}", t, n)).collect(),
        None => index
            .tokens()
            .map(|t| format!("{} -> {}", t, index.neighbors(t).join(", ")))
            .collect(),
    }
}

pub fn order_lines(rows: &[OrderRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec![EMPTY_LABEL.to_string()];
    }
    rows.iter()
        .map(|r| {
            format!(
                "{:<12} {:<4} {:>14} @ {:<14} {}{}",
                r.market_name,
                r.side_label,
                r.size,
                r.price,
                r.order_id,
                if r.busy { " (cancelling)" } else { "" }
            )
        })
        .collect()
}

/// Market names the order list can be narrowed to, when there is more than one.
pub fn filter_line(filters: &[String]) -> Option<String> {
    (filters.len() > 1).then(|| format!("markets: {}", filters.join(", ")))
}

fn print(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

async fn balance(rt: &Runtime, from: &str, to: &str) -> Result<()> {
    let session = rt.session().await?;
    rt.select(&session, from, to).await?;
    match session.state().balance {
        Some(b) => println!("{} {}", b, from),
        None => println!("no {} token account", from),
    }
    Ok(())
}

async fn swap(rt: &Runtime, args: &SwapArgs) -> Result<()> {
    let session = rt.session().await?;
    rt.select(&session, &args.from, &args.to).await?;
    if args.max {
        if !session.use_max() {
            bail!("spendable {} balance is unknown", args.from);
        }
    } else {
        session.set_size(args.size);
    }
    if args.dry_run {
        let o = session.preview().await?;
        println!(
            "{} {} at limit {} (best {})",
            o.side.label(),
            o.size,
            o.price,
            o.best_price
        );
        return Ok(());
    }
    let ack = session.convert().await?;
    println!("sent {} (open orders {})", ack.signature, ack.open_orders);
    Ok(())
}

async fn order_list(rt: &Runtime, prefix: Option<&str>) -> Result<OpenOrderList<SerumExchange>> {
    let infos: Vec<&MarketInfo> = rt
        .markets
        .iter()
        .filter(|m| prefix.map_or(true, |p| m.name.starts_with(p)))
        .collect();
    if infos.is_empty() {
        bail!("no market matches {:?}", prefix.unwrap_or_default());
    }
    let mut handles = Vec::with_capacity(infos.len());
    for info in infos {
        handles.push(Arc::new(rt.exchange.load_market(info).await?));
    }
    let list = OpenOrderList::new(rt.exchange.clone(), rt.notifier.clone(), rt.metrics.clone());
    list.refresh(&handles, &rt.owner()).await?;
    Ok(list)
}

async fn orders(rt: &Runtime, args: &OrdersArgs) -> Result<()> {
    let list = order_list(rt, args.market.as_deref()).await?;
    let query = args.query();
    if args.market.is_none() {
        if let Some(line) = filter_line(&list.market_filters()) {
            println!("{}", line);
        }
    }
    print(order_lines(&list.rows(&query)));
    let pages = list.page_count(&query);
    if pages > 1 {
        println!("page {} of {}", query.page + 1, pages);
    }
    Ok(())
}

async fn cancel(rt: &Runtime, order_id: engine_core::OrderId, market: &str) -> Result<()> {
    if !rt.markets.iter().any(|m| m.name == market) {
        bail!("unknown market {}", market);
    }
    let list = order_list(rt, Some(market)).await?;
    let mut refreshed = false;
    let signature = list.cancel(order_id, || refreshed = true).await?;
    println!("cancelled {} ({})", order_id, signature);
    if refreshed {
        let again = order_list(rt, Some(market)).await?;
        print(order_lines(&again.rows(&Default::default())));
    }
    Ok(())
}

/// Runs one CLI invocation.
pub async fn run(cli: Cli) -> Result<()> {
    if let Command::AddMarket {
        name,
        address,
        program_id,
        base_label,
        quote_label,
    } = cli.command
    {
        let market = CustomMarketInfo {
            address,
            name,
            program_id,
            base_label,
            quote_label,
        };
        add_custom_market(&cli.config, market.clone()).await?;
        println!("added {} ({})", market.name, market.address);
        return Ok(());
    }

    let cfg = load_config(&cli.config).await?;
    if let Command::Pairs { token } = &cli.command {
        let markets = merge_market_infos(&static_markets(), &cfg.custom_markets)?;
        print(pairs_lines(&TokenPairIndex::build(&markets), token.as_deref()));
        return Ok(());
    }

    let registry = Registry::new();
    let rt = Runtime::new(cfg, &registry)?;
    let result = match &cli.command {
        Command::Balance { from, to } => balance(&rt, from, to).await,
        Command::Swap(args) => swap(&rt, args).await,
        Command::Orders(args) => orders(&rt, args).await,
        Command::Cancel { order_id, market } => cancel(&rt, *order_id, market).await,
        Command::Pairs { .. } | Command::AddMarket { .. } => Ok(()),
    };
    if cli.metrics {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .context("encode metrics")?;
        print!("{}", String::from_utf8_lossy(&buf));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{OrderId, Side};

    #[test]
    fn pairs_output_lists_neighbors() {
        let index = TokenPairIndex::build(&static_markets());
        let lines = pairs_lines(&index, Some("SOL"));
        assert_eq!(lines, ["SOL/USDC", "SOL/USDT"]);
        assert_eq!(pairs_lines(&index, Some("DOGE")), ["DOGE: no markets"]);
        let all = pairs_lines(&index, None);
        assert!(all.contains(&"SRM -> USDC".to_string()));
    }

    #[test]
    fn empty_order_table_shows_label() {
        assert_eq!(order_lines(&[]), [EMPTY_LABEL]);
        let row = OrderRow {
            order_id: OrderId(123456789012345),
            market_name: "SOL/USDC".into(),
            side: Side::Sell,
            side_label: "Sell",
            size: 1.5,
            price: 20.0,
            busy: true,
        };
        let lines = order_lines(&[row]);
        assert!(lines[0].contains("123456789012345 (cancelling)"));
    }

    #[test]
    fn filter_line_needs_two_markets() {
        assert_eq!(filter_line(&[]), None);
        assert_eq!(filter_line(&["SOL/USDC".to_string()]), None);
        let both = ["SOL/USDC".to_string(), "SRM/USDC".to_string()];
        assert_eq!(filter_line(&both).as_deref(), Some("markets: SOL/USDC, SRM/USDC"));
    }

    #[test]
    fn wallet_must_be_configured() {
        let cfg = AppConfig::default();
        let registry = Registry::new();
        let metrics = RpcMetrics::new(&registry).unwrap();
        let rpc = RpcPool::new(&cfg.rpc, &cfg.rpc.url, metrics).unwrap();
        assert!(open_wallet(&cfg, rpc.clone(), rpc.clone()).is_err());

        let mut read_only = AppConfig::default();
        let key = Pubkey::new_unique();
        read_only.wallet.pubkey = Some(key.to_string());
        let w = open_wallet(&read_only, rpc.clone(), rpc).unwrap();
        assert_eq!(w.public_key(), key);
        assert!(!w.connected());
    }
}
