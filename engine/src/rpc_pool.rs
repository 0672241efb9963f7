use crate::config::RpcConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use engine_core::{AccountSource, TokenAccount, TokenAccountSource};
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE},
    Client, ClientBuilder,
};
use serde_json::{json, Value};
use solana_sdk::{hash::Hash, pubkey, pubkey::Pubkey};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const WRAPPED_SOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");
const NATIVE_DECIMALS: u8 = 9;

/// Keep-alive JSON-RPC client for one endpoint.
#[derive(Clone)]
pub struct RpcPool {
    client: Client,
    url: Url,
    commitment: String,
    next_id: Arc<AtomicU64>,
    metrics: Arc<RpcMetrics>,
}

impl RpcPool {
    pub fn new(cfg: &RpcConfig, endpoint: &str, metrics: Arc<RpcMetrics>) -> Result<Self> {
        let client = ClientBuilder::new()
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(cfg.max_connections)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .connect_timeout(Duration::from_millis(cfg.timeout_ms))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .context("build reqwest client")?;
        let url = Url::parse(endpoint).context("parse rpc url")?;
        let pool = Self {
            client,
            url,
            commitment: cfg.commitment.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
            metrics,
        };
        pool.spawn_health_monitor(cfg.health_interval_ms);
        Ok(pool)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn default_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate, br"),
        );
        h
    }

    fn spawn_health_monitor(&self, interval_ms: u64) {
        if interval_ms == 0 {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(target: "rpc", "no runtime; health monitor disabled");
            return;
        }
        tracing::info!(
            target: "rpc",
            url = %self.url,
            interval_ms = interval_ms,
            "starting RPC health monitor"
        );
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                match pool.call("getHealth", json!([])).await {
                    Ok(v) if v.as_str() == Some("ok") => {}
                    Ok(v) => tracing::warn!(target: "rpc", status = %v, "node reports unhealthy"),
                    Err(err) => tracing::warn!(target: "rpc", ?err, "health probe failed"),
                }
            }
        });
    }

    /// Issues one JSON-RPC request and returns its `result` member.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let start = Instant::now();
        self.metrics.inflight.with_label_values(&[method]).inc();
        self.metrics.req_total.with_label_values(&[method]).inc();
        let res = self.do_req(&body).await;
        let dur = start.elapsed().as_secs_f64();
        self.metrics.inflight.with_label_values(&[method]).dec();
        self.metrics
            .latency
            .with_label_values(&[method])
            .observe(dur);
        let dur_ms = (dur * 1000.0) as u64;
        match &res {
            Ok(_) => {
                tracing::debug!(target: "rpc", method = %method, latency_ms = %dur_ms, "RPC request completed")
            }
            Err(err) => {
                self.metrics.fail_total.with_label_values(&[method]).inc();
                tracing::warn!(target: "rpc", method = %method, latency_ms = %dur_ms, error = %format!("{:#}", err), "RPC request failed");
            }
        }
        res.with_context(|| format!("rpc {}", method))
    }

    async fn do_req(&self, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.url.clone())
            .headers(Self::default_headers())
            .json(body)
            .send()
            .await
            .context("http send")?;
        let status = resp.status();
        let bytes = resp.bytes().await.context("read body bytes")?;
        if !status.is_success() {
            bail!("http {}: {}", status, String::from_utf8_lossy(&bytes));
        }
        let js: Value = serde_json::from_slice(&bytes).context("parse rpc json")?;
        parse_rpc_response(js)
    }

    fn config(&self, encoding: &str) -> Value {
        json!({ "encoding": encoding, "commitment": self.commitment })
    }

    pub async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let result = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), self.config("base64")]),
            )
            .await?;
        match result.get("value") {
            None | Some(Value::Null) => Ok(None),
            Some(account) => decode_account_data(account).map(Some),
        }
    }

    pub async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<Value>,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        let mut cfg = self.config("base64");
        cfg["filters"] = Value::Array(filters);
        let result = self
            .call("getProgramAccounts", json!([program_id.to_string(), cfg]))
            .await?;
        let items = result
            .as_array()
            .ok_or_else(|| anyhow!("getProgramAccounts result is not array"))?;
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let key = item
                .get("pubkey")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("missing pubkey at index {}", idx))?;
            let key = Pubkey::from_str(key).map_err(|e| anyhow!("pubkey '{}': {}", key, e))?;
            let account = item
                .get("account")
                .ok_or_else(|| anyhow!("missing account at index {}", idx))?;
            out.push((key, decode_account_data(account)?));
        }
        Ok(out)
    }

    pub async fn get_token_accounts_by_owner(&self, owner: &Pubkey) -> Result<Vec<TokenAccount>> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "programId": TOKEN_PROGRAM_ID.to_string() },
                    self.config("jsonParsed"),
                ]),
            )
            .await?;
        parse_token_accounts(&result)
    }

    pub async fn get_balance(&self, owner: &Pubkey) -> Result<u64> {
        let result = self
            .call(
                "getBalance",
                json!([owner.to_string(), { "commitment": self.commitment }]),
            )
            .await?;
        result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("getBalance value missing"))
    }

    pub async fn get_latest_blockhash(&self) -> Result<Hash> {
        let result = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await?;
        let text = result
            .get("value")
            .and_then(|v| v.get("blockhash"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("blockhash missing"))?;
        Hash::from_str(text).map_err(|e| anyhow!("parse blockhash '{}': {}", text, e))
    }

    pub async fn get_minimum_balance_for_rent_exemption(&self, size: usize) -> Result<u64> {
        let result = self
            .call("getMinimumBalanceForRentExemption", json!([size]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| anyhow!("rent exemption result not integer"))
    }

    /// Submits a serialized transaction and returns its signature.
    pub async fn send_transaction(&self, wire: &[u8]) -> Result<String> {
        let result = self
            .call(
                "sendTransaction",
                json!([
                    BASE64_STANDARD.encode(wire),
                    { "encoding": "base64", "preflightCommitment": self.commitment },
                ]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("sendTransaction result not string"))
    }
}

pub fn memcmp(offset: usize, key: &Pubkey) -> Value {
    json!({ "memcmp": { "offset": offset, "bytes": key.to_string() } })
}

pub fn data_size(size: usize) -> Value {
    json!({ "dataSize": size })
}

fn parse_rpc_response(js: Value) -> Result<Value> {
    if let Some(err) = js.get("error") {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("rpc error {}: {}", code, message);
    }
    js.get("result")
        .cloned()
        .ok_or_else(|| anyhow!("rpc response without result"))
}

fn decode_account_data(account: &Value) -> Result<Vec<u8>> {
    let data = account
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("account data not array"))?;
    match (data.first().and_then(Value::as_str), data.get(1).and_then(Value::as_str)) {
        (Some(payload), Some("base64")) => BASE64_STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| anyhow!("decode account data: {}", e)),
        (_, enc) => Err(anyhow!("unexpected account encoding {:?}", enc)),
    }
}

fn parse_token_accounts(result: &Value) -> Result<Vec<TokenAccount>> {
    let items = result
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("token accounts value not array"))?;
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let key = item
            .get("pubkey")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing pubkey at index {}", idx))?;
        let info = item
            .pointer("/account/data/parsed/info")
            .ok_or_else(|| anyhow!("missing parsed info at index {}", idx))?;
        let mint = info
            .get("mint")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing mint at index {}", idx))?;
        let amount = info
            .pointer("/tokenAmount/amount")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing amount at index {}", idx))?
            .parse::<u64>()
            .with_context(|| format!("parse amount at index {}", idx))?;
        let decimals = info
            .pointer("/tokenAmount/decimals")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("missing decimals at index {}", idx))?;
        out.push(TokenAccount {
            pubkey: Pubkey::from_str(key).map_err(|e| anyhow!("pubkey '{}': {}", key, e))?,
            effective_mint: Pubkey::from_str(mint)
                .map_err(|e| anyhow!("mint '{}': {}", mint, e))?,
            amount,
            decimals: decimals as u8,
        });
    }
    Ok(out)
}

#[async_trait]
impl AccountSource for RpcPool {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.get_account_data(address).await
    }
}

#[async_trait]
impl TokenAccountSource for RpcPool {
    /// SPL token accounts plus the native balance, listed under the wrapped-SOL mint.
    async fn token_accounts(&self, owner: &Pubkey) -> Result<Vec<TokenAccount>> {
        let (mut accounts, lamports) = futures::try_join!(
            self.get_token_accounts_by_owner(owner),
            self.get_balance(owner)
        )?;
        accounts.push(TokenAccount {
            pubkey: *owner,
            effective_mint: WRAPPED_SOL_MINT,
            amount: lamports,
            decimals: NATIVE_DECIMALS,
        });
        Ok(accounts)
    }
}

pub struct RpcMetrics {
    req_total: IntCounterVec,
    fail_total: IntCounterVec,
    inflight: IntGaugeVec,
    latency: HistogramVec,
}

impl RpcMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Arc<Self>> {
        let req_total = IntCounterVec::new(
            prometheus::Opts::new("rpc_requests_total", "RPC requests total"),
            &["method"],
        )?;
        let fail_total = IntCounterVec::new(
            prometheus::Opts::new("rpc_failures_total", "RPC failures total"),
            &["method"],
        )?;
        let inflight = IntGaugeVec::new(
            prometheus::Opts::new("rpc_inflight", "RPC inflight requests"),
            &["method"],
        )?;
        let latency = HistogramVec::new(
            prometheus::HistogramOpts::new("rpc_latency_seconds", "RPC request latency seconds")
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
            &["method"],
        )?;
        registry.register(Box::new(req_total.clone()))?;
        registry.register(Box::new(fail_total.clone()))?;
        registry.register(Box::new(inflight.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        Ok(Arc::new(Self {
            req_total,
            fail_total,
            inflight,
            latency,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn rpc_error_objects_become_errors() {
        let err = parse_rpc_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Invalid param" }
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "rpc error -32602: Invalid param");
        let ok = parse_rpc_response(json!({ "jsonrpc": "2.0", "id": 1, "result": 7 })).unwrap();
        assert_eq!(ok, json!(7));
    }

    #[test]
    fn base64_account_data_is_decoded() {
        let account = json!({ "data": ["AQID", "base64"], "lamports": 1 });
        assert_eq!(decode_account_data(&account).unwrap(), vec![1, 2, 3]);
        let parsed = json!({ "data": {"parsed": {}} });
        assert!(decode_account_data(&parsed).is_err());
    }

    #[test]
    fn parsed_token_accounts_are_read() {
        let owner_account = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let result = json!({
            "context": { "slot": 1 },
            "value": [{
                "pubkey": owner_account.to_string(),
                "account": { "data": { "parsed": { "info": {
                    "mint": mint.to_string(),
                    "tokenAmount": { "amount": "1500000", "decimals": 6, "uiAmount": 1.5 }
                }}}}
            }]
        });
        let accounts = parse_token_accounts(&result).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].pubkey, owner_account);
        assert_eq!(accounts[0].effective_mint, mint);
        assert_eq!(accounts[0].amount, 1_500_000);
        assert_eq!(accounts[0].ui_amount(), 1.5);
    }

    #[test]
    fn filters_use_base58_keys() {
        let key = Pubkey::new_unique();
        assert_eq!(
            memcmp(45, &key),
            json!({ "memcmp": { "offset": 45, "bytes": key.to_string() } })
        );
        assert_eq!(data_size(3228), json!({ "dataSize": 3228 }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore = "requires network access to a Solana RPC node"]
    async fn fetches_token_program_account() {
        let cfg = EngineConfig::default();
        let metrics = RpcMetrics::new(&Registry::new()).expect("metrics");
        let pool = RpcPool::new(&cfg.rpc, &cfg.rpc.url, metrics).expect("rpc pool");
        let data = pool
            .get_account_data(&TOKEN_PROGRAM_ID)
            .await
            .expect("account info");
        assert!(data.is_some());
    }
}
