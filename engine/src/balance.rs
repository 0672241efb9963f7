use std::sync::Arc;

use anyhow::{Context, Result};
use engine_core::{funding_account_for_mint, ExchangeClient, MarketHandle, TokenAccount};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

/// Spendable amount of the token being converted: settled wallet balance plus funds
/// left free in the owner's open-orders accounts.
pub struct BalanceAggregator<E: ExchangeClient + 'static> {
    exchange: Arc<E>,
}

impl<E: ExchangeClient + 'static> BalanceAggregator<E> {
    pub fn new(exchange: Arc<E>) -> Self {
        Self { exchange }
    }

    /// `Ok(None)` when the owner holds no token account for the side's mint. Only accounts
    /// that can fund an order count, so the native lamport entry is left out.
    pub async fn compute(
        &self,
        market: &MarketHandle,
        from_token: &str,
        owner: &Pubkey,
        accounts: &[TokenAccount],
    ) -> Result<Option<f64>> {
        let base = market.is_base_token(from_token);
        let mint = if base {
            &market.base_mint
        } else {
            &market.quote_mint
        };
        let Some(account) = funding_account_for_mint(accounts, mint, owner) else {
            debug!(target: "convert", market = %market.name(), %mint, "no token account for mint");
            return Ok(None);
        };
        let locked = self
            .exchange
            .open_orders_balance(market, owner, base)
            .await
            .context("open orders balance")?;
        Ok(Some(locked + account.ui_amount()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{handle, token_account, MockExchange};

    #[tokio::test]
    async fn adds_open_orders_funds_to_settled_balance() {
        let m = handle("SOL/USDC");
        let exchange = Arc::new(MockExchange::default());
        *exchange.oo_balance.lock() = 0.5;
        let agg = BalanceAggregator::new(exchange);
        let accounts = vec![
            token_account(m.base_mint, 2_000_000_000, 9),
            token_account(m.quote_mint, 7_250_000, 6),
        ];
        let owner = Pubkey::new_unique();
        let sol = agg.compute(&m, "SOL", &owner, &accounts).await.unwrap();
        assert_eq!(sol, Some(2.5));
        let usdc = agg.compute(&m, "USDC", &owner, &accounts).await.unwrap();
        assert_eq!(usdc, Some(7.75));
    }

    #[tokio::test]
    async fn missing_token_account_leaves_balance_undefined() {
        let m = handle("SOL/USDC");
        let agg = BalanceAggregator::new(Arc::new(MockExchange::default()));
        let accounts = vec![token_account(m.quote_mint, 1, 6)];
        let got = agg
            .compute(&m, "SOL", &Pubkey::new_unique(), &accounts)
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn native_sol_is_not_spendable_balance() {
        let m = handle("SOL/USDC");
        let owner = Pubkey::new_unique();
        let agg = BalanceAggregator::new(Arc::new(MockExchange::default()));
        let native = TokenAccount {
            pubkey: owner,
            effective_mint: m.base_mint,
            amount: 5_000_000_000,
            decimals: 9,
        };
        let got = agg.compute(&m, "SOL", &owner, &[native.clone()]).await.unwrap();
        assert_eq!(got, None);

        let accounts = vec![native, token_account(m.base_mint, 1_000_000_000, 9)];
        let got = agg.compute(&m, "SOL", &owner, &accounts).await.unwrap();
        assert_eq!(got, Some(1.0));
    }
}
