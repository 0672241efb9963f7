use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::model::{split_market_name, MarketInfo};

/// Undirected adjacency of tokens that share a direct market.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPairIndex {
    neighbors: BTreeMap<String, BTreeSet<String>>,
}

impl TokenPairIndex {
    pub fn build(markets: &[MarketInfo]) -> Self {
        let mut neighbors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for market in markets {
            let Some((base, quote)) = split_market_name(&market.name) else {
                warn!(target: "pairs", name = %market.name, "skipping market with malformed name");
                continue;
            };
            neighbors
                .entry(base.to_string())
                .or_default()
                .insert(quote.to_string());
            neighbors
                .entry(quote.to_string())
                .or_default()
                .insert(base.to_string());
        }
        Self { neighbors }
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.neighbors.keys().map(String::as_str)
    }

    pub fn neighbors(&self, token: &str) -> Vec<&str> {
        self.neighbors
            .get(token)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.neighbors.contains_key(token)
    }

    pub fn is_pair(&self, a: &str, b: &str) -> bool {
        self.neighbors
            .get(a)
            .map(|set| set.contains(b))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::market_info;

    fn index(names: &[&str]) -> TokenPairIndex {
        let markets: Vec<_> = names.iter().map(|n| market_info(n)).collect();
        TokenPairIndex::build(&markets)
    }

    #[test]
    fn every_market_links_both_directions() {
        let idx = index(&["SOL/USDC", "SRM/USDC", "SOL/USDT"]);
        assert_eq!(idx.neighbors("SOL"), vec!["USDC", "USDT"]);
        assert_eq!(idx.neighbors("USDC"), vec!["SOL", "SRM"]);
        assert_eq!(idx.neighbors("USDT"), vec!["SOL"]);
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn index_is_symmetric() {
        let idx = index(&[
            "SOL/USDC", "BTC/USDC", "ETH/USDC", "BTC/USDT", "ETH/BTC", "USDT/USDC", "SOL/USDC",
        ]);
        for a in idx.tokens() {
            for b in idx.neighbors(a) {
                assert!(idx.is_pair(b, a), "{} -> {} has no reverse edge", a, b);
            }
        }
    }

    #[test]
    fn duplicate_markets_do_not_duplicate_neighbors() {
        let idx = index(&["SOL/USDC", "SOL/USDC"]);
        assert_eq!(idx.neighbors("SOL"), vec!["USDC"]);
    }

    #[test]
    fn tokens_without_markets_are_absent() {
        let idx = index(&["SOL/USDC"]);
        assert!(!idx.contains("BTC"));
        assert!(idx.neighbors("BTC").is_empty());
        assert!(TokenPairIndex::build(&[]).is_empty());
    }
}
