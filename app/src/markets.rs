use engine_core::MarketInfo;
use solana_sdk::{pubkey, pubkey::Pubkey};

pub const SERUM_DEX_V3: Pubkey = pubkey!("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin");

const CATALOGUE: &[(&str, Pubkey)] = &[
    ("SOL/USDC", pubkey!("9wFFyRfZBsuAha4YcuxcXLKwMxJR43S7fPfQLusDBzvT")),
    ("BTC/USDC", pubkey!("A8YFbxQYFVqKZaoYJLLUVcQiWP7G2MeEgW5wsAQgMvFw")),
    ("ETH/USDC", pubkey!("4tSvZvnbyzHXLMTiFonMyxZoHmFqau1XArcRCVHLZ5gX")),
    ("SRM/USDC", pubkey!("ByRys5tuUWDgL73G8JBAEfkdFf8JWBzPBDHsBVQ5vbQA")),
    ("SOL/USDT", pubkey!("HWHvQhFmJB3NUcu1aihKmrKegfVxBEHzwVX6yZCKEsi1")),
    ("USDT/USDC", pubkey!("77quYg4MGneUdjgXCunt9GgM1usmrxKY31twEy3WHwcS")),
];

/// Built-in markets on the v3 dex program.
pub fn static_markets() -> Vec<MarketInfo> {
    CATALOGUE
        .iter()
        .map(|(name, address)| MarketInfo {
            address: *address,
            program_id: SERUM_DEX_V3,
            name: name.to_string(),
            deprecated: false,
            base_label: None,
            quote_label: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{find_market, split_market_name, TokenPairIndex};
    use std::collections::HashSet;

    #[test]
    fn catalogue_is_well_formed() {
        let markets = static_markets();
        let addresses: HashSet<_> = markets.iter().map(|m| m.address).collect();
        assert_eq!(addresses.len(), markets.len());
        assert!(markets.iter().all(|m| split_market_name(&m.name).is_some()));
    }

    #[test]
    fn usdc_reaches_every_listed_base() {
        let markets = static_markets();
        let index = TokenPairIndex::build(&markets);
        assert_eq!(index.neighbors("USDC"), ["BTC", "ETH", "SOL", "SRM", "USDT"]);
        assert_eq!(index.neighbors("USDT"), ["SOL", "USDC"]);
        let m = find_market(&markets, "USDC", "USDT").unwrap();
        assert_eq!(m.name, "USDT/USDC");
    }
}
