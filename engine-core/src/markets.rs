use anyhow::{Context, Result};

use crate::model::{CustomMarketInfo, MarketInfo};

/// User markets first, then the static catalogue. A custom entry shadows a static
/// market with the same address.
pub fn merge_market_infos(
    static_markets: &[MarketInfo],
    custom: &[CustomMarketInfo],
) -> Result<Vec<MarketInfo>> {
    let mut out = Vec::with_capacity(custom.len() + static_markets.len());
    for c in custom {
        let info = MarketInfo::try_from(c)
            .with_context(|| format!("custom market '{}'", c.name))?;
        out.push(info);
    }
    for m in static_markets {
        if out.iter().any(|c| c.address == m.address) {
            continue;
        }
        out.push(m.clone());
    }
    Ok(out)
}

/// Direction-agnostic lookup of the market trading `from` against `to`.
pub fn find_market<'a>(markets: &'a [MarketInfo], from: &str, to: &str) -> Option<&'a MarketInfo> {
    let forward = format!("{}/{}", from, to);
    let backward = format!("{}/{}", to, from);
    let mut candidates = markets
        .iter()
        .filter(|m| m.name == forward || m.name == backward);
    let first = candidates.next()?;
    if !first.deprecated {
        return Some(first);
    }
    candidates.find(|m| !m.deprecated).or(Some(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::market_info;
    use solana_sdk::pubkey::Pubkey;

    #[test]
    fn pair_resolves_in_either_direction() {
        let markets = vec![market_info("SOL/USDC"), market_info("SRM/USDC")];
        let a = find_market(&markets, "SOL", "USDC").unwrap();
        let b = find_market(&markets, "USDC", "SOL").unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(a.name, "SOL/USDC");
        assert!(find_market(&markets, "SOL", "SRM").is_none());
    }

    #[test]
    fn live_market_beats_deprecated_duplicate() {
        let old = market_info("SOL/USDC").deprecated(true);
        let new = market_info("SOL/USDC");
        let markets = vec![old.clone(), new.clone()];
        assert_eq!(find_market(&markets, "USDC", "SOL").unwrap().address, new.address);

        let only_old = vec![old.clone()];
        assert_eq!(find_market(&only_old, "SOL", "USDC").unwrap().address, old.address);
    }

    #[test]
    fn custom_markets_come_first_and_shadow_static() {
        let stat = market_info("SOL/USDC");
        let custom = vec![
            CustomMarketInfo {
                address: Pubkey::new_unique().to_string(),
                name: "MNGO/USDC".into(),
                program_id: Pubkey::new_unique().to_string(),
                base_label: None,
                quote_label: None,
            },
            CustomMarketInfo {
                address: stat.address.to_string(),
                name: "SOL/USDC".into(),
                program_id: stat.program_id.to_string(),
                base_label: Some("Solana".into()),
                quote_label: None,
            },
        ];
        let merged = merge_market_infos(&[stat.clone()], &custom).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "MNGO/USDC");
        assert_eq!(merged[1].base_label.as_deref(), Some("Solana"));
    }

    #[test]
    fn invalid_custom_market_is_an_error() {
        let custom = vec![CustomMarketInfo {
            address: "xyz".into(),
            name: "A/B".into(),
            program_id: Pubkey::new_unique().to_string(),
            base_label: None,
            quote_label: None,
        }];
        let err = merge_market_infos(&[], &custom).unwrap_err();
        assert!(format!("{:#}", err).contains("custom market 'A/B'"));
    }
}
