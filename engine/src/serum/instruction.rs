use engine_core::{MarketHandle, OrderType, Side};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    sysvar,
};

use crate::rpc_pool::TOKEN_PROGRAM_ID;

const INSTRUCTION_VERSION: u8 = 0;
const TAG_NEW_ORDER_V3: u32 = 10;
const TAG_CANCEL_ORDER_V2: u32 = 11;

/// Self-trade behaviour: decrement the taking order.
const DECREMENT_TAKE: u32 = 0;
const MATCH_LIMIT: u16 = 65535;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderV3 {
    pub side: Side,
    pub limit_price_lots: u64,
    pub max_base_lots: u64,
    pub max_native_quote_including_fees: u64,
    pub order_type: OrderType,
    pub client_order_id: u64,
}

impl NewOrderV3 {
    pub fn data(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(51);
        b.push(INSTRUCTION_VERSION);
        b.extend_from_slice(&TAG_NEW_ORDER_V3.to_le_bytes());
        b.extend_from_slice(&self.side.wire().to_le_bytes());
        b.extend_from_slice(&self.limit_price_lots.to_le_bytes());
        b.extend_from_slice(&self.max_base_lots.to_le_bytes());
        b.extend_from_slice(&self.max_native_quote_including_fees.to_le_bytes());
        b.extend_from_slice(&DECREMENT_TAKE.to_le_bytes());
        b.extend_from_slice(&self.order_type.wire().to_le_bytes());
        b.extend_from_slice(&self.client_order_id.to_le_bytes());
        b.extend_from_slice(&MATCH_LIMIT.to_le_bytes());
        b
    }

    /// `payer` funds the order: the quote account for bids, the base account for asks.
    pub fn instruction(
        &self,
        market: &MarketHandle,
        open_orders: &Pubkey,
        payer: &Pubkey,
        owner: &Pubkey,
    ) -> Instruction {
        Instruction {
            program_id: *market.program_id(),
            accounts: vec![
                AccountMeta::new(*market.address(), false),
                AccountMeta::new(*open_orders, false),
                AccountMeta::new(market.request_queue, false),
                AccountMeta::new(market.event_queue, false),
                AccountMeta::new(market.bids, false),
                AccountMeta::new(market.asks, false),
                AccountMeta::new(*payer, false),
                AccountMeta::new_readonly(*owner, true),
                AccountMeta::new(market.base_vault, false),
                AccountMeta::new(market.quote_vault, false),
                AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
                AccountMeta::new_readonly(sysvar::rent::id(), false),
            ],
            data: self.data(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOrderV2 {
    pub side: Side,
    pub order_id: u128,
}

impl CancelOrderV2 {
    pub fn data(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(25);
        b.push(INSTRUCTION_VERSION);
        b.extend_from_slice(&TAG_CANCEL_ORDER_V2.to_le_bytes());
        b.extend_from_slice(&self.side.wire().to_le_bytes());
        b.extend_from_slice(&self.order_id.to_le_bytes());
        b
    }

    pub fn instruction(
        &self,
        market: &MarketHandle,
        open_orders: &Pubkey,
        owner: &Pubkey,
    ) -> Instruction {
        Instruction {
            program_id: *market.program_id(),
            accounts: vec![
                AccountMeta::new(*market.address(), false),
                AccountMeta::new(market.bids, false),
                AccountMeta::new(market.asks, false),
                AccountMeta::new(*open_orders, false),
                AccountMeta::new_readonly(*owner, true),
                AccountMeta::new(market.event_queue, false),
            ],
            data: self.data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::MarketInfo;

    fn market() -> MarketHandle {
        MarketHandle {
            info: MarketInfo::new(Pubkey::new_unique(), Pubkey::new_unique(), "SOL/USDC").unwrap(),
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            base_decimals: 9,
            quote_decimals: 6,
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            request_queue: Pubkey::new_unique(),
            event_queue: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
            vault_signer_nonce: 0,
            base_lot_size: 10_000_000,
            quote_lot_size: 100,
            fee_rate_bps: 0,
        }
    }

    #[test]
    fn new_order_v3_layout() {
        let ix = NewOrderV3 {
            side: Side::Sell,
            limit_price_lots: 1100,
            max_base_lots: 123,
            max_native_quote_including_fees: 0,
            order_type: OrderType::ImmediateOrCancel,
            client_order_id: 77,
        };
        let data = ix.data();
        assert_eq!(data.len(), 51);
        assert_eq!(data[0], 0);
        assert_eq!(&data[1..5], &10u32.to_le_bytes());
        assert_eq!(&data[5..9], &1u32.to_le_bytes());
        assert_eq!(&data[9..17], &1100u64.to_le_bytes());
        assert_eq!(&data[17..25], &123u64.to_le_bytes());
        assert_eq!(&data[37..41], &1u32.to_le_bytes());
        assert_eq!(&data[41..49], &77u64.to_le_bytes());
        assert_eq!(&data[49..51], &65535u16.to_le_bytes());
    }

    #[test]
    fn new_order_accounts_follow_program_order() {
        let m = market();
        let (oo, payer, owner) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let ix = NewOrderV3 {
            side: Side::Buy,
            limit_price_lots: 1,
            max_base_lots: 1,
            max_native_quote_including_fees: 100,
            order_type: OrderType::ImmediateOrCancel,
            client_order_id: 0,
        }
        .instruction(&m, &oo, &payer, &owner);
        assert_eq!(ix.program_id, *m.program_id());
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(ix.accounts[1].pubkey, oo);
        assert_eq!(ix.accounts[6].pubkey, payer);
        assert!(ix.accounts[7].is_signer && !ix.accounts[7].is_writable);
        assert_eq!(ix.accounts[10].pubkey, TOKEN_PROGRAM_ID);
    }

    #[test]
    fn cancel_order_v2_layout() {
        let id = (1100u128 << 64) | 3;
        let data = CancelOrderV2 {
            side: Side::Buy,
            order_id: id,
        }
        .data();
        assert_eq!(data.len(), 25);
        assert_eq!(&data[1..5], &11u32.to_le_bytes());
        assert_eq!(&data[5..9], &0u32.to_le_bytes());
        assert_eq!(&data[9..25], &id.to_le_bytes());
    }
}
