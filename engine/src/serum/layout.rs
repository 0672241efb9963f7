use anyhow::{anyhow, bail, Result};
use solana_sdk::pubkey::Pubkey;

pub const ACCOUNT_HEAD_PADDING: &[u8; 5] = b"serum";
pub const ACCOUNT_TAIL_PADDING: &[u8; 7] = b"padding";

pub const FLAG_INITIALIZED: u64 = 1 << 0;
pub const FLAG_MARKET: u64 = 1 << 1;
pub const FLAG_OPEN_ORDERS: u64 = 1 << 2;
pub const FLAG_BIDS: u64 = 1 << 5;
pub const FLAG_ASKS: u64 = 1 << 6;

pub const MARKET_STATE_LEN: usize = 388;
pub const OPEN_ORDERS_LEN: usize = 3228;
pub const OPEN_ORDERS_MARKET_OFFSET: usize = 13;
pub const OPEN_ORDERS_OWNER_OFFSET: usize = 45;
pub const MINT_DECIMALS_OFFSET: usize = 44;
pub const MAX_OPEN_ORDERS: usize = 128;

/// Little-endian cursor over account bytes.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| anyhow!("account data truncated at offset {}", self.pos))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn u128(&mut self) -> Result<u128> {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(self.take(16)?);
        Ok(u128::from_le_bytes(buf))
    }

    pub(crate) fn pubkey(&mut self) -> Result<Pubkey> {
        let mut buf = [0u8; 32];
        buf.copy_from_slice(self.take(32)?);
        Ok(Pubkey::new_from_array(buf))
    }
}

/// Reads the head padding and account flags shared by every program-owned account.
pub(crate) fn read_flags(reader: &mut Reader<'_>) -> Result<u64> {
    if reader.take(5)? != ACCOUNT_HEAD_PADDING {
        bail!("missing account head padding");
    }
    reader.u64()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketState {
    pub account_flags: u64,
    pub own_address: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub base_deposits_total: u64,
    pub base_fees_accrued: u64,
    pub quote_vault: Pubkey,
    pub quote_deposits_total: u64,
    pub quote_fees_accrued: u64,
    pub quote_dust_threshold: u64,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
    pub fee_rate_bps: u64,
    pub referrer_rebates_accrued: u64,
}

impl MarketState {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MARKET_STATE_LEN {
            bail!(
                "market account is {} bytes, expected {}",
                data.len(),
                MARKET_STATE_LEN
            );
        }
        let mut r = Reader::new(data);
        let account_flags = read_flags(&mut r)?;
        if account_flags & (FLAG_INITIALIZED | FLAG_MARKET) != FLAG_INITIALIZED | FLAG_MARKET {
            bail!("account flags {:#x} do not describe a market", account_flags);
        }
        Ok(Self {
            account_flags,
            own_address: r.pubkey()?,
            vault_signer_nonce: r.u64()?,
            base_mint: r.pubkey()?,
            quote_mint: r.pubkey()?,
            base_vault: r.pubkey()?,
            base_deposits_total: r.u64()?,
            base_fees_accrued: r.u64()?,
            quote_vault: r.pubkey()?,
            quote_deposits_total: r.u64()?,
            quote_fees_accrued: r.u64()?,
            quote_dust_threshold: r.u64()?,
            request_queue: r.pubkey()?,
            event_queue: r.pubkey()?,
            bids: r.pubkey()?,
            asks: r.pubkey()?,
            base_lot_size: r.u64()?,
            quote_lot_size: r.u64()?,
            fee_rate_bps: r.u64()?,
            referrer_rebates_accrued: r.u64()?,
        })
    }
}

pub fn decode_mint_decimals(data: &[u8]) -> Result<u8> {
    Reader::at(data, MINT_DECIMALS_OFFSET)
        .u8()
        .map_err(|_| anyhow!("mint account is {} bytes, too short", data.len()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrdersAccount {
    pub address: Pubkey,
    pub market: Pubkey,
    pub owner: Pubkey,
    pub base_token_free: u64,
    pub base_token_total: u64,
    pub quote_token_free: u64,
    pub quote_token_total: u64,
    pub free_slot_bits: u128,
    pub is_bid_bits: u128,
    pub orders: Vec<u128>,
    pub client_ids: Vec<u64>,
}

impl OpenOrdersAccount {
    pub fn decode(address: Pubkey, data: &[u8]) -> Result<Self> {
        if data.len() < OPEN_ORDERS_LEN {
            bail!(
                "open orders account is {} bytes, expected {}",
                data.len(),
                OPEN_ORDERS_LEN
            );
        }
        let mut r = Reader::new(data);
        let flags = read_flags(&mut r)?;
        if flags & (FLAG_INITIALIZED | FLAG_OPEN_ORDERS) != FLAG_INITIALIZED | FLAG_OPEN_ORDERS {
            bail!("account flags {:#x} do not describe open orders", flags);
        }
        let market = r.pubkey()?;
        let owner = r.pubkey()?;
        let base_token_free = r.u64()?;
        let base_token_total = r.u64()?;
        let quote_token_free = r.u64()?;
        let quote_token_total = r.u64()?;
        let free_slot_bits = r.u128()?;
        let is_bid_bits = r.u128()?;
        let orders = (0..MAX_OPEN_ORDERS)
            .map(|_| r.u128())
            .collect::<Result<Vec<_>>>()?;
        let client_ids = (0..MAX_OPEN_ORDERS)
            .map(|_| r.u64())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            address,
            market,
            owner,
            base_token_free,
            base_token_total,
            quote_token_free,
            quote_token_total,
            free_slot_bits,
            is_bid_bits,
            orders,
            client_ids,
        })
    }
}
