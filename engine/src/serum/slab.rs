use anyhow::{bail, Result};
use engine_core::{Level, MarketHandle};
use solana_sdk::pubkey::Pubkey;

use super::layout::{read_flags, Reader, FLAG_ASKS, FLAG_BIDS, FLAG_INITIALIZED};

const SLAB_HEADER_LEN: usize = 32;
const NODE_LEN: usize = 72;

const TAG_INNER: u32 = 1;
const TAG_LEAF: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub owner_slot: u8,
    pub fee_tier: u8,
    pub key: u128,
    /// Open-orders account that placed the order.
    pub owner: Pubkey,
    pub quantity: u64,
    pub client_order_id: u64,
}

impl LeafNode {
    pub fn price_lots(&self) -> u64 {
        (self.key >> 64) as u64
    }
}

/// One side of the book with its leaves in priority order (best price first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSide {
    pub is_bids: bool,
    pub leaves: Vec<LeafNode>,
}

impl BookSide {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let flags = read_flags(&mut r)?;
        if flags & FLAG_INITIALIZED == 0 {
            bail!("order book account not initialized");
        }
        let is_bids = match (flags & FLAG_BIDS != 0, flags & FLAG_ASKS != 0) {
            (true, false) => true,
            (false, true) => false,
            _ => bail!("account flags {:#x} do not describe one book side", flags),
        };

        let _bump_index = r.u32()?;
        r.skip(4)?;
        let _free_list_len = r.u32()?;
        r.skip(4)?;
        let _free_list_head = r.u32()?;
        let root = r.u32()?;
        let leaf_count = r.u32()?;
        r.skip(4)?;

        let nodes_start = 13 + SLAB_HEADER_LEN;
        let node_count = data.len().saturating_sub(nodes_start) / NODE_LEN;
        if leaf_count as usize > node_count {
            bail!("slab claims {} leaves but holds {} nodes", leaf_count, node_count);
        }
        let mut leaves = Vec::with_capacity(leaf_count as usize);
        if leaf_count == 0 {
            return Ok(Self { is_bids, leaves });
        }

        // bids walk keys high to low, asks low to high
        let mut stack = vec![root];
        let mut visited = 0usize;
        while let Some(index) = stack.pop() {
            visited += 1;
            if visited > node_count {
                bail!("slab traversal exceeds node count; corrupt tree");
            }
            if index as usize >= node_count {
                bail!("slab node index {} out of range", index);
            }
            let mut n = Reader::at(data, nodes_start + index as usize * NODE_LEN);
            match n.u32()? {
                TAG_INNER => {
                    let _prefix_len = n.u32()?;
                    let _key = n.u128()?;
                    let left = n.u32()?;
                    let right = n.u32()?;
                    if is_bids {
                        stack.push(left);
                        stack.push(right);
                    } else {
                        stack.push(right);
                        stack.push(left);
                    }
                }
                TAG_LEAF => {
                    let owner_slot = n.u8()?;
                    let fee_tier = n.u8()?;
                    n.skip(2)?;
                    leaves.push(LeafNode {
                        owner_slot,
                        fee_tier,
                        key: n.u128()?,
                        owner: n.pubkey()?,
                        quantity: n.u64()?,
                        client_order_id: n.u64()?,
                    });
                }
                tag => bail!("unexpected slab node tag {} at index {}", tag, index),
            }
        }
        Ok(Self { is_bids, leaves })
    }

    /// Aggregated price levels, best first, at most `depth` of them.
    pub fn l2(&self, market: &MarketHandle, depth: usize) -> Vec<Level> {
        let mut levels: Vec<Level> = Vec::new();
        for leaf in &self.leaves {
            let price_lots = leaf.price_lots();
            match levels.last_mut() {
                Some(last) if last.price_lots == price_lots => {
                    last.size_lots += leaf.quantity;
                    last.size = market.base_size_lots_to_number(last.size_lots);
                }
                _ => {
                    if levels.len() == depth {
                        break;
                    }
                    levels.push(Level {
                        price: market.price_lots_to_number(price_lots),
                        size: market.base_size_lots_to_number(leaf.quantity),
                        price_lots,
                        size_lots: leaf.quantity,
                    });
                }
            }
        }
        levels
    }
}
