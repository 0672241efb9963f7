use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signer},
    transaction::Transaction,
};
use tracing::{debug, info};

use crate::rpc_pool::RpcPool;

/// Signing identity of the user.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn public_key(&self) -> Pubkey;

    fn connected(&self) -> bool;

    /// Signs `instructions` as one transaction paid by the wallet, co-signed by
    /// `extra_signers`, submits it and returns the signature.
    async fn sign_and_send(
        &self,
        instructions: Vec<Instruction>,
        extra_signers: Vec<Keypair>,
    ) -> Result<String>;
}

pub struct KeypairWallet {
    keypair: Keypair,
    rpc: RpcPool,
    send: RpcPool,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair, rpc: RpcPool, send: RpcPool) -> Self {
        Self { keypair, rpc, send }
    }

    /// Loads a Solana CLI keypair file (JSON array of 64 bytes).
    pub fn from_file(path: impl AsRef<Path>, rpc: RpcPool, send: RpcPool) -> Result<Self> {
        let path = path.as_ref();
        let keypair = read_keypair_file(path)
            .map_err(|e| anyhow!("read keypair {}: {}", path.display(), e))?;
        info!(target: "wallet", pubkey = %keypair.pubkey(), "keypair loaded");
        Ok(Self::new(keypair, rpc, send))
    }

    fn build_transaction(
        &self,
        instructions: &[Instruction],
        extra_signers: &[Keypair],
        blockhash: Hash,
    ) -> Result<Transaction> {
        let mut signers: Vec<&dyn Signer> = vec![&self.keypair];
        signers.extend(extra_signers.iter().map(|k| k as &dyn Signer));
        let mut tx = Transaction::new_with_payer(instructions, Some(&self.keypair.pubkey()));
        tx.try_sign(&signers, blockhash)
            .context("sign transaction")?;
        Ok(tx)
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn public_key(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn connected(&self) -> bool {
        true
    }

    async fn sign_and_send(
        &self,
        instructions: Vec<Instruction>,
        extra_signers: Vec<Keypair>,
    ) -> Result<String> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let tx = self.build_transaction(&instructions, &extra_signers, blockhash)?;
        let wire = bincode::serialize(&tx).context("serialize transaction")?;
        debug!(
            target: "wallet",
            instructions = instructions.len(),
            bytes = wire.len(),
            %blockhash,
            "sending transaction"
        );
        self.send.send_transaction(&wire).await
    }
}

/// Public key only. Good for reading balances and orders.
pub struct ReadOnlyWallet {
    pubkey: Pubkey,
}

impl ReadOnlyWallet {
    pub fn new(pubkey: Pubkey) -> Self {
        Self { pubkey }
    }
}

#[async_trait]
impl Wallet for ReadOnlyWallet {
    fn public_key(&self) -> Pubkey {
        self.pubkey
    }

    fn connected(&self) -> bool {
        false
    }

    async fn sign_and_send(&self, _: Vec<Instruction>, _: Vec<Keypair>) -> Result<String> {
        bail!("wallet {} is read-only; configure a keypair to sign", self.pubkey)
    }
}
