//! The signing seam. The engine never holds keys; it hands a fully formed
//! transaction to a [`Signer`] and gets a hash back.

use std::future::Future;

use airdrop_merkle_core::{Address, Hash32};

use super::rpc::{ChainClient, RpcFailure, Transport, TxRequest};

pub trait Signer: Send + Sync + 'static {
    /// Account that signs and pays for transactions.
    fn address(&self) -> Address;

    /// Sign and broadcast. Resolves once the network accepted the
    /// transaction, not once it is mined.
    fn send_transaction(&self, tx: TxRequest) -> impl Future<Output = Result<Hash32, RpcFailure>> + Send;
}

/// Delegates signing to an account unlocked on the RPC node (or a wallet
/// bridge speaking `eth_sendTransaction`).
pub struct RpcSigner<T> {
    client: ChainClient<T>,
    account: Address,
}

impl<T: Transport> RpcSigner<T> {
    pub fn new(client: ChainClient<T>, account: Address) -> Self {
        Self { client, account }
    }
}

impl<T: Transport> Signer for RpcSigner<T> {
    fn address(&self) -> Address {
        self.account
    }

    async fn send_transaction(&self, mut tx: TxRequest) -> Result<Hash32, RpcFailure> {
        tx.from = self.account;
        let hash = self.client.send_transaction(&tx).await?;
        tracing::info!(
            from = %self.account,
            to = %tx.to,
            hash = %airdrop_merkle_core::hash_to_hex(&hash),
            "transaction broadcast"
        );
        Ok(hash)
    }
}
