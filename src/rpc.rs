//! Ledger RPC seam.
//!
//! The core needs exactly three calls from a ledger client: batched
//! multi-account fetch, a best-effort current-slot query, and a by-program
//! account query with size filter and partial data slice. [`LedgerRpc`]
//! captures that contract; [`SolanaRpc`] implements it over the nonblocking
//! `solana-client`, and tests substitute an in-memory mock.
//!
//! No retries live here beyond what the transport does; retry/fallback
//! policy belongs to the fetch layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    rpc_filter::RpcFilterType,
};
use solana_sdk::{account::Account as ChainAccount, commitment_config::CommitmentConfig, pubkey::Pubkey};
use tokio::time::timeout;

use crate::error::WatchError;

/// One account returned by a program scan: address plus (possibly sliced) data.
#[derive(Clone, Debug)]
pub struct KeyedAccount {
    pub pubkey: Pubkey,
    pub data: Vec<u8>,
    /// Full on-chain byte length, even when `data` is a slice of it.
    pub data_len: u64,
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch up to the transport's multi-get limit of accounts in one call.
    /// `None` per position means the account does not exist.
    async fn multi_account_data(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Vec<u8>>>, WatchError>;

    /// Single-account fallback for degraded batches.
    async fn account_data(&self, key: &Pubkey) -> Result<Option<Vec<u8>>, WatchError>;

    /// Best-effort current slot.
    async fn current_slot(&self) -> Result<u64, WatchError>;

    /// All accounts owned by `program` with exactly `data_size` bytes,
    /// returning only the first `slice_len` bytes of each.
    async fn program_accounts_sliced(
        &self,
        program: &Pubkey,
        data_size: u64,
        slice_len: usize,
    ) -> Result<Vec<KeyedAccount>, WatchError>;
}

#[derive(Clone)]
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    timeout: Duration,
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(
                url.into(),
                CommitmentConfig::confirmed(),
            )),
            timeout: call_timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, WatchError>
    where
        F: std::future::Future<Output = Result<T, solana_client::client_error::ClientError>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(WatchError::Network(e.to_string())),
            Err(_) => Err(WatchError::Network(format!(
                "rpc call timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn multi_account_data(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Vec<u8>>>, WatchError> {
        let accounts = self
            .bounded(self.client.get_multiple_accounts(keys))
            .await?;
        Ok(accounts
            .into_iter()
            .map(|a| a.map(|acc: ChainAccount| acc.data))
            .collect())
    }

    async fn account_data(&self, key: &Pubkey) -> Result<Option<Vec<u8>>, WatchError> {
        // get_account errors on a missing account; the _with_commitment
        // variant reports absence as a typed None, which is the contract here.
        let resp = self
            .bounded(
                self.client
                    .get_account_with_commitment(key, self.client.commitment()),
            )
            .await?;
        Ok(resp.value.map(|acc| acc.data))
    }

    async fn current_slot(&self) -> Result<u64, WatchError> {
        self.bounded(self.client.get_slot()).await
    }

    async fn program_accounts_sliced(
        &self,
        program: &Pubkey,
        data_size: u64,
        slice_len: usize,
    ) -> Result<Vec<KeyedAccount>, WatchError> {
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![RpcFilterType::DataSize(data_size)]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                data_slice: Some(solana_account_decoder::UiDataSliceConfig {
                    offset: 0,
                    length: slice_len,
                }),
                commitment: Some(CommitmentConfig::confirmed()),
                min_context_slot: None,
            },
            with_context: Some(false),
        };

        let accounts = self
            .bounded(self.client.get_program_accounts_with_config(program, config))
            .await?;

        Ok(accounts
            .into_iter()
            .map(|(pubkey, acc)| KeyedAccount {
                pubkey,
                data: acc.data,
                // The slice hides the real length; the caller asked for
                // data_size-filtered accounts, so that is the real length.
                data_len: data_size,
            })
            .collect())
    }
}
