//! Account fetcher: batched reads with graceful per-item degradation.
//!
//! All reads are idempotent and safe to retry. A failed batch falls back to
//! one-by-one fetches for just that batch; anything still failing becomes an
//! in-position `None`, so downstream code can tell "not found" from "zero".

use std::sync::Arc;

use solana_sdk::{program_pack::Pack, pubkey::Pubkey};
use spl_token::state::Account as TokenAccount;
use tracing::{debug, warn};

use crate::error::WatchError;
use crate::oracle::{self, PriceResolution};
use crate::risk::{self, MarginMetrics};
use crate::rpc::LedgerRpc;
use crate::slab::{
    self, Account, EngineState, MarketConfig, RiskParams, SlabHeader,
};

#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Max keys per multi-get call. The public RPC caps at 100; 10 keeps
    /// payloads small when each account is a whole slab.
    pub batch_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

/// A decoded market plus the per-account risk view, produced from one
/// best-effort-consistent round of reads.
#[derive(Clone, Debug)]
pub struct MarketSnapshot {
    pub slab: Pubkey,
    pub header: SlabHeader,
    pub config: MarketConfig,
    pub params: RiskParams,
    pub engine: EngineState,
    /// Occupied account slots, positional indices preserved.
    pub accounts: Vec<(usize, Account)>,
    pub price: Option<PriceResolution>,
    /// Margin metrics per occupied slot, same order as `accounts`. Slots
    /// whose metrics failed an invariant check carry the error context.
    pub metrics: Vec<(usize, Result<MarginMetrics, String>)>,
    pub fetched_at_slot: u64,
}

pub struct SlabFetcher<R: LedgerRpc> {
    rpc: Arc<R>,
    config: FetchConfig,
}

impl<R: LedgerRpc> SlabFetcher<R> {
    pub fn new(rpc: Arc<R>, config: FetchConfig) -> Self {
        Self { rpc, config }
    }

    /// Fetch raw buffers for `keys`, in order. `None` marks missing or
    /// unreachable accounts.
    pub async fn fetch_slabs(&self, keys: &[Pubkey]) -> Vec<Option<Vec<u8>>> {
        self.fetch_raw(keys).await
    }

    /// Fetch SPL token balances for `keys`. Non-token-accounts and missing
    /// accounts are `None`, never zero.
    pub async fn fetch_balances(&self, keys: &[Pubkey]) -> Vec<Option<u64>> {
        let raw = self.fetch_raw(keys).await;
        raw.into_iter()
            .map(|buf| {
                let buf = buf?;
                TokenAccount::unpack(&buf).ok().map(|t| t.amount)
            })
            .collect()
    }

    async fn fetch_raw(&self, keys: &[Pubkey]) -> Vec<Option<Vec<u8>>> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(self.config.batch_size.max(1)) {
            match self.rpc.multi_account_data(chunk).await {
                Ok(batch) => out.extend(batch),
                Err(e) => {
                    // Degrade to per-key fetches for this batch only.
                    warn!(error = %e, batch = chunk.len(), "batch fetch failed, retrying per key");
                    for key in chunk {
                        match self.rpc.account_data(key).await {
                            Ok(v) => out.push(v),
                            Err(e) => {
                                debug!(%key, error = %e, "per-key fallback failed");
                                out.push(None);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Fetch and decode one market end to end: slab, oracle feed, slot, and
    /// per-account margin metrics, all from one synchronized round.
    pub async fn fetch_market(&self, slab_key: &Pubkey) -> Result<MarketSnapshot, WatchError> {
        let slot = self.rpc.current_slot().await?;

        let buf = self
            .rpc
            .account_data(slab_key)
            .await?
            .ok_or_else(|| WatchError::NotFound(slab_key.to_string()))?;

        let header = slab::decode_header(&buf)?;
        let config = slab::decode_config(&buf)?;
        let params = slab::decode_params(&buf)?;
        let engine = slab::decode_engine(&buf)?;
        let cap = slab::slot_count(buf.len())?;

        if (engine.num_used_accounts as usize) > cap {
            return Err(WatchError::Invariant(format!(
                "slab {slab_key}: num_used_accounts {} exceeds capacity {cap}",
                engine.num_used_accounts
            )));
        }

        let accounts = slab::decode_used_accounts(&buf)?;

        let oracle_key = Pubkey::new_from_array(config.oracle_feed);
        let pyth = if oracle_key != Pubkey::default() {
            self.rpc.account_data(&oracle_key).await.unwrap_or_else(|e| {
                debug!(%oracle_key, error = %e, "oracle feed fetch failed");
                None
            })
        } else {
            None
        };

        let now_ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let price = oracle::resolve_price(pyth.as_deref(), &config, slot, now_ts);

        let metrics = match price {
            Some(p) => accounts
                .iter()
                .map(|(idx, acct)| {
                    let m = risk::margin_metrics(acct, p.price_e6, &config, &params)
                        .map_err(|e| e.to_string());
                    (*idx, m)
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(MarketSnapshot {
            slab: *slab_key,
            header,
            config,
            params,
            engine,
            accounts,
            price,
            metrics,
            fetched_at_slot: slot,
        })
    }
}
