//! Registry scanner: find the slabs behind one program deployment.
//!
//! For each candidate byte size the scanner asks the ledger for matching
//! accounts with a header-length data slice, so a 992KB slab costs 704 bytes
//! of transfer. Size collisions with foreign programs are expected; anything
//! failing the magic check is skipped silently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::constants::ACCOUNTS_OFF;
use crate::error::WatchError;
use crate::registry::ProgramEntry;
use crate::rpc::LedgerRpc;
use crate::slab;

/// Discovery output for one slab. `label` reflects activity order at scan
/// time and may change between scans; `address` is the only stable identity.
#[derive(Clone, Debug, Serialize)]
pub struct SlabSummary {
    #[serde(with = "crate::registry::pubkey_str")]
    pub address: Pubkey,
    pub label: String,
    pub used_accounts: u16,
    pub last_crank_slot: u64,
    #[serde(with = "crate::registry::pubkey_str")]
    pub vault: Pubkey,
    #[serde(with = "crate::registry::pubkey_str")]
    pub collateral_mint: Pubkey,
    pub slab_len: u64,
    pub resolved: bool,
}

#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub cache_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
        }
    }
}

struct CacheEntry {
    at: Instant,
    slabs: Arc<Vec<SlabSummary>>,
}

pub struct DiscoveryScanner<R: LedgerRpc> {
    rpc: Arc<R>,
    config: DiscoveryConfig,
    // Whole-value replacement per entry id; concurrent readers see either
    // the old snapshot or the new one, never a partial write.
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl<R: LedgerRpc> DiscoveryScanner<R> {
    pub fn new(rpc: Arc<R>, config: DiscoveryConfig) -> Self {
        Self {
            rpc,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Scan one program entry, serving from cache within the TTL.
    pub async fn discover_slabs(
        &self,
        entry: &ProgramEntry,
    ) -> Result<Arc<Vec<SlabSummary>>, WatchError> {
        if let Some(cached) = self.cache_get(&entry.id) {
            return Ok(cached);
        }

        let slabs = Arc::new(self.scan(entry).await?);
        self.cache.write().insert(
            entry.id.clone(),
            CacheEntry {
                at: Instant::now(),
                slabs: Arc::clone(&slabs),
            },
        );
        Ok(slabs)
    }

    fn cache_get(&self, id: &str) -> Option<Arc<Vec<SlabSummary>>> {
        let cache = self.cache.read();
        let entry = cache.get(id)?;
        if entry.at.elapsed() < self.config.cache_ttl {
            Some(Arc::clone(&entry.slabs))
        } else {
            None
        }
    }

    async fn scan(&self, entry: &ProgramEntry) -> Result<Vec<SlabSummary>, WatchError> {
        let mut found = Vec::new();
        let mut sizes_failed = 0usize;
        let sizes = entry.candidate_sizes();

        for size in &sizes {
            match self
                .rpc
                .program_accounts_sliced(&entry.program_id, *size, ACCOUNTS_OFF)
                .await
            {
                Ok(accounts) => {
                    for ka in accounts {
                        // Foreign account of colliding size: skip silently.
                        let header = match slab::decode_header(&ka.data) {
                            Ok(h) => h,
                            Err(_) => continue,
                        };
                        let (config, engine) =
                            match (slab::decode_config(&ka.data), slab::decode_engine(&ka.data)) {
                                (Ok(c), Ok(e)) => (c, e),
                                _ => {
                                    debug!(address = %ka.pubkey, "magic ok but header slice truncated");
                                    continue;
                                }
                            };
                        found.push(SlabSummary {
                            address: ka.pubkey,
                            label: String::new(), // assigned after sorting
                            used_accounts: engine.num_used_accounts,
                            last_crank_slot: engine.last_crank_slot,
                            vault: Pubkey::new_from_array(config.vault),
                            collateral_mint: Pubkey::new_from_array(config.collateral_mint),
                            slab_len: ka.data_len,
                            resolved: header.resolved(),
                        });
                    }
                }
                Err(e) => {
                    // One bad size must not abort the others.
                    warn!(entry = %entry.id, size, error = %e, "candidate size scan failed");
                    sizes_failed += 1;
                }
            }
        }

        if sizes_failed == sizes.len() && !sizes.is_empty() {
            return Err(WatchError::Network(format!(
                "all {} candidate-size scans failed for {}",
                sizes.len(),
                entry.id
            )));
        }

        found.sort_by(|a, b| {
            b.used_accounts
                .cmp(&a.used_accounts)
                .then(b.last_crank_slot.cmp(&a.last_crank_slot))
        });
        for (i, s) in found.iter_mut().enumerate() {
            s.label = format!("slab-{i}");
        }

        Ok(found)
    }
}
