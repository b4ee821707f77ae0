//! Ecosystem radar: scan every registered program on every network, score
//! health, aggregate totals.
//!
//! One `scan_ecosystem` call fetches each distinct network's slot once, fans
//! discovery out across all entries in parallel, and joins per-branch
//! results so one program's failure never cancels or corrupts another's.
//! The whole-ecosystem result is TTL-cached with in-flight coalescing:
//! concurrent callers share one pending scan, and a failed scan is handed to
//! every waiter but never cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::constants::MILLIS_PER_SLOT;
use crate::discovery::{DiscoveryConfig, DiscoveryScanner, SlabSummary};
use crate::error::WatchError;
use crate::registry::{Network, ProgramEntry, Registry};
use crate::rpc::LedgerRpc;

/// Crank-age buckets. Thresholds are operator policy, not protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlabHealth {
    Active,
    Stale,
    Idle,
    /// No used accounts at all.
    Dead,
    /// Slot query for this network failed; crank age cannot be computed.
    Unknown,
}

#[derive(Clone, Debug)]
pub struct HealthPolicy {
    pub active_within: Duration,
    pub stale_within: Duration,
    pub millis_per_slot: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            active_within: Duration::from_secs(3600),
            stale_within: Duration::from_secs(24 * 3600),
            millis_per_slot: MILLIS_PER_SLOT,
        }
    }
}

impl HealthPolicy {
    /// Score one slab against the network's slot at scan start.
    pub fn score(&self, slab: &SlabSummary, current_slot: Option<u64>) -> (SlabHealth, Option<u64>) {
        if slab.used_accounts == 0 {
            return (SlabHealth::Dead, None);
        }
        let Some(slot) = current_slot else {
            return (SlabHealth::Unknown, None);
        };
        let age_slots = slot.saturating_sub(slab.last_crank_slot);
        let age_secs = age_slots.saturating_mul(self.millis_per_slot) / 1000;
        let health = if age_secs < self.active_within.as_secs() {
            SlabHealth::Active
        } else if age_secs < self.stale_within.as_secs() {
            SlabHealth::Stale
        } else {
            SlabHealth::Idle
        };
        (health, Some(age_secs))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ScannedSlab {
    #[serde(flatten)]
    pub summary: SlabSummary,
    pub health: SlabHealth,
    pub crank_age_secs: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProgramScan {
    pub entry_id: String,
    pub label: String,
    pub network: String,
    pub slabs: Vec<ScannedSlab>,
    /// Best health across this program's slabs; `Dead` when it has none.
    pub health: SlabHealth,
    /// Recorded scan failure. A program with an error still appears here;
    /// consumers must distinguish it from a healthy empty program.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanTotals {
    pub programs: usize,
    pub programs_failed: usize,
    pub slabs: usize,
    pub accounts: u64,
    pub by_health: HashMap<SlabHealth, usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NetworkBreakdown {
    pub network: String,
    pub programs: usize,
    pub slabs: usize,
    pub accounts: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct EcosystemScan {
    pub programs: Vec<ProgramScan>,
    pub totals: ScanTotals,
    pub networks: Vec<NetworkBreakdown>,
    /// Slot per network as observed at scan start; `None` where the query
    /// failed. All programs in one scan observe these same values.
    pub network_slots: HashMap<String, Option<u64>>,
    pub scan_timestamp: u64,
    pub scan_duration_ms: u64,
}

#[derive(Clone, Debug)]
pub struct RadarConfig {
    pub cache_ttl: Duration,
    pub discovery: DiscoveryConfig,
    pub health: HealthPolicy,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            discovery: DiscoveryConfig::default(),
            health: HealthPolicy::default(),
        }
    }
}

type SharedScan = Shared<BoxFuture<'static, Result<Arc<EcosystemScan>, Arc<WatchError>>>>;

struct RadarState {
    cached: Option<(Instant, Arc<EcosystemScan>)>,
    in_flight: Option<SharedScan>,
}

struct RadarInner<R: LedgerRpc + 'static> {
    registry: Registry,
    scanners: HashMap<Network, Arc<DiscoveryScanner<R>>>,
    rpcs: HashMap<Network, Arc<R>>,
    config: RadarConfig,
    state: Mutex<RadarState>,
}

pub struct EcosystemRadar<R: LedgerRpc + 'static> {
    inner: Arc<RadarInner<R>>,
}

impl<R: LedgerRpc + 'static> EcosystemRadar<R> {
    /// `rpcs` must cover every network the registry references.
    pub fn new(registry: Registry, rpcs: HashMap<Network, Arc<R>>, config: RadarConfig) -> Self {
        let scanners = rpcs
            .iter()
            .map(|(net, rpc)| {
                (
                    net.clone(),
                    Arc::new(DiscoveryScanner::new(Arc::clone(rpc), config.discovery.clone())),
                )
            })
            .collect();
        Self {
            inner: Arc::new(RadarInner {
                registry,
                scanners,
                rpcs,
                config,
                state: Mutex::new(RadarState {
                    cached: None,
                    in_flight: None,
                }),
            }),
        }
    }

    /// Whole-ecosystem scan with TTL cache and request coalescing.
    pub async fn scan_ecosystem(&self) -> Result<Arc<EcosystemScan>, Arc<WatchError>> {
        let shared = {
            let mut state = self.inner.state.lock();
            if let Some((at, scan)) = &state.cached {
                if at.elapsed() < self.inner.config.cache_ttl {
                    return Ok(Arc::clone(scan));
                }
            }
            match &state.in_flight {
                Some(fut) => fut.clone(),
                None => {
                    let this = Arc::clone(&self.inner);
                    let fut: SharedScan = async move { scan_inner(this).await }
                        .boxed()
                        .shared();
                    state.in_flight = Some(fut.clone());
                    fut
                }
            }
        };

        let result = shared.clone().await;

        // Only the waiters of *this* scan clear the slot and publish the
        // result; a slow waiter must not clobber a newer scan already in
        // flight. Failures are never cached, so the next caller starts a
        // fresh attempt.
        let mut state = self.inner.state.lock();
        if state
            .in_flight
            .as_ref()
            .map_or(false, |f| f.ptr_eq(&shared))
        {
            state.in_flight = None;
            if let Ok(scan) = &result {
                state.cached = Some((Instant::now(), Arc::clone(scan)));
            }
        }
        result
    }

    /// Drop the cached scan so the next call re-scans immediately.
    pub fn invalidate(&self) {
        self.inner.state.lock().cached = None;
    }
}

async fn scan_inner<R: LedgerRpc + 'static>(
    self_: Arc<RadarInner<R>>,
) -> Result<Arc<EcosystemScan>, Arc<WatchError>> {
    let started = Instant::now();
    let networks = self_.registry.networks();

    // One slot query per distinct network, all in parallel.
    let slot_futs = networks.iter().map(|net| {
        let rpc = self_.rpcs.get(net).cloned();
        let net = net.clone();
        async move {
            let slot = match rpc {
                Some(rpc) => match rpc.current_slot().await {
                    Ok(s) => Some(s),
                    Err(e) => {
                        warn!(network = %net, error = %e, "slot query failed");
                        None
                    }
                },
                None => {
                    warn!(network = %net, "no rpc configured for network");
                    None
                }
            };
            (net, slot)
        }
    });
    let network_slots: HashMap<Network, Option<u64>> =
        join_all(slot_futs).await.into_iter().collect();

    // Fan out every program entry; capture per-branch results.
    let entry_futs = self_.registry.entries().iter().map(|entry| {
        let entry = entry.clone();
        let scanner = self_.scanners.get(&entry.network).cloned();
        let slot = network_slots.get(&entry.network).copied().flatten();
        let policy = self_.config.health.clone();
        async move { scan_entry(entry, scanner, slot, policy).await }
    });
    let programs: Vec<ProgramScan> = join_all(entry_futs).await;

    let totals = aggregate_totals(&programs);
    let by_network = aggregate_networks(&programs);

    let scan = EcosystemScan {
        totals,
        networks: by_network,
        network_slots: network_slots
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        scan_timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        scan_duration_ms: started.elapsed().as_millis() as u64,
        programs,
    };
    info!(
        programs = scan.totals.programs,
        slabs = scan.totals.slabs,
        failed = scan.totals.programs_failed,
        duration_ms = scan.scan_duration_ms,
        "ecosystem scan complete"
    );
    Ok(Arc::new(scan))
}

async fn scan_entry<R: LedgerRpc>(
    entry: ProgramEntry,
    scanner: Option<Arc<DiscoveryScanner<R>>>,
    current_slot: Option<u64>,
    policy: HealthPolicy,
) -> ProgramScan {
    let base = ProgramScan {
        entry_id: entry.id.clone(),
        label: entry.label.clone(),
        network: entry.network.to_string(),
        slabs: Vec::new(),
        health: SlabHealth::Dead,
        error: None,
    };

    let scanner = match scanner {
        Some(s) => s,
        None => {
            return ProgramScan {
                error: Some(format!("no rpc configured for network {}", entry.network)),
                ..base
            }
        }
    };

    match scanner.discover_slabs(&entry).await {
        Ok(summaries) => {
            let slabs: Vec<ScannedSlab> = summaries
                .iter()
                .map(|s| {
                    let (health, crank_age_secs) = policy.score(s, current_slot);
                    ScannedSlab {
                        summary: s.clone(),
                        health,
                        crank_age_secs,
                    }
                })
                .collect();
            let health = best_health(slabs.iter().map(|s| s.health));
            ProgramScan {
                slabs,
                health,
                ..base
            }
        }
        Err(e) => ProgramScan {
            error: Some(e.to_string()),
            ..base
        },
    }
}

fn health_rank(h: SlabHealth) -> u8 {
    match h {
        SlabHealth::Active => 4,
        SlabHealth::Stale => 3,
        SlabHealth::Idle => 2,
        SlabHealth::Unknown => 1,
        SlabHealth::Dead => 0,
    }
}

fn best_health(iter: impl Iterator<Item = SlabHealth>) -> SlabHealth {
    iter.max_by_key(|h| health_rank(*h)).unwrap_or(SlabHealth::Dead)
}

fn aggregate_totals(programs: &[ProgramScan]) -> ScanTotals {
    let mut totals = ScanTotals {
        programs: programs.len(),
        ..ScanTotals::default()
    };
    for p in programs {
        if p.error.is_some() {
            totals.programs_failed += 1;
        }
        for s in &p.slabs {
            totals.slabs += 1;
            totals.accounts += s.summary.used_accounts as u64;
            *totals.by_health.entry(s.health).or_insert(0) += 1;
        }
    }
    totals
}

fn aggregate_networks(programs: &[ProgramScan]) -> Vec<NetworkBreakdown> {
    let mut map: HashMap<&str, NetworkBreakdown> = HashMap::new();
    for p in programs {
        let entry = map.entry(p.network.as_str()).or_insert_with(|| NetworkBreakdown {
            network: p.network.clone(),
            programs: 0,
            slabs: 0,
            accounts: 0,
        });
        entry.programs += 1;
        entry.slabs += p.slabs.len();
        entry.accounts += p.slabs.iter().map(|s| s.summary.used_accounts as u64).sum::<u64>();
    }
    let mut out: Vec<NetworkBreakdown> = map.into_values().collect();
    out.sort_by(|a, b| a.network.cmp(&b.network));
    out
}
