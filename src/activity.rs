//! Activity differ: synthesize an event log from polled snapshots.
//!
//! Each tracked market keeps a short ring of snapshots; every new snapshot
//! is diffed against its immediate predecessor. This is lossy by design: if
//! the polling interval is coarser than the event rate, multiple real
//! events coalesce into one observed delta (a counter that moved by 3 is
//! reported once with `count: 3`, and a position that opened and closed
//! between polls is invisible). That approximation is inherent to polling,
//! not a bug to fix here.

use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;

use crate::slab::{Account, EngineState};

/// Snapshots retained per market.
pub const SNAPSHOT_DEPTH: usize = 5;

/// Global event log cap; oldest entries fall off.
pub const EVENT_LOG_CAP: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Crank {
        prev_slot: u64,
        new_slot: u64,
    },
    Funding {
        /// Signed funding-index delta, quote-per-base 1e6 scale.
        delta_qpb_e6: i128,
    },
    /// Lifetime liquidation counter moved; `count` is the observed
    /// increment, which may cover several on-chain liquidations.
    Liquidation {
        count: u64,
    },
    ForceClose {
        count: u64,
    },
    NewAccount {
        index: usize,
        account_id: u64,
    },
    Trade {
        index: usize,
        account_id: u64,
        prev_size: i128,
        new_size: i128,
    },
    Deposit {
        index: usize,
        account_id: u64,
        amount: u128,
    },
    Withdraw {
        index: usize,
        account_id: u64,
        amount: u128,
    },
    /// Ambiguous between liquidation and voluntary close; the poll cannot
    /// tell which.
    AccountRemoved {
        index: usize,
        account_id: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    pub market_id: String,
    pub observed_at: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

struct Snapshot {
    engine: EngineState,
    /// account_id -> (slot index, account)
    accounts: HashMap<u64, (usize, Account)>,
}

struct Inner {
    snapshots: HashMap<String, VecDeque<Snapshot>>,
    /// Newest-first at the log level; chronological within one diff's batch.
    events: VecDeque<ActivityEvent>,
}

pub struct ActivityTracker {
    inner: RwLock<Inner>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                snapshots: HashMap::new(),
                events: VecDeque::new(),
            }),
        }
    }

    /// Record a snapshot for `market_id` and diff it against the previous
    /// one. The first snapshot of a market produces no events.
    pub fn record_snapshot(
        &self,
        market_id: &str,
        engine: &EngineState,
        accounts: &[(usize, Account)],
    ) {
        let snap = Snapshot {
            engine: *engine,
            accounts: accounts
                .iter()
                .map(|(idx, a)| (a.account_id, (*idx, *a)))
                .collect(),
        };

        let observed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut inner = self.inner.write();
        let ring = inner.snapshots.entry(market_id.to_string()).or_default();

        let batch = match ring.back() {
            Some(prev) => diff(market_id, observed_at, prev, &snap),
            None => Vec::new(),
        };

        ring.push_back(snap);
        while ring.len() > SNAPSHOT_DEPTH {
            ring.pop_front();
        }

        // Insert the batch as a block at the front, preserving its internal
        // chronological order.
        for ev in batch.into_iter().rev() {
            inner.events.push_front(ev);
        }
        while inner.events.len() > EVENT_LOG_CAP {
            inner.events.pop_back();
        }
    }

    /// Current event log, newest first.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.inner.read().events.iter().cloned().collect()
    }

    /// Events for one market only, newest first.
    pub fn events_for(&self, market_id: &str) -> Vec<ActivityEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.market_id == market_id)
            .cloned()
            .collect()
    }
}

fn diff(
    market_id: &str,
    observed_at: u64,
    prev: &Snapshot,
    cur: &Snapshot,
) -> Vec<ActivityEvent> {
    let mut out = Vec::new();
    let mut push = |kind: EventKind| {
        out.push(ActivityEvent {
            market_id: market_id.to_string(),
            observed_at,
            kind,
        })
    };

    if cur.engine.last_crank_slot != prev.engine.last_crank_slot {
        push(EventKind::Crank {
            prev_slot: prev.engine.last_crank_slot,
            new_slot: cur.engine.last_crank_slot,
        });
    }

    let funding_delta = cur
        .engine
        .funding_index_qpb_e6
        .get()
        .wrapping_sub(prev.engine.funding_index_qpb_e6.get());
    if funding_delta != 0 {
        push(EventKind::Funding {
            delta_qpb_e6: funding_delta,
        });
    }

    let liq_delta = cur
        .engine
        .lifetime_liquidations
        .saturating_sub(prev.engine.lifetime_liquidations);
    if liq_delta > 0 {
        push(EventKind::Liquidation { count: liq_delta });
    }

    let fc_delta = cur
        .engine
        .lifetime_force_realize_closes
        .saturating_sub(prev.engine.lifetime_force_realize_closes);
    if fc_delta > 0 {
        push(EventKind::ForceClose { count: fc_delta });
    }

    // Per-account events in slot-index order for determinism.
    let mut cur_sorted: Vec<(&u64, &(usize, Account))> = cur.accounts.iter().collect();
    cur_sorted.sort_by_key(|(_, (idx, _))| *idx);

    for (id, (idx, acct)) in cur_sorted {
        match prev.accounts.get(id) {
            None => push(EventKind::NewAccount {
                index: *idx,
                account_id: *id,
            }),
            Some((_, prev_acct)) => {
                let prev_size = prev_acct.position_size.get();
                let new_size = acct.position_size.get();
                if prev_size != new_size {
                    push(EventKind::Trade {
                        index: *idx,
                        account_id: *id,
                        prev_size,
                        new_size,
                    });
                } else {
                    let prev_cap = prev_acct.capital.get();
                    let new_cap = acct.capital.get();
                    if new_cap > prev_cap {
                        push(EventKind::Deposit {
                            index: *idx,
                            account_id: *id,
                            amount: new_cap - prev_cap,
                        });
                    } else if new_cap < prev_cap {
                        push(EventKind::Withdraw {
                            index: *idx,
                            account_id: *id,
                            amount: prev_cap - new_cap,
                        });
                    }
                }
            }
        }
    }

    let mut removed: Vec<(&u64, &(usize, Account))> = prev
        .accounts
        .iter()
        .filter(|(id, _)| !cur.accounts.contains_key(id))
        .collect();
    removed.sort_by_key(|(_, (idx, _))| *idx);
    for (id, (idx, _)) in removed {
        push(EventKind::AccountRemoved {
            index: *idx,
            account_id: *id,
        });
    }

    out
}
