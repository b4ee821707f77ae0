//! Oracle price resolution.
//!
//! Pure: the caller fetches the feed account bytes (if any) in the same
//! synchronized round as the slab, and this module picks the working price.
//! Priority order matches the on-chain engine: fresh pyth feed, then a fresh
//! admin-pushed price, then the last price the engine actually used. The
//! configured price cap clamps whichever source wins.

use arrayref::array_ref;
use tracing::debug;

use crate::slab::MarketConfig;

/// Minimum pyth price-account length covering the fields we read.
pub const PYTH_MIN_LEN: usize = 208;

/// Admin-pushed prices older than this (unix seconds) are ignored.
pub const AUTHORITY_PRICE_MAX_AGE_SECS: i64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    PythFeed,
    Authority,
    LastEffective,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PriceResolution {
    /// Human-unit price scaled by 1e6.
    pub price_e6: u64,
    pub source: PriceSource,
}

/// Read a pyth price account, enforcing staleness and confidence gates.
/// Returns `None` for anything unusable; the caller falls through the chain.
pub fn read_pyth_price_e6(
    data: &[u8],
    now_slot: u64,
    max_staleness: u64,
    conf_bps: u16,
) -> Option<u64> {
    if data.len() < PYTH_MIN_LEN {
        return None;
    }

    let expo = i32::from_le_bytes(*array_ref![data, 20, 4]);
    let price = i64::from_le_bytes(*array_ref![data, 176, 8]);
    let conf = u64::from_le_bytes(*array_ref![data, 184, 8]);
    let pub_slot = u64::from_le_bytes(*array_ref![data, 200, 8]);

    if price <= 0 {
        return None;
    }
    if now_slot.saturating_sub(pub_slot) > max_staleness {
        return None;
    }

    // conf/price must be within conf_bps.
    let price_u = price as u128;
    if (conf as u128) * 10_000 > price_u * (conf_bps as u128) {
        return None;
    }

    // Feed bytes are market-creator-controlled; an absurd exponent is junk
    // data, not a reason to panic. u128 holds 10^38 at most.
    let scale = i64::from(expo) + 6;
    if !(-38..=38).contains(&scale) {
        return None;
    }
    let price_e6 = if scale >= 0 {
        price_u.checked_mul(10u128.pow(scale as u32))?
    } else {
        price_u / 10u128.pow((-scale) as u32)
    };

    if price_e6 == 0 || price_e6 > u64::MAX as u128 {
        return None;
    }
    Some(price_e6 as u64)
}

/// Resolve the working oracle price for a market.
///
/// `now_ts` is wall-clock unix seconds for the admin-price freshness gate.
/// Returns `None` only when every source is unusable (feed dead, no admin
/// price, engine never cranked).
pub fn resolve_price(
    pyth_bytes: Option<&[u8]>,
    config: &MarketConfig,
    now_slot: u64,
    now_ts: i64,
) -> Option<PriceResolution> {
    let capped = |p: u64| {
        if config.max_price_e6 > 0 {
            p.min(config.max_price_e6)
        } else {
            p
        }
    };

    if let Some(bytes) = pyth_bytes {
        if let Some(p) =
            read_pyth_price_e6(bytes, now_slot, config.max_staleness_slots, config.conf_filter_bps)
        {
            return Some(PriceResolution {
                price_e6: capped(p),
                source: PriceSource::PythFeed,
            });
        }
        debug!("pyth feed unusable, falling through to authority price");
    }

    if config.authority_price_e6 > 0
        && now_ts.saturating_sub(config.authority_price_timestamp) <= AUTHORITY_PRICE_MAX_AGE_SECS
    {
        return Some(PriceResolution {
            price_e6: capped(config.authority_price_e6),
            source: PriceSource::Authority,
        });
    }

    if config.last_effective_price_e6 > 0 {
        return Some(PriceResolution {
            price_e6: capped(config.last_effective_price_e6),
            source: PriceSource::LastEffective,
        });
    }

    None
}
