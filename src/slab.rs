//! Binary slab decoder.
//!
//! Pure functions from raw account bytes to structured state. No I/O here;
//! discovery feeds these functions header-length slices, the fetcher feeds
//! them whole buffers, and unit tests feed them synthetic encodings.
//!
//! All fields are little-endian. 128-bit fields are stored as two u64
//! half-words and reconstructed through [`U128`]/[`I128`] so no precision is
//! lost and no floating point is involved. Out-of-range numeric values never
//! fail a decode; only length and magic do.

use arrayref::array_ref;

use crate::constants::{
    ACCOUNTS_OFF, ACCOUNT_STRIDE, CONFIG_LEN, HEADER_LEN, MAGIC, PARAMS_LEN,
    SLAB_CAPACITIES, VERSION,
};
use crate::error::FormatError;
use crate::num::{I128, U128};

/// Header flag bit 0: market has been resolved/settled.
pub const FLAG_RESOLVED: u8 = 1 << 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlabHeader {
    pub magic: u64,
    pub version: u32,
    pub bump: u8,
    pub flags: u8,
    pub admin: [u8; 32],
    pub nonce: u64,
    pub last_threshold_update_slot: u64,
}

impl SlabHeader {
    pub fn resolved(&self) -> bool {
        self.flags & FLAG_RESOLVED != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketConfig {
    pub collateral_mint: [u8; 32],
    pub vault: [u8; 32],
    pub oracle_feed: [u8; 32],
    pub max_staleness_slots: u64,
    pub conf_filter_bps: u16,
    /// Market quotes price as 1/price; every consumer must convert through
    /// `INVERT_SCALE_E12 / p` to get human units.
    pub invert: bool,
    pub vault_authority_bump: u8,
    pub unit_scale: u32,
    pub funding_horizon_slots: u64,
    pub funding_k_bps: u64,
    pub funding_inv_scale_e6: u64,
    pub funding_max_premium_bps: u64,
    pub funding_max_bps_per_slot: u64,
    pub threshold_update_interval_slots: u64,
    pub threshold_step_bps: u64,
    pub oracle_authority: [u8; 32],
    pub authority_price_e6: u64,
    pub authority_price_timestamp: i64,
    pub max_price_e6: u64,
    /// Most recent price the engine actually used. Oracle fallback of last
    /// resort when the feed and the admin price are both unusable.
    pub last_effective_price_e6: u64,
}

/// Field-for-field the on-chain engine's risk parameter block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiskParams {
    pub warmup_period_slots: u64,
    pub maintenance_margin_bps: u64,
    pub initial_margin_bps: u64,
    pub trading_fee_bps: u64,
    pub max_accounts: u64,
    pub new_account_fee: U128,
    pub risk_reduction_threshold: U128,
    pub maintenance_fee_per_slot: U128,
    pub max_crank_staleness_slots: u64,
    pub liquidation_fee_bps: u64,
    pub liquidation_fee_cap: U128,
    pub liquidation_buffer_bps: u64,
    pub min_liquidation_abs: U128,
}

/// Scalar prefix of the on-chain engine region (aggregates and cursors; the
/// occupancy bitmap and account slots follow it and are decoded separately).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineState {
    pub vault: U128,
    pub insurance_balance: U128,
    pub insurance_fee_revenue: U128,
    pub current_slot: u64,
    pub funding_index_qpb_e6: I128,
    pub last_funding_slot: u64,
    pub funding_rate_bps_per_slot_last: i64,
    pub last_crank_slot: u64,
    pub max_crank_staleness_slots: u64,
    pub total_open_interest: U128,
    pub c_tot: U128,
    pub pnl_pos_tot: U128,
    pub liq_cursor: u16,
    pub gc_cursor: u16,
    pub crank_cursor: u16,
    pub sweep_start_idx: u16,
    pub last_full_sweep_start_slot: u64,
    pub last_full_sweep_completed_slot: u64,
    pub lifetime_liquidations: u64,
    pub lifetime_force_realize_closes: u64,
    pub net_lp_pos: I128,
    pub lp_sum_abs: U128,
    pub lp_max_abs: U128,
    pub num_used_accounts: u16,
    pub next_account_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountKind {
    User,
    Lp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Account {
    pub account_id: u64,
    pub capital: U128,
    pub kind: AccountKind,
    pub pnl: I128,
    pub reserved_pnl: u64,
    pub warmup_started_at_slot: u64,
    pub warmup_slope_per_step: U128,
    /// Positive = long, negative = short (sign convention is market-dependent
    /// through `MarketConfig::invert`).
    pub position_size: I128,
    /// Last settlement mark price, stored in the market's own convention.
    pub entry_price_e6: u64,
    pub funding_index: I128,
    pub matcher_program: [u8; 32],
    pub matcher_context: [u8; 32],
    pub owner: [u8; 32],
    pub fee_credits: I128,
    pub last_fee_slot: u64,
}

impl Account {
    pub fn is_lp(&self) -> bool {
        matches!(self.kind, AccountKind::Lp)
    }

    /// A slot that carries no account id and no balances. Physical slots are
    /// always decoded; callers filter with this or with engine occupancy.
    pub fn is_vacant(&self) -> bool {
        self.account_id == 0
            && self.capital.is_zero()
            && self.position_size.is_zero()
            && self.owner == [0u8; 32]
    }
}

// --- cursor primitives ---

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        // Callers bound-check the region up front; slicing here cannot fail.
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        s
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(*array_ref![self.take(2), 0, 2])
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(*array_ref![self.take(4), 0, 4])
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(*array_ref![self.take(8), 0, 8])
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(*array_ref![self.take(8), 0, 8])
    }

    fn u128(&mut self) -> U128 {
        let lo = self.u64();
        let hi = self.u64();
        U128::from_halves(lo, hi)
    }

    fn i128(&mut self) -> I128 {
        let lo = self.u64();
        let hi = self.u64();
        I128::from_halves(lo, hi)
    }

    fn pubkey(&mut self) -> [u8; 32] {
        *array_ref![self.take(32), 0, 32]
    }
}

fn require_len(data: &[u8], need: usize) -> Result<(), FormatError> {
    if data.len() < need {
        return Err(FormatError::TooShort { len: data.len(), need });
    }
    Ok(())
}

// --- region decoders ---

pub fn decode_header(data: &[u8]) -> Result<SlabHeader, FormatError> {
    require_len(data, HEADER_LEN)?;
    let mut c = Cursor::new(data);
    let magic = c.u64();
    if magic != MAGIC {
        return Err(FormatError::BadMagic { found: magic });
    }
    let version = c.u32();
    if version != VERSION {
        return Err(FormatError::BadVersion { found: version });
    }
    let bump = c.u8();
    let flags = c.u8();
    c.skip(2);
    let admin = c.pubkey();
    let nonce = c.u64();
    let last_threshold_update_slot = c.u64();
    Ok(SlabHeader {
        magic,
        version,
        bump,
        flags,
        admin,
        nonce,
        last_threshold_update_slot,
    })
}

pub fn decode_config(data: &[u8]) -> Result<MarketConfig, FormatError> {
    require_len(data, HEADER_LEN + CONFIG_LEN)?;
    let mut c = Cursor::new(data);
    c.skip(HEADER_LEN);
    let cfg = MarketConfig {
        collateral_mint: c.pubkey(),
        vault: c.pubkey(),
        oracle_feed: c.pubkey(),
        max_staleness_slots: c.u64(),
        conf_filter_bps: c.u16(),
        invert: c.u8() != 0,
        vault_authority_bump: c.u8(),
        unit_scale: c.u32(),
        funding_horizon_slots: c.u64(),
        funding_k_bps: c.u64(),
        funding_inv_scale_e6: c.u64(),
        funding_max_premium_bps: c.u64(),
        funding_max_bps_per_slot: c.u64(),
        threshold_update_interval_slots: c.u64(),
        threshold_step_bps: c.u64(),
        oracle_authority: c.pubkey(),
        authority_price_e6: c.u64(),
        authority_price_timestamp: c.i64(),
        max_price_e6: c.u64(),
        last_effective_price_e6: c.u64(),
    };
    Ok(cfg)
}

pub fn decode_params(data: &[u8]) -> Result<RiskParams, FormatError> {
    require_len(data, HEADER_LEN + CONFIG_LEN + PARAMS_LEN)?;
    let mut c = Cursor::new(data);
    c.skip(HEADER_LEN + CONFIG_LEN);
    Ok(RiskParams {
        warmup_period_slots: c.u64(),
        maintenance_margin_bps: c.u64(),
        initial_margin_bps: c.u64(),
        trading_fee_bps: c.u64(),
        max_accounts: c.u64(),
        new_account_fee: c.u128(),
        risk_reduction_threshold: c.u128(),
        maintenance_fee_per_slot: c.u128(),
        max_crank_staleness_slots: c.u64(),
        liquidation_fee_bps: c.u64(),
        liquidation_fee_cap: c.u128(),
        liquidation_buffer_bps: c.u64(),
        min_liquidation_abs: c.u128(),
    })
}

pub fn decode_engine(data: &[u8]) -> Result<EngineState, FormatError> {
    require_len(data, ACCOUNTS_OFF)?;
    let mut c = Cursor::new(data);
    c.skip(HEADER_LEN + CONFIG_LEN + PARAMS_LEN);
    let engine = EngineState {
        vault: c.u128(),
        insurance_balance: c.u128(),
        insurance_fee_revenue: c.u128(),
        current_slot: c.u64(),
        funding_index_qpb_e6: c.i128(),
        last_funding_slot: c.u64(),
        funding_rate_bps_per_slot_last: c.i64(),
        last_crank_slot: c.u64(),
        max_crank_staleness_slots: c.u64(),
        total_open_interest: c.u128(),
        c_tot: c.u128(),
        pnl_pos_tot: c.u128(),
        liq_cursor: c.u16(),
        gc_cursor: c.u16(),
        crank_cursor: c.u16(),
        sweep_start_idx: c.u16(),
        last_full_sweep_start_slot: c.u64(),
        last_full_sweep_completed_slot: c.u64(),
        lifetime_liquidations: c.u64(),
        lifetime_force_realize_closes: c.u64(),
        net_lp_pos: c.i128(),
        lp_sum_abs: c.u128(),
        lp_max_abs: c.u128(),
        num_used_accounts: {
            let v = c.u16();
            c.skip(6);
            v
        },
        next_account_id: c.u64(),
    };
    Ok(engine)
}

fn decode_account_at(data: &[u8], off: usize) -> Account {
    let mut c = Cursor::new(&data[off..off + ACCOUNT_STRIDE]);
    let account_id = c.u64();
    let capital = c.u128();
    let kind = if c.u8() == 1 { AccountKind::Lp } else { AccountKind::User };
    c.skip(7);
    Account {
        account_id,
        capital,
        kind,
        pnl: c.i128(),
        reserved_pnl: c.u64(),
        warmup_started_at_slot: c.u64(),
        warmup_slope_per_step: c.u128(),
        position_size: c.i128(),
        entry_price_e6: c.u64(),
        funding_index: c.i128(),
        matcher_program: c.pubkey(),
        matcher_context: c.pubkey(),
        owner: c.pubkey(),
        fee_credits: c.i128(),
        last_fee_slot: c.u64(),
    }
}

/// Number of physical account slots for a whole-slab buffer length.
/// Rejects lengths outside the known capacity set: a wrong length means
/// either a size-colliding foreign account or a layout we do not understand.
pub fn slot_count(len: usize) -> Result<usize, FormatError> {
    for &cap in SLAB_CAPACITIES {
        if len == crate::constants::slab_len_for_capacity(cap) {
            return Ok(cap);
        }
    }
    Err(FormatError::BadLength { len })
}

/// Decode every physical account slot, in positional order.
///
/// Vacant slots are decoded too; callers filter by [`Account::is_vacant`] or
/// by `EngineState::num_used_accounts` semantics. Index stability holds
/// within one decode call only.
pub fn decode_accounts(data: &[u8]) -> Result<Vec<(usize, Account)>, FormatError> {
    decode_header(data)?;
    let cap = slot_count(data.len())?;
    let mut out = Vec::with_capacity(cap);
    for idx in 0..cap {
        let off = ACCOUNTS_OFF + idx * ACCOUNT_STRIDE;
        out.push((idx, decode_account_at(data, off)));
    }
    Ok(out)
}

/// Decode only the occupied account slots (non-vacant), preserving indices.
pub fn decode_used_accounts(data: &[u8]) -> Result<Vec<(usize, Account)>, FormatError> {
    let mut all = decode_accounts(data)?;
    all.retain(|(_, a)| !a.is_vacant());
    Ok(all)
}
