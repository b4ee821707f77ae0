//! Shared test harness: byte-level encoders mirroring the on-chain slab
//! layout, plus fixture constructors.

#![allow(dead_code)]

use percolator_watch::constants::{
    slab_len_for_capacity, ACCOUNTS_OFF, ACCOUNT_STRIDE, CONFIG_LEN, ENGINE_LEN, HEADER_LEN,
    MAGIC, PARAMS_LEN, VERSION,
};
use percolator_watch::num::{I128, U128};
use percolator_watch::slab::{
    Account, AccountKind, EngineState, MarketConfig, RiskParams, SlabHeader,
};

pub struct Enc {
    pub buf: Vec<u8>,
}

impl Enc {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    pub fn u128(&mut self, v: U128) {
        let (lo, hi) = v.halves();
        self.u64(lo);
        self.u64(hi);
    }
    pub fn i128(&mut self, v: I128) {
        let (lo, hi) = v.halves();
        self.u64(lo);
        self.u64(hi);
    }
    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
    pub fn pad(&mut self, n: usize) {
        self.buf.extend(std::iter::repeat(0u8).take(n));
    }
}

pub fn encode_header(h: &SlabHeader) -> Vec<u8> {
    let mut e = Enc::new();
    e.u64(h.magic);
    e.u32(h.version);
    e.u8(h.bump);
    e.u8(h.flags);
    e.pad(2);
    e.bytes(&h.admin);
    e.u64(h.nonce);
    e.u64(h.last_threshold_update_slot);
    assert_eq!(e.buf.len(), HEADER_LEN);
    e.buf
}

pub fn encode_config(c: &MarketConfig) -> Vec<u8> {
    let mut e = Enc::new();
    e.bytes(&c.collateral_mint);
    e.bytes(&c.vault);
    e.bytes(&c.oracle_feed);
    e.u64(c.max_staleness_slots);
    e.u16(c.conf_filter_bps);
    e.u8(c.invert as u8);
    e.u8(c.vault_authority_bump);
    e.u32(c.unit_scale);
    e.u64(c.funding_horizon_slots);
    e.u64(c.funding_k_bps);
    e.u64(c.funding_inv_scale_e6);
    e.u64(c.funding_max_premium_bps);
    e.u64(c.funding_max_bps_per_slot);
    e.u64(c.threshold_update_interval_slots);
    e.u64(c.threshold_step_bps);
    e.bytes(&c.oracle_authority);
    e.u64(c.authority_price_e6);
    e.i64(c.authority_price_timestamp);
    e.u64(c.max_price_e6);
    e.u64(c.last_effective_price_e6);
    e.pad(8);
    assert_eq!(e.buf.len(), CONFIG_LEN);
    e.buf
}

pub fn encode_params(p: &RiskParams) -> Vec<u8> {
    let mut e = Enc::new();
    e.u64(p.warmup_period_slots);
    e.u64(p.maintenance_margin_bps);
    e.u64(p.initial_margin_bps);
    e.u64(p.trading_fee_bps);
    e.u64(p.max_accounts);
    e.u128(p.new_account_fee);
    e.u128(p.risk_reduction_threshold);
    e.u128(p.maintenance_fee_per_slot);
    e.u64(p.max_crank_staleness_slots);
    e.u64(p.liquidation_fee_bps);
    e.u128(p.liquidation_fee_cap);
    e.u64(p.liquidation_buffer_bps);
    e.u128(p.min_liquidation_abs);
    assert_eq!(e.buf.len(), PARAMS_LEN);
    e.buf
}

pub fn encode_engine(s: &EngineState) -> Vec<u8> {
    let mut e = Enc::new();
    e.u128(s.vault);
    e.u128(s.insurance_balance);
    e.u128(s.insurance_fee_revenue);
    e.u64(s.current_slot);
    e.i128(s.funding_index_qpb_e6);
    e.u64(s.last_funding_slot);
    e.i64(s.funding_rate_bps_per_slot_last);
    e.u64(s.last_crank_slot);
    e.u64(s.max_crank_staleness_slots);
    e.u128(s.total_open_interest);
    e.u128(s.c_tot);
    e.u128(s.pnl_pos_tot);
    e.u16(s.liq_cursor);
    e.u16(s.gc_cursor);
    e.u16(s.crank_cursor);
    e.u16(s.sweep_start_idx);
    e.u64(s.last_full_sweep_start_slot);
    e.u64(s.last_full_sweep_completed_slot);
    e.u64(s.lifetime_liquidations);
    e.u64(s.lifetime_force_realize_closes);
    e.i128(s.net_lp_pos);
    e.u128(s.lp_sum_abs);
    e.u128(s.lp_max_abs);
    e.u16(s.num_used_accounts);
    e.pad(6);
    e.u64(s.next_account_id);
    assert_eq!(e.buf.len(), ENGINE_LEN);
    e.buf
}

pub fn encode_account(a: &Account) -> Vec<u8> {
    let mut e = Enc::new();
    e.u64(a.account_id);
    e.u128(a.capital);
    e.u8(match a.kind {
        AccountKind::User => 0,
        AccountKind::Lp => 1,
    });
    e.pad(7);
    e.i128(a.pnl);
    e.u64(a.reserved_pnl);
    e.u64(a.warmup_started_at_slot);
    e.u128(a.warmup_slope_per_step);
    e.i128(a.position_size);
    e.u64(a.entry_price_e6);
    e.i128(a.funding_index);
    e.bytes(&a.matcher_program);
    e.bytes(&a.matcher_context);
    e.bytes(&a.owner);
    e.i128(a.fee_credits);
    e.u64(a.last_fee_slot);
    assert_eq!(e.buf.len(), ACCOUNT_STRIDE);
    e.buf
}

/// Assemble a whole slab buffer at the given capacity, with the provided
/// accounts placed at their slot indices and the rest left vacant.
pub fn build_slab(
    header: &SlabHeader,
    config: &MarketConfig,
    params: &RiskParams,
    engine: &EngineState,
    accounts: &[(usize, Account)],
    capacity: usize,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(slab_len_for_capacity(capacity));
    buf.extend(encode_header(header));
    buf.extend(encode_config(config));
    buf.extend(encode_params(params));
    buf.extend(encode_engine(engine));
    buf.resize(slab_len_for_capacity(capacity), 0);
    for (idx, acct) in accounts {
        assert!(*idx < capacity, "slot index {idx} out of capacity {capacity}");
        let off = ACCOUNTS_OFF + idx * ACCOUNT_STRIDE;
        buf[off..off + ACCOUNT_STRIDE].copy_from_slice(&encode_account(acct));
    }
    buf
}

// --- fixtures ---

pub fn default_header() -> SlabHeader {
    SlabHeader {
        magic: MAGIC,
        version: VERSION,
        bump: 254,
        flags: 0,
        admin: [7; 32],
        nonce: 42,
        last_threshold_update_slot: 1000,
    }
}

pub fn default_config() -> MarketConfig {
    MarketConfig {
        collateral_mint: [1; 32],
        vault: [2; 32],
        oracle_feed: [3; 32],
        max_staleness_slots: 100,
        conf_filter_bps: 100,
        invert: false,
        vault_authority_bump: 255,
        unit_scale: 1,
        funding_horizon_slots: 3600,
        funding_k_bps: 100,
        funding_inv_scale_e6: 1_000_000,
        funding_max_premium_bps: 500,
        funding_max_bps_per_slot: 10,
        threshold_update_interval_slots: 900,
        threshold_step_bps: 25,
        oracle_authority: [4; 32],
        authority_price_e6: 0,
        authority_price_timestamp: 0,
        max_price_e6: 0,
        last_effective_price_e6: 50_000_000,
    }
}

pub fn default_params() -> RiskParams {
    RiskParams {
        warmup_period_slots: 10,
        maintenance_margin_bps: 500,
        initial_margin_bps: 1000,
        trading_fee_bps: 10,
        max_accounts: 256,
        new_account_fee: U128::new(1_000_000),
        risk_reduction_threshold: U128::new(500_000),
        maintenance_fee_per_slot: U128::new(1),
        max_crank_staleness_slots: 100,
        liquidation_fee_bps: 50,
        liquidation_fee_cap: U128::new(10_000_000),
        liquidation_buffer_bps: 100,
        min_liquidation_abs: U128::new(10),
    }
}

pub fn default_engine() -> EngineState {
    EngineState {
        vault: U128::new(10_000_000_000),
        insurance_balance: U128::new(500_000_000),
        insurance_fee_revenue: U128::new(1_234_567),
        current_slot: 5000,
        funding_index_qpb_e6: I128::new(-987_654),
        last_funding_slot: 4990,
        funding_rate_bps_per_slot_last: -3,
        last_crank_slot: 4995,
        max_crank_staleness_slots: 100,
        total_open_interest: U128::new(777_000_000),
        c_tot: U128::new(9_999_999_999),
        pnl_pos_tot: U128::new(123_456),
        liq_cursor: 3,
        gc_cursor: 9,
        crank_cursor: 17,
        sweep_start_idx: 2,
        last_full_sweep_start_slot: 4900,
        last_full_sweep_completed_slot: 4950,
        lifetime_liquidations: 12,
        lifetime_force_realize_closes: 2,
        net_lp_pos: I128::new(-5_000_000),
        lp_sum_abs: U128::new(12_000_000),
        lp_max_abs: U128::new(8_000_000),
        num_used_accounts: 2,
        next_account_id: 11,
    }
}

pub fn default_account(id: u64, idx_hint: u8) -> Account {
    Account {
        account_id: id,
        capital: U128::new(100_000_000 + idx_hint as u128),
        kind: AccountKind::User,
        pnl: I128::new(-5_000),
        reserved_pnl: 0,
        warmup_started_at_slot: 100,
        warmup_slope_per_step: U128::new(10),
        position_size: I128::new(10_000_000),
        entry_price_e6: 50_000_000,
        funding_index: I128::new(-987_654),
        matcher_program: [0; 32],
        matcher_context: [0; 32],
        owner: [idx_hint; 32],
        fee_credits: I128::new(-1),
        last_fee_slot: 4990,
    }
}
