//! Slab layout constants and chain timing.
//!
//! All offsets are fixed by the on-chain program; the decoder never trusts a
//! length or offset stored inside the buffer itself.

/// "PERCOLAT" in big-endian ASCII, stored little-endian at offset 0.
pub const MAGIC: u64 = 0x504552434f4c4154;
pub const VERSION: u32 = 1;

pub const HEADER_LEN: usize = 64;
pub const CONFIG_LEN: usize = 240;
pub const PARAMS_LEN: usize = 144;
pub const ENGINE_LEN: usize = 256;

/// Offset of the first account slot. Everything a discovery scan needs
/// (header, config, params, engine scalars) lives below this offset.
pub const ACCOUNTS_OFF: usize = HEADER_LEN + CONFIG_LEN + PARAMS_LEN + ENGINE_LEN;

/// Fixed stride of one account record.
pub const ACCOUNT_STRIDE: usize = 240;

/// Known slab capacities. Slot count is derived from buffer length, never stored.
#[cfg(not(feature = "devnet"))]
pub const SLAB_CAPACITIES: &[usize] = &[256, 1024, 4096];
#[cfg(feature = "devnet")]
pub const SLAB_CAPACITIES: &[usize] = &[256];

pub const fn slab_len_for_capacity(cap: usize) -> usize {
    ACCOUNTS_OFF + cap * ACCOUNT_STRIDE
}

/// Fixed-point price scale shared by every `_e6` field.
pub const PRICE_SCALE_E6: u64 = 1_000_000;

/// Inverted markets store price as `INVERT_SCALE_E12 / price_e6`.
pub const INVERT_SCALE_E12: u128 = 1_000_000_000_000;

/// Chain-specific slot timing. ~400ms per slot on Solana mainnet-beta.
/// Both the funding-rate hourly conversion and radar crank-age scoring
/// depend on these; they are configuration, not protocol.
pub const MILLIS_PER_SLOT: u64 = 400;
pub const SLOTS_PER_HOUR: u64 = 3_600_000 / MILLIS_PER_SLOT; // 9000

/// Basis-point denominator.
pub const BPS_DENOM: u64 = 10_000;
