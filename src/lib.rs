//! Percolator Watch: read-only monitor for Percolator perpetual-futures
//! markets.
//!
//! The protocol's entire market state lives in fixed-layout "slab" accounts.
//! This crate decodes those slabs, derives risk metrics (margin health,
//! liquidation price, funding rate), and discovers and health-scores every
//! deployment across registered programs and networks.
//!
//! Layering, leaf to root: [`slab`] and [`risk`] are pure and never touch
//! the network; [`fetch`] and [`discovery`] read through the [`rpc`] seam;
//! [`radar`] orchestrates the whole-ecosystem scan; [`activity`] diffs
//! polled snapshots into an event log. Consumers (HTTP handlers, rendering)
//! serialize the result types and apply their own display policy.
//!
//! Consistency is best-effort: oracle price, slot, and slab bytes come from
//! one synchronized round of calls, not a transactional snapshot.

pub mod activity;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod num;
pub mod oracle;
pub mod radar;
pub mod registry;
pub mod risk;
pub mod rpc;
pub mod slab;

pub use error::{FormatError, Result, WatchError};
pub use num::{I128, U128};
