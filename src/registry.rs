//! Program registry: the ordered, static list of deployments the radar scans.
//!
//! The registry is collaborator-owned configuration. This crate iterates it
//! and never mutates it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::constants::{slab_len_for_capacity, SLAB_CAPACITIES};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    Devnet,
    /// Any other cluster, keyed by its RPC URL.
    Custom(String),
}

impl Network {
    pub fn default_rpc_url(&self) -> &str {
        match self {
            Network::Mainnet => "https://api.mainnet-beta.solana.com",
            Network::Devnet => "https://api.devnet.solana.com",
            Network::Custom(url) => url,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Devnet => write!(f, "devnet"),
            Network::Custom(url) => write!(f, "custom({url})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// Stable identifier used as cache key and in scan results.
    pub id: String,
    pub label: String,
    #[serde(with = "pubkey_str")]
    pub program_id: Pubkey,
    pub network: Network,
    /// Candidate slab byte sizes for this deployment. Defaults to every
    /// known capacity when empty.
    #[serde(default)]
    pub slab_sizes: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProgramEntry {
    /// Sizes the discovery scanner will query, falling back to the full
    /// known-capacity set.
    pub fn candidate_sizes(&self) -> Vec<u64> {
        if self.slab_sizes.is_empty() {
            SLAB_CAPACITIES
                .iter()
                .map(|&cap| slab_len_for_capacity(cap) as u64)
                .collect()
        } else {
            self.slab_sizes.clone()
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Registry {
    pub entries: Vec<ProgramEntry>,
}

impl Registry {
    pub fn new(entries: Vec<ProgramEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn entries(&self) -> &[ProgramEntry] {
        &self.entries
    }

    /// Distinct networks, in a stable order.
    pub fn networks(&self) -> Vec<Network> {
        let set: BTreeSet<Network> = self.entries.iter().map(|e| e.network.clone()).collect();
        set.into_iter().collect()
    }
}

pub(crate) mod pubkey_str {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(pk: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(pk)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let raw = String::deserialize(d)?;
        Pubkey::from_str(&raw).map_err(serde::de::Error::custom)
    }
}
