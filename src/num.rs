//! Fixed-layout 128-bit integers.
//!
//! On-chain, 128-bit fields are stored as two little-endian u64 half-words
//! (`[lo, hi]`) so the layout is identical on targets where i128 alignment
//! differs. The decoder reconstructs them exactly: unsigned as
//! `lo + (hi << 64)`, signed by sign-extending the hi word before combining.
//! No floating point is ever involved; accounting callers get exact integers.

/// Unsigned 128-bit value as stored on-chain (`[lo, hi]` little-endian).
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct U128([u64; 2]);

impl U128 {
    pub const ZERO: Self = Self([0, 0]);

    #[inline]
    pub const fn new(val: u128) -> Self {
        Self([val as u64, (val >> 64) as u64])
    }

    #[inline]
    pub const fn from_halves(lo: u64, hi: u64) -> Self {
        Self([lo, hi])
    }

    #[inline]
    pub const fn get(self) -> u128 {
        ((self.0[1] as u128) << 64) | (self.0[0] as u128)
    }

    #[inline]
    pub const fn halves(self) -> (u64, u64) {
        (self.0[0], self.0[1])
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0[0] == 0 && self.0[1] == 0
    }
}

/// Signed 128-bit value as stored on-chain. The hi word carries the sign.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct I128([u64; 2]);

impl I128 {
    pub const ZERO: Self = Self([0, 0]);

    #[inline]
    pub const fn new(val: i128) -> Self {
        Self([val as u64, (val >> 64) as u64])
    }

    #[inline]
    pub const fn from_halves(lo: u64, hi: u64) -> Self {
        Self([lo, hi])
    }

    /// Sign-extend: the hi half-word is reinterpreted as signed.
    #[inline]
    pub const fn get(self) -> i128 {
        ((self.0[1] as i128) << 64) | (self.0[0] as u128 as i128)
    }

    #[inline]
    pub const fn halves(self) -> (u64, u64) {
        (self.0[0], self.0[1])
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0[0] == 0 && self.0[1] == 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        (self.0[1] as i64) < 0
    }

    #[inline]
    pub fn unsigned_abs(self) -> u128 {
        self.get().unsigned_abs()
    }
}

impl core::fmt::Debug for U128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "U128({})", self.get())
    }
}

impl core::fmt::Display for U128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl core::fmt::Debug for I128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "I128({})", self.get())
    }
}

impl core::fmt::Display for I128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl From<u128> for U128 {
    fn from(val: u128) -> Self {
        Self::new(val)
    }
}

impl From<U128> for u128 {
    fn from(val: U128) -> Self {
        val.get()
    }
}

impl From<i128> for I128 {
    fn from(val: i128) -> Self {
        Self::new(val)
    }
}

impl From<I128> for i128 {
    fn from(val: I128) -> Self {
        val.get()
    }
}

impl PartialOrd for U128 {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U128 {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.get().cmp(&other.get())
    }
}

impl PartialOrd for I128 {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for I128 {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.get().cmp(&other.get())
    }
}

// Serialize as decimal strings: 128-bit accounting values must reach
// consumers exact, and JSON numbers cannot carry them.
impl serde::Serialize for U128 {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&self.get())
    }
}

impl serde::Serialize for I128 {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&self.get())
    }
}
