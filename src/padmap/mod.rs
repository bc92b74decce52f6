//! Hardware address to pad index lookup
//!
//! The pad map is built once from a mapping file and then only read. Workers
//! share it through an `Arc` and query it without locking.
//!
//! Keys are computed with a fixed radix-mixing formula so that downstream
//! tooling can rely on key stability:
//!
//! ```text
//! key = channel + asad * 100 + aget * 10_000 + cobo * 1_000_000
//! ```

mod loader;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::BufRead;
use std::path::Path;

use crate::error::PadMapResult;

/// A physical acquisition channel: (cobo, asad, aget, channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareAddress {
    /// CoBo module (primary coordinate)
    pub cobo: i32,

    /// AsAd board (secondary coordinate)
    pub asad: i32,

    /// AGET chip (tertiary coordinate)
    pub aget: i32,

    /// Channel on the chip
    pub channel: i32,
}

impl HardwareAddress {
    /// Create a new hardware address
    pub const fn new(cobo: i32, asad: i32, aget: i32, channel: i32) -> Self {
        Self {
            cobo,
            asad,
            aget,
            channel,
        }
    }

    /// Encode this address into its lookup key
    pub fn key(&self) -> i64 {
        encode(self)
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.cobo, self.asad, self.aget, self.channel
        )
    }
}

/// A detector pad identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadIndex(pub u16);

impl PadIndex {
    /// Sentinel returned when an address has no mapping
    pub const MISSING: PadIndex = PadIndex(20000);

    /// Returns true if this is the "no mapping" sentinel
    pub fn is_missing(&self) -> bool {
        *self == Self::MISSING
    }

    /// Raw identifier value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for PadIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the lookup key for an address
///
/// Distinct addresses give distinct keys as long as `channel`, `asad` and
/// `aget` are each in `0..100`. Addresses outside that range are still
/// encoded; they just will not match anything loaded from a valid map.
pub fn encode(addr: &HardwareAddress) -> i64 {
    i64::from(addr.channel)
        + i64::from(addr.asad) * 100
        + i64::from(addr.aget) * 10_000
        + i64::from(addr.cobo) * 1_000_000
}

/// Immutable mapping from hardware address to pad index
#[derive(Debug, Clone, Default)]
pub struct PadMap {
    /// key -> pad
    table: HashMap<i64, PadIndex>,

    /// pad -> address, for grouping results by cobo
    reverse: HashMap<PadIndex, HardwareAddress>,
}

impl PadMap {
    /// Build a pad map from the lines of a mapping source
    ///
    /// The first two lines are always discarded. Blank lines and lines whose
    /// first field is empty or `-1` are skipped. Any other line that does not
    /// parse aborts the build.
    pub fn build<I, S>(lines: I) -> PadMapResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let records = loader::parse_lines(lines)?;
        Ok(Self::from_records(records))
    }

    /// Build a pad map from a buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> PadMapResult<Self> {
        let records = loader::parse_reader(reader)?;
        Ok(Self::from_records(records))
    }

    /// Load a pad map from a file
    pub fn from_path(path: &Path) -> PadMapResult<Self> {
        let records = loader::parse_file(path)?;
        let map = Self::from_records(records);
        tracing::info!(path = %path.display(), pads = map.len(), "Pad map loaded");
        Ok(map)
    }

    /// Build from already-parsed records; the first record for an address wins
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (HardwareAddress, PadIndex)>,
    {
        let mut table = HashMap::new();
        let mut reverse = HashMap::new();

        for (addr, pad) in records {
            if table.contains_key(&addr.key()) {
                tracing::debug!(address = %addr, pad = %pad, "Duplicate address ignored");
                continue;
            }
            table.insert(addr.key(), pad);
            reverse.entry(pad).or_insert(addr);
        }

        Self { table, reverse }
    }

    /// Look up the pad for an address, returning `PadIndex::MISSING` if absent
    pub fn find(&self, addr: &HardwareAddress) -> PadIndex {
        self.get(addr).unwrap_or(PadIndex::MISSING)
    }

    /// Look up the pad for an address
    pub fn get(&self, addr: &HardwareAddress) -> Option<PadIndex> {
        self.table.get(&addr.key()).copied()
    }

    /// Find the cobo (primary coordinate) that a pad is read out by
    pub fn reverse_find(&self, pad: PadIndex) -> Option<i32> {
        self.reverse.get(&pad).map(|addr| addr.cobo)
    }

    /// Find the full hardware address of a pad
    pub fn reverse_address(&self, pad: PadIndex) -> Option<HardwareAddress> {
        self.reverse.get(&pad).copied()
    }

    /// Returns true if no mappings were loaded
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of loaded mappings
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Convert a set of hardware addresses into the pads they map to
    ///
    /// Unmapped addresses are dropped.
    pub fn pads_for_addresses<'a, I>(&self, addrs: I) -> BTreeSet<PadIndex>
    where
        I: IntoIterator<Item = &'a HardwareAddress>,
    {
        addrs.into_iter().filter_map(|a| self.get(a)).collect()
    }
}
