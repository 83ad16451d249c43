use std::cmp;
use std::fmt;

use crate::error::RangeError;
use crate::range::{RangeItem, RangeSet};

/// A closed byte interval resolved against a known total length.
///
/// Only produced by [`RangeSet::normalize`] and [`NormalizedRangeItem::chunks`],
/// so `from <= to` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedRangeItem {
    from: u64,
    to: u64,
}

impl NormalizedRangeItem {
    pub(crate) fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to);
        NormalizedRangeItem { from, to }
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    pub fn to(&self) -> u64 {
        self.to
    }

    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Splits the interval into consecutive pieces of `block_len` bytes, the
    /// last one possibly shorter. Yields nothing when `block_len` is zero.
    pub fn chunks(&self, block_len: u64) -> Chunks {
        Chunks { next: Some(self.from), to: self.to, block_len }
    }

    /// `Content-Range` value for this interval as part of an entity of
    /// `total_length` bytes.
    pub fn content_range(&self, total_length: u64) -> String {
        RangeSet::entire().content_range(&RangeItem::span(self.from, self.to), Some(total_length))
    }
}

/// Use `.into()`: `RangeItem::from` names the start-bound getter.
impl From<NormalizedRangeItem> for RangeItem {
    fn from(item: NormalizedRangeItem) -> Self {
        RangeItem::span(item.from, item.to)
    }
}

impl fmt::Display for NormalizedRangeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Iterator returned by [`NormalizedRangeItem::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks {
    next: Option<u64>,
    to: u64,
    block_len: u64,
}

impl Iterator for Chunks {
    type Item = NormalizedRangeItem;

    fn next(&mut self) -> Option<NormalizedRangeItem> {
        if self.block_len == 0 {
            return None;
        }
        let from = self.next?;
        let to = cmp::min(from.saturating_add(self.block_len - 1), self.to);
        self.next = if to < self.to { Some(to + 1) } else { None };
        Some(NormalizedRangeItem::new(from, to))
    }
}

impl RangeItem {
    /// Resolves this item to absolute coordinates within `total_length` bytes.
    fn resolve(&self, total_length: u64) -> Result<NormalizedRangeItem, RangeError> {
        let last = total_length - 1;
        let (from, to) = match (self.from(), self.to()) {
            (None, None) => (0, last),
            (Some(from), None) => (from, last),
            (None, Some(suffix)) => (total_length.saturating_sub(suffix), last),
            (Some(from), Some(to)) => {
                if from > to {
                    return Err(RangeError::Inverted { from, to });
                }
                (from, cmp::min(to, last))
            }
        };
        // `-0` lands here too
        if from >= total_length {
            return Err(RangeError::Unsatisfiable { from, length: total_length });
        }
        Ok(NormalizedRangeItem::new(from, to))
    }
}

impl RangeSet {
    /// Resolves every item against `total_length` and merges overlapping or
    /// adjacent intervals.
    ///
    /// The result is sorted by `from`, and no two consecutive intervals touch.
    /// An empty entity has no satisfiable ranges and normalizes to nothing.
    pub fn normalize(&self, total_length: u64) -> Result<Vec<NormalizedRangeItem>, RangeError> {
        if !self.is_bytes() {
            return Err(RangeError::UnsupportedUnit(self.unit().to_string()));
        }
        if total_length == 0 {
            return Ok(Vec::new());
        }

        let mut resolved = self
            .items()
            .iter()
            .map(|item| item.resolve(total_length))
            .collect::<Result<Vec<_>, _>>()?;
        resolved.sort();

        let mut merged: Vec<NormalizedRangeItem> = Vec::with_capacity(resolved.len());
        let mut current: Option<NormalizedRangeItem> = None;
        for item in resolved {
            current = match current {
                None => Some(item),
                Some(acc) if item.from <= acc.to.saturating_add(1) => {
                    Some(NormalizedRangeItem::new(acc.from, cmp::max(acc.to, item.to)))
                }
                Some(acc) => {
                    merged.push(acc);
                    Some(item)
                }
            };
        }
        merged.extend(current);

        Ok(merged)
    }
}
